use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::IdentityId;

// -- Status --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub message: String,
    pub active_users: usize,
    pub conversations: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

// -- Admin --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityStatusResponse {
    pub identity_id: IdentityId,
    pub deactivated: bool,
}
