use axum::{
    Json,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use voxlo_types::api::IdentityStatusResponse;
use voxlo_types::models::IdentityId;

use crate::AppState;

/// Check the static admin bearer token.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = state.admin_token.as_deref().ok_or(StatusCode::NOT_FOUND)?;

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if token != expected {
        warn!("Rejected admin request to {}", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

pub async fn deactivate_identity(
    State(state): State<AppState>,
    Path(identity_id): Path<IdentityId>,
) -> Result<Json<IdentityStatusResponse>, StatusCode> {
    if !state.hub.deactivate(identity_id).await {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(IdentityStatusResponse {
        identity_id,
        deactivated: true,
    }))
}

pub async fn reactivate_identity(
    State(state): State<AppState>,
    Path(identity_id): Path<IdentityId>,
) -> Result<Json<IdentityStatusResponse>, StatusCode> {
    if !state.hub.reactivate(identity_id).await {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(IdentityStatusResponse {
        identity_id,
        deactivated: false,
    }))
}
