/// Database row types. These map directly to SQLite rows.
/// Distinct from voxlo-types models to keep the DB layer independent.

pub struct IdentityRow {
    pub id: String,
    pub display_name: String,
    pub invite_code: String,
    pub created_at: String,
    pub deactivated: bool,
}

pub struct ConversationRow {
    pub room_id: String,
    pub participant_a: String,
    pub participant_b: String,
}

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub text: String,
    pub sent_at: i64,
    pub client_timestamp: Option<i64>,
}
