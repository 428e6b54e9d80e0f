use thiserror::Error;

/// Client-input failures. Reported to the originating connection as an
/// `error` event and never retried by the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Invalid invite code")]
    InvalidCode,
    #[error("Cannot use your own invite code")]
    SelfPair,
    #[error("User is unavailable")]
    PartyUnavailable,
    #[error("Chat room not found")]
    RoomNotFound,
    #[error("Connection is not registered")]
    UnregisteredSender,
    #[error("Sender is not a participant of this chat")]
    ForeignSender,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Stable machine-readable code carried in the `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCode => "INVALID_CODE",
            Self::SelfPair => "SELF_PAIR",
            Self::PartyUnavailable => "PARTY_UNAVAILABLE",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::UnregisteredSender => "UNREGISTERED_SENDER",
            Self::ForeignSender => "FOREIGN_SENDER",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_and_messages() {
        assert_eq!(GatewayError::InvalidCode.code(), "INVALID_CODE");
        assert_eq!(GatewayError::InvalidCode.to_string(), "Invalid invite code");
        assert_eq!(
            GatewayError::SelfPair.to_string(),
            "Cannot use your own invite code"
        );
        let err = GatewayError::InvalidInput("message is empty".into());
        assert_eq!(err.code(), "INVALID_INPUT");
        assert_eq!(err.to_string(), "Invalid input: message is empty");
    }
}
