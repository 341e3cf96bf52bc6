use thiserror::Error;

/// Errors surfaced by the Home Assistant client layer.
///
/// Remote-reported detail is carried verbatim so callers can explain a
/// failure instead of retrying blindly.
#[derive(Debug, Error)]
pub enum HassError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("command rejected [{code}]: {message}")]
    Command { code: String, message: String },
}

impl HassError {
    /// Stable kind label included in structured tool errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Auth(_) => "auth_error",
            Self::ConnectionLost(_) => "connection_lost",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Command { .. } => "command_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HassError;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(HassError::Connection(String::new()).kind(), "connection_error");
        assert_eq!(HassError::Auth(String::new()).kind(), "auth_error");
        assert_eq!(HassError::ConnectionLost(String::new()).kind(), "connection_lost");
        assert_eq!(HassError::NotFound(String::new()).kind(), "not_found");
        assert_eq!(HassError::Validation(String::new()).kind(), "validation_error");
        let rejected = HassError::Command {
            code: "not_found".to_string(),
            message: "no such automation".to_string(),
        };
        assert_eq!(rejected.kind(), "command_rejected");
    }

    #[test]
    fn command_error_keeps_remote_detail_verbatim() {
        let error = HassError::Command {
            code: "invalid_format".to_string(),
            message: "required key not provided @ data['entity_id']".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("invalid_format"));
        assert!(rendered.contains("required key not provided @ data['entity_id']"));
    }
}
