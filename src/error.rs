#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("no bearer token available")]
    AuthRequired,
    #[error("bearer token expired or revoked")]
    AuthExpired,
    #[error("no email account connected")]
    NoAccountConnected,
    /// Error message supplied by the server, kept verbatim.
    #[error("{0}")]
    Provider(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("store: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("keychain: {0}")]
    Keychain(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

impl TrackerError {
    pub fn is_auth(&self) -> bool {
        matches!(self, TrackerError::AuthRequired | TrackerError::AuthExpired)
    }

    /// Text shown to the user at the orchestrator / fetch boundary.
    pub fn user_message(&self) -> String {
        match self {
            TrackerError::AuthRequired => "Please sign in first.".to_string(),
            TrackerError::AuthExpired => "Your session expired. Please sign in again.".to_string(),
            TrackerError::NoAccountConnected => {
                "No email account connected. Connect Gmail or Outlook first.".to_string()
            }
            TrackerError::Provider(msg) => msg.clone(),
            TrackerError::InvalidPayload(detail) => {
                format!("The server sent a response that could not be read ({detail}). Please try again.")
            }
            TrackerError::Api { status, message } if message.trim().is_empty() => {
                format!("The server returned HTTP {status}. Please try again.")
            }
            TrackerError::Api { message, .. } => message.clone(),
            TrackerError::Http(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_response_is_not_a_connection_problem() {
        let msg = TrackerError::InvalidPayload("account list: expected a sequence".into()).user_message();
        assert!(msg.contains("could not be read"));
        assert!(msg.contains("expected a sequence"));
        assert!(!msg.contains("connection"));
    }

    #[test]
    fn provider_message_is_verbatim_and_empty_api_error_names_status() {
        assert_eq!(TrackerError::Provider("Quota exceeded".into()).user_message(), "Quota exceeded");
        assert_eq!(
            TrackerError::Api { status: 503, message: " ".into() }.user_message(),
            "The server returned HTTP 503. Please try again."
        );
        assert!(TrackerError::AuthExpired.is_auth());
        assert!(!TrackerError::NoAccountConnected.is_auth());
    }
}
