//! Error taxonomy shared by the transport, pollers and mutation coordinator.

use thiserror::Error;

/// User-facing text for any transport-level failure.
pub const UNREACHABLE_MESSAGE: &str =
    "Cannot connect to server. Check your connection and server URL.";

/// Fallback when the server rejects a request without a message.
pub const REJECTED_FALLBACK_MESSAGE: &str = "Request failed";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Host unreachable, connection refused, DNS or TLS failure.
    ///
    /// The display text never includes the underlying transport error; the source is kept
    /// for logs only.
    #[error("{}", UNREACHABLE_MESSAGE)]
    Unreachable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The server answered with `success: false`.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    /// Client-side precondition failed before any request was sent.
    #[error("{0}")]
    Validation(String),

    /// The response was not a valid envelope or its payload did not decode.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn unreachable<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Unreachable {
            source: Box::new(source),
        }
    }

    pub fn rejected(code: Option<String>, message: Option<String>) -> Self {
        ApiError::Rejected {
            code,
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| REJECTED_FALLBACK_MESSAGE.to_string()),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Unreachable { .. })
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::InvalidResponse(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure of a user-triggered mutation.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Another mutation for the same device is still in flight.
    #[error("Another action is already in progress for {mac}")]
    Busy { mac: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_hides_transport_text() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "os error 111");
        let err = ApiError::unreachable(io);
        assert_eq!(err.to_string(), UNREACHABLE_MESSAGE);
        assert!(err.is_unreachable());
    }

    #[test]
    fn rejected_passes_message_through() {
        let err = ApiError::rejected(
            Some("INVALID_MAC".to_string()),
            Some("Invalid MAC address format".to_string()),
        );
        assert_eq!(err.to_string(), "Invalid MAC address format");
    }

    #[test]
    fn rejected_without_message_uses_fallback() {
        assert_eq!(ApiError::rejected(None, None).to_string(), "Request failed");
        assert_eq!(
            ApiError::rejected(None, Some("  ".to_string())).to_string(),
            "Request failed"
        );
    }

    #[test]
    fn mutation_error_is_transparent_over_api_errors() {
        let err = MutationError::from(ApiError::Validation("Minutes must be positive".into()));
        assert_eq!(err.to_string(), "Minutes must be positive");
    }
}
