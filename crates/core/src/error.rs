use thiserror::Error;

/// Terminal failures of one analysis attempt. Parse degradation is not in
/// here: the result parser absorbs it and falls back to a plain-text summary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Authentication required: sign in before starting an analysis")]
    AuthRequired,

    #[error("Could not reach {base_url}: {reason}. {guidance}")]
    NetworkUnreachable {
        base_url: String,
        reason: String,
        guidance: String,
    },

    #[error("Analysis request failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Server returned a non-JSON response (HTTP {status}): {preview}")]
    UnexpectedContentType { status: u16, preview: String },

    #[error("Not enough credits to run this analysis: {message}. Top up your balance to continue.")]
    QuotaExceeded { message: String },
}

impl SessionError {
    /// Transport-level failure with guidance that depends on the target:
    /// a local dev backend that is down reads very differently from a
    /// production outage.
    pub fn unreachable(base_url: impl Into<String>, reason: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let guidance = if base_url.contains("localhost") || base_url.contains("127.0.0.1") {
            "Is the local backend running?".to_string()
        } else {
            "Check your internet connection and try again".to_string()
        };
        SessionError::NetworkUnreachable {
            base_url,
            reason: reason.into(),
            guidance,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Http { status, .. }
            | SessionError::UnexpectedContentType { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
