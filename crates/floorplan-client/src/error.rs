use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("max polling attempts exceeded: {locator} not ready after {attempts} attempts")]
    PollTimeout { locator: String, attempts: u32 },

    #[error("task {task_id} failed on the server")]
    TaskFailed { task_id: String },

    #[error("unexpected payload from {url}: {reason}")]
    UnexpectedPayload { url: String, reason: String },

    #[error("invalid upload '{name}': {reason}")]
    InvalidUpload { name: String, reason: String },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("upload cycle superseded by a newer one")]
    Superseded,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn unexpected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedPayload {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// True when the operation stopped because a newer cycle took over.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_message_names_locator() {
        let err = ClientError::PollTimeout {
            locator: "retrieve-results/abc.svg".to_string(),
            attempts: 30,
        };
        assert_eq!(
            err.to_string(),
            "max polling attempts exceeded: retrieve-results/abc.svg not ready after 30 attempts"
        );
    }

    #[test]
    fn superseded_is_detected() {
        assert!(ClientError::Superseded.is_superseded());
        assert!(!ClientError::TaskFailed { task_id: "t".into() }.is_superseded());
    }
}
