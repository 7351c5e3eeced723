use std::io;

use thiserror::Error;

/// Error type for fetch, parse, and table persistence failures.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The upstream (or the proxy passing its status through) answered with
    /// a non-2xx code.
    #[error("upstream returned HTTP {status}")]
    Http { status: u16 },

    #[error("transport failure: {detail}")]
    Transport { detail: String },

    /// The response body was not the expected search payload.
    #[error("malformed search payload: {detail}")]
    Payload { detail: String },

    /// A fetched record carries no usable `id` field.
    #[error("record at index {index} has no usable id field")]
    MissingRecordId { index: usize },

    /// An existing table whose header lacks the identifier column. Treating
    /// it as a cold start would overwrite the data, so it is surfaced
    /// instead.
    #[error("table {path} has no id column in its header")]
    MissingIdColumn { path: String },

    #[error("table i/o failure: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Whether the fetch loop may recover by backing off and refetching the
    /// same page.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HarvestError::MissingIdColumn { .. } | HarvestError::Configuration(_)
        )
    }
}

impl From<ureq::Error> for HarvestError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => HarvestError::Http { status: code },
            other => HarvestError::Transport {
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cycle_errors_are_retryable() {
        assert!(HarvestError::Http { status: 502 }.is_retryable());
        assert!(HarvestError::Transport {
            detail: "connection reset".to_string()
        }
        .is_retryable());
        assert!(HarvestError::Payload {
            detail: "missing field".to_string()
        }
        .is_retryable());
        assert!(HarvestError::MissingRecordId { index: 3 }.is_retryable());
    }

    #[test]
    fn test_state_errors_are_fatal() {
        let corrupt = HarvestError::MissingIdColumn {
            path: "boats.csv".to_string(),
        };
        assert!(!corrupt.is_retryable());
        assert!(!HarvestError::Configuration("bad partition".to_string()).is_retryable());
    }

    #[test]
    fn test_status_code_maps_to_http() {
        let err = HarvestError::from(ureq::Error::StatusCode(404));
        match err {
            HarvestError::Http { status } => assert_eq!(status, 404),
            other => panic!("expected Http, got {:?}", other),
        }
    }
}
