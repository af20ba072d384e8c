//! Error types for attendsync-sync.

use thiserror::Error;

use attendsync_core::FailureKind;

/// Failures talking to the remote attendance-log API.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No complete response within the configured timeout.
    #[error("upstream request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Connection-level failure: DNS, refused, reset before a response.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// Anything else: bad URL, bad header, undecodable body.
    #[error("request error: {0}")]
    Request(String),
}

impl SourceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Timeout { .. } => FailureKind::UpstreamTimeout,
            SourceError::Upstream { .. } => FailureKind::UpstreamError,
            SourceError::Unreachable(_) => FailureKind::UpstreamUnreachable,
            SourceError::Request(_) => FailureKind::RequestError,
        }
    }
}

/// Failures reading from or writing to the tabular store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store API answered with a non-2xx status.
    #[error("store returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Store API could not be reached or the request could not be sent.
    #[error("store transport error: {0}")]
    Transport(String),

    /// Store API answered 2xx with a body we could not read.
    #[error("store response could not be decoded: {0}")]
    Decode(String),
}

/// Everything that can abort one sync attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Source(err) => err.kind(),
            SyncError::Store(_) => FailureKind::StoreError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_source_error_has_a_distinct_kind() {
        let kinds = [
            SourceError::Timeout { timeout_secs: 30 }.kind(),
            SourceError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            }
            .kind(),
            SourceError::Unreachable("refused".into()).kind(),
            SourceError::Request("bad url".into()).kind(),
        ];
        assert_eq!(
            kinds,
            [
                FailureKind::UpstreamTimeout,
                FailureKind::UpstreamError,
                FailureKind::UpstreamUnreachable,
                FailureKind::RequestError,
            ]
        );
    }

    #[test]
    fn store_failures_classify_as_store_error() {
        let err = SyncError::from(StoreError::Transport("reset".into()));
        assert_eq!(err.kind(), FailureKind::StoreError);
        assert_eq!(err.to_string(), "store transport error: reset");
    }
}
