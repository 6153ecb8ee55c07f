//! Error taxonomy for the assistant pipeline.
//!
//! Internals propagate `anyhow::Error` with context; the public pipeline
//! entry points ([`Ingestor::ingest`](crate::ingest::Ingestor::ingest),
//! [`Responder::answer`](crate::responder::Responder::answer)) map failures
//! into [`AssistantError`] so callers can tell a missing credential from a
//! flaky service or an unusable upload.

use thiserror::Error;

/// Result alias used at the pipeline boundary.
pub type AssistantResult<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {
    /// A credential or setting required by the operation is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// A profile or document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Ingestion produced nothing usable, or the index could not be written or read.
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// The embedding or generation service call failed.
    #[error("service error: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Wrap an `anyhow` chain as a service failure, keeping every context layer.
    pub fn service(err: anyhow::Error) -> Self {
        AssistantError::Service(format!("{:#}", err))
    }

    /// Wrap an `anyhow` chain as an ingestion failure, keeping every context layer.
    pub fn ingestion(err: anyhow::Error) -> Self {
        AssistantError::Ingestion(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_keeps_context_chain() {
        let err = anyhow::anyhow!("HTTP 429").context("embedding batch 2 failed");
        let wrapped = AssistantError::service(err);
        let text = wrapped.to_string();
        assert!(text.starts_with("service error:"));
        assert!(text.contains("embedding batch 2 failed"));
        assert!(text.contains("HTTP 429"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "staging is read-only");
        let err: AssistantError = io.into();
        assert!(matches!(err, AssistantError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
    }
}
