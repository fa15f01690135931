use std::time::Duration;

use crate::model::BackendId;

/// Errors returned by a generation backend before they are normalized into a
/// run's terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Backend returned an application-level failure (HTTP status, auth, quota).
    #[error("backend error ({backend}): {message}")]
    Provider {
        backend: BackendId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({backend}): {message}")]
    Transport { backend: BackendId, message: String },
    /// Response shape or event sequencing was invalid.
    #[error("protocol error ({backend}): {message}")]
    Protocol { backend: BackendId, message: String },
}

impl BackendError {
    /// Creates a backend-level error.
    pub fn provider(
        backend: impl Into<BackendId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            backend: backend.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(backend: impl Into<BackendId>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(backend: impl Into<BackendId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Returns the backend associated with this error.
    pub fn backend_id(&self) -> &BackendId {
        match self {
            Self::Provider { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Protocol { backend, .. } => backend,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Terminal failure of a generation run.
///
/// Delivered at most once per run and never together with a completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum GenerationFailure {
    /// Backend reported a terminal failure.
    #[error("backend failure ({backend}): {message}")]
    Backend { backend: String, message: String },
    /// Network/stream transport failed mid-run.
    #[error("transport failure ({backend}): {message}")]
    Transport { backend: String, message: String },
    /// The backend broke the run protocol (for example ended without a
    /// terminal signal).
    #[error("protocol failure: {message}")]
    Protocol { message: String },
}

impl From<BackendError> for GenerationFailure {
    fn from(value: BackendError) -> Self {
        failure_from_backend_error(&value)
    }
}

/// Top-level error type for the relay API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Invalid relay or backend configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Request rejected before any generation run was started.
    #[error("validation error: {0}")]
    Validation(String),
    /// The generation run ended with a failure signal.
    #[error(transparent)]
    Generation(GenerationFailure),
    /// No terminal signal arrived within the bounded wait.
    #[error("generation did not finish within {}ms", .waited.as_millis())]
    Timeout { waited: Duration },
}

impl RelayError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<GenerationFailure> for RelayError {
    fn from(value: GenerationFailure) -> Self {
        RelayError::Generation(value)
    }
}

pub(crate) fn failure_from_backend_error(err: &BackendError) -> GenerationFailure {
    match err {
        BackendError::Provider {
            backend, message, ..
        } => GenerationFailure::Backend {
            backend: backend.to_string(),
            message: message.clone(),
        },
        BackendError::Transport { backend, message } => GenerationFailure::Transport {
            backend: backend.to_string(),
            message: message.clone(),
        },
        BackendError::Protocol { backend, message } => GenerationFailure::Protocol {
            message: format!("backend={backend}: {message}"),
        },
    }
}
