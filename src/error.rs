//! Closed error taxonomy shared by every subsystem.
//!
//! Each subsystem defines its own `thiserror` enum close to its own concerns and
//! implements `From<X> for CoreError`, classifying into one of the kinds below. No
//! subsystem lets a stringly-typed error escape its boundary.

use std::fmt;

/// The closed set of error kinds a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input at a boundary. Never retried.
    Validation,
    /// Referenced entity absent. Never retried.
    NotFound,
    /// Idempotency/uniqueness violation; caller gets the existing entity id.
    Conflict,
    /// Disk/network hiccup. Retried with backoff.
    TransientIo,
    /// Model load/timeout/crash. Retried; repeated failures degrade the provider.
    TransientProvider,
    /// Unreadable media. Dead-lettered, never retried.
    PermanentDecode,
    /// Misconfigured provider/model mismatch. Dead-lettered, surfaced in health.
    PermanentConfig,
    /// Operation aborted on request. Terminal, not a failure.
    Cancelled,
    /// Unexpected invariant violation.
    Internal,
}

impl ErrorKind {
    /// Whether a task engine should retry a handler error of this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientIo | Self::TransientProvider)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::TransientIo => "transient_io",
            Self::TransientProvider => "transient_provider",
            Self::PermanentDecode => "permanent_decode",
            Self::PermanentConfig => "permanent_config",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// A classified error carrying a short user-facing message; detail lives in logs.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, message)
    }

    pub fn transient_provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientProvider, message)
    }

    pub fn permanent_decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentDecode, message)
    }

    pub fn permanent_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentConfig, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<sea_orm::DbErr> for CoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        // Constraint violations are logical conflicts (e.g. duplicate sha256 / idempotency key);
        // everything else from the database layer is treated as a transient hiccup.
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") || message.contains("constraint") {
            Self::with_source(ErrorKind::Conflict, message.clone(), err)
        } else {
            Self::with_source(ErrorKind::TransientIo, message.clone(), err)
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::TransientIo
        };
        let message = err.to_string();
        Self::with_source(kind, message, err)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
