//! Error types for the Hearth framework.
//!
//! [`HookError`] is what the hook chain produces; every variant maps to one
//! [`ErrorKind`], which is the key of the route's error-handler table.
//! [`DispatchError`] covers the failures that escape the chain entirely.

use std::any::TypeId;
use std::fmt;

use thiserror::Error;

use crate::method::Verb;
use hearth_core::{BoxError, ConfigurationError, ContainerError};

// =============================================================================
// ErrorKind
// =============================================================================

/// Key used to select an error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No handler function is bound for the requested verb.
    MethodNotAllowed,
    /// The request body could not be decoded.
    BadRequest,
    /// An application error, keyed by its concrete Rust type.
    Custom(TypeId),
}

impl ErrorKind {
    /// The kind of a custom error of type `E`.
    pub fn of<E: 'static>() -> Self {
        Self::Custom(TypeId::of::<E>())
    }
}

// =============================================================================
// BodyError
// =============================================================================

/// Why a request payload could not be decoded as JSON.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// HookError
// =============================================================================

/// A failure raised by the user loader, a hook or the handler.
#[derive(Debug, Error)]
pub enum HookError {
    /// No handler function is bound for `verb`.
    #[error("method {verb} is not allowed")]
    MethodNotAllowed { verb: Verb },

    /// The payload is not the JSON the handler asked for.
    #[error("{message}")]
    BadRequest {
        message: String,
        #[source]
        source: BodyError,
    },

    /// Any other error, tagged with its concrete type.
    #[error("{source}")]
    Custom {
        type_id: TypeId,
        type_name: &'static str,
        #[source]
        source: BoxError,
    },
}

impl HookError {
    /// Wraps an application error, remembering its concrete type.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Custom {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            source: Box::new(error),
        }
    }

    /// Creates a bad-request error carrying the decode failure as its cause.
    pub fn bad_request(source: BodyError) -> Self {
        Self::BadRequest {
            message: format!("Expected json but not found. msg={source}"),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::Custom { type_id, .. } => ErrorKind::Custom(*type_id),
        }
    }

    /// Human-readable kind, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::BadRequest { .. } => "bad_request",
            Self::Custom { type_name, .. } => type_name,
        }
    }

    /// Returns the wrapped application error if it is an `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Custom { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is<E: std::error::Error + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

/// Configuration failures keep their own kind so they can be handled with
/// `ErrorHandlers::on::<ConfigurationError, _>`.
impl From<ContainerError> for HookError {
    fn from(error: ContainerError) -> Self {
        match error {
            ContainerError::Configuration(e) => Self::custom(e),
            other => Self::custom(other),
        }
    }
}

impl From<ConfigurationError> for HookError {
    fn from(error: ConfigurationError) -> Self {
        Self::custom(error)
    }
}

// =============================================================================
// OffloadError
// =============================================================================

/// Failures of the blocking-work pool.
#[derive(Debug, Error)]
pub enum OffloadError {
    /// The route has no offload executor configured.
    #[error("no offload executor is configured for this route")]
    Unavailable,

    /// The pool was shut down.
    #[error("offload executor is closed")]
    Closed,

    /// The blocking closure panicked or was cancelled.
    #[error("offloaded task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<OffloadError> for HookError {
    fn from(error: OffloadError) -> Self {
        Self::custom(error)
    }
}

// =============================================================================
// DispatchError
// =============================================================================

/// Errors that terminate a request before the hook chain can handle them.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Dependency injection failed; this is a setup defect.
    #[error("dependency injection failed: {0}")]
    Injection(#[from] ContainerError),
}

/// Unknown HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported HTTP verb '{0}'")]
pub struct ParseVerbError(pub String);

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for hooks and handlers.
pub type HookResult<T> = Result<T, HookError>;

/// Result type for a full dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodNotAllowed => f.write_str("method_not_allowed"),
            Self::BadRequest => f.write_str("bad_request"),
            Self::Custom(id) => write!(f, "{id:?}"),
        }
    }
}
