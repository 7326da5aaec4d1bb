//! Core error types for Mantis.

use thiserror::Error;

/// Result type alias using `MantisError`.
pub type MantisResult<T> = std::result::Result<T, MantisError>;

/// Generic boxed error for external error sources.
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Failure classes used to decide whether an error is fatal, retried, or
/// unwinds a running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or non-conformable plan. Fatal at compile time.
    Structural,
    /// Operator/backend combination not supported. Fatal at compile time.
    Capability,
    /// Operator applied to out-of-domain runtime values.
    Domain,
    /// Distributed job or scratch I/O failure.
    Backend,
    /// Memory could not be freed for a request.
    Resource,
    /// Everything else (bugs, bad parameters, cancellation).
    Internal,
}

/// Core error type for Mantis operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MantisError {
    /// Malformed DAG: shape mismatch, cycle, broken edge symmetry.
    #[error("StructuralError: {0}")]
    StructuralError(String),

    /// The requested backend cannot implement the operator.
    #[error("CapabilityError: operator '{operator}' is not supported on backend '{backend}'")]
    CapabilityError {
        /// Operator name.
        operator: String,
        /// Backend name.
        backend: String,
    },

    /// A functor was applied to a value outside its domain.
    #[error("DomainError: {0}")]
    DomainError(String),

    /// Distributed job failure.
    #[error("BackendError: {message}")]
    BackendError {
        /// Failure description.
        message: String,
        /// Whether resubmitting the same job may succeed.
        transient: bool,
    },

    /// The buffer pool could not make room for an object.
    #[error("ResourceError: out of memory requesting {requested} bytes: {message}")]
    ResourceError {
        /// Size of the requesting object in bytes.
        requested: usize,
        /// Failure description.
        message: String,
    },

    /// Type mismatch or invalid type operation.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Invalid value provided.
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Program execution error.
    #[error("ExecutionError: {0}")]
    ExecutionError(String),

    /// Feature not yet implemented.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Internal error (bug in Mantis).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// External error from third-party libraries.
    #[error("ExternalError: {0}")]
    ExternalError(GenericError),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),
}

impl MantisError {
    /// Create a new `StructuralError`.
    pub fn structural<S: Into<String>>(msg: S) -> Self {
        Self::StructuralError(msg.into())
    }

    /// Create a new `CapabilityError` naming the operator and backend.
    pub fn capability<O: Into<String>, B: Into<String>>(operator: O, backend: B) -> Self {
        Self::CapabilityError {
            operator: operator.into(),
            backend: backend.into(),
        }
    }

    /// Create a new `DomainError`.
    pub fn domain<S: Into<String>>(msg: S) -> Self {
        Self::DomainError(msg.into())
    }

    /// Create a backend error that may succeed on resubmission.
    pub fn backend_transient<S: Into<String>>(msg: S) -> Self {
        Self::BackendError {
            message: msg.into(),
            transient: true,
        }
    }

    /// Create a backend error that must not be retried.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::BackendError {
            message: msg.into(),
            transient: false,
        }
    }

    /// Create an out-of-memory error for a request of `requested` bytes.
    pub fn out_of_memory<S: Into<String>>(requested: usize, msg: S) -> Self {
        Self::ResourceError {
            requested,
            message: msg.into(),
        }
    }

    /// Create a new `TypeError`.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `NotImplemented` error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create a new `ExecutionError`.
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a cancellation error (using `ExecutionError`).
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionError(format!("Cancelled: {}", msg.into()))
    }

    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StructuralError(_) => ErrorKind::Structural,
            Self::CapabilityError { .. } => ErrorKind::Capability,
            Self::DomainError(_) => ErrorKind::Domain,
            Self::BackendError { .. } | Self::IoError(_) => ErrorKind::Backend,
            Self::ResourceError { .. } => ErrorKind::Resource,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether the failed operation may be resubmitted.
    ///
    /// Only transient backend failures and I/O failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendError { transient, .. } => *transient,
            Self::IoError(_) => true,
            _ => false,
        }
    }
}

/// Ensure a condition holds, returning an `ExecutionError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::MantisError::ExecutionError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::MantisError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `StructuralError`.
#[macro_export]
macro_rules! structural_err {
    ($($arg:tt)*) => {
        return Err($crate::MantisError::StructuralError(format!($($arg)*)))
    };
}

/// Return early with a `TypeError`.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::MantisError::TypeError(format!($($arg)*)))
    };
}
