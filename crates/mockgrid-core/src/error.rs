//! Error types for the MockGrid core engine

use std::fmt;
use std::path::PathBuf;

/// Result type alias for MockGrid operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single schema-validation failure with a dotted field path
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationFailure {
    /// Dotted path into the offending document (e.g. `mocks.2.http.response.status`)
    pub path: String,
    /// Human-readable description of the rule that failed
    pub message: String,
}

impl ValidationFailure {
    /// Create a validation failure for a field path
    pub fn new<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Core error types for MockGrid
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A filesystem path that should exist does not
    #[error("path not found: {}", path.display())]
    NotFound {
        /// The path that could not be located
        path: PathBuf,
    },

    /// A path exists but cannot be read
    #[error("permission denied reading {}", path.display())]
    PermissionDenied {
        /// The path that could not be read
        path: PathBuf,
    },

    /// A configuration file with zero bytes
    #[error("file is empty: {}", path.display())]
    EmptyFile {
        /// The zero-byte file
        path: PathBuf,
    },

    /// A document that is not parseable JSON or YAML
    #[error("invalid syntax: {message}")]
    InvalidSyntax {
        /// Parser diagnostic for the malformed document
        message: String,
    },

    /// Input in the pre-collection format with a top-level `endpoints` key
    #[error(
        "legacy mock format detected (top-level `endpoints` key); \
         run the import command to convert it to a collection"
    )]
    LegacyFormat,

    /// One or more schema rules failed; every failure is carried
    #[error("validation failed with {} error(s)", errors.len())]
    Validation {
        /// Every rule that failed, each with a dotted field path
        errors: Vec<ValidationFailure>,
    },

    /// Two declared services listen on the same port
    #[error("port {port} is claimed by both {first} and {second}")]
    PortConflict {
        /// The contested listening port
        port: u16,
        /// Service that declared the port first
        first: String,
        /// Service that declared it again
        second: String,
    },

    /// A stateful-store lookup missed
    #[error("'{id}' not found in resource '{resource}'")]
    ItemNotFound {
        /// Resource that was searched
        resource: String,
        /// The missing object id
        id: String,
    },

    /// A reference to a resource nothing declared
    #[error("unknown resource '{name}'")]
    UnknownResource {
        /// The resource name nothing was registered under
        name: String,
    },

    /// A reference to a custom operation nothing declared
    #[error("unknown operation '{name}'")]
    UnknownOperation {
        /// The operation name nothing was registered under
        name: String,
    },

    /// An identifier that must be unique already exists
    #[error("duplicate id '{id}'")]
    DuplicateId {
        /// The identifier that already exists
        id: String,
    },

    /// A bounded stateful resource is at capacity
    #[error("resource '{resource}' is full ({max_items} items)")]
    CapacityExceeded {
        /// Name of the bounded resource
        resource: String,
        /// The configured capacity that was hit
        max_items: usize,
    },

    /// A best-effort pipeline failed after applying some mutations
    #[error("operation '{operation}' failed after {completed_steps} step(s): {message}")]
    PartialProgress {
        /// Name of the custom operation
        operation: String,
        /// Steps whose mutations were already applied
        completed_steps: usize,
        /// The failure that interrupted the pipeline
        message: String,
    },

    /// A write against a closed audit sink
    #[error("logger is closed")]
    LoggerClosed,

    /// Aggregated failures from a multi-sink audit write
    #[error("audit fan-out failed: {0}")]
    Fanout(#[from] crate::audit::FanoutError),

    /// An expression or definition failed to compile
    #[error("compilation error in {context}: {message}")]
    Compilation {
        /// Where the expression lives (step index, response field, ...)
        context: String,
        /// Compiler diagnostic
        message: String,
    },

    /// An expression failed at evaluation time
    #[error("evaluation error in {context}: {message}")]
    Evaluation {
        /// Where the expression lives
        context: String,
        /// Interpreter diagnostic
        message: String,
    },

    /// The caller cancelled before the pipeline finished
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failure
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a not-found error
    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an invalid-syntax error
    pub fn invalid_syntax<S: Into<String>>(message: S) -> Self {
        Self::InvalidSyntax {
            message: message.into(),
        }
    }

    /// Create a validation error from a single failure
    pub fn validation<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Validation {
            errors: vec![ValidationFailure::new(path, message)],
        }
    }

    /// Create a validation error carrying every collected failure
    pub fn validation_all(errors: Vec<ValidationFailure>) -> Self {
        Self::Validation { errors }
    }

    /// Create a compilation error
    pub fn compilation<C: Into<String>, M: Into<String>>(context: C, message: M) -> Self {
        Self::Compilation {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation<C: Into<String>, M: Into<String>>(context: C, message: M) -> Self {
        Self::Evaluation {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Validation failures carried by this error, if any
    pub fn validation_failures(&self) -> &[ValidationFailure] {
        match self {
            Self::Validation { errors } => errors,
            _ => &[],
        }
    }

    /// Whether this error came from the legacy `endpoints` format check
    pub fn is_legacy_format(&self) -> bool {
        matches!(self, Self::LegacyFormat)
    }
}
