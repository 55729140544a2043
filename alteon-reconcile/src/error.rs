//! Errors surfaced by the reconciliation engine.
//!
//! Capabilities (configurators, sessions) report [`DeviceError`]s. The engine
//! classifies those, together with its own validation and resolution
//! failures, into a [`ReconcileError`], which the invocation surface turns
//! into a [`Failure`].

use std::fmt::Display;

use serde::Serialize;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a remote capability.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The session could not reach the device at all.
    #[error("device unreachable")]
    Unreachable(#[source] BoxError),
    /// The device answered, but refused the request.
    #[error("request rejected by device")]
    Rejected(#[source] BoxError),
}

impl DeviceError {
    pub fn unreachable(error: impl Into<anyhow::Error>) -> Self {
        DeviceError::Unreachable(error.into().into())
    }

    pub fn rejected(error: impl Into<anyhow::Error>) -> Self {
        DeviceError::Rejected(error.into().into())
    }
}

/// Desired parameters that do not fit the object's catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("parameters for {object_type} must be an object")]
    NotAnObject { object_type: String },
    #[error("missing required parameter {field}")]
    MissingParameter { field: String },
    #[error("unsupported parameter {field} for {object_type}")]
    UnknownField { object_type: String, field: String },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("value {value:?} of {field} can only be read, not configured")]
    ReadOnlyValue { field: String, value: String },
    #[error("duplicate {index} {value:?} in {collection}")]
    DuplicateIndex {
        collection: String,
        index: String,
        value: String,
    },
}

/// The remote call that was in flight when something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    CreateEntry,
    UpdateEntry,
    DeleteEntry,
    PendingCheck,
    Commit,
    Rollback,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::CreateEntry => "create entry",
            Operation::UpdateEntry => "update entry",
            Operation::DeleteEntry => "delete entry",
            Operation::PendingCheck => "pending changes check",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Context attached when an overwrite lost the object half way.
pub const DELETED_NOT_RECREATED: &str = "object deleted but not recreated";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("ConnectionError: {operation} of {object} failed, device unreachable")]
    Connection {
        operation: Operation,
        object: String,
        #[source]
        source: BoxError,
    },

    #[error("ValidationError: {0}")]
    Validation(ValidationError),

    #[error("RemoteOperationError: {operation} of {object} failed{}", context_suffix(.context))]
    RemoteOperation {
        operation: Operation,
        object: String,
        context: Option<&'static str>,
        #[source]
        source: BoxError,
    },

    #[error("AppendOnAbsentParentError: {object} does not exist; append requires an existing object")]
    AppendOnAbsentParent { object: String },

    #[error("ImmutableFieldError: {field} of {object} can be set only for a new entry; use overwrite to recreate it")]
    ImmutableField { object: String, field: String },

    #[error("{error}; additionally, rollback failed: {rollback}")]
    RollbackFailed {
        error: Box<ReconcileError>,
        #[source]
        rollback: BoxError,
    },
}

// Validation errors carry no source, so their failures have no exception.
impl From<ValidationError> for ReconcileError {
    fn from(error: ValidationError) -> Self {
        ReconcileError::Validation(error)
    }
}

fn context_suffix(context: &Option<&'static str>) -> String {
    match context {
        Some(c) => format!(" ({})", c),
        None => String::new(),
    }
}

impl ReconcileError {
    /// Classify a capability failure.
    pub fn device(error: DeviceError, operation: Operation, object: impl Display) -> Self {
        match error {
            DeviceError::Unreachable(_) => ReconcileError::Connection {
                operation,
                object: object.to_string(),
                source: Box::new(error),
            },
            DeviceError::Rejected(_) => ReconcileError::RemoteOperation {
                operation,
                object: object.to_string(),
                context: None,
                source: Box::new(error),
            },
        }
    }

    /// Like [`ReconcileError::device`], but always a remote operation error
    /// carrying `context`, whatever the device reported.
    pub fn partial(
        error: DeviceError,
        operation: Operation,
        object: impl Display,
        context: &'static str,
    ) -> Self {
        ReconcileError::RemoteOperation {
            operation,
            object: object.to_string(),
            context: Some(context),
            source: Box::new(error),
        }
    }

    /// Name of the error kind, as reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Connection { .. } => "ConnectionError",
            ReconcileError::Validation(_) => "ValidationError",
            ReconcileError::RemoteOperation { .. } => "RemoteOperationError",
            ReconcileError::AppendOnAbsentParent { .. } => "AppendOnAbsentParentError",
            ReconcileError::ImmutableField { .. } => "ImmutableFieldError",
            ReconcileError::RollbackFailed { error, .. } => error.kind(),
        }
    }
}

/// Structured failure handed to the outer wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub msg: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl From<&ReconcileError> for Failure {
    fn from(error: &ReconcileError) -> Self {
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(s) = source {
            causes.push(s.to_string());
            source = s.source();
        }
        Failure {
            msg: error.to_string(),
            kind: error.kind(),
            exception: if causes.is_empty() {
                None
            } else {
                Some(causes.join(": "))
            },
        }
    }
}
