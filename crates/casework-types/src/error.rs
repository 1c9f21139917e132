use thiserror::Error;

/// Errors from repository operations (used by trait definitions in
/// casework-core, implemented in casework-infra).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised by a logic module's named operations or reply handler.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("unknown operation: '{0}'")]
    UnknownOperation(String),

    #[error("module execution failed: {0}")]
    Failed(String),
}

/// Errors from loading a module version off disk.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("module entry file not found: {0}")]
    MissingEntry(String),

    #[error("io error reading module: {0}")]
    Io(String),

    #[error("invalid module component: {0}")]
    InvalidComponent(String),

    #[error("invalid module manifest: {0}")]
    Manifest(String),

    #[error("module requires host {required}, running {running}")]
    Incompatible { required: String, running: String },
}

/// Errors from dispatching one inbound command.
///
/// Every variant is fatal for the message it occurred in and is recorded in
/// the processing-status ledger; none escapes the incoming processor.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("required header '{0}' is missing")]
    MissingHeader(&'static str),

    #[error("malformed message body: {0}")]
    MalformedBody(String),

    #[error("unknown action group or module: '{0}'")]
    UnknownGroup(String),

    #[error("unknown operation '{operation}' in group '{group}'")]
    UnknownOperation { group: String, operation: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("module '{0}' is unavailable")]
    ModuleUnavailable(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Module(#[from] InvokeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Short class name recorded in the ledger's `error_class` column.
    pub fn class(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "MissingHeader",
            Self::MalformedBody(_) => "MalformedBody",
            Self::UnknownGroup(_) => "UnknownGroup",
            Self::UnknownOperation { .. } => "UnknownOperation",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::ModuleUnavailable(_) => "ModuleUnavailable",
            Self::Repository(_) => "RepositoryError",
            Self::Module(_) => "ModuleError",
            Self::Internal(_) => "InternalError",
        }
    }
}
