//! Supervisor error types.

use thiserror::Error;

use crate::proto::ErrorCode;

/// Errors returned by supervisor primitives.
///
/// `Connection` is transport-level and always fatal to the current call.
/// Every other variant is a logical failure reported by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Socket unreachable, timed out, or the peer spoke garbage.
    #[error("supervisor connection failed: {0}")]
    Connection(String),

    /// Container not found.
    #[error("container not found: {0}")]
    NotFound(String),

    /// Container already exists.
    #[error("container already exists: {0}")]
    AlreadyExists(String),

    /// Container is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Property key or value rejected by the supervisor.
    #[error("property '{property}' rejected: {message}")]
    PropertyRejected { property: String, message: String },

    /// Any other supervisor error code.
    #[error("supervisor error {code}: {message}")]
    Supervisor { code: i32, message: String },
}

impl SupervisorError {
    /// True when the supervisor could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, SupervisorError::Connection(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SupervisorError::NotFound(_))
    }

    /// Map a response error code to the taxonomy.
    ///
    /// `property` is set for `SetProperty` calls, where any refusal of the
    /// key/value (including "not settable in this state") is a rejection.
    pub(crate) fn from_response(code: i32, message: String, property: Option<&str>) -> Self {
        let known = ErrorCode::try_from(code).ok();

        if let Some(property) = property {
            if matches!(
                known,
                Some(
                    ErrorCode::InvalidProperty
                        | ErrorCode::InvalidValue
                        | ErrorCode::InvalidData
                        | ErrorCode::InvalidState
                        | ErrorCode::NotSupported
                        | ErrorCode::Permission
                )
            ) {
                return SupervisorError::PropertyRejected {
                    property: property.to_string(),
                    message,
                };
            }
        }

        match known {
            Some(ErrorCode::ContainerDoesNotExist) => SupervisorError::NotFound(message),
            Some(ErrorCode::ContainerAlreadyExists) => SupervisorError::AlreadyExists(message),
            Some(ErrorCode::InvalidState) => SupervisorError::InvalidState(message),
            _ => SupervisorError::Supervisor { code, message },
        }
    }
}

impl From<std::io::Error> for SupervisorError {
    fn from(e: std::io::Error) -> Self {
        SupervisorError::Connection(e.to_string())
    }
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
