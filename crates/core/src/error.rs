use crate::permissions::{ActionKind, Role};

/// Errors raised by the lab workflow core.
///
/// The first five variants are expected, caller-recoverable outcomes of a request. The
/// remaining variants are infrastructure failures; see [`LimsError::is_domain`].
#[derive(Debug, thiserror::Error)]
pub enum LimsError {
    #[error("role {role} is not permitted to {action}")]
    PermissionDenied { role: Role, action: ActionKind },
    #[error("{entity} cannot {attempted} while {current}")]
    InvalidTransition {
        entity: &'static str,
        current: String,
        attempted: &'static str,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },
    #[error("store failure: {0}")]
    Store(String),
    #[error("report rendering failed: {0}")]
    Rendering(String),
}

impl LimsError {
    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_transition(
        entity: &'static str,
        current: impl std::fmt::Display,
        attempted: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            current: current.to_string(),
            attempted,
        }
    }

    /// True for the expected workflow outcomes (permission, transition, argument,
    /// precondition, not-found); false for store, concurrency and rendering failures.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::InvalidTransition { .. }
                | Self::InvalidArgument(_)
                | Self::PreconditionFailed(_)
                | Self::NotFound { .. }
        )
    }
}

impl From<lims_types::TextError> for LimsError {
    fn from(err: lims_types::TextError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

pub type LimsResult<T> = std::result::Result<T, LimsError>;
