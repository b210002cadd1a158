//! The authenticated caller of a workflow operation.
//!
//! Identity and session handling happen outside the core; the role carried here is
//! trusted as already authenticated.

use crate::error::LimsResult;
use crate::ids::UserId;
use crate::permissions::Role;
use lims_types::NonEmptyText;
use serde::{Deserialize, Serialize};

/// Represents the user performing an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identifier of the user in the identity collaborator.
    pub id: UserId,

    /// Login name, recorded for audit output.
    pub username: NonEmptyText,

    /// Capability class used by the permission gate.
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, username: impl AsRef<str>, role: Role) -> LimsResult<Self> {
        Ok(Self {
            id,
            username: NonEmptyText::new(username)?,
            role,
        })
    }
}
