//! Process-wide workflow switches.
//!
//! The settings are read inside each transition's transaction and handed to the state
//! machines as a plain value; the state machines never look them up themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which manual lab steps are mandatory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WorkflowSettings {
    /// When false, samples are born COLLECTED.
    pub enable_sample_collection: bool,
    /// When false, a collected sample is received in the same step.
    pub enable_sample_receive: bool,
    /// When false, entering a result also marks it verified.
    pub enable_verification: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            enable_sample_collection: true,
            enable_sample_receive: true,
            enable_verification: true,
            updated_at: None,
        }
    }
}

impl WorkflowSettings {
    pub fn skip_collection(&self) -> bool {
        !self.enable_sample_collection
    }

    pub fn skip_receive(&self) -> bool {
        !self.enable_sample_receive
    }

    pub fn skip_verification(&self) -> bool {
        !self.enable_verification
    }
}

/// Payload of an admin settings update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WorkflowSettingsUpdate {
    pub enable_sample_collection: bool,
    pub enable_sample_receive: bool,
    pub enable_verification: bool,
}

impl WorkflowSettingsUpdate {
    pub(crate) fn apply(self, at: DateTime<Utc>) -> WorkflowSettings {
        WorkflowSettings {
            enable_sample_collection: self.enable_sample_collection,
            enable_sample_receive: self.enable_sample_receive,
            enable_verification: self.enable_verification,
            updated_at: Some(at),
        }
    }
}
