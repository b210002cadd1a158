//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the services, so
//! request handling never reads process-wide environment variables.

use crate::constants::DEFAULT_LAB_NAME;
use crate::error::{LimsError, LimsResult};
use crate::workflow::WorkflowSettings;
use lims_types::NonEmptyText;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    lab_name: NonEmptyText,
    initial_workflow: WorkflowSettings,
}

impl CoreConfig {
    pub fn new(lab_name: NonEmptyText, initial_workflow: WorkflowSettings) -> Self {
        Self {
            lab_name,
            initial_workflow,
        }
    }

    /// Build a configuration from raw (already read) environment values.
    ///
    /// Each argument is the optional value of the corresponding variable:
    /// `LIMS_LAB_NAME`, `LIMS_ENABLE_SAMPLE_COLLECTION`, `LIMS_ENABLE_SAMPLE_RECEIVE` and
    /// `LIMS_ENABLE_VERIFICATION`. Missing or blank values fall back to the defaults.
    pub fn from_env_values(
        lab_name: Option<String>,
        enable_sample_collection: Option<String>,
        enable_sample_receive: Option<String>,
        enable_verification: Option<String>,
    ) -> LimsResult<Self> {
        let lab_name = lab_name
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LAB_NAME.to_string());
        let defaults = WorkflowSettings::default();

        let initial_workflow = WorkflowSettings {
            enable_sample_collection: bool_from_env_value(
                "LIMS_ENABLE_SAMPLE_COLLECTION",
                enable_sample_collection,
            )?
            .unwrap_or(defaults.enable_sample_collection),
            enable_sample_receive: bool_from_env_value(
                "LIMS_ENABLE_SAMPLE_RECEIVE",
                enable_sample_receive,
            )?
            .unwrap_or(defaults.enable_sample_receive),
            enable_verification: bool_from_env_value(
                "LIMS_ENABLE_VERIFICATION",
                enable_verification,
            )?
            .unwrap_or(defaults.enable_verification),
            updated_at: None,
        };

        Ok(Self::new(NonEmptyText::new(lab_name)?, initial_workflow))
    }

    pub fn lab_name(&self) -> &NonEmptyText {
        &self.lab_name
    }

    pub fn initial_workflow(&self) -> WorkflowSettings {
        self.initial_workflow
    }
}

/// Parse an optional boolean switch.
///
/// `None` and blank values yield `Ok(None)`.
pub fn bool_from_env_value(name: &str, value: Option<String>) -> LimsResult<Option<bool>> {
    let Some(value) = value.map(|v| v.trim().to_ascii_lowercase()) else {
        return Ok(None);
    };
    match value.as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(LimsError::InvalidArgument(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
