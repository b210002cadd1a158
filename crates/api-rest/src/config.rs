//! REST server configuration.

use lims_core::{CoreConfig, LimsResult};
use std::path::PathBuf;

/// Address the server binds when `LIMS_REST_ADDR` is unset.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Directory reports are written to when `LIMS_REPORT_DIR` is unset.
pub const DEFAULT_REPORT_DIR: &str = "reports";

/// Everything the REST server reads from the environment at startup.
#[derive(Clone, Debug)]
pub struct RestConfig {
    pub addr: String,
    pub report_dir: PathBuf,
    pub core: CoreConfig,
}

impl RestConfig {
    /// Reads `LIMS_REST_ADDR`, `LIMS_REPORT_DIR` and the core `LIMS_*` variables.
    pub fn from_env() -> LimsResult<Self> {
        let var = |name: &str| std::env::var(name).ok();
        let core = CoreConfig::from_env_values(
            var("LIMS_LAB_NAME"),
            var("LIMS_ENABLE_SAMPLE_COLLECTION"),
            var("LIMS_ENABLE_SAMPLE_RECEIVE"),
            var("LIMS_ENABLE_VERIFICATION"),
        )?;
        Ok(Self::from_values(var("LIMS_REST_ADDR"), var("LIMS_REPORT_DIR"), core))
    }

    pub fn from_values(addr: Option<String>, report_dir: Option<String>, core: CoreConfig) -> Self {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            addr: non_blank(addr).unwrap_or_else(|| DEFAULT_REST_ADDR.into()),
            report_dir: non_blank(report_dir)
                .unwrap_or_else(|| DEFAULT_REPORT_DIR.into())
                .into(),
            core,
        }
    }
}
