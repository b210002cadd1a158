//! Report renderer writing JSON documents to a directory.

use lims_core::{LimsError, LimsResult, Renderer, ReportDocument};
use std::fs;
use std::path::PathBuf;

/// Writes each report to `<dir>/report_<order_no>.json`, replacing earlier renders.
pub struct FileRenderer {
    dir: PathBuf,
}

impl FileRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Renderer for FileRenderer {
    fn render(&self, document: &ReportDocument) -> LimsResult<String> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            LimsError::Rendering(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let path = self.dir.join(format!("report_{}.json", document.order_no));
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| LimsError::Rendering(e.to_string()))?;
        fs::write(&path, bytes)
            .map_err(|e| LimsError::Rendering(format!("cannot write {}: {e}", path.display())))?;

        Ok(path.display().to_string())
    }
}
