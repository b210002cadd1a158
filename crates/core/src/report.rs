//! Report generation precondition and the rendering seam.
//!
//! Rendering itself is a collaborator behind [`Renderer`]; the core only decides whether a
//! report may be produced and records the artifact reference it gets back.

use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, ReportId, UserId};
use crate::lab_result::ResultStatus;
use crate::order::ItemProgress;
use crate::patient::Patient;
use crate::sample::SampleStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Metadata of a generated report. At most one per order; regeneration replaces it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Report {
    pub id: ReportId,
    pub order_id: OrderId,
    pub generated_at: DateTime<Utc>,
    pub generated_by: UserId,
    /// Opaque reference returned by the renderer (a path or URL).
    pub artifact: String,
    pub version: u64,
}

/// A report record together with whether this call created it.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ReportOutcome {
    pub report: Report,
    pub created: bool,
}

/// True iff every item has a PUBLISHED result and no item's sample was rejected.
pub fn can_generate_report(items: &[ItemProgress]) -> bool {
    let published = items
        .iter()
        .filter(|i| i.result == Some(ResultStatus::Published))
        .count();
    published == items.len() && !items.iter().any(|i| i.sample == Some(SampleStatus::Rejected))
}

/// Everything a renderer needs to lay out a report.
#[derive(Clone, Debug, Serialize)]
pub struct ReportDocument {
    pub lab_name: String,
    pub order_no: String,
    pub patient: Patient,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub lines: Vec<ReportLine>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportLine {
    pub test_code: String,
    pub test_name: String,
    pub value: String,
    pub unit: String,
    pub reference_range: String,
    pub flags: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Produces a report artifact and returns a reference to it.
pub trait Renderer: Send + Sync {
    fn render(&self, document: &ReportDocument) -> LimsResult<String>;
}

/// Keeps rendered documents in memory. Used by the CLI and in tests.
#[derive(Default)]
pub struct MemoryRenderer {
    rendered: Mutex<Vec<ReportDocument>>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<ReportDocument> {
        self.rendered.lock().clone()
    }
}

impl Renderer for MemoryRenderer {
    fn render(&self, document: &ReportDocument) -> LimsResult<String> {
        if document.lines.is_empty() {
            return Err(LimsError::Rendering("report has no lines".into()));
        }
        self.rendered.lock().push(document.clone());
        Ok(format!("memory://report_{}", document.order_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(result: Option<ResultStatus>) -> ItemProgress {
        ItemProgress {
            sample: Some(SampleStatus::Received),
            result,
        }
    }

    #[test]
    fn precondition_requires_every_item_published() {
        assert!(!can_generate_report(&[item(None)]));
        assert!(!can_generate_report(&[
            item(Some(ResultStatus::Published)),
            item(Some(ResultStatus::Verified)),
        ]));
        assert!(can_generate_report(&[
            item(Some(ResultStatus::Published)),
            item(Some(ResultStatus::Published)),
        ]));
    }

    #[test]
    fn rejected_specimen_blocks_the_report() {
        let rejected = ItemProgress {
            sample: Some(SampleStatus::Rejected),
            result: Some(ResultStatus::Published),
        };
        assert!(!can_generate_report(&[rejected]));
        assert!(!can_generate_report(&[
            item(Some(ResultStatus::Published)),
            rejected,
        ]));
    }
}
