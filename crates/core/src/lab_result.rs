//! Result lifecycle.
//!
//! ```text
//!   DRAFT ──enter──▶ ENTERED ──verify──▶ VERIFIED ──publish──▶ PUBLISHED
//!     ▲                 │                    │
//!     └────reject───────┴────────────────────┘
//! ```
//!
//! With verification disabled, `enter` chains straight into VERIFIED and `publish` also
//! accepts an ENTERED result (one entered before the setting changed).
//!
//! Values are stored as free text. Interpreting them against reference ranges is done
//! elsewhere; the flag travels through here untouched.

use crate::actor::Actor;
use crate::constants::{MAX_RESULT_VALUE_LEN, MAX_UNIT_LEN, RESULT_REJECTION_NOTE_PREFIX};
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, OrderItemId, ResultId, UserId};
use crate::workflow::WorkflowSettings;
use chrono::{DateTime, Utc};
use lims_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Draft,
    Entered,
    Verified,
    Published,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Draft => "DRAFT",
            ResultStatus::Entered => "ENTERED",
            ResultStatus::Verified => "VERIFIED",
            ResultStatus::Published => "PUBLISHED",
        }
    }

    /// Verified or beyond.
    pub fn is_at_least_verified(&self) -> bool {
        matches!(self, ResultStatus::Verified | ResultStatus::Published)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = LimsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(ResultStatus::Draft),
            "ENTERED" => Ok(ResultStatus::Entered),
            "VERIFIED" => Ok(ResultStatus::Verified),
            "PUBLISHED" => Ok(ResultStatus::Published),
            other => Err(LimsError::InvalidArgument(format!(
                "unknown result status '{other}'"
            ))),
        }
    }
}

/// The measured outcome of one order item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LabResult {
    pub id: ResultId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub value: String,
    pub unit: String,
    pub reference_range: String,
    /// Opaque flag such as `H`, `L` or `N`.
    pub flags: String,
    pub notes: String,
    pub status: ResultStatus,
    pub entered_at: Option<DateTime<Utc>>,
    pub entered_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub published_at: Option<DateTime<Utc>>,
    pub published_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Fields supplied when a result is entered.
#[derive(Clone, Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ResultEntry {
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ResultEntry {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl LabResult {
    /// A fresh DRAFT result with empty value.
    pub fn draft(order_id: OrderId, order_item_id: OrderItemId, at: DateTime<Utc>) -> Self {
        Self {
            id: ResultId(0),
            order_id,
            order_item_id,
            value: String::new(),
            unit: String::new(),
            reference_range: String::new(),
            flags: String::new(),
            notes: String::new(),
            status: ResultStatus::Draft,
            entered_at: None,
            entered_by: None,
            verified_at: None,
            verified_by: None,
            published_at: None,
            published_by: None,
            created_at: at,
            version: 0,
        }
    }

    /// DRAFT → ENTERED (→ VERIFIED when verification is disabled).
    ///
    /// Field updates and the status change are applied together or not at all.
    pub fn enter(
        &mut self,
        entry: ResultEntry,
        actor: &Actor,
        at: DateTime<Utc>,
        settings: &WorkflowSettings,
    ) -> LimsResult<()> {
        if self.status != ResultStatus::Draft {
            return Err(LimsError::invalid_transition("result", self.status, "enter"));
        }

        let value = NonEmptyText::with_max_len(&entry.value, MAX_RESULT_VALUE_LEN)
            .map_err(|e| LimsError::InvalidArgument(format!("value: {e}")))?;
        let unit = optional_text(entry.unit, MAX_UNIT_LEN, "unit")?;

        let mut next = self.clone();
        next.value = value.into_inner();
        if let Some(unit) = unit {
            next.unit = unit;
        }
        if let Some(range) = entry.reference_range {
            next.reference_range = range.trim().to_string();
        }
        if let Some(flags) = entry.flags {
            next.flags = flags.trim().to_string();
        }
        if let Some(notes) = entry.notes.filter(|n| !n.trim().is_empty()) {
            next.append_note(notes.trim());
        }

        next.status = ResultStatus::Entered;
        next.entered_at = Some(at);
        next.entered_by = Some(actor.id);
        next.verified_at = None;
        next.verified_by = None;

        if settings.skip_verification() {
            next.status = ResultStatus::Verified;
            next.verified_at = Some(at);
        }

        *self = next;
        Ok(())
    }

    /// ENTERED → VERIFIED.
    pub fn verify(&mut self, actor: &Actor, at: DateTime<Utc>) -> LimsResult<()> {
        if self.status != ResultStatus::Entered {
            return Err(LimsError::invalid_transition("result", self.status, "verify"));
        }
        self.status = ResultStatus::Verified;
        self.verified_at = Some(at);
        self.verified_by = Some(actor.id);
        Ok(())
    }

    /// VERIFIED → PUBLISHED, or ENTERED → PUBLISHED when verification is disabled.
    pub fn publish(
        &mut self,
        actor: &Actor,
        at: DateTime<Utc>,
        settings: &WorkflowSettings,
    ) -> LimsResult<()> {
        let publishable = match self.status {
            ResultStatus::Verified => true,
            ResultStatus::Entered => settings.skip_verification(),
            ResultStatus::Draft | ResultStatus::Published => false,
        };
        if !publishable {
            return Err(LimsError::invalid_transition("result", self.status, "publish"));
        }
        self.status = ResultStatus::Published;
        self.published_at = Some(at);
        self.published_by = Some(actor.id);
        Ok(())
    }

    /// ENTERED | VERIFIED → DRAFT, recording why. Entry and verification stamps are
    /// cleared so the result must be re-entered.
    pub fn reject_to_draft(&mut self, reason: &str) -> LimsResult<()> {
        if !matches!(self.status, ResultStatus::Entered | ResultStatus::Verified) {
            return Err(LimsError::invalid_transition("result", self.status, "reject"));
        }
        let reason = NonEmptyText::new(reason)
            .map_err(|_| LimsError::InvalidArgument("rejection reason is required".into()))?;

        self.append_note(&format!("{RESULT_REJECTION_NOTE_PREFIX}{reason}"));
        self.status = ResultStatus::Draft;
        self.entered_at = None;
        self.entered_by = None;
        self.verified_at = None;
        self.verified_by = None;
        Ok(())
    }

    fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }
}

fn optional_text(value: Option<String>, max: usize, field: &str) -> LimsResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.chars().count() > max => Err(LimsError::InvalidArgument(format!(
            "{field} exceeds maximum length of {max} characters"
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Role;

    fn tech() -> Actor {
        Actor::new(UserId(4), "tech", Role::Technologist).unwrap()
    }

    fn pathologist() -> Actor {
        Actor::new(UserId(5), "path", Role::Pathologist).unwrap()
    }

    fn draft() -> LabResult {
        LabResult::draft(OrderId(1), OrderItemId(1), Utc::now())
    }

    #[test]
    fn full_forward_path() {
        let settings = WorkflowSettings::default();
        let mut result = draft();

        result
            .enter(
                ResultEntry::value("12.5").with_unit("g/dL"),
                &tech(),
                Utc::now(),
                &settings,
            )
            .expect("enter");
        assert_eq!(result.status, ResultStatus::Entered);
        assert_eq!(result.value, "12.5");
        assert_eq!(result.unit, "g/dL");

        result.verify(&pathologist(), Utc::now()).expect("verify");
        assert_eq!(result.verified_by, Some(UserId(5)));

        result
            .publish(&pathologist(), Utc::now(), &settings)
            .expect("publish");
        assert_eq!(result.status, ResultStatus::Published);
        assert!(result.published_at.is_some());
    }

    #[test]
    fn enter_rejects_blank_value_without_changing_anything() {
        let settings = WorkflowSettings::default();
        let mut result = draft();
        let before = result.clone();

        let err = result
            .enter(ResultEntry::value("  "), &tech(), Utc::now(), &settings)
            .expect_err("blank value");
        assert!(matches!(err, LimsError::InvalidArgument(_)));
        assert_eq!(result, before);
    }

    #[test]
    fn enter_is_atomic_when_unit_is_invalid() {
        let settings = WorkflowSettings::default();
        let mut result = draft();
        let before = result.clone();

        let err = result
            .enter(
                ResultEntry::value("12.5").with_unit("u".repeat(MAX_UNIT_LEN + 1)),
                &tech(),
                Utc::now(),
                &settings,
            )
            .expect_err("unit too long");
        assert!(matches!(err, LimsError::InvalidArgument(_)));
        assert_eq!(result, before);
    }

    #[test]
    fn verify_before_enter_is_an_invalid_transition() {
        let mut result = draft();
        assert!(matches!(
            result.verify(&pathologist(), Utc::now()),
            Err(LimsError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn publish_requires_verification_when_enabled() {
        let settings = WorkflowSettings::default();
        let mut result = draft();
        result
            .enter(ResultEntry::value("5"), &tech(), Utc::now(), &settings)
            .unwrap();
        assert!(matches!(
            result.publish(&pathologist(), Utc::now(), &settings),
            Err(LimsError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn skipped_verification_makes_entered_result_publishable() {
        let settings = WorkflowSettings {
            enable_verification: false,
            ..WorkflowSettings::default()
        };
        let mut result = draft();
        result
            .enter(ResultEntry::value("12.5"), &tech(), Utc::now(), &settings)
            .unwrap();
        assert_eq!(result.status, ResultStatus::Verified);
        assert!(result.verified_at.is_some());
        assert_eq!(result.verified_by, None);

        result
            .publish(&pathologist(), Utc::now(), &settings)
            .expect("publish without verify");

        let mut legacy = draft();
        legacy
            .enter(
                ResultEntry::value("1"),
                &tech(),
                Utc::now(),
                &WorkflowSettings::default(),
            )
            .unwrap();
        legacy
            .publish(&pathologist(), Utc::now(), &settings)
            .expect("entered result publishable once verification is off");
    }

    #[test]
    fn reject_returns_to_draft_and_allows_reentry() {
        let settings = WorkflowSettings::default();
        let mut result = draft();
        result
            .enter(ResultEntry::value("12.5"), &tech(), Utc::now(), &settings)
            .unwrap();
        let first_entry = result.entered_at.unwrap();
        result.verify(&pathologist(), Utc::now()).unwrap();

        result.reject_to_draft("transcription error").expect("reject");
        assert_eq!(result.status, ResultStatus::Draft);
        assert_eq!(result.notes, "Rejected: transcription error");
        assert!(result.entered_at.is_none());
        assert!(result.verified_at.is_none());

        result
            .enter(ResultEntry::value("13.1"), &tech(), Utc::now(), &settings)
            .expect("re-enter");
        assert_eq!(result.value, "13.1");
        assert!(result.entered_at.unwrap() >= first_entry);
    }

    #[test]
    fn published_and_draft_results_cannot_be_rejected() {
        let mut result = draft();
        assert!(matches!(
            result.reject_to_draft("why"),
            Err(LimsError::InvalidTransition { .. })
        ));

        let settings = WorkflowSettings::default();
        result
            .enter(ResultEntry::value("1"), &tech(), Utc::now(), &settings)
            .unwrap();
        assert!(matches!(
            result.reject_to_draft(""),
            Err(LimsError::InvalidArgument(_))
        ));
        result.verify(&pathologist(), Utc::now()).unwrap();
        result.publish(&pathologist(), Utc::now(), &settings).unwrap();
        assert!(result.reject_to_draft("late").is_err());
    }
}
