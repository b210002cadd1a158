//! Sample lifecycle.
//!
//! ```text
//!   PENDING ──collect──▶ COLLECTED ──receive──▶ RECEIVED
//!                            │                      │
//!                            └──────reject──────────┴──▶ REJECTED
//! ```
//!
//! REJECTED is terminal and there is no reverse edge. The transitions here are pure: they
//! check the current status, mutate the record and leave persistence and permission checks
//! to the caller.

use crate::actor::Actor;
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, OrderItemId, SampleId, UserId};
use crate::workflow::WorkflowSettings;
use chrono::{DateTime, Utc};
use lims_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleStatus {
    Pending,
    Collected,
    Received,
    Rejected,
}

impl SampleStatus {
    pub fn can_transition_to(&self, target: SampleStatus) -> bool {
        use SampleStatus::*;
        matches!(
            (self, target),
            (Pending, Collected) | (Collected, Received) | (Collected, Rejected) | (Received, Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SampleStatus::Rejected)
    }

    /// Whether the specimen has left the PENDING state.
    pub fn has_progressed(&self) -> bool {
        !matches!(self, SampleStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Pending => "PENDING",
            SampleStatus::Collected => "COLLECTED",
            SampleStatus::Received => "RECEIVED",
            SampleStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleStatus {
    type Err = LimsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SampleStatus::Pending),
            "COLLECTED" => Ok(SampleStatus::Collected),
            "RECEIVED" => Ok(SampleStatus::Received),
            "REJECTED" => Ok(SampleStatus::Rejected),
            other => Err(LimsError::InvalidArgument(format!(
                "unknown sample status '{other}'"
            ))),
        }
    }
}

/// The specimen collected for one order item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Sample {
    pub id: SampleId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub sample_type: String,
    pub barcode: String,
    pub status: SampleStatus,
    pub collected_at: Option<DateTime<Utc>>,
    pub collected_by: Option<UserId>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Sample {
    /// Build a new sample for an order item.
    ///
    /// Steps disabled in `settings` are applied immediately, at the point a collector
    /// would otherwise have been asked to perform them: with collection disabled the
    /// sample is born COLLECTED by `actor`, and with receive also disabled it is born
    /// RECEIVED.
    pub fn new(
        order_id: OrderId,
        order_item_id: OrderItemId,
        sample_type: String,
        barcode: String,
        actor: &Actor,
        at: DateTime<Utc>,
        settings: &WorkflowSettings,
    ) -> Self {
        let mut sample = Self {
            id: SampleId(0),
            order_id,
            order_item_id,
            sample_type,
            barcode,
            status: SampleStatus::Pending,
            collected_at: None,
            collected_by: None,
            received_at: None,
            received_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            created_at: at,
            version: 0,
        };

        if settings.skip_collection() {
            sample.mark_collected(actor, at);
            if settings.skip_receive() {
                sample.mark_received(actor, at);
            }
        }
        sample
    }

    /// PENDING → COLLECTED, chaining into RECEIVED when the receive step is disabled.
    pub fn collect(
        &mut self,
        actor: &Actor,
        at: DateTime<Utc>,
        settings: &WorkflowSettings,
    ) -> LimsResult<()> {
        self.ensure_can("collect", SampleStatus::Collected)?;
        self.mark_collected(actor, at);
        if settings.skip_receive() {
            self.mark_received(actor, at);
        }
        Ok(())
    }

    /// COLLECTED → RECEIVED.
    pub fn receive(&mut self, actor: &Actor, at: DateTime<Utc>) -> LimsResult<()> {
        self.ensure_can("receive", SampleStatus::Received)?;
        self.mark_received(actor, at);
        Ok(())
    }

    /// COLLECTED | RECEIVED → REJECTED. The reason must carry text.
    pub fn reject(&mut self, actor: &Actor, at: DateTime<Utc>, reason: &str) -> LimsResult<()> {
        self.ensure_can("reject", SampleStatus::Rejected)?;
        let reason = NonEmptyText::new(reason)
            .map_err(|_| LimsError::InvalidArgument("rejection reason is required".into()))?;

        self.status = SampleStatus::Rejected;
        self.rejected_at = Some(at);
        self.rejected_by = Some(actor.id);
        self.rejection_reason = Some(reason.into_inner());
        Ok(())
    }

    fn ensure_can(&self, attempted: &'static str, target: SampleStatus) -> LimsResult<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(LimsError::invalid_transition("sample", self.status, attempted))
        }
    }

    fn mark_collected(&mut self, actor: &Actor, at: DateTime<Utc>) {
        self.status = SampleStatus::Collected;
        self.collected_at = Some(at);
        self.collected_by = Some(actor.id);
    }

    fn mark_received(&mut self, actor: &Actor, at: DateTime<Utc>) {
        self.status = SampleStatus::Received;
        self.received_at = Some(at);
        self.received_by = Some(actor.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Role;

    fn phlebotomist() -> Actor {
        Actor::new(UserId(3), "phleb", Role::Phlebotomy).unwrap()
    }

    fn pending(settings: &WorkflowSettings) -> Sample {
        Sample::new(
            OrderId(1),
            OrderItemId(1),
            "Blood".into(),
            "SAM-20240101-0001".into(),
            &phlebotomist(),
            Utc::now(),
            settings,
        )
    }

    #[test]
    fn happy_path_moves_forward_only() {
        let settings = WorkflowSettings::default();
        let actor = phlebotomist();
        let mut sample = pending(&settings);
        assert_eq!(sample.status, SampleStatus::Pending);

        sample.collect(&actor, Utc::now(), &settings).expect("collect");
        assert_eq!(sample.status, SampleStatus::Collected);
        assert_eq!(sample.collected_by, Some(actor.id));

        sample.receive(&actor, Utc::now()).expect("receive");
        assert_eq!(sample.status, SampleStatus::Received);

        let err = sample
            .collect(&actor, Utc::now(), &settings)
            .expect_err("cannot collect a received sample");
        assert!(matches!(err, LimsError::InvalidTransition { .. }));
    }

    #[test]
    fn receive_requires_collected() {
        let settings = WorkflowSettings::default();
        let mut sample = pending(&settings);
        let err = sample
            .receive(&phlebotomist(), Utc::now())
            .expect_err("pending cannot be received");
        match err {
            LimsError::InvalidTransition {
                current, attempted, ..
            } => {
                assert_eq!(current, "PENDING");
                assert_eq!(attempted, "receive");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejected_is_terminal() {
        let settings = WorkflowSettings::default();
        let actor = phlebotomist();
        let mut sample = pending(&settings);
        sample.collect(&actor, Utc::now(), &settings).unwrap();
        sample.reject(&actor, Utc::now(), "haemolysed").expect("reject");

        assert_eq!(sample.status, SampleStatus::Rejected);
        assert_eq!(sample.rejection_reason.as_deref(), Some("haemolysed"));
        assert!(sample.status.is_terminal());
        assert!(sample.receive(&actor, Utc::now()).is_err());
        assert!(sample.reject(&actor, Utc::now(), "again").is_err());
    }

    #[test]
    fn reject_needs_reason_and_progressed_sample() {
        let settings = WorkflowSettings::default();
        let actor = phlebotomist();
        let mut sample = pending(&settings);

        assert!(matches!(
            sample.reject(&actor, Utc::now(), "clotted"),
            Err(LimsError::InvalidTransition { .. })
        ));

        sample.collect(&actor, Utc::now(), &settings).unwrap();
        assert!(matches!(
            sample.reject(&actor, Utc::now(), "   "),
            Err(LimsError::InvalidArgument(_))
        ));
        assert_eq!(sample.status, SampleStatus::Collected);
    }

    #[test]
    fn disabled_steps_auto_advance_at_creation_and_collect() {
        let actor = phlebotomist();
        let no_collection = WorkflowSettings {
            enable_sample_collection: false,
            ..WorkflowSettings::default()
        };
        assert_eq!(pending(&no_collection).status, SampleStatus::Collected);

        let neither = WorkflowSettings {
            enable_sample_collection: false,
            enable_sample_receive: false,
            ..WorkflowSettings::default()
        };
        let born_received = pending(&neither);
        assert_eq!(born_received.status, SampleStatus::Received);
        assert_eq!(born_received.received_by, Some(actor.id));

        let no_receive = WorkflowSettings {
            enable_sample_receive: false,
            ..WorkflowSettings::default()
        };
        let mut sample = pending(&no_receive);
        sample.collect(&actor, Utc::now(), &no_receive).unwrap();
        assert_eq!(sample.status, SampleStatus::Received);
    }

    #[test]
    fn transition_table_has_no_reverse_edges() {
        use SampleStatus::*;
        let all = [Pending, Collected, Received, Rejected];
        for from in all {
            for to in all {
                let rank = |s: SampleStatus| match s {
                    Pending => 0,
                    Collected => 1,
                    Received => 2,
                    Rejected => 3,
                };
                if from.can_transition_to(to) {
                    assert!(rank(to) > rank(from), "{from} -> {to}");
                }
            }
        }
    }
}
