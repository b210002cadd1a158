use super::{ensure_order_open, now, LabService};
use crate::actor::Actor;
use crate::constants::BARCODE_PREFIX;
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderItemId, SampleId};
use crate::numbering::daily_number;
use crate::order::OrderItem;
use crate::permissions::{authorize, ActionKind};
use crate::sample::{Sample, SampleStatus};
use crate::store::{Store, Transaction};
use crate::workflow::WorkflowSettings;
use chrono::{DateTime, Utc};

impl<S: Store> LabService<S> {
    /// Creates the sample of an order item and assigns its barcode.
    ///
    /// Only needed while collection is enabled; otherwise the sample is opened with its
    /// order item. Disabled collection or receive steps are applied here, so the returned
    /// sample may already be COLLECTED or RECEIVED.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `COLLECT_SAMPLE`
    /// * `NotFound` for an unknown item
    /// * `InvalidTransition` if the order is cancelled
    /// * `PreconditionFailed` if the item already has a sample
    pub fn create_sample(&self, actor: &Actor, item_id: OrderItemId) -> LimsResult<Sample> {
        let sample = self.transact("create_sample", |tx| {
            authorize(tx.permissions(), actor, ActionKind::CollectSample)?;
            let item = tx.order_item(item_id)?;
            ensure_order_open(&tx.order(item.order_id)?, "create sample")?;
            if let Some(existing) = tx.sample_for_item(item_id)? {
                return Err(LimsError::PreconditionFailed(format!(
                    "order item {item_id} already has sample {}",
                    existing.barcode
                )));
            }

            let settings = self.settings(&*tx)?;
            let sample_type = self.catalog.test(item.test_id)?.sample_type;
            open_sample(tx, &item, sample_type, actor, now(), &settings)
        })?;

        tracing::info!(
            sample_id = %sample.id,
            barcode = %sample.barcode,
            status = %sample.status,
            actor_id = %actor.id,
            "sample created"
        );
        Ok(sample)
    }

    /// PENDING → COLLECTED (→ RECEIVED when receive is disabled).
    pub fn collect_sample(&self, actor: &Actor, id: SampleId) -> LimsResult<Sample> {
        self.sample_transition(actor, id, ActionKind::CollectSample, "collect", |s, settings| {
            s.collect(actor, now(), settings)
        })
    }

    /// COLLECTED → RECEIVED.
    pub fn receive_sample(&self, actor: &Actor, id: SampleId) -> LimsResult<Sample> {
        self.sample_transition(actor, id, ActionKind::ReceiveSample, "receive", |s, _| {
            s.receive(actor, now())
        })
    }

    /// COLLECTED | RECEIVED → REJECTED with a mandatory reason.
    pub fn reject_sample(&self, actor: &Actor, id: SampleId, reason: &str) -> LimsResult<Sample> {
        self.sample_transition(actor, id, ActionKind::RejectSample, "reject", |s, _| {
            s.reject(actor, now(), reason)
        })
    }

    pub fn sample(&self, id: SampleId) -> LimsResult<Sample> {
        self.store.read(|tx| tx.sample(id))
    }

    /// Samples currently in `status`, oldest first.
    pub fn worklist_samples(&self, status: SampleStatus) -> LimsResult<Vec<Sample>> {
        self.store.read(|tx| tx.samples_with_status(status))
    }

    fn sample_transition<F>(
        &self,
        actor: &Actor,
        id: SampleId,
        action: ActionKind,
        verb: &'static str,
        apply: F,
    ) -> LimsResult<Sample>
    where
        F: Fn(&mut Sample, &WorkflowSettings) -> LimsResult<()>,
    {
        let sample = self.transact(verb, |tx| {
            authorize(tx.permissions(), actor, action)?;
            let mut sample = tx.sample(id)?;
            ensure_order_open(&tx.order(sample.order_id)?, verb)?;
            let settings = self.settings(&*tx)?;
            apply(&mut sample, &settings)?;
            tx.update_sample(sample)
        })?;

        tracing::info!(
            sample_id = %sample.id,
            status = %sample.status,
            action = %action,
            actor_id = %actor.id,
            "sample transition applied"
        );
        Ok(sample)
    }
}

/// Assigns the next barcode and inserts the item's sample, advanced past disabled steps.
pub(super) fn open_sample(
    tx: &mut dyn Transaction,
    item: &OrderItem,
    sample_type: String,
    actor: &Actor,
    at: DateTime<Utc>,
    settings: &WorkflowSettings,
) -> LimsResult<Sample> {
    let sequence = tx.next_sequence(BARCODE_PREFIX, at.date_naive())?;
    tx.insert_sample(Sample::new(
        item.order_id,
        item.id,
        sample_type,
        daily_number(BARCODE_PREFIX, at.date_naive(), sequence),
        actor,
        at,
        settings,
    ))
}
