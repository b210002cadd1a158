use super::{ensure_order_open, now, LabService};
use crate::actor::Actor;
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderItemId, ResultId};
use crate::lab_result::{LabResult, ResultEntry, ResultStatus};
use crate::permissions::{authorize, ActionKind};
use crate::sample::SampleStatus;
use crate::store::Store;
use crate::workflow::WorkflowSettings;

impl<S: Store> LabService<S> {
    /// Opens a DRAFT result for an order item whose sample has been received.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `ENTER_RESULT`
    /// * `InvalidTransition` if the order is cancelled
    /// * `PreconditionFailed` if the item has no received sample or already has a result
    pub fn create_result(&self, actor: &Actor, item_id: OrderItemId) -> LimsResult<LabResult> {
        let result = self.transact("create_result", |tx| {
            authorize(tx.permissions(), actor, ActionKind::EnterResult)?;
            let item = tx.order_item(item_id)?;
            ensure_order_open(&tx.order(item.order_id)?, "create result")?;

            match tx.sample_for_item(item_id)? {
                Some(sample) if sample.status == SampleStatus::Received => {}
                Some(sample) => {
                    return Err(LimsError::PreconditionFailed(format!(
                        "sample {} is {}; results need a RECEIVED sample",
                        sample.barcode, sample.status
                    )))
                }
                None => {
                    return Err(LimsError::PreconditionFailed(format!(
                        "order item {item_id} has no sample"
                    )))
                }
            }
            if tx.result_for_item(item_id)?.is_some() {
                return Err(LimsError::PreconditionFailed(format!(
                    "order item {item_id} already has a result"
                )));
            }

            tx.insert_result(LabResult::draft(item.order_id, item.id, now()))
        })?;

        tracing::info!(result_id = %result.id, order_item_id = %item_id, actor_id = %actor.id, "result opened");
        Ok(result)
    }

    /// DRAFT → ENTERED, or straight to VERIFIED when verification is disabled.
    pub fn enter_result(
        &self,
        actor: &Actor,
        id: ResultId,
        entry: ResultEntry,
    ) -> LimsResult<LabResult> {
        self.result_transition(actor, id, ActionKind::EnterResult, "enter", |r, settings| {
            r.enter(entry.clone(), actor, now(), settings)
        })
    }

    /// ENTERED → VERIFIED.
    pub fn verify_result(&self, actor: &Actor, id: ResultId) -> LimsResult<LabResult> {
        self.result_transition(actor, id, ActionKind::VerifyResult, "verify", |r, _| {
            r.verify(actor, now())
        })
    }

    /// VERIFIED → PUBLISHED (ENTERED → PUBLISHED when verification is disabled).
    pub fn publish_result(&self, actor: &Actor, id: ResultId) -> LimsResult<LabResult> {
        self.result_transition(actor, id, ActionKind::PublishResult, "publish", |r, settings| {
            r.publish(actor, now(), settings)
        })
    }

    /// ENTERED | VERIFIED → DRAFT. Gated like verification.
    ///
    /// Like every result transition, this fails with `InvalidTransition` on entity
    /// `sample` once the item's sample has been rejected.
    pub fn reject_result(&self, actor: &Actor, id: ResultId, reason: &str) -> LimsResult<LabResult> {
        self.result_transition(actor, id, ActionKind::VerifyResult, "reject", |r, _| {
            r.reject_to_draft(reason)
        })
    }

    pub fn result(&self, id: ResultId) -> LimsResult<LabResult> {
        self.store.read(|tx| tx.result(id))
    }

    /// Results currently in `status`, oldest first.
    pub fn worklist_results(&self, status: ResultStatus) -> LimsResult<Vec<LabResult>> {
        self.store.read(|tx| tx.results_with_status(status))
    }

    fn result_transition<F>(
        &self,
        actor: &Actor,
        id: ResultId,
        action: ActionKind,
        verb: &'static str,
        apply: F,
    ) -> LimsResult<LabResult>
    where
        F: Fn(&mut LabResult, &WorkflowSettings) -> LimsResult<()>,
    {
        let result = self.transact(verb, |tx| {
            authorize(tx.permissions(), actor, action)?;
            let mut result = tx.result(id)?;
            ensure_order_open(&tx.order(result.order_id)?, verb)?;
            // A rejected specimen freezes its result.
            if let Some(sample) = tx.sample_for_item(result.order_item_id)? {
                if sample.status == SampleStatus::Rejected {
                    return Err(LimsError::invalid_transition("sample", sample.status, verb));
                }
            }
            let settings = self.settings(&*tx)?;
            apply(&mut result, &settings)?;
            tx.update_result(result)
        })?;

        tracing::info!(
            result_id = %result.id,
            status = %result.status,
            action = %action,
            actor_id = %actor.id,
            "result transition applied"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LimsError;
    use crate::ids::ResultId;
    use crate::lab_result::{ResultEntry, ResultStatus};
    use crate::order::OrderStatus;
    use crate::permissions::Role;
    use crate::sample::SampleStatus;
    use crate::services::testing::{actor, fixture, fixture_with, Fixture, CBC, LFT};
    use crate::workflow::WorkflowSettings;

    /// Takes an item's sample through to RECEIVED and opens its result.
    fn draft_result(fx: &Fixture, item: crate::ids::OrderItemId) -> ResultId {
        let phleb = actor(Role::Phlebotomy);
        let sample = fx.service.create_sample(&phleb, item).unwrap();
        fx.service.collect_sample(&phleb, sample.id).unwrap();
        fx.service
            .receive_sample(&actor(Role::Technologist), sample.id)
            .unwrap();
        fx.service
            .create_result(&actor(Role::Technologist), item)
            .unwrap()
            .id
    }

    #[test]
    fn result_needs_a_received_sample() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let item = view.items[0].item.id;
        let tech = actor(Role::Technologist);

        assert!(matches!(
            fx.service.create_result(&tech, item),
            Err(LimsError::PreconditionFailed(_))
        ));
        let sample = fx
            .service
            .create_sample(&actor(Role::Phlebotomy), item)
            .unwrap();
        fx.service
            .collect_sample(&actor(Role::Phlebotomy), sample.id)
            .unwrap();
        assert!(matches!(
            fx.service.create_result(&tech, item),
            Err(LimsError::PreconditionFailed(_))
        ));
        fx.service.receive_sample(&tech, sample.id).unwrap();
        let result = fx.service.create_result(&tech, item).unwrap();
        assert_eq!(result.status, ResultStatus::Draft);
        assert!(matches!(
            fx.service.create_result(&tech, item),
            Err(LimsError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn verify_before_enter_is_an_invalid_transition() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let id = draft_result(&fx, view.items[0].item.id);
        assert!(matches!(
            fx.service.verify_result(&actor(Role::Pathologist), id),
            Err(LimsError::InvalidTransition { entity: "result", .. })
        ));
    }

    #[test]
    fn reception_cannot_verify_whatever_the_status() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let id = draft_result(&fx, view.items[0].item.id);
        let reception = actor(Role::Reception);

        assert!(matches!(
            fx.service.verify_result(&reception, id),
            Err(LimsError::PermissionDenied { .. })
        ));
        fx.service
            .enter_result(&actor(Role::Technologist), id, ResultEntry::value("12.5"))
            .unwrap();
        assert!(matches!(
            fx.service.verify_result(&reception, id),
            Err(LimsError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn reject_round_trip_accepts_new_value() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let id = draft_result(&fx, view.items[0].item.id);
        let tech = actor(Role::Technologist);
        let path = actor(Role::Pathologist);

        let first = fx
            .service
            .enter_result(&tech, id, ResultEntry::value("12.5"))
            .unwrap();
        let rejected = fx
            .service
            .reject_result(&path, id, "haemolysed")
            .unwrap();
        assert_eq!(rejected.status, ResultStatus::Draft);
        assert!(rejected.entered_at.is_none());
        assert!(rejected.notes.contains("Rejected: haemolysed"));

        let second = fx
            .service
            .enter_result(&tech, id, ResultEntry::value("13.1"))
            .unwrap();
        assert_eq!(second.status, ResultStatus::Entered);
        assert_eq!(second.value, "13.1");
        assert!(second.entered_at >= first.entered_at);

        assert!(matches!(
            fx.service.reject_result(&tech, id, "not mine to reject"),
            Err(LimsError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn empty_value_leaves_result_untouched() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let id = draft_result(&fx, view.items[0].item.id);

        let err = fx
            .service
            .enter_result(
                &actor(Role::Technologist),
                id,
                ResultEntry::value("  ").with_unit("g/dL"),
            )
            .expect_err("empty value");
        assert!(matches!(err, LimsError::InvalidArgument(_)));

        let stored = fx.service.result(id).unwrap();
        assert_eq!(stored.status, ResultStatus::Draft);
        assert_eq!(stored.unit, "");
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn verification_bypass_makes_entered_result_publishable() {
        let fx = fixture_with(WorkflowSettings {
            enable_verification: false,
            ..WorkflowSettings::default()
        });
        let view = fx.order(&[CBC]);
        let id = draft_result(&fx, view.items[0].item.id);

        let entered = fx
            .service
            .enter_result(&actor(Role::Technologist), id, ResultEntry::value("12.5"))
            .unwrap();
        assert_eq!(entered.status, ResultStatus::Verified);
        assert!(entered.verified_by.is_none());

        let published = fx
            .service
            .publish_result(&actor(Role::Pathologist), id)
            .unwrap();
        assert_eq!(published.status, ResultStatus::Published);
    }

    #[test]
    fn order_rolls_up_through_processing() {
        let fx = fixture();
        let view = fx.order(&[CBC, LFT]);
        let tech = actor(Role::Technologist);
        let path = actor(Role::Pathologist);
        let ids: Vec<ResultId> = view
            .items
            .iter()
            .map(|i| draft_result(&fx, i.item.id))
            .collect();
        let status = || fx.service.order_view(view.order.id).unwrap().status;

        assert_eq!(status(), OrderStatus::Collected);
        fx.service
            .enter_result(&tech, ids[0], ResultEntry::value("12.5"))
            .unwrap();
        assert_eq!(status(), OrderStatus::InProcess);
        fx.service
            .enter_result(&tech, ids[1], ResultEntry::value("40"))
            .unwrap();
        fx.service.verify_result(&path, ids[0]).unwrap();
        assert_eq!(status(), OrderStatus::InProcess);
        fx.service.verify_result(&path, ids[1]).unwrap();
        assert_eq!(status(), OrderStatus::Verified);
        fx.service.publish_result(&path, ids[0]).unwrap();
        assert_eq!(status(), OrderStatus::Verified);
        fx.service.publish_result(&path, ids[1]).unwrap();
        assert_eq!(status(), OrderStatus::Published);
        assert_eq!(
            fx.service
                .worklist_results(ResultStatus::Published)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn rejected_specimen_freezes_its_result() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let item = view.items[0].item.id;
        let id = draft_result(&fx, item);
        let tech = actor(Role::Technologist);
        let path = actor(Role::Pathologist);
        fx.service
            .enter_result(&tech, id, ResultEntry::value("12.5"))
            .unwrap();

        let sample = fx.service.order_view(view.order.id).unwrap().items[0]
            .sample
            .clone()
            .unwrap();
        fx.service
            .reject_sample(&tech, sample.id, "haemolysed")
            .unwrap();

        assert!(matches!(
            fx.service.verify_result(&path, id),
            Err(LimsError::InvalidTransition { entity: "sample", ref current, .. })
                if current == "REJECTED"
        ));
        assert!(matches!(
            fx.service.publish_result(&path, id),
            Err(LimsError::InvalidTransition { entity: "sample", .. })
        ));
        assert!(matches!(
            fx.service.reject_result(&path, id, "redo"),
            Err(LimsError::InvalidTransition { entity: "sample", .. })
        ));
        assert_eq!(fx.service.result(id).unwrap().status, ResultStatus::Entered);
        assert_eq!(
            fx.service.sample(sample.id).unwrap().status,
            SampleStatus::Rejected
        );

        assert!(!fx.service.can_generate_report(view.order.id).unwrap());
        assert!(matches!(
            fx.service.generate_report(&path, view.order.id),
            Err(LimsError::PreconditionFailed(_))
        ));
        assert_ne!(
            fx.service.order_view(view.order.id).unwrap().status,
            OrderStatus::Published
        );
    }

    #[test]
    fn draft_result_of_rejected_specimen_cannot_be_entered() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let item = view.items[0].item.id;
        let id = draft_result(&fx, item);
        let tech = actor(Role::Technologist);

        let sample = fx.service.order_view(view.order.id).unwrap().items[0]
            .sample
            .clone()
            .unwrap();
        fx.service
            .reject_sample(&tech, sample.id, "clotted")
            .unwrap();

        assert!(matches!(
            fx.service.enter_result(&tech, id, ResultEntry::value("12.5")),
            Err(LimsError::InvalidTransition { entity: "sample", .. })
        ));
        assert_eq!(fx.service.result(id).unwrap().status, ResultStatus::Draft);
    }
}
