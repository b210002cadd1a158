use super::{load_view, now, LabService};
use crate::actor::Actor;
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, ReportId};
use crate::lab_result::ResultStatus;
use crate::order::OrderView;
use crate::permissions::{authorize, ActionKind};
use crate::report::{can_generate_report, Report, ReportDocument, ReportLine, ReportOutcome};
use crate::sample::SampleStatus;
use crate::store::Store;
use chrono::{DateTime, Utc};

impl<S: Store> LabService<S> {
    /// Whether every item of the order has a PUBLISHED result and no sample was rejected.
    pub fn can_generate_report(&self, order_id: OrderId) -> LimsResult<bool> {
        let view = self.order_view(order_id)?;
        Ok(can_generate_report(&view.progress()))
    }

    /// Renders the order's report and records it.
    ///
    /// The document is built from a snapshot and rendered outside any transaction. The
    /// precondition is checked again when the report is recorded, so a report is never
    /// recorded from a stale check. Regenerating replaces the existing report record;
    /// `created` tells the two cases apart.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `GENERATE_REPORT`
    /// * `PreconditionFailed` unless every result is PUBLISHED and no sample was rejected
    /// * `Rendering` if the renderer fails; nothing is recorded in that case
    pub fn generate_report(&self, actor: &Actor, order_id: OrderId) -> LimsResult<ReportOutcome> {
        let document = self.store.read(|tx| {
            authorize(tx.permissions(), actor, ActionKind::GenerateReport)?;
            let view = load_view(tx, order_id)?;
            ensure_reportable(&view)?;

            Ok(ReportDocument {
                lab_name: self.cfg.lab_name().to_string(),
                order_no: view.order.order_no.clone(),
                patient: tx.patient(view.order.patient_id)?,
                generated_at: now(),
                generated_by: actor.username.to_string(),
                lines: report_lines(&view),
            })
        })?;

        let artifact = self.renderer.render(&document)?;
        let at = document.generated_at;

        let outcome = self.transact("generate_report", |tx| {
            authorize(tx.permissions(), actor, ActionKind::GenerateReport)?;
            ensure_reportable(&load_view(&*tx, order_id)?)?;

            match tx.report_for_order(order_id)? {
                Some(existing) => {
                    let report = tx.update_report(Report {
                        generated_at: at,
                        generated_by: actor.id,
                        artifact: artifact.clone(),
                        ..existing
                    })?;
                    Ok(ReportOutcome {
                        report,
                        created: false,
                    })
                }
                None => {
                    let report =
                        tx.insert_report(new_report(order_id, actor, at, artifact.clone()))?;
                    Ok(ReportOutcome {
                        report,
                        created: true,
                    })
                }
            }
        })?;

        tracing::info!(
            order_id = %order_id,
            report_id = %outcome.report.id,
            created = outcome.created,
            actor_id = %actor.id,
            "report generated"
        );
        Ok(outcome)
    }

    /// The recorded report of an order, if one was generated.
    pub fn report(&self, order_id: OrderId) -> LimsResult<Option<Report>> {
        self.store.read(|tx| {
            tx.order(order_id)?;
            tx.report_for_order(order_id)
        })
    }
}

fn ensure_reportable(view: &OrderView) -> LimsResult<()> {
    if view.order.is_cancelled() {
        return Err(LimsError::PreconditionFailed(format!(
            "order {} is cancelled",
            view.order.order_no
        )));
    }
    if let Some(sample) = view
        .items
        .iter()
        .filter_map(|i| i.sample.as_ref())
        .find(|s| s.status == SampleStatus::Rejected)
    {
        return Err(LimsError::PreconditionFailed(format!(
            "sample {} was rejected",
            sample.barcode
        )));
    }
    if !can_generate_report(&view.progress()) {
        let published = view
            .items
            .iter()
            .filter(|i| i.result.as_ref().is_some_and(|r| r.status == ResultStatus::Published))
            .count();
        return Err(LimsError::PreconditionFailed(format!(
            "{published} of {} results are published",
            view.items.len()
        )));
    }
    Ok(())
}

fn new_report(order_id: OrderId, actor: &Actor, at: DateTime<Utc>, artifact: String) -> Report {
    Report {
        id: ReportId(0),
        order_id,
        generated_at: at,
        generated_by: actor.id,
        artifact,
        version: 0,
    }
}

fn report_lines(view: &OrderView) -> Vec<ReportLine> {
    view.items
        .iter()
        .filter_map(|i| {
            let result = i.result.as_ref()?;
            Some(ReportLine {
                test_code: i.item.test_code.clone(),
                test_name: i.item.test_name.clone(),
                value: result.value.clone(),
                unit: result.unit.clone(),
                reference_range: result.reference_range.clone(),
                flags: result.flags.clone(),
                published_at: result.published_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::error::{LimsError, LimsResult};
    use crate::ids::{OrderItemId, ResultId};
    use crate::lab_result::ResultEntry;
    use crate::order::OrderStatus;
    use crate::permissions::Role;
    use crate::report::{Renderer, ReportDocument};
    use crate::services::testing::{actor, fixture, Fixture, CBC, LFT};
    use crate::services::LabService;
    use crate::store::InMemoryStore;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records, per call, whether the store's tables were locked while rendering.
    struct LockWatchingRenderer {
        store: Arc<InMemoryStore>,
        calls: Mutex<Vec<bool>>,
    }

    impl Renderer for LockWatchingRenderer {
        fn render(&self, document: &ReportDocument) -> LimsResult<String> {
            self.calls.lock().push(self.store.is_locked());
            Ok(format!("watched://report_{}", document.order_no))
        }
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&self, _: &ReportDocument) -> LimsResult<String> {
            Err(LimsError::Rendering("disk full".into()))
        }
    }

    fn verified_result(fx: &Fixture, item: OrderItemId, value: &str) -> ResultId {
        let phleb = actor(Role::Phlebotomy);
        let tech = actor(Role::Technologist);
        let sample = fx.service.create_sample(&phleb, item).unwrap();
        fx.service.collect_sample(&phleb, sample.id).unwrap();
        fx.service.receive_sample(&tech, sample.id).unwrap();
        let id = fx.service.create_result(&tech, item).unwrap().id;
        fx.service
            .enter_result(&tech, id, ResultEntry::value(value).with_unit("g/dL"))
            .unwrap();
        fx.service
            .verify_result(&actor(Role::Pathologist), id)
            .unwrap();
        id
    }

    #[test]
    fn happy_path_ends_in_a_published_report() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let path = actor(Role::Pathologist);
        let id = verified_result(&fx, view.items[0].item.id, "12.5");

        assert!(!fx.service.can_generate_report(view.order.id).unwrap());
        fx.service.publish_result(&path, id).unwrap();
        assert!(fx.service.can_generate_report(view.order.id).unwrap());

        let outcome = fx.service.generate_report(&path, view.order.id).unwrap();
        assert!(outcome.created);
        assert_eq!(
            outcome.report.artifact,
            format!("memory://report_{}", view.order.order_no)
        );
        assert_eq!(
            fx.service.order_view(view.order.id).unwrap().status,
            OrderStatus::Published
        );

        let rendered = fx.renderer.rendered();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].lines[0].value, "12.5");
        assert_eq!(rendered[0].lines[0].unit, "g/dL");
        assert_eq!(rendered[0].lab_name, "Test Lab");
    }

    #[test]
    fn precondition_flips_with_the_last_publication() {
        let fx = fixture();
        let view = fx.order(&[CBC, LFT]);
        let path = actor(Role::Pathologist);
        let first = verified_result(&fx, view.items[0].item.id, "12.5");
        let second = verified_result(&fx, view.items[1].item.id, "35");

        fx.service.publish_result(&path, first).unwrap();
        assert!(!fx.service.can_generate_report(view.order.id).unwrap());
        let err = fx
            .service
            .generate_report(&path, view.order.id)
            .expect_err("one result unpublished");
        assert!(matches!(err, LimsError::PreconditionFailed(_)));
        assert!(fx.renderer.rendered().is_empty());
        assert!(fx.service.report(view.order.id).unwrap().is_none());

        fx.service.publish_result(&path, second).unwrap();
        assert!(fx.service.can_generate_report(view.order.id).unwrap());
    }

    #[test]
    fn regeneration_replaces_the_record() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let path = actor(Role::Pathologist);
        let id = verified_result(&fx, view.items[0].item.id, "12.5");
        fx.service.publish_result(&path, id).unwrap();

        let first = fx.service.generate_report(&path, view.order.id).unwrap();
        let second = fx
            .service
            .generate_report(&actor(Role::Admin), view.order.id)
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.report.id, first.report.id);
        assert_eq!(second.report.version, first.report.version + 1);
        assert_eq!(second.report.generated_by, actor(Role::Admin).id);
    }

    #[test]
    fn technologist_cannot_generate() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        assert!(matches!(
            fx.service
                .generate_report(&actor(Role::Technologist), view.order.id),
            Err(LimsError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn rendering_happens_once_and_outside_the_store_lock() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let path = actor(Role::Pathologist);
        let id = verified_result(&fx, view.items[0].item.id, "12.5");
        fx.service.publish_result(&path, id).unwrap();

        let renderer = Arc::new(LockWatchingRenderer {
            store: Arc::clone(&fx.service.store),
            calls: Mutex::new(Vec::new()),
        });
        let service = LabService {
            renderer: renderer.clone(),
            ..fx.service.clone()
        };

        let outcome = service.generate_report(&path, view.order.id).unwrap();
        assert_eq!(
            outcome.report.artifact,
            format!("watched://report_{}", view.order.order_no)
        );
        assert_eq!(*renderer.calls.lock(), vec![false]);
    }

    #[test]
    fn failed_rendering_records_nothing() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let path = actor(Role::Pathologist);
        let id = verified_result(&fx, view.items[0].item.id, "12.5");
        fx.service.publish_result(&path, id).unwrap();

        let service = LabService {
            renderer: Arc::new(FailingRenderer),
            ..fx.service.clone()
        };
        assert!(matches!(
            service.generate_report(&path, view.order.id),
            Err(LimsError::Rendering(_))
        ));
        assert!(fx.service.report(view.order.id).unwrap().is_none());
        assert_eq!(
            fx.service.order_view(view.order.id).unwrap().status,
            OrderStatus::Published
        );
    }

    #[test]
    fn sample_rejected_after_publication_blocks_the_report() {
        let fx = fixture();
        let view = fx.order(&[CBC]);
        let path = actor(Role::Pathologist);
        let id = verified_result(&fx, view.items[0].item.id, "12.5");
        fx.service.publish_result(&path, id).unwrap();

        let sample = fx.service.order_view(view.order.id).unwrap().items[0]
            .sample
            .clone()
            .unwrap();
        fx.service
            .reject_sample(&actor(Role::Technologist), sample.id, "mislabelled")
            .unwrap();

        let err = fx
            .service
            .generate_report(&path, view.order.id)
            .expect_err("rejected sample");
        assert!(matches!(err, LimsError::PreconditionFailed(ref m) if m.contains("rejected")));
        assert!(fx.renderer.rendered().is_empty());
    }
}
