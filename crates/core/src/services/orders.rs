use super::samples::open_sample;
use super::{load_view, now, LabService};
use crate::actor::Actor;
use crate::catalog::TestDefinition;
use crate::constants::ORDER_NO_PREFIX;
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, OrderItemId, PatientId, TestId};
use crate::lab_result::LabResult;
use crate::numbering::daily_number;
use crate::order::{
    ensure_unique, validate_billing, NewOrder, Order, OrderItem, OrderStatus, OrderView, TestEdit,
};
use crate::permissions::{authorize, ActionKind};
use crate::sample::SampleStatus;
use crate::store::{Store, Transaction};
use crate::workflow::WorkflowSettings;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

impl<S: Store> LabService<S> {
    /// Creates an order with one item per requested test.
    ///
    /// Item prices are copied from the catalog and summed into `bill_amount`. While sample
    /// collection is enabled, samples are created later by [`LabService::create_sample`].
    /// With collection disabled every item gets its sample here, already COLLECTED (or
    /// RECEIVED with a DRAFT result when receive is disabled too).
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `CREATE_ORDER`
    /// * `NotFound` for an unknown patient or test
    /// * `InvalidArgument` for an empty or repeated test list, an inactive test, or
    ///   billing amounts that do not add up
    pub fn create_order(&self, actor: &Actor, payload: NewOrder) -> LimsResult<OrderView> {
        let view = self.transact("create_order", |tx| {
            authorize(tx.permissions(), actor, ActionKind::CreateOrder)?;
            tx.patient(payload.patient_id)?;

            if payload.test_ids.is_empty() {
                return Err(LimsError::InvalidArgument(
                    "order must include at least one test".into(),
                ));
            }
            ensure_unique(&payload.test_ids, "test_ids")?;
            let tests = self.orderable_tests(&payload.test_ids)?;
            let bill_amount = tests.iter().map(|t| t.price).sum::<Decimal>();
            validate_billing(bill_amount, payload.discount, payload.amount_paid)?;

            let settings = self.settings(&*tx)?;
            let at = now();
            let sequence = tx.next_sequence(ORDER_NO_PREFIX, at.date_naive())?;
            let order = tx.insert_order(Order {
                id: OrderId(0),
                order_no: daily_number(ORDER_NO_PREFIX, at.date_naive(), sequence),
                patient_id: payload.patient_id,
                priority: payload.priority,
                notes: payload.notes.trim().to_string(),
                bill_amount,
                discount: payload.discount,
                amount_paid: payload.amount_paid,
                created_by: actor.id,
                created_at: at,
                cancelled_at: None,
                cancelled_by: None,
                version: 0,
            })?;
            insert_items(tx, order.id, &tests, actor, at, &settings)?;

            load_view(&*tx, order.id)
        })?;

        tracing::info!(
            order_id = %view.order.id,
            order_no = %view.order.order_no,
            items = view.items.len(),
            actor_id = %actor.id,
            "order created"
        );
        Ok(view)
    }

    pub fn order_view(&self, id: OrderId) -> LimsResult<OrderView> {
        self.store.read(|tx| load_view(tx, id))
    }

    /// Orders of one patient, newest first.
    pub fn orders_for_patient(&self, patient_id: PatientId) -> LimsResult<Vec<OrderView>> {
        self.store.read(|tx| {
            tx.patient(patient_id)?;
            let mut views = tx
                .orders_for_patient(patient_id)?
                .into_iter()
                .map(|order| load_view(tx, order.id))
                .collect::<LimsResult<Vec<_>>>()?;
            views.sort_by(|a, b| b.order.id.cmp(&a.order.id));
            Ok(views)
        })
    }

    /// Cancels an order that has not progressed.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `CANCEL_ORDER`
    /// * `InvalidTransition` if the order is already cancelled
    /// * `PreconditionFailed` if any sample has left PENDING or the order is past NEW
    pub fn cancel_order(&self, actor: &Actor, id: OrderId) -> LimsResult<OrderView> {
        let view = self.transact("cancel_order", |tx| {
            authorize(tx.permissions(), actor, ActionKind::CancelOrder)?;
            let view = load_view(&*tx, id)?;

            if view.order.is_cancelled() {
                return Err(LimsError::invalid_transition(
                    "order",
                    OrderStatus::Cancelled,
                    "cancel",
                ));
            }
            if let Some(sample) = view
                .items
                .iter()
                .filter_map(|i| i.sample.as_ref())
                .find(|s| s.status != SampleStatus::Pending)
            {
                return Err(LimsError::PreconditionFailed(format!(
                    "sample {} is already {}",
                    sample.barcode, sample.status
                )));
            }
            if view.status != OrderStatus::New {
                return Err(LimsError::PreconditionFailed(format!(
                    "order is {}; only NEW orders can be cancelled",
                    view.status
                )));
            }

            let mut order = view.order;
            order.cancelled_at = Some(now());
            order.cancelled_by = Some(actor.id);
            tx.update_order(order)?;
            load_view(&*tx, id)
        })?;

        tracing::info!(order_id = %id, actor_id = %actor.id, "order cancelled");
        Ok(view)
    }

    /// Adds and removes tests on an order no sample or result has touched yet, and
    /// re-prices it.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `EDIT_ORDER_TESTS`
    /// * `InvalidTransition` if the order is cancelled
    /// * `PreconditionFailed` if any item already has a sample or a result
    /// * `InvalidArgument` for an empty edit, a test added twice or already present, a
    ///   test removed that is not on the order, removing every test, or a discount that
    ///   would exceed the new bill
    /// * `NotFound` for a test unknown to the catalog
    pub fn edit_tests(&self, actor: &Actor, id: OrderId, edit: TestEdit) -> LimsResult<OrderView> {
        let view = self.transact("edit_tests", |tx| {
            authorize(tx.permissions(), actor, ActionKind::EditOrderTests)?;
            let view = load_view(&*tx, id)?;

            if view.order.is_cancelled() {
                return Err(LimsError::invalid_transition(
                    "order",
                    OrderStatus::Cancelled,
                    "edit tests",
                ));
            }
            if view
                .items
                .iter()
                .any(|i| i.sample.is_some() || i.result.is_some())
            {
                return Err(LimsError::PreconditionFailed(
                    "tests cannot be edited once samples or results exist".into(),
                ));
            }

            let current: Vec<TestId> = view.items.iter().map(|i| i.item.test_id).collect();
            edit.validate(&current)?;
            let added = self.orderable_tests(&edit.tests_to_add)?;

            for item in view
                .items
                .iter()
                .filter(|i| edit.tests_to_remove.contains(&i.item.test_id))
            {
                tx.delete_order_item(item.item.id)?;
            }
            let settings = self.settings(&*tx)?;
            insert_items(tx, id, &added, actor, now(), &settings)?;

            let mut order = view.order;
            order.reprice(&tx.order_items(id)?)?;
            tx.update_order(order)?;
            load_view(&*tx, id)
        })?;

        tracing::info!(
            order_id = %id,
            added = edit.tests_to_add.len(),
            removed = edit.tests_to_remove.len(),
            bill_amount = %view.order.bill_amount,
            actor_id = %actor.id,
            "order tests edited"
        );
        Ok(view)
    }

    /// Looks up tests for ordering; every one must exist and be active.
    fn orderable_tests(&self, ids: &[TestId]) -> LimsResult<Vec<TestDefinition>> {
        ids.iter()
            .map(|id| {
                let test = self.catalog.test(*id)?;
                if !test.is_active {
                    return Err(LimsError::InvalidArgument(format!(
                        "test {} is not active",
                        test.code
                    )));
                }
                Ok(test)
            })
            .collect()
    }
}

/// Inserts one item per test, opening samples and results for the skipped steps.
fn insert_items(
    tx: &mut dyn Transaction,
    order_id: OrderId,
    tests: &[TestDefinition],
    actor: &Actor,
    at: DateTime<Utc>,
    settings: &WorkflowSettings,
) -> LimsResult<()> {
    for test in tests {
        let item = tx.insert_order_item(OrderItem {
            id: OrderItemId(0),
            order_id,
            test_id: test.id,
            test_code: test.code.clone(),
            test_name: test.name.clone(),
            price: test.price,
            created_at: at,
        })?;
        if !settings.skip_collection() {
            continue;
        }

        let sample = open_sample(tx, &item, test.sample_type.clone(), actor, at, settings)?;
        if sample.status == SampleStatus::Received {
            tx.insert_result(LabResult::draft(order_id, item.id, at))?;
        }
    }
    Ok(())
}
