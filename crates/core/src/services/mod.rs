//! Workflow services.
//!
//! [`LabService`] is the single entry point for every lifecycle operation. Each mutating
//! operation follows the same shape inside one store transaction:
//!
//! 1. authorize the actor for the [`ActionKind`](crate::permissions::ActionKind),
//! 2. load the records and the current [`WorkflowSettings`],
//! 3. apply the pure transition from the entity module,
//! 4. write back with the version that was read.
//!
//! A version conflict from the store aborts the transaction and the operation is re-run
//! from step 1, at most [`MAX_CONFLICT_RETRIES`] times. A re-run sees the winner's write,
//! so a losing transition normally fails with `InvalidTransition` on its second attempt.
//!
//! Report generation calls the renderer between a read and a short recording transaction,
//! so no store lock is held while rendering.
//!
//! Operations are grouped by area in the submodules; they all extend `LabService`.

mod admin;
mod orders;
mod patients;
mod reports;
mod results;
mod samples;

use crate::catalog::Catalog;
use crate::config::CoreConfig;
use crate::constants::MAX_CONFLICT_RETRIES;
use crate::error::{LimsError, LimsResult};
use crate::ids::OrderId;
use crate::order::{Order, OrderView};
use crate::report::Renderer;
use crate::store::{Store, Transaction};
use crate::workflow::WorkflowSettings;
use chrono::{DateTime, Utc};
use std::sync::Arc;

// ============================================================================
// LAB SERVICE
// ============================================================================

/// Service running the order, sample, result and report lifecycles.
///
/// Cheap to clone; all collaborators are shared.
pub struct LabService<S> {
    store: Arc<S>,
    catalog: Arc<dyn Catalog>,
    renderer: Arc<dyn Renderer>,
    cfg: Arc<CoreConfig>,
}

impl<S> Clone for LabService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            renderer: Arc::clone(&self.renderer),
            cfg: Arc::clone(&self.cfg),
        }
    }
}

impl<S: Store> LabService<S> {
    /// Creates a service over the given collaborators.
    ///
    /// # Arguments
    ///
    /// * `store` - Transactional record store
    /// * `catalog` - Source of test definitions and prices
    /// * `renderer` - Produces report artifacts
    /// * `cfg` - Core configuration resolved at startup
    pub fn new(
        store: Arc<S>,
        catalog: Arc<dyn Catalog>,
        renderer: Arc<dyn Renderer>,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            catalog,
            renderer,
            cfg,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Runs `op` in a transaction, re-running it when the store reports a version
    /// conflict.
    fn transact<T, F>(&self, operation: &'static str, op: F) -> LimsResult<T>
    where
        F: Fn(&mut dyn Transaction) -> LimsResult<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.transaction(|tx| op(tx)) {
                Err(LimsError::Conflict { entity, id }) if attempt <= MAX_CONFLICT_RETRIES => {
                    tracing::debug!(operation, entity, %id, attempt, "retrying after conflict");
                }
                other => return other,
            }
        }
    }

    /// The settings in force for this transaction.
    fn settings(&self, tx: &dyn Transaction) -> LimsResult<WorkflowSettings> {
        Ok(tx
            .workflow_settings()?
            .unwrap_or_else(|| self.cfg.initial_workflow()))
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Loads an order with its items, samples and results.
fn load_view(tx: &dyn Transaction, order_id: OrderId) -> LimsResult<OrderView> {
    let order = tx.order(order_id)?;
    let mut items = Vec::new();
    for item in tx.order_items(order_id)? {
        let sample = tx.sample_for_item(item.id)?;
        let result = tx.result_for_item(item.id)?;
        items.push((item, sample, result));
    }
    Ok(OrderView::assemble(order, items))
}

/// Fails once an order is cancelled; no sample or result of it may move afterwards.
fn ensure_order_open(order: &Order, attempted: &'static str) -> LimsResult<()> {
    if order.is_cancelled() {
        return Err(LimsError::invalid_transition(
            "order",
            crate::order::OrderStatus::Cancelled,
            attempted,
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::actor::Actor;
    use crate::catalog::{InMemoryCatalog, TestDefinitionInput};
    use crate::ids::{PatientId, TestId, UserId};
    use crate::order::NewOrder;
    use crate::patient::{NewPatient, Sex};
    use crate::permissions::Role;
    use crate::report::MemoryRenderer;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    pub const CBC: TestId = TestId(1);
    pub const LFT: TestId = TestId(2);
    pub const TSH: TestId = TestId(3);

    pub struct Fixture {
        pub service: LabService<InMemoryStore>,
        pub renderer: Arc<MemoryRenderer>,
    }

    pub fn actor(role: Role) -> Actor {
        let id = match role {
            Role::Admin => 1,
            Role::Reception => 2,
            Role::Phlebotomy => 3,
            Role::Technologist => 4,
            Role::Pathologist => 5,
        };
        Actor::new(UserId(id), role.as_str().to_ascii_lowercase(), role).unwrap()
    }

    fn test_input(code: &str, name: &str, price: rust_decimal::Decimal) -> TestDefinitionInput {
        TestDefinitionInput {
            code: code.into(),
            name: name.into(),
            sample_type: "Blood".into(),
            price,
            turnaround_time_hours: 24,
            is_active: true,
        }
    }

    pub fn fixture() -> Fixture {
        fixture_with(WorkflowSettings::default())
    }

    pub fn fixture_with(settings: WorkflowSettings) -> Fixture {
        let catalog = InMemoryCatalog::new()
            .with_test(test_input("CBC", "Complete Blood Count", dec!(500)))
            .and_then(|c| c.with_test(test_input("LFT", "Liver Function Tests", dec!(1200))))
            .and_then(|c| c.with_test(test_input("TSH", "Thyroid Stimulating Hormone", dec!(800))))
            .unwrap();
        let renderer = Arc::new(MemoryRenderer::new());
        let cfg = CoreConfig::new(
            lims_types::NonEmptyText::new("Test Lab").unwrap(),
            settings,
        );
        let service = LabService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(catalog),
            renderer.clone(),
            Arc::new(cfg),
        );
        Fixture { service, renderer }
    }

    impl Fixture {
        pub fn patient(&self) -> PatientId {
            let registered = self.service.patients().unwrap().len();
            self.service
                .register_patient(
                    &actor(Role::Reception),
                    NewPatient {
                        full_name: "Ayesha Khan".into(),
                        father_name: "Imran Khan".into(),
                        dob: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
                        sex: Sex::Female,
                        phone: "03001234567".into(),
                        cnic: format!("35202-{:07}-1", 1_234_500 + registered),
                        address: String::new(),
                    },
                )
                .unwrap()
                .id
        }

        pub fn order(&self, tests: &[TestId]) -> OrderView {
            let patient_id = self.patient();
            self.service
                .create_order(
                    &actor(Role::Reception),
                    NewOrder {
                        patient_id,
                        test_ids: tests.to_vec(),
                        priority: Default::default(),
                        notes: String::new(),
                        discount: dec!(0),
                        amount_paid: dec!(0),
                    },
                )
                .unwrap()
        }
    }
}
