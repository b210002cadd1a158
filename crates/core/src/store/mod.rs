//! Persistence boundary.
//!
//! Every workflow operation runs its read-check-write inside one [`Store::transaction`]
//! call. Updates carry the `version` the caller read; the store refuses an update whose
//! version no longer matches with [`LimsError::Conflict`], so two callers racing on the
//! same record cannot both succeed.
//!
//! Inserts assign the record id and set `version` to 1. Numbers such as MRNs and barcodes
//! come from [`Transaction::next_sequence`], which is transactional like everything else.

pub mod memory;

use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, OrderItemId, PatientId, ResultId, SampleId};
use crate::lab_result::{LabResult, ResultStatus};
use crate::order::{Order, OrderItem};
use crate::patient::Patient;
use crate::permissions::{PermissionSource, Role, RolePermission};
use crate::report::Report;
use crate::sample::{Sample, SampleStatus};
use crate::workflow::WorkflowSettings;
use chrono::NaiveDate;

pub use memory::InMemoryStore;

/// A transactional record store.
pub trait Store: Send + Sync {
    /// Runs `f` atomically. Nothing `f` wrote is visible to anyone if it returns `Err`.
    fn transaction<T, F>(&self, f: F) -> LimsResult<T>
    where
        F: FnOnce(&mut dyn Transaction) -> LimsResult<T>;

    /// Runs `f` against a consistent snapshot.
    fn read<T, F>(&self, f: F) -> LimsResult<T>
    where
        F: FnOnce(&dyn Transaction) -> LimsResult<T>;
}

/// Record access within one transaction.
pub trait Transaction {
    // Patients
    fn patient(&self, id: PatientId) -> LimsResult<Patient>;
    fn patients(&self) -> LimsResult<Vec<Patient>>;
    fn patient_by_cnic(&self, cnic: &str) -> LimsResult<Option<Patient>>;
    fn insert_patient(&mut self, patient: Patient) -> LimsResult<Patient>;

    // Orders
    fn order(&self, id: OrderId) -> LimsResult<Order>;
    fn orders_for_patient(&self, patient_id: PatientId) -> LimsResult<Vec<Order>>;
    fn insert_order(&mut self, order: Order) -> LimsResult<Order>;
    fn update_order(&mut self, order: Order) -> LimsResult<Order>;

    // Order items, ordered by id
    fn order_item(&self, id: OrderItemId) -> LimsResult<OrderItem>;
    fn order_items(&self, order_id: OrderId) -> LimsResult<Vec<OrderItem>>;
    fn insert_order_item(&mut self, item: OrderItem) -> LimsResult<OrderItem>;
    fn delete_order_item(&mut self, id: OrderItemId) -> LimsResult<()>;

    // Samples
    fn sample(&self, id: SampleId) -> LimsResult<Sample>;
    fn sample_for_item(&self, item_id: OrderItemId) -> LimsResult<Option<Sample>>;
    fn samples_with_status(&self, status: SampleStatus) -> LimsResult<Vec<Sample>>;
    fn insert_sample(&mut self, sample: Sample) -> LimsResult<Sample>;
    fn update_sample(&mut self, sample: Sample) -> LimsResult<Sample>;

    // Results
    fn result(&self, id: ResultId) -> LimsResult<LabResult>;
    fn result_for_item(&self, item_id: OrderItemId) -> LimsResult<Option<LabResult>>;
    fn results_with_status(&self, status: ResultStatus) -> LimsResult<Vec<LabResult>>;
    fn insert_result(&mut self, result: LabResult) -> LimsResult<LabResult>;
    fn update_result(&mut self, result: LabResult) -> LimsResult<LabResult>;

    // Reports
    fn report_for_order(&self, order_id: OrderId) -> LimsResult<Option<Report>>;
    fn insert_report(&mut self, report: Report) -> LimsResult<Report>;
    fn update_report(&mut self, report: Report) -> LimsResult<Report>;

    // Configuration
    fn workflow_settings(&self) -> LimsResult<Option<WorkflowSettings>>;
    fn put_workflow_settings(&mut self, settings: WorkflowSettings) -> LimsResult<()>;
    fn role_permissions(&self) -> LimsResult<Vec<RolePermission>>;
    fn put_role_permission(&mut self, row: RolePermission) -> LimsResult<()>;
    /// Removes a role's override row, returning whether one existed.
    fn remove_role_permission(&mut self, role: Role) -> LimsResult<bool>;

    /// Next value of the daily counter for `prefix`, starting at 1.
    fn next_sequence(&mut self, prefix: &str, day: NaiveDate) -> LimsResult<u32>;

    /// The override rows seen by this transaction, for the permission gate.
    fn permissions(&self) -> &dyn PermissionSource;
}

/// Compare-and-swap check shared by store implementations.
pub(crate) fn check_version(
    entity: &'static str,
    id: impl std::fmt::Display,
    stored: u64,
    offered: u64,
) -> LimsResult<()> {
    if stored == offered {
        Ok(())
    } else {
        tracing::debug!(entity, %id, stored, offered, "stale version rejected");
        Err(LimsError::Conflict {
            entity,
            id: id.to_string(),
        })
    }
}
