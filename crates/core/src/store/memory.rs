//! In-process store.
//!
//! Transactions are serialised by one mutex and work on a copy of the tables, which
//! replaces the committed tables only when the closure succeeds. Suited to tests, the CLI
//! and single-instance deployments.

use super::{check_version, Store, Transaction};
use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, OrderItemId, PatientId, ReportId, ResultId, SampleId};
use crate::lab_result::{LabResult, ResultStatus};
use crate::order::{Order, OrderItem};
use crate::patient::Patient;
use crate::permissions::{PermissionSource, Role, RolePermission};
use crate::report::Report;
use crate::sample::{Sample, SampleStatus};
use crate::workflow::WorkflowSettings;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.tables.is_locked()
    }
}

impl Store for InMemoryStore {
    fn transaction<T, F>(&self, f: F) -> LimsResult<T>
    where
        F: FnOnce(&mut dyn Transaction) -> LimsResult<T>,
    {
        let mut committed = self.tables.lock();
        let mut working = committed.clone();
        let value = f(&mut working)?;
        *committed = working;
        Ok(value)
    }

    fn read<T, F>(&self, f: F) -> LimsResult<T>
    where
        F: FnOnce(&dyn Transaction) -> LimsResult<T>,
    {
        let committed = self.tables.lock();
        f(&*committed)
    }
}

#[derive(Clone, Default)]
struct Tables {
    last_id: u64,
    patients: BTreeMap<PatientId, Patient>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    samples: BTreeMap<SampleId, Sample>,
    results: BTreeMap<ResultId, LabResult>,
    reports: BTreeMap<ReportId, Report>,
    workflow: Option<WorkflowSettings>,
    role_permissions: BTreeMap<Role, RolePermission>,
    sequences: HashMap<(String, NaiveDate), u32>,
}

impl Tables {
    // One counter for every table keeps ids unique across record kinds, which makes
    // mix-ups visible in tests.
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

fn get<K, V>(map: &BTreeMap<K, V>, entity: &'static str, id: K) -> LimsResult<V>
where
    K: Ord + std::fmt::Display,
    V: Clone,
{
    map.get(&id)
        .cloned()
        .ok_or_else(|| LimsError::not_found(entity, id))
}

/// Applies a versioned update: the offered version must equal the stored one.
fn swap<K, V>(
    map: &mut BTreeMap<K, V>,
    entity: &'static str,
    id: K,
    mut record: V,
    version: impl Fn(&mut V) -> &mut u64,
) -> LimsResult<V>
where
    K: Ord + Copy + std::fmt::Display,
    V: Clone,
{
    let stored = map
        .get_mut(&id)
        .ok_or_else(|| LimsError::not_found(entity, id))?;
    let current = *version(&mut *stored);
    check_version(entity, id, current, *version(&mut record))?;
    *version(&mut record) = current + 1;
    *stored = record.clone();
    Ok(record)
}

impl PermissionSource for Tables {
    fn role_permission(&self, role: Role) -> LimsResult<Option<RolePermission>> {
        Ok(self.role_permissions.get(&role).cloned())
    }
}

impl Transaction for Tables {
    fn patient(&self, id: PatientId) -> LimsResult<Patient> {
        get(&self.patients, "patient", id)
    }

    fn patients(&self) -> LimsResult<Vec<Patient>> {
        Ok(self.patients.values().cloned().collect())
    }

    fn patient_by_cnic(&self, cnic: &str) -> LimsResult<Option<Patient>> {
        Ok(self.patients.values().find(|p| p.cnic == cnic).cloned())
    }

    fn insert_patient(&mut self, mut patient: Patient) -> LimsResult<Patient> {
        if self.patients.values().any(|p| p.mrn == patient.mrn) {
            return Err(LimsError::Store(format!("duplicate mrn {}", patient.mrn)));
        }
        patient.id = PatientId(self.next_id());
        patient.version = 1;
        self.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    fn order(&self, id: OrderId) -> LimsResult<Order> {
        get(&self.orders, "order", id)
    }

    fn orders_for_patient(&self, patient_id: PatientId) -> LimsResult<Vec<Order>> {
        Ok(self
            .orders
            .values()
            .filter(|o| o.patient_id == patient_id)
            .cloned()
            .collect())
    }

    fn insert_order(&mut self, mut order: Order) -> LimsResult<Order> {
        if self.orders.values().any(|o| o.order_no == order.order_no) {
            return Err(LimsError::Store(format!(
                "duplicate order number {}",
                order.order_no
            )));
        }
        order.id = OrderId(self.next_id());
        order.version = 1;
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn update_order(&mut self, order: Order) -> LimsResult<Order> {
        swap(&mut self.orders, "order", order.id, order, |o| &mut o.version)
    }

    fn order_item(&self, id: OrderItemId) -> LimsResult<OrderItem> {
        get(&self.order_items, "order item", id)
    }

    fn order_items(&self, order_id: OrderId) -> LimsResult<Vec<OrderItem>> {
        Ok(self
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    fn insert_order_item(&mut self, mut item: OrderItem) -> LimsResult<OrderItem> {
        if !self.orders.contains_key(&item.order_id) {
            return Err(LimsError::not_found("order", item.order_id));
        }
        item.id = OrderItemId(self.next_id());
        self.order_items.insert(item.id, item.clone());
        Ok(item)
    }

    fn delete_order_item(&mut self, id: OrderItemId) -> LimsResult<()> {
        self.order_items
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| LimsError::not_found("order item", id))
    }

    fn sample(&self, id: SampleId) -> LimsResult<Sample> {
        get(&self.samples, "sample", id)
    }

    fn sample_for_item(&self, item_id: OrderItemId) -> LimsResult<Option<Sample>> {
        Ok(self
            .samples
            .values()
            .find(|s| s.order_item_id == item_id)
            .cloned())
    }

    fn samples_with_status(&self, status: SampleStatus) -> LimsResult<Vec<Sample>> {
        Ok(self
            .samples
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    fn insert_sample(&mut self, mut sample: Sample) -> LimsResult<Sample> {
        if self
            .samples
            .values()
            .any(|s| s.order_item_id == sample.order_item_id || s.barcode == sample.barcode)
        {
            return Err(LimsError::Store(format!(
                "sample for item {} or barcode {} already exists",
                sample.order_item_id, sample.barcode
            )));
        }
        sample.id = SampleId(self.next_id());
        sample.version = 1;
        self.samples.insert(sample.id, sample.clone());
        Ok(sample)
    }

    fn update_sample(&mut self, sample: Sample) -> LimsResult<Sample> {
        swap(&mut self.samples, "sample", sample.id, sample, |s| {
            &mut s.version
        })
    }

    fn result(&self, id: ResultId) -> LimsResult<LabResult> {
        get(&self.results, "result", id)
    }

    fn result_for_item(&self, item_id: OrderItemId) -> LimsResult<Option<LabResult>> {
        Ok(self
            .results
            .values()
            .find(|r| r.order_item_id == item_id)
            .cloned())
    }

    fn results_with_status(&self, status: ResultStatus) -> LimsResult<Vec<LabResult>> {
        Ok(self
            .results
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    fn insert_result(&mut self, mut result: LabResult) -> LimsResult<LabResult> {
        if self
            .results
            .values()
            .any(|r| r.order_item_id == result.order_item_id)
        {
            return Err(LimsError::Store(format!(
                "result for item {} already exists",
                result.order_item_id
            )));
        }
        result.id = ResultId(self.next_id());
        result.version = 1;
        self.results.insert(result.id, result.clone());
        Ok(result)
    }

    fn update_result(&mut self, result: LabResult) -> LimsResult<LabResult> {
        swap(&mut self.results, "result", result.id, result, |r| {
            &mut r.version
        })
    }

    fn report_for_order(&self, order_id: OrderId) -> LimsResult<Option<Report>> {
        Ok(self
            .reports
            .values()
            .find(|r| r.order_id == order_id)
            .cloned())
    }

    fn insert_report(&mut self, mut report: Report) -> LimsResult<Report> {
        if self.reports.values().any(|r| r.order_id == report.order_id) {
            return Err(LimsError::Store(format!(
                "report for order {} already exists",
                report.order_id
            )));
        }
        report.id = ReportId(self.next_id());
        report.version = 1;
        self.reports.insert(report.id, report.clone());
        Ok(report)
    }

    fn update_report(&mut self, report: Report) -> LimsResult<Report> {
        swap(&mut self.reports, "report", report.id, report, |r| {
            &mut r.version
        })
    }

    fn workflow_settings(&self) -> LimsResult<Option<WorkflowSettings>> {
        Ok(self.workflow)
    }

    fn put_workflow_settings(&mut self, settings: WorkflowSettings) -> LimsResult<()> {
        self.workflow = Some(settings);
        Ok(())
    }

    fn role_permissions(&self) -> LimsResult<Vec<RolePermission>> {
        Ok(self.role_permissions.values().cloned().collect())
    }

    fn put_role_permission(&mut self, row: RolePermission) -> LimsResult<()> {
        self.role_permissions.insert(row.role, row);
        Ok(())
    }

    fn remove_role_permission(&mut self, role: Role) -> LimsResult<bool> {
        Ok(self.role_permissions.remove(&role).is_some())
    }

    fn next_sequence(&mut self, prefix: &str, day: NaiveDate) -> LimsResult<u32> {
        let counter = self.sequences.entry((prefix.to_string(), day)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn permissions(&self) -> &dyn PermissionSource {
        self
    }
}
