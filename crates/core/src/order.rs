//! Orders, order items and the status rollup.
//!
//! An order's status is never stored. It is recomputed from the samples and results of
//! its items every time the order is read, except for cancellation, which is an explicit
//! and irreversible mark on the order itself and is checked first.

use crate::error::{LimsError, LimsResult};
use crate::ids::{OrderId, OrderItemId, PatientId, TestId, UserId};
use crate::lab_result::{LabResult, ResultStatus};
use crate::sample::{Sample, SampleStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Collected,
    InProcess,
    Verified,
    Published,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Collected => "COLLECTED",
            OrderStatus::InProcess => "IN_PROCESS",
            OrderStatus::Verified => "VERIFIED",
            OrderStatus::Published => "PUBLISHED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPriority {
    #[default]
    Routine,
    Urgent,
    Stat,
}

/// A request for one or more tests for a patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub patient_id: PatientId,
    pub priority: OrderPriority,
    pub notes: String,
    /// Sum of the item prices.
    pub bill_amount: Decimal,
    pub discount: Decimal,
    pub amount_paid: Decimal,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<UserId>,
    pub version: u64,
}

impl Order {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    pub fn net_amount(&self) -> Decimal {
        self.bill_amount - self.discount
    }

    pub fn balance_due(&self) -> Decimal {
        self.net_amount() - self.amount_paid
    }

    /// Re-price the order from its items, keeping the discount valid.
    pub(crate) fn reprice(&mut self, items: &[OrderItem]) -> LimsResult<()> {
        let bill_amount = items.iter().map(|i| i.price).sum::<Decimal>();
        validate_billing(bill_amount, self.discount, self.amount_paid)?;
        self.bill_amount = bill_amount;
        Ok(())
    }
}

pub(crate) fn validate_billing(
    bill_amount: Decimal,
    discount: Decimal,
    amount_paid: Decimal,
) -> LimsResult<()> {
    if discount.is_sign_negative() || amount_paid.is_sign_negative() {
        return Err(LimsError::InvalidArgument(
            "discount and amount_paid cannot be negative".into(),
        ));
    }
    if discount > bill_amount {
        return Err(LimsError::InvalidArgument(format!(
            "discount {discount} exceeds bill amount {bill_amount}"
        )));
    }
    Ok(())
}

/// One ordered test. The catalog name and price are copied at order time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub test_id: TestId,
    pub test_code: String,
    pub test_name: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Order creation payload.
#[derive(Clone, Debug, Deserialize, utoipa::ToSchema)]
pub struct NewOrder {
    pub patient_id: PatientId,
    pub test_ids: Vec<TestId>,
    #[serde(default)]
    pub priority: OrderPriority,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub amount_paid: Decimal,
}

/// Tests to add to and remove from an untouched order.
#[derive(Clone, Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct TestEdit {
    #[serde(default)]
    pub tests_to_add: Vec<TestId>,
    #[serde(default)]
    pub tests_to_remove: Vec<TestId>,
}

impl TestEdit {
    /// Validate the edit against the tests currently on the order.
    pub(crate) fn validate(&self, current: &[TestId]) -> LimsResult<()> {
        if self.tests_to_add.is_empty() && self.tests_to_remove.is_empty() {
            return Err(LimsError::InvalidArgument(
                "no tests specified for addition or removal".into(),
            ));
        }

        ensure_unique(&self.tests_to_add, "tests_to_add")?;
        ensure_unique(&self.tests_to_remove, "tests_to_remove")?;

        let current: HashSet<TestId> = current.iter().copied().collect();
        if let Some(id) = self.tests_to_add.iter().find(|id| current.contains(id)) {
            return Err(LimsError::InvalidArgument(format!(
                "test {id} is already on the order"
            )));
        }
        if let Some(id) = self.tests_to_remove.iter().find(|id| !current.contains(id)) {
            return Err(LimsError::InvalidArgument(format!(
                "test {id} is not on the order"
            )));
        }

        let remaining = current.len() - self.tests_to_remove.len() + self.tests_to_add.len();
        if remaining == 0 {
            return Err(LimsError::InvalidArgument(
                "cannot remove all tests from order".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn ensure_unique(ids: &[TestId], field: &str) -> LimsResult<()> {
    let mut seen = HashSet::new();
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(id) => Err(LimsError::InvalidArgument(format!(
            "{field} lists test {id} more than once"
        ))),
        None => Ok(()),
    }
}

/// Lifecycle position of one item, as seen by the rollup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ItemProgress {
    pub sample: Option<SampleStatus>,
    pub result: Option<ResultStatus>,
}

impl ItemProgress {
    pub fn of(sample: Option<&Sample>, result: Option<&LabResult>) -> Self {
        Self {
            sample: sample.map(|s| s.status),
            result: result.map(|r| r.status),
        }
    }

    fn result_is(&self, pred: impl Fn(ResultStatus) -> bool) -> bool {
        self.result.is_some_and(pred)
    }

    fn has_result_activity(&self) -> bool {
        self.result_is(|s| s != ResultStatus::Draft)
    }

    fn has_sample_activity(&self) -> bool {
        self.sample.is_some_and(|s| s.has_progressed())
    }

    /// Untouched means no sample has left PENDING.
    pub fn sample_untouched(&self) -> bool {
        !self.has_sample_activity()
    }
}

/// Compute an order's status from its cancellation mark and its items.
///
/// Precedence: CANCELLED, PUBLISHED (every result published), VERIFIED (every result at
/// least verified), IN_PROCESS (any result past draft), COLLECTED (any sample past
/// pending, rejected included), NEW.
pub fn compute_order_status(cancelled: bool, items: &[ItemProgress]) -> OrderStatus {
    if cancelled {
        return OrderStatus::Cancelled;
    }
    if items.is_empty() {
        return OrderStatus::New;
    }
    if items
        .iter()
        .all(|i| i.result_is(|s| s == ResultStatus::Published))
    {
        return OrderStatus::Published;
    }
    if items.iter().all(|i| i.result_is(|s| s.is_at_least_verified())) {
        return OrderStatus::Verified;
    }
    if items.iter().any(ItemProgress::has_result_activity) {
        return OrderStatus::InProcess;
    }
    if items.iter().any(ItemProgress::has_sample_activity) {
        return OrderStatus::Collected;
    }
    OrderStatus::New
}

/// The single-item form of [`compute_order_status`].
pub fn item_status(order_cancelled: bool, item: ItemProgress) -> OrderStatus {
    compute_order_status(order_cancelled, std::slice::from_ref(&item))
}

/// An order item with its sample, result and computed status.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct OrderItemView {
    #[serde(flatten)]
    pub item: OrderItem,
    pub status: OrderStatus,
    pub sample: Option<Sample>,
    pub result: Option<LabResult>,
}

/// Read model of an order.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub status: OrderStatus,
    pub net_amount: Decimal,
    pub balance_due: Decimal,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    pub fn assemble(
        order: Order,
        items: Vec<(OrderItem, Option<Sample>, Option<LabResult>)>,
    ) -> Self {
        let cancelled = order.is_cancelled();
        let items: Vec<OrderItemView> = items
            .into_iter()
            .map(|(item, sample, result)| {
                let progress = ItemProgress::of(sample.as_ref(), result.as_ref());
                OrderItemView {
                    item,
                    status: item_status(cancelled, progress),
                    sample,
                    result,
                }
            })
            .collect();

        let progress: Vec<ItemProgress> = items
            .iter()
            .map(|i| ItemProgress::of(i.sample.as_ref(), i.result.as_ref()))
            .collect();

        Self {
            status: compute_order_status(cancelled, &progress),
            net_amount: order.net_amount(),
            balance_due: order.balance_due(),
            order,
            items,
        }
    }

    pub fn progress(&self) -> Vec<ItemProgress> {
        self.items
            .iter()
            .map(|i| ItemProgress::of(i.sample.as_ref(), i.result.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn p(sample: Option<SampleStatus>, result: Option<ResultStatus>) -> ItemProgress {
        ItemProgress { sample, result }
    }

    #[test]
    fn rollup_follows_precedence() {
        use ResultStatus as R;
        use SampleStatus as S;

        assert_eq!(compute_order_status(false, &[p(None, None)]), OrderStatus::New);
        assert_eq!(
            compute_order_status(false, &[p(Some(S::Pending), None), p(None, None)]),
            OrderStatus::New
        );
        assert_eq!(
            compute_order_status(false, &[p(Some(S::Collected), None), p(None, None)]),
            OrderStatus::Collected
        );
        assert_eq!(
            compute_order_status(false, &[p(Some(S::Rejected), None)]),
            OrderStatus::Collected
        );
        assert_eq!(
            compute_order_status(
                false,
                &[p(Some(S::Received), Some(R::Entered)), p(Some(S::Pending), None)]
            ),
            OrderStatus::InProcess
        );
        assert_eq!(
            compute_order_status(
                false,
                &[
                    p(Some(S::Received), Some(R::Verified)),
                    p(Some(S::Received), Some(R::Published))
                ]
            ),
            OrderStatus::Verified
        );
        assert_eq!(
            compute_order_status(
                false,
                &[
                    p(Some(S::Received), Some(R::Published)),
                    p(Some(S::Received), Some(R::Published))
                ]
            ),
            OrderStatus::Published
        );
        assert_eq!(
            compute_order_status(true, &[p(Some(S::Received), Some(R::Published))]),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn draft_results_do_not_count_as_processing() {
        assert_eq!(
            item_status(
                false,
                p(Some(SampleStatus::Received), Some(ResultStatus::Draft))
            ),
            OrderStatus::Collected
        );
    }

    #[test]
    fn test_edit_validation() {
        let current = [TestId(1), TestId(2)];

        let empty = TestEdit::default();
        assert!(empty.validate(&current).is_err());

        let add_present = TestEdit {
            tests_to_add: vec![TestId(1)],
            ..TestEdit::default()
        };
        assert!(add_present.validate(&current).is_err());

        let remove_absent = TestEdit {
            tests_to_remove: vec![TestId(3)],
            ..TestEdit::default()
        };
        assert!(remove_absent.validate(&current).is_err());

        let remove_all = TestEdit {
            tests_to_remove: vec![TestId(1), TestId(2)],
            ..TestEdit::default()
        };
        assert!(remove_all.validate(&current).is_err());

        let duplicate = TestEdit {
            tests_to_add: vec![TestId(4), TestId(4)],
            ..TestEdit::default()
        };
        assert!(duplicate.validate(&current).is_err());

        let swap = TestEdit {
            tests_to_add: vec![TestId(3)],
            tests_to_remove: vec![TestId(1), TestId(2)],
        };
        swap.validate(&current).expect("swap keeps one test");
    }

    #[test]
    fn billing_rules() {
        validate_billing(dec!(500), dec!(50), dec!(450)).expect("valid");
        assert!(validate_billing(dec!(500), dec!(600), dec!(0)).is_err());
        assert!(validate_billing(dec!(500), dec!(-1), dec!(0)).is_err());
    }
}
