//! Finalized sale record

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{EmployeeRef, PaymentMethod};

/// One completed sale. `total = discount_amount + paid_amount + debt_amount`.
///
/// Kept immutable once written; the discount engine reads these back to count how many
/// discounted orders a customer already had in the current window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer_id: Option<String>,
    pub total: Decimal,
    pub discount_amount: Decimal,
    pub paid_amount: Decimal,
    pub debt_amount: Decimal,
    pub points_awarded: u64,
    pub payment_method: PaymentMethod,
    pub employee: EmployeeRef,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn net_total(&self) -> Decimal { self.total - self.discount_amount }
    pub fn had_discount(&self) -> bool { self.discount_amount > Decimal::ZERO }
}
