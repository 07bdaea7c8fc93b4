//! Debt Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DebtEvent, DomainEvent};
use crate::domain::value_objects::{EmployeeRef, PaymentMethod};

/// Current state of one customer's open obligation.
///
/// `remaining_amount` always equals `original_amount - amount_paid` and never drops below zero;
/// every mutator goes through [`Debt::apply_payment`] or [`Debt::extend`] which keep that true.
/// `version` is the optimistic-concurrency token checked by the store on update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Debt {
    pub(crate) id: String,
    pub(crate) customer_id: String,
    pub(crate) customer_name: String,
    pub(crate) original_amount: Decimal,
    pub(crate) amount_paid: Decimal,
    pub(crate) remaining_amount: Decimal,
    pub(crate) date: DateTime<Utc>,
    pub(crate) due_date: Option<DateTime<Utc>>,
    pub(crate) status: DebtStatus,
    pub(crate) invoice_id: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) payments: Vec<DebtPayment>,
    pub(crate) created_by: EmployeeRef,
    pub(crate) updated_by: EmployeeRef,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) version: u64,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtStatus {
    #[default]
    #[serde(rename = "Còn nợ")]
    Outstanding,
    #[serde(rename = "Đã thanh toán")]
    Paid,
    #[serde(rename = "Quá hạn")]
    Overdue,
}

impl DebtStatus {
    pub fn label(&self) -> &'static str {
        match self { Self::Outstanding => "Còn nợ", Self::Paid => "Đã thanh toán", Self::Overdue => "Quá hạn" }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Outstanding, Self::Paid, Self::Overdue].into_iter().find(|s| s.label() == label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebtPayment {
    pub id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub employee: EmployeeRef,
    pub remaining_after: Decimal,
}

/// Input for [`Debt::open`].
#[derive(Clone, Debug)]
pub struct NewDebt {
    pub customer_id: String,
    pub customer_name: String,
    pub amount: Decimal,
    pub due_date: Option<DateTime<Utc>>,
    pub invoice_id: Option<String>,
    pub notes: Option<String>,
    pub employee: EmployeeRef,
}

impl Debt {
    pub fn open(new: NewDebt) -> Result<Self, DebtError> {
        if new.amount <= Decimal::ZERO { return Err(DebtError::InvalidAmount(new.amount)); }
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let mut debt = Self {
            id: id.clone(), customer_id: new.customer_id, customer_name: new.customer_name,
            original_amount: new.amount, amount_paid: Decimal::ZERO, remaining_amount: new.amount,
            date: now, due_date: new.due_date, status: DebtStatus::Outstanding, invoice_id: new.invoice_id,
            notes: new.notes, payments: vec![], created_by: new.employee.clone(), updated_by: new.employee,
            updated_at: now, version: 0, events: vec![],
        };
        debt.raise_event(DomainEvent::Debt(DebtEvent::Opened { debt_id: id, customer_id: debt.customer_id.clone(), amount: new.amount }));
        Ok(debt)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn customer_name(&self) -> &str { &self.customer_name }
    pub fn original_amount(&self) -> Decimal { self.original_amount }
    pub fn amount_paid(&self) -> Decimal { self.amount_paid }
    pub fn remaining_amount(&self) -> Decimal { self.remaining_amount }
    pub fn date(&self) -> DateTime<Utc> { self.date }
    pub fn due_date(&self) -> Option<DateTime<Utc>> { self.due_date }
    pub fn status(&self) -> DebtStatus { self.status }
    pub fn invoice_id(&self) -> Option<&str> { self.invoice_id.as_deref() }
    pub fn payments(&self) -> &[DebtPayment] { &self.payments }
    pub fn created_by(&self) -> &EmployeeRef { &self.created_by }
    pub fn updated_by(&self) -> &EmployeeRef { &self.updated_by }
    pub fn version(&self) -> u64 { self.version }
    pub fn is_settled(&self) -> bool { self.remaining_amount.is_zero() }

    /// Adds `amount` to an open debt. Returns the new remaining balance.
    pub fn extend(&mut self, amount: Decimal, employee: EmployeeRef) -> Result<Decimal, DebtError> {
        if amount <= Decimal::ZERO { return Err(DebtError::InvalidAmount(amount)); }
        if self.is_settled() { return Err(DebtError::Settled); }
        self.original_amount = self.original_amount.checked_add(amount).ok_or(DebtError::InvalidAmount(amount))?;
        self.remaining_amount = self.original_amount - self.amount_paid;
        self.updated_by = employee;
        self.touch();
        self.raise_event(DomainEvent::Debt(DebtEvent::Extended { debt_id: self.id.clone(), amount, remaining: self.remaining_amount }));
        Ok(self.remaining_amount)
    }

    /// Applies one payment, rejecting non-positive amounts, overpayment and payments on a settled debt.
    pub fn apply_payment(&mut self, amount: Decimal, method: PaymentMethod, notes: Option<String>, employee: EmployeeRef) -> Result<DebtPayment, DebtError> {
        if amount <= Decimal::ZERO { return Err(DebtError::InvalidAmount(amount)); }
        if self.is_settled() { return Err(DebtError::Settled); }
        if amount > self.remaining_amount {
            return Err(DebtError::Overpayment { attempted: amount, remaining: self.remaining_amount });
        }

        self.amount_paid += amount;
        self.remaining_amount = self.original_amount - self.amount_paid;
        let now = Utc::now();
        let payment = DebtPayment {
            id: Uuid::now_v7().to_string(), amount, method, notes, paid_at: now,
            employee: employee.clone(), remaining_after: self.remaining_amount,
        };
        self.payments.push(payment.clone());
        self.updated_by = employee;
        self.touch();
        self.raise_event(DomainEvent::Debt(DebtEvent::PaymentApplied { debt_id: self.id.clone(), amount, remaining: self.remaining_amount }));
        if self.is_settled() {
            self.status = DebtStatus::Paid;
            self.raise_event(DomainEvent::Debt(DebtEvent::Settled { debt_id: self.id.clone(), customer_id: self.customer_id.clone() }));
        } else {
            self.status = self.status_at(now);
        }
        Ok(payment)
    }

    /// Status as of `now`: paid at zero balance, overdue once the due date has passed.
    pub fn status_at(&self, now: DateTime<Utc>) -> DebtStatus {
        if self.is_settled() { return DebtStatus::Paid; }
        match self.due_date {
            Some(due) if due < now => DebtStatus::Overdue,
            _ => DebtStatus::Outstanding,
        }
    }

    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> DebtStatus {
        self.status = self.status_at(now);
        self.status
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebtError { InvalidAmount(Decimal), Overpayment { attempted: Decimal, remaining: Decimal }, Settled }
impl std::error::Error for DebtError {}
impl std::fmt::Display for DebtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount(a) => write!(f, "Invalid amount {a}"),
            Self::Overpayment { attempted, remaining } => write!(f, "Payment {attempted} exceeds remaining {remaining}"),
            Self::Settled => write!(f, "Debt already settled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_debt(amount: i64) -> Debt {
        Debt::open(NewDebt {
            customer_id: "C1".into(), customer_name: "Trần Thị Bình".into(), amount: Decimal::from(amount),
            due_date: None, invoice_id: Some("INV-1".into()), notes: None, employee: EmployeeRef::new("E1", "Lan"),
        }).unwrap()
    }

    #[test]
    fn test_open_rejects_non_positive() {
        let err = Debt::open(NewDebt {
            customer_id: "C1".into(), customer_name: "A".into(), amount: Decimal::ZERO,
            due_date: None, invoice_id: None, notes: None, employee: EmployeeRef::system(),
        }).unwrap_err();
        assert_eq!(err, DebtError::InvalidAmount(Decimal::ZERO));
    }

    #[test]
    fn test_payment_workflow() {
        let mut debt = new_debt(500_000);
        assert_eq!(debt.status(), DebtStatus::Outstanding);
        debt.apply_payment(Decimal::from(200_000), PaymentMethod::Cash, None, EmployeeRef::new("E2", "Hoa")).unwrap();
        assert_eq!(debt.remaining_amount(), Decimal::from(300_000));
        assert_eq!(debt.amount_paid(), Decimal::from(200_000));
        assert_eq!(debt.payments().len(), 1);
        assert_eq!(debt.updated_by().name, "Hoa");

        debt.apply_payment(Decimal::from(300_000), PaymentMethod::BankTransfer, Some("chuyển khoản".into()), EmployeeRef::new("E2", "Hoa")).unwrap();
        assert!(debt.is_settled());
        assert_eq!(debt.status(), DebtStatus::Paid);
        assert_eq!(debt.remaining_amount(), debt.original_amount() - debt.amount_paid());
    }

    #[test]
    fn test_overpayment_rejected_without_mutation() {
        let mut debt = new_debt(100_000);
        let err = debt.apply_payment(Decimal::from(100_001), PaymentMethod::Cash, None, EmployeeRef::system()).unwrap_err();
        assert_eq!(err, DebtError::Overpayment { attempted: Decimal::from(100_001), remaining: Decimal::from(100_000) });
        assert_eq!(debt.remaining_amount(), Decimal::from(100_000));
        assert!(debt.payments().is_empty());
    }

    #[test]
    fn test_settled_debt_rejects_further_changes() {
        let mut debt = new_debt(10_000);
        debt.apply_payment(Decimal::from(10_000), PaymentMethod::Cash, None, EmployeeRef::system()).unwrap();
        assert_eq!(debt.apply_payment(Decimal::from(1), PaymentMethod::Cash, None, EmployeeRef::system()).unwrap_err(), DebtError::Settled);
        assert_eq!(debt.extend(Decimal::from(1), EmployeeRef::system()).unwrap_err(), DebtError::Settled);
    }

    #[test]
    fn test_extend_adds_to_balance() {
        let mut debt = new_debt(100_000);
        debt.apply_payment(Decimal::from(40_000), PaymentMethod::Cash, None, EmployeeRef::system()).unwrap();
        let remaining = debt.extend(Decimal::from(50_000), EmployeeRef::system()).unwrap();
        assert_eq!(remaining, Decimal::from(110_000));
        assert_eq!(debt.original_amount(), Decimal::from(150_000));
    }

    #[test]
    fn test_extend_overflow_rejected_without_mutation() {
        let mut debt = Debt::open(NewDebt {
            customer_id: "C1".into(), customer_name: "A".into(), amount: Decimal::MAX,
            due_date: None, invoice_id: None, notes: None, employee: EmployeeRef::system(),
        }).unwrap();
        assert_eq!(debt.extend(Decimal::ONE, EmployeeRef::system()).unwrap_err(), DebtError::InvalidAmount(Decimal::ONE));
        assert_eq!(debt.original_amount(), Decimal::MAX);
        assert_eq!(debt.remaining_amount(), Decimal::MAX);
    }

    #[test]
    fn test_overdue_status() {
        let mut debt = new_debt(100_000);
        debt.due_date = Some(Utc::now() - Duration::days(1));
        assert_eq!(debt.refresh_status(Utc::now()), DebtStatus::Overdue);
        assert_eq!(debt.status_at(Utc::now() - Duration::days(2)), DebtStatus::Outstanding);
    }

    #[test]
    fn test_events_raised() {
        let mut debt = new_debt(10_000);
        debt.apply_payment(Decimal::from(10_000), PaymentMethod::Cash, None, EmployeeRef::system()).unwrap();
        let kinds: Vec<_> = debt.take_events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["debt.opened", "debt.payment_applied", "debt.settled"]);
        assert!(debt.take_events().is_empty());
    }
}
