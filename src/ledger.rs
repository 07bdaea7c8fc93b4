//! Append-only debt history.
//!
//! Every debt-affecting event produces exactly one [`DebtHistoryEntry`] carrying the balance
//! snapshot after the event. Entries are never updated or deleted; a customer's balance
//! timeline is rebuilt by replaying them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{ensure_non_negative, ensure_positive, EmployeeRef, PaymentMethod};
use crate::feed::HistoryFeed;
use crate::store::{LedgerStore, WriteBatch};
use crate::{Result, ShopError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtAction {
    CreateDebt,
    Payment,
}

impl DebtAction {
    pub fn as_str(&self) -> &'static str {
        match self { Self::CreateDebt => "CREATE_DEBT", Self::Payment => "PAYMENT" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value { "CREATE_DEBT" => Some(Self::CreateDebt), "PAYMENT" => Some(Self::Payment), _ => None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebtHistoryEntry {
    pub id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub action: DebtAction,
    pub amount: Decimal,
    pub remaining_debt: Decimal,
    pub date: DateTime<Utc>,
    pub employee_id: String,
    pub employee_name: String,
    pub notes: String,
    pub invoice_id: Option<String>,
    pub debt_id: Option<String>,
    pub metadata: Option<EntryMetadata>,
}

/// A new debt, or an extension of an open one when `prior_balance` is non-zero.
#[derive(Clone, Debug)]
pub struct DebtCreation {
    pub customer_id: String,
    pub customer_name: String,
    pub amount: Decimal,
    pub prior_balance: Decimal,
    pub employee: EmployeeRef,
    pub notes: Option<String>,
    pub invoice_id: Option<String>,
    pub debt_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Clone, Debug)]
pub struct PaymentRecord {
    pub customer_id: String,
    pub customer_name: String,
    pub amount: Decimal,
    pub prior_remaining: Decimal,
    pub employee: EmployeeRef,
    pub notes: Option<String>,
    pub debt_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

impl DebtHistoryEntry {
    pub fn debt_created(c: DebtCreation, at: DateTime<Utc>) -> Result<Self> {
        let amount = ensure_positive("amount", c.amount)?;
        let prior = ensure_non_negative("prior_balance", c.prior_balance)?;
        let remaining = prior.checked_add(amount).ok_or(ShopError::InvalidAmount { field: "amount", value: amount })?;
        let notes = c.notes.unwrap_or_else(|| if prior.is_zero() { "Tạo công nợ".to_string() } else { "Ghi thêm công nợ".to_string() });
        Ok(Self {
            id: Uuid::now_v7().to_string(), customer_id: c.customer_id, customer_name: c.customer_name,
            action: DebtAction::CreateDebt, amount, remaining_debt: remaining, date: at,
            employee_id: c.employee.id, employee_name: c.employee.name, notes,
            invoice_id: c.invoice_id, debt_id: c.debt_id,
            metadata: Some(EntryMetadata { original_amount: Some(remaining), payment_method: c.payment_method }),
        })
    }

    /// Rejects non-positive payments and payments larger than `prior_remaining`.
    pub fn payment(p: PaymentRecord, at: DateTime<Utc>) -> Result<Self> {
        let amount = ensure_positive("amount", p.amount)?;
        let prior = ensure_non_negative("prior_remaining", p.prior_remaining)?;
        if amount > prior {
            return Err(ShopError::Overpayment { attempted: amount, remaining: prior });
        }
        Ok(Self {
            id: Uuid::now_v7().to_string(), customer_id: p.customer_id, customer_name: p.customer_name,
            action: DebtAction::Payment, amount, remaining_debt: prior - amount, date: at,
            employee_id: p.employee.id, employee_name: p.employee.name,
            notes: p.notes.unwrap_or_else(|| "Thanh toán công nợ".to_string()),
            invoice_id: None, debt_id: p.debt_id,
            metadata: p.payment_method.map(|m| EntryMetadata { original_amount: None, payment_method: Some(m) }),
        })
    }
}

/// An entry as committed, with the debt version its batch produced.
#[derive(Clone, Debug)]
pub struct Committed {
    pub entry: DebtHistoryEntry,
    pub debt_version: Option<u64>,
}

/// Writes ledger entries through the store and announces them on the history feed.
///
/// Each entry is committed in one [`WriteBatch`] with the debt (and invoice) change it records,
/// so a failed write leaves neither behind.
pub struct DebtLedger<S: ?Sized> {
    store: Arc<S>,
    feed: HistoryFeed,
}

impl<S: LedgerStore + ?Sized> DebtLedger<S> {
    pub fn new(store: Arc<S>, feed: HistoryFeed) -> Self { Self { store, feed } }

    pub fn feed(&self) -> &HistoryFeed { &self.feed }

    pub async fn record_debt_creation(&self, creation: DebtCreation, batch: WriteBatch) -> Result<Committed> {
        let entry = DebtHistoryEntry::debt_created(creation, Utc::now())?;
        self.commit(entry, batch).await
    }

    pub async fn record_payment(&self, payment: PaymentRecord, batch: WriteBatch) -> Result<Committed> {
        let entry = DebtHistoryEntry::payment(payment, Utc::now())?;
        self.commit(entry, batch).await
    }

    /// All entries for one customer, oldest first.
    pub async fn history(&self, customer_id: &str) -> Result<Vec<DebtHistoryEntry>> {
        let mut entries = self.store.history_for_customer(customer_id).await?;
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn commit(&self, entry: DebtHistoryEntry, mut batch: WriteBatch) -> Result<Committed> {
        batch.entry = Some(entry.clone());
        let debt_version = self.store.commit_batch(&batch).await?;
        tracing::info!(
            customer_id = %entry.customer_id, debt_id = ?entry.debt_id, action = entry.action.as_str(),
            amount = %entry.amount, remaining = %entry.remaining_debt, "ledger entry appended"
        );
        self.feed.publish(&entry);
        Ok(Committed { entry, debt_version })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BalancePoint {
    pub date: DateTime<Utc>,
    pub action: DebtAction,
    pub amount: Decimal,
    pub debt_id: Option<String>,
    pub remaining_debt: Decimal,
    /// Sum of the latest snapshot of every debt seen so far.
    pub total_outstanding: Decimal,
}

/// Replays `entries` in date order into a running balance per debt and overall.
pub fn balance_timeline(entries: &[DebtHistoryEntry]) -> Vec<BalancePoint> {
    let mut sorted: Vec<&DebtHistoryEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.date);

    let mut latest: HashMap<Option<&str>, Decimal> = HashMap::new();
    sorted
        .into_iter()
        .map(|e| {
            latest.insert(e.debt_id.as_deref(), e.remaining_debt);
            BalancePoint {
                date: e.date, action: e.action, amount: e.amount, debt_id: e.debt_id.clone(),
                remaining_debt: e.remaining_debt,
                total_outstanding: latest.values().fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v)),
            }
        })
        .collect()
}

/// Current outstanding total across every debt in `entries`.
pub fn outstanding_balance(entries: &[DebtHistoryEntry]) -> Decimal {
    balance_timeline(entries).last().map(|p| p.total_outstanding).unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("ledger entry {entry_id} records remaining {recorded}, replay expects {expected}")]
pub struct LedgerInconsistency {
    pub entry_id: String,
    pub expected: Decimal,
    pub recorded: Decimal,
}

/// Checks that every snapshot equals the replayed balance and that none goes negative.
pub fn verify_history(entries: &[DebtHistoryEntry]) -> std::result::Result<(), LedgerInconsistency> {
    let mut sorted: Vec<&DebtHistoryEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.date);

    let mut balances: HashMap<Option<&str>, Decimal> = HashMap::new();
    for e in sorted {
        let balance = balances.entry(e.debt_id.as_deref()).or_insert(Decimal::ZERO);
        let replayed = match e.action {
            DebtAction::CreateDebt => balance.checked_add(e.amount),
            DebtAction::Payment => balance.checked_sub(e.amount),
        };
        let Some(expected) = replayed else {
            return Err(LedgerInconsistency { entry_id: e.id.clone(), expected: Decimal::MAX, recorded: e.remaining_debt });
        };
        if expected != e.remaining_debt || expected < Decimal::ZERO {
            return Err(LedgerInconsistency { entry_id: e.id.clone(), expected, recorded: e.remaining_debt });
        }
        *balance = expected;
    }
    Ok(())
}
