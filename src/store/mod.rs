//! Persistence adapter.
//!
//! Aggregates carry a `version`. Debt updates (inside a [`WriteBatch`]) and `update_customer` are
//! compare-and-set: they succeed only when the stored version still equals the one the caller
//! read, then bump it. A stale write gets [`ShopError::Conflict`](crate::ShopError::Conflict) instead of silently overwriting
//! a concurrent payment. Debt, invoice and ledger writes share one batch so the ledger never
//! disagrees with the debt it describes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::aggregates::{Banner, Customer, Debt, Invoice};
use crate::ledger::DebtHistoryEntry;
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Debt change committed in the same unit as its ledger entry.
#[derive(Clone, Debug)]
pub enum DebtWrite {
    Insert(Debt),
    /// Compare-and-set on `version`.
    Update(Debt),
}

/// Writes that land together or not at all. A rejected batch leaves nothing behind.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    pub invoice: Option<Invoice>,
    pub debt: Option<DebtWrite>,
    pub entry: Option<DebtHistoryEntry>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Commits the batch atomically. Returns the debt's version after the write, if any.
    async fn commit_batch(&self, batch: &WriteBatch) -> Result<Option<u64>>;
    async fn history_for_customer(&self, customer_id: &str) -> Result<Vec<DebtHistoryEntry>>;
}

#[async_trait]
pub trait DebtStore: Send + Sync {
    async fn get_debt(&self, id: &str) -> Result<Option<Debt>>;
    async fn debts_for_customer(&self, customer_id: &str) -> Result<Vec<Debt>>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;
    async fn get_customer(&self, id: &str) -> Result<Option<Customer>>;
    async fn list_customers(&self) -> Result<Vec<Customer>>;
    /// Writes `customer` if the stored version equals `customer.version()`. Returns the new version.
    async fn update_customer(&self, customer: &Customer) -> Result<u64>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn invoices_for_customer(&self, customer_id: &str, since: DateTime<Utc>) -> Result<Vec<Invoice>>;
}

#[async_trait]
pub trait BannerStore: Send + Sync {
    async fn list_banners(&self) -> Result<Vec<Banner>>;
    /// Replaces the whole collection in one step.
    async fn replace_banners(&self, banners: &[Banner]) -> Result<()>;
}

pub trait ShopStore: LedgerStore + DebtStore + CustomerStore + InvoiceStore + BannerStore {}

impl<T> ShopStore for T where T: LedgerStore + DebtStore + CustomerStore + InvoiceStore + BannerStore {}
