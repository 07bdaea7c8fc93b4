use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{BannerStore, CustomerStore, DebtStore, DebtWrite, InvoiceStore, LedgerStore, WriteBatch};
use crate::domain::aggregates::{Banner, Customer, Debt, Invoice};
use crate::ledger::DebtHistoryEntry;
use crate::{Result, ShopError};

/// Process-local store used for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    history: Vec<DebtHistoryEntry>,
    debts: HashMap<String, Debt>,
    customers: HashMap<String, Customer>,
    invoices: Vec<Invoice>,
    banners: Vec<Banner>,
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn commit_batch(&self, batch: &WriteBatch) -> Result<Option<u64>> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        // Every check runs before the first mutation.
        match &batch.debt {
            Some(DebtWrite::Insert(debt)) if inner.debts.contains_key(debt.id()) => {
                return Err(ShopError::Storage(format!("debt {} already exists", debt.id())));
            }
            Some(DebtWrite::Update(debt)) => {
                let stored = inner.debts.get(debt.id()).ok_or(ShopError::DebtNotFound)?;
                if stored.version != debt.version {
                    return Err(ShopError::Conflict { entity: "debt", id: debt.id().to_string(), expected: debt.version });
                }
            }
            _ => {}
        }

        let version = match &batch.debt {
            Some(write) => {
                let (debt, version) = match write {
                    DebtWrite::Insert(debt) => (debt, debt.version),
                    DebtWrite::Update(debt) => (debt, debt.version + 1),
                };
                let mut stored = debt.clone();
                stored.events.clear();
                stored.version = version;
                inner.debts.insert(debt.id().to_string(), stored);
                Some(version)
            }
            None => None,
        };
        if let Some(invoice) = &batch.invoice {
            inner.invoices.push(invoice.clone());
        }
        if let Some(entry) = &batch.entry {
            inner.history.push(entry.clone());
        }
        Ok(version)
    }

    async fn history_for_customer(&self, customer_id: &str) -> Result<Vec<DebtHistoryEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.history.iter().filter(|e| e.customer_id == customer_id).cloned().collect())
    }
}

#[async_trait]
impl DebtStore for MemoryStore {
    async fn get_debt(&self, id: &str) -> Result<Option<Debt>> {
        Ok(self.inner.read().await.debts.get(id).cloned())
    }

    async fn debts_for_customer(&self, customer_id: &str) -> Result<Vec<Debt>> {
        let inner = self.inner.read().await;
        let mut debts: Vec<Debt> = inner.debts.values().filter(|d| d.customer_id() == customer_id).cloned().collect();
        debts.sort_by_key(|d| d.date());
        Ok(debts)
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.customers.contains_key(customer.id()) {
            return Err(ShopError::Storage(format!("customer {} already exists", customer.id())));
        }
        let mut stored = customer.clone();
        stored.events.clear();
        inner.customers.insert(customer.id().to_string(), stored);
        Ok(())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        Ok(self.inner.read().await.customers.get(id).cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let inner = self.inner.read().await;
        let mut customers: Vec<Customer> = inner.customers.values().cloned().collect();
        customers.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(customers)
    }

    async fn update_customer(&self, customer: &Customer) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let stored = inner.customers.get_mut(customer.id()).ok_or(ShopError::CustomerNotFound)?;
        if stored.version != customer.version {
            return Err(ShopError::Conflict { entity: "customer", id: customer.id().to_string(), expected: customer.version });
        }
        *stored = customer.clone();
        stored.events.clear();
        stored.version = customer.version + 1;
        Ok(stored.version)
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn invoices_for_customer(&self, customer_id: &str, since: DateTime<Utc>) -> Result<Vec<Invoice>> {
        let inner = self.inner.read().await;
        Ok(inner.invoices.iter()
            .filter(|i| i.customer_id.as_deref() == Some(customer_id) && i.created_at >= since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BannerStore for MemoryStore {
    async fn list_banners(&self) -> Result<Vec<Banner>> {
        Ok(self.inner.read().await.banners.clone())
    }

    async fn replace_banners(&self, banners: &[Banner]) -> Result<()> {
        self.inner.write().await.banners = banners.to_vec();
        Ok(())
    }
}
