use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use super::{BannerStore, CustomerStore, DebtStore, DebtWrite, InvoiceStore, LedgerStore, WriteBatch};
use crate::domain::aggregates::{Banner, Customer, Debt, DebtPayment, DebtStatus, Invoice};
use crate::domain::value_objects::{EmployeeRef, PaymentMethod};
use crate::ledger::{DebtAction, DebtHistoryEntry, EntryMetadata};
use crate::{Result, ShopError};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| ShopError::Storage(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool { &self.pool }

    /// Distinguishes a version mismatch from a missing row after a zero-row update.
    async fn conflict_or_missing(&self, table: &'static str, entity: &'static str, id: &str, expected: u64, missing: ShopError) -> ShopError {
        let exists = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE id = $1"))
            .bind(id).fetch_one(&self.pool).await;
        match exists {
            Ok(n) if n > 0 => {
                tracing::warn!(entity, id, expected, "optimistic concurrency conflict");
                ShopError::Conflict { entity, id: id.to_string(), expected }
            }
            Ok(_) => missing,
            Err(e) => e.into(),
        }
    }
}

fn to_i64(v: u64) -> i64 { i64::try_from(v).unwrap_or(i64::MAX) }
fn to_u64(v: i64) -> u64 { u64::try_from(v).unwrap_or(0) }

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String, customer_id: String, customer_name: String, action: String, amount: Decimal, remaining_debt: Decimal,
    date: DateTime<Utc>, employee_id: String, employee_name: String, notes: String, invoice_id: Option<String>,
    debt_id: Option<String>, metadata: Option<Json<EntryMetadata>>,
}

impl TryFrom<HistoryRow> for DebtHistoryEntry {
    type Error = ShopError;
    fn try_from(r: HistoryRow) -> Result<Self> {
        let action = DebtAction::parse(&r.action).ok_or_else(|| ShopError::Storage(format!("unknown ledger action {}", r.action)))?;
        Ok(Self {
            id: r.id, customer_id: r.customer_id, customer_name: r.customer_name, action, amount: r.amount,
            remaining_debt: r.remaining_debt, date: r.date, employee_id: r.employee_id, employee_name: r.employee_name,
            notes: r.notes, invoice_id: r.invoice_id, debt_id: r.debt_id, metadata: r.metadata.map(|m| m.0),
        })
    }
}

#[derive(sqlx::FromRow)]
struct DebtRow {
    id: String, customer_id: String, customer_name: String, original_amount: Decimal, amount_paid: Decimal,
    remaining_amount: Decimal, date: DateTime<Utc>, due_date: Option<DateTime<Utc>>, status: String,
    invoice_id: Option<String>, notes: Option<String>, payments: Json<Vec<DebtPayment>>,
    created_by_id: String, created_by_name: String, updated_by_id: String, updated_by_name: String,
    updated_at: DateTime<Utc>, version: i64,
}

impl TryFrom<DebtRow> for Debt {
    type Error = ShopError;
    fn try_from(r: DebtRow) -> Result<Self> {
        let status = DebtStatus::from_label(&r.status).ok_or_else(|| ShopError::Storage(format!("unknown debt status {}", r.status)))?;
        Ok(Self {
            id: r.id, customer_id: r.customer_id, customer_name: r.customer_name, original_amount: r.original_amount,
            amount_paid: r.amount_paid, remaining_amount: r.remaining_amount, date: r.date, due_date: r.due_date,
            status, invoice_id: r.invoice_id, notes: r.notes, payments: r.payments.0,
            created_by: EmployeeRef::new(r.created_by_id, r.created_by_name),
            updated_by: EmployeeRef::new(r.updated_by_id, r.updated_by_name),
            updated_at: r.updated_at, version: to_u64(r.version), events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String, name: String, phone: Option<String>, tier: Option<String>, points: i64, total_spent: Decimal,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>, version: i64,
}

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self {
        Self {
            id: r.id, name: r.name, phone: r.phone, tier: r.tier, points: to_u64(r.points), total_spent: r.total_spent,
            created_at: r.created_at, updated_at: r.updated_at, version: to_u64(r.version), events: vec![],
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: String, customer_id: Option<String>, total: Decimal, discount_amount: Decimal, paid_amount: Decimal,
    debt_amount: Decimal, points_awarded: i64, payment_method: String, employee_id: String, employee_name: String,
    created_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(r: InvoiceRow) -> Self {
        Self {
            id: r.id, customer_id: r.customer_id, total: r.total, discount_amount: r.discount_amount,
            paid_amount: r.paid_amount, debt_amount: r.debt_amount, points_awarded: to_u64(r.points_awarded),
            payment_method: PaymentMethod::parse(&r.payment_method).unwrap_or_default(),
            employee: EmployeeRef::new(r.employee_id, r.employee_name), created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BannerRow { id: String, title: String, image_url: String, link: Option<String>, position: i32, active: bool, updated_at: DateTime<Utc> }

impl From<BannerRow> for Banner {
    fn from(r: BannerRow) -> Self {
        Self { id: r.id, title: r.title, image_url: r.image_url, link: r.link, position: u32::try_from(r.position).unwrap_or(0), active: r.active, updated_at: r.updated_at }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    /// One transaction: invoice, then the debt insert or versioned update, then the ledger row.
    async fn commit_batch(&self, batch: &WriteBatch) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        if let Some(i) = &batch.invoice {
            sqlx::query("INSERT INTO invoices (id, customer_id, total, discount_amount, paid_amount, debt_amount, points_awarded, payment_method, employee_id, employee_name, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
                .bind(&i.id).bind(&i.customer_id).bind(i.total).bind(i.discount_amount).bind(i.paid_amount).bind(i.debt_amount)
                .bind(to_i64(i.points_awarded)).bind(i.payment_method.as_str()).bind(&i.employee.id).bind(&i.employee.name).bind(i.created_at)
                .execute(&mut *tx).await?;
        }

        let version = match &batch.debt {
            Some(DebtWrite::Insert(d)) => {
                sqlx::query("INSERT INTO debts (id, customer_id, customer_name, original_amount, amount_paid, remaining_amount, date, due_date, status, invoice_id, notes, payments, created_by_id, created_by_name, updated_by_id, updated_by_name, updated_at, version) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)")
                    .bind(&d.id).bind(&d.customer_id).bind(&d.customer_name).bind(d.original_amount).bind(d.amount_paid).bind(d.remaining_amount)
                    .bind(d.date).bind(d.due_date).bind(d.status.label()).bind(&d.invoice_id).bind(&d.notes).bind(Json(&d.payments))
                    .bind(&d.created_by.id).bind(&d.created_by.name).bind(&d.updated_by.id).bind(&d.updated_by.name).bind(d.updated_at).bind(to_i64(d.version))
                    .execute(&mut *tx).await?;
                Some(d.version)
            }
            Some(DebtWrite::Update(d)) => {
                let result = sqlx::query("UPDATE debts SET original_amount = $3, amount_paid = $4, remaining_amount = $5, due_date = $6, status = $7, notes = $8, payments = $9, updated_by_id = $10, updated_by_name = $11, updated_at = $12, version = version + 1 WHERE id = $1 AND version = $2")
                    .bind(&d.id).bind(to_i64(d.version)).bind(d.original_amount).bind(d.amount_paid).bind(d.remaining_amount).bind(d.due_date)
                    .bind(d.status.label()).bind(&d.notes).bind(Json(&d.payments)).bind(&d.updated_by.id).bind(&d.updated_by.name).bind(d.updated_at)
                    .execute(&mut *tx).await?;
                if result.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(self.conflict_or_missing("debts", "debt", &d.id, d.version, ShopError::DebtNotFound).await);
                }
                Some(d.version + 1)
            }
            None => None,
        };

        if let Some(e) = &batch.entry {
            sqlx::query("INSERT INTO debt_history (id, customer_id, customer_name, action, amount, remaining_debt, date, employee_id, employee_name, notes, invoice_id, debt_id, metadata) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
                .bind(&e.id).bind(&e.customer_id).bind(&e.customer_name).bind(e.action.as_str()).bind(e.amount).bind(e.remaining_debt)
                .bind(e.date).bind(&e.employee_id).bind(&e.employee_name).bind(&e.notes).bind(&e.invoice_id).bind(&e.debt_id)
                .bind(e.metadata.clone().map(Json))
                .execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(version)
    }

    async fn history_for_customer(&self, customer_id: &str) -> Result<Vec<DebtHistoryEntry>> {
        sqlx::query_as::<_, HistoryRow>("SELECT * FROM debt_history WHERE customer_id = $1 ORDER BY date ASC")
            .bind(customer_id).fetch_all(&self.pool).await?
            .into_iter().map(DebtHistoryEntry::try_from).collect()
    }
}

#[async_trait]
impl DebtStore for PgStore {
    async fn get_debt(&self, id: &str) -> Result<Option<Debt>> {
        sqlx::query_as::<_, DebtRow>("SELECT * FROM debts WHERE id = $1").bind(id).fetch_optional(&self.pool).await?
            .map(Debt::try_from).transpose()
    }

    async fn debts_for_customer(&self, customer_id: &str) -> Result<Vec<Debt>> {
        sqlx::query_as::<_, DebtRow>("SELECT * FROM debts WHERE customer_id = $1 ORDER BY date ASC").bind(customer_id).fetch_all(&self.pool).await?
            .into_iter().map(Debt::try_from).collect()
    }
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn insert_customer(&self, c: &Customer) -> Result<()> {
        sqlx::query("INSERT INTO customers (id, name, phone, tier, points, total_spent, created_at, updated_at, version) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(&c.id).bind(&c.name).bind(&c.phone).bind(&c.tier).bind(to_i64(c.points)).bind(c.total_spent)
            .bind(c.created_at).bind(c.updated_at).bind(to_i64(c.version))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        Ok(sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE id = $1").bind(id).fetch_optional(&self.pool).await?.map(Customer::from))
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        Ok(sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers ORDER BY name").fetch_all(&self.pool).await?.into_iter().map(Customer::from).collect())
    }

    async fn update_customer(&self, c: &Customer) -> Result<u64> {
        let result = sqlx::query("UPDATE customers SET name = $3, phone = $4, tier = $5, points = $6, total_spent = $7, updated_at = $8, version = version + 1 WHERE id = $1 AND version = $2")
            .bind(&c.id).bind(to_i64(c.version)).bind(&c.name).bind(&c.phone).bind(&c.tier).bind(to_i64(c.points)).bind(c.total_spent).bind(c.updated_at)
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(self.conflict_or_missing("customers", "customer", &c.id, c.version, ShopError::CustomerNotFound).await);
        }
        Ok(c.version + 1)
    }
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn invoices_for_customer(&self, customer_id: &str, since: DateTime<Utc>) -> Result<Vec<Invoice>> {
        Ok(sqlx::query_as::<_, InvoiceRow>("SELECT * FROM invoices WHERE customer_id = $1 AND created_at >= $2 ORDER BY created_at")
            .bind(customer_id).bind(since).fetch_all(&self.pool).await?
            .into_iter().map(Invoice::from).collect())
    }
}

#[async_trait]
impl BannerStore for PgStore {
    async fn list_banners(&self) -> Result<Vec<Banner>> {
        Ok(sqlx::query_as::<_, BannerRow>("SELECT * FROM banners ORDER BY position").fetch_all(&self.pool).await?.into_iter().map(Banner::from).collect())
    }

    async fn replace_banners(&self, banners: &[Banner]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM banners").execute(&mut *tx).await?;
        for b in banners {
            sqlx::query("INSERT INTO banners (id, title, image_url, link, position, active, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(&b.id).bind(&b.title).bind(&b.image_url).bind(&b.link).bind(i32::try_from(b.position).unwrap_or(i32::MAX)).bind(b.active).bind(b.updated_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
