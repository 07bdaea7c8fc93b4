//! Shop workflows that tie the calculators, the ledger and the store together.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ShopConfig;
use crate::domain::aggregates::banner::arrange;
use crate::domain::aggregates::{Banner, Customer, Debt, Invoice, NewDebt};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{ensure_non_negative, ensure_positive, EmployeeRef, PaymentMethod};
use crate::feed::{HistoryFeed, HistorySubscription};
use crate::ledger::{balance_timeline, outstanding_balance, BalancePoint, DebtCreation, DebtHistoryEntry, DebtLedger, PaymentRecord};
use crate::points::{LoyaltyPointsCalculator, PointsQuote};
use crate::publisher::EventPublisher;
use crate::search::{FieldMatch, SearchField, SearchOptions, SearchScorer};
use crate::store::{DebtWrite, MemoryStore, ShopStore, WriteBatch};
use crate::tiers::{default_rules, DiscountOutcome, DiscountRequest, TierDiscountEngine, TierRule};
use crate::{Result, ShopError};

const MAX_CAS_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct SaleRequest {
    pub customer_id: Option<String>,
    pub order_total: Decimal,
    pub paid_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub apply_tier_discount: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub employee: EmployeeRef,
}

#[derive(Clone, Debug, Serialize)]
pub struct SaleReceipt {
    pub invoice: Invoice,
    pub discount: DiscountOutcome,
    pub points: Option<PointsQuote>,
    pub points_balance: Option<u64>,
    pub debt: Option<Debt>,
    pub ledger_entry: Option<DebtHistoryEntry>,
}

#[derive(Clone, Debug)]
pub struct OpenDebtRequest {
    pub customer_id: String,
    pub amount: Decimal,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub invoice_id: Option<String>,
    /// Adds to this open debt instead of opening a new one.
    pub extend_debt_id: Option<String>,
    pub employee: EmployeeRef,
}

#[derive(Clone, Debug)]
pub struct PaymentRequest {
    pub debt_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub employee: EmployeeRef,
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentReceipt {
    pub debt: Debt,
    pub ledger_entry: DebtHistoryEntry,
    pub points_awarded: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DebtHistoryView {
    pub customer_id: String,
    pub outstanding: Decimal,
    pub entries: Vec<DebtHistoryEntry>,
    pub timeline: Vec<BalancePoint>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CustomerMatch {
    pub customer: Customer,
    pub score: f64,
    pub matches: Vec<FieldMatch>,
}

#[derive(Clone, Debug)]
pub struct BannerInput {
    pub id: Option<String>,
    pub title: String,
    pub image_url: String,
    pub link: Option<String>,
    pub position: u32,
    pub active: bool,
}

pub struct ShopService {
    store: Arc<dyn ShopStore>,
    ledger: DebtLedger<dyn ShopStore>,
    discounts: TierDiscountEngine,
    points: LoyaltyPointsCalculator,
    publisher: EventPublisher,
    settings: ShopConfig,
}

impl ShopService {
    pub fn new(store: Arc<dyn ShopStore>, settings: ShopConfig, rules: Vec<TierRule>, publisher: EventPublisher, feed: HistoryFeed) -> Self {
        Self {
            ledger: DebtLedger::new(store.clone(), feed),
            discounts: TierDiscountEngine::new(rules, settings.utc_offset),
            points: LoyaltyPointsCalculator::new(settings.points_conversion_rate),
            store, publisher, settings,
        }
    }

    /// In-memory store, built-in tier table, events only logged.
    pub fn in_memory(settings: ShopConfig) -> Self {
        Self::new(Arc::new(MemoryStore::default()), settings, default_rules(), EventPublisher::disabled(), HistoryFeed::default())
    }

    pub fn store(&self) -> &Arc<dyn ShopStore> { &self.store }
    pub fn discounts(&self) -> &TierDiscountEngine { &self.discounts }
    pub fn points(&self) -> &LoyaltyPointsCalculator { &self.points }

    // -------------------------------------------------------------------------
    // Customers
    // -------------------------------------------------------------------------

    pub async fn register_customer(&self, name: &str, phone: Option<String>, tier: Option<String>) -> Result<Customer> {
        let customer = Customer::create(name, phone, tier)?;
        self.store.insert_customer(&customer).await?;
        tracing::info!(customer_id = customer.id(), tier = ?customer.tier_label(), "customer registered");
        Ok(customer)
    }

    pub async fn get_customer(&self, id: &str) -> Result<Customer> {
        self.store.get_customer(id).await?.ok_or(ShopError::CustomerNotFound)
    }

    pub async fn set_customer_tier(&self, id: &str, tier: Option<String>) -> Result<Customer> {
        let mut customer = self.update_customer_with(id, |c| {
            c.set_tier(tier.clone());
            Ok(())
        }).await?;
        self.publisher.publish_all(customer.take_events()).await;
        Ok(customer)
    }

    /// Ranks customers by name, phone digits and tier label.
    pub async fn search_customers(&self, query: &str) -> Result<Vec<CustomerMatch>> {
        let customers = self.store.list_customers().await?;
        let scorer = SearchScorer::new(
            vec![
                SearchField::new("name", 3.0, |c: &Customer| Some(c.name().to_string())),
                SearchField::new("phone", 2.0, |c: &Customer| c.phone().map(str::to_string))
                    .with_transform(|v| v.chars().filter(char::is_ascii_digit).collect()),
                SearchField::new("tier", 1.0, |c: &Customer| c.tier_label().map(str::to_string)),
            ],
            SearchOptions { threshold: self.settings.search_threshold, fuzzy: true },
        );
        Ok(scorer
            .search(&customers, query)
            .into_iter()
            .map(|hit| CustomerMatch { customer: hit.item.clone(), score: hit.score, matches: hit.matches })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Discounts and points
    // -------------------------------------------------------------------------

    pub async fn quote_discount(&self, customer_id: &str, order_total: Decimal, now: DateTime<Utc>) -> Result<DiscountOutcome> {
        let customer = self.get_customer(customer_id).await?;
        self.evaluate_discount(&customer, order_total, now).await
    }

    pub fn quote_points(&self, paid_amount: Decimal, tier_label: Option<&str>) -> Result<PointsQuote> {
        self.points.quote(paid_amount, tier_label)
    }

    async fn evaluate_discount(&self, customer: &Customer, order_total: Decimal, now: DateTime<Utc>) -> Result<DiscountOutcome> {
        // The widest usage window is a calendar year.
        let invoices = self.store.invoices_for_customer(customer.id(), now - Duration::days(366)).await?;
        self.discounts.evaluate(DiscountRequest {
            customer_id: customer.id(),
            tier_label: customer.tier_label(),
            order_total,
            invoices: &invoices,
            now,
        })
    }

    // -------------------------------------------------------------------------
    // Sales
    // -------------------------------------------------------------------------

    /// Discount, then points on the paid part, then a debt for whatever is left unpaid.
    pub async fn finalize_sale(&self, sale: SaleRequest) -> Result<SaleReceipt> {
        let total = ensure_positive("order_total", sale.order_total)?;
        let paid = ensure_non_negative("paid_amount", sale.paid_amount)?;
        let now = Utc::now();

        let customer = match &sale.customer_id {
            Some(id) => Some(self.get_customer(id).await?),
            None => None,
        };

        let discount = match (&customer, sale.apply_tier_discount) {
            (Some(c), true) => self.evaluate_discount(c, total, now).await?,
            _ => DiscountOutcome {
                eligible: false, discount_amount: Decimal::ZERO, discount_percentage: Decimal::ZERO,
                remaining_uses: None, usage_period: None, message: "Không áp dụng giảm giá hạng thành viên".to_string(),
            },
        };

        let net = total - discount.discount_amount;
        if paid > net {
            return Err(ShopError::Overpayment { attempted: paid, remaining: net });
        }
        let debt_amount = net - paid;
        if debt_amount > Decimal::ZERO && customer.is_none() {
            return Err(ShopError::Validation("Khách lẻ không thể ghi nợ".to_string()));
        }
        if let Some(c) = &customer {
            c.total_spent().checked_add(net).ok_or(ShopError::InvalidAmount { field: "total_spent", value: net })?;
        }

        let points = match &customer {
            Some(c) => Some(self.points.quote(paid, c.tier_label())?),
            None => None,
        };

        let invoice = Invoice {
            id: Uuid::now_v7().to_string(),
            customer_id: customer.as_ref().map(|c| c.id().to_string()),
            total,
            discount_amount: discount.discount_amount,
            paid_amount: paid,
            debt_amount,
            points_awarded: points.as_ref().map(|p| p.points).unwrap_or(0),
            payment_method: sale.payment_method,
            employee: sale.employee.clone(),
            created_at: now,
        };

        // The invoice, its debt and the CREATE_DEBT entry land together.
        let mut events: Vec<DomainEvent> = Vec::new();
        let (debt, ledger_entry) = match &customer {
            Some(c) if debt_amount > Decimal::ZERO => {
                let mut debt = Debt::open(NewDebt {
                    customer_id: c.id().to_string(), customer_name: c.name().to_string(), amount: debt_amount,
                    due_date: sale.due_date, invoice_id: Some(invoice.id.clone()), notes: sale.notes.clone(),
                    employee: sale.employee.clone(),
                })?;
                let committed = self.ledger.record_debt_creation(
                    DebtCreation {
                        customer_id: c.id().to_string(), customer_name: c.name().to_string(), amount: debt_amount,
                        prior_balance: Decimal::ZERO, employee: sale.employee.clone(), notes: sale.notes.clone(),
                        invoice_id: Some(invoice.id.clone()), debt_id: Some(debt.id().to_string()),
                        payment_method: Some(sale.payment_method),
                    },
                    WriteBatch { invoice: Some(invoice.clone()), debt: Some(DebtWrite::Insert(debt.clone())), entry: None },
                ).await?;
                events.extend(debt.take_events());
                (Some(debt), Some(committed.entry))
            }
            _ => {
                self.store.commit_batch(&WriteBatch { invoice: Some(invoice.clone()), ..WriteBatch::default() }).await?;
                (None, None)
            }
        };

        let points_balance = match &customer {
            Some(c) => {
                let awarded = invoice.points_awarded;
                let mut updated = self.update_customer_with(c.id(), |c| {
                    c.record_purchase(net)?;
                    c.award_points(awarded);
                    Ok(())
                }).await?;
                events.extend(updated.take_events());
                Some(updated.points())
            }
            None => None,
        };

        tracing::info!(
            invoice_id = %invoice.id, customer_id = ?invoice.customer_id, total = %total,
            discount = %invoice.discount_amount, paid = %paid, debt = %debt_amount, points = invoice.points_awarded,
            "sale finalized"
        );
        self.publisher.publish_all(events).await;

        Ok(SaleReceipt { invoice, discount, points, points_balance, debt, ledger_entry })
    }

    // -------------------------------------------------------------------------
    // Debts
    // -------------------------------------------------------------------------

    pub async fn open_debt(&self, req: OpenDebtRequest) -> Result<(Debt, DebtHistoryEntry)> {
        let amount = ensure_positive("amount", req.amount)?;
        let customer = self.get_customer(&req.customer_id).await?;

        let (mut debt, prior_balance, write) = match &req.extend_debt_id {
            Some(debt_id) => {
                let mut debt = self.get_debt(debt_id).await?;
                if debt.customer_id() != customer.id() {
                    return Err(ShopError::Validation(format!("debt {debt_id} does not belong to customer {}", customer.id())));
                }
                let prior = debt.remaining_amount();
                debt.extend(amount, req.employee.clone())?;
                let write = DebtWrite::Update(debt.clone());
                (debt, prior, write)
            }
            None => {
                let debt = Debt::open(NewDebt {
                    customer_id: customer.id().to_string(), customer_name: customer.name().to_string(), amount,
                    due_date: req.due_date, invoice_id: req.invoice_id.clone(), notes: req.notes.clone(),
                    employee: req.employee.clone(),
                })?;
                let write = DebtWrite::Insert(debt.clone());
                (debt, Decimal::ZERO, write)
            }
        };

        let committed = self.ledger.record_debt_creation(
            DebtCreation {
                customer_id: customer.id().to_string(), customer_name: customer.name().to_string(), amount, prior_balance,
                employee: req.employee, notes: req.notes, invoice_id: req.invoice_id.or_else(|| debt.invoice_id().map(str::to_string)),
                debt_id: Some(debt.id().to_string()), payment_method: None,
            },
            WriteBatch { debt: Some(write), ..WriteBatch::default() },
        ).await?;
        if let Some(version) = committed.debt_version {
            debt.version = version;
        }
        self.publisher.publish_all(debt.take_events()).await;
        Ok((debt, committed.entry))
    }

    pub async fn get_debt(&self, id: &str) -> Result<Debt> {
        let mut debt = self.store.get_debt(id).await?.ok_or(ShopError::DebtNotFound)?;
        debt.refresh_status(Utc::now());
        Ok(debt)
    }

    pub async fn debts_for_customer(&self, customer_id: &str) -> Result<Vec<Debt>> {
        let now = Utc::now();
        let mut debts = self.store.debts_for_customer(customer_id).await?;
        for d in &mut debts {
            d.refresh_status(now);
        }
        Ok(debts)
    }

    /// Applies a payment with the balance check inside the aggregate, then commits the versioned
    /// debt write and its PAYMENT entry together. A concurrent payment on the same debt surfaces
    /// as [`ShopError::Conflict`].
    pub async fn record_payment(&self, req: PaymentRequest) -> Result<PaymentReceipt> {
        let mut debt = self.store.get_debt(&req.debt_id).await?.ok_or(ShopError::DebtNotFound)?;
        let prior = debt.remaining_amount();
        debt.apply_payment(req.amount, req.method, req.notes.clone(), req.employee.clone())?;

        let committed = self.ledger.record_payment(
            PaymentRecord {
                customer_id: debt.customer_id().to_string(), customer_name: debt.customer_name().to_string(),
                amount: req.amount, prior_remaining: prior, employee: req.employee, notes: req.notes,
                debt_id: Some(debt.id().to_string()), payment_method: Some(req.method),
            },
            WriteBatch { debt: Some(DebtWrite::Update(debt.clone())), ..WriteBatch::default() },
        ).await.map_err(|e| {
            if matches!(e, ShopError::Conflict { .. }) {
                tracing::warn!(debt_id = %req.debt_id, "payment lost a race with a concurrent update");
            }
            e
        })?;
        if let Some(version) = committed.debt_version {
            debt.version = version;
        }
        let entry = committed.entry;

        let mut events = debt.take_events();
        let mut points_awarded = 0;
        if self.settings.award_points_on_repayment {
            if let Some(customer) = self.store.get_customer(debt.customer_id()).await? {
                points_awarded = self.points.points_for(req.amount, customer.tier_label())?;
                let mut updated = self.update_customer_with(customer.id(), |c| {
                    c.award_points(points_awarded);
                    Ok(())
                }).await?;
                events.extend(updated.take_events());
            }
        }
        self.publisher.publish_all(events).await;

        Ok(PaymentReceipt { debt, ledger_entry: entry, points_awarded })
    }

    pub async fn debt_history(&self, customer_id: &str) -> Result<DebtHistoryView> {
        let entries = self.ledger.history(customer_id).await?;
        if let Err(inconsistency) = crate::ledger::verify_history(&entries) {
            tracing::warn!(customer_id, error = %inconsistency, "debt history does not replay cleanly");
        }
        Ok(DebtHistoryView {
            customer_id: customer_id.to_string(),
            outstanding: outstanding_balance(&entries),
            timeline: balance_timeline(&entries),
            entries,
        })
    }

    pub fn subscribe_history(&self, customer_id: &str) -> HistorySubscription {
        self.ledger.feed().subscribe(customer_id)
    }

    // -------------------------------------------------------------------------
    // Banners
    // -------------------------------------------------------------------------

    pub async fn list_banners(&self) -> Result<Vec<Banner>> {
        self.store.list_banners().await
    }

    pub async fn replace_banners(&self, inputs: Vec<BannerInput>) -> Result<Vec<Banner>> {
        let now = Utc::now();
        let banners = arrange(inputs.into_iter().map(|b| Banner {
            id: b.id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            title: b.title, image_url: b.image_url, link: b.link, position: b.position, active: b.active, updated_at: now,
        }).collect());
        self.store.replace_banners(&banners).await?;
        tracing::info!(count = banners.len(), "banners replaced");
        Ok(banners)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Re-reads and re-applies `apply` when another writer bumped the version first.
    async fn update_customer_with(&self, id: &str, apply: impl Fn(&mut Customer) -> Result<()> + Send + Sync) -> Result<Customer> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut customer = self.get_customer(id).await?;
            apply(&mut customer)?;
            match self.store.update_customer(&customer).await {
                Ok(version) => {
                    customer.version = version;
                    return Ok(customer);
                }
                Err(ShopError::Conflict { .. }) if attempt < MAX_CAS_ATTEMPTS => {
                    tracing::warn!(customer_id = id, attempt, "customer update conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ShopError::Conflict { entity: "customer", id: id.to_string(), expected: 0 })
    }
}
