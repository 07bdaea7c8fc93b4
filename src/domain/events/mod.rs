//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Debt(DebtEvent),
    Customer(CustomerEvent),
}

impl DomainEvent {
    /// Subject suffix used when the event is published.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Debt(DebtEvent::Opened { .. }) => "debt.opened",
            Self::Debt(DebtEvent::Extended { .. }) => "debt.extended",
            Self::Debt(DebtEvent::PaymentApplied { .. }) => "debt.payment_applied",
            Self::Debt(DebtEvent::Settled { .. }) => "debt.settled",
            Self::Customer(CustomerEvent::PointsAwarded { .. }) => "customer.points_awarded",
            Self::Customer(CustomerEvent::TierChanged { .. }) => "customer.tier_changed",
            Self::Customer(CustomerEvent::PurchaseRecorded { .. }) => "customer.purchase_recorded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebtEvent {
    Opened { debt_id: String, customer_id: String, amount: Decimal },
    Extended { debt_id: String, amount: Decimal, remaining: Decimal },
    PaymentApplied { debt_id: String, amount: Decimal, remaining: Decimal },
    Settled { debt_id: String, customer_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomerEvent {
    PointsAwarded { customer_id: String, points: u64, balance: u64 },
    TierChanged { customer_id: String, tier: Option<String> },
    PurchaseRecorded { customer_id: String, amount: Decimal },
}
