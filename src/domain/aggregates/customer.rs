//! Customer Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{CustomerEvent, DomainEvent};
use crate::domain::value_objects::Tier;

/// A shop customer with membership tier and loyalty balance.
///
/// The tier is stored as the label the shop assigned. A label that does not name a known
/// [`Tier`] is kept as-is and simply earns no discount and the default points multiplier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) phone: Option<String>,
    pub(crate) tier: Option<String>,
    pub(crate) points: u64,
    pub(crate) total_spent: Decimal,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) version: u64,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Customer {
    pub fn create(name: impl Into<String>, phone: Option<String>, tier: Option<String>) -> Result<Self, CustomerError> {
        let name = name.into().trim().to_string();
        if name.is_empty() { return Err(CustomerError::MissingName); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7().to_string(), name, phone, tier, points: 0, total_spent: Decimal::ZERO,
            created_at: now, updated_at: now, version: 0, events: vec![],
        })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn phone(&self) -> Option<&str> { self.phone.as_deref() }
    pub fn tier_label(&self) -> Option<&str> { self.tier.as_deref() }
    pub fn tier(&self) -> Option<Tier> { self.tier.as_deref().and_then(Tier::parse) }
    pub fn points(&self) -> u64 { self.points }
    pub fn total_spent(&self) -> Decimal { self.total_spent }
    pub fn version(&self) -> u64 { self.version }

    pub fn award_points(&mut self, points: u64) {
        if points == 0 { return; }
        self.points = self.points.saturating_add(points);
        self.touch();
        self.raise_event(DomainEvent::Customer(CustomerEvent::PointsAwarded { customer_id: self.id.clone(), points, balance: self.points }));
    }

    pub fn record_purchase(&mut self, amount: Decimal) -> Result<(), CustomerError> {
        if amount <= Decimal::ZERO { return Ok(()); }
        self.total_spent = self.total_spent.checked_add(amount).ok_or(CustomerError::InvalidAmount(amount))?;
        self.touch();
        self.raise_event(DomainEvent::Customer(CustomerEvent::PurchaseRecorded { customer_id: self.id.clone(), amount }));
        Ok(())
    }

    pub fn set_tier(&mut self, tier: Option<String>) {
        if self.tier == tier { return; }
        self.tier = tier;
        self.touch();
        self.raise_event(DomainEvent::Customer(CustomerEvent::TierChanged { customer_id: self.id.clone(), tier: self.tier.clone() }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq)] pub enum CustomerError { MissingName, InvalidAmount(Decimal) }
impl std::error::Error for CustomerError {}
impl std::fmt::Display for CustomerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Missing name"),
            Self::InvalidAmount(a) => write!(f, "Invalid amount {a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_create() {
        let c = Customer::create("  Nguyễn Văn An ", Some("0901234567".into()), Some("Đại gia".into())).unwrap();
        assert_eq!(c.name(), "Nguyễn Văn An");
        assert_eq!(c.tier(), Some(Tier::Tycoon));
        assert_eq!(Customer::create(" ", None, None).unwrap_err(), CustomerError::MissingName);
    }

    #[test]
    fn test_unknown_tier_label_is_kept() {
        let c = Customer::create("A", None, Some("Kim cương".into())).unwrap();
        assert_eq!(c.tier_label(), Some("Kim cương"));
        assert_eq!(c.tier(), None);
    }

    #[test]
    fn test_points_and_spend() {
        let mut c = Customer::create("A", None, None).unwrap();
        c.award_points(0);
        assert!(c.take_events().is_empty());
        c.award_points(120);
        c.award_points(30);
        c.record_purchase(Decimal::from(150_000)).unwrap();
        assert_eq!(c.points(), 150);
        assert_eq!(c.total_spent(), Decimal::from(150_000));
        assert_eq!(c.take_events().len(), 3);
    }

    #[test]
    fn test_total_spent_overflow_rejected() {
        let mut c = Customer::create("A", None, None).unwrap();
        c.record_purchase(Decimal::MAX).unwrap();
        assert_eq!(c.record_purchase(Decimal::ONE).unwrap_err(), CustomerError::InvalidAmount(Decimal::ONE));
        assert_eq!(c.total_spent(), Decimal::MAX);
        assert_eq!(c.take_events().len(), 1);
    }
}
