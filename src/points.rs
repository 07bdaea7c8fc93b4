//! Loyalty points accrual.
//!
//! Points are earned on money actually received at the time of sale. The unpaid part of an
//! order that became a debt earns nothing here.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::value_objects::{ensure_non_negative, Tier};
use crate::ShopError;

/// One point per 1.000đ paid.
pub fn default_conversion_rate() -> Decimal { Decimal::new(1, 3) }

pub fn default_multipliers() -> HashMap<Tier, Decimal> {
    HashMap::from([
        (Tier::Unranked, Decimal::ONE),
        (Tier::Farmer, Decimal::ONE),
        (Tier::Merchant, Decimal::new(15, 1)),
        (Tier::Tycoon, Decimal::TWO),
    ])
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointsQuote {
    pub paid_amount: Decimal,
    pub conversion_rate: Decimal,
    pub multiplier: Decimal,
    pub points: u64,
}

#[derive(Clone, Debug)]
pub struct LoyaltyPointsCalculator {
    conversion_rate: Decimal,
    multipliers: HashMap<Tier, Decimal>,
}

impl Default for LoyaltyPointsCalculator {
    fn default() -> Self { Self::new(default_conversion_rate()) }
}

impl LoyaltyPointsCalculator {
    pub fn new(conversion_rate: Decimal) -> Self { Self { conversion_rate, multipliers: default_multipliers() } }

    pub fn with_multiplier(mut self, tier: Tier, multiplier: Decimal) -> Self {
        self.multipliers.insert(tier, multiplier);
        self
    }

    pub fn conversion_rate(&self) -> Decimal { self.conversion_rate }

    /// Unknown or missing tiers fall back to a multiplier of 1.
    pub fn multiplier_for(&self, tier_label: Option<&str>) -> Decimal {
        tier_label
            .and_then(Tier::parse)
            .and_then(|t| self.multipliers.get(&t).copied())
            .unwrap_or(Decimal::ONE)
    }

    pub fn quote(&self, paid_amount: Decimal, tier_label: Option<&str>) -> Result<PointsQuote, ShopError> {
        let paid_amount = ensure_non_negative("paid_amount", paid_amount)?;
        let multiplier = self.multiplier_for(tier_label);
        let points = paid_amount
            .checked_mul(self.conversion_rate)
            .and_then(|p| p.checked_mul(multiplier))
            .ok_or(ShopError::InvalidAmount { field: "paid_amount", value: paid_amount })?
            .floor()
            .to_u64()
            .unwrap_or(u64::MAX);
        Ok(PointsQuote { paid_amount, conversion_rate: self.conversion_rate, multiplier, points })
    }

    pub fn points_for(&self, paid_amount: Decimal, tier_label: Option<&str>) -> Result<u64, ShopError> {
        self.quote(paid_amount, tier_label).map(|q| q.points)
    }
}
