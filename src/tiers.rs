//! Tier discounts with minimum order, cap and per-period usage limits.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::aggregates::Invoice;
use crate::domain::value_objects::{ensure_non_negative, format_vnd, Tier};
use crate::search::normalize_text;
use crate::ShopError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriod {
    Week,
    Month,
    Year,
}

impl UsagePeriod {
    pub fn label(&self) -> &'static str {
        match self { Self::Week => "tuần", Self::Month => "tháng", Self::Year => "năm" }
    }
}

/// How often a tier discount may be used, written in rule files as `2 lần/tháng`,
/// `1 per week` or `Không giới hạn`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UsageLimit {
    Unlimited,
    PerPeriod { count: u32, period: UsagePeriod },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised usage limit \"{0}\"")]
pub struct UsageLimitParseError(pub String);

impl FromStr for UsageLimit {
    type Err = UsageLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = normalize_text(s);
        if text.is_empty() || text.contains("khong gioi han") || text.contains("unlimited") {
            return Ok(Self::Unlimited);
        }

        let digits: String = text.chars().skip_while(|c| !c.is_ascii_digit()).take_while(char::is_ascii_digit).collect();
        let count = digits.parse::<u32>().map_err(|_| UsageLimitParseError(s.to_string()))?;
        let period = if text.contains("tuan") || text.contains("week") {
            UsagePeriod::Week
        } else if text.contains("thang") || text.contains("month") {
            UsagePeriod::Month
        } else if text.contains("nam") || text.contains("year") {
            UsagePeriod::Year
        } else {
            return Err(UsageLimitParseError(s.to_string()));
        };
        Ok(Self::PerPeriod { count, period })
    }
}

impl TryFrom<String> for UsageLimit {
    type Error = UsageLimitParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<UsageLimit> for String {
    fn from(value: UsageLimit) -> Self { value.to_string() }
}

impl fmt::Display for UsageLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("Không giới hạn"),
            Self::PerPeriod { count, period } => write!(f, "{count} lần/{}", period.label()),
        }
    }
}

/// Static discount configuration for one tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub tier: Tier,
    pub discount_fraction: Decimal,
    pub min_order: Decimal,
    /// `None` means the discount is not capped.
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    pub usage_limit: UsageLimit,
}

impl TierRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.discount_fraction < Decimal::ZERO || self.discount_fraction > Decimal::ONE {
            return Err(format!("{}: discount fraction {} outside [0, 1]", self.tier, self.discount_fraction));
        }
        if self.min_order < Decimal::ZERO {
            return Err(format!("{}: negative minimum order", self.tier));
        }
        if matches!(self.max_discount, Some(cap) if cap < Decimal::ZERO) {
            return Err(format!("{}: negative discount cap", self.tier));
        }
        Ok(())
    }

    /// `discount_fraction` as a percentage rounded to two places, e.g. `0.1` → `10`.
    pub fn percentage(&self) -> Decimal {
        (self.discount_fraction * Decimal::ONE_HUNDRED).round_dp(2).normalize()
    }
}

/// The shop's built-in tier table.
pub fn default_rules() -> Vec<TierRule> {
    let per = |count, period| UsageLimit::PerPeriod { count, period };
    vec![
        TierRule { tier: Tier::Farmer, discount_fraction: Decimal::new(5, 2), min_order: Decimal::from(1_000_000), max_discount: Some(Decimal::from(50_000)), usage_limit: per(1, UsagePeriod::Month) },
        TierRule { tier: Tier::Merchant, discount_fraction: Decimal::new(8, 2), min_order: Decimal::from(1_000_000), max_discount: Some(Decimal::from(100_000)), usage_limit: per(2, UsagePeriod::Month) },
        TierRule { tier: Tier::Tycoon, discount_fraction: Decimal::new(10, 2), min_order: Decimal::from(500_000), max_discount: Some(Decimal::from(300_000)), usage_limit: per(1, UsagePeriod::Week) },
    ]
}

/// Half-open calendar interval `[start, end)` in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageWindow {
    pub period: UsagePeriod,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsageWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool { at >= self.start && at < self.end }
}

/// Calendar week (Sunday first), month or year containing `now`, measured in the shop's offset.
pub fn usage_window(period: UsagePeriod, now: DateTime<Utc>, offset: FixedOffset) -> Option<UsageWindow> {
    let today = now.with_timezone(&offset).date_naive();
    let (start, end) = match period {
        UsagePeriod::Week => {
            let start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
            (start, start + Duration::days(7))
        }
        UsagePeriod::Month => {
            let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
            (start, start.checked_add_months(Months::new(1))?)
        }
        UsagePeriod::Year => {
            let start = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
            (start, NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?)
        }
    };
    let to_utc = |date: NaiveDate| -> DateTime<Utc> {
        let local: NaiveDateTime = date.and_time(chrono::NaiveTime::MIN);
        DateTime::from_naive_utc_and_offset(local - Duration::seconds(i64::from(offset.local_minus_utc())), Utc)
    };
    Some(UsageWindow { period, start: to_utc(start), end: to_utc(end) })
}

/// Result of one discount evaluation. A zero discount always carries a message the UI can show.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiscountOutcome {
    pub eligible: bool,
    pub discount_amount: Decimal,
    pub discount_percentage: Decimal,
    pub remaining_uses: Option<u32>,
    pub usage_period: Option<UsagePeriod>,
    pub message: String,
}

impl DiscountOutcome {
    fn denied(message: impl Into<String>) -> Self {
        Self { eligible: false, discount_amount: Decimal::ZERO, discount_percentage: Decimal::ZERO, remaining_uses: None, usage_period: None, message: message.into() }
    }
}

/// Evaluation input. `invoices` may hold any of the customer's invoices; only those in the
/// current window that already carried a discount count against the limit.
#[derive(Clone, Copy, Debug)]
pub struct DiscountRequest<'a> {
    pub customer_id: &'a str,
    pub tier_label: Option<&'a str>,
    pub order_total: Decimal,
    pub invoices: &'a [Invoice],
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TierDiscountEngine {
    rules: HashMap<Tier, TierRule>,
    offset: FixedOffset,
}

impl TierDiscountEngine {
    pub fn new(rules: Vec<TierRule>, offset: FixedOffset) -> Self {
        Self { rules: rules.into_iter().map(|r| (r.tier, r)).collect(), offset }
    }

    pub fn rule_for(&self, tier: Tier) -> Option<&TierRule> { self.rules.get(&tier) }

    pub fn rules(&self) -> impl Iterator<Item = &TierRule> { self.rules.values() }

    pub fn evaluate(&self, req: DiscountRequest<'_>) -> Result<DiscountOutcome, ShopError> {
        let total = ensure_non_negative("order_total", req.order_total)?;

        let label = match req.tier_label.map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => return Ok(DiscountOutcome::denied("Khách hàng chưa có hạng thành viên, không được giảm giá")),
        };
        let Some(tier) = Tier::parse(label) else {
            return Ok(DiscountOutcome::denied(format!("Không tìm thấy hạng thành viên \"{label}\", không áp dụng giảm giá")));
        };
        if tier.is_unranked() {
            return Ok(DiscountOutcome::denied(format!("Hạng {tier} không có ưu đãi giảm giá")));
        }
        let Some(rule) = self.rule_for(tier) else {
            return Ok(DiscountOutcome::denied(format!("Hạng {tier} chưa được cấu hình giảm giá")));
        };

        if total < rule.min_order {
            return Ok(DiscountOutcome::denied(format!(
                "Đơn hàng tối thiểu {} để được giảm giá hạng {tier}", format_vnd(rule.min_order)
            )));
        }

        let raw = total
            .checked_mul(rule.discount_fraction)
            .ok_or(ShopError::InvalidAmount { field: "order_total", value: total })?
            .floor();
        let amount = match rule.max_discount { Some(cap) => raw.min(cap), None => raw };
        if amount <= Decimal::ZERO {
            return Ok(DiscountOutcome::denied(format!("Hạng {tier} không có ưu đãi giảm giá")));
        }

        let (remaining_uses, usage_period) = match rule.usage_limit {
            UsageLimit::Unlimited => (None, None),
            UsageLimit::PerPeriod { count: limit, period } => {
                let Some(window) = usage_window(period, req.now, self.offset) else {
                    return Ok(DiscountOutcome::denied("Không xác định được kỳ áp dụng giảm giá"));
                };
                let used = req.invoices.iter()
                    .filter(|inv| inv.customer_id.as_deref() == Some(req.customer_id))
                    .filter(|inv| inv.had_discount() && window.contains(inv.created_at))
                    .count();
                let used = u32::try_from(used).unwrap_or(u32::MAX);
                if used >= limit {
                    tracing::debug!(customer_id = req.customer_id, %tier, used, limit, "tier discount limit exhausted");
                    return Ok(DiscountOutcome {
                        remaining_uses: Some(0),
                        usage_period: Some(period),
                        ..DiscountOutcome::denied(format!(
                            "Đã dùng hết {limit} lượt giảm giá của hạng {tier} trong {} này", period.label()
                        ))
                    });
                }
                (Some(limit - used - 1), Some(period))
            }
        };

        let percentage = rule.percentage();
        let mut message = format!("Giảm {percentage}% cho hạng {tier}");
        if let Some(cap) = rule.max_discount {
            message.push_str(&format!(" (tối đa {})", format_vnd(cap)));
        }
        if let (Some(left), Some(period)) = (remaining_uses, usage_period) {
            message.push_str(&format!(", còn {left} lượt trong {} này", period.label()));
        }
        Ok(DiscountOutcome { eligible: true, discount_amount: amount, discount_percentage: percentage, remaining_uses, usage_period, message })
    }
}
