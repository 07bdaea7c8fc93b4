//! Value Objects for the shop domain

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::search::normalize_text;
use crate::ShopError;

/// Customer membership level. Variants are declared lowest first so `Ord` follows rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "Vô danh")]
    Unranked,
    #[serde(rename = "Nông dân")]
    Farmer,
    #[serde(rename = "Thương gia")]
    Merchant,
    #[serde(rename = "Đại gia")]
    Tycoon,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Unranked, Tier::Farmer, Tier::Merchant, Tier::Tycoon];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unranked => "Vô danh",
            Self::Farmer => "Nông dân",
            Self::Merchant => "Thương gia",
            Self::Tycoon => "Đại gia",
        }
    }

    /// Accent- and case-insensitive lookup. Unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        let wanted = normalize_text(label);
        if wanted.is_empty() { return None; }
        Self::ALL.into_iter().find(|t| normalize_text(t.label()) == wanted)
    }

    pub fn is_unranked(&self) -> bool { *self == Self::Unranked }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// Employee performing an action, kept on audit fields and ledger entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRef {
    pub id: String,
    pub name: String,
}

impl EmployeeRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self { Self { id: id.into(), name: name.into() } }
    pub fn system() -> Self { Self::new("system", "Hệ thống") }
}

/// How a payment was settled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankTransfer,
    Card,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cash => "cash", Self::BankTransfer => "bank_transfer", Self::Card => "card", Self::EWallet => "e_wallet" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Cash, Self::BankTransfer, Self::Card, Self::EWallet].into_iter().find(|m| m.as_str() == value)
    }
}

/// Rejects zero and negative monetary input before anything is written.
pub fn ensure_positive(field: &'static str, amount: Decimal) -> Result<Decimal, ShopError> {
    if amount <= Decimal::ZERO {
        return Err(ShopError::InvalidAmount { field, value: amount });
    }
    Ok(amount)
}

pub fn ensure_non_negative(field: &'static str, amount: Decimal) -> Result<Decimal, ShopError> {
    if amount < Decimal::ZERO {
        return Err(ShopError::InvalidAmount { field, value: amount });
    }
    Ok(amount)
}

/// Formats a VND amount with dot grouping, e.g. `1.000.000đ`.
pub fn format_vnd(amount: Decimal) -> String {
    let rounded = amount.round();
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { grouped.push('.'); }
        grouped.push(ch);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() { format!("-{grouped}đ") } else { format!("{grouped}đ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_ignores_accents_and_case() {
        assert_eq!(Tier::parse("Nông dân"), Some(Tier::Farmer));
        assert_eq!(Tier::parse("nong dan"), Some(Tier::Farmer));
        assert_eq!(Tier::parse("  ĐẠI GIA "), Some(Tier::Tycoon));
        assert_eq!(Tier::parse("Bạch kim"), None);
        assert_eq!(Tier::parse(""), None);
    }

    #[test]
    fn test_tier_order() {
        assert!(Tier::Unranked < Tier::Farmer);
        assert!(Tier::Merchant < Tier::Tycoon);
    }

    #[test]
    fn test_tier_serde_uses_label() {
        assert_eq!(serde_json::to_string(&Tier::Tycoon).unwrap(), "\"Đại gia\"");
        let t: Tier = serde_json::from_str("\"Thương gia\"").unwrap();
        assert_eq!(t, Tier::Merchant);
    }

    #[test]
    fn test_payment_method_str_matches_serde() {
        for m in [PaymentMethod::Cash, PaymentMethod::BankTransfer, PaymentMethod::Card, PaymentMethod::EWallet] {
            assert_eq!(serde_json::to_string(&m).unwrap(), format!("\"{}\"", m.as_str()));
            assert_eq!(PaymentMethod::parse(m.as_str()), Some(m));
        }
    }

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(Decimal::from(1_000_000)), "1.000.000đ");
        assert_eq!(format_vnd(Decimal::from(50_000)), "50.000đ");
        assert_eq!(format_vnd(Decimal::from(999)), "999đ");
        assert_eq!(format_vnd(Decimal::ZERO), "0đ");
        assert_eq!(format_vnd(Decimal::from(-1500)), "-1.500đ");
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("amount", Decimal::from(1)).is_ok());
        assert!(matches!(ensure_positive("amount", Decimal::ZERO), Err(ShopError::InvalidAmount { field: "amount", .. })));
        assert!(ensure_positive("amount", Decimal::from(-5)).is_err());
    }
}
