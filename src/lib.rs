//! Flower shop retail core
//!
//! Debt bookkeeping, tier discounts, loyalty points and customer search for a small
//! flower shop's point of sale and storefront.
//!
//! ## Features
//! - Append-only debt ledger with per-debt balance snapshots
//! - Debt aggregate with optimistic-concurrency versioning
//! - Tier discounts with minimum order, cap and calendar usage limits
//! - Loyalty points on the paid part of a sale
//! - Accent-insensitive fuzzy search over loaded records
//! - Postgres or in-memory persistence, NATS event publishing, HTTP API

use rust_decimal::Decimal;
use thiserror::Error;

pub mod api;
pub mod config;
pub mod domain;
pub mod feed;
pub mod ledger;
pub mod points;
pub mod publisher;
pub mod search;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod tiers;

pub use domain::aggregates::{Banner, Customer, Debt, DebtPayment, DebtStatus, Invoice};
pub use domain::value_objects::{EmployeeRef, PaymentMethod, Tier};
pub use ledger::{DebtAction, DebtHistoryEntry, DebtLedger};
pub use points::LoyaltyPointsCalculator;
pub use search::{SearchField, SearchScorer};
pub use service::ShopService;
pub use tiers::{DiscountOutcome, TierDiscountEngine, TierRule};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount { field: &'static str, value: Decimal },

    #[error("Payment {attempted} exceeds remaining debt {remaining}")]
    Overpayment { attempted: Decimal, remaining: Decimal },

    #[error("Debt not found")]
    DebtNotFound,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Debt already settled")]
    DebtSettled,

    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    Conflict { entity: &'static str, id: String, expected: u64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ShopError>;

impl From<sqlx::Error> for ShopError {
    fn from(e: sqlx::Error) -> Self { Self::Storage(e.to_string()) }
}

impl From<validator::ValidationErrors> for ShopError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

impl From<domain::aggregates::DebtError> for ShopError {
    fn from(e: domain::aggregates::DebtError) -> Self {
        use domain::aggregates::DebtError;
        match e {
            DebtError::InvalidAmount(value) => Self::InvalidAmount { field: "amount", value },
            DebtError::Overpayment { attempted, remaining } => Self::Overpayment { attempted, remaining },
            DebtError::Settled => Self::DebtSettled,
        }
    }
}

impl From<domain::aggregates::CustomerError> for ShopError {
    fn from(e: domain::aggregates::CustomerError) -> Self {
        use domain::aggregates::CustomerError;
        match e {
            CustomerError::InvalidAmount(value) => Self::InvalidAmount { field: "total_spent", value },
            CustomerError::MissingName => Self::Validation(e.to_string()),
        }
    }
}
