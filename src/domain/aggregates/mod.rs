//! Aggregates module
pub mod banner;
pub mod customer;
pub mod debt;
pub mod invoice;

pub use banner::Banner;
pub use customer::{Customer, CustomerError};
pub use debt::{Debt, DebtError, DebtPayment, DebtStatus, NewDebt};
pub use invoice::Invoice;
