pub mod dataset;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod record;
pub mod review;
pub mod store;

pub type Decimal = rust_decimal::Decimal;

pub use anyhow::Result;
pub use error::ReconcileError;
