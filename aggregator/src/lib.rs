#![deny(clippy::dbg_macro)]

pub mod cache;
pub mod errors;
pub mod service;
pub mod types;

pub use cache::{BalanceHandle, DerivedBalanceCache};
pub use errors::AggregatorError;
pub use service::AggregateBalanceService;
pub use types::{BalanceMapping, BalanceSnapshot, CallState, NativeBalances, QueryKey, Snapshot};
