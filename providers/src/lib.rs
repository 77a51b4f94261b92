pub mod address;
pub mod chain;
pub mod config;
pub mod errors;
pub mod evm;
pub mod near;
pub mod strategy;
pub mod token;

pub use address::{is_valid_address, validate_addresses, Address};
pub use chain::{Chain, ChainKind};
pub use errors::{ConfigError, ProviderError};
pub use strategy::{BalanceStrategy, StrategyRegistry};
pub use token::{Currency, CurrencyAmount, RawAmount, TokenAmount, TokenReference};
pub use web3::types::{H160, U256};

#[macro_export]
macro_rules! address {
    ($addr:expr) => {
        $crate::address!($addr, $crate::chain::Chain::Avalanche)
    };
    ($addr:expr, $chain:expr) => {{
        $crate::address::is_valid_address($addr, $chain)
            .unwrap_or_else(|| panic!("Invalid address {}", $addr))
    }};
}
