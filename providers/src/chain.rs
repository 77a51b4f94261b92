use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Chain {
    Avalanche,
    Fuji,
    Songbird,
    Coston,
    Near,
    NearTestnet,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChainKind {
    Evm,
    Near,
}

pub struct NativeCurrency {
    pub symbol: &'static str,
    pub decimals: u8,
}

impl Chain {
    pub const ALL: [Chain; 6] = [
        Chain::Avalanche,
        Chain::Fuji,
        Chain::Songbird,
        Chain::Coston,
        Chain::Near,
        Chain::NearTestnet,
    ];

    pub fn kind(self) -> ChainKind {
        match self {
            Chain::Near | Chain::NearTestnet => ChainKind::Near,
            _ => ChainKind::Evm,
        }
    }

    /// Numeric EIP-155 id, `None` for non-EVM chains.
    pub fn evm_id(self) -> Option<u64> {
        match self {
            Chain::Avalanche => Some(43114),
            Chain::Fuji => Some(43113),
            Chain::Songbird => Some(19),
            Chain::Coston => Some(16),
            Chain::Near | Chain::NearTestnet => None,
        }
    }

    pub fn native_currency(self) -> NativeCurrency {
        let (symbol, decimals) = match self {
            Chain::Avalanche | Chain::Fuji => ("AVAX", 18),
            Chain::Songbird => ("SGB", 18),
            Chain::Coston => ("CFLR", 18),
            Chain::Near | Chain::NearTestnet => ("NEAR", 24),
        };

        NativeCurrency { symbol, decimals }
    }

    /// Prefix of the environment variables configuring this chain.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Chain::Avalanche => "AVALANCHE",
            Chain::Fuji => "FUJI",
            Chain::Songbird => "SONGBIRD",
            Chain::Coston => "COSTON",
            Chain::Near => "NEAR",
            Chain::NearTestnet => "NEAR_TESTNET",
        }
    }
}
