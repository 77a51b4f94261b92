use crate::{address::Address, chain::Chain, errors::ProviderError};
use num_bigint::BigUint;
use serde::{Serialize, Serializer};
use std::hash::{Hash, Hasher};

/// Raw amounts in the smallest unit of a currency.
pub type RawAmount = BigUint;

pub fn raw_to_str<S>(raw: &RawAmount, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(raw)
}

/// A fungible asset. Two references are equal when they point at the same
/// contract on the same chain.
#[derive(Serialize, Debug, Clone)]
pub struct TokenReference {
    pub chain: Chain,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenReference {
    pub fn new(chain: Chain, address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            chain,
            address,
            decimals,
            symbol: symbol.into(),
        }
    }
}

impl PartialEq for TokenReference {
    fn eq(&self, other: &Self) -> bool {
        self.chain == other.chain && self.address == other.address
    }
}

impl Eq for TokenReference {}

impl Hash for TokenReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain.hash(state);
        self.address.hash(state);
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenAmount {
    pub token: TokenReference,
    #[serde(serialize_with = "raw_to_str")]
    pub raw: RawAmount,
}

impl TokenAmount {
    pub fn new(token: TokenReference, raw: impl Into<RawAmount>) -> Self {
        Self {
            token,
            raw: raw.into(),
        }
    }

    pub fn zero(token: TokenReference) -> Self {
        Self::new(token, 0u8)
    }

    /// Exact sum of two amounts of the same token.
    pub fn checked_add(&self, other: &TokenAmount) -> Result<TokenAmount, ProviderError> {
        if self.token != other.token {
            return Err(ProviderError::TokenMismatch {
                left: self.token.address.to_string(),
                right: other.token.address.to_string(),
            });
        }

        Ok(TokenAmount::new(self.token.clone(), &self.raw + &other.raw))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Currency {
    Native { chain: Chain },
    Token(TokenReference),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CurrencyAmount {
    Native {
        chain: Chain,
        #[serde(serialize_with = "raw_to_str")]
        raw: RawAmount,
    },
    Token(TokenAmount),
}

#[cfg(test)]
mod test {
    use super::{TokenAmount, TokenReference};
    use crate::{address, chain::Chain, errors::ProviderError};
    use num_bigint::BigUint;

    fn png() -> TokenReference {
        TokenReference::new(
            Chain::Avalanche,
            address!("0x60781c2586d68229fde47564546784ab3faca982"),
            18,
            "PNG",
        )
    }

    #[test]
    fn token_equality_ignores_metadata() {
        let mut renamed = png();
        renamed.symbol = "OTHER".into();
        renamed.decimals = 6;

        assert_eq!(png(), renamed);

        let mut other_chain = png();
        other_chain.chain = Chain::Fuji;

        assert_ne!(png(), other_chain);
    }

    #[test]
    fn add_beyond_u128() {
        let big = BigUint::from(u128::MAX);
        let sum = TokenAmount::new(png(), big.clone())
            .checked_add(&TokenAmount::new(png(), big.clone()))
            .unwrap();

        assert_eq!(sum.raw, big * 2u8);
        assert_eq!(
            serde_json::to_value(&sum).unwrap()["raw"],
            "680564733841876926926749214863536422910"
        );
    }

    #[test]
    fn add_different_tokens_fails() {
        let other = TokenReference::new(
            Chain::Avalanche,
            address!("0x0000000000000000000000000000000000000001"),
            18,
            "ONE",
        );

        assert!(matches!(
            TokenAmount::zero(png()).checked_add(&TokenAmount::zero(other)),
            Err(ProviderError::TokenMismatch { .. })
        ));
    }
}
