use crate::chain::{Chain, ChainKind};
use serde::{Serialize, Serializer};
use std::{collections::BTreeSet, fmt, str::FromStr};
use web3::{signing::keccak256, types::H160};

/// A validated account or contract identifier on one chain.
///
/// The ordering is total and independent of how the candidate was spelled,
/// so sorted sets of addresses make stable cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    Evm(H160),
    Near(String),
}

impl Address {
    pub fn as_evm(&self) -> Option<H160> {
        match self {
            Address::Evm(address) => Some(*address),
            Address::Near(_) => None,
        }
    }

    pub fn as_near(&self) -> Option<&str> {
        match self {
            Address::Near(account_id) => Some(account_id),
            Address::Evm(_) => None,
        }
    }

    pub fn is_valid_for(&self, chain: Chain) -> bool {
        matches!(
            (self, chain.kind()),
            (Address::Evm(_), ChainKind::Evm) | (Address::Near(_), ChainKind::Near)
        )
    }
}

impl From<H160> for Address {
    fn from(address: H160) -> Self {
        Address::Evm(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Evm(address) => f.write_str(&to_checksum(address)),
            Address::Near(account_id) => f.write_str(account_id),
        }
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// EIP-55 mixed-case rendering of an EVM address.
pub fn to_checksum(address: &H160) -> String {
    let lower: String = address
        .as_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    let hash = keccak256(lower.as_bytes());

    let checksummed: String = lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();

    format!("0x{checksummed}")
}

fn parse_evm(candidate: &str) -> Option<H160> {
    let hex = candidate.strip_prefix("0x")?;

    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let address = H160::from_str(hex).ok()?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper && &to_checksum(&address)[2..] != hex {
        return None;
    }

    Some(address)
}

fn parse_near(candidate: &str) -> Option<String> {
    if !(2..=64).contains(&candidate.len()) {
        return None;
    }

    let mut previous_separator = true;

    for c in candidate.chars() {
        match c {
            'a'..='z' | '0'..='9' => previous_separator = false,
            '-' | '_' | '.' if !previous_separator => previous_separator = true,
            _ => return None,
        }
    }

    (!previous_separator).then(|| candidate.to_string())
}

/// Returns the canonical address if `candidate` is valid on `chain`.
pub fn is_valid_address(candidate: &str, chain: Chain) -> Option<Address> {
    match chain.kind() {
        ChainKind::Evm => parse_evm(candidate).map(Address::Evm),
        ChainKind::Near => parse_near(candidate).map(Address::Near),
    }
}

/// Keeps the valid candidates, deduplicated and sorted. Invalid or missing
/// candidates are dropped.
pub fn validate_addresses<'a, I>(candidates: I, chain: Chain) -> Vec<Address>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| is_valid_address(candidate, chain))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
