use providers::{
    address::{is_valid_address, validate_addresses, Address},
    chain::Chain,
    token::{RawAmount, TokenAmount, TokenReference},
};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::collections::BTreeMap;

/// Identity of a derived result. Two keys are equal exactly when they would
/// issue the same reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Tokens {
        chain: Chain,
        account: Address,
        tokens: Vec<TokenReference>,
    },
    Native {
        chain: Chain,
        accounts: Vec<Address>,
    },
    Earned {
        chain: Chain,
        account: Address,
        token: TokenReference,
    },
}

/// Keeps the tokens of `chain` with a valid address, sorted by address and
/// without duplicates.
pub fn canonical_tokens(tokens: &[TokenReference], chain: Chain) -> Vec<TokenReference> {
    let mut tokens: Vec<TokenReference> = tokens
        .iter()
        .filter(|token| token.chain == chain)
        .filter_map(|token| {
            is_valid_address(&token.address.to_string(), chain).map(|address| TokenReference {
                address,
                ..token.clone()
            })
        })
        .collect();

    tokens.sort_by(|a, b| a.address.cmp(&b.address));
    tokens.dedup();
    tokens
}

impl QueryKey {
    /// `None` when there is nothing to read: no valid account or no valid
    /// token.
    pub fn tokens(account: Option<&str>, tokens: &[TokenReference], chain: Chain) -> Option<Self> {
        let account = is_valid_address(account?, chain)?;
        let tokens = canonical_tokens(tokens, chain);

        (!tokens.is_empty()).then(|| QueryKey::Tokens {
            chain,
            account,
            tokens,
        })
    }

    pub fn native<'a, I>(accounts: I, chain: Chain) -> Option<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let accounts = validate_addresses(accounts, chain);

        (!accounts.is_empty()).then(|| QueryKey::Native { chain, accounts })
    }

    pub fn earned(account: Option<&str>, chain: Chain, token: &TokenReference) -> Option<Self> {
        let account = is_valid_address(account?, chain)?;

        Some(QueryKey::Earned {
            chain,
            account,
            token: token.clone(),
        })
    }

    pub fn chain(&self) -> Chain {
        match self {
            QueryKey::Tokens { chain, .. }
            | QueryKey::Native { chain, .. }
            | QueryKey::Earned { chain, .. } => *chain,
        }
    }

    /// Addresses the result is keyed by once resolved.
    pub fn slots(&self) -> Vec<Address> {
        match self {
            QueryKey::Tokens { tokens, .. } => tokens.iter().map(|t| t.address.clone()).collect(),
            QueryKey::Native { accounts, .. } => accounts.clone(),
            QueryKey::Earned { token, .. } => vec![token.address.clone()],
        }
    }
}

/// Outcome of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Resolved(RawAmount),
    Absent,
}

impl From<Option<RawAmount>> for CallState {
    fn from(raw: Option<RawAmount>) -> Self {
        match raw {
            Some(raw) => CallState::Resolved(raw),
            None => CallState::Absent,
        }
    }
}

/// Per-slot read state of one cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub slots: BTreeMap<Address, CallState>,
}

impl Snapshot {
    pub fn pending(addresses: Vec<Address>) -> Self {
        Self {
            slots: addresses
                .into_iter()
                .map(|address| (address, CallState::Pending))
                .collect(),
        }
    }

    pub fn loading(&self) -> bool {
        self.slots.values().any(|state| *state == CallState::Pending)
    }

    pub fn resolved(&self, address: &Address) -> Option<&RawAmount> {
        match self.slots.get(address) {
            Some(CallState::Resolved(raw)) => Some(raw),
            _ => None,
        }
    }
}

/// Token address to balance. A token missing from the mapping has no known
/// balance, which is not the same as a zero balance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceMapping(BTreeMap<Address, TokenAmount>);

impl BalanceMapping {
    pub fn get(&self, token: &Address) -> Option<&TokenAmount> {
        self.0.get(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &TokenAmount)> {
        self.0.iter()
    }
}

impl Serialize for BalanceMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (address, amount) in &self.0 {
            map.serialize_entry(address, &amount.raw.to_string())?;
        }
        map.end()
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub balances: BalanceMapping,
    pub loading: bool,
}

impl BalanceSnapshot {
    pub fn from_tokens(tokens: &[TokenReference], snapshot: &Snapshot) -> Self {
        let balances = tokens
            .iter()
            .filter_map(|token| {
                snapshot
                    .resolved(&token.address)
                    .map(|raw| (token.address.clone(), TokenAmount::new(token.clone(), raw.clone())))
            })
            .collect();

        Self {
            balances: BalanceMapping(balances),
            loading: snapshot.loading(),
        }
    }
}

fn raws_to_str<S>(raws: &BTreeMap<Address, RawAmount>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(raws.iter().map(|(address, raw)| (address, raw.to_string())))
}

/// Account address to native currency balance.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeBalances {
    #[serde(serialize_with = "raws_to_str")]
    pub balances: BTreeMap<Address, RawAmount>,
    pub loading: bool,
}

impl NativeBalances {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let balances = snapshot
            .slots
            .iter()
            .filter_map(|(address, state)| match state {
                CallState::Resolved(raw) => Some((address.clone(), raw.clone())),
                _ => None,
            })
            .collect();

        Self {
            balances,
            loading: snapshot.loading(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{BalanceSnapshot, CallState, QueryKey, Snapshot};
    use providers::{address, chain::Chain, token::{RawAmount, TokenReference}};

    const ACCOUNT: &str = "0x0000000000000000000000000000000000000abc";

    fn token(address: &str, symbol: &str) -> TokenReference {
        TokenReference::new(Chain::Avalanche, address!(address), 18, symbol)
    }

    #[test]
    fn token_keys_ignore_order_and_duplicates() {
        let t1 = token("0x0000000000000000000000000000000000000001", "T1");
        let t2 = token("0x0000000000000000000000000000000000000002", "T2");

        let forward = QueryKey::tokens(Some(ACCOUNT), &[t1.clone(), t2.clone()], Chain::Avalanche);
        let backward = QueryKey::tokens(Some(ACCOUNT), &[t2.clone(), t1.clone(), t2], Chain::Avalanche);

        assert!(forward.is_some());
        assert_eq!(forward, backward);
    }

    #[test]
    fn token_keys_need_something_to_read() {
        let t1 = token("0x0000000000000000000000000000000000000001", "T1");

        assert!(QueryKey::tokens(None, &[t1.clone()], Chain::Avalanche).is_none());
        assert!(QueryKey::tokens(Some("nope"), &[t1.clone()], Chain::Avalanche).is_none());
        assert!(QueryKey::tokens(Some(ACCOUNT), &[], Chain::Avalanche).is_none());
        // token of another chain is filtered
        assert!(QueryKey::tokens(Some(ACCOUNT), &[t1], Chain::Fuji).is_none());
    }

    #[test]
    fn snapshot_keeps_absent_apart_from_zero() {
        let t1 = token("0x0000000000000000000000000000000000000001", "T1");
        let t2 = token("0x0000000000000000000000000000000000000002", "T2");
        let t3 = token("0x0000000000000000000000000000000000000003", "T3");

        let mut snapshot = Snapshot::pending(vec![t1.address.clone(), t2.address.clone(), t3.address.clone()]);
        assert!(snapshot.loading());

        snapshot.slots.insert(t1.address.clone(), CallState::Resolved(RawAmount::from(0u8)));
        snapshot.slots.insert(t2.address.clone(), CallState::Absent);
        snapshot.slots.insert(t3.address.clone(), CallState::Resolved(RawAmount::from(5u8)));

        let balances = BalanceSnapshot::from_tokens(&[t1.clone(), t2.clone(), t3], &snapshot);

        assert!(!balances.loading);
        assert_eq!(balances.balances.get(&t1.address).unwrap().raw, RawAmount::from(0u8));
        assert!(balances.balances.get(&t2.address).is_none());
        assert_eq!(
            serde_json::to_value(&balances).unwrap(),
            serde_json::json!({
                "balances": {
                    "0x0000000000000000000000000000000000000001": "0",
                    "0x0000000000000000000000000000000000000003": "5",
                },
                "loading": false,
            })
        );
    }
}
