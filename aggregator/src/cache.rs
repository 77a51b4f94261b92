use crate::{
    errors::AggregatorError,
    types::{BalanceSnapshot, CallState, NativeBalances, QueryKey, Snapshot},
};
use futures::StreamExt;
use log::{debug, warn};
use providers::{
    address::Address,
    chain::Chain,
    strategy::{BalanceStrategy, StrategyRegistry},
    token::{TokenAmount, TokenReference},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    time::{Duration, Instant},
};
use tokio::sync::watch;

struct Entry {
    /// Unique per created entry; a fetch only writes into the entry it was
    /// started for.
    version: u64,
    holders: usize,
    /// Looked up outside of a handle; kept until it expires or is evicted.
    pinned: bool,
    created: Instant,
    tx: watch::Sender<Snapshot>,
}

impl Entry {
    /// Settled entries nobody holds are dropped once older than `ttl`.
    fn expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => {
                self.holders == 0 && self.created.elapsed() >= ttl && !self.tx.borrow().loading()
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Table {
    entries: RwLock<HashMap<QueryKey, Entry>>,
    versions: AtomicU64,
}

impl Table {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one read result. Returns `false` if `version` no longer owns
    /// `key`, in which case nothing is written.
    fn apply(&self, key: &QueryKey, version: u64, slot: &Address, state: CallState) -> bool {
        match self.read().get(key) {
            Some(entry) if entry.version == version => {
                entry.tx.send_modify(|snapshot| {
                    snapshot.slots.insert(slot.clone(), state);
                });
                true
            }
            _ => false,
        }
    }

    /// Turns every read of `key` that is still pending into an absent one.
    fn expire(&self, key: &QueryKey, version: u64) {
        if let Some(entry) = self.read().get(key).filter(|entry| entry.version == version) {
            if entry.tx.borrow().loading() {
                entry.tx.send_modify(|snapshot| {
                    for state in snapshot.slots.values_mut() {
                        if *state == CallState::Pending {
                            *state = CallState::Absent;
                        }
                    }
                });
            }
        }
    }
}

async fn fetch(strategy: Arc<dyn BalanceStrategy>, key: &QueryKey, version: u64, table: &Table) {
    let stale = || debug!("dropping stale {:?} results", key.chain());

    match key {
        QueryKey::Tokens {
            account, tokens, ..
        } => {
            let mut results = strategy.token_balances(account, tokens);

            while let Some((idx, raw)) = results.next().await {
                let token = match tokens.get(idx) {
                    Some(token) => token,
                    None => continue,
                };

                if !table.apply(key, version, &token.address, raw.into()) {
                    return stale();
                }
            }
        }
        QueryKey::Native { accounts, .. } => {
            let results = strategy.native_balances(accounts).await;

            for (account, raw) in accounts.iter().zip(results) {
                if !table.apply(key, version, account, raw.into()) {
                    return stale();
                }
            }
        }
        QueryKey::Earned { account, token, .. } => {
            let earned = strategy
                .fetch_total_earned(account)
                .await
                .filter(|earned| earned.token == *token)
                .map(|earned| earned.raw);

            if !table.apply(key, version, &token.address, earned.into()) {
                return stale();
            }
        }
    }

    // slots the strategy never reported
    table.expire(key, version);
}

/// Memoized balance reads keyed by [`QueryKey`].
///
/// The first lookup of a key starts its reads in the background and reports
/// every slot as pending. Later lookups of the same key are answered from the
/// table without touching the network. Must be used from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct DerivedBalanceCache {
    registry: Arc<StrategyRegistry>,
    table: Arc<Table>,
    read_timeout: Option<Duration>,
    entry_ttl: Option<Duration>,
}

impl DerivedBalanceCache {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            table: Arc::new(Table::default()),
            read_timeout: None,
            entry_ttl: None,
        }
    }

    /// Reads still pending after `read_timeout` are reported absent.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Settled results are read again once older than `entry_ttl`.
    pub fn with_entry_ttl(mut self, entry_ttl: Option<Duration>) -> Self {
        self.entry_ttl = entry_ttl;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn strategy(&self, chain: Chain) -> Result<Arc<dyn BalanceStrategy>, AggregatorError> {
        Ok(self.registry.get(chain)?)
    }

    pub fn handle(&self) -> BalanceHandle {
        BalanceHandle {
            cache: self.clone(),
            current: None,
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.table.read().contains_key(key)
    }

    /// Drops `key`; results of its reads still in flight are discarded.
    pub fn evict(&self, key: &QueryKey) -> bool {
        self.table.write().remove(key).is_some()
    }

    fn acquire(&self, key: &QueryKey, hold: bool) -> Result<watch::Receiver<Snapshot>, AggregatorError> {
        let strategy = self.strategy(key.chain())?;
        let mut entries = self.table.write();

        if let Some(entry) = entries.get_mut(key).filter(|entry| !entry.expired(self.entry_ttl)) {
            if hold {
                entry.holders += 1;
            } else {
                entry.pinned = true;
            }
            return Ok(entry.tx.subscribe());
        }

        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(self.entry_ttl));
        if entries.len() < before {
            debug!("dropped {} expired entries", before - entries.len());
        }

        let version = self.table.versions.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(Snapshot::pending(key.slots()));

        entries.insert(
            key.clone(),
            Entry {
                version,
                holders: usize::from(hold),
                pinned: !hold,
                created: Instant::now(),
                tx,
            },
        );
        drop(entries);

        debug!("reading {} slots on {:?}", key.slots().len(), key.chain());
        self.spawn_fetch(strategy, key.clone(), version);

        Ok(rx)
    }

    fn release(&self, key: &QueryKey) {
        let mut entries = self.table.write();

        if let Some(entry) = entries.get_mut(key) {
            entry.holders = entry.holders.saturating_sub(1);

            if entry.holders == 0 && !entry.pinned {
                entries.remove(key);
            }
        }
    }

    fn spawn_fetch(&self, strategy: Arc<dyn BalanceStrategy>, key: QueryKey, version: u64) {
        let table = Arc::clone(&self.table);
        let read_timeout = self.read_timeout;

        tokio::spawn(async move {
            let reads = fetch(strategy, &key, version, &table);

            match read_timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, reads).await.is_err() {
                        warn!("{:?} reads timed out after {limit:?}", key.chain());
                        table.expire(&key, version);
                    }
                }
                None => reads.await,
            }
        });
    }

    /// Current state of `key`, starting its reads if it is new.
    pub fn snapshot(&self, key: &QueryKey) -> Result<Snapshot, AggregatorError> {
        let rx = self.acquire(key, false)?;
        let snapshot = rx.borrow().clone();

        Ok(snapshot)
    }

    /// Waits until no read of `key` is pending.
    pub async fn settle(&self, key: &QueryKey) -> Result<Snapshot, AggregatorError> {
        let mut rx = self.acquire(key, false)?;

        loop {
            {
                let snapshot = rx.borrow();
                if !snapshot.loading() {
                    return Ok(snapshot.clone());
                }
            }

            rx.changed().await.map_err(|_| AggregatorError::Evicted)?;
        }
    }

    pub fn get_balances(
        &self,
        account: Option<&str>,
        tokens: &[TokenReference],
        chain: Chain,
    ) -> Result<BalanceSnapshot, AggregatorError> {
        self.strategy(chain)?;

        match QueryKey::tokens(account, tokens, chain) {
            Some(key) => {
                let snapshot = self.snapshot(&key)?;
                Ok(balances_of(&key, &snapshot))
            }
            None => Ok(BalanceSnapshot::default()),
        }
    }

    pub async fn resolve_balances(
        &self,
        account: Option<&str>,
        tokens: &[TokenReference],
        chain: Chain,
    ) -> Result<BalanceSnapshot, AggregatorError> {
        self.strategy(chain)?;

        match QueryKey::tokens(account, tokens, chain) {
            Some(key) => {
                let snapshot = self.settle(&key).await?;
                Ok(balances_of(&key, &snapshot))
            }
            None => Ok(BalanceSnapshot::default()),
        }
    }

    pub fn get_native_balances<'a, I>(&self, chain: Chain, accounts: I) -> Result<NativeBalances, AggregatorError>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        self.strategy(chain)?;

        match QueryKey::native(accounts, chain) {
            Some(key) => Ok(NativeBalances::from_snapshot(&self.snapshot(&key)?)),
            None => Ok(NativeBalances::default()),
        }
    }

    pub async fn resolve_native_balances<'a, I>(
        &self,
        chain: Chain,
        accounts: I,
    ) -> Result<NativeBalances, AggregatorError>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        self.strategy(chain)?;

        match QueryKey::native(accounts, chain) {
            Some(key) => Ok(NativeBalances::from_snapshot(&self.settle(&key).await?)),
            None => Ok(NativeBalances::default()),
        }
    }

    fn earned_key(&self, account: Option<&str>, chain: Chain) -> Result<Option<(QueryKey, TokenReference)>, AggregatorError> {
        let strategy = self.strategy(chain)?;

        Ok(strategy.reward_token().and_then(|token| {
            QueryKey::earned(account, chain, token).map(|key| (key, token.clone()))
        }))
    }

    /// Unharvested rewards of `account`, absent while loading or when the
    /// chain has no reward token.
    pub fn get_earned(&self, account: Option<&str>, chain: Chain) -> Result<Option<TokenAmount>, AggregatorError> {
        match self.earned_key(account, chain)? {
            Some((key, token)) => Ok(self
                .snapshot(&key)?
                .resolved(&token.address)
                .map(|raw| TokenAmount::new(token, raw.clone()))),
            None => Ok(None),
        }
    }

    pub async fn resolve_earned(
        &self,
        account: Option<&str>,
        chain: Chain,
    ) -> Result<Option<TokenAmount>, AggregatorError> {
        match self.earned_key(account, chain)? {
            Some((key, token)) => Ok(self
                .settle(&key)
                .await?
                .resolved(&token.address)
                .map(|raw| TokenAmount::new(token, raw.clone()))),
            None => Ok(None),
        }
    }
}

fn balances_of(key: &QueryKey, snapshot: &Snapshot) -> BalanceSnapshot {
    match key {
        QueryKey::Tokens { tokens, .. } => BalanceSnapshot::from_tokens(tokens, snapshot),
        _ => BalanceSnapshot::default(),
    }
}

/// One consumer's view of the cache. Observing new inputs releases the
/// previous key; an entry no handle observes any more is dropped together
/// with the results of its reads still in flight.
pub struct BalanceHandle {
    cache: DerivedBalanceCache,
    current: Option<(QueryKey, watch::Receiver<Snapshot>)>,
}

impl BalanceHandle {
    pub fn observe(
        &mut self,
        account: Option<&str>,
        tokens: &[TokenReference],
        chain: Chain,
    ) -> Result<BalanceSnapshot, AggregatorError> {
        self.cache.strategy(chain)?;

        let key = QueryKey::tokens(account, tokens, chain);
        let unchanged = match (&self.current, &key) {
            (Some((current, _)), Some(key)) => current == key,
            (None, None) => true,
            _ => false,
        };

        if !unchanged {
            let next = match key {
                Some(key) => {
                    let rx = self.cache.acquire(&key, true)?;
                    Some((key, rx))
                }
                None => None,
            };

            if let Some((previous, _)) = std::mem::replace(&mut self.current, next) {
                self.cache.release(&previous);
            }
        }

        Ok(self.snapshot())
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.current.as_ref().map(|(key, _)| key)
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        match &self.current {
            Some((key, rx)) => balances_of(key, &rx.borrow()),
            None => BalanceSnapshot::default(),
        }
    }

    /// Waits for the next update of the observed key. `None` if nothing is
    /// observed or the entry was evicted.
    pub async fn changed(&mut self) -> Option<BalanceSnapshot> {
        let (_, rx) = self.current.as_mut()?;
        rx.changed().await.ok()?;

        Some(self.snapshot())
    }
}

impl Drop for BalanceHandle {
    fn drop(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.cache.release(&key);
        }
    }
}
