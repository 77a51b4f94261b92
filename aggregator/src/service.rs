use crate::{
    cache::DerivedBalanceCache,
    errors::AggregatorError,
    types::{BalanceSnapshot, NativeBalances},
};
use providers::{
    chain::Chain,
    strategy::StrategyRegistry,
    token::{Currency, CurrencyAmount, TokenAmount, TokenReference},
};
use std::time::Duration;

/// `direct + earned`, each term counting as zero when the other is known.
/// Both terms missing means nothing is known about the token.
fn combine(
    token: TokenReference,
    direct: Option<TokenAmount>,
    earned: Option<TokenAmount>,
) -> Result<Option<TokenAmount>, AggregatorError> {
    let earned = earned.filter(|earned| earned.token == token);

    if direct.is_none() && earned.is_none() {
        return Ok(None);
    }

    let direct = direct.unwrap_or_else(|| TokenAmount::zero(token.clone()));
    let earned = earned.unwrap_or_else(|| TokenAmount::zero(token));

    Ok(Some(direct.checked_add(&earned)?))
}

/// The query surface handed to callers: wallet balances, native balances and
/// wallet-plus-unharvested totals, all backed by one [`DerivedBalanceCache`].
#[derive(Clone)]
pub struct AggregateBalanceService {
    cache: DerivedBalanceCache,
}

impl AggregateBalanceService {
    pub fn new(registry: StrategyRegistry, read_timeout: Option<Duration>) -> Self {
        Self {
            cache: DerivedBalanceCache::new(registry).with_read_timeout(read_timeout),
        }
    }

    /// See [`DerivedBalanceCache::with_entry_ttl`].
    pub fn with_entry_ttl(mut self, entry_ttl: Option<Duration>) -> Self {
        self.cache = self.cache.with_entry_ttl(entry_ttl);
        self
    }

    pub fn cache(&self) -> &DerivedBalanceCache {
        &self.cache
    }

    pub fn get_token_balances(
        &self,
        account: Option<&str>,
        tokens: &[TokenReference],
        chain: Chain,
    ) -> Result<BalanceSnapshot, AggregatorError> {
        self.cache.get_balances(account, tokens, chain)
    }

    pub fn get_token_balance(
        &self,
        account: Option<&str>,
        token: &TokenReference,
    ) -> Result<Option<TokenAmount>, AggregatorError> {
        Ok(self
            .cache
            .get_balances(account, std::slice::from_ref(token), token.chain)?
            .balances
            .get(&token.address)
            .cloned())
    }

    pub fn get_native_balances<'a, I>(&self, chain: Chain, accounts: I) -> Result<NativeBalances, AggregatorError>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        self.cache.get_native_balances(chain, accounts)
    }

    /// One entry per input currency, in input order. Unknown currencies and
    /// currencies of other chains are `None`.
    pub fn get_currency_balances(
        &self,
        chain: Chain,
        account: Option<&str>,
        currencies: &[Option<Currency>],
    ) -> Result<Vec<Option<CurrencyAmount>>, AggregatorError> {
        let tokens: Vec<TokenReference> = currencies
            .iter()
            .filter_map(|currency| match currency {
                Some(Currency::Token(token)) => Some(token.clone()),
                _ => None,
            })
            .collect();
        let has_native = currencies
            .iter()
            .any(|currency| matches!(currency, Some(Currency::Native { chain: c }) if *c == chain));

        let token_balances = self.cache.get_balances(account, &tokens, chain)?;
        let native_balances = if has_native {
            self.cache.get_native_balances(chain, [account])?
        } else {
            NativeBalances::default()
        };
        let native = account
            .and_then(|account| providers::is_valid_address(account, chain))
            .and_then(|account| native_balances.balances.get(&account).cloned());

        Ok(currencies
            .iter()
            .map(|currency| match currency {
                Some(Currency::Token(token)) => token_balances
                    .balances
                    .get(&token.address)
                    .filter(|amount| amount.token == *token)
                    .cloned()
                    .map(CurrencyAmount::Token),
                Some(Currency::Native { chain: c }) if *c == chain => native
                    .clone()
                    .map(|raw| CurrencyAmount::Native { chain, raw }),
                _ => None,
            })
            .collect())
    }

    fn aggregate_token(&self, chain: Chain, token: Option<&TokenReference>) -> Result<Option<TokenReference>, AggregatorError> {
        let strategy = self.cache.strategy(chain)?;

        Ok(token
            .or_else(|| strategy.reward_token())
            .filter(|token| token.chain == chain)
            .cloned())
    }

    fn pays_rewards_in(&self, chain: Chain, token: &TokenReference) -> Result<bool, AggregatorError> {
        Ok(self.cache.strategy(chain)?.reward_token() == Some(token))
    }

    /// Wallet balance plus unharvested rewards of `token`, which defaults to
    /// the chain's reward token. `None` if the token is unknown or neither
    /// term is known yet.
    pub fn get_aggregate_balance(
        &self,
        account: Option<&str>,
        chain: Chain,
        token: Option<&TokenReference>,
    ) -> Result<Option<TokenAmount>, AggregatorError> {
        let token = match self.aggregate_token(chain, token)? {
            Some(token) => token,
            None => return Ok(None),
        };

        let direct = self.get_token_balance(account, &token)?;
        let earned = if self.pays_rewards_in(chain, &token)? {
            self.cache.get_earned(account, chain)?
        } else {
            None
        };

        combine(token, direct, earned)
    }

    /// Same as [`Self::get_aggregate_balance`], once every read settled.
    pub async fn resolve_aggregate_balance(
        &self,
        account: Option<&str>,
        chain: Chain,
        token: Option<&TokenReference>,
    ) -> Result<Option<TokenAmount>, AggregatorError> {
        let token = match self.aggregate_token(chain, token)? {
            Some(token) => token,
            None => return Ok(None),
        };

        let rewarded = self.pays_rewards_in(chain, &token)?;
        let earned = async {
            if rewarded {
                self.cache.resolve_earned(account, chain).await
            } else {
                Ok(None)
            }
        };

        let (direct, earned) = futures::try_join!(
            self.cache
                .resolve_balances(account, std::slice::from_ref(&token), chain),
            earned,
        )?;

        combine(token.clone(), direct.balances.get(&token.address).cloned(), earned)
    }
}

#[cfg(test)]
mod test {
    use super::AggregateBalanceService;
    use crate::errors::AggregatorError;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use providers::{
        address::Address,
        chain::Chain,
        errors::ProviderError,
        strategy::{BalanceStrategy, StrategyRegistry},
        token::{Currency, CurrencyAmount, RawAmount, TokenAmount, TokenReference},
        H160,
    };
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    const ACCOUNT: &str = "0x0000000000000000000000000000000000000abc";

    fn token(n: u64) -> TokenReference {
        TokenReference::new(Chain::Avalanche, Address::Evm(H160::from_low_u64_be(n)), 18, format!("T{n}"))
    }

    #[derive(Default)]
    struct Wallet {
        balances: HashMap<Address, u64>,
        native: Option<u64>,
        reward: Option<TokenReference>,
        earned: Option<u64>,
        earned_reads: AtomicUsize,
    }

    #[async_trait]
    impl BalanceStrategy for Wallet {
        fn chain(&self) -> Chain {
            Chain::Avalanche
        }

        fn token_balances<'a>(
            &'a self,
            _account: &'a Address,
            tokens: &'a [TokenReference],
        ) -> BoxStream<'a, (usize, Option<RawAmount>)> {
            futures::stream::iter(tokens.iter().enumerate().map(|(idx, token)| {
                (idx, self.balances.get(&token.address).map(|b| RawAmount::from(*b)))
            }))
            .boxed()
        }

        async fn native_balances(&self, accounts: &[Address]) -> Vec<Option<RawAmount>> {
            accounts.iter().map(|_| self.native.map(RawAmount::from)).collect()
        }

        fn reward_token(&self) -> Option<&TokenReference> {
            self.reward.as_ref()
        }

        async fn fetch_total_earned(&self, _account: &Address) -> Option<TokenAmount> {
            self.earned_reads.fetch_add(1, Ordering::SeqCst);
            let token = self.reward.clone()?;
            self.earned.map(|earned| TokenAmount::new(token, earned))
        }
    }

    fn service(wallet: Wallet) -> (AggregateBalanceService, Arc<Wallet>) {
        let wallet = Arc::new(wallet);
        let mut registry = StrategyRegistry::new();
        registry.register(wallet.clone());

        (AggregateBalanceService::new(registry, None), wallet)
    }

    #[tokio::test]
    async fn missing_wallet_balance_counts_as_zero() {
        let (service, _) = service(Wallet {
            reward: Some(token(1)),
            earned: Some(300),
            ..Default::default()
        });

        let total = service
            .resolve_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, None)
            .await
            .unwrap();

        assert_eq!(total, Some(TokenAmount::new(token(1), 300u32)));
    }

    #[tokio::test]
    async fn wallet_and_rewards_are_summed() {
        let mut balances = HashMap::new();
        balances.insert(token(1).address, 1_000);

        let (service, wallet) = service(Wallet {
            balances,
            reward: Some(token(1)),
            earned: Some(234),
            ..Default::default()
        });

        let total = service
            .resolve_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(total.raw, RawAmount::from(1_234u32));

        // settled, so the reactive variant now sees the same values
        let again = service
            .get_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, Some(&token(1)))
            .unwrap();
        assert_eq!(again, Some(total));
        assert_eq!(wallet.earned_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nothing_known_is_absent() {
        let (service, _) = service(Wallet {
            reward: Some(token(1)),
            ..Default::default()
        });

        assert_eq!(
            service
                .resolve_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, None)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn other_token_without_wallet_balance_is_absent() {
        let (service, wallet) = service(Wallet {
            reward: Some(token(1)),
            earned: Some(300),
            ..Default::default()
        });

        assert_eq!(
            service
                .resolve_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, Some(&token(2)))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            service
                .get_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, Some(&token(2)))
                .unwrap(),
            None
        );
        assert_eq!(wallet.earned_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_reward_token_is_absent() {
        let mut balances = HashMap::new();
        balances.insert(token(1).address, 1_000);
        let (service, _) = service(Wallet {
            balances,
            ..Default::default()
        });

        assert_eq!(
            service
                .resolve_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, None)
                .await
                .unwrap(),
            None
        );
        // an explicit token still gets its wallet balance
        assert_eq!(
            service
                .resolve_aggregate_balance(Some(ACCOUNT), Chain::Avalanche, Some(&token(1)))
                .await
                .unwrap(),
            Some(TokenAmount::new(token(1), 1_000u32))
        );
    }

    #[tokio::test]
    async fn unsupported_chain_propagates() {
        let (service, _) = service(Wallet::default());

        assert!(matches!(
            service.get_aggregate_balance(Some(ACCOUNT), Chain::Fuji, None),
            Err(AggregatorError::Provider(ProviderError::UnsupportedChain(Chain::Fuji)))
        ));
    }

    #[tokio::test]
    async fn currency_balances_follow_input_order() {
        let mut balances = HashMap::new();
        balances.insert(token(1).address, 10);
        let (service, _) = service(Wallet {
            balances,
            native: Some(5),
            ..Default::default()
        });
        let currencies = [
            Some(Currency::Token(token(1))),
            None,
            Some(Currency::Native { chain: Chain::Avalanche }),
            Some(Currency::Token(token(2))),
        ];

        service
            .cache()
            .resolve_balances(Some(ACCOUNT), &[token(1), token(2)], Chain::Avalanche)
            .await
            .unwrap();
        service
            .cache()
            .resolve_native_balances(Chain::Avalanche, [Some(ACCOUNT)])
            .await
            .unwrap();

        assert_eq!(
            service
                .get_currency_balances(Chain::Avalanche, Some(ACCOUNT), &currencies)
                .unwrap(),
            vec![
                Some(CurrencyAmount::Token(TokenAmount::new(token(1), 10u8))),
                None,
                Some(CurrencyAmount::Native {
                    chain: Chain::Avalanche,
                    raw: RawAmount::from(5u8)
                }),
                None,
            ]
        );
    }
}
