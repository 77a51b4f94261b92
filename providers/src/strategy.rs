use crate::{
    address::Address,
    chain::Chain,
    errors::ProviderError,
    token::{RawAmount, TokenAmount, TokenReference},
};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use log::info;
use std::{collections::HashMap, sync::Arc};

/// How one chain exposes balance data.
///
/// Reads that fail are reported as `None`; they are never retried.
#[async_trait]
pub trait BalanceStrategy: Send + Sync {
    fn chain(&self) -> Chain;

    /// Balances of `account` for every token, as `(index into tokens, raw)`
    /// pairs. Pairs may arrive in any order and one at a time.
    fn token_balances<'a>(
        &'a self,
        account: &'a Address,
        tokens: &'a [TokenReference],
    ) -> BoxStream<'a, (usize, Option<RawAmount>)>;

    async fn fetch_token_balance(
        &self,
        account: &Address,
        token: &TokenReference,
    ) -> Option<TokenAmount> {
        self.token_balances(account, std::slice::from_ref(token))
            .next()
            .await
            .and_then(|(_, raw)| raw)
            .map(|raw| TokenAmount::new(token.clone(), raw))
    }

    /// Native currency balances, one per account, in order.
    async fn native_balances(&self, accounts: &[Address]) -> Vec<Option<RawAmount>>;

    /// The token rewards are paid in, if the chain has a reward program.
    fn reward_token(&self) -> Option<&TokenReference>;

    /// Rewards accrued by `account` but not yet harvested.
    async fn fetch_total_earned(&self, account: &Address) -> Option<TokenAmount>;
}

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<Chain, Arc<dyn BalanceStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn BalanceStrategy>) {
        let chain = strategy.chain();

        if self.strategies.insert(chain, strategy).is_some() {
            info!("Replaced balance strategy for {chain:?}");
        } else {
            info!("Registered balance strategy for {chain:?}");
        }
    }

    pub fn get(&self, chain: Chain) -> Result<Arc<dyn BalanceStrategy>, ProviderError> {
        self.strategies
            .get(&chain)
            .cloned()
            .ok_or(ProviderError::UnsupportedChain(chain))
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.strategies.keys().copied().collect();
        chains.sort();
        chains
    }
}

#[cfg(test)]
mod test {
    use super::{BalanceStrategy, StrategyRegistry};
    use crate::{
        address::Address,
        chain::Chain,
        errors::ProviderError,
        token::{RawAmount, TokenAmount, TokenReference},
    };
    use async_trait::async_trait;
    use futures::{stream::BoxStream, StreamExt};
    use std::sync::Arc;

    struct Fixed(Chain);

    #[async_trait]
    impl BalanceStrategy for Fixed {
        fn chain(&self) -> Chain {
            self.0
        }

        fn token_balances<'a>(
            &'a self,
            _account: &'a Address,
            tokens: &'a [TokenReference],
        ) -> BoxStream<'a, (usize, Option<RawAmount>)> {
            futures::stream::iter((0..tokens.len()).map(|i| (i, Some(RawAmount::from(42u8))))).boxed()
        }

        async fn native_balances(&self, accounts: &[Address]) -> Vec<Option<RawAmount>> {
            vec![None; accounts.len()]
        }

        fn reward_token(&self) -> Option<&TokenReference> {
            None
        }

        async fn fetch_total_earned(&self, _account: &Address) -> Option<TokenAmount> {
            None
        }
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Fixed(Chain::Fuji)));

        assert!(registry.get(Chain::Fuji).is_ok());
        assert!(matches!(
            registry.get(Chain::Avalanche),
            Err(ProviderError::UnsupportedChain(Chain::Avalanche))
        ));
        assert_eq!(registry.chains(), vec![Chain::Fuji]);
    }

    #[tokio::test]
    async fn single_token_through_default_method() {
        let strategy = Fixed(Chain::Near);
        let account = Address::Near("alice.near".into());
        let token = TokenReference::new(Chain::Near, Address::Near("usdc.near".into()), 6, "USDC");

        let amount = strategy.fetch_token_balance(&account, &token).await.unwrap();

        assert_eq!(amount.raw, RawAmount::from(42u8));
        assert_eq!(amount.token, token);
    }
}
