use crate::{
    address::Address,
    chain::Chain,
    evm::{
        batcher::{CallBatcher, ReadRequest},
        first_uint, u256_to_raw, ERC20, MINICHEF, MULTICALL3,
    },
    strategy::BalanceStrategy,
    token::{RawAmount, TokenAmount, TokenReference},
};
use async_trait::async_trait;
use futures::{future::join_all, stream::BoxStream, StreamExt};
use log::warn;
use web3::{ethabi::Token, types::H160};

/// Upper bound on the pools scanned for pending rewards.
const MAX_POOLS: u64 = 1024;

pub struct RewardConfig {
    pub token: TokenReference,
    pub minichef: H160,
}

/// Balances read through ERC-20 calls, coalesced by the chain's
/// [`CallBatcher`].
pub struct EvmStrategy {
    chain: Chain,
    batcher: CallBatcher,
    reward: Option<RewardConfig>,
}

impl EvmStrategy {
    pub fn new(chain: Chain, batcher: CallBatcher, reward: Option<RewardConfig>) -> Self {
        Self {
            chain,
            batcher,
            reward,
        }
    }

    /// Runs `requests`, where `None` marks an input that could not be turned
    /// into a read, and returns the first uint of every output.
    async fn read_uints(&self, requests: Vec<Option<ReadRequest>>) -> Vec<Option<RawAmount>> {
        let mut results = vec![None; requests.len()];
        let (indices, requests): (Vec<usize>, Vec<ReadRequest>) = requests
            .into_iter()
            .enumerate()
            .filter_map(|(idx, request)| request.map(|r| (idx, r)))
            .unzip();

        let outputs = self.batcher.execute(&requests).await;

        for (idx, output) in indices.into_iter().zip(outputs) {
            results[idx] = output
                .as_deref()
                .and_then(first_uint)
                .map(u256_to_raw);
        }

        results
    }

    async fn balances_of(&self, account: &Address, tokens: &[TokenReference]) -> Vec<Option<RawAmount>> {
        let (owner, balance_of) = match (account.as_evm(), ERC20.function("balanceOf")) {
            (Some(owner), Ok(balance_of)) => (owner, balance_of),
            (None, _) => return vec![None; tokens.len()],
            (_, Err(e)) => {
                warn!("{e}");
                return vec![None; tokens.len()];
            }
        };

        let requests = tokens
            .iter()
            .map(|token| {
                token
                    .address
                    .as_evm()
                    .filter(|_| token.chain == self.chain)
                    .map(|target| ReadRequest::new(target, balance_of, vec![Token::Address(owner)]))
            })
            .collect();

        self.read_uints(requests).await
    }

    async fn pool_count(&self, minichef: H160) -> Option<u64> {
        let pool_length = MINICHEF.function("poolLength").ok()?;
        let count = self
            .read_uints(vec![Some(ReadRequest::new(minichef, pool_length, vec![]))])
            .await
            .pop()
            .flatten()?;

        match u64::try_from(count) {
            Ok(count) if count <= MAX_POOLS => Some(count),
            _ => {
                warn!("{:?} reward contract reports an implausible pool count", self.chain);
                None
            }
        }
    }
}

#[async_trait]
impl BalanceStrategy for EvmStrategy {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn token_balances<'a>(
        &'a self,
        account: &'a Address,
        tokens: &'a [TokenReference],
    ) -> BoxStream<'a, (usize, Option<RawAmount>)> {
        // one batched round trip, so every result lands at once
        futures::stream::once(self.balances_of(account, tokens))
            .flat_map(|results| futures::stream::iter(results.into_iter().enumerate()))
            .boxed()
    }

    async fn native_balances(&self, accounts: &[Address]) -> Vec<Option<RawAmount>> {
        match (self.batcher.multicall(), MULTICALL3.function("getEthBalance")) {
            (Some(multicall), Ok(get_eth_balance)) => {
                let requests = accounts
                    .iter()
                    .map(|account| {
                        account.as_evm().map(|owner| {
                            ReadRequest::new(multicall, get_eth_balance, vec![Token::Address(owner)])
                        })
                    })
                    .collect();

                self.read_uints(requests).await
            }
            _ => {
                let client = self.batcher.client();

                join_all(accounts.iter().map(|account| async move {
                    match account.as_evm() {
                        Some(owner) => client
                            .balance(owner)
                            .await
                            .map_err(|e| warn!("native balance of {account} failed: {e}"))
                            .ok()
                            .map(u256_to_raw),
                        None => None,
                    }
                }))
                .await
            }
        }
    }

    fn reward_token(&self) -> Option<&TokenReference> {
        self.reward.as_ref().map(|reward| &reward.token)
    }

    async fn fetch_total_earned(&self, account: &Address) -> Option<TokenAmount> {
        let reward = self.reward.as_ref()?;
        let owner = account.as_evm()?;
        let pending_reward = MINICHEF.function("pendingReward").ok()?;

        let count = self.pool_count(reward.minichef).await?;

        let requests = (0..count)
            .map(|pid| {
                Some(ReadRequest::new(
                    reward.minichef,
                    pending_reward,
                    vec![Token::Uint(pid.into()), Token::Address(owner)],
                ))
            })
            .collect();

        let pending = self.read_uints(requests).await;

        if count > 0 && pending.iter().all(Option::is_none) {
            return None;
        }

        let total = pending.into_iter().flatten().sum::<RawAmount>();

        Some(TokenAmount::new(reward.token.clone(), total))
    }
}
