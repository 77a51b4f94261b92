pub mod batcher;
pub mod client;
pub mod strategy;

pub use batcher::{CallBatcher, ReadRequest};
pub use client::RpcClient;
pub use strategy::{EvmStrategy, RewardConfig};

use crate::token::RawAmount;
use web3::{ethabi::Token, types::U256};

fn load_abi(abi: &[u8]) -> web3::ethabi::Contract {
    web3::ethabi::Contract::load(abi).expect("bundled ABI is valid JSON")
}

lazy_static::lazy_static! {
    pub static ref ERC20: web3::ethabi::Contract = load_abi(include_bytes!("abi/erc20.json"));
    pub static ref MULTICALL3: web3::ethabi::Contract = load_abi(include_bytes!("abi/multicall3.json"));
    pub static ref MINICHEF: web3::ethabi::Contract = load_abi(include_bytes!("abi/minichef.json"));
}

pub fn u256_to_raw(value: U256) -> RawAmount {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);

    RawAmount::from_bytes_be(&bytes)
}

/// First output of a decoded call, if it is an unsigned integer.
pub fn first_uint(tokens: &[Token]) -> Option<U256> {
    match tokens.first() {
        Some(Token::Uint(value)) => Some(*value),
        _ => None,
    }
}

#[cfg(test)]
pub mod testing {
    use super::{RpcClient, ERC20, MINICHEF, MULTICALL3};
    use crate::errors::ProviderError;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use web3::{
        ethabi::{encode, Function, Token},
        signing::keccak256,
        types::{H160, U256},
    };

    /// In-memory node answering ERC-20, Multicall3 and MiniChef reads.
    #[derive(Default)]
    pub struct MockClient {
        pub calls: AtomicUsize,
        pub balances: HashMap<(H160, H160), U256>,
        pub native: HashMap<H160, U256>,
        pub pending_rewards: Vec<Option<U256>>,
        pub fail_aggregate: bool,
    }

    impl MockClient {
        pub fn round_trips(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn selector_is(data: &[u8], function: &Function) -> bool {
            // signature() may carry the outputs after a ':'
            let signature = function.signature();
            let inputs = signature.split(':').next().unwrap_or_default();

            data.len() >= 4 && data[..4] == keccak256(inputs.as_bytes())[..4]
        }

        fn answer(&self, to: H160, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
            let revert = || ProviderError::Malformed("execution reverted".into());
            let balance_of = ERC20.function("balanceOf")?;
            let get_eth_balance = MULTICALL3.function("getEthBalance")?;
            let pool_length = MINICHEF.function("poolLength")?;
            let pending_reward = MINICHEF.function("pendingReward")?;

            if Self::selector_is(data, balance_of) {
                let args = balance_of.decode_input(&data[4..])?;
                let owner = args[0].clone().into_address().ok_or_else(revert)?;
                let balance = self.balances.get(&(to, owner)).ok_or_else(revert)?;

                Ok(encode(&[Token::Uint(*balance)]))
            } else if Self::selector_is(data, get_eth_balance) {
                let args = get_eth_balance.decode_input(&data[4..])?;
                let owner = args[0].clone().into_address().ok_or_else(revert)?;

                Ok(encode(&[Token::Uint(self.native.get(&owner).copied().unwrap_or_default())]))
            } else if Self::selector_is(data, pool_length) {
                Ok(encode(&[Token::Uint(self.pending_rewards.len().into())]))
            } else if Self::selector_is(data, pending_reward) {
                let args = pending_reward.decode_input(&data[4..])?;
                let pid = args[0].clone().into_uint().ok_or_else(revert)?;
                let reward = self
                    .pending_rewards
                    .get(pid.as_usize())
                    .copied()
                    .flatten()
                    .ok_or_else(revert)?;

                Ok(encode(&[Token::Uint(reward)]))
            } else {
                Err(revert())
            }
        }
    }

    #[async_trait]
    impl RpcClient for MockClient {
        async fn eth_call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let aggregate3 = MULTICALL3.function("aggregate3")?;

            if !Self::selector_is(&data, aggregate3) {
                return self.answer(to, &data);
            }

            if self.fail_aggregate {
                return Err(ProviderError::Malformed("node unavailable".into()));
            }

            let calls = match aggregate3.decode_input(&data[4..])?.pop() {
                Some(Token::Array(calls)) => calls,
                _ => return Err(ProviderError::Malformed("bad aggregate3 input".into())),
            };

            let results = calls
                .into_iter()
                .map(|call| match call {
                    Token::Tuple(fields) => match fields.as_slice() {
                        [Token::Address(target), Token::Bool(_), Token::Bytes(data)] => {
                            match self.answer(*target, data) {
                                Ok(output) => Token::Tuple(vec![Token::Bool(true), Token::Bytes(output)]),
                                Err(_) => Token::Tuple(vec![Token::Bool(false), Token::Bytes(vec![])]),
                            }
                        }
                        _ => Token::Tuple(vec![Token::Bool(false), Token::Bytes(vec![])]),
                    },
                    _ => Token::Tuple(vec![Token::Bool(false), Token::Bytes(vec![])]),
                })
                .collect();

            Ok(encode(&[Token::Array(results)]))
        }

        async fn balance(&self, account: H160) -> Result<U256, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            self.native
                .get(&account)
                .copied()
                .ok_or_else(|| ProviderError::Malformed("unknown account".into()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::{testing::MockClient, ERC20, MULTICALL3};
    use web3::{ethabi::Token, types::H160};

    #[test]
    fn mock_recognizes_encoded_calls() {
        let balance_of = ERC20.function("balanceOf").unwrap();
        let aggregate3 = MULTICALL3.function("aggregate3").unwrap();
        let data = balance_of
            .encode_input(&[Token::Address(H160::from_low_u64_be(1))])
            .unwrap();

        assert_eq!(data[..4], [0x70, 0xa0, 0x82, 0x31]);
        assert!(MockClient::selector_is(&data, balance_of));
        assert!(!MockClient::selector_is(&data, aggregate3));
        assert!(MockClient::selector_is(&[0x82, 0xad, 0x56, 0xcb], aggregate3));
    }
}
