use crate::{
    address::{is_valid_address, Address},
    chain::{Chain, ChainKind},
    errors::ConfigError,
    evm::{CallBatcher, EvmStrategy, RewardConfig, RpcClient},
    near::{NearRpc, NearStrategy},
    strategy::StrategyRegistry,
    token::TokenReference,
};
use log::{info, warn};
use std::{collections::HashMap, sync::Arc, time::Duration};
use web3::{transports::Http, Web3};

/// Multicall3 is deployed at the same address on every EVM chain we serve.
const MULTICALL3: &str = "0xca11bde05977b3631167028862be2a173976ca11";

struct ChainDefaults {
    multicall: Option<&'static str>,
    minichef: Option<&'static str>,
    reward_token: Option<(&'static str, u8, &'static str)>,
}

lazy_static::lazy_static! {
    static ref DEFAULTS: HashMap<Chain, ChainDefaults> = {
        let mut defaults = HashMap::new();

        defaults.insert(
            Chain::Avalanche,
            ChainDefaults {
                multicall: Some(MULTICALL3),
                minichef: Some("0x1f806f7c8ded893fd3cae279191ad7aa3798e928"),
                reward_token: Some(("0x60781c2586d68229fde47564546784ab3faca982", 18, "PNG")),
            },
        );
        for chain in [Chain::Fuji, Chain::Songbird, Chain::Coston] {
            defaults.insert(
                chain,
                ChainDefaults {
                    multicall: Some(MULTICALL3),
                    minichef: None,
                    reward_token: None,
                },
            );
        }

        defaults
    };
}

pub struct ChainConfig {
    pub chain: Chain,
    pub rpc_url: String,
    pub multicall: Option<Address>,
    pub minichef: Option<Address>,
    pub reward_token: Option<TokenReference>,
}

/// Settled balances are read again after this long unless overridden.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(30);

pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub read_timeout: Option<Duration>,
    /// `None` keeps settled balances until they are evicted.
    pub entry_ttl: Option<Duration>,
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    }
}

fn parse_address(var: &str, value: &str, chain: Chain) -> Result<Address, ConfigError> {
    is_valid_address(value, chain).ok_or_else(|| invalid(var, value))
}

/// `address:decimals:symbol`
fn parse_token(var: &str, value: &str, chain: Chain) -> Result<TokenReference, ConfigError> {
    let mut parts = value.splitn(3, ':');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(address), Some(decimals), Some(symbol)) if !symbol.is_empty() => {
            Ok(TokenReference::new(
                chain,
                parse_address(var, address, chain)?,
                decimals.parse().map_err(|_| invalid(var, value))?,
                symbol,
            ))
        }
        _ => Err(invalid(var, value)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut chains = Vec::new();

        for chain in Chain::ALL {
            let prefix = chain.env_prefix();
            let rpc_url = match lookup(&format!("{prefix}_RPC")) {
                Some(url) => url,
                None => continue,
            };

            let defaults = DEFAULTS.get(&chain);
            let optional_address = |name: &str, default: Option<&str>| {
                let var = format!("{prefix}_{name}");

                match lookup(&var) {
                    Some(value) if value.eq_ignore_ascii_case("none") => Ok(None),
                    Some(value) => parse_address(&var, &value, chain).map(Some),
                    None => default
                        .map(|value| parse_address(&var, value, chain))
                        .transpose(),
                }
            };

            let multicall = match chain.kind() {
                ChainKind::Evm => optional_address("MULTICALL", defaults.and_then(|d| d.multicall))?,
                ChainKind::Near => None,
            };
            let minichef = optional_address("MINICHEF", defaults.and_then(|d| d.minichef))?;

            let var = format!("{prefix}_REWARD_TOKEN");
            let reward_token = match lookup(&var) {
                Some(value) => Some(parse_token(&var, &value, chain)?),
                None => match defaults.and_then(|d| d.reward_token) {
                    Some((address, decimals, symbol)) => Some(TokenReference::new(
                        chain,
                        parse_address(&var, address, chain)?,
                        decimals,
                        symbol,
                    )),
                    None => None,
                },
            };

            chains.push(ChainConfig {
                chain,
                rpc_url,
                multicall,
                minichef,
                reward_token,
            });
        }

        let read_timeout = match lookup("BALANCE_READ_TIMEOUT_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => return Err(invalid("BALANCE_READ_TIMEOUT_SECS", &value)),
            },
            None => None,
        };

        let entry_ttl = match lookup("BALANCE_CACHE_TTL_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => return Err(invalid("BALANCE_CACHE_TTL_SECS", &value)),
            },
            None => Some(DEFAULT_ENTRY_TTL),
        };

        Ok(Self {
            chains,
            read_timeout,
            entry_ttl,
        })
    }

    pub fn build_registry(&self) -> Result<StrategyRegistry, ConfigError> {
        let mut registry = StrategyRegistry::new();

        for config in &self.chains {
            match config.chain.kind() {
                ChainKind::Evm => {
                    let transport = Http::new(&config.rpc_url)
                        .map_err(|_| ConfigError::InvalidRpcUrl(config.rpc_url.clone()))?;
                    let client: Arc<dyn RpcClient> = Arc::new(Web3::new(transport));
                    let multicall = config.multicall.as_ref().and_then(Address::as_evm);

                    if multicall.is_none() {
                        info!("{:?} reads will not be batched", config.chain);
                    }

                    let reward = match (&config.reward_token, config.minichef.as_ref().and_then(Address::as_evm)) {
                        (Some(token), Some(minichef)) => Some(RewardConfig {
                            token: token.clone(),
                            minichef,
                        }),
                        (None, None) => None,
                        _ => {
                            warn!(
                                "{:?} needs both a reward token and a reward contract, rewards disabled",
                                config.chain
                            );
                            None
                        }
                    };

                    registry.register(Arc::new(EvmStrategy::new(
                        config.chain,
                        CallBatcher::new(client, multicall),
                        reward,
                    )));
                }
                ChainKind::Near => {
                    registry.register(Arc::new(NearStrategy::new(
                        config.chain,
                        Arc::new(NearRpc::new(config.rpc_url.clone())),
                    )));
                }
            }
        }

        Ok(registry)
    }
}
