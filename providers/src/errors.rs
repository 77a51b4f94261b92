use crate::chain::Chain;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Chain `{0:?}` is not supported")]
    UnsupportedChain(Chain),
    #[error("Cannot add amounts of different tokens `{left}` and `{right}`")]
    TokenMismatch { left: String, right: String },
    #[error(transparent)]
    Web3(#[from] web3::Error),
    #[error(transparent)]
    Abi(#[from] web3::ethabi::Error),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value `{value}` for `{var}`")]
    InvalidValue { var: String, value: String },
    #[error("Invalid RPC url `{0}`")]
    InvalidRpcUrl(String),
}
