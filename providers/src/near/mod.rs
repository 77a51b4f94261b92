use crate::{
    address::Address,
    chain::Chain,
    errors::ProviderError,
    strategy::BalanceStrategy,
    token::{RawAmount, TokenAmount, TokenReference},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::{future::join_all, stream::BoxStream, stream::FuturesUnordered, StreamExt};
use log::warn;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc};

/// A NEAR JSON-RPC `query` endpoint.
#[async_trait]
pub trait NearQuery: Send + Sync {
    async fn query(&self, params: Value) -> Result<Value, ProviderError>;
}

pub struct NearRpc {
    client: reqwest::Client,
    url: String,
}

impl NearRpc {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NearQuery for NearRpc {
    async fn query(&self, params: Value) -> Result<Value, ProviderError> {
        let res = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": "balance",
                "method": "query",
                "params": params,
            }))
            .send()
            .await?;

        match res.status() {
            StatusCode::OK => {
                let mut body: Value = res.json().await?;

                if let Some(error) = body.get("error") {
                    return Err(ProviderError::Malformed(error.to_string()));
                }

                Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
            }
            status => Err(ProviderError::Malformed(format!("NEAR RPC answered {status}"))),
        }
    }
}

/// Decodes the JSON string a `call_function` view returned, e.g. the output
/// of `ft_balance_of`.
fn parse_view_amount(result: &Value) -> Result<RawAmount, ProviderError> {
    if let Some(error) = result.get("error") {
        return Err(ProviderError::Malformed(error.to_string()));
    }

    let bytes: Vec<u8> = serde_json::from_value(result["result"].clone())
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let amount: String =
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    RawAmount::from_str(&amount).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// One point query per token; NEAR has no aggregator contract.
pub struct NearStrategy {
    chain: Chain,
    rpc: Arc<dyn NearQuery>,
}

impl NearStrategy {
    pub fn new(chain: Chain, rpc: Arc<dyn NearQuery>) -> Self {
        Self { chain, rpc }
    }

    async fn ft_balance_of(&self, account: &str, token: &str) -> Result<RawAmount, ProviderError> {
        let args = serde_json::to_vec(&json!({ "account_id": account }))
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let result = self
            .rpc
            .query(json!({
                "request_type": "call_function",
                "finality": "final",
                "account_id": token,
                "method_name": "ft_balance_of",
                "args_base64": STANDARD.encode(args),
            }))
            .await?;

        parse_view_amount(&result)
    }

    async fn view_account(&self, account: &str) -> Result<RawAmount, ProviderError> {
        let result = self
            .rpc
            .query(json!({
                "request_type": "view_account",
                "finality": "final",
                "account_id": account,
            }))
            .await?;

        let amount = result["amount"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("view_account without amount".into()))?;

        RawAmount::from_str(amount).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn token_balance(&self, account: &Address, token: &TokenReference) -> Option<RawAmount> {
        let (account, contract) = match (account.as_near(), token.address.as_near()) {
            (Some(account), Some(contract)) if token.chain == self.chain => (account, contract),
            _ => return None,
        };

        self.ft_balance_of(account, contract)
            .await
            .map_err(|e| warn!("ft_balance_of {contract} for {account} failed: {e}"))
            .ok()
    }
}

#[async_trait]
impl BalanceStrategy for NearStrategy {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn token_balances<'a>(
        &'a self,
        account: &'a Address,
        tokens: &'a [TokenReference],
    ) -> BoxStream<'a, (usize, Option<RawAmount>)> {
        tokens
            .iter()
            .enumerate()
            .map(|(idx, token)| async move { (idx, self.token_balance(account, token).await) })
            .collect::<FuturesUnordered<_>>()
            .boxed()
    }

    async fn native_balances(&self, accounts: &[Address]) -> Vec<Option<RawAmount>> {
        join_all(accounts.iter().map(|account| async move {
            match account.as_near() {
                Some(account_id) => self
                    .view_account(account_id)
                    .await
                    .map_err(|e| warn!("view_account {account_id} failed: {e}"))
                    .ok(),
                None => None,
            }
        }))
        .await
    }

    fn reward_token(&self) -> Option<&TokenReference> {
        None
    }

    async fn fetch_total_earned(&self, _account: &Address) -> Option<TokenAmount> {
        None
    }
}
