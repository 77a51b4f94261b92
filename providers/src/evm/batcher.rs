use crate::{
    errors::ProviderError,
    evm::{client::RpcClient, MULTICALL3},
};
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;
use web3::{
    ethabi::{Function, Token},
    types::H160,
};

/// One contract read: `function(args)` called on `target`.
pub struct ReadRequest {
    pub target: H160,
    pub function: &'static Function,
    pub args: Vec<Token>,
}

impl ReadRequest {
    pub fn new(target: H160, function: &'static Function, args: Vec<Token>) -> Self {
        Self {
            target,
            function,
            args,
        }
    }
}

/// Decoded outputs of a read, `None` if it failed.
pub type CallOutput = Option<Vec<Token>>;

/// Executes reads for a single chain in as few round trips as the chain
/// allows. Results always line up with the requests.
pub struct CallBatcher {
    client: Arc<dyn RpcClient>,
    multicall: Option<H160>,
}

impl CallBatcher {
    pub fn new(client: Arc<dyn RpcClient>, multicall: Option<H160>) -> Self {
        Self { client, multicall }
    }

    pub fn client(&self) -> &Arc<dyn RpcClient> {
        &self.client
    }

    pub fn multicall(&self) -> Option<H160> {
        self.multicall
    }

    pub fn supports_batching(&self) -> bool {
        self.multicall.is_some()
    }

    pub async fn execute(&self, requests: &[ReadRequest]) -> Vec<CallOutput> {
        if requests.is_empty() {
            return vec![];
        }

        match self.multicall {
            Some(multicall) => match self.aggregate(multicall, requests).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("aggregate call of {} reads failed: {e}", requests.len());
                    vec![None; requests.len()]
                }
            },
            None => {
                join_all(requests.iter().map(|request| async move {
                    self.call_one(request)
                        .await
                        .map_err(|e| warn!("{} on {:#x} failed: {e}", request.function.name, request.target))
                        .ok()
                }))
                .await
            }
        }
    }

    async fn call_one(&self, request: &ReadRequest) -> Result<Vec<Token>, ProviderError> {
        let data = request.function.encode_input(&request.args)?;
        let output = self.client.eth_call(request.target, data).await?;

        Ok(request.function.decode_output(&output)?)
    }

    async fn aggregate(
        &self,
        multicall: H160,
        requests: &[ReadRequest],
    ) -> Result<Vec<CallOutput>, ProviderError> {
        let aggregate3 = MULTICALL3.function("aggregate3")?;
        let mut results = vec![None; requests.len()];

        // requests that cannot be encoded stay absent and are left out of the batch
        let (indices, calls): (Vec<usize>, Vec<Token>) = requests
            .iter()
            .enumerate()
            .filter_map(|(idx, request)| match request.function.encode_input(&request.args) {
                Ok(data) => Some((
                    idx,
                    Token::Tuple(vec![
                        Token::Address(request.target),
                        Token::Bool(true),
                        Token::Bytes(data),
                    ]),
                )),
                Err(e) => {
                    warn!("cannot encode {}: {e}", request.function.name);
                    None
                }
            })
            .unzip();

        if calls.is_empty() {
            return Ok(results);
        }

        let data = aggregate3.encode_input(&[Token::Array(calls)])?;
        let output = self.client.eth_call(multicall, data).await?;

        let returned = match aggregate3.decode_output(&output)?.pop() {
            Some(Token::Array(returned)) if returned.len() == indices.len() => returned,
            _ => {
                return Err(ProviderError::Malformed(format!(
                    "aggregate3 did not return {} results",
                    indices.len()
                )))
            }
        };

        for (idx, item) in indices.into_iter().zip(returned) {
            let request = &requests[idx];

            results[idx] = match item {
                Token::Tuple(fields) => match fields.as_slice() {
                    [Token::Bool(true), Token::Bytes(bytes)] => request
                        .function
                        .decode_output(bytes)
                        .map_err(|e| debug!("cannot decode {}: {e}", request.function.name))
                        .ok(),
                    _ => {
                        debug!("{} on {:#x} reverted", request.function.name, request.target);
                        None
                    }
                },
                _ => None,
            };
        }

        Ok(results)
    }
}
