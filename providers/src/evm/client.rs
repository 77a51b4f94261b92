use crate::errors::ProviderError;
use async_trait::async_trait;
use web3::{
    transports::Http,
    types::{Bytes, CallRequest, H160, U256},
    Web3,
};

/// The two node methods balance reads are built from.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn eth_call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, ProviderError>;

    async fn balance(&self, account: H160) -> Result<U256, ProviderError>;
}

#[async_trait]
impl RpcClient for Web3<Http> {
    async fn eth_call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
        let request = CallRequest {
            to: Some(to),
            data: Some(Bytes(data)),
            ..Default::default()
        };

        Ok(self.eth().call(request, None).await?.0)
    }

    async fn balance(&self, account: H160) -> Result<U256, ProviderError> {
        Ok(self.eth().balance(account, None).await?)
    }
}
