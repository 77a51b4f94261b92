use providers::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Balances were evicted before they resolved")]
    Evicted,
}
