use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use aggregator::AggregatorError;
use providers::{is_valid_address, Chain, ProviderError, TokenReference};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenInput {
    pub address: String,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenInput {
    pub fn to_reference(&self, chain: Chain) -> Option<TokenReference> {
        is_valid_address(&self.address, chain)
            .map(|address| TokenReference::new(chain, address, self.decimals, self.symbol.clone()))
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalancesRequest {
    pub account: Option<String>,
    pub chain: Chain,
    pub tokens: Vec<TokenInput>,
    /// Wait until every read settled instead of answering right away.
    pub settle: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AggregateBalanceRequest {
    pub account: Option<String>,
    pub chain: Chain,
    pub token: Option<TokenInput>,
    pub settle: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NativeBalancesRequest {
    pub chain: Chain,
    pub accounts: Vec<Option<String>>,
    pub settle: Option<bool>,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError(pub AggregatorError);

impl From<AggregatorError> for ApiError {
    fn from(e: AggregatorError) -> Self {
        Self(e)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            AggregatorError::Provider(ProviderError::UnsupportedChain(_)) => StatusCode::BAD_REQUEST,
            AggregatorError::Evicted => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
