use crate::api::types::{AggregateBalanceRequest, NativeBalancesRequest, TokenBalancesRequest};
use aggregator::{AggregateBalanceService, AggregatorError, BalanceSnapshot, NativeBalances};
use providers::{TokenAmount, TokenReference};

pub async fn token_balances(
    service: &AggregateBalanceService,
    request: &TokenBalancesRequest,
) -> Result<BalanceSnapshot, AggregatorError> {
    let tokens: Vec<TokenReference> = request
        .tokens
        .iter()
        .filter_map(|token| token.to_reference(request.chain))
        .collect();
    let account = request.account.as_deref();

    if request.settle.unwrap_or_default() {
        service
            .cache()
            .resolve_balances(account, &tokens, request.chain)
            .await
    } else {
        service.get_token_balances(account, &tokens, request.chain)
    }
}

pub async fn aggregate_balance(
    service: &AggregateBalanceService,
    request: &AggregateBalanceRequest,
) -> Result<Option<TokenAmount>, AggregatorError> {
    let account = request.account.as_deref();
    let token = match &request.token {
        Some(input) => match input.to_reference(request.chain) {
            Some(token) => Some(token),
            None => {
                // an invalid token is unknown, but the chain must still exist
                service.cache().strategy(request.chain)?;
                return Ok(None);
            }
        },
        None => None,
    };

    if request.settle.unwrap_or_default() {
        service
            .resolve_aggregate_balance(account, request.chain, token.as_ref())
            .await
    } else {
        service.get_aggregate_balance(account, request.chain, token.as_ref())
    }
}

pub async fn native_balances(
    service: &AggregateBalanceService,
    request: &NativeBalancesRequest,
) -> Result<NativeBalances, AggregatorError> {
    let accounts = request.accounts.iter().map(Option::as_deref);

    if request.settle.unwrap_or_default() {
        service
            .cache()
            .resolve_native_balances(request.chain, accounts)
            .await
    } else {
        service.get_native_balances(request.chain, accounts)
    }
}
