use crate::api::{
    service,
    types::{AggregateBalanceRequest, ApiError, NativeBalancesRequest, TokenBalancesRequest},
};
use actix_web::{post, web, Responder};
use aggregator::AggregateBalanceService;

#[post("/tokenBalances")]
async fn token_balances(
    balances: web::Data<AggregateBalanceService>,
    body: web::Json<TokenBalancesRequest>,
) -> Result<impl Responder, ApiError> {
    log::info!("token_balances - {:?}", body);
    Ok(web::Json(service::token_balances(&balances, &body).await?))
}

#[post("/aggregateBalance")]
async fn aggregate_balance(
    balances: web::Data<AggregateBalanceService>,
    body: web::Json<AggregateBalanceRequest>,
) -> Result<impl Responder, ApiError> {
    log::info!("aggregate_balance - {:?}", body);
    Ok(web::Json(service::aggregate_balance(&balances, &body).await?))
}

#[post("/nativeBalances")]
async fn native_balances(
    balances: web::Data<AggregateBalanceService>,
    body: web::Json<NativeBalancesRequest>,
) -> Result<impl Responder, ApiError> {
    log::info!("native_balances - {:?}", body);
    Ok(web::Json(service::native_balances(&balances, &body).await?))
}
