#![deny(clippy::all)]
#![deny(clippy::dbg_macro)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use aggregator::AggregateBalanceService;
use anyhow::Error;
use env_logger::{Builder, Env};
use log::{error, info, warn};
use providers::config::Config;
use structopt::StructOpt;

mod api;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "Balance aggregator params",
    about = "Advanced parameters for the balance aggregator API."
)]
struct Opt {
    /// Set logging level
    #[structopt(short, long, default_value = "warn")]
    log: String,

    /// Set IP address
    #[structopt(long, short, default_value = "127.0.0.1")]
    ip: String,

    /// Set port number
    #[structopt(long, short, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> ! {
    let opt = Opt::from_args();

    Builder::from_env(Env::default().default_filter_or(opt.log)).init();

    let balances = match build_service() {
        Ok(balances) => balances,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    loop {
        if let Err(e) = try_main(&opt.ip, opt.port, balances.clone()).await {
            error!("{e}");
        } else {
            info!("Exiting gracefully");
            std::process::exit(0);
        }
    }
}

fn build_service() -> Result<AggregateBalanceService, Error> {
    let config = Config::from_env()?;
    let registry = config.build_registry()?;

    if registry.chains().is_empty() {
        warn!("No chain is configured, every request will be rejected");
    }

    Ok(AggregateBalanceService::new(registry, config.read_timeout).with_entry_ttl(config.entry_ttl))
}

async fn try_main(ip: &str, port: u16, balances: AggregateBalanceService) -> Result<(), Error> {
    info!("Listening on http://{}:{}", ip, port);

    use api::router::*;

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(balances.clone()))
            .service(token_balances)
            .service(aggregate_balance)
            .service(native_balances)
    })
    .bind((ip, port))
    .map_err(Error::msg)?
    .run()
    .await
    .map_err(Error::msg)
}
