#[macro_use]
extern crate diesel;

use actix_web::{middleware, web, App, HttpServer};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};

mod api;
mod config;
mod error;
mod models;
mod params;
mod payload;
mod query;
mod report;
mod schema;

use failsafe::backoff::{self, EqualJittered};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::StateMachine;

use crate::config::{BreakerConfig, Config};

pub(crate) type DbPool = r2d2::Pool<ConnectionManager<MysqlConnection>>;

/// Guards every store call; storage faults open it, client errors don't.
pub(crate) type Breaker = StateMachine<ConsecutiveFailures<EqualJittered>, ()>;

pub(crate) fn build_breaker(config: &BreakerConfig) -> Breaker {
    let backoff = backoff::equal_jittered(config.backoff_min, config.backoff_max);
    let policy = failure_policy::consecutive_failures(config.consecutive_failures, backoff);
    failsafe::Config::new().failure_policy(policy).build()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("{e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    // set up database connection pool
    let manager = ConnectionManager::<MysqlConnection>::new(config.database_url.as_str());
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_max_size)
        .build(manager)
        .map_err(|e| {
            log::error!("failed to create database pool: {e}");
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
    log::info!("database pool ready ({} connections max)", config.pool_max_size);

    let circuit_breaker = build_breaker(&config.breaker);

    log::info!("starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(circuit_breaker.clone()))
            .wrap(middleware::Logger::default())
            .configure(api::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
