use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use log::{error, info, warn};

use campus_food::auth::{self, TokenService};
use campus_food::cache::FoodCache;
use campus_food::clock::SystemClock;
use campus_food::config::Config;
use campus_food::handlers;
use campus_food::state::{AppState, Backend};
use campus_food::store::{MemoryStore, MysqlStore, Store};

fn io_error(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load().map_err(io_error)?;

    // set up the store, falling back to memory when no database is configured
    let store: Box<dyn Store> = match &config.database_url {
        Some(url) => Box::new(MysqlStore::connect(url).map_err(|e| {
            error!("could not open the database pool: {e}");
            io_error(e)
        })?),
        None => Box::new(MemoryStore::new()),
    };

    let cache = match &config.redis_url {
        Some(url) => FoodCache::connect(url, config.cache_ttl_seconds).unwrap_or_else(|e| {
            warn!("redis unavailable, food list caching disabled: {e}");
            FoodCache::disabled()
        }),
        None => FoodCache::disabled(),
    };
    if cache.is_enabled() {
        info!("caching the food list in redis for {}s", config.cache_ttl_seconds);
    }

    let state = AppState::new(
        Backend { store, cache },
        TokenService::new(&config.jwt_secret, config.token_ttl_days),
        Arc::new(SystemClock),
        config.utc_offset,
    );

    if let Some(account) = config.admin.clone() {
        let now = state.now();
        let created = state
            .run(move |backend| auth::ensure_admin(backend.store.as_ref(), &account, now))
            .await;
        if let Err(e) = created {
            error!("admin bootstrap failed: {e:?}");
        }
    }

    let state = web::Data::new(state);
    let cors_origin = config.cors_origin.clone();

    info!("starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(handlers::cors_headers(&cors_origin))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
