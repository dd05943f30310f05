mod catalog;
mod config;
mod errors;
mod handlers;
mod ids;
mod middleware;
mod models;
mod store;

use actix_web::{web, App, HttpServer};
use config::AppConfig;
use ids::{IdGenerator, RandomIdGenerator};
use middleware::AccessHeaders;
use std::sync::Arc;
use store::{FileStore, RecordStore};
use tracing::{info, Level};
use tracing_subscriber::{self, EnvFilter};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("actix_web=info".parse().unwrap())
                .add_directive("storefront_api=debug".parse().unwrap())
        )
        .init();

    info!("Starting storefront API server");

    let config = AppConfig::init().expect("Failed to load configuration");

    let store = FileStore::connect(&config.data_dir).expect("Failed to open record store");
    info!("Record store ready at {}", config.data_dir.display());

    let store: Arc<dyn RecordStore> = Arc::new(store);
    let ids: Arc<dyn IdGenerator> = Arc::new(RandomIdGenerator);
    let store_data = web::Data::new(store);
    let ids_data = web::Data::new(ids);
    let config_data = web::Data::new(config.clone());
    let origins = config.allowed_origins.clone();

    info!("Listening on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::cors(&origins))
            .wrap(AccessHeaders)
            .wrap(TracingLogger::default())
            .app_data(store_data.clone())
            .app_data(ids_data.clone())
            .app_data(config_data.clone())
            .configure(handlers::routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
