use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use env_logger::Env;
use log::{info, LevelFilter};
use std::io;
use std::sync::Arc;

use ridepool_api::config::Config;
use ridepool_api::database::Stores;
use ridepool_api::routes::configure_routes;
use ridepool_api::services::{ChannelPublisher, MatchingEngine, PoolLifecycleManager};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to the TOML configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: String,
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // 1. Parse command line arguments and setup logging
    let args = Args::parse();
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level.to_string())).init();

    // 2. Load configuration
    let config = Config::load(&args.config)
        .map_err(|e| startup_error("Failed to load configuration", e))?;

    info!("Starting Ride Pool API...");
    info!("Configuration loaded: {:?}", config);

    // 3. Storage, notifications and pooling services
    let stores = Stores::from_config(&config.database)
        .await
        .map_err(|e| startup_error("Failed to initialize storage", e))?;

    let publisher = Arc::new(ChannelPublisher::new(
        config.notifications.channel_capacity,
    ));
    let lifecycle = Arc::new(PoolLifecycleManager::new(
        &stores,
        publisher.clone(),
        config.lifecycle.clone(),
    ));
    let engine = Arc::new(MatchingEngine::new(
        stores.requests.clone(),
        lifecycle.clone(),
        config.matching.clone(),
        config.pricing.clone(),
    ));

    // Build bind address from config
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Server will be available at http://{}", bind_addr);

    let shared_config = Arc::new(config.clone());
    let engine = web::Data::from(engine);
    let lifecycle = web::Data::from(lifecycle);
    let publisher = web::Data::from(publisher);

    HttpServer::new(move || {
        // Configure CORS from config
        let allowed_origins = config.cors.allowed_origins.clone();

        // Use allowed_origin_fn for more flexible origin matching
        let cors = Cors::default().allowed_origin_fn(move |origin, _req_head| {
            let origin_str = match origin.to_str() {
                Ok(s) => s,
                Err(_) => return false,
            };
            allowed_origins.iter().any(|allowed| origin_str == allowed)
        });

        // Convert string methods to HTTP methods
        let mut methods: Vec<actix_web::http::Method> = config
            .cors
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        methods.push(actix_web::http::Method::OPTIONS);

        let cors = cors
            .allowed_methods(methods)
            .allowed_headers(config.cors.allowed_headers.clone())
            .max_age(3600);

        let cors = if config.cors.supports_credentials {
            cors.supports_credentials()
        } else {
            cors
        };

        App::new()
            .app_data(web::Data::new(shared_config.clone()))
            .app_data(engine.clone())
            .app_data(lifecycle.clone())
            .app_data(publisher.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
