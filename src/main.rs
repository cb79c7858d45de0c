use std::{net::SocketAddr, sync::Arc, time::Duration};

use http::HeaderValue;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use canteen_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_create_schema {
        api::db::create_schema_if_missing(&db_pool).await?;
    }
    let db = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    // Persistence: SQL store, wrapped in the list cache when enabled
    let sql_store: Arc<dyn api::store::OrderStore> =
        Arc::new(api::store::SeaOrmOrderStore::new(db.clone()));
    let store: Arc<dyn api::store::OrderStore> = match api::cache::build_cache(&cfg.cache) {
        Some(cache) => Arc::new(api::store::CachedOrderStore::new(
            sql_store,
            cache,
            Duration::from_secs(cfg.cache.default_ttl_secs),
        )),
        None => sql_store,
    };

    // Payment gateway client
    let gateway: Arc<dyn api::gateway::PaymentGateway> =
        Arc::new(api::gateway::HttpPaymentGateway::new(&cfg.gateway)?);

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        store,
        gateway,
        Some(Arc::new(event_sender.clone())),
        &cfg,
    );

    let app_state = api::AppState {
        config: cfg.clone(),
        event_sender,
        services,
    };

    // Permissive CORS in development; deployments front this with their
    // own origin policy.
    let cors_layer = if cfg.is_development() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin("https://orders.canteen.example".parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = api::app_router(app_state).layer(cors_layer);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!(%addr, environment = %cfg.environment, "canteen-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}
