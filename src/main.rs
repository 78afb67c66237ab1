pub mod aggregate;
pub mod api;
pub mod config;
pub mod data_structures;
pub mod dataset;
pub mod filter;
pub mod market;
pub mod worker;

use crate::data_structures::{
    SalesTable, SharedMarket, SharedStockDefaults, SharedTable, StockDefaults,
};
use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};

#[derive(Clone)]
struct AppState {
    table: SharedTable,
    market: SharedMarket,
    stock_defaults: SharedStockDefaults,
}

impl FromRef<AppState> for SharedTable {
    fn from_ref(app_state: &AppState) -> SharedTable {
        app_state.table.clone()
    }
}

impl FromRef<AppState> for SharedMarket {
    fn from_ref(app_state: &AppState) -> SharedMarket {
        app_state.market.clone()
    }
}

impl FromRef<AppState> for SharedStockDefaults {
    fn from_ref(app_state: &AppState) -> SharedStockDefaults {
        app_state.stock_defaults.clone()
    }
}

#[tokio::main]
async fn main() {
    let app_config = config::AppConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    // Set a global span with node_name for all subsequent logs
    let _span = tracing::info_span!("node", name = %app_config.node_name).entered();

    tracing::info!("Starting superstore-dash");
    tracing::info!(
        environment = %app_config.environment,
        port = app_config.port,
        dataset_path = %app_config.dataset_path,
        "Loaded configuration"
    );

    // The fallback dataset is best-effort at startup; an upload can supply
    // the table later, and every sales route reports a missing table itself.
    let initial_table = match dataset::load_from_path(&app_config.dataset_path) {
        Ok(table) => {
            tracing::info!(
                rows = table.rows.len(),
                min_date = ?table.min_date,
                max_date = ?table.max_date,
                "Loaded fallback dataset"
            );
            table
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load fallback dataset, starting with an empty table");
            SalesTable::empty()
        }
    };

    let market_client = market::MarketClient::new(app_config.provider_base_url.clone(), true, 30)
        .unwrap_or_else(|e| panic!("Failed to initialize market client: {e}"));

    let shared_table: SharedTable = Arc::new(Mutex::new(initial_table));
    let shared_market: SharedMarket = Arc::new(Mutex::new(market_client));
    let stock_defaults: SharedStockDefaults = Arc::new(StockDefaults {
        symbol: app_config.default_symbol.clone(),
        start: app_config.default_stock_start,
        end: app_config.default_stock_end,
    });

    let app_state = AppState {
        table: shared_table.clone(),
        market: shared_market,
        stock_defaults,
    };

    tracing::info!("Spawning dataset reload worker");
    tokio::spawn(worker::run(shared_table.clone(), app_config.clone()));

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(5)
            .finish()
            .unwrap(),
    );

    let app = Router::new()
        .route("/stock", get(api::stock_default_handler))
        .route("/stock/{symbol}", get(api::stock_dashboard_handler))
        .route("/sales/dashboard", get(api::sales_dashboard_handler))
        .route("/sales/filters", get(api::sales_filters_handler))
        .route("/sales/download", get(api::sales_download_handler))
        .route(
            "/sales/upload",
            post(api::sales_upload_handler).layer(GovernorLayer::new(governor_conf)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    tracing::info!(%addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}
