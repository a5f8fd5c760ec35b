use crate::config::AppConfig;
use crate::error::Result;
use crate::handlers::{self, session};
use crate::services::ethereum::EthereumService;
use crate::services::registry::SessionRegistry;
use crate::services::session::{Collaborators, SessionOptions};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state behind every route.
pub struct AppState {
    pub registry: SessionRegistry,
    pub options: SessionOptions,
    pub fiat_currency: String,
}

impl AppState {
    pub fn new(collaborators: Collaborators, options: SessionOptions, fiat_currency: String) -> Self {
        Self {
            registry: SessionRegistry::new(collaborators),
            options,
            fiat_currency,
        }
    }
}

pub fn session_options(config: &AppConfig, network_supports_fee_market: bool) -> SessionOptions {
    SessionOptions {
        default_level: config.default_estimate_level,
        prefers_advanced_gas: config.advanced_gas_preferred,
        minimum_gas_limit: config.minimum_gas_limit,
        maximum_gas_limit: config.maximum_gas_limit,
        network_supports_fee_market,
        fiat_rate: config.fiat_conversion_rate.clone(),
    }
}

/// Connects to the node and wires the node-backed collaborators.
pub async fn create_state(config: &AppConfig) -> Result<Arc<AppState>> {
    let service = Arc::new(EthereumService::new(config).await?);

    let supports_fee_market = match service.network_supports_fee_market().await {
        Ok(supported) => supported,
        Err(e) => {
            tracing::warn!("Could not probe fee market support, assuming legacy: {}", e);
            false
        }
    };
    tracing::info!("Network supports fee market: {}", supports_fee_market);

    let collaborators = Collaborators {
        estimates: service.clone(),
        accounts: service.clone(),
        sender: service.clone(),
        resolver: service,
    };

    Ok(Arc::new(AppState::new(
        collaborators,
        session_options(config, supports_fee_market),
        config.fiat_currency.clone(),
    )))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .into_inner();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/sessions", post(session::open_session))
        .route("/api/v1/sessions/cancel-all", post(session::cancel_all))
        .route(
            "/api/v1/sessions/{id}",
            get(session::view_session).delete(session::close_session),
        )
        .route("/api/v1/sessions/{id}/level", post(session::select_level))
        .route("/api/v1/sessions/{id}/fees", post(session::edit_fee))
        .route("/api/v1/sessions/{id}/gas-limit", post(session::edit_gas_limit))
        .route("/api/v1/sessions/{id}/nonce", post(session::set_nonce))
        .route(
            "/api/v1/sessions/{id}/confirm-anyway",
            post(session::confirm_anyway),
        )
        .route("/api/v1/sessions/{id}/submit", post(session::submit))
        .route("/api/v1/sessions/{id}/cancel", post(session::cancel))
        .layer(middleware)
        .with_state(state)
}
