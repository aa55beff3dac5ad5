// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::widget_registry::WidgetRegistry;
use crate::infrastructure::config::{load_host_config, load_widgets_config};
use crate::infrastructure::hass_repository::HassRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_widget, health_check, list_widgets, push_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let host_config = load_host_config()?;
    let specs = load_widgets_config()?.into_specs()?;
    let addr = host_config.host.listen_addr()?;

    // Create repository (infrastructure layer)
    let repository = Arc::new(HassRepository::new(&host_config.host)?);

    // Create widgets and start their refresh loops (application layer)
    let registry = WidgetRegistry::new(specs, repository);
    let _refresh_loops = registry.spawn_refresh_loops();
    tracing::info!("Refreshing {} widgets", registry.widgets().len());

    let state = Arc::new(AppState { registry });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/widgets", get(list_widgets))
        .route("/widgets/:id", get(get_widget))
        .route("/entities/:entity/state", post(push_state))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    tracing::info!("Starting history-strip service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
