// HTTP request handlers
use crate::application::widget_refresher::{RefreshOutcome, WidgetStatus};
use crate::domain::history::LiveState;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct StatePush {
    pub state: String,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Serialize)]
pub struct StatePushResult {
    pub widgets: usize,
    pub refreshed: usize,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List every widget with its freshness
pub async fn list_widgets(State(state): State<Arc<AppState>>) -> Json<Vec<WidgetStatus>> {
    let now = Utc::now();
    let mut statuses = Vec::with_capacity(state.registry.widgets().len());
    for widget in state.registry.widgets() {
        statuses.push(widget.status(now).await);
    }
    Json(statuses)
}

/// Latest computed result for one widget
pub async fn get_widget(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let Some(widget) = state.registry.get(&id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": format!("unknown widget {}", id) })))
            .into_response();
    };

    match widget.current().await {
        Some(result) => {
            let last_error = widget.last_error().await;
            let live_state = widget.live_state().await;
            Json(json!({
                "id": widget.spec().id,
                "entity": widget.spec().entity,
                "mode": widget.spec().mode.name(),
                "last_error": last_error,
                "live_state": live_state,
                "result": result.as_ref(),
            }))
            .into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))).into_response(),
    }
}

/// Push a fresh live state for an entity from the host
pub async fn push_state(
    Path(entity): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(push): Json<StatePush>,
) -> Json<StatePushResult> {
    let live = LiveState {
        state: push.state,
        unit: push.unit,
    };
    let widgets = state.registry.for_entity(&entity).count();
    let outcomes = state.registry.push_live_state(&entity, live, Utc::now()).await;
    let refreshed = outcomes.iter().filter(|o| **o == RefreshOutcome::Applied).count();

    tracing::debug!(
        "Live state for {} pushed to {} widgets, {} of {} triggered refreshes applied",
        entity,
        widgets,
        refreshed,
        outcomes.len()
    );

    Json(StatePushResult { widgets, refreshed })
}
