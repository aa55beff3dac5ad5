// Home Assistant REST repository implementation
use crate::application::history_repository::HistoryRepository;
use crate::domain::history::{EntityHistory, HistoryRecord, LiveState, Window};
use crate::infrastructure::config::{render_template, HostSettings};
use crate::infrastructure::error::RepositoryError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HassRepository {
    client: reqwest::Client,
    base_url: String,
    token: String,
    history_path: String,
    state_path: String,
}

#[derive(Debug, Deserialize)]
struct StateRow {
    state: String,
    #[serde(default)]
    last_changed: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    attributes: Option<Attributes>,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    #[serde(default)]
    unit_of_measurement: Option<String>,
}

impl StateRow {
    fn unit(&self) -> Option<String> {
        self.attributes.as_ref()?.unit_of_measurement.clone()
    }
}

impl HassRepository {
    pub fn new(settings: &HostSettings) -> Result<Self, RepositoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            history_path: settings.history_path.clone(),
            state_path: settings.state_path.clone(),
        })
    }

    fn history_url(&self, entity_id: &str, window: &Window) -> String {
        let mut vars = HashMap::new();
        vars.insert("entity", urlencoding::encode(entity_id).into_owned());
        vars.insert("start", encode_time(window.start));
        vars.insert("end", encode_time(window.end));
        format!("{}/{}", self.base_url, render_template(&self.history_path, &vars))
    }

    fn state_url(&self, entity_id: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("entity", urlencoding::encode(entity_id).into_owned());
        format!("{}/{}", self.base_url, render_template(&self.state_path, &vars))
    }

    /// GET a JSON document; `None` when the host answers 404
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, RepositoryError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Status { status, body });
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| RepositoryError::Payload(e.to_string()))
    }
}

fn encode_time(t: DateTime<Utc>) -> String {
    urlencoding::encode(&t.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

/// Flatten the host's list-per-entity history payload into records. Rows with
/// a missing or malformed timestamp are skipped.
fn parse_history(rows: Vec<Vec<StateRow>>) -> EntityHistory {
    let mut history = EntityHistory::default();

    for row in rows.into_iter().flatten() {
        if history.unit.is_none() {
            history.unit = row.unit();
        }

        let Some(stamp) = row.last_changed.as_deref().or(row.last_updated.as_deref()) else {
            tracing::debug!("Skipping history row without timestamp");
            continue;
        };
        match DateTime::parse_from_rfc3339(stamp) {
            Ok(time) => history
                .records
                .push(HistoryRecord::new(time.with_timezone(&Utc), row.state)),
            Err(e) => tracing::debug!("Skipping history row with timestamp {}: {}", stamp, e),
        }
    }

    history
}

#[async_trait]
impl HistoryRepository for HassRepository {
    async fn fetch_history(&self, entity_id: &str, window: &Window) -> Result<EntityHistory> {
        let url = self.history_url(entity_id, window);
        tracing::debug!("Fetching history for {}", entity_id);

        let rows: Vec<Vec<StateRow>> = self.get_json(&url).await?.unwrap_or_default();
        let history = parse_history(rows);

        tracing::debug!("Got {} history records for {}", history.records.len(), entity_id);
        Ok(history)
    }

    async fn fetch_live_state(&self, entity_id: &str) -> Result<Option<LiveState>> {
        let row: Option<StateRow> = self.get_json(&self.state_url(entity_id)).await?;

        Ok(row.map(|row| LiveState {
            unit: row.unit(),
            state: row.state,
        }))
    }
}
