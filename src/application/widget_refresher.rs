// Widget refresher - owns one widget's current result and resolves racing fetches
use crate::application::history_repository::HistoryRepository;
use crate::domain::history::LiveState;
use crate::domain::widget::{compute, WidgetSnapshot, WidgetSpec};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// A result stamped later than this fetch was already applied.
    Superseded,
    /// The history fetch failed; the previous result stays in place.
    Failed,
}

/// A computed snapshot with the stamp of the refresh that issued its fetch.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedResult {
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: WidgetSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct WidgetStatus {
    pub id: String,
    pub entity: String,
    pub mode: &'static str,
    pub updated_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct RefreshState {
    current: Option<Arc<AppliedResult>>,
    /// Stamps of every fetch that has not come back yet.
    in_flight: Vec<DateTime<Utc>>,
    live_state: Option<LiveState>,
    last_error: Option<String>,
}

impl RefreshState {
    fn applied_after(&self, stamp: DateTime<Utc>) -> bool {
        self.current.as_ref().is_some_and(|c| c.updated_at > stamp)
    }

    fn finish(&mut self, stamp: DateTime<Utc>) {
        if let Some(pos) = self.in_flight.iter().position(|t| *t == stamp) {
            self.in_flight.swap_remove(pos);
        }
    }

    fn pending_within(&self, now: DateTime<Utc>, interval: TimeDelta) -> bool {
        self.in_flight.iter().any(|t| now - *t < interval)
    }
}

pub struct WidgetRefresher {
    spec: WidgetSpec,
    repository: Arc<dyn HistoryRepository>,
    state: RwLock<RefreshState>,
}

impl WidgetRefresher {
    pub fn new(spec: WidgetSpec, repository: Arc<dyn HistoryRepository>) -> Self {
        Self {
            spec,
            repository,
            state: RwLock::new(RefreshState::default()),
        }
    }

    pub fn spec(&self) -> &WidgetSpec {
        &self.spec
    }

    pub async fn current(&self) -> Option<Arc<AppliedResult>> {
        self.state.read().await.current.clone()
    }

    /// Latest live state, pushed or fetched. May be newer than the one
    /// frozen into the current result.
    pub async fn live_state(&self) -> Option<LiveState> {
        self.state.read().await.live_state.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// A widget is stale when its last refresh failed or its result is older
    /// than two refresh intervals.
    pub async fn status(&self, now: DateTime<Utc>) -> WidgetStatus {
        let state = self.state.read().await;
        let updated_at = state.current.as_ref().map(|c| c.updated_at);
        let max_age = self.interval().checked_mul(2).unwrap_or(TimeDelta::MAX);
        let too_old = updated_at.is_none_or(|t| now - t > max_age);

        WidgetStatus {
            id: self.spec.id.clone(),
            entity: self.spec.entity.clone(),
            mode: self.spec.mode.name(),
            updated_at,
            stale: too_old || state.last_error.is_some(),
            last_error: state.last_error.clone(),
        }
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        self.refresh_at(Utc::now()).await
    }

    /// Fetch and recompute for the window ending at `now`, which also stamps
    /// the fetch. The result is dropped if a later-stamped one got applied
    /// while this fetch was in flight.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        self.state.write().await.in_flight.push(now);

        let window = self.spec.window_ending_at(now);
        let (history, live) = tokio::join!(
            self.repository.fetch_history(&self.spec.entity, &window),
            self.repository.fetch_live_state(&self.spec.entity),
        );

        let mut history = match history {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(
                    widget = %self.spec.id,
                    entity = %self.spec.entity,
                    "History fetch failed, keeping previous result: {:#}",
                    e
                );
                let mut state = self.state.write().await;
                state.finish(now);
                if !state.applied_after(now) {
                    state.last_error = Some(format!("{:#}", e));
                }
                return RefreshOutcome::Failed;
            }
        };

        let live = match live {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(
                    widget = %self.spec.id,
                    entity = %self.spec.entity,
                    "Live state fetch failed, using last known state: {:#}",
                    e
                );
                None
            }
        };

        let mut state = self.state.write().await;
        state.finish(now);
        if state.applied_after(now) {
            tracing::debug!(widget = %self.spec.id, stamp = %now, "Discarding superseded history response");
            return RefreshOutcome::Superseded;
        }

        if let Some(live) = live {
            state.live_state = Some(live);
        }
        if history.unit.is_none() {
            history.unit = state.live_state.as_ref().and_then(|l| l.unit.clone());
        }

        let live_state = state.live_state.as_ref().map(|l| l.state.as_str());
        let snapshot = compute(&history, &window, live_state, &self.spec);

        tracing::debug!(
            widget = %self.spec.id,
            records = snapshot.record_count,
            buckets = snapshot.buckets.len(),
            "Applied refreshed history"
        );

        state.current = Some(Arc::new(AppliedResult {
            updated_at: now,
            snapshot,
        }));
        state.last_error = None;
        RefreshOutcome::Applied
    }

    /// Record a live state pushed by the host. Triggers an out-of-cycle
    /// refresh when there is no result yet or the applied one is older than
    /// the refresh interval, unless a recent fetch is already pending.
    pub async fn observe_live_state(&self, live: LiveState, now: DateTime<Utc>) -> Option<RefreshOutcome> {
        let due = {
            let mut state = self.state.write().await;
            state.live_state = Some(live);

            let expired = state
                .current
                .as_ref()
                .is_none_or(|c| now - c.updated_at >= self.interval());
            let pending = state.pending_within(now, self.interval());
            expired && !pending
        };

        if due {
            Some(self.refresh_at(now).await)
        } else {
            None
        }
    }

    fn interval(&self) -> TimeDelta {
        TimeDelta::from_std(self.spec.refresh_interval).unwrap_or(TimeDelta::MAX)
    }
}
