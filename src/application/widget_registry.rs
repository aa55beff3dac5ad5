// Widget registry - every configured widget's refresher plus its refresh loop
use crate::application::history_repository::HistoryRepository;
use crate::application::widget_refresher::{RefreshOutcome, WidgetRefresher};
use crate::domain::history::LiveState;
use crate::domain::widget::WidgetSpec;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone)]
pub struct WidgetRegistry {
    widgets: Vec<Arc<WidgetRefresher>>,
}

impl WidgetRegistry {
    pub fn new(specs: Vec<WidgetSpec>, repository: Arc<dyn HistoryRepository>) -> Self {
        let widgets = specs
            .into_iter()
            .map(|spec| Arc::new(WidgetRefresher::new(spec, repository.clone())))
            .collect();
        Self { widgets }
    }

    pub fn widgets(&self) -> &[Arc<WidgetRefresher>] {
        &self.widgets
    }

    pub fn get(&self, id: &str) -> Option<&Arc<WidgetRefresher>> {
        self.widgets.iter().find(|w| w.spec().id == id)
    }

    pub fn for_entity<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a Arc<WidgetRefresher>> + 'a {
        self.widgets.iter().filter(move |w| w.spec().entity == entity)
    }

    /// Push a live state to every widget bound to `entity`. Returns the
    /// outcomes of the refreshes this triggered.
    pub async fn push_live_state(&self, entity: &str, live: LiveState, now: DateTime<Utc>) -> Vec<RefreshOutcome> {
        let pushes = self
            .for_entity(entity)
            .map(|w| w.observe_live_state(live.clone(), now));

        join_all(pushes).await.into_iter().flatten().collect()
    }

    /// Start one interval loop per widget. The first tick fires immediately.
    pub fn spawn_refresh_loops(&self) -> Vec<JoinHandle<()>> {
        self.widgets.iter().cloned().map(spawn_refresh_loop).collect()
    }
}

fn spawn_refresh_loop(refresher: Arc<WidgetRefresher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresher.spec().refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = refresher.refresh().await;
            tracing::trace!(widget = %refresher.spec().id, ?outcome, "Refresh tick");
        }
    })
}
