// Repository trait for entity history and live state access
use crate::domain::history::{EntityHistory, LiveState, Window};
use async_trait::async_trait;

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// State changes of one entity over the window, in any order
    async fn fetch_history(&self, entity_id: &str, window: &Window) -> anyhow::Result<EntityHistory>;

    /// Current state of an entity, `None` if the host does not know it
    async fn fetch_live_state(&self, entity_id: &str) -> anyhow::Result<Option<LiveState>>;
}
