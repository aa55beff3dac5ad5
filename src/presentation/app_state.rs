// Application state for HTTP handlers
use crate::application::widget_registry::WidgetRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: WidgetRegistry,
}
