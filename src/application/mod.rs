// Application layer - refresh orchestration around the engine
pub mod history_repository;
pub mod widget_refresher;
pub mod widget_registry;
