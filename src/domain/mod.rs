// Domain layer - the pure history aggregation engine
pub mod aggregation;
pub mod classification;
pub mod history;
pub mod runs;
pub mod segment;
pub mod sparkline;
pub mod widget;
