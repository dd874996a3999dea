pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod report;
