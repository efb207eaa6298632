pub mod breaker;
pub mod config;
pub mod decision;
pub mod engine;
pub mod isolation;
pub mod learning;
pub mod metrics;
pub mod modeling;
pub mod monitoring;
pub mod params;
pub mod perception;
pub mod reward;
pub mod types;
