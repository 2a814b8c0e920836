//! Application layer: catalog store, crawl orchestration, statistics, ML.

pub mod catalog;
pub mod ml;
pub mod orchestrator;
pub mod statistics;
