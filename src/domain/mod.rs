//! Domain layer: entities, events and repository contracts.

pub mod book;
pub mod crawl_job;
pub mod events;
pub mod repositories;
