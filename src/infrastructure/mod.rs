//! Infrastructure layer: configuration, logging, HTTP, parsing, storage.

pub mod config;
pub mod http_client;
pub mod logging;
pub mod memory_repository;
pub mod parsing;
pub mod sqlite_repository;
