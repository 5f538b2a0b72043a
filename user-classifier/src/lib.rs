pub mod clustering;
pub mod config;
pub mod emission;
pub mod error;
pub mod ingestion;
pub mod kafka;
pub mod pipeline;
pub mod record;
pub mod service;
pub mod store;
