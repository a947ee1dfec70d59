// Library for the binary and integration tests

pub mod aggregator;
pub mod api_client;
pub mod buffer;
pub mod config;
pub mod models;
pub mod scheduler;
pub mod transport;
pub mod version;
