//! Network diagnostics engine: address sweeps, port sweeps and timed pings
//! over a bounded async worker pool, with JSON export and a small HTTP API.
pub mod config;
pub mod error;
pub mod export;
pub mod netdetect;
pub mod ports;
pub mod probe;
pub mod protocols;
pub mod reporter;
pub mod results;
pub mod scanner;
pub mod server;
pub mod stats;
pub mod types;
