pub mod backend;
pub mod config;
pub mod http;
pub mod metrics;
