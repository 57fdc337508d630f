//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod metrics;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::CliConfig;
pub use config::{AppConfig, KvConfig, ServerConfig};
pub use metrics::MetricsService;
pub use shutdown::ShutdownService;
