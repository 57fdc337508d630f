use clap::Parser;

use std::path::PathBuf;

use crate::data::kv::FaultInjection;

use super::constants::{
    ENV_AI_BASE_URL, ENV_AI_DAILY_CAP, ENV_AI_KEY, ENV_AI_MODEL, ENV_CONFIG, ENV_DATABASE_URL,
    ENV_ENVIRONMENT, ENV_HOST, ENV_KV_ENABLED, ENV_KV_FAULT, ENV_KV_RETRY_SECS, ENV_KV_URL,
    ENV_PORT, ENV_QUOTA_ENTERPRISE_AI, ENV_QUOTA_ENTERPRISE_WEB, ENV_QUOTA_FREE_AI,
    ENV_QUOTA_FREE_WEB, ENV_QUOTA_GLOBAL_AI, ENV_QUOTA_GLOBAL_WEB, ENV_QUOTA_PRO_AI,
    ENV_QUOTA_PRO_WEB, ENV_RATE_LIMIT_RPM, ENV_TIANXING_BASE_URL, ENV_TIANXING_DAILY_CAP,
    ENV_TIANXING_KEY, ENV_UPSTREAM_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "recipe-search")]
#[command(version, about = "Recipe search routing with quota protection", long_about = None)]
pub struct Cli {
    /// Server host address
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Deployment environment (partitions every KV key)
    #[arg(long = "env", env = ENV_ENVIRONMENT)]
    pub environment: Option<String>,

    // Shared KV options
    /// Redis-compatible KV URL
    #[arg(long, env = ENV_KV_URL)]
    pub kv_url: Option<String>,

    /// Enable or disable the shared KV (disabled = in-process state only)
    #[arg(long, env = ENV_KV_ENABLED)]
    pub kv_enabled: Option<bool>,

    /// Simulate KV failures: off, all, connect, or a list of get,set,mget,eval,ping
    #[arg(long, env = ENV_KV_FAULT, value_parser = parse_fault_injection)]
    pub kv_fault: Option<FaultInjection>,

    /// Seconds to wait before retrying a failed KV
    #[arg(long, env = ENV_KV_RETRY_SECS)]
    pub kv_retry_secs: Option<u64>,

    // Quota options
    /// Free tier daily web searches
    #[arg(long, env = ENV_QUOTA_FREE_WEB)]
    pub quota_free_web: Option<u64>,

    /// Free tier daily AI searches
    #[arg(long, env = ENV_QUOTA_FREE_AI)]
    pub quota_free_ai: Option<u64>,

    /// Pro tier daily web searches
    #[arg(long, env = ENV_QUOTA_PRO_WEB)]
    pub quota_pro_web: Option<u64>,

    /// Pro tier daily AI searches
    #[arg(long, env = ENV_QUOTA_PRO_AI)]
    pub quota_pro_ai: Option<u64>,

    /// Enterprise tier daily web searches
    #[arg(long, env = ENV_QUOTA_ENTERPRISE_WEB)]
    pub quota_enterprise_web: Option<u64>,

    /// Enterprise tier daily AI searches
    #[arg(long, env = ENV_QUOTA_ENTERPRISE_AI)]
    pub quota_enterprise_ai: Option<u64>,

    /// Daily web searches across all users
    #[arg(long, env = ENV_QUOTA_GLOBAL_WEB)]
    pub quota_global_web: Option<u64>,

    /// Daily AI searches across all users
    #[arg(long, env = ENV_QUOTA_GLOBAL_AI)]
    pub quota_global_ai: Option<u64>,

    // Upstream options
    /// Tianxing API key
    #[arg(long, env = ENV_TIANXING_KEY, hide_env_values = true)]
    pub tianxing_key: Option<String>,

    /// Tianxing recipe endpoint
    #[arg(long, env = ENV_TIANXING_BASE_URL)]
    pub tianxing_base_url: Option<String>,

    /// Maximum Tianxing calls per day from this process (0 = uncapped)
    #[arg(long, env = ENV_TIANXING_DAILY_CAP)]
    pub tianxing_daily_cap: Option<u64>,

    /// AI API key
    #[arg(long, env = ENV_AI_KEY, hide_env_values = true)]
    pub ai_key: Option<String>,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, env = ENV_AI_BASE_URL)]
    pub ai_base_url: Option<String>,

    /// AI model name
    #[arg(long, env = ENV_AI_MODEL)]
    pub ai_model: Option<String>,

    /// Maximum AI calls per day from this process (0 = uncapped)
    #[arg(long, env = ENV_AI_DAILY_CAP)]
    pub ai_daily_cap: Option<u64>,

    /// Upstream HTTP timeout in seconds
    #[arg(long, env = ENV_UPSTREAM_TIMEOUT_SECS)]
    pub upstream_timeout_secs: Option<u64>,

    // Database options
    /// Recipe database URL (sqlite:...)
    #[arg(long, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    // Rate limit options
    /// Per-user search requests per minute (0 = disabled)
    #[arg(long, env = ENV_RATE_LIMIT_RPM)]
    pub rate_limit_rpm: Option<u32>,
}

/// Parse fault injection from CLI/env string
fn parse_fault_injection(s: &str) -> Result<FaultInjection, String> {
    s.parse()
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub environment: Option<String>,
    pub kv_url: Option<String>,
    pub kv_enabled: Option<bool>,
    pub kv_fault: Option<FaultInjection>,
    pub kv_retry_secs: Option<u64>,
    pub quota_free_web: Option<u64>,
    pub quota_free_ai: Option<u64>,
    pub quota_pro_web: Option<u64>,
    pub quota_pro_ai: Option<u64>,
    pub quota_enterprise_web: Option<u64>,
    pub quota_enterprise_ai: Option<u64>,
    pub quota_global_web: Option<u64>,
    pub quota_global_ai: Option<u64>,
    pub tianxing_key: Option<String>,
    pub tianxing_base_url: Option<String>,
    pub tianxing_daily_cap: Option<u64>,
    pub ai_key: Option<String>,
    pub ai_base_url: Option<String>,
    pub ai_model: Option<String>,
    pub ai_daily_cap: Option<u64>,
    pub upstream_timeout_secs: Option<u64>,
    pub database_url: Option<String>,
    pub rate_limit_rpm: Option<u32>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            config: cli.config,
            environment: cli.environment,
            kv_url: cli.kv_url,
            kv_enabled: cli.kv_enabled,
            kv_fault: cli.kv_fault,
            kv_retry_secs: cli.kv_retry_secs,
            quota_free_web: cli.quota_free_web,
            quota_free_ai: cli.quota_free_ai,
            quota_pro_web: cli.quota_pro_web,
            quota_pro_ai: cli.quota_pro_ai,
            quota_enterprise_web: cli.quota_enterprise_web,
            quota_enterprise_ai: cli.quota_enterprise_ai,
            quota_global_web: cli.quota_global_web,
            quota_global_ai: cli.quota_global_ai,
            tianxing_key: cli.tianxing_key,
            tianxing_base_url: cli.tianxing_base_url,
            tianxing_daily_cap: cli.tianxing_daily_cap,
            ai_key: cli.ai_key,
            ai_base_url: cli.ai_base_url,
            ai_model: cli.ai_model,
            ai_daily_cap: cli.ai_daily_cap,
            upstream_timeout_secs: cli.upstream_timeout_secs,
            database_url: cli.database_url,
            rate_limit_rpm: cli.rate_limit_rpm,
        }
    }
}

/// Parse CLI arguments
pub fn parse() -> CliConfig {
    Cli::parse().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::kv::KvOp;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "recipe-search",
            "--port",
            "8080",
            "--kv-fault",
            "get,eval",
            "--quota-free-ai",
            "2",
            "--kv-enabled",
            "false",
        ])
        .unwrap();
        let config = CliConfig::from(cli);
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.quota_free_ai, Some(2));
        assert_eq!(config.kv_enabled, Some(false));
        let faults = config.kv_fault.unwrap();
        assert!(faults.fails(KvOp::Get));
        assert!(faults.fails(KvOp::Eval));
        assert!(!faults.fails(KvOp::Set));
    }

    #[test]
    fn test_rejects_unknown_fault() {
        assert!(Cli::try_parse_from(["recipe-search", "--kv-fault", "explode"]).is_err());
    }
}
