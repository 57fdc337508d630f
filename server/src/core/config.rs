use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::kv::FaultInjection;
use crate::data::kv::sanitize_redis_url;
use crate::domain::quota::{ClassLimits, QuotaLimits};

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_AI_BASE_URL, DEFAULT_AI_MODEL, DEFAULT_DATABASE_URL,
    DEFAULT_ENVIRONMENT, DEFAULT_HOST, DEFAULT_KV_RETRY_SECS, DEFAULT_KV_URL, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT_RPM, DEFAULT_TIANXING_BASE_URL, DEFAULT_UPSTREAM_TIMEOUT_SECS,
};

// =============================================================================
// File Config (JSON)
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub environment: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct KvFileConfig {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    /// Same syntax as the CLI flag: `off`, `all`, `get,set`, ...
    pub fault: Option<String>,
    pub retry_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClassLimitsFileConfig {
    pub web: Option<u64>,
    pub ai: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct QuotaFileConfig {
    pub free: Option<ClassLimitsFileConfig>,
    pub pro: Option<ClassLimitsFileConfig>,
    pub enterprise: Option<ClassLimitsFileConfig>,
    pub global: Option<ClassLimitsFileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpstreamFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub daily_cap: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RateLimitFileConfig {
    pub rpm: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub kv: Option<KvFileConfig>,
    pub quota: Option<QuotaFileConfig>,
    pub tianxing: Option<UpstreamFileConfig>,
    pub ai: Option<UpstreamFileConfig>,
    pub upstream_timeout_secs: Option<u64>,
    pub database: Option<DatabaseFileConfig>,
    pub rate_limit: Option<RateLimitFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Final Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deployment environment; first segment of every KV key
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub enabled: bool,
    pub url: String,
    pub faults: FaultInjection,
    pub retry_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TianxingConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// 0 = uncapped
    pub daily_cap: u64,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// 0 = uncapped
    pub daily_cap: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per minute per caller; 0 disables limiting
    pub rpm: u32,
}

impl RateLimitConfig {
    pub fn enabled(&self) -> bool {
        self.rpm > 0
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub kv: KvConfig,
    pub quota: QuotaLimits,
    pub tianxing: TianxingConfig,
    pub ai: AiConfig,
    pub upstream_timeout_secs: u64,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
}

fn layer_limits(
    cli: (Option<u64>, Option<u64>),
    file: Option<ClassLimitsFileConfig>,
    defaults: ClassLimits,
) -> ClassLimits {
    let file = file.unwrap_or_default();
    ClassLimits::new(
        cli.0.or(file.web).unwrap_or(defaults.web),
        cli.1.or(file.ai).unwrap_or(defaults.ai),
    )
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Local directory config OR CLI-specified config path
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let path = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.clone())
            }
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if local.exists() { Some(local) } else { None }
            }
        };

        let file_config = match path {
            Some(path) => {
                let config = FileConfig::load_from_file(&path)?;
                config.warn_unknown_fields();
                config
            }
            None => FileConfig::default(),
        };

        let config = Self::merge(cli, file_config)?;
        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            environment = %config.server.environment,
            kv_enabled = config.kv.enabled,
            kv_url = %sanitize_redis_url(&config.kv.url),
            kv_faults = %config.kv.faults,
            tianxing_configured = config.tianxing.api_key.is_some(),
            ai_configured = config.ai.api_key.is_some(),
            rate_limit_rpm = config.rate_limit.rpm,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn merge(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let file_server = file_config.server.unwrap_or_default();
        let file_kv = file_config.kv.unwrap_or_default();
        let file_quota = file_config.quota.unwrap_or_default();
        let file_tianxing = file_config.tianxing.unwrap_or_default();
        let file_ai = file_config.ai.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();
        let file_rate_limit = file_config.rate_limit.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
            environment: cli
                .environment
                .clone()
                .or(file_server.environment)
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        };

        let faults = match (&cli.kv_fault, file_kv.fault) {
            (Some(faults), _) => faults.clone(),
            (None, Some(raw)) => raw
                .parse::<FaultInjection>()
                .map_err(|e: String| anyhow::anyhow!("Configuration error: kv.fault: {}", e))?,
            (None, None) => FaultInjection::none(),
        };
        let kv = KvConfig {
            enabled: cli.kv_enabled.or(file_kv.enabled).unwrap_or(true),
            url: cli
                .kv_url
                .clone()
                .or(file_kv.url)
                .unwrap_or_else(|| DEFAULT_KV_URL.to_string()),
            faults,
            retry_secs: cli
                .kv_retry_secs
                .or(file_kv.retry_secs)
                .unwrap_or(DEFAULT_KV_RETRY_SECS),
        };

        let defaults = QuotaLimits::default();
        let quota = QuotaLimits {
            free: layer_limits(
                (cli.quota_free_web, cli.quota_free_ai),
                file_quota.free,
                defaults.free,
            ),
            pro: layer_limits(
                (cli.quota_pro_web, cli.quota_pro_ai),
                file_quota.pro,
                defaults.pro,
            ),
            enterprise: layer_limits(
                (cli.quota_enterprise_web, cli.quota_enterprise_ai),
                file_quota.enterprise,
                defaults.enterprise,
            ),
            global: layer_limits(
                (cli.quota_global_web, cli.quota_global_ai),
                file_quota.global,
                defaults.global,
            ),
        };

        let tianxing = TianxingConfig {
            api_key: non_blank(cli.tianxing_key.clone().or(file_tianxing.api_key)),
            base_url: cli
                .tianxing_base_url
                .clone()
                .or(file_tianxing.base_url)
                .unwrap_or_else(|| DEFAULT_TIANXING_BASE_URL.to_string()),
            daily_cap: cli
                .tianxing_daily_cap
                .or(file_tianxing.daily_cap)
                .unwrap_or(0),
        };

        let ai = AiConfig {
            api_key: non_blank(cli.ai_key.clone().or(file_ai.api_key)),
            base_url: cli
                .ai_base_url
                .clone()
                .or(file_ai.base_url)
                .unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string()),
            model: cli
                .ai_model
                .clone()
                .or(file_ai.model)
                .unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            daily_cap: cli.ai_daily_cap.or(file_ai.daily_cap).unwrap_or(0),
        };

        Ok(Self {
            server,
            kv,
            quota,
            tianxing,
            ai,
            upstream_timeout_secs: cli
                .upstream_timeout_secs
                .or(file_config.upstream_timeout_secs)
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            database: DatabaseConfig {
                url: cli
                    .database_url
                    .clone()
                    .or(file_database.url)
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            },
            rate_limit: RateLimitConfig {
                rpm: cli
                    .rate_limit_rpm
                    .or(file_rate_limit.rpm)
                    .unwrap_or(DEFAULT_RATE_LIMIT_RPM),
            },
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.server.environment.trim().is_empty() {
            anyhow::bail!("Configuration error: server.environment must not be empty");
        }

        let tiers = [
            ("free", self.quota.free),
            ("pro", self.quota.pro),
            ("enterprise", self.quota.enterprise),
            ("global", self.quota.global),
        ];
        for (name, limits) in tiers {
            if limits.web == 0 || limits.ai == 0 {
                anyhow::bail!(
                    "Configuration error: quota.{} limits must be greater than 0 (web={}, ai={})",
                    name,
                    limits.web,
                    limits.ai
                );
            }
        }

        let max_web = tiers[..3].iter().map(|(_, l)| l.web).max().unwrap_or(0);
        let max_ai = tiers[..3].iter().map(|(_, l)| l.ai).max().unwrap_or(0);
        if self.quota.global.web < max_web || self.quota.global.ai < max_ai {
            tracing::warn!(
                global_web = self.quota.global.web,
                global_ai = self.quota.global.ai,
                "Global quota is smaller than a single tier's limit; \
                 one caller can exhaust it"
            );
        }

        if self.kv.enabled && self.kv.url.trim().is_empty() {
            anyhow::bail!(
                "Configuration error: kv.url is required when the shared KV is enabled. \
                 Set RECIPE_SEARCH_KV_URL or disable it with RECIPE_SEARCH_KV_ENABLED=false."
            );
        }

        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("Configuration error: upstream_timeout_secs must be greater than 0");
        }

        if !self.database.url.starts_with("sqlite:") {
            anyhow::bail!(
                "Configuration error: database.url must be a sqlite: URL, got '{}'",
                self.database.url
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::kv::KvOp;

    fn from_json(json: &str) -> FileConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::merge(&CliConfig::default(), FileConfig::default()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.environment, "dev");
        assert!(config.kv.enabled);
        assert!(!config.kv.faults.is_active());
        assert_eq!(config.quota, QuotaLimits::default());
        assert_eq!(config.rate_limit.rpm, DEFAULT_RATE_LIMIT_RPM);
        assert!(config.tianxing.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = from_json(
            r#"{
                "server": { "port": 9000, "environment": "staging" },
                "kv": { "enabled": false, "fault": "mget" },
                "quota": { "free": { "ai": 2 }, "global": { "ai": 1 } },
                "tianxing": { "api_key": "tx-key", "daily_cap": 100 }
            }"#,
        );
        let config = AppConfig::merge(&CliConfig::default(), file).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.environment, "staging");
        assert!(!config.kv.enabled);
        assert!(config.kv.faults.fails(KvOp::Mget));
        assert_eq!(config.quota.free.ai, 2);
        assert_eq!(config.quota.free.web, QuotaLimits::default().free.web);
        assert_eq!(config.quota.global.ai, 1);
        assert_eq!(config.tianxing.api_key.as_deref(), Some("tx-key"));
        assert_eq!(config.tianxing.daily_cap, 100);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = from_json(r#"{ "server": { "port": 9000 }, "quota": { "pro": { "web": 7 } } }"#);
        let cli = CliConfig {
            port: Some(7000),
            quota_pro_web: Some(9),
            kv_fault: Some(FaultInjection::all()),
            ..Default::default()
        };
        let config = AppConfig::merge(&cli, file).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.quota.pro.web, 9);
        assert!(config.kv.faults.fails(KvOp::Get));
    }

    #[test]
    fn test_invalid_file_fault_is_error() {
        let file = from_json(r#"{ "kv": { "fault": "explode" } }"#);
        assert!(AppConfig::merge(&CliConfig::default(), file).is_err());
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let cli = CliConfig {
            ai_key: Some("   ".to_string()),
            ..Default::default()
        };
        let config = AppConfig::merge(&cli, FileConfig::default()).unwrap();
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let cli = CliConfig {
            quota_free_ai: Some(0),
            ..Default::default()
        };
        let config = AppConfig::merge(&cli, FileConfig::default()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_sqlite_database() {
        let cli = CliConfig {
            database_url: Some("postgres://localhost/recipes".to_string()),
            ..Default::default()
        };
        let config = AppConfig::merge(&cli, FileConfig::default()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_kv_url_when_enabled() {
        let cli = CliConfig {
            kv_url: Some(" ".to_string()),
            ..Default::default()
        };
        let config = AppConfig::merge(&cli, FileConfig::default()).unwrap();
        assert!(config.validate().is_err());

        let cli = CliConfig {
            kv_url: Some(" ".to_string()),
            kv_enabled: Some(false),
            ..Default::default()
        };
        let config = AppConfig::merge(&cli, FileConfig::default()).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_fields_are_collected() {
        let file = from_json(r#"{ "servr": { "port": 1 } }"#);
        assert!(file.extra.get("servr").is_some());
    }

    #[test]
    fn test_load_missing_config_path_fails() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/recipe-search.json")),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{ "server": { "host": "0.0.0.0" } }"#).unwrap();
        let cli = CliConfig {
            config: Some(path),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
