//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::{ApiServer, ApiServices};
use crate::core::MetricsService;
use crate::core::cli::{self, CliConfig};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, APP_NAME_LOWER, ENV_LOG, ENV_LOG_FORMAT, LOCAL_SEARCH_LIMIT};
use crate::core::shutdown::ShutdownService;
use crate::data::kv::{KeyBuilder, KvClient, RateLimitBucket, RateLimiter, sanitize_redis_url};
use crate::data::SqliteRecipeStore;
use crate::domain::search::adapters::{
    AiAdapter, DailyUsage, LocalAdapter, TianxingAdapter, build_http_client,
};
use crate::domain::search::{SearchAdapters, SearchCache};
use crate::domain::{IdempotencyService, QuotaService, SearchService};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub metrics: Arc<MetricsService>,
    pub kv: Arc<KvClient>,
    pub quota: Arc<QuotaService>,
    pub idempotency: Arc<IdempotencyService>,
    pub search: Arc<SearchService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub recipes: Arc<SqliteRecipeStore>,
    pub tianxing_usage: Arc<DailyUsage>,
    pub ai_usage: Arc<DailyUsage>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let cli_config = cli::parse();
        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let metrics = Arc::new(MetricsService::new());

        let kv = Arc::new(KvClient::from_config(&config.kv, metrics.clone()));
        if kv.is_enabled() {
            let ready = kv.ping().await;
            tracing::info!(
                url = %sanitize_redis_url(&config.kv.url),
                ready,
                "Shared KV configured"
            );
        } else {
            tracing::info!("Shared KV disabled, quotas and caches are per-process");
        }

        let keys = KeyBuilder::new(&config.server.environment);
        let quota = Arc::new(QuotaService::new(
            config.quota.clone(),
            keys.clone(),
            kv.clone(),
            metrics.clone(),
        ));
        let idempotency = Arc::new(IdempotencyService::new(
            keys.clone(),
            kv.clone(),
            metrics.clone(),
        ));
        let cache = Arc::new(SearchCache::new(kv.clone()));

        let recipes = Arc::new(
            SqliteRecipeStore::connect(&config.database.url)
                .await
                .with_context(|| format!("Failed to open recipe store {}", config.database.url))?,
        );

        let http = build_http_client(Duration::from_secs(config.upstream_timeout_secs))
            .context("Failed to build upstream HTTP client")?;
        let tianxing_usage = Arc::new(DailyUsage::new(Some(config.tianxing.daily_cap)));
        let ai_usage = Arc::new(DailyUsage::new(Some(config.ai.daily_cap)));

        let adapters = SearchAdapters {
            local: Arc::new(LocalAdapter::new(recipes.clone(), LOCAL_SEARCH_LIMIT)),
            web: Arc::new(TianxingAdapter::new(
                http.clone(),
                config.tianxing.api_key.clone(),
                config.tianxing.base_url.clone(),
                tianxing_usage.clone(),
            )),
            ai: Arc::new(AiAdapter::new(
                http,
                config.ai.api_key.clone(),
                config.ai.base_url.clone(),
                config.ai.model.clone(),
                ai_usage.clone(),
            )),
        };
        if config.tianxing.api_key.is_none() {
            tracing::warn!("No Tianxing API key, web search is disabled");
        }
        if config.ai.api_key.is_none() {
            tracing::warn!("No AI API key, AI search is disabled");
        }

        let search = Arc::new(SearchService::new(
            adapters,
            quota.clone(),
            cache,
            metrics.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(kv.clone(), keys));

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            metrics,
            kv,
            quota,
            idempotency,
            search,
            rate_limiter,
            recipes,
            tianxing_usage,
            ai_usage,
        })
    }

    /// Services handed to the HTTP layer
    pub fn services(&self) -> ApiServices {
        ApiServices {
            kv: self.kv.clone(),
            metrics: self.metrics.clone(),
            quota: self.quota.clone(),
            idempotency: self.idempotency.clone(),
            search: self.search.clone(),
            rate_limiter: self.rate_limiter.clone(),
            rate_limit: self
                .config
                .rate_limit
                .enabled()
                .then(|| RateLimitBucket::search(self.config.rate_limit.rpm)),
        }
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|f| f.eq_ignore_ascii_case("json"));
        if json {
            tracing_subscriber::fmt()
                .json()
                .with_current_span(false)
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true)
                .with_ansi(true)
                .compact()
                .with_env_filter(filter)
                .init();
        }
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        tracing::info!(
            host = %app.config.server.host,
            port = app.config.server.port,
            environment = %app.config.server.environment,
            kv = app.kv.backend_name(),
            "{} starting",
            APP_NAME
        );

        let server = ApiServer::new(app);
        let app = server.start().await?;

        tracing::info!(
            tianxing_calls = app.tianxing_usage.used_today(),
            ai_calls = app.ai_usage.used_today(),
            "Shutting down"
        );
        app.recipes.close().await;

        Ok(())
    }
}
