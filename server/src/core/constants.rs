// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Recipe Search";

/// Library crate name (default log filter target)
pub const APP_NAME_LOWER: &str = "recipe_search_server";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name (looked up in the working directory)
pub const CONFIG_FILE_NAME: &str = "recipe-search.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "RECIPE_SEARCH_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "RECIPE_SEARCH_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "RECIPE_SEARCH_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "RECIPE_SEARCH_LOG";

/// Environment variable selecting the log format (`compact` or `json`)
pub const ENV_LOG_FORMAT: &str = "RECIPE_SEARCH_LOG_FORMAT";

/// Environment variable for the deployment environment (key partition)
pub const ENV_ENVIRONMENT: &str = "RECIPE_SEARCH_ENV";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 5390;

/// Default deployment environment
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Default request body limit (64 KB)
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

// =============================================================================
// Environment Variables - Shared KV
// =============================================================================

/// Environment variable for the Redis-compatible KV URL
pub const ENV_KV_URL: &str = "RECIPE_SEARCH_KV_URL";

/// Environment variable to enable/disable the shared KV
pub const ENV_KV_ENABLED: &str = "RECIPE_SEARCH_KV_ENABLED";

/// Environment variable for KV fault injection (`connect`, `all`, or `get,set,...`)
pub const ENV_KV_FAULT: &str = "RECIPE_SEARCH_KV_FAULT";

/// Environment variable for the KV reconnect cooldown in seconds
pub const ENV_KV_RETRY_SECS: &str = "RECIPE_SEARCH_KV_RETRY_SECS";

// =============================================================================
// Shared KV Defaults
// =============================================================================

/// Default Redis-compatible KV URL
pub const DEFAULT_KV_URL: &str = "redis://127.0.0.1:6379";

/// Default cooldown before retrying a KV that just failed
pub const DEFAULT_KV_RETRY_SECS: u64 = 5;

/// KV connection pool size
pub const KV_POOL_MAX_SIZE: usize = 16;

/// Timeout for acquiring or creating a KV connection
pub const KV_CONNECT_TIMEOUT_SECS: u64 = 2;

/// Root prefix for every key this service writes
pub const KV_KEY_PREFIX: &str = "rs";

/// Version segment for search cache keys (bump to invalidate)
pub const CACHE_KEY_VERSION: &str = "v1";

// =============================================================================
// Quotas
// =============================================================================

/// Environment variables for per-tier and global daily limits
pub const ENV_QUOTA_FREE_WEB: &str = "RECIPE_SEARCH_QUOTA_FREE_WEB";
pub const ENV_QUOTA_FREE_AI: &str = "RECIPE_SEARCH_QUOTA_FREE_AI";
pub const ENV_QUOTA_PRO_WEB: &str = "RECIPE_SEARCH_QUOTA_PRO_WEB";
pub const ENV_QUOTA_PRO_AI: &str = "RECIPE_SEARCH_QUOTA_PRO_AI";
pub const ENV_QUOTA_ENTERPRISE_WEB: &str = "RECIPE_SEARCH_QUOTA_ENTERPRISE_WEB";
pub const ENV_QUOTA_ENTERPRISE_AI: &str = "RECIPE_SEARCH_QUOTA_ENTERPRISE_AI";
pub const ENV_QUOTA_GLOBAL_WEB: &str = "RECIPE_SEARCH_QUOTA_GLOBAL_WEB";
pub const ENV_QUOTA_GLOBAL_AI: &str = "RECIPE_SEARCH_QUOTA_GLOBAL_AI";

/// Default daily limits (web, ai) per tier
pub const DEFAULT_QUOTA_FREE: (u64, u64) = (20, 5);
pub const DEFAULT_QUOTA_PRO: (u64, u64) = (200, 50);
pub const DEFAULT_QUOTA_ENTERPRISE: (u64, u64) = (2000, 500);

/// Default global daily ceilings (web, ai)
pub const DEFAULT_QUOTA_GLOBAL: (u64, u64) = (5000, 1000);

/// Extra lifetime on quota counters past UTC midnight so late reads still see the day
pub const QUOTA_TTL_GRACE_SECS: u64 = 3600;

// =============================================================================
// Idempotency
// =============================================================================

/// Idempotency-Key header
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Header set on replayed responses
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "X-Idempotency-Replayed";

/// Lifetime of idempotency records
pub const IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;

/// Maximum accepted Idempotency-Key length
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;

// =============================================================================
// Search
// =============================================================================

/// Search cache TTL per producing route
pub const CACHE_TTL_LOCAL_SECS: u64 = 30 * 60;
pub const CACHE_TTL_WEB_SECS: u64 = 10 * 60;
pub const CACHE_TTL_AI_SECS: u64 = 30 * 60;

/// Maximum entries kept by the in-process search cache fallback
pub const LOCAL_CACHE_MAX_ENTRIES: u64 = 10_000;

/// Maximum results returned from the local recipe store
pub const LOCAL_SEARCH_LIMIT: u32 = 20;

// =============================================================================
// Upstream Adapters
// =============================================================================

/// Environment variables for the Tianxing recipe API
pub const ENV_TIANXING_KEY: &str = "RECIPE_SEARCH_TIANXING_KEY";
pub const ENV_TIANXING_BASE_URL: &str = "RECIPE_SEARCH_TIANXING_BASE_URL";
pub const ENV_TIANXING_DAILY_CAP: &str = "RECIPE_SEARCH_TIANXING_DAILY_CAP";

/// Environment variables for the AI generation endpoint
pub const ENV_AI_KEY: &str = "RECIPE_SEARCH_AI_KEY";
pub const ENV_AI_BASE_URL: &str = "RECIPE_SEARCH_AI_BASE_URL";
pub const ENV_AI_MODEL: &str = "RECIPE_SEARCH_AI_MODEL";
pub const ENV_AI_DAILY_CAP: &str = "RECIPE_SEARCH_AI_DAILY_CAP";

/// Environment variable for the upstream request timeout
pub const ENV_UPSTREAM_TIMEOUT_SECS: &str = "RECIPE_SEARCH_UPSTREAM_TIMEOUT_SECS";

/// Default Tianxing recipe endpoint
pub const DEFAULT_TIANXING_BASE_URL: &str = "https://apis.tianapi.com/caipu/index";

/// Results requested from Tianxing per call
pub const TIANXING_RESULT_COUNT: u32 = 10;

/// Default OpenAI-compatible chat completions endpoint
pub const DEFAULT_AI_BASE_URL: &str = "https://api.deepseek.com/v1/chat/completions";

/// Default AI model name
pub const DEFAULT_AI_MODEL: &str = "deepseek-chat";

/// Maximum recipes kept from one AI response
pub const AI_MAX_RESULTS: usize = 5;

/// Default upstream request timeout
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// User-Agent for outbound requests
pub const UPSTREAM_USER_AGENT: &str = concat!("recipe-search/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Recipe Store
// =============================================================================

/// Environment variable for the recipe database URL
pub const ENV_DATABASE_URL: &str = "RECIPE_SEARCH_DATABASE_URL";

/// Default recipe database URL
pub const DEFAULT_DATABASE_URL: &str = "sqlite://recipes.db";

/// SQLite pool size
pub const SQLITE_MAX_CONNECTIONS: u32 = 8;

// =============================================================================
// Rate Limiting
// =============================================================================

/// Environment variable for per-user requests per minute (0 disables)
pub const ENV_RATE_LIMIT_RPM: &str = "RECIPE_SEARCH_RATE_LIMIT_RPM";

/// Default per-user requests per minute
pub const DEFAULT_RATE_LIMIT_RPM: u32 = 60;

/// Rate limit window in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// Identity
// =============================================================================

/// Header carrying the authenticated user id (set by the upstream gateway)
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the caller's subscription tier
pub const USER_TIER_HEADER: &str = "X-User-Tier";

/// Maximum accepted user id length
pub const MAX_USER_ID_LENGTH: usize = 128;
