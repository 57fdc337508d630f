//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::openapi::{openapi_json, swagger_ui_html};
use super::rate_limit::{RateLimitState, rate_limit_middleware};
use super::routes::health::{self, HealthApiState};
use super::routes::{quota, search};
use crate::core::CoreApp;
use crate::core::MetricsService;
use crate::core::constants::DEFAULT_BODY_LIMIT;
use crate::data::KvClient;
use crate::data::kv::{RateLimitBucket, RateLimiter};
use crate::domain::{IdempotencyService, QuotaService, SearchService};

/// Everything the HTTP layer calls into
#[derive(Clone)]
pub struct ApiServices {
    pub kv: Arc<KvClient>,
    pub metrics: Arc<MetricsService>,
    pub quota: Arc<QuotaService>,
    pub idempotency: Arc<IdempotencyService>,
    pub search: Arc<SearchService>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Per-caller bucket for search and quota routes; `None` disables limiting
    pub rate_limit: Option<RateLimitBucket>,
}

/// Build the full router
pub fn build_router(services: ApiServices) -> Router {
    let search_routes = search::routes(services.search.clone(), services.idempotency.clone());
    let quota_routes = quota::routes(services.quota.clone());

    let (search_routes, quota_routes) = match services.rate_limit.clone() {
        Some(bucket) => {
            let state = RateLimitState {
                limiter: services.rate_limiter.clone(),
                bucket,
                metrics: services.metrics.clone(),
            };
            (
                search_routes.layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit_middleware,
                )),
                quota_routes.layer(axum::middleware::from_fn_with_state(
                    state,
                    rate_limit_middleware,
                )),
            )
        }
        None => (search_routes, quota_routes),
    };

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .with_state(HealthApiState {
            kv: services.kv.clone(),
            metrics: services.metrics.clone(),
        });

    Router::new()
        .merge(health_routes)
        .route("/api/openapi.json", get(openapi_json))
        .route("/api/docs", get(swagger_ui_html))
        .nest("/search", search_routes)
        .nest("/quota", quota_routes)
        .fallback(middleware::handle_404)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
}

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;
        let shutdown = app.shutdown.clone();

        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);
        let router = build_router(app.services());

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Listening");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await?;

        Ok(app)
    }
}
