//! # garage: users and their cars over HTTP
//!
//! `garage` is a small CRUD service for users and the cars they own. It exposes a JSON API
//! under `/api/v1`, persists to PostgreSQL, and keeps a Redis read-through cache in front of
//! single-entity reads.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). A request passes through:
//!
//! 1. request-id assignment and tracing ([`build_router`])
//! 2. the error envelope middleware, which renders every failure (including the timeout's
//!    408 and axum's 405) as `{meta: {..., error: {code, message}}}` in the caller's language
//! 3. CORS and the request timeout
//! 4. the rate limiter ([`limits`]), a fixed window per route and per client kept in Redis
//! 5. a handler ([`api::handlers`]) that validates input and calls a service
//!
//! **Services** ([`services`]) own the business rules: merge-patch updates, cache population on
//! read and invalidation after writes, and the owner check for a user's cars.
//!
//! **Repositories** ([`db::handlers`]) run named SQL templates from the query store
//! ([`db::queries`]). Filters are rendered into the template as presence flags and bound as
//! parameters; only closed enums ever reach the SQL text as identifiers.
//!
//! **Background jobs** ([`scheduler`]) run beside the server and stop on shutdown.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use garage::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = garage::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     garage::telemetry::init_telemetry(config.enable_otel_export, config.log_format)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations in `migrations/` run automatically on startup. The database URL comes from
//! `database.url` in the config file, `GARAGE_DATABASE__URL`, or `DATABASE_URL`.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod limits;
pub mod openapi;
pub mod scheduler;
pub mod services;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{self, HeaderValue, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
pub use errors::{Error, ErrorCode, Lang};
pub use types::{CarId, UserId};

use crate::api::models::envelope::error_envelope;
use crate::cache::{CacheGate, CacheStore, RedisCache};
use crate::config::{CorsOrigin, PoolSettings};
use crate::db::handlers::{Cars, Users};
use crate::db::queries::QueryTemplates;
use crate::limits::RateLimiter;
use crate::openapi::ApiDoc;
use crate::services::{CarService, UserService};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state handed to every handler and middleware.
///
/// The limiter is `None` when rate limiting is disabled.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .users(users)
///     .cars(cars)
///     .maybe_limiter(limiter)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub users: UserService,
    pub cars: CarService,
    pub limiter: Option<RateLimiter>,
}

/// Get the garage database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;
    let allow_origin = if origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PUT, http::Method::PATCH, http::Method::DELETE])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::HeaderName::from_static(errors::APP_LANG_HEADER),
            http::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([http::HeaderName::from_static(REQUEST_ID_HEADER)]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

fn api_routes(state: AppState) -> Router {
    use api::handlers::{cars, users};

    Router::new()
        .route("/users", post(users::create_user).get(users::list_users))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/cars", get(users::list_user_cars))
        .route("/cars", post(cars::create_car).get(cars::list_cars))
        .route("/cars/bulk", post(cars::create_cars_bulk))
        .route("/cars/availability", patch(cars::update_cars_availability))
        .route(
            "/cars/{id}",
            get(cars::get_car)
                .put(cars::update_car)
                .patch(cars::update_car)
                .delete(cars::delete_car),
        )
        .route("/cars/{id}/transfer", post(cars::transfer_car))
        .route_layer(from_fn_with_state(state.clone(), limits::rate_limit))
        .with_state(state)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/api/v1/*`: the users and cars API, rate limited per route
/// - `/healthz`: liveness
/// - `/docs` and `/api-docs/openapi.json`: API documentation
/// - `/internal/metrics`: Prometheus metrics, when `enable_metrics` is set
///
/// Unknown paths get a `NOT_FOUND` envelope.
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes(state))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .fallback(|uri: http::Uri| async move {
            Error::NotFound {
                resource: "Route".to_string(),
                id: uri.path().to_string(),
            }
        });

    if config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout))
        .layer(create_cors_layer(&config)?)
        .layer(from_fn(error_envelope))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get(REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default();
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = %request_id,
                            )
                        })
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    Ok(router)
}

/// Background tasks running beside the HTTP server.
///
/// Dropping the struct cancels the shutdown token through `drop_guard`; [`shutdown`]
/// cancels it explicitly and waits for every task to finish.
///
/// [`shutdown`]: BackgroundServices::shutdown
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    fn start(config: &Config, users: UserService) -> Self {
        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let background_tasks = scheduler::spawn_jobs(&config.scheduler, users, shutdown_token.clone());
        let drop_guard = shutdown_token.clone().drop_guard();

        Self {
            background_tasks,
            shutdown_token,
            drop_guard: Some(drop_guard),
        }
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(guard) = self.drop_guard.take() {
            guard.disarm();
        }

        for handle in self.background_tasks {
            if let Err(e) = handle.await {
                warn!("Background task panicked during shutdown: {}", e);
            }
        }
    }
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let non_zero = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(non_zero(settings.idle_timeout_secs))
        .max_lifetime(non_zero(settings.max_lifetime_secs))
}

/// Connect to Redis when either the cache or the rate limiter needs it.
async fn setup_cache_store(config: &Config) -> anyhow::Result<Option<Arc<dyn CacheStore>>> {
    if !config.cache.enabled && !config.limits.rate_limiter.enabled {
        return Ok(None);
    }

    let redis = RedisCache::new(&config.cache)?;
    match redis.ping().await {
        Ok(()) => info!("Connected to Redis"),
        // Reads fall back to the database and the limiter lets requests through
        Err(e) => warn!("Redis is not reachable at startup, continuing without it for now: {}", e),
    }
    Ok(Some(Arc::new(redis)))
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to PostgreSQL and Redis, runs migrations,
///    loads the query templates and starts background jobs
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, stops jobs and closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting garage with configuration: {:#?}", config);

        let pool = pool_options(&config.database.pool).connect(&config.database.url).await?;
        migrator().run(&pool).await?;

        let queries = Arc::new(QueryTemplates::load(config.queries.dir.as_deref())?);

        let cache_store = setup_cache_store(&config).await?;
        let gate = match &cache_store {
            Some(store) if config.cache.enabled => CacheGate::new(store.clone(), config.cache.ttl),
            _ => CacheGate::disabled(),
        };
        let limiter = match &cache_store {
            Some(store) if config.limits.rate_limiter.enabled => {
                Some(RateLimiter::from_config(&config.limits.rate_limiter, store.clone()).map_err(anyhow::Error::msg)?)
            }
            _ => None,
        };

        let users = UserService::new(Arc::new(Users::new(pool.clone(), queries.clone())), gate.clone());
        let cars = CarService::new(Arc::new(Cars::new(pool.clone(), queries)), users.clone(), gate);

        let bg_services = BackgroundServices::start(&config, users.clone());

        let state = AppState::builder()
            .config(config.clone())
            .users(users)
            .cars(cars)
            .maybe_limiter(limiter)
            .build();
        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("garage listening on http://{}", bind_addr);

        // Peer addresses identify clients for rate limiting
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
