use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::{Args, Parser, Subcommand};
use reportcache::{
    config::{PartialFailurePolicy, ReportConfig, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE},
    errors::{CollectionError, QueryError},
    models::{CacheInfo, Credential, PageWindow, StatisticsSnapshot},
    CacheStore, CategoryCriterion, Collector, Freshness, ReportService,
};
use reportfetcher::{HttpUpstreamClient, UpstreamConfig};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 200;

/// Runs the command line interface for the work-report agent.
pub async fn run_cli() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Serve(args)) => run_server(args).await?,
        Some(Command::Stats(args)) => print_stats(args).await?,
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the work-report HTTP service
    Serve(ServeArgs),
    /// Collects the feed once and prints its statistics as JSON
    Stats(UpstreamArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    upstream: UpstreamArgs,
    /// Socket address to bind the HTTP service
    #[arg(long, env = "WORK_REPORT_BIND", default_value = "127.0.0.1:3000")]
    bind: String,
}

#[derive(Args)]
struct UpstreamArgs {
    /// Grid endpoint serving the work-report JSON
    #[arg(long, env = "WORK_REPORT_URL")]
    url: String,
    /// Session cookie sent with every upstream request
    #[arg(long, env = "WORK_REPORT_COOKIE", hide_env_values = true)]
    cookie: Option<String>,
    /// Optional Referer header for the upstream requests
    #[arg(long, env = "WORK_REPORT_REFERER")]
    referer: Option<String>,
    /// Rows requested per upstream page
    #[arg(long, env = "WORK_REPORT_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
    /// Upper bound on pages fetched per collection run
    #[arg(long, env = "WORK_REPORT_MAX_PAGES", default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: usize,
    /// Pause between consecutive page requests
    #[arg(long, env = "WORK_REPORT_PAGE_DELAY_MS", default_value_t = 200)]
    page_delay_ms: u64,
    /// Per-request timeout
    #[arg(long, env = "WORK_REPORT_TIMEOUT_SECS", default_value_t = 15)]
    timeout_secs: u64,
    /// Age after which the cached feed is recollected
    #[arg(long, env = "WORK_REPORT_TTL_SECS", default_value_t = 24 * 60 * 60)]
    ttl_secs: u64,
    /// Comma-separated exclusion keywords replacing the defaults; `a+b`
    /// requires both parts in one cell, while `c++` is matched literally
    #[arg(long, env = "WORK_REPORT_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,
    /// Publish the pages collected before a failing page
    #[arg(long, default_value_t = false)]
    keep_partial: bool,
}

impl UpstreamArgs {
    fn report_config(&self) -> ReportConfig {
        let mut config = ReportConfig::default();
        config.collector.page_size = self.page_size;
        config.collector.max_pages = self.max_pages;
        config.collector.page_delay = Duration::from_millis(self.page_delay_ms);
        config.collector.request_timeout = Duration::from_secs(self.timeout_secs);
        if self.keep_partial {
            config.collector.partial_failure = PartialFailurePolicy::KeepPartial;
        }
        config.query.ttl = Duration::from_secs(self.ttl_secs);

        let keywords: Vec<String> = self
            .exclude
            .iter()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        if !keywords.is_empty() {
            config.filter.exclusion_keywords = keywords;
        }
        config
    }

    fn build_service(&self) -> anyhow::Result<Arc<ReportService>> {
        let mut upstream = UpstreamConfig::new(self.url.clone());
        upstream.referer = self.referer.clone();
        upstream.timeout_secs = self.timeout_secs;
        let client =
            HttpUpstreamClient::new(upstream).context("invalid upstream configuration")?;

        let config = self.report_config();
        let collector = Collector::from_config(Arc::new(client), &config)
            .context("invalid collector configuration")?;

        let credential = match self.cookie.as_deref().map(str::trim) {
            Some(cookie) if !cookie.is_empty() => Credential::new(cookie),
            _ => {
                warn!("WORK_REPORT_COOKIE is not set, upstream requests carry no session");
                Credential::default()
            }
        };

        Ok(Arc::new(ReportService::new(
            Arc::new(collector),
            Arc::new(CacheStore::new()),
            credential,
            config.query,
        )))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReportService>,
}

impl AppState {
    pub fn new(service: Arc<ReportService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::OutOfRange(_) => ApiError::BadRequest(err.to_string()),
            QueryError::RefreshFailed(CollectionError::Cancelled) => {
                ApiError::Unavailable(err.to_string())
            }
            QueryError::RefreshFailed(CollectionError::TaskFailed(_)) => {
                ApiError::Internal(err.to_string())
            }
            QueryError::RefreshFailed(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone, Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Clone, Deserialize)]
struct ListQuery {
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Clone, Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    exact: Option<bool>,
    #[serde(default)]
    refresh: Option<String>,
}

fn parse_freshness(value: Option<&str>) -> ApiResult<Freshness> {
    match value.map(str::trim) {
        None | Some("") => Ok(Freshness::IfStale),
        Some("force") => Ok(Freshness::Force),
        Some("stale") => Ok(Freshness::AllowStale),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown refresh mode '{other}', expected 'force' or 'stale'"
        ))),
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = args.bind.parse().context("failed to parse bind address")?;
    let service = args.upstream.build_service()?;

    let router = build_router(AppState::new(Arc::clone(&service)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind work-report listener")?;

    info!("Work-report service listening on {}", addr);
    let on_shutdown = {
        let service = Arc::clone(&service);
        async move {
            shutdown_signal().await;
            service.shutdown();
        }
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(on_shutdown)
        .await
        .context("work-report server error")?;

    Ok(())
}

async fn print_stats(args: UpstreamArgs) -> anyhow::Result<()> {
    let service = args.build_service()?;
    let stats = tokio::select! {
        result = service.statistics(Freshness::Force) => result?,
        _ = shutdown_signal() => {
            service.shutdown();
            anyhow::bail!("interrupted before the collection finished");
        }
    };
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Builds the HTTP router exposing the report queries.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/work-report", get(list_reports))
        .route("/api/work-report/category/:category", get(list_by_category))
        .route("/api/stats", get(get_stats))
        .route(
            "/api/cache",
            get(get_cache).delete(clear_cache).post(clear_cache),
        )
        .route("/api/cache/refresh", post(refresh_cache))
        .with_state(state)
}

async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<PageWindow>> {
    let freshness = parse_freshness(query.refresh.as_deref())?;
    let window = state
        .service
        .list_page(query.offset.unwrap_or(0), clamp_limit(query.limit), freshness)
        .await?;
    Ok(Json(window))
}

async fn list_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<CategoryQuery>,
) -> ApiResult<Json<PageWindow>> {
    if category.trim().is_empty() {
        return Err(ApiError::BadRequest("category must not be empty".into()));
    }
    let freshness = parse_freshness(query.refresh.as_deref())?;
    let criterion = if query.exact.unwrap_or(false) {
        CategoryCriterion::exact(&category)
    } else {
        CategoryCriterion::contains(&category)
    };
    let window = state
        .service
        .list_by_category(
            &criterion,
            query.offset.unwrap_or(0),
            clamp_limit(query.limit),
            freshness,
        )
        .await?;
    Ok(Json(window))
}

async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<StatisticsSnapshot>> {
    let freshness = parse_freshness(query.refresh.as_deref())?;
    let stats = state.service.statistics(freshness).await?;
    Ok(Json(stats))
}

async fn get_cache(State(state): State<AppState>) -> Json<CacheInfo> {
    Json(state.service.cache_info())
}

async fn clear_cache(State(state): State<AppState>) -> Json<CacheInfo> {
    state.service.invalidate();
    info!("Work-report cache cleared");
    Json(state.service.cache_info())
}

async fn refresh_cache(State(state): State<AppState>) -> ApiResult<Json<CacheInfo>> {
    let entry = state.service.force_refresh().await?;
    info!(
        "Work-report cache refreshed with {} records",
        entry.records.len()
    );
    Ok(Json(state.service.cache_info()))
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
