// Archive Budget Pipeline - Web Server
// JSON query API over the live snapshot; POST /api/reload swaps in a new one

use anyhow::{Context, Result};
use archive_budget::logging::init_logging;
use archive_budget::{
    load_institutions, Amount, AmountRange, BudgetRecord, Dimension, Filter, Grouping,
    Pipeline, PipelineConfig, PipelineError, PipelineResult, ProjectType, QualityIssue,
    QualityReport, QueryFacade, SnapshotStore, Summary,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Parser, Clone)]
#[command(name = "archive-budget-server")]
#[command(about = "JSON query API over the budget pipeline")]
struct Args {
    /// Budget table (CSV), re-read on every reload
    csv: PathBuf,
    #[arg(long)]
    institutions: Option<PathBuf>,
    /// Pipeline configuration (JSON), re-read on every reload
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<SnapshotStore>,
    args: Arc<Args>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    version: u64,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(version: u64, data: T) -> Response {
        let body = Self { success: true, version, data: Some(data), error: None };
        (StatusCode::OK, Json(body)).into_response()
    }

    fn fail(status: StatusCode, version: u64, error: impl ToString) -> Response {
        let body: ApiResponse<T> = Self {
            success: false,
            version,
            data: None,
            error: Some(error.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

/// Filter as query-string parameters; lists are comma-separated
#[derive(Debug, Default, Deserialize)]
struct FilterParams {
    regions: Option<String>,
    types: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
    /// Grouping for /api/aggregate
    by: Option<String>,
    /// Row limit for /api/top
    limit: Option<usize>,
}

impl FilterParams {
    fn filter(&self) -> Result<Filter, String> {
        let mut filter = Filter::all();

        for region in split_list(self.regions.as_deref()) {
            filter = filter.region(region);
        }
        for raw in split_list(self.types.as_deref()) {
            filter = filter.project_type(raw.parse::<ProjectType>()?);
        }
        if self.min.is_some() || self.max.is_some() {
            filter = filter.amount_range(AmountRange {
                min: self.min.map(Amount::from_won),
                max: self.max.map(Amount::from_won),
            });
        }

        Ok(filter)
    }

    fn dimensions(&self) -> Result<Vec<Dimension>, String> {
        Dimension::parse_list(self.by.as_deref().unwrap_or("region,project_type"))
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = String> + '_ {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[derive(Serialize)]
struct QualityResponse {
    summary: String,
    report: QualityReport,
    issues: Vec<QualityIssue>,
}

#[derive(Serialize)]
struct ReloadResponse {
    snapshot_id: String,
    records: usize,
    token: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> Response {
    let snapshot = state.store.current();
    ApiResponse::ok(snapshot.version(), "OK")
}

/// GET /api/records - Filtered records
async fn get_records(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Response {
    let snapshot = state.store.current();
    let filter = match params.filter() {
        Ok(filter) => filter,
        Err(e) => return ApiResponse::<()>::fail(StatusCode::BAD_REQUEST, snapshot.version(), e),
    };

    let records: Vec<&BudgetRecord> = QueryFacade::new(&snapshot).filter(&filter);
    ApiResponse::ok(snapshot.version(), records)
}

/// GET /api/aggregate - Buckets, over the filtered subset when a filter is given
async fn get_aggregate(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Response {
    let snapshot = state.store.current();
    let version = snapshot.version();

    let (filter, dimensions) = match params.filter().and_then(|f| Ok((f, params.dimensions()?))) {
        Ok(parsed) => parsed,
        Err(e) => return ApiResponse::<()>::fail(StatusCode::BAD_REQUEST, version, e),
    };

    if filter.is_unrestricted() {
        let grouping = state.store.aggregate_on(&snapshot, &dimensions);
        return ApiResponse::ok(version, grouping.as_ref());
    }

    let grouping: Grouping = QueryFacade::new(&snapshot).filter_buckets(&filter, &dimensions);
    ApiResponse::ok(version, grouping)
}

/// GET /api/summary - Headline figures
async fn get_summary(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Response {
    let snapshot = state.store.current();
    match params.filter() {
        Ok(filter) => {
            let summary: Summary = QueryFacade::new(&snapshot).summary(&filter);
            ApiResponse::ok(snapshot.version(), summary)
        }
        Err(e) => ApiResponse::<()>::fail(StatusCode::BAD_REQUEST, snapshot.version(), e),
    }
}

/// GET /api/top - Largest projects
async fn get_top(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Response {
    let snapshot = state.store.current();
    match params.filter() {
        Ok(filter) => {
            let top = QueryFacade::new(&snapshot).top_projects(&filter, params.limit.unwrap_or(10));
            ApiResponse::ok(snapshot.version(), top)
        }
        Err(e) => ApiResponse::<()>::fail(StatusCode::BAD_REQUEST, snapshot.version(), e),
    }
}

/// GET /api/quality - Data quality report of the live snapshot
async fn get_quality(State(state): State<AppState>) -> Response {
    let snapshot = state.store.current();
    let quality = snapshot.quality();
    let response = QualityResponse {
        summary: quality.summary(),
        report: quality.clone(),
        issues: quality.issues(),
    };
    ApiResponse::ok(snapshot.version(), response)
}

/// POST /api/reload - Re-read config and input, swap on success
async fn reload(State(state): State<AppState>) -> Response {
    let store = Arc::clone(&state.store);
    let args = Arc::clone(&state.args);

    let outcome = tokio::task::spawn_blocking(move || reload_from_disk(&store, &args)).await;
    let version = state.store.current().version();

    match outcome {
        Ok(Ok(response)) => ApiResponse::ok(version, response),
        Ok(Err(e)) => {
            error!("Reload failed: {:#}", e);
            ApiResponse::<()>::fail(StatusCode::UNPROCESSABLE_ENTITY, version, format!("{:#}", e))
        }
        Err(e) => {
            error!("Reload task failed: {}", e);
            ApiResponse::<()>::fail(StatusCode::INTERNAL_SERVER_ERROR, version, e)
        }
    }
}

// ============================================================================
// Reload
// ============================================================================

fn reload_from_disk(store: &SnapshotStore, args: &Args) -> Result<ReloadResponse> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let pipeline = Pipeline::new(config)?;

    let institutions = match &args.institutions {
        Some(path) => load_institutions(path, pipeline.regions())?,
        None => Vec::new(),
    };

    let snapshot = store.reload_if_changed(|| -> PipelineResult<_> {
        let file = File::open(&args.csv)
            .map_err(|e| PipelineError::UnreadableInput(format!("{:?}: {}", args.csv, e)))?;
        pipeline.run_csv(file, &institutions)
    })?;

    Ok(ReloadResponse {
        snapshot_id: snapshot.snapshot_id().to_string(),
        records: snapshot.count(),
        token: snapshot.token().to_string(),
    })
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let store = Arc::new(SnapshotStore::new());
    let initial = reload_from_disk(&store, &args).context("Initial load failed")?;
    info!(records = initial.records, "Initial snapshot ready");

    let state = AppState {
        store,
        args: Arc::new(args.clone()),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records", get(get_records))
        .route("/aggregate", get(get_aggregate))
        .route("/summary", get(get_summary))
        .route("/top", get(get_top))
        .route("/quality", get(get_quality))
        .route("/reload", post(reload))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", args.addr))?;

    info!("Server running on http://{}", args.addr);
    axum::serve(listener, app).await.context("Server stopped")?;

    Ok(())
}
