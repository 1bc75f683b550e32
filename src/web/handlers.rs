//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, StoredQuery};
use crate::loader::{LoadError, LoadedQuery};
use crate::migrate::duration::{self, DurationError, TimeGrainUnit};
use crate::migrate::{Migrated, MigrationError, QueryRecord, StoredQueryRecord};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Error mapping
// ============================================================================

fn db_error(e: DbError) -> Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, "Query not found").into_response(),
        DbError::Json(e) => (StatusCode::BAD_REQUEST, format!("Invalid query body: {}", e)).into_response(),
        e => {
            tracing::error!("Storage error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn migration_error(e: MigrationError) -> Response {
    match e {
        MigrationError::Decode(_) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        MigrationError::Encode(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn load_error(e: LoadError) -> Response {
    match e {
        LoadError::Db(e) => db_error(e),
        LoadError::Migration(e) => migration_error(e),
        LoadError::Conflict(_) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}

fn duration_error(e: DurationError) -> Response {
    (StatusCode::BAD_REQUEST, e.to_string()).into_response()
}

// ============================================================================
// Views
// ============================================================================

/// Interval the backend would use for each `auto` grain on the record.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoIntervals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_monitor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_insights: Option<String>,
}

impl AutoIntervals {
    fn of(record: &QueryRecord) -> Self {
        Self {
            azure_monitor: record.azure_monitor.as_ref().and_then(|q| q.auto_interval()),
            app_insights: record.app_insights.as_ref().and_then(|q| q.auto_interval()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationView {
    #[serde(flatten)]
    pub migrated: Migrated,
    pub auto_intervals: AutoIntervals,
}

impl From<Migrated> for MigrationView {
    fn from(migrated: Migrated) -> Self {
        let auto_intervals = AutoIntervals::of(&migrated.record);
        Self {
            migrated,
            auto_intervals,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryView {
    #[serde(flatten)]
    pub loaded: LoadedQuery,
    pub auto_intervals: AutoIntervals,
}

impl From<LoadedQuery> for QueryView {
    fn from(loaded: LoadedQuery) -> Self {
        let auto_intervals = AutoIntervals::of(&loaded.migrated.record);
        Self {
            loaded,
            auto_intervals,
        }
    }
}

// ============================================================================
// API: Stored queries
// ============================================================================

pub async fn handle_get_queries(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_queries() {
        Ok(queries) => Json(queries).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQueryRequest {
    #[serde(default)]
    pub dashboard_uid: String,
    #[serde(default)]
    pub panel_id: i64,
    /// The query record, stored as given.
    pub body: Value,
}

impl SaveQueryRequest {
    fn into_row(self, id: i64) -> StoredQuery {
        let ref_id = self
            .body
            .get("refId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        StoredQuery {
            id,
            dashboard_uid: self.dashboard_uid,
            panel_id: self.panel_id,
            ref_id,
            body: self.body.to_string(),
            ..Default::default()
        }
    }
}

pub async fn handle_create_query(
    State(state): State<AppState>,
    Json(req): Json<SaveQueryRequest>,
) -> impl IntoResponse {
    let mut row = req.into_row(0);
    match state.store.add_query(&mut row) {
        Ok(_) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(e) => db_error(e),
    }
}

pub async fn handle_get_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.loader.load(id) {
        Ok(loaded) => Json(QueryView::from(loaded)).into_response(),
        Err(e) => load_error(e),
    }
}

pub async fn handle_update_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SaveQueryRequest>,
) -> impl IntoResponse {
    let row = req.into_row(id);
    if let Err(e) = state.store.update_query(&row) {
        return db_error(e);
    }
    match state.store.get_query(id) {
        Ok(row) => Json(row).into_response(),
        Err(e) => db_error(e),
    }
}

pub async fn handle_delete_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_query(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error(e),
    }
}

pub async fn handle_upgrade_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.loader.upgrade(id) {
        Ok(loaded) => Json(QueryView::from(loaded)).into_response(),
        Err(e) => load_error(e),
    }
}

pub async fn handle_upgrade_all(State(state): State<AppState>) -> impl IntoResponse {
    match state.loader.upgrade_all() {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => load_error(e),
    }
}

// ============================================================================
// API: Stateless migration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MigrateParams {
    /// `false` returns the bare canonical record.
    #[serde(default = "default_report")]
    pub report: bool,
}

fn default_report() -> bool {
    true
}

pub async fn handle_migrate(
    State(state): State<AppState>,
    Query(params): Query<MigrateParams>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let engine = state.loader.engine();
    if !params.report {
        return match serde_json::from_value::<StoredQueryRecord>(body) {
            Ok(stored) => Json(engine.migrate(stored)).into_response(),
            Err(e) => migration_error(MigrationError::Decode(e)),
        };
    }
    match engine.migrate_value(body) {
        Ok(migrated) => Json(MigrationView::from(migrated)).into_response(),
        Err(e) => migration_error(e),
    }
}

#[derive(Debug, Serialize)]
pub struct StepInfo {
    pub name: &'static str,
    pub description: &'static str,
}

pub async fn handle_list_migrations(State(state): State<AppState>) -> impl IntoResponse {
    let steps: Vec<StepInfo> = state
        .loader
        .engine()
        .steps()
        .iter()
        .map(|s| StepInfo {
            name: s.name,
            description: s.description,
        })
        .collect();
    Json(steps)
}

// ============================================================================
// API: Time grains
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IsoQuery {
    pub count: String,
    pub unit: String,
}

#[derive(Debug, Serialize)]
pub struct IsoResponse {
    pub iso8601: String,
    /// Missing when the duration has no single-unit shorthand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shorthand: Option<String>,
}

pub async fn handle_timegrain_iso8601(Query(q): Query<IsoQuery>) -> impl IntoResponse {
    let iso = match q
        .unit
        .parse::<TimeGrainUnit>()
        .and_then(|unit| duration::to_iso8601(&q.count, unit))
    {
        Ok(iso) => iso,
        Err(e) => return duration_error(e),
    };
    let shorthand = duration::to_shorthand(&iso).ok();
    Json(IsoResponse {
        iso8601: iso,
        shorthand,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ClosestQuery {
    pub target: String,
    /// Comma separated shorthand grains; empty uses the default ladder.
    #[serde(default)]
    pub candidates: String,
}

pub async fn handle_timegrain_closest(Query(q): Query<ClosestQuery>) -> impl IntoResponse {
    let candidates: Vec<&str> = split_list(&q.candidates).collect();
    let closest = match duration::closest(&q.target, &candidates) {
        Ok(closest) => closest,
        Err(e) => return duration_error(e),
    };
    let iso8601 = duration::interval_to_iso8601(&closest).ok();
    Json(serde_json::json!({ "closest": closest, "iso8601": iso8601 })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoQuery {
    #[serde(default)]
    pub time_grain: Option<String>,
    /// Comma separated milliseconds.
    #[serde(default)]
    pub allowed_ms: String,
}

pub async fn handle_timegrain_auto(Query(q): Query<AutoQuery>) -> impl IntoResponse {
    let allowed: Result<Vec<u64>, _> = split_list(&q.allowed_ms).map(str::parse::<u64>).collect();
    let allowed = match allowed {
        Ok(allowed) => allowed,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid allowedMs: {}", e)).into_response()
        }
    };
    let interval = duration::auto_interval(q.time_grain.as_deref(), &allowed);
    let iso8601 = interval
        .as_deref()
        .and_then(|i| duration::interval_to_iso8601(i).ok());
    Json(serde_json::json!({ "interval": interval, "iso8601": iso8601 })).into_response()
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}
