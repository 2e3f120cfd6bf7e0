use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::analytics::{DEFAULT_PROJECTION_CYCLES, MAX_PROJECTION_CYCLES};
use crate::error::AppError;
use crate::models::{
    AggregateIrregularityReport, CurrentPhase, CycleCalendar, CycleDraft, CycleInsights,
    CycleRecord, CycleStatistics, CycleStats,
};
use crate::state::AppState;
use crate::storage::StoreError;

/// `?now=YYYY-MM-DD`, defaulting to the server's local date.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub now: Option<NaiveDate>,
}

impl AnalyticsQuery {
    fn today(&self) -> NaiveDate {
        self.now.unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub subject_ids: Vec<String>,
    #[serde(default)]
    pub now: Option<NaiveDate>,
}

/// Run a store call off the async workers; the encrypted store seals on
/// every write.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn list_cycles_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<CycleRecord>>, AppError> {
    Ok(Json(state.service.list_cycles(&subject_id)?))
}

pub async fn create_cycle_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
    Json(draft): Json<CycleDraft>,
) -> Result<(StatusCode, Json<CycleRecord>), AppError> {
    let record = blocking(move || state.service.log_cycle(&subject_id, draft)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_cycle_handler(
    State(state): State<Arc<AppState>>,
    Path((subject_id, cycle_id)): Path<(String, Uuid)>,
    Json(draft): Json<CycleDraft>,
) -> Result<Json<CycleRecord>, AppError> {
    let record =
        blocking(move || state.service.update_cycle(&subject_id, cycle_id, draft)).await?;
    Ok(Json(record))
}

pub async fn delete_cycle_handler(
    State(state): State<Arc<AppState>>,
    Path((subject_id, cycle_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, AppError> {
    blocking(move || state.service.delete_cycle(&subject_id, cycle_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn prediction_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<CycleStatistics>, AppError> {
    Ok(Json(state.service.prediction(&subject_id, query.today())?))
}

pub async fn insights_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<CycleInsights>, AppError> {
    Ok(Json(state.service.insights(&subject_id)?))
}

pub async fn phase_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<CurrentPhase>, AppError> {
    Ok(Json(state.service.current_phase(&subject_id, query.today())?))
}

pub async fn calendar_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CycleCalendar>, AppError> {
    let count = query.count.unwrap_or(DEFAULT_PROJECTION_CYCLES);
    if count == 0 || count > MAX_PROJECTION_CYCLES {
        return Err(AppError::InvalidProjectionCount(count));
    }
    Ok(Json(state.service.calendar(&subject_id, count)?))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<CycleStats>, AppError> {
    Ok(Json(state.service.stats(&subject_id)?))
}

pub async fn aggregate_irregularity_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AggregateRequest>,
) -> Result<Json<AggregateIrregularityReport>, AppError> {
    let today = AnalyticsQuery { now: request.now }.today();
    Ok(Json(
        state
            .service
            .aggregate_irregularity(&request.subject_ids, today)?,
    ))
}
