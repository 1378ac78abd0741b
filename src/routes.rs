//! API route handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backtest::{BacktestData, BacktestSummary, ConditionFilter};
use crate::board::{Board, CalendarDay, DayBoard, RaceView, DEFAULT_FIGHT_MIN_LEVEL};
use crate::config::AppConfig;
use crate::schedule::{CalendarEvent, ScheduleFilter};
use crate::store::{jst_date_key, RecordStore};
use crate::types::{ErrorResponse, HealthResponse};

/// Application state shared across handlers.
pub struct AppState {
    pub store: RecordStore,
    pub backtest: BacktestData,
    pub config: AppConfig,
}

impl AppState {
    fn board(&self) -> Board<'_> {
        Board::new(&self.store, &self.config)
    }
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/dates", get(dates))
        .route("/races/:date", get(races))
        .route("/fight/:date", get(fight))
        .route("/calendar/events", get(calendar_events))
        .route("/calendar/:date", get(calendar_day))
        .route("/backtest", get(backtest))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn date_key(raw: &str) -> Result<String, ApiError> {
    jst_date_key(raw).ok_or_else(|| ApiError::bad_request("Empty date"))
}

fn day_not_found(date: &str) -> ApiError {
    ApiError::not_found(format!("No predictions for {}", date))
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct DateSummary {
    pub date: String,
    pub mode_label: &'static str,
    pub race_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<DateSummary>,
}

/// Predicted dates, newest first.
pub async fn dates(State(state): State<Arc<AppState>>) -> Json<DatesResponse> {
    let dates = state
        .store
        .dates()
        .into_iter()
        .filter_map(|date| {
            state.store.day(date).map(|day| DateSummary {
                date: date.to_string(),
                mode_label: day.mode().label(),
                race_count: day.races.len(),
            })
        })
        .collect();
    Json(DatesResponse { dates })
}

/// Every predicted race of a date.
pub async fn races(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<DayBoard>, ApiError> {
    let key = date_key(&date)?;
    state
        .board()
        .day(&key)
        .map(Json)
        .ok_or_else(|| day_not_found(&key))
}

#[derive(Debug, Deserialize)]
pub struct FightQuery {
    pub min_level: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct FightResponse {
    pub date: String,
    pub min_level: u8,
    pub races: Vec<RaceView>,
}

/// 勝負レース of a date.
pub async fn fight(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
    Query(query): Query<FightQuery>,
) -> Result<Json<FightResponse>, ApiError> {
    let key = date_key(&date)?;
    let min_level = query.min_level.unwrap_or(DEFAULT_FIGHT_MIN_LEVEL);
    let races = state
        .board()
        .fight(&key, min_level)
        .ok_or_else(|| day_not_found(&key))?;

    Ok(Json(FightResponse {
        date: key,
        min_level,
        races,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub grades: Option<String>,
    pub surface: Option<String>,
}

impl CalendarQuery {
    fn filter(&self) -> Result<ScheduleFilter, ApiError> {
        ScheduleFilter::from_params(self.grades.as_deref(), self.surface.as_deref())
            .map_err(ApiError::bad_request)
    }
}

/// Schedule merged with predictions for one date.
pub async fn calendar_day(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarDay>, ApiError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| ApiError::bad_request(format!("Invalid date {}: {}", date, e)))?;
    let filter = query.filter()?;
    Ok(Json(state.board().calendar_day(date, &filter)))
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<CalendarEvent>,
}

pub async fn calendar_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let filter = query.filter()?;
    Ok(Json(EventsResponse {
        events: state.board().calendar_events(&filter),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BacktestQuery {
    /// Comma-separated axis counts
    pub axes: Option<String>,
    pub min_races: Option<u32>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BacktestResponse {
    /// False when no condition table has been produced yet
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BacktestSummary>,
}

/// Parse a comma-separated list of axis counts.
pub fn parse_axes(list: &str) -> Result<Vec<u32>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| format!("invalid axis count: {}", s)))
        .collect()
}

pub async fn backtest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BacktestQuery>,
) -> Result<Json<BacktestResponse>, ApiError> {
    let mut filter = ConditionFilter::from_config(&state.config.backtest);
    if let Some(axes) = query.axes.as_deref() {
        filter.axes = parse_axes(axes).map_err(ApiError::bad_request)?;
    }
    if let Some(min_races) = query.min_races {
        filter.min_races = min_races;
    }
    if let Some(top_n) = query.top_n {
        filter.top_n = top_n;
    }

    let summary = state
        .backtest
        .summarize(&filter, state.config.backtest.stake_unit);
    Ok(Json(BacktestResponse {
        available: summary.is_some(),
        summary,
    }))
}
