//! HTTP API for the questline server.
//!
//! Thin JSON layer over the engine. The UI and the visibility/resume
//! trigger are both just clients of these routes; `POST /api/v1/rollover`
//! is safe to call as often as they like.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::clock;
use crate::engine::{Engine, Error};
use crate::models::{
    AssignedQuest, CreateEventRequest, CreateHabitRequest, CreateQuestRequest, CreateTaskRequest,
    DaySummary, Event, Habit, HabitLog, LogHabitRequest, Meta, QuestTemplate, RangeStats,
    Settings, StreakInfo, Task, UpdateEventRequest, UpdateHabitRequest, UpdateQuestRequest,
    UpdateTaskRequest,
};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/rollover", post(rollover))
        .route("/api/v1/summary/{date}", get(day_summary).post(upsert_summary))
        .route("/api/v1/summary/{date}/live", get(live_totals))
        .route("/api/v1/stats", get(range_stats))
        .route("/api/v1/streak", get(streak))
        .route("/api/v1/settings", get(get_settings).put(put_settings))
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route("/api/v1/tasks/{id}", axum::routing::put(update_task).delete(delete_task))
        .route("/api/v1/tasks/{id}/toggle", post(toggle_task))
        .route("/api/v1/habits", get(list_habits).post(create_habit))
        .route("/api/v1/habits/logs", get(habit_logs))
        .route("/api/v1/habits/{id}", axum::routing::put(update_habit).delete(delete_habit))
        .route("/api/v1/habits/{id}/log", post(log_habit))
        .route("/api/v1/events", get(list_events).post(create_event))
        .route("/api/v1/events/{id}", axum::routing::put(update_event).delete(delete_event))
        .route("/api/v1/events/{id}/toggle", post(toggle_event))
        .route("/api/v1/quests", get(list_quests).post(create_quest))
        .route("/api/v1/quests/assigned", get(assigned_quests))
        .route("/api/v1/quests/assigned/{id}/toggle", post(toggle_assigned))
        .route("/api/v1/quests/{id}", axum::routing::put(update_quest).delete(delete_quest))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "questline",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn rollover(State(state): State<Arc<AppState>>) -> Result<Json<Meta>, ApiError> {
    state.engine.ensure_rollover()?;
    Ok(Json(state.engine.meta()))
}

async fn day_summary(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<DaySummary>, ApiError> {
    Ok(Json(state.engine.day_summary(&date)?))
}

/// Force a recompute-and-persist of one day's summary.
async fn upsert_summary(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<DaySummary>, ApiError> {
    Ok(Json(state.engine.upsert_day_summary(&date)?))
}

/// Live recomputation, bypassing the cache entirely.
async fn live_totals(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<DaySummary>, ApiError> {
    Ok(Json(state.engine.compute_day_totals(&date)?))
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: String,
    end: String,
}

async fn range_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<RangeStats>, ApiError> {
    Ok(Json(state.engine.range_stats(&query.start, &query.end)?))
}

async fn streak(State(state): State<Arc<AppState>>) -> Json<StreakInfo> {
    Json(state.engine.streak())
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.engine.settings())
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.engine.update_settings(settings)?))
}

// ---- Tasks ----

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<Task>> {
    Json(state.engine.tasks())
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    Ok((StatusCode::CREATED, Json(state.engine.create_task(body)?)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.engine.update_task(&id, body)?))
}

async fn toggle_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.engine.toggle_task(&id)?))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_task(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Habits ----

async fn list_habits(State(state): State<Arc<AppState>>) -> Json<Vec<Habit>> {
    Json(state.engine.habits())
}

async fn create_habit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateHabitRequest>,
) -> Result<(StatusCode, Json<Habit>), ApiError> {
    Ok((StatusCode::CREATED, Json(state.engine.create_habit(body)?)))
}

async fn update_habit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateHabitRequest>,
) -> Result<Json<Habit>, ApiError> {
    Ok(Json(state.engine.update_habit(&id, body)?))
}

async fn delete_habit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_habit(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_habit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LogHabitRequest>,
) -> Result<Json<HabitLog>, ApiError> {
    Ok(Json(state.engine.log_habit(&id, body)?))
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    date: Option<String>,
}

async fn habit_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Json<Vec<HabitLog>> {
    let date = query.date.unwrap_or_else(clock::today_key);
    Json(state.engine.habit_logs_for(&date))
}

// ---- Events ----

async fn list_events(State(state): State<Arc<AppState>>) -> Json<Vec<Event>> {
    Json(state.engine.events())
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    Ok((StatusCode::CREATED, Json(state.engine.create_event(body)?)))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateEventRequest>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.engine.update_event(&id, body)?))
}

async fn toggle_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.engine.toggle_event(&id)?))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_event(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Quests ----

async fn list_quests(State(state): State<Arc<AppState>>) -> Json<Vec<QuestTemplate>> {
    Json(state.engine.quest_library())
}

async fn create_quest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateQuestRequest>,
) -> Result<(StatusCode, Json<QuestTemplate>), ApiError> {
    Ok((StatusCode::CREATED, Json(state.engine.create_quest(body)?)))
}

async fn update_quest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateQuestRequest>,
) -> Result<Json<QuestTemplate>, ApiError> {
    Ok(Json(state.engine.update_quest(&id, body)?))
}

async fn delete_quest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_quest(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assigned_quests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<AssignedQuest>>, ApiError> {
    let date = query.date.unwrap_or_else(clock::today_key);
    Ok(Json(state.engine.assigned_for(&date)?))
}

async fn toggle_assigned(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AssignedQuest>, ApiError> {
    Ok(Json(state.engine.toggle_assigned_quest(&id)?))
}

/// API error type
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidDate(_) => StatusCode::BAD_REQUEST,
            Error::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
