//! REST endpoints for the task resource.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    DayBound, Page, Task, TaskCreate, TaskFilter, TaskPriority, TaskStatus, TaskUpdate,
    parse_due_date,
};

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    offset: Option<i64>,
    limit: Option<i64>,
}

/// Filter query parameters. Status/priority arrive as raw strings so that
/// out-of-range values produce a structured validation error rather than a
/// bare deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct FilterParams {
    status: Option<String>,
    priority: Option<String>,
    due_before: Option<String>,
    due_after: Option<String>,
    offset: Option<i64>,
    limit: Option<i64>,
}

impl FilterParams {
    fn to_filter(&self) -> ApiResult<TaskFilter> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(s) => Some(TaskStatus::from_str(s).ok_or_else(|| {
                ApiError::invalid_value("status", "status must be pending, in_progress, or done")
            })?),
        };
        let priority = match self.priority.as_deref() {
            None | Some("") => None,
            Some(s) => Some(TaskPriority::from_str(s).ok_or_else(|| {
                ApiError::invalid_value("priority", "priority must be low, medium, or high")
            })?),
        };
        let due_before = self
            .due_before
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| parse_due_date(s, DayBound::End))
            .transpose()
            .map_err(|e| ApiError::invalid_value("due_before", &e.message))?;
        let due_after = self
            .due_after
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| parse_due_date(s, DayBound::Start))
            .transpose()
            .map_err(|e| ApiError::invalid_value("due_after", &e.message))?;

        Ok(TaskFilter {
            status,
            priority,
            due_before,
            due_after,
        })
    }

    fn page(&self) -> Page {
        Page::new(self.offset, self.limit)
    }
}

/// `POST /api/tasks` — create a task.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<TaskCreate>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    input.validate()?;
    let task = state.db.create_task(&input)?;
    state.broadcast_snapshot()?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /api/tasks` — list tasks with pagination.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state.db.list_tasks(&Page::new(params.offset, params.limit))?;
    Ok(Json(tasks))
}

/// `GET /api/tasks/filter` — filter tasks by status/priority/due-date range.
pub async fn filter(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Json<Vec<Task>>> {
    let filter = params.to_filter()?;
    let tasks = state.db.filter_tasks(&filter, &params.page())?;
    Ok(Json(tasks))
}

/// `GET /api/tasks/count` — count tasks matching an optional filter.
pub async fn count(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Json<Value>> {
    let filter = params.to_filter()?;
    let count = state.db.count_tasks(&filter)?;
    Ok(Json(json!({ "count": count })))
}

/// `GET /api/tasks/{id}` — fetch one task.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Task>> {
    let task = state
        .db
        .get_task(id)?
        .ok_or_else(|| ApiError::task_not_found(id))?;
    Ok(Json(task))
}

/// `PUT /api/tasks/{id}` — partial update.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<TaskUpdate>,
) -> ApiResult<Json<Task>> {
    input.validate()?;
    let task = state
        .db
        .update_task(id, &input)?
        .ok_or_else(|| ApiError::task_not_found(id))?;
    state.broadcast_snapshot()?;
    Ok(Json(task))
}

/// `DELETE /api/tasks/{id}` — hard delete.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !state.db.delete_task(id)? {
        return Err(ApiError::task_not_found(id));
    }
    state.broadcast_snapshot()?;
    Ok(Json(json!({ "deleted": true })))
}
