//! Core types for the taskpilot service.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Maximum title length accepted by the validation layer.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum description length accepted by the validation layer.
pub const MAX_DESCRIPTION_LEN: usize = 1000;
/// Maximum chat message length accepted by the chat endpoints.
pub const MAX_CHAT_MESSAGE_LEN: usize = 1000;

/// Task status. Stored as snake_case text with a CHECK constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Task priority. Stored as snake_case text with a CHECK constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

/// A persisted task. The sole entity in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a task. Status and priority default when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskCreate {
    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> ApiResult<()> {
        if self.title.trim().is_empty() {
            return Err(ApiError::missing_field("title"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ApiError::invalid_value(
                "title",
                &format!("title must be at most {} characters", MAX_TITLE_LEN),
            ));
        }
        if let Some(desc) = &self.description
            && desc.chars().count() > MAX_DESCRIPTION_LEN
        {
            return Err(ApiError::invalid_value(
                "description",
                &format!(
                    "description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                ),
            ));
        }
        Ok(())
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }

    pub fn validate(&self) -> ApiResult<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ApiError::invalid_value("title", "title must not be empty"));
            }
            if title.chars().count() > MAX_TITLE_LEN {
                return Err(ApiError::invalid_value(
                    "title",
                    &format!("title must be at most {} characters", MAX_TITLE_LEN),
                ));
            }
        }
        if let Some(desc) = &self.description
            && desc.chars().count() > MAX_DESCRIPTION_LEN
        {
            return Err(ApiError::invalid_value(
                "description",
                &format!(
                    "description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                ),
            ));
        }
        Ok(())
    }
}

/// Filter criteria. All present criteria are combined with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Inclusive upper bound on due_date.
    #[serde(default)]
    pub due_before: Option<DateTime<Utc>>,
    /// Inclusive lower bound on due_date.
    #[serde(default)]
    pub due_after: Option<DateTime<Utc>>,
}

/// Pagination window for list queries.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    /// Build a page from raw query values, clamping out-of-range input.
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            offset: offset.unwrap_or(0).max(0),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Which end of the day a date-only string should bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// Parse a due-date string into a UTC timestamp.
///
/// Accepts RFC 3339 (`2025-06-01T12:00:00Z`), a naive datetime
/// (`2025-06-01T12:00:00`, interpreted as UTC), or a bare date
/// (`2025-06-01`). Bare dates bind to the start or end of the day depending
/// on `bound`, matching how the filter endpoints treat `due_after` and
/// `due_before`.
pub fn parse_due_date(s: &str, bound: DayBound) -> ApiResult<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = s.parse::<chrono::NaiveDateTime>() {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = s.parse::<NaiveDate>() {
        let time = match bound {
            DayBound::Start => NaiveTime::from_hms_opt(0, 0, 0),
            DayBound::End => NaiveTime::from_hms_opt(23, 59, 59),
        }
        .unwrap_or_default();
        return Ok(Utc.from_utc_datetime(&date.and_time(time)));
    }

    Err(ApiError::invalid_value(
        "due_date",
        "invalid date format, use YYYY-MM-DD or an RFC 3339 timestamp",
    ))
}

/// `POST /api/chat` request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /api/chat` response body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub task_updates: Vec<Task>,
    pub tools_used: Vec<String>,
}

/// Reference to a task by id or by title.
///
/// Tools let the model address tasks either way; the data layer resolves
/// titles to at most one task and reports ambiguity as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    Id(i64),
    Title(String),
}

impl TaskRef {
    /// Interpret a free-form identifier: all-digits means id, otherwise title.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(id) => TaskRef::Id(id),
            Err(_) => TaskRef::Title(s.to_string()),
        }
    }
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskRef::Id(id) => write!(f, "{}", id),
            TaskRef::Title(title) => write!(f, "{}", title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Done] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn priority_round_trips_through_str() {
        for priority in [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High] {
            assert_eq!(TaskPriority::from_str(priority.as_str()), Some(priority));
        }
        assert_eq!(TaskPriority::from_str("urgent"), None);
    }

    #[test]
    fn create_defaults_to_pending_medium() {
        let input: TaskCreate = serde_json::from_str(r#"{"title": "Buy milk"}"#).unwrap();
        assert_eq!(input.status, TaskStatus::Pending);
        assert_eq!(input.priority, TaskPriority::Medium);
    }

    #[test]
    fn create_rejects_unknown_status() {
        let result: Result<TaskCreate, _> =
            serde_json::from_str(r#"{"title": "x", "status": "archived"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn create_rejects_unknown_priority() {
        let result: Result<TaskCreate, _> =
            serde_json::from_str(r#"{"title": "x", "priority": "urgent"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_blank_title() {
        let input = TaskCreate {
            title: "   ".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            due_date: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_title() {
        let input = TaskCreate {
            title: "x".repeat(MAX_TITLE_LEN + 1),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            due_date: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn page_clamps_limit() {
        let page = Page::new(Some(-5), Some(100_000));
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, Page::MAX_LIMIT);

        let page = Page::new(None, Some(0));
        assert_eq!(page.limit, 1);
    }

    #[test]
    fn parse_due_date_binds_day_ends() {
        let start = parse_due_date("2025-06-01", DayBound::Start).unwrap();
        let end = parse_due_date("2025-06-01", DayBound::End).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-06-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-06-01T23:59:59+00:00");
    }

    #[test]
    fn parse_due_date_accepts_rfc3339() {
        let dt = parse_due_date("2025-06-01T10:30:00Z", DayBound::Start).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-06-01T10:30:00+00:00");
    }

    #[test]
    fn parse_due_date_rejects_garbage() {
        assert!(parse_due_date("next tuesday", DayBound::Start).is_err());
    }

    #[test]
    fn task_ref_distinguishes_ids_from_titles() {
        assert_eq!(TaskRef::parse("42"), TaskRef::Id(42));
        assert_eq!(
            TaskRef::parse("Buy milk"),
            TaskRef::Title("Buy milk".to_string())
        );
    }
}
