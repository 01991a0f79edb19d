//! Task CRUD tools.

use super::{ToolSpec, get_i64, get_string, get_trimmed, make_tool};
use crate::db::Database;
use crate::db::tasks::TitleMatch;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    DayBound, Page, Task, TaskCreate, TaskFilter, TaskPriority, TaskRef, TaskStatus, TaskUpdate,
    parse_due_date,
};
use serde_json::{Value, json};

pub fn get_tools() -> Vec<ToolSpec> {
    vec![
        make_tool(
            "create_task",
            "Create a new task. Title is required; status defaults to pending and priority to medium.",
            json!({
                "title": {
                    "type": "string",
                    "description": "Task title"
                },
                "description": {
                    "type": "string",
                    "description": "Optional task description"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "description": "Task priority"
                },
                "due_date": {
                    "type": "string",
                    "description": "Due date, YYYY-MM-DD or an RFC 3339 timestamp"
                }
            }),
            vec!["title"],
        ),
        make_tool(
            "update_task",
            "Update an existing task by id or title. Only the supplied fields change.",
            json!({
                "task": {
                    "type": "string",
                    "description": "Task id (number) or title to look up"
                },
                "title": {
                    "type": "string",
                    "description": "New title"
                },
                "description": {
                    "type": "string",
                    "description": "New description"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "done"],
                    "description": "New status"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "description": "New priority"
                },
                "due_date": {
                    "type": "string",
                    "description": "New due date, YYYY-MM-DD or an RFC 3339 timestamp"
                }
            }),
            vec!["task"],
        ),
        make_tool(
            "delete_task",
            "Delete a task by id or title. Also accepts the bulk keywords \
             'all', 'completed', or 'pending' to delete every matching task.",
            json!({
                "task": {
                    "type": "string",
                    "description": "Task id, title, or a bulk keyword (all / completed / pending)"
                }
            }),
            vec!["task"],
        ),
        make_tool(
            "list_tasks",
            "List tasks, newest first.",
            json!({
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of tasks to return (default 20)"
                },
                "offset": {
                    "type": "integer",
                    "description": "Number of tasks to skip (default 0)"
                }
            }),
            vec![],
        ),
        make_tool(
            "filter_tasks",
            "Filter tasks by status, priority, and due-date range.",
            json!({
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "done"],
                    "description": "Filter by status"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "description": "Filter by priority"
                },
                "due_before": {
                    "type": "string",
                    "description": "Only tasks due on or before this date (YYYY-MM-DD)"
                },
                "due_after": {
                    "type": "string",
                    "description": "Only tasks due on or after this date (YYYY-MM-DD)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of tasks to return (default 20)"
                }
            }),
            vec![],
        ),
    ]
}

/// Parse a status argument, rejecting values outside the enum set.
fn parse_status_arg(args: &Value) -> ApiResult<Option<TaskStatus>> {
    match get_trimmed(args, "status") {
        None => Ok(None),
        Some(s) => TaskStatus::from_str(&s.to_lowercase()).map(Some).ok_or_else(|| {
            ApiError::invalid_value("status", "status must be pending, in_progress, or done")
        }),
    }
}

/// Parse a priority argument, rejecting values outside the enum set.
fn parse_priority_arg(args: &Value) -> ApiResult<Option<TaskPriority>> {
    match get_trimmed(args, "priority") {
        None => Ok(None),
        Some(s) => TaskPriority::from_str(&s.to_lowercase()).map(Some).ok_or_else(|| {
            ApiError::invalid_value("priority", "priority must be low, medium, or high")
        }),
    }
}

/// Resolve the `task` argument to a single task or a structured error.
fn resolve_required(db: &Database, args: &Value) -> ApiResult<Task> {
    let ident = get_trimmed(args, "task").ok_or_else(|| ApiError::missing_field("task"))?;
    let task_ref = TaskRef::parse(&ident);

    match db.resolve_task(&task_ref)? {
        TitleMatch::Unique(task) => Ok(task),
        TitleMatch::None => Err(ApiError::task_not_found(&task_ref)),
        TitleMatch::Ambiguous(ids) => Err(ApiError::ambiguous_title(&ident, &ids)),
    }
}

pub fn create_task(db: &Database, args: &Value) -> ApiResult<Value> {
    let title = get_trimmed(args, "title").ok_or_else(|| ApiError::missing_field("title"))?;
    let due_date = get_trimmed(args, "due_date")
        .map(|s| parse_due_date(&s, DayBound::Start))
        .transpose()?;

    let input = TaskCreate {
        title,
        description: get_trimmed(args, "description"),
        status: TaskStatus::Pending,
        priority: parse_priority_arg(args)?.unwrap_or_default(),
        due_date,
    };
    input.validate()?;

    let task = db.create_task(&input)?;
    let message = format!("Created task: {}", task.title);

    Ok(json!({
        "task": task,
        "message": message,
    }))
}

pub fn update_task(db: &Database, args: &Value) -> ApiResult<Value> {
    let task = resolve_required(db, args)?;

    let update = TaskUpdate {
        title: get_trimmed(args, "title"),
        description: get_string(args, "description"),
        status: parse_status_arg(args)?,
        priority: parse_priority_arg(args)?,
        due_date: get_trimmed(args, "due_date")
            .map(|s| parse_due_date(&s, DayBound::Start))
            .transpose()?,
    };
    if update.is_empty() {
        return Err(ApiError::invalid_value(
            "fields",
            "no fields provided to update",
        ));
    }
    update.validate()?;

    let updated = db
        .update_task(task.id, &update)?
        .ok_or_else(|| ApiError::task_not_found(task.id))?;
    let message = format!("Updated task '{}'", updated.title);

    Ok(json!({
        "task": updated,
        "message": message,
    }))
}

pub fn delete_task(db: &Database, args: &Value) -> ApiResult<Value> {
    let ident = get_trimmed(args, "task").ok_or_else(|| ApiError::missing_field("task"))?;

    // Bulk keywords delete every task in the named set.
    let bulk_filter = match ident.to_lowercase().as_str() {
        "all" | "all tasks" | "everything" => Some(TaskFilter::default()),
        "completed" | "done" | "finished" => Some(TaskFilter {
            status: Some(TaskStatus::Done),
            ..Default::default()
        }),
        "pending" | "todo" | "not started" => Some(TaskFilter {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        }),
        _ => None,
    };

    if let Some(filter) = bulk_filter {
        let page = Page::new(None, Some(Page::MAX_LIMIT));
        let tasks = db.filter_tasks(&filter, &page)?;
        let mut deleted = 0i64;
        for task in &tasks {
            if db.delete_task(task.id)? {
                deleted += 1;
            }
        }
        let message = match filter.status {
            Some(status) => format!("Deleted {} {} task(s)", deleted, status.as_str()),
            None => format!("Deleted all {} task(s)", deleted),
        };
        return Ok(json!({
            "deleted_count": deleted,
            "bulk": true,
            "message": message,
        }));
    }

    let task = resolve_required(db, args)?;
    if !db.delete_task(task.id)? {
        return Err(ApiError::task_not_found(task.id));
    }
    let message = format!("Deleted task '{}'", task.title);

    Ok(json!({
        "deleted_count": 1,
        "task": task,
        "message": message,
    }))
}

pub fn list_tasks(db: &Database, args: &Value) -> ApiResult<Value> {
    let page = Page::new(get_i64(args, "offset"), Some(get_i64(args, "limit").unwrap_or(20)));
    let tasks = db.list_tasks(&page)?;
    let count = tasks.len();
    let message = format!("Found {} task(s)", count);

    Ok(json!({
        "tasks": tasks,
        "count": count,
        "message": message,
    }))
}

pub fn filter_tasks(db: &Database, args: &Value) -> ApiResult<Value> {
    let filter = TaskFilter {
        status: parse_status_arg(args)?,
        priority: parse_priority_arg(args)?,
        due_before: get_trimmed(args, "due_before")
            .map(|s| parse_due_date(&s, DayBound::End))
            .transpose()?,
        due_after: get_trimmed(args, "due_after")
            .map(|s| parse_due_date(&s, DayBound::Start))
            .transpose()?,
    };

    let page = Page::new(None, Some(get_i64(args, "limit").unwrap_or(20)));
    let tasks = db.filter_tasks(&filter, &page)?;

    let mut applied: Vec<String> = Vec::new();
    if let Some(status) = filter.status {
        applied.push(format!("status={}", status.as_str()));
    }
    if let Some(priority) = filter.priority {
        applied.push(format!("priority={}", priority.as_str()));
    }
    if filter.due_before.is_some() {
        applied.push("due_before".to_string());
    }
    if filter.due_after.is_some() {
        applied.push("due_after".to_string());
    }
    let filters = if applied.is_empty() {
        "no filters".to_string()
    } else {
        applied.join(", ")
    };
    let count = tasks.len();
    let message = format!("Found {} task(s) with {}", count, filters);

    Ok(json!({
        "tasks": tasks,
        "count": count,
        "filters": filters,
        "message": message,
    }))
}
