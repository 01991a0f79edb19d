//! Task CRUD, filtering, and title resolution.

use super::{Database, datetime_to_ms, ms_to_datetime, now_ms};
use crate::types::{Page, Task, TaskCreate, TaskFilter, TaskPriority, TaskRef, TaskStatus, TaskUpdate};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, ToSql, params};

/// Result of resolving a title to a task.
#[derive(Debug, Clone)]
pub enum TitleMatch {
    /// No task matched.
    None,
    /// Exactly one task matched.
    Unique(Task),
    /// More than one task matched; ids of the candidates.
    Ambiguous(Vec<i64>),
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let id: i64 = row.get("id")?;
    let title: String = row.get("title")?;
    let description: Option<String> = row.get("description")?;
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let due_date: Option<i64> = row.get("due_date")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(Task {
        id,
        title,
        description,
        // The CHECK constraints keep stored values inside the enum sets.
        status: TaskStatus::from_str(&status).unwrap_or_default(),
        priority: TaskPriority::from_str(&priority).unwrap_or_default(),
        due_date: due_date.map(ms_to_datetime),
        created_at: ms_to_datetime(created_at),
        updated_at: ms_to_datetime(updated_at),
    })
}

/// Internal helper to get a task using an existing connection.
fn get_task_internal(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;

    match stmt.query_row(params![task_id], parse_task_row) {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Build the WHERE fragment and parameter list for a filter.
fn filter_clauses(filter: &TaskFilter) -> (Vec<&'static str>, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority = ?");
        values.push(Box::new(priority.as_str().to_string()));
    }
    if let Some(due_before) = filter.due_before {
        clauses.push("due_date IS NOT NULL AND due_date <= ?");
        values.push(Box::new(datetime_to_ms(due_before)));
    }
    if let Some(due_after) = filter.due_after {
        clauses.push("due_date IS NOT NULL AND due_date >= ?");
        values.push(Box::new(datetime_to_ms(due_after)));
    }

    (clauses, values)
}

/// Render positional placeholders (`?` -> `?1`, `?2`, ...) for a clause list.
fn where_sql(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        return String::new();
    }
    let mut n = 0;
    let rendered: Vec<String> = clauses
        .iter()
        .map(|c| {
            c.chars()
                .map(|ch| {
                    if ch == '?' {
                        n += 1;
                        format!("?{}", n)
                    } else {
                        ch.to_string()
                    }
                })
                .collect()
        })
        .collect();
    format!(" WHERE ({})", rendered.join(") AND ("))
}

impl Database {
    /// Create a new task. Defaults have already been applied by serde.
    pub fn create_task(&self, input: &TaskCreate) -> Result<Task> {
        let now = now_ms();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, description, status, priority, due_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    input.title.trim(),
                    input.description,
                    input.status.as_str(),
                    input.priority.as_str(),
                    input.due_date.map(datetime_to_ms),
                    now,
                    now,
                ],
            )?;

            let id = conn.last_insert_rowid();
            get_task_internal(conn, id)?
                .ok_or_else(|| anyhow!("task {} vanished after insert", id))
        })
    }

    /// Get a task by id.
    pub fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// List tasks, newest first.
    pub fn list_tasks(&self, page: &Page) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            )?;
            let tasks = stmt
                .query_map(params![page.limit, page.offset], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// Filter tasks by status, priority, and due-date range, newest first.
    pub fn filter_tasks(&self, filter: &TaskFilter, page: &Page) -> Result<Vec<Task>> {
        let (clauses, mut values) = filter_clauses(filter);
        let mut sql = format!(
            "SELECT * FROM tasks{} ORDER BY created_at DESC, id DESC",
            where_sql(&clauses)
        );
        sql.push_str(&format!(
            " LIMIT ?{} OFFSET ?{}",
            values.len() + 1,
            values.len() + 2
        ));
        values.push(Box::new(page.limit));
        values.push(Box::new(page.offset));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let tasks = stmt
                .query_map(&param_refs[..], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// Count tasks matching a filter.
    pub fn count_tasks(&self, filter: &TaskFilter) -> Result<i64> {
        let (clauses, values) = filter_clauses(filter);
        let sql = format!("SELECT COUNT(*) FROM tasks{}", where_sql(&clauses));

        self.with_conn(|conn| {
            let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let count: i64 = conn.query_row(&sql, &param_refs[..], |row| row.get(0))?;
            Ok(count)
        })
    }

    /// Apply a partial update. Returns the updated task, or `None` if the id
    /// does not exist. `id` and `created_at` are never touched; `updated_at`
    /// always advances (the schema trigger backstops external writers).
    pub fn update_task(&self, task_id: i64, update: &TaskUpdate) -> Result<Option<Task>> {
        self.with_conn(|conn| {
            if get_task_internal(conn, task_id)?.is_none() {
                return Ok(None);
            }

            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(title) = &update.title {
                values.push(Box::new(title.trim().to_string()));
                sets.push(format!("title = ?{}", values.len()));
            }
            if let Some(description) = &update.description {
                // Empty input clears the description.
                let stored = Some(description.trim().to_string()).filter(|d| !d.is_empty());
                values.push(Box::new(stored));
                sets.push(format!("description = ?{}", values.len()));
            }
            if let Some(status) = update.status {
                values.push(Box::new(status.as_str().to_string()));
                sets.push(format!("status = ?{}", values.len()));
            }
            if let Some(priority) = update.priority {
                values.push(Box::new(priority.as_str().to_string()));
                sets.push(format!("priority = ?{}", values.len()));
            }
            if let Some(due_date) = update.due_date {
                values.push(Box::new(datetime_to_ms(due_date)));
                sets.push(format!("due_date = ?{}", values.len()));
            }

            values.push(Box::new(now_ms()));
            sets.push(format!("updated_at = ?{}", values.len()));

            values.push(Box::new(task_id));
            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len()
            );

            let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            conn.execute(&sql, &param_refs[..])?;

            get_task_internal(conn, task_id)
        })
    }

    /// Hard-delete a task. Returns whether a row was removed.
    pub fn delete_task(&self, task_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            Ok(affected > 0)
        })
    }

    /// Resolve a title to a task: exact case-insensitive match first, then a
    /// case-insensitive substring match. Either stage reports ambiguity when
    /// more than one task qualifies.
    pub fn find_task_by_title(&self, title: &str) -> Result<TitleMatch> {
        let needle = title.trim();
        if needle.is_empty() {
            return Ok(TitleMatch::None);
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE lower(title) = lower(?1) ORDER BY id",
            )?;
            let mut exact: Vec<Task> = stmt
                .query_map(params![needle], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            if exact.len() > 1 {
                return Ok(TitleMatch::Ambiguous(exact.iter().map(|t| t.id).collect()));
            }
            if let Some(task) = exact.pop() {
                return Ok(TitleMatch::Unique(task));
            }

            // LIKE is case-insensitive for ASCII in SQLite; escape its wildcards.
            let pattern = format!(
                "%{}%",
                needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
            );
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE title LIKE ?1 ESCAPE '\\' ORDER BY id",
            )?;
            let mut partial: Vec<Task> = stmt
                .query_map(params![pattern], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            if partial.len() > 1 {
                return Ok(TitleMatch::Ambiguous(partial.iter().map(|t| t.id).collect()));
            }
            Ok(match partial.pop() {
                Some(task) => TitleMatch::Unique(task),
                None => TitleMatch::None,
            })
        })
    }

    /// Resolve an id-or-title reference.
    pub fn resolve_task(&self, task_ref: &TaskRef) -> Result<TitleMatch> {
        match task_ref {
            TaskRef::Id(id) => Ok(match self.get_task(*id)? {
                Some(task) => TitleMatch::Unique(task),
                None => TitleMatch::None,
            }),
            TaskRef::Title(title) => self.find_task_by_title(title),
        }
    }
}
