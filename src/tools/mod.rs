//! Task operations exposed as schema-declared tools for the agent layer.
//!
//! Each tool mirrors one data-access operation. Declarations (name,
//! description, JSON schema) are sent verbatim to the hosted model; calls
//! come back as structured arguments and are dispatched here.

pub mod tasks;

use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// A tool declaration in the shape the model API expects.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool handler that executes tool calls against the database.
pub struct ToolHandler {
    pub db: Arc<Database>,
}

impl ToolHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get all available tool declarations.
    pub fn get_tools(&self) -> Vec<ToolSpec> {
        tasks::get_tools()
    }

    /// Call a tool by name.
    ///
    /// Errors are returned as `Err`; the agent layer serializes them into
    /// the tool result so the model can correct itself.
    pub fn call_tool(&self, name: &str, arguments: &Value) -> ApiResult<Value> {
        match name {
            "create_task" => tasks::create_task(&self.db, arguments),
            "update_task" => tasks::update_task(&self.db, arguments),
            "delete_task" => tasks::delete_task(&self.db, arguments),
            "list_tasks" => tasks::list_tasks(&self.db, arguments),
            "filter_tasks" => tasks::filter_tasks(&self.db, arguments),
            _ => Err(ApiError::unknown_tool(name)),
        }
    }
}

/// Helper to create a tool declaration.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str().map(String::from))
}

/// Helper to get an i64 from arguments.
pub fn get_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}

/// Helper to get a non-empty, trimmed string from arguments.
pub fn get_trimmed(args: &Value, key: &str) -> Option<String> {
    get_string(args, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
