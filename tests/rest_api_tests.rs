//! Integration tests for the REST and chat endpoints.
//!
//! The router is exercised in-process with `tower::ServiceExt::oneshot`; no
//! sockets are opened. The chat endpoint uses a scripted model client so the
//! full agent-to-database path runs without network access.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use taskpilot::agent::TaskAgent;
use taskpilot::agent::anthropic::{
    ContentBlock, ModelClient, ModelRequest, ModelResponse, StopReason,
};
use taskpilot::config::Config;
use taskpilot::db::Database;
use taskpilot::error::ApiResult;
use taskpilot::server::{AppState, build_router};
use taskpilot::tools::ToolHandler;
use tower::ServiceExt;

/// Model client that replays canned responses in order.
struct ScriptedClient {
    responses: Mutex<Vec<ModelResponse>>,
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, _request: ModelRequest) -> ApiResult<ModelResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| taskpilot::error::ApiError::model("script exhausted"))
    }
}

fn setup_app_with_script(mut responses: Vec<ModelResponse>) -> (Router, Arc<Database>) {
    responses.reverse();
    let db = Arc::new(Database::open_in_memory().expect("Failed to create in-memory database"));
    let tools = Arc::new(ToolHandler::new(Arc::clone(&db)));
    let client = Arc::new(ScriptedClient {
        responses: Mutex::new(responses),
    });
    let agent = Arc::new(TaskAgent::new(client, tools));
    let state = AppState::new(Arc::clone(&db), agent);
    (build_router(state, &Config::default()), db)
}

fn setup_app() -> (Router, Arc<Database>) {
    setup_app_with_script(Vec::new())
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_status_and_version() {
        let (app, _db) = setup_app();

        let (status, body) = send(&app, request("GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["chat_connections"], 0);
        assert_eq!(body["task_connections"], 0);
        assert!(body["version"].is_string());
    }
}

mod task_crud_tests {
    use super::*;

    #[tokio::test]
    async fn create_returns_201_with_task() {
        let (app, _db) = setup_app();

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/tasks",
                Some(json!({ "title": "Buy milk", "priority": "high" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["title"], "Buy milk");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["status"], "pending");
        assert!(body["id"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let (app, _db) = setup_app();

        let (status, body) = send(
            &app,
            request("POST", "/api/tasks", Some(json!({ "title": "   " }))),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(body["error"]["field"], "title");
    }

    #[tokio::test]
    async fn create_rejects_unknown_status_value() {
        let (app, _db) = setup_app();

        // Serde rejects out-of-set enum values before the handler runs.
        let (status, _body) = send(
            &app,
            request(
                "POST",
                "/api/tasks",
                Some(json!({ "title": "x", "status": "archived" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn get_returns_task_or_404() {
        let (app, db) = setup_app();
        let task = db
            .create_task(&serde_json::from_value(json!({ "title": "Find me" })).unwrap())
            .unwrap();

        let (status, body) = send(
            &app,
            request("GET", &format!("/api/tasks/{}", task.id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Find me");

        let (status, body) = send(&app, request("GET", "/api/tasks/9999", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "TASK_NOT_FOUND");
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let (app, db) = setup_app();
        let task = db
            .create_task(&serde_json::from_value(json!({ "title": "Original" })).unwrap())
            .unwrap();

        let (status, body) = send(
            &app,
            request(
                "PUT",
                &format!("/api/tasks/{}", task.id),
                Some(json!({ "status": "done" })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "done");
        assert_eq!(body["title"], "Original");
    }

    #[tokio::test]
    async fn update_missing_task_is_404() {
        let (app, _db) = setup_app();

        let (status, _body) = send(
            &app,
            request("PUT", "/api/tasks/42", Some(json!({ "status": "done" }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_then_get_is_404() {
        let (app, db) = setup_app();
        let task = db
            .create_task(&serde_json::from_value(json!({ "title": "Doomed" })).unwrap())
            .unwrap();

        let (status, body) = send(
            &app,
            request("DELETE", &format!("/api/tasks/{}", task.id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        let (status, _body) = send(
            &app,
            request("GET", &format!("/api/tasks/{}", task.id), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (app, db) = setup_app();
        for title in ["a", "b", "c"] {
            db.create_task(&serde_json::from_value(json!({ "title": title })).unwrap())
                .unwrap();
        }

        let (status, body) = send(&app, request("GET", "/api/tasks", None)).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["c", "b", "a"]);
    }
}

mod filter_tests {
    use super::*;

    async fn seed(db: &Database) {
        for (title, status, priority, due) in [
            ("pending low", "pending", "low", Some("2026-09-01T00:00:00Z")),
            ("done high", "done", "high", Some("2026-09-10T00:00:00Z")),
            ("pending high", "pending", "high", None),
        ] {
            let mut value = json!({ "title": title, "status": status, "priority": priority });
            if let Some(due) = due {
                value["due_date"] = json!(due);
            }
            db.create_task(&serde_json::from_value(value).unwrap())
                .unwrap();
        }
    }

    #[tokio::test]
    async fn filter_combines_criteria() {
        let (app, db) = setup_app();
        seed(&db).await;

        let (status, body) = send(
            &app,
            request("GET", "/api/tasks/filter?status=pending&priority=high", None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let tasks = body.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["title"], "pending high");
    }

    #[tokio::test]
    async fn filter_by_bare_due_date_is_inclusive() {
        let (app, db) = setup_app();
        seed(&db).await;

        let (status, body) = send(
            &app,
            request("GET", "/api/tasks/filter?due_before=2026-09-01", None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let tasks = body.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["title"], "pending low");
    }

    #[tokio::test]
    async fn filter_rejects_unknown_status() {
        let (app, _db) = setup_app();

        let (status, body) = send(
            &app,
            request("GET", "/api/tasks/filter?status=archived", None),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_FIELD_VALUE");
        assert_eq!(body["error"]["field"], "status");
    }

    #[tokio::test]
    async fn count_matches_filter() {
        let (app, db) = setup_app();
        seed(&db).await;

        let (status, body) = send(&app, request("GET", "/api/tasks/count", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);

        let (_, body) = send(
            &app,
            request("GET", "/api/tasks/count?status=pending", None),
        )
        .await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn create_filter_delete_filter_flow() {
        let (app, _db) = setup_app();

        let (_, created) = send(
            &app,
            request(
                "POST",
                "/api/tasks",
                Some(json!({ "title": "Lifecycle", "priority": "high" })),
            ),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let (_, found) = send(
            &app,
            request("GET", "/api/tasks/filter?priority=high", None),
        )
        .await;
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/api/tasks/{}", id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, after) = send(
            &app,
            request("GET", "/api/tasks/filter?priority=high", None),
        )
        .await;
        assert!(after.as_array().unwrap().is_empty());
    }
}

mod chat_tests {
    use super::*;

    fn text_response(text: &str) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: StopReason::EndTurn,
        }
    }

    fn tool_response(name: &str, input: Value) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
        }
    }

    #[tokio::test]
    async fn chat_returns_model_answer_and_snapshot() {
        let (app, _db) = setup_app_with_script(vec![
            tool_response("create_task", json!({ "title": "Buy milk" })),
            text_response("Added 'Buy milk' to your list."),
        ]);

        let (status, body) = send(
            &app,
            request("POST", "/api/chat", Some(json!({ "message": "add buy milk" }))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Added 'Buy milk' to your list.");
        assert_eq!(body["tools_used"], json!(["create_task"]));
        let updates = body["task_updates"].as_array().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["title"], "Buy milk");
    }

    #[tokio::test]
    async fn chat_broadcasts_only_when_tools_ran() {
        let mut responses = vec![
            text_response("Just chatting."),
            tool_response("create_task", json!({ "title": "Buy milk" })),
            text_response("Added it."),
        ];
        responses.reverse();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let tools = Arc::new(ToolHandler::new(Arc::clone(&db)));
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(responses),
        });
        let agent = Arc::new(TaskAgent::new(client, tools));
        let state = AppState::new(Arc::clone(&db), agent);
        let mut updates = state.updates.subscribe();
        let app = build_router(state, &Config::default());

        // Pure conversation: no tool ran, nothing pushed to the feed.
        let (status, _) = send(
            &app,
            request("POST", "/api/chat", Some(json!({ "message": "hello" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(matches!(
            updates.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));

        // Tool-driven turn pushes a fresh snapshot.
        let (status, _) = send(
            &app,
            request("POST", "/api/chat", Some(json!({ "message": "add buy milk" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let snapshot = updates.try_recv().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "Buy milk");
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let (app, _db) = setup_app();

        let (status, body) = send(
            &app,
            request("POST", "/api/chat", Some(json!({ "message": "   " }))),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_REQUIRED_FIELD");
    }

    #[tokio::test]
    async fn chat_rejects_oversized_message() {
        let (app, _db) = setup_app();

        let long = "x".repeat(2000);
        let (status, body) = send(
            &app,
            request("POST", "/api/chat", Some(json!({ "message": long }))),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_FIELD_VALUE");
    }

    #[tokio::test]
    async fn model_failure_is_a_generic_500() {
        // Empty script: the client errors on the first completion.
        let (app, _db) = setup_app();

        let (status, body) = send(
            &app,
            request("POST", "/api/chat", Some(json!({ "message": "hello" }))),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "internal server error");
    }
}
