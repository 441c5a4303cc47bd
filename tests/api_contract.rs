//! REST contract tests
//!
//! Verify request shapes against a mock backend and the mapping of every
//! failure onto the `ApiError` taxonomy.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use task_master_client::api::ApiClient;
use task_master_client::config::ApiConfig;
use task_master_client::credentials::{CredentialStore, MemoryCredentialStore};
use task_master_client::error::{ApiError, GENERIC_FAILURE};
use task_master_client::tasks::TaskQuery;
use task_master_client::types::{NewTask, Priority, TaskStatus};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> (ApiClient, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::default());
    let config = ApiConfig {
        base_url: Url::parse(&format!("{}/api", server.uri())).unwrap(),
        timeout: Duration::from_secs(5),
    };
    let api = ApiClient::new(&config, store.clone()).unwrap();
    (api, store)
}

// ────────────────────────────────────────────────────────────────────────────
// Request shape
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_access_token_and_sends_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({"email": "amy@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "tok-1"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"_id": "n1", "type": "assigned", "message": "New task", "isRead": false,
             "createdAt": "2025-02-01T10:00:00Z"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (api, store) = client_for(&server);
    api.login("amy@example.com", "pw").await.unwrap();
    assert_eq!(store.load().as_deref(), Some("tok-1"));

    let notes = api.notifications().await.unwrap();
    assert_eq!(notes.len(), 1);
    assert!(!notes[0].is_read);
}

#[tokio::test]
async fn test_list_tasks_sends_only_set_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .and(query_param("status", "In Progress"))
        .and(query_param("dueDate", "2025-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"_id": "t1", "title": "Ship report", "status": "In Progress",
             "assignedTo": "u1", "createdBy": {"_id": "u2", "fullName": "Amy", "role": "manager"}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client_for(&server);
    let query = TaskQuery {
        search: Some("   ".into()),
        status: Some("In Progress".into()),
        priority: None,
        due_date: Some("2025-03-01".into()),
    };
    let tasks = api.list_tasks(&query).await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].created_by.as_ref().unwrap().display_name(), "Amy");

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.query().unwrap_or_default().contains("search"));
}

#[tokio::test]
async fn test_create_task_posts_camel_case_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(body_partial_json(json!({
            "title": "Ship report",
            "priority": "High",
            "status": "Pending",
            "assignedTo": "u1",
            "dueDate": "2025-03-01"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "created"})))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client_for(&server);
    let task = NewTask {
        title: "Ship report".into(),
        description: String::new(),
        due_date: Some("2025-03-01".into()),
        priority: Priority::High,
        status: TaskStatus::Pending,
        assigned_to: "u1".into(),
    };
    api.create_task(&task).await.unwrap();
}

#[tokio::test]
async fn test_mark_notification_read_uses_put() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/notifications/n1/read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client_for(&server);
    api.mark_notification_read("n1").await.unwrap();
}

// ────────────────────────────────────────────────────────────────────────────
// Failure mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bad_credentials_are_auth_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})))
        .mount(&server)
        .await;

    let (api, store) = client_for(&server);
    let err = api.login("amy@example.com", "wrong").await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Auth {
            message: "Invalid credentials".into()
        }
    );
    assert!(!err.requires_login());
    assert!(store.load().is_none());
}

#[tokio::test]
async fn test_unauthorized_clears_token_and_expires_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (api, store) = client_for(&server);
    store.save("stale").unwrap();

    let err = api.list_tasks(&TaskQuery::default()).await.unwrap_err();
    assert_eq!(err, ApiError::SessionExpired);
    assert!(err.requires_login());
    assert!(store.load().is_none());
}

#[tokio::test]
async fn test_status_codes_map_to_taxonomy() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tasks/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Task not found"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/tasks/t1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Title is required"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/t1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (api, _) = client_for(&server);

    assert_eq!(
        api.get_task("missing").await.unwrap_err(),
        ApiError::NotFound {
            message: "Task not found".into()
        }
    );
    assert_eq!(
        api.update_task("t1", &Default::default()).await.unwrap_err(),
        ApiError::Validation {
            message: "Title is required".into()
        }
    );
    assert_eq!(
        api.delete_task("t1").await.unwrap_err(),
        ApiError::Server {
            status: Some(500),
            message: GENERIC_FAILURE.into()
        }
    );
}

#[tokio::test]
async fn test_unexpected_shape_is_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": "nope"})))
        .mount(&server)
        .await;

    let (api, _) = client_for(&server);
    let err = api.list_users().await.unwrap_err();
    assert_eq!(err.message(), GENERIC_FAILURE);
}

#[tokio::test]
async fn test_no_response_is_network_error() {
    // A port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ApiConfig {
        base_url: Url::parse(&format!("http://{addr}/api")).unwrap(),
        timeout: Duration::from_secs(5),
    };
    let api = ApiClient::new(&config, Arc::new(MemoryCredentialStore::default())).unwrap();

    let err = api.notifications().await.unwrap_err();
    assert_eq!(err, ApiError::Network);
    assert_eq!(err.message(), "No response from server.");
}
