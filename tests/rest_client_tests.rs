//! Integration tests for the REST client against a local axum backend
//!
//! These tests verify that:
//! - Credentials are attached according to each request's token requirement
//! - A rejected token is refreshed once and the request retried
//! - A failed refresh clears the stored credentials
//! - Transport, HTTP and payload failures map to their error codes
//! - A resource table can be driven end to end over REST

#![cfg(feature = "http")]

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::{delete, get, post, put},
};
use chrono::{Duration, Utc};
use std::sync::Mutex;
use tabula::client::RestTokenRefresher;
use tabula::prelude::*;
use tokio::net::TcpListener;
use url::Url;

// =============================================================================
// Test Backend
// =============================================================================

#[derive(Debug, Clone)]
struct Recorded {
    method: &'static str,
    path: String,
    authorization: Option<String>,
    cache_control: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Backend {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Backend {
    fn record(&self, method: &'static str, path: impl Into<String>, headers: &HeaderMap, body: Value) {
        let value_of = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.into(),
            authorization: value_of(header::AUTHORIZATION),
            cache_control: value_of(header::CACHE_CONTROL),
            body,
        });
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn rejected(headers: &HeaderMap) -> bool {
    matches!(bearer(headers), Some("stale" | "revoked"))
}

async fn list_words(State(backend): State<Backend>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    backend.record("GET", "Api/Client/GetAllWords", &headers, Value::Null);
    if rejected(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "statusCode": 200,
            "data": [
                {"_id": "w1", "national": "Bonjour", "foreign": "Hello", "created_at": "2024-01-15T10:00:00Z"},
                {"_id": "w2", "national": "Chat", "foreign": "Cat", "created_at": "2024-03-10T10:00:00Z"}
            ]
        })),
    )
}

async fn add_word(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.record("POST", "Api/Client/AddWord", &headers, body.clone());
    if body["national"] == "Doublon" {
        return (
            StatusCode::OK,
            Json(json!({"status": 409, "errorMessage": "Word already exists"})),
        );
    }
    let mut created = body;
    created["_id"] = json!("w3");
    (StatusCode::CREATED, Json(json!({ "data": created })))
}

async fn edit_word(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.record("PUT", format!("Api/Client/EditWord/{id}"), &headers, body.clone());
    let mut updated = body;
    updated["_id"] = json!(id);
    (StatusCode::OK, Json(json!({ "data": updated })))
}

async fn delete_word(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    backend.record("DELETE", format!("Api/Client/DeleteWord/{id}"), &headers, Value::Null);
    match bearer(&headers) {
        Some("fresh" | "valid") => StatusCode::NO_CONTENT,
        _ => StatusCode::UNAUTHORIZED,
    }
}

async fn refresh_token(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.record("POST", "auth/refresh", &headers, body.clone());
    if body["token"] != "stale" {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "token": "fresh",
            "expires_at": (Utc::now() + Duration::hours(1)).to_rfc3339(),
        })),
    )
}

async fn login(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    backend.record("POST", "auth/login", &headers, body.clone());
    if body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({"_id": "u1", "username": "ann", "token": "issued"})),
    )
}

async fn broken() -> &'static str {
    "<html>maintenance</html>"
}

async fn spawn_backend() -> (String, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/Api/Client/GetAllWords", get(list_words))
        .route("/Api/Client/AddWord", post(add_word))
        .route("/Api/Client/EditWord/{id}", put(edit_word))
        .route("/Api/Client/DeleteWord/{id}", delete(delete_word))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/login", post(login))
        .route("/broken", get(broken))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), backend)
}

fn credentials(base: &str) -> Credentials {
    let refresher = RestTokenRefresher::new(Url::parse(&format!("{base}/auth/refresh")).unwrap());
    Credentials::default().with_refresher(Arc::new(refresher))
}

fn hours(n: i64) -> chrono::DateTime<Utc> {
    Utc::now() + Duration::hours(n)
}

fn captions_config(base: &str) -> ResourceConfig {
    let mut config = ResourcesConfig::default_config()
        .require_resource("captions")
        .unwrap()
        .clone();
    if let Some(api) = config.api.as_mut() {
        api.base_url = base.to_string();
    }
    config
}

// =============================================================================
// Credential Handling
// =============================================================================

mod credential_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_sends_guest_token_and_no_store() {
        let (base, backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_guest_token(Token::new("guest", hours(1)));
        let client = RestClient::new(base, credentials);

        let response = client.get("Api/Client/GetAllWords").await;
        assert!(response.is_success());
        assert_eq!(response.data.as_array().unwrap().len(), 2);

        let requests = backend.requests();
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer guest"));
        assert_eq!(requests[0].cache_control.as_deref(), Some("no-store"));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries_once() {
        let (base, backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_auth_token(Token::new("stale", hours(1)));
        let client = RestClient::new(base, credentials.clone());

        let response = client.get("Api/Client/GetAllWords").await;
        assert!(response.is_success());
        assert_eq!(credentials.auth_token().unwrap().token, "fresh");

        let requests: Vec<_> = backend
            .requests()
            .into_iter()
            .map(|r| (r.method, r.path, r.authorization))
            .collect();
        assert_eq!(
            requests,
            vec![
                ("GET", "Api/Client/GetAllWords".to_string(), Some("Bearer stale".to_string())),
                ("POST", "auth/refresh".to_string(), Some("Bearer stale".to_string())),
                ("GET", "Api/Client/GetAllWords".to_string(), Some("Bearer fresh".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_logs_out() {
        let (base, backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_auth_token(Token::new("revoked", hours(1)));
        credentials.set_guest_token(Token::new("guest", hours(1)));
        let client = RestClient::new(base, credentials.clone());

        let err = client
            .get("Api/Client/GetAllWords")
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTH_ERROR");
        assert!(credentials.auth_token().is_none());
        assert!(credentials.guest_token().is_none());

        // no second attempt after the refresh was refused
        let gets = backend.requests().iter().filter(|r| r.method == "GET").count();
        assert_eq!(gets, 1);
    }

    #[tokio::test]
    async fn test_required_auth_without_token_never_sends() {
        let (base, backend) = spawn_backend().await;
        let api = RestResourceApi::from_config(&captions_config(&base), credentials(&base)).unwrap();

        let err = api.delete("w1").await.unwrap_err();
        assert_eq!(err.error_code(), "AUTH_ERROR");
        assert_eq!(err.to_string(), "No authentication token available");
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_on_get_is_rejected_locally() {
        let (base, backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_auth_token(Token::new("stale", hours(-1)));
        let client = RestClient::new(base, credentials);

        let err = client
            .get("Api/Client/GetAllWords")
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authentication token has expired. Please login again."
        );
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_before_delete() {
        let (base, backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_auth_token(Token::new("stale", hours(-1)));
        let api = RestResourceApi::from_config(&captions_config(&base), credentials).unwrap();

        api.delete("w1").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "auth/refresh");
        assert_eq!(requests[1].path, "Api/Client/DeleteWord/w1");
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer fresh"));
        assert!(requests[1].cache_control.is_none());
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let (base, _backend) = spawn_backend().await;
        let credentials = credentials(&base);
        let client = RestClient::new(base, credentials.clone());

        let err = client
            .login("auth/login", &json!({"username": "ann", "password": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed - please login again");
        assert!(!credentials.is_authenticated());

        let token = client
            .login("auth/login", &json!({"username": "ann", "password": "secret"}))
            .await
            .unwrap();
        assert_eq!(token.token, "issued");
        assert!(token.expires_at > hours(23));
        assert!(credentials.is_authenticated());
        assert!(!credentials.is_expiring_soon());
    }
}

// =============================================================================
// Failure Mapping
// =============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_port_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RestClient::new(format!("http://{addr}"), Credentials::default());
        let response = client.get("anything").await;
        assert!(!response.status_code);
        let err = response.into_result().unwrap_err();
        assert_eq!(err.error_code(), "NETWORK_ERROR");
        assert_eq!(
            err.to_string(),
            "Network error: Please check your internet connection"
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_a_parse_error() {
        let (base, _backend) = spawn_backend().await;
        let client = RestClient::new(base, Credentials::default());
        let err = client.get("broken").await.into_result().unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_route_is_an_http_error() {
        let (base, _backend) = spawn_backend().await;
        let client = RestClient::new(base, Credentials::default());
        let response = client.get("Api/Client/Missing").await;
        assert_eq!(response.http_status, 404);
        let err = response.into_result().unwrap_err();
        assert_eq!(
            err,
            ApiError::Http {
                status: 404,
                message: "HTTP 404 error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_payload_is_an_api_error() {
        let (base, _backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_auth_token(Token::new("valid", hours(1)));
        let api = RestResourceApi::from_config(&captions_config(&base), credentials).unwrap();

        let err = api
            .create(json!({"national": "Doublon", "foreign": "Duplicate"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "API_ERROR");
        assert_eq!(err.to_string(), "Word already exists");
    }
}

// =============================================================================
// Resource Table over REST
// =============================================================================

mod table_tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_through_table() {
        let (base, backend) = spawn_backend().await;
        let credentials = credentials(&base);
        credentials.set_auth_token(Token::new("valid", hours(1)));
        let api = RestResourceApi::from_config(&captions_config(&base), credentials).unwrap();
        let mut table = ResourceTable::new(captions_config(&base), Arc::new(api), None).unwrap();

        assert_eq!(table.fetch().await.unwrap(), 2);
        assert_eq!(table.items()[0]["id"], "w1");

        table
            .update_item("w1", json!({"national": "Salut", "foreign": "Hi"}))
            .await
            .unwrap();
        table.delete_item("w2").await.unwrap();

        let writes: Vec<_> = backend
            .requests()
            .into_iter()
            .filter(|r| r.method != "GET")
            .map(|r| (r.method, r.path, r.body))
            .collect();
        assert_eq!(
            writes,
            vec![
                (
                    "PUT",
                    "Api/Client/EditWord/w1".to_string(),
                    json!({"national": "Salut", "foreign": "Hi"})
                ),
                ("DELETE", "Api/Client/DeleteWord/w2".to_string(), Value::Null),
            ]
        );

        let messages: Vec<_> = table
            .take_notifications()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(
            messages,
            vec!["Item updated successfully", "Item deleted successfully"]
        );
    }

    #[tokio::test]
    async fn test_unsupported_endpoint() {
        let mut config = captions_config("http://127.0.0.1:9");
        if let Some(api) = config.api.as_mut() {
            api.update = None;
        }
        let api = RestResourceApi::from_config(&config, Credentials::default()).unwrap();
        let err = api.update("w1", json!({})).await.unwrap_err();
        assert_eq!(err.error_code(), "OPERATION_NOT_SUPPORTED");
    }
}
