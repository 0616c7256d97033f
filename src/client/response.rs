//! Normalization of REST responses into a uniform envelope
//!
//! Backends answer in several shapes: bare arrays, `{ data }`,
//! `{ data: { data } }`, or error payloads carrying a numeric `status`.
//! [`normalize`] folds all of them into an [`ApiResponse`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::ApiError;
use crate::core::value::{js_string, truthy};

/// An error entry of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Error category such as `AUTH_ERROR`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>, kind: &str) -> Self {
        Self {
            message: message.into(),
            code: None,
            field: None,
            kind: Some(kind.to_string()),
        }
    }

    fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| Self {
            message: match value.get("message") {
                Some(message) => js_string(message),
                None => js_string(value),
            },
            code: None,
            field: None,
            kind: None,
        })
    }
}

/// An informational entry of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub message: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Uniform response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T = Value> {
    pub data: T,
    /// True for a 200/201 answer without errors
    pub status_code: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub info: Vec<ApiInfo>,
    /// HTTP status the envelope was built from, 0 when none was received
    #[serde(skip)]
    pub http_status: u16,
}

impl ApiResponse<Value> {
    /// Successful envelope around `data`
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            status_code: true,
            errors: Vec::new(),
            info: Vec::new(),
            http_status: 200,
        }
    }

    /// Failed envelope with a single error of category `kind`
    pub fn failure(kind: &str, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            data: Value::Object(Map::new()),
            status_code: false,
            errors: vec![ApiMessage::new(message, kind)],
            info: Vec::new(),
            http_status,
        }
    }

    pub fn from_error(error: &ApiError) -> Self {
        let status = match error {
            ApiError::Http { status, .. } => *status,
            _ => 0,
        };
        Self::failure(error.error_code(), error.to_string(), status)
    }
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status_code
    }

    /// The data of a successful response, or the first error
    pub fn into_result(self) -> Result<T, ApiError> {
        if self.status_code {
            return Ok(self.data);
        }
        let status = self.http_status;
        let Some(error) = self.errors.into_iter().next() else {
            return Err(ApiError::Http {
                status,
                message: http_error_message(Some(status)),
            });
        };
        Err(match error.kind.as_deref() {
            Some("HTTP_ERROR") => ApiError::Http {
                status,
                message: error.message,
            },
            Some(kind) => ApiError::from_code(kind, error.message),
            None => ApiError::Api {
                message: error.message,
            },
        })
    }
}

/// Message of a failed HTTP exchange
pub fn http_error_message(status: Option<u16>) -> String {
    match status {
        None | Some(0) => "HTTP Unknown error".to_string(),
        Some(500) => "Server error".to_string(),
        Some(status) => format!("HTTP {status} error"),
    }
}

/// Convert object keys from snake_case to camelCase, recursively
///
/// Every `_` followed by a character is replaced by that character in
/// upper case, so `created_at` becomes `createdAt` and `_id` becomes `Id`.
pub fn to_camel_case(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(to_camel_case).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (camel_key(&key), to_camel_case(value)))
                .collect(),
        ),
        other => other,
    }
}

fn camel_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(next) if c == '_' && (next.is_alphanumeric() || *next == '_') => {
                let next = chars.next().unwrap_or_default();
                out.extend(next.to_uppercase());
            }
            _ => out.push(c),
        }
    }
    out
}

fn extract_errors(payload: &Value) -> Vec<ApiMessage> {
    let errors = payload
        .get("errors")
        .and_then(Value::as_array)
        .or_else(|| payload.get("data").and_then(|d| d.get("errors")).and_then(Value::as_array));
    errors
        .map(|errors| errors.iter().map(ApiMessage::from_value).collect())
        .unwrap_or_default()
}

fn extract_info(payload: &Value) -> Vec<ApiInfo> {
    payload
        .get("info")
        .and_then(Value::as_array)
        .map(|info| {
            info.iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn extract_data(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(mut inner)) => match inner.remove("data") {
                Some(nested) => nested,
                None => Value::Object(inner),
            },
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    }
}

fn api_error_status(payload: &Value) -> bool {
    payload
        .get("status")
        .and_then(Value::as_f64)
        .is_some_and(|status| status >= 400.0)
}

/// Build the envelope of an HTTP answer
///
/// `status` is the HTTP status code and `body` the raw response text.
/// A 401 yields `AUTH_ERROR`; credential handling is up to the caller.
pub fn normalize(status: u16, body: &str, camel_case_keys: bool) -> ApiResponse<Value> {
    if !(200..300).contains(&status) {
        return if status == 401 {
            ApiResponse::failure("AUTH_ERROR", "Authentication failed", status)
        } else {
            ApiResponse::failure("HTTP_ERROR", http_error_message(Some(status)), status)
        };
    }

    let payload = match serde_json::from_str::<Value>(body) {
        Ok(payload) if truthy(&payload) => payload,
        _ => return ApiResponse::failure("PARSE_ERROR", "Failed to parse response", status),
    };

    if api_error_status(&payload) {
        let message = ["errorMessage", "message"]
            .iter()
            .filter_map(|key| payload.get(*key))
            .find(|value| truthy(value))
            .map(js_string)
            .unwrap_or_else(|| "API Error".to_string());
        return ApiResponse::failure("API_ERROR", message, status);
    }

    let convert = |value: Value| {
        if camel_case_keys {
            to_camel_case(value)
        } else {
            value
        }
    };

    if payload.is_array() {
        return ApiResponse {
            http_status: status,
            ..ApiResponse::ok(convert(payload))
        };
    }

    let errors = extract_errors(&payload);
    let info = extract_info(&payload);
    let data = convert(extract_data(payload));
    ApiResponse {
        data,
        status_code: matches!(status, 200 | 201) && errors.is_empty(),
        errors,
        info,
        http_status: status,
    }
}
