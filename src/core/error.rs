//! Typed error handling for tabula
//!
//! Errors are grouped by category so that callers can react to specific
//! failures (re-authenticate on [`ApiError::Auth`], show inline messages on
//! [`ValidationError::FieldErrors`]) instead of matching on strings.
//!
//! # Error Categories
//!
//! - [`ApiError`]: failures at the HTTP boundary (`AUTH_ERROR`, `HTTP_ERROR`,
//!   `NETWORK_ERROR`, `PARSE_ERROR`, `API_ERROR`)
//! - [`ValidationError`]: client-side validation (`VALIDATION_ERROR`)
//! - [`ConfigError`]: resource configuration parsing and validation
//! - [`ResourceError`]: operations on a resource table
//!
//! The filter, sort and pagination engine itself never produces errors for
//! malformed data: out-of-range pages are clamped and unparseable values are
//! treated as non-matching.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula::prelude::*;
//!
//! match table.create_item(json!({ "national": "" })).await {
//!     Ok(item) => println!("created {item}"),
//!     Err(TabulaError::Validation(ValidationError::FieldErrors(errors))) => {
//!         for error in errors {
//!             println!("{}: {}", error.field, error.message);
//!         }
//!     }
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// The main error type for tabula
#[derive(Debug, Error)]
pub enum TabulaError {
    /// Errors raised at the HTTP boundary
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Client-side validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Resource table errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable error payload, suitable for notifications or logs
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TabulaError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            TabulaError::Api(e) => e.error_code(),
            TabulaError::Config(_) => "CONFIG_ERROR",
            TabulaError::Validation(_) => "VALIDATION_ERROR",
            TabulaError::Resource(e) => e.error_code(),
            TabulaError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error requires the user to authenticate again
    pub fn is_auth(&self) -> bool {
        matches!(self, TabulaError::Api(ApiError::Auth { .. }))
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            TabulaError::Api(ApiError::Http { status, .. }) => {
                Some(serde_json::json!({ "status": status }))
            }
            TabulaError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            TabulaError::Resource(ResourceError::OperationNotSupported {
                resource,
                operation,
            }) => Some(serde_json::json!({
                "resource": resource,
                "operation": operation
            })),
            _ => None,
        }
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Errors raised while talking to a REST backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Missing, expired or rejected credentials
    #[error("{message}")]
    Auth { message: String },

    /// Non-2xx HTTP response
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The request never produced a response
    #[error("{message}")]
    Network { message: String },

    /// The response body was not valid JSON
    #[error("{message}")]
    Parse { message: String },

    /// Application-level error payload
    #[error("{message}")]
    Api { message: String },
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Auth { .. } => "AUTH_ERROR",
            ApiError::Http { .. } => "HTTP_ERROR",
            ApiError::Network { .. } => "NETWORK_ERROR",
            ApiError::Parse { .. } => "PARSE_ERROR",
            ApiError::Api { .. } => "API_ERROR",
        }
    }

    /// Build an error from a wire error code and message
    ///
    /// Unknown codes are reported as `API_ERROR`.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "AUTH_ERROR" => ApiError::Auth { message },
            "HTTP_ERROR" => ApiError::Http { status: 0, message },
            "NETWORK_ERROR" => ApiError::Network { message },
            "PARSE_ERROR" => ApiError::Parse { message },
            _ => ApiError::Api { message },
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to client-side validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Form field validation errors, one entry per failing field
    #[error("Validation errors: {}", join_field_errors(.0))]
    FieldErrors(Vec<FieldValidationError>),

    /// A filter key that the resource does not declare
    #[error("Unknown filter '{key}' for resource '{resource}'")]
    UnknownFilter { resource: String, key: String },

    /// A filter value whose shape does not match the field type
    #[error("Filter '{key}' expects a {expected} value")]
    ValueMismatch { key: String, expected: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

fn join_field_errors(errors: &[FieldValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config{}: {message}", file.as_ref().map(|f| format!(" file '{f}'")).unwrap_or_default())]
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Two filter fields share a key
    #[error("Duplicate filter key '{key}' in resource '{resource}'")]
    DuplicateFilterKey { resource: String, key: String },

    /// Invalid value in configuration
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// IO error while reading configuration
    #[error("IO error: {message}")]
    IoError { message: String },
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors related to resource table operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// No resource with this id is configured
    #[error("Unknown resource: {resource}")]
    UnknownResource { resource: String },

    /// The item carries no usable identity
    #[error("Item ID is missing for resource '{resource}'")]
    MissingId { resource: String },

    /// The operation is disabled or not implemented for this resource
    #[error("{operation} operation not supported for resource '{resource}'")]
    OperationNotSupported { resource: String, operation: String },
}

impl ResourceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::UnknownResource { .. } => "UNKNOWN_RESOURCE",
            ResourceError::MissingId { .. } => "MISSING_ID",
            ResourceError::OperationNotSupported { .. } => "OPERATION_NOT_SUPPORTED",
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for TabulaError {
    fn from(err: serde_json::Error) -> Self {
        TabulaError::Api(ApiError::Parse {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for TabulaError {
    fn from(err: std::io::Error) -> Self {
        TabulaError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for TabulaError {
    fn from(err: serde_yaml::Error) -> Self {
        TabulaError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

impl From<anyhow::Error> for TabulaError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TabulaError>() {
            Ok(tabula_err) => tabula_err,
            Err(err) => TabulaError::Internal(err.to_string()),
        }
    }
}

/// A specialized Result type for tabula operations
pub type TabulaResult<T> = Result<T, TabulaError>;
