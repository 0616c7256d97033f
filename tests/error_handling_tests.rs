//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors report the correct error codes
//! - Error responses are properly formatted
//! - Error conversions work correctly
//! - Error matching allows callers to handle specific cases

use tabula::prelude::*;

// =============================================================================
// Error Code Tests
// =============================================================================

mod error_code_tests {
    use super::*;

    #[test]
    fn test_http_errors_keep_their_category() {
        let err: TabulaError = ApiError::Http {
            status: 503,
            message: "Service unavailable".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "HTTP_ERROR");
        assert!(!err.is_auth());
    }

    #[test]
    fn test_auth_errors_are_flagged() {
        let err: TabulaError = ApiError::Auth {
            message: "Authentication failed".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "AUTH_ERROR");
        assert!(err.is_auth());
    }

    #[test]
    fn test_every_validation_error_shares_a_code() {
        let errors = [
            ValidationError::FieldErrors(vec![]),
            ValidationError::UnknownFilter {
                resource: "countries".to_string(),
                key: "population".to_string(),
            },
            ValidationError::ValueMismatch {
                key: "region".to_string(),
                expected: "text".to_string(),
            },
        ];
        for err in errors {
            assert_eq!(TabulaError::from(err).error_code(), "VALIDATION_ERROR");
        }
    }

    #[test]
    fn test_resource_error_codes() {
        let err = TabulaError::Resource(ResourceError::OperationNotSupported {
            resource: "countries".to_string(),
            operation: "delete".to_string(),
        });
        assert_eq!(err.error_code(), "OPERATION_NOT_SUPPORTED");
        assert_eq!(
            err.to_string(),
            "delete operation not supported for resource 'countries'"
        );
    }
}

// =============================================================================
// Error Response Tests
// =============================================================================

mod error_response_tests {
    use super::*;

    #[test]
    fn test_field_errors_are_listed_in_details() {
        let err = TabulaError::Validation(ValidationError::FieldErrors(vec![FieldValidationError {
            field: "national".to_string(),
            message: "National word is required".to_string(),
        }]));

        let response = err.to_response();
        assert_eq!(response.code, "VALIDATION_ERROR");
        assert_eq!(
            response.details,
            Some(json!({
                "fields": [{"field": "national", "message": "National word is required"}]
            }))
        );
    }

    #[test]
    fn test_response_serialization_skips_missing_details() {
        let err = TabulaError::Api(ApiError::Network {
            message: "Network error: Please check your internet connection".to_string(),
        });
        let body = serde_json::to_value(err.to_response()).unwrap();
        assert_eq!(
            body,
            json!({
                "code": "NETWORK_ERROR",
                "message": "Network error: Please check your internet connection"
            })
        );
    }

    #[test]
    fn test_unsupported_operation_details() {
        let err = TabulaError::Resource(ResourceError::OperationNotSupported {
            resource: "countries".to_string(),
            operation: "create".to_string(),
        });
        assert_eq!(
            err.to_response().details,
            Some(json!({"resource": "countries", "operation": "create"}))
        );
    }
}

// =============================================================================
// Conversion Tests
// =============================================================================

mod conversion_tests {
    use super::*;

    #[test]
    fn test_json_errors_are_parse_errors() {
        let err: TabulaError = serde_json::from_str::<Value>("{oops").unwrap_err().into();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_yaml_errors_are_config_errors() {
        let err = ResourcesConfig::from_yaml_str("resources: {").unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Config(ConfigError::ParseError { file: None, .. })
        ));
    }

    #[test]
    fn test_io_errors_are_config_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TabulaError = io.into();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert_eq!(err.to_string(), "IO error: denied");
    }

    #[test]
    fn test_plain_anyhow_errors_are_internal() {
        let err: TabulaError = anyhow::anyhow!("lock poisoned").into();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.to_string(), "Internal error: lock poisoned");
    }
}

// =============================================================================
// Error Matching Tests
// =============================================================================

mod error_matching_tests {
    use super::*;

    #[tokio::test]
    async fn test_form_errors_can_be_matched_per_field() {
        let config = ResourcesConfig::default_config()
            .require_resource("captions")
            .unwrap()
            .clone();
        let api = InMemoryResourceApi::new("captions");
        let mut table = ResourceTable::new(config, Arc::new(api), None).unwrap();

        let err = table
            .create_item(json!({"national": "", "foreign": "x"}))
            .await
            .unwrap_err();

        let errors = match err {
            TabulaError::Validation(ValidationError::FieldErrors(errors)) => errors,
            other => panic!("expected field errors, got {other:?}"),
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["national", "foreign"]);
    }

    #[tokio::test]
    async fn test_failing_backend_surfaces_its_error() {
        let config = ResourcesConfig::default_config()
            .require_resource("countries")
            .unwrap()
            .clone();
        let api = InMemoryResourceApi::new("countries");
        api.set_failing(
            ApiOperation::List,
            ApiError::Http {
                status: 500,
                message: "Server error".to_string(),
            },
        );
        let mut table = ResourceTable::new(config, Arc::new(api), None).unwrap();

        match table.fetch().await {
            Err(TabulaError::Api(ApiError::Http { status, .. })) => assert_eq!(status, 500),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(table.items().is_empty());
    }
}
