//! Client-side form validation
//!
//! Each resource may declare form rules per field. Submissions are checked
//! before any API call; every failing field reports its first violation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{ConfigError, FieldValidationError, TabulaResult, ValidationError};

/// Validation rules of one form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldRule {
    pub key: String,
    /// Name used in messages, defaults to the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FormFieldRule {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

type Check = Box<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Validator: value must be present and not blank
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |label: &str, value: &Value| {
        let blank = match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if blank {
            Err(format!("{label} is required"))
        } else {
            Ok(())
        }
    }
}

/// Validator: string length in characters must be within range
pub fn string_length(
    min: Option<usize>,
    max: Option<usize>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |label: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        match (min, max) {
            (Some(min), _) if len < min => Err(format!("{label} must be at least {min} characters")),
            (_, Some(max)) if len > max => Err(format!("{label} must be less than {max} characters")),
            _ => Ok(()),
        }
    }
}

/// Validator: string must match a pattern
pub fn matches_pattern(
    regex: Regex,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |label: &str, value: &Value| match value.as_str() {
        Some(s) if !regex.is_match(s) => Err(format!("{label} contains invalid characters")),
        _ => Ok(()),
    }
}

struct FieldValidator {
    key: String,
    label: String,
    required: bool,
    checks: Vec<Check>,
}

/// Compiled form rules of a resource
pub struct FormValidator {
    fields: Vec<FieldValidator>,
}

impl std::fmt::Debug for FormValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormValidator")
            .field(
                "fields",
                &self.fields.iter().map(|v| v.key.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FormValidator {
    /// Compile rules; an invalid pattern is a configuration error
    pub fn from_rules(rules: &[FormFieldRule]) -> TabulaResult<Self> {
        let mut fields = Vec::with_capacity(rules.len());
        for rule in rules {
            let mut checks: Vec<Check> = Vec::new();
            if rule.required {
                checks.push(Box::new(required()));
            }
            if rule.min_length.is_some() || rule.max_length.is_some() {
                checks.push(Box::new(string_length(rule.min_length, rule.max_length)));
            }
            if let Some(pattern) = &rule.pattern {
                let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                    field: format!("form.{}.pattern", rule.key),
                    value: pattern.clone(),
                    message: e.to_string(),
                })?;
                checks.push(Box::new(matches_pattern(regex)));
            }
            fields.push(FieldValidator {
                key: rule.key.clone(),
                label: rule.label().to_string(),
                required: rule.required,
                checks,
            });
        }
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a submitted item
    ///
    /// Optional fields that are absent or empty are not checked further.
    pub fn validate(&self, item: &Value) -> Result<(), ValidationError> {
        let errors: Vec<FieldValidationError> = self
            .fields
            .iter()
            .filter_map(|field| {
                let value = item.get(&field.key).unwrap_or(&Value::Null);
                let empty = value.is_null() || value.as_str().is_some_and(str::is_empty);
                if empty && !field.required {
                    return None;
                }
                field
                    .checks
                    .iter()
                    .find_map(|check| check(&field.label, value).err())
                    .map(|message| FieldValidationError {
                        field: field.key.clone(),
                        message,
                    })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::FieldErrors(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WORD_PATTERN: &str = r"^[\p{L}\p{N}\s\-'.,!?]+$";

    fn caption_rules() -> Vec<FormFieldRule> {
        ["national", "foreign"]
            .iter()
            .map(|key| FormFieldRule {
                key: key.to_string(),
                label: Some(format!("{}{} word", &key[..1].to_uppercase(), &key[1..])),
                required: true,
                min_length: Some(2),
                max_length: Some(100),
                pattern: Some(WORD_PATTERN.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_valid_caption() {
        let validator = FormValidator::from_rules(&caption_rules()).unwrap();
        assert!(validator.validate(&json!({"national": "Château", "foreign": "Castle!"})).is_ok());
    }

    #[test]
    fn test_first_violation_per_field() {
        let validator = FormValidator::from_rules(&caption_rules()).unwrap();
        let err = validator
            .validate(&json!({"national": "  ", "foreign": "x"}))
            .unwrap_err();
        let ValidationError::FieldErrors(errors) = err else {
            panic!("expected field errors");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "National word is required");
        assert_eq!(errors[1].message, "Foreign word must be at least 2 characters");
    }

    #[test]
    fn test_pattern_and_max_length() {
        let validator = FormValidator::from_rules(&caption_rules()).unwrap();
        let err = validator
            .validate(&json!({"national": "<script>", "foreign": "a".repeat(101)}))
            .unwrap_err();
        let ValidationError::FieldErrors(errors) = err else {
            panic!("expected field errors");
        };
        assert_eq!(errors[0].message, "National word contains invalid characters");
        assert_eq!(errors[1].message, "Foreign word must be less than 100 characters");
    }

    #[test]
    fn test_optional_empty_field_skipped() {
        let rules = vec![FormFieldRule {
            key: "note".into(),
            label: None,
            required: false,
            min_length: Some(3),
            max_length: None,
            pattern: None,
        }];
        let validator = FormValidator::from_rules(&rules).unwrap();
        assert!(validator.validate(&json!({})).is_ok());
        assert!(validator.validate(&json!({"note": "ab"})).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let rules = vec![FormFieldRule {
            key: "x".into(),
            label: None,
            required: false,
            min_length: None,
            max_length: None,
            pattern: Some("(".into()),
        }];
        let err = FormValidator::from_rules(&rules).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
