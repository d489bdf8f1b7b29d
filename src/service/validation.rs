//! Request validation from column types and catalog rules. Collects every failing field.

use crate::error::{AppError, FieldIssue};
use crate::ids::is_ulid;
use crate::model::{ColumnInfo, ColumnType, JsonShape, ResolvedEntity, ValidationRule};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body: unknown and read-only keys rejected, required fields present, types and rules hold.
    pub fn validate(body: &Map<String, Value>, entity: &ResolvedEntity) -> Result<(), AppError> {
        let mut issues = check_present(body, entity);
        for col in entity.writable_columns() {
            if body.contains_key(&col.name) {
                continue;
            }
            if is_required(col, entity.validation.get(&col.name)) {
                issues.push(FieldIssue::new(&col.name, "is required"));
            }
        }
        finish(issues)
    }

    /// Validate only the fields present in body (for PATCH). Required is not enforced for missing fields.
    pub fn validate_partial(body: &Map<String, Value>, entity: &ResolvedEntity) -> Result<(), AppError> {
        let mut issues = check_present(body, entity);
        if body.is_empty() {
            issues.push(FieldIssue::new("body", "must contain at least one field"));
        }
        finish(issues)
    }
}

fn finish(issues: Vec<FieldIssue>) -> Result<(), AppError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(issues))
    }
}

/// NOT NULL without a default, or marked required by a rule.
pub fn is_required(col: &ColumnInfo, rule: Option<&ValidationRule>) -> bool {
    rule.and_then(|r| r.required).unwrap_or(!col.nullable && !col.has_default)
}

fn check_present(body: &Map<String, Value>, entity: &ResolvedEntity) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    for (key, value) in body {
        let Some(col) = entity.column(key) else {
            issues.push(FieldIssue::new(key, "is not a known field"));
            continue;
        };
        if !entity.writable_columns().any(|c| c.name == col.name) {
            issues.push(FieldIssue::new(key, "is read-only"));
            continue;
        }
        let rule = entity.validation.get(key);
        if value.is_null() {
            if !col.nullable || rule.and_then(|r| r.required) == Some(true) {
                issues.push(FieldIssue::new(key, "must not be null"));
            }
            continue;
        }
        if let Err(message) = check_type(col.column_type, value) {
            issues.push(FieldIssue::new(key, message));
            continue;
        }
        if let Some(rule) = rule {
            if let Err(message) = check_rule(value, rule) {
                issues.push(FieldIssue::new(key, message));
            }
        }
    }
    issues
}

fn check_type(ty: ColumnType, v: &Value) -> Result<(), String> {
    let ok = match ty {
        ColumnType::Uuid => v.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        ColumnType::Text => v.is_string(),
        ColumnType::Integer => v.as_i64().is_some_and(|n| i32::try_from(n).is_ok()),
        ColumnType::BigInt => v.as_i64().is_some(),
        ColumnType::Double => v.is_number(),
        ColumnType::Boolean => v.is_boolean(),
        ColumnType::Jsonb => true,
        ColumnType::Timestamptz => v
            .as_str()
            .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
    };
    if ok {
        Ok(())
    } else {
        Err(match ty {
            ColumnType::Uuid => "must be a UUID".into(),
            ColumnType::Text => "must be a string".into(),
            ColumnType::Integer | ColumnType::BigInt => "must be an integer".into(),
            ColumnType::Double => "must be a number".into(),
            ColumnType::Boolean => "must be a boolean".into(),
            ColumnType::Timestamptz => "must be an RFC 3339 timestamp".into(),
            ColumnType::Jsonb => "must be JSON".into(),
        })
    }
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

fn check_rule(v: &Value, rule: &ValidationRule) -> Result<(), String> {
    if let Some(format) = &rule.format {
        check_format(v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(format!("must be at least {} characters", min));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(format!("must be at most {} characters", max));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| "has an invalid pattern rule".to_string())?;
            if !re.is_match(s) {
                return Err("does not match required pattern".into());
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            let options: Vec<String> = allowed
                .iter()
                .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()))
                .collect();
            return Err(format!("must be one of: {}", options.join(", ")));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(format!("must be at least {}", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(format!("must be at most {}", max));
            }
        }
    }
    match rule.json {
        Some(JsonShape::Object) if !v.is_object() => Err("must be a JSON object".into()),
        Some(JsonShape::Array) if !v.is_array() => Err("must be a JSON array".into()),
        _ => Ok(()),
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(v: &Value, format: &str) -> Result<(), String> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" if !email_regex().is_some_and(|re| re.is_match(s)) => Err("must be a valid email".into()),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => Err("must be a valid UUID".into()),
        "ulid" if !is_ulid(s) => Err("must be a valid ULID".into()),
        _ => Ok(()),
    }
}
