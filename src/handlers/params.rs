//! Request parsing shared by the handlers: list query strings, JSON bodies, path ids.

use crate::case::{object_keys_to_snake_case, to_snake_case};
use crate::domain::SynthesisTarget;
use crate::error::AppError;
use crate::ids::is_ulid;
use crate::model::{ColumnType, PkType, ResolvedEntity};
use crate::sql::ListQuery;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Parsed `?limit=&offset=&q=&include=` plus exact-match column filters.
#[derive(Debug, Default)]
pub struct ListParams {
    pub query: ListQuery,
    pub include: Vec<String>,
}

/// Query-string value typed for the column it filters.
fn query_value_for_column(ty: ColumnType, s: &str) -> Value {
    match ty {
        ColumnType::Integer | ColumnType::BigInt => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(s)),
        ColumnType::Double => s.parse::<f64>().map(Value::from).unwrap_or_else(|_| Value::from(s)),
        ColumnType::Boolean if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        ColumnType::Boolean if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        _ => Value::from(s),
    }
}

fn parse_u32(name: &str, raw: &str) -> Result<u32, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::invalid(name, "must be a non-negative integer"))
}

/// Split a comma list, dropping blanks. Include names are snake_cased.
pub fn parse_include(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(to_snake_case)
        .collect()
}

pub fn parse_list_params(entity: &ResolvedEntity, params: &HashMap<String, String>) -> Result<ListParams, AppError> {
    let mut out = ListParams::default();
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    for key in keys {
        let raw = &params[key];
        match key.as_str() {
            "limit" => out.query.limit = Some(parse_u32("limit", raw)?),
            "offset" => out.query.offset = Some(parse_u32("offset", raw)?),
            "q" | "search" => out.query.search = Some(raw.clone()),
            "include" => out.include = parse_include(raw),
            other => {
                let column = match to_snake_case(other).as_str() {
                    "target_type" => "polymorphic_type".to_string(),
                    "target_id" => "polymorphic_id".to_string(),
                    snake => snake.to_string(),
                };
                if column == "polymorphic_type" && SynthesisTarget::from_parts(raw, "").is_none() {
                    return Err(AppError::invalid(other, "must be signal or cluster"));
                }
                if let Some(col) = entity.column(&column) {
                    if entity.sensitive_columns.contains(&col.name) {
                        continue;
                    }
                    let value = query_value_for_column(col.column_type, raw);
                    out.query.filters.push((column, value));
                }
            }
        }
    }
    Ok(out)
}

/// JSON object body with keys converted to snake_case.
pub fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(mut m) => {
            object_keys_to_snake_case(&mut m);
            Ok(m)
        }
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Path id checked against the entity's key type.
pub fn parse_id(entity: &ResolvedEntity, raw: &str) -> Result<Value, AppError> {
    match entity.pk_type {
        PkType::Uuid => Uuid::parse_str(raw)
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| AppError::BadRequest(format!("invalid id: {}", raw))),
        PkType::Ulid if is_ulid(raw) => Ok(Value::String(raw.to_ascii_uppercase())),
        PkType::Ulid => Err(AppError::BadRequest(format!("invalid id: {}", raw))),
    }
}

pub fn parse_uuid(name: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid {}: {}", name, raw)))
}

/// Optional numeric query parameter.
pub fn query_f64(params: &HashMap<String, String>, name: &str) -> Result<Option<f64>, AppError> {
    params
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| AppError::invalid(name, "must be a number"))
        })
        .transpose()
}

pub fn query_u32(params: &HashMap<String, String>, name: &str) -> Result<Option<u32>, AppError> {
    params.get(name).map(|raw| parse_u32(name, raw)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{catalog, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&catalog("autonomy")).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn list_params_split_paging_search_and_filters() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        let p = parse_list_params(
            signals,
            &params(&[
                ("limit", "10"),
                ("offset", "20"),
                ("q", "walk"),
                ("include", "realm, clusterLinks"),
                ("signalType", "note"),
                ("latitude", "1.5"),
                ("unknown", "x"),
            ]),
        )
        .unwrap();
        assert_eq!(p.query.limit, Some(10));
        assert_eq!(p.query.offset, Some(20));
        assert_eq!(p.query.search.as_deref(), Some("walk"));
        assert_eq!(p.include, vec!["realm", "cluster_links"]);
        assert_eq!(
            p.query.filters,
            vec![("latitude".to_string(), json!(1.5)), ("signal_type".to_string(), json!("note"))]
        );
    }

    #[test]
    fn bad_paging_is_a_validation_error() {
        let m = model();
        let signals = m.entity_by_path("signals").unwrap();
        assert!(matches!(
            parse_list_params(signals, &params(&[("limit", "-3")])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn synthesis_target_aliases() {
        let m = model();
        let syntheses = m.entity_by_path("syntheses").unwrap();
        let p = parse_list_params(syntheses, &params(&[("target_type", "cluster"), ("targetId", "01HZX3J5Q8T9M2N4P6R8S0V2W4")])).unwrap();
        assert_eq!(p.query.filters[0].0, "polymorphic_id");
        assert_eq!(p.query.filters[1], ("polymorphic_type".to_string(), json!("cluster")));
        assert!(parse_list_params(syntheses, &params(&[("target_type", "realm")])).is_err());
    }

    #[test]
    fn sensitive_columns_are_not_filterable() {
        let m = model();
        let users = m.entity_by_path("users").unwrap();
        let p = parse_list_params(users, &params(&[("password_hash", "x")])).unwrap();
        assert!(p.query.filters.is_empty());
    }

    #[test]
    fn bodies_are_snake_cased() {
        let body = body_to_map(json!({ "signalType": "note", "payload": { "innerKey": 1 } })).unwrap();
        assert_eq!(body["signal_type"], json!("note"));
        assert_eq!(body["payload"], json!({ "innerKey": 1 }));
        assert!(body_to_map(json!([1])).is_err());
    }

    #[test]
    fn ids_match_key_type() {
        let m = model();
        let realms = m.entity_by_path("realms").unwrap();
        let signals = m.entity_by_path("signals").unwrap();
        assert!(parse_id(realms, "9b2b6c8e-54d4-4b7a-9a55-0d0d1f3c7a11").is_ok());
        assert!(parse_id(realms, "01HZX3J5Q8T9M2N4P6R8S0V2W4").is_err());
        assert_eq!(
            parse_id(signals, "01hzx3j5q8t9m2n4p6r8s0v2w4").unwrap(),
            json!("01HZX3J5Q8T9M2N4P6R8S0V2W4")
        );
    }
}
