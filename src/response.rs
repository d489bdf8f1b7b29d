//! Standard response envelope helpers.

use crate::case::object_keys_to_camel_case;
use crate::model::ResolvedEntity;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

#[derive(Serialize)]
pub struct SuccessPage<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Serialize)]
pub struct PageMeta {
    pub count: u64,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (
        StatusCode::CREATED,
        Json(SuccessOne {
            data,
            meta: None,
        }),
    )
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (
        StatusCode::OK,
        Json(SuccessOne {
            data,
            meta: None,
        }),
    )
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> (StatusCode, Json<SuccessMany<T>>) {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessMany {
            data,
            meta: MetaCount { count },
        }),
    )
}

pub fn success_page<T: Serialize>(
    data: Vec<T>,
    total: u64,
    limit: u32,
    offset: u32,
) -> (StatusCode, Json<SuccessPage<T>>) {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessPage {
            data,
            meta: PageMeta {
                count,
                total,
                limit,
                offset,
            },
        }),
    )
}

/// Prepare a database row for the wire: drop sensitive columns, camelCase the keys of the row and of any included rows.
pub fn present(entity: &ResolvedEntity, mut row: Value) -> Value {
    if let Value::Object(ref mut map) = row {
        for col in &entity.sensitive_columns {
            map.remove(col);
        }
        for inc in &entity.includes {
            match map.get_mut(&inc.name) {
                Some(Value::Object(related)) => object_keys_to_camel_case(related),
                Some(Value::Array(items)) => {
                    for item in items.iter_mut() {
                        if let Value::Object(related) = item {
                            object_keys_to_camel_case(related);
                        }
                    }
                }
                _ => {}
            }
        }
        object_keys_to_camel_case(map);
    }
    row
}

pub fn present_all(entity: &ResolvedEntity, rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter().map(|r| present(entity, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{catalog, resolve};
    use serde_json::json;

    #[test]
    fn present_strips_sensitive_and_camel_cases() {
        let model = resolve(&catalog("autonomy")).unwrap();
        let users = model.entity_by_path("users").unwrap();
        let row = json!({
            "id": "9b2b6c8e-54d4-4b7a-9a55-0d0d1f3c7a11",
            "email": "a@example.com",
            "password_hash": "$argon2id$...",
            "created_at": "2024-01-01T00:00:00Z"
        });
        let out = present(users, row);
        assert!(out.get("password_hash").is_none());
        assert!(out.get("passwordHash").is_none());
        assert_eq!(out["createdAt"], json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn present_camel_cases_included_rows_but_not_payloads() {
        let model = resolve(&catalog("autonomy")).unwrap();
        let clusters = model.entity_by_path("clusters").unwrap();
        let row = json!({
            "id": "01HZX3J5Q8T9M2N4P6R8S0V2W4",
            "parent_cluster_id": null,
            "children": [{ "parent_cluster_id": "01HZX3J5Q8T9M2N4P6R8S0V2W4", "cluster_type": "manual" }]
        });
        let out = present(clusters, row);
        assert_eq!(out["parentClusterId"], Value::Null);
        assert_eq!(out["children"][0]["clusterType"], json!("manual"));
    }
}
