//! Case conversion for the API: request keys camelCase -> snake_case (for DB), response keys snake_case -> camelCase (for client).
//! Only top-level keys are converted; user-authored JSON (payloads, synthesis content) is left alone.

use serde_json::{Map, Value};

/// Convert a single identifier from snake_case to camelCase.
/// e.g. "user_id" -> "userId", "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "userId" -> "user_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Human label for a column name: "parent_cluster_id" -> "Parent Cluster", "signal_type" -> "Signal Type".
pub fn to_label(s: &str) -> String {
    let trimmed = s.strip_suffix("_id").unwrap_or(s);
    trimmed
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert all keys of a JSON object from snake_case to camelCase (in place).
/// Used for API responses so the client receives camelCase keys.
pub fn object_keys_to_camel_case(obj: &mut Map<String, Value>) {
    let keys: Vec<String> = obj.keys().cloned().collect();
    for k in keys {
        let camel = to_camel_case(&k);
        if camel != k {
            if let Some(v) = obj.remove(&k) {
                obj.insert(camel, v);
            }
        }
    }
}

/// Convert all keys of a JSON object from camelCase to snake_case (in place).
/// Used for request bodies and query params so we use snake_case for DB column names.
pub fn object_keys_to_snake_case(obj: &mut Map<String, Value>) {
    let keys: Vec<String> = obj.keys().cloned().collect();
    for k in keys {
        let snake = to_snake_case(&k);
        if snake != k {
            if let Some(v) = obj.remove(&k) {
                obj.insert(snake, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_identifiers_both_ways() {
        assert_eq!(to_camel_case("parent_cluster_id"), "parentClusterId");
        assert_eq!(to_snake_case("parentClusterId"), "parent_cluster_id");
        assert_eq!(to_snake_case("signal_type"), "signal_type");
        assert_eq!(to_camel_case("email"), "email");
    }

    #[test]
    fn labels_drop_id_suffix() {
        assert_eq!(to_label("parent_cluster_id"), "Parent Cluster");
        assert_eq!(to_label("signal_type"), "Signal Type");
        assert_eq!(to_label("email"), "Email");
    }

    #[test]
    fn object_conversion_is_shallow() {
        let mut v = json!({ "signalType": "note", "payload": { "innerKey": 1 } });
        if let Value::Object(ref mut m) = v {
            object_keys_to_snake_case(m);
        }
        assert_eq!(v, json!({ "signal_type": "note", "payload": { "innerKey": 1 } }));
    }
}
