//! Form configs for admin UIs, inferred from an entity's columns and validation rules.

use crate::case::{to_camel_case, to_label};
use crate::model::{ColumnInfo, ColumnType, ResolvedEntity, ValidationRule};
use crate::service::is_required;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMode {
    Create,
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    Text,
    Textarea,
    Email,
    Password,
    Number,
    Checkbox,
    Select,
    DatetimeLocal,
    Date,
    Json,
    Reference,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    /// Request key (camelCase).
    pub name: String,
    pub column: String,
    pub label: String,
    pub input: InputKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Path segment of the referenced entity, for `reference` inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FormConfig {
    pub entity: String,
    pub mode: FormMode,
    pub fields: Vec<FieldConfig>,
}

fn input_for(col: &ColumnInfo, rule: Option<&ValidationRule>) -> InputKind {
    if rule.is_some_and(|r| r.allowed.is_some()) {
        return InputKind::Select;
    }
    if col.references.is_some() {
        return InputKind::Reference;
    }
    if rule.and_then(|r| r.format.as_deref()) == Some("email") {
        return InputKind::Email;
    }
    match col.column_type {
        ColumnType::Boolean => InputKind::Checkbox,
        ColumnType::Integer | ColumnType::BigInt | ColumnType::Double => InputKind::Number,
        ColumnType::Timestamptz => InputKind::DatetimeLocal,
        ColumnType::Jsonb => InputKind::Json,
        ColumnType::Text
            if rule.and_then(|r| r.max_length).is_some_and(|m| m > 255)
                || matches!(col.name.as_str(), "description" | "content") =>
        {
            InputKind::Textarea
        }
        _ => InputKind::Text,
    }
}

fn field_for(col: &ColumnInfo, rule: Option<&ValidationRule>, mode: FormMode) -> FieldConfig {
    let input = input_for(col, rule);
    let step = match (input, col.column_type) {
        (InputKind::Number, ColumnType::Double) => Some("any".to_string()),
        (InputKind::Number, _) => Some("1".to_string()),
        _ => None,
    };
    FieldConfig {
        name: to_camel_case(&col.name),
        column: col.name.clone(),
        label: to_label(&col.name),
        input,
        required: mode == FormMode::Create && is_required(col, rule),
        options: rule.and_then(|r| r.allowed.clone()),
        min: rule.and_then(|r| r.minimum),
        max: rule.and_then(|r| r.maximum),
        step,
        min_length: rule.and_then(|r| r.min_length),
        max_length: rule.and_then(|r| r.max_length),
        pattern: rule.and_then(|r| r.pattern.clone()),
        reference: col.references.clone(),
    }
}

fn password_field(mode: FormMode) -> FieldConfig {
    FieldConfig {
        name: "password".into(),
        column: "password".into(),
        label: "Password".into(),
        input: InputKind::Password,
        required: mode == FormMode::Create,
        options: None,
        min: None,
        max: None,
        step: None,
        min_length: Some(crate::auth::MIN_PASSWORD_LEN as u32),
        max_length: None,
        pattern: None,
        reference: None,
    }
}

/// Form for creating or updating rows of `entity`. Fields follow catalog column order; server-maintained
/// and sensitive columns are left out, except that user forms get a `password` input on create.
pub fn form_for(entity: &ResolvedEntity, mode: FormMode) -> FormConfig {
    let mut fields: Vec<FieldConfig> = entity
        .writable_columns()
        .map(|col| field_for(col, entity.validation.get(&col.name), mode))
        .collect();
    if mode == FormMode::Create && entity.sensitive_columns.contains("password_hash") {
        fields.push(password_field(mode));
    }
    FormConfig {
        entity: entity.path_segment.clone(),
        mode,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{catalog, resolve, ResolvedModel};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&catalog("autonomy")).unwrap()
    }

    fn field<'a>(form: &'a FormConfig, column: &str) -> &'a FieldConfig {
        form.fields.iter().find(|f| f.column == column).unwrap()
    }

    #[test]
    fn signal_create_form() {
        let m = model();
        let form = form_for(m.entity_by_path("signals").unwrap(), FormMode::Create);
        let columns: Vec<&str> = form.fields.iter().map(|f| f.column.as_str()).collect();
        assert_eq!(
            columns,
            vec!["realm_id", "signal_type", "visibility", "title", "payload", "latitude", "longitude", "embedding", "occurred_at"]
        );

        let realm = field(&form, "realm_id");
        assert_eq!(realm.input, InputKind::Reference);
        assert_eq!(realm.reference.as_deref(), Some("realms"));
        assert_eq!(realm.label, "Realm");
        assert!(realm.required);

        let visibility = field(&form, "visibility");
        assert_eq!(visibility.input, InputKind::Select);
        assert_eq!(visibility.options, Some(vec![json!("private"), json!("realm"), json!("public")]));
        assert!(!visibility.required);

        let lat = field(&form, "latitude");
        assert_eq!(lat.input, InputKind::Number);
        assert_eq!((lat.min, lat.max, lat.step.as_deref()), (Some(-90.0), Some(90.0), Some("any")));

        assert_eq!(field(&form, "payload").input, InputKind::Json);
        assert_eq!(field(&form, "occurred_at").input, InputKind::DatetimeLocal);
        assert_eq!(field(&form, "signal_type").name, "signalType");
    }

    #[test]
    fn update_forms_require_nothing() {
        let m = model();
        let form = form_for(m.entity_by_path("clusters").unwrap(), FormMode::Update);
        assert!(form.fields.iter().all(|f| !f.required));
        assert_eq!(field(&form, "description").input, InputKind::Textarea);
        assert_eq!(field(&form, "parent_cluster_id").label, "Parent Cluster");
    }

    #[test]
    fn user_forms_hide_hash_and_offer_password() {
        let m = model();
        let users = m.entity_by_path("users").unwrap();
        let create = form_for(users, FormMode::Create);
        assert!(create.fields.iter().all(|f| f.column != "password_hash"));
        assert_eq!(field(&create, "email").input, InputKind::Email);
        let pw = field(&create, "password");
        assert_eq!(pw.input, InputKind::Password);
        assert!(pw.required);
        assert!(form_for(users, FormMode::Update).fields.iter().all(|f| f.column != "password"));
    }

    #[test]
    fn syntheses_skip_server_maintained_columns() {
        let m = model();
        let form = form_for(m.entity_by_path("syntheses").unwrap(), FormMode::Create);
        assert!(form.fields.iter().all(|f| f.column != "history" && f.column != "errors"));
        assert_eq!(field(&form, "content").input, InputKind::Json);
        assert_eq!(field(&form, "polymorphic_type").input, InputKind::Select);
    }

    #[test]
    fn serializes_kebab_inputs() {
        let m = model();
        let form = form_for(m.entity_by_path("signals").unwrap(), FormMode::Create);
        let wire = serde_json::to_value(&form).unwrap();
        assert_eq!(wire["mode"], json!("create"));
        let occurred = wire["fields"].as_array().unwrap().iter().find(|f| f["column"] == "occurred_at").unwrap();
        assert_eq!(occurred["input"], json!("datetime-local"));
        assert!(occurred.get("options").is_none());
    }
}
