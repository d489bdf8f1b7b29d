//! The Autonomy tables: users, realms and memberships, signals, clusters and their signal links, syntheses.

use crate::domain::{MemberRole, Role, SynthesisTarget, Visibility};
use crate::model::types::*;
use std::collections::HashMap;

use ColumnType::*;
use ReferentialAction::*;

fn id_uuid() -> ColumnConfig {
    ColumnConfig::new("id", Uuid).not_null().default_expr("gen_random_uuid()")
}

/// Application-generated ULID primary key.
fn id_ulid() -> ColumnConfig {
    ColumnConfig::new("id", Text).not_null()
}

fn realm_fk(inverse_as: &str) -> ColumnConfig {
    ColumnConfig::new("realm_id", Uuid)
        .not_null()
        .references("realms", Cascade, "realm", inverse_as)
}

fn table(name: &str, columns: Vec<ColumnConfig>) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        primary_key: "id".to_string(),
        columns,
        unique: Vec::new(),
        check: Vec::new(),
        indexes: Vec::new(),
    }
}

fn index(name: &str, columns: &[&str]) -> IndexConfig {
    IndexConfig {
        name: name.to_string(),
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
        unique: false,
    }
}

fn rules(entries: Vec<(&str, ValidationRule)>) -> HashMap<String, ValidationRule> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

const SLUG_PATTERN: &str = r"^[a-z0-9][a-z0-9_.\-]*$";

pub fn catalog(schema: &str) -> Catalog {
    let users = table(
        "users",
        vec![
            id_uuid(),
            ColumnConfig::new("email", Text).not_null().unique(),
            ColumnConfig::new("password_hash", Text).not_null(),
            ColumnConfig::new("name", Text),
            ColumnConfig::new("role", Text).not_null().default_literal(Role::User.as_str()),
        ],
    );

    let realms = table(
        "realms",
        vec![
            id_uuid(),
            ColumnConfig::new("name", Text).not_null(),
            ColumnConfig::new("description", Text),
            ColumnConfig::new("owner_id", Uuid)
                .not_null()
                .references("users", Cascade, "owner", "owned_realms"),
        ],
    );

    let mut realm_members = table(
        "realm_members",
        vec![
            id_uuid(),
            realm_fk("members"),
            ColumnConfig::new("user_id", Uuid)
                .not_null()
                .references("users", Cascade, "user", "memberships"),
            ColumnConfig::new("role", Text).not_null().default_literal(MemberRole::Member.as_str()),
        ],
    );
    realm_members.unique.push(strings(&["realm_id", "user_id"]));
    realm_members.indexes.push(index("realm_members_user_idx", &["user_id"]));

    let mut signals = table(
        "signals",
        vec![
            id_ulid(),
            realm_fk("signals"),
            ColumnConfig::new("signal_type", Text).not_null(),
            ColumnConfig::new("visibility", Text).not_null().default_literal("private"),
            ColumnConfig::new("title", Text),
            ColumnConfig::new("payload", Jsonb).not_null().default_expr("'{}'::jsonb"),
            ColumnConfig::new("latitude", Double),
            ColumnConfig::new("longitude", Double),
            ColumnConfig::new("embedding", Jsonb),
            ColumnConfig::new("occurred_at", Timestamptz).not_null().default_expr("NOW()"),
        ],
    );
    signals.check.push(TableCheck {
        name: "signals_location_pair".into(),
        expression: "(latitude IS NULL) = (longitude IS NULL)".into(),
    });
    signals.indexes.push(index("signals_realm_occurred_idx", &["realm_id", "occurred_at"]));
    signals.indexes.push(index("signals_location_idx", &["latitude", "longitude"]));

    let mut clusters = table(
        "clusters",
        vec![
            id_ulid(),
            realm_fk("clusters"),
            ColumnConfig::new("name", Text).not_null(),
            ColumnConfig::new("description", Text),
            ColumnConfig::new("cluster_type", Text).not_null().default_literal("manual"),
            ColumnConfig::new("parent_cluster_id", Text).references("clusters", Cascade, "parent", "children"),
        ],
    );
    clusters.indexes.push(index("clusters_parent_idx", &["parent_cluster_id"]));

    let mut cluster_signals = table(
        "cluster_signals",
        vec![
            id_uuid(),
            ColumnConfig::new("cluster_id", Text)
                .not_null()
                .references("clusters", Cascade, "cluster", "signal_links"),
            ColumnConfig::new("signal_id", Text)
                .not_null()
                .references("signals", Cascade, "signal", "cluster_links"),
            ColumnConfig::new("position", Integer).not_null().default_expr("0"),
        ],
    );
    cluster_signals.unique.push(strings(&["cluster_id", "signal_id"]));
    cluster_signals.indexes.push(index("cluster_signals_signal_idx", &["signal_id"]));

    let mut syntheses = table(
        "syntheses",
        vec![
            id_ulid(),
            realm_fk("syntheses"),
            ColumnConfig::new("polymorphic_type", Text).not_null(),
            ColumnConfig::new("polymorphic_id", Text).not_null(),
            ColumnConfig::new("content", Jsonb).not_null().default_expr("'{}'::jsonb"),
            ColumnConfig::new("history", Jsonb).not_null().default_expr("'[]'::jsonb"),
            ColumnConfig::new("errors", Jsonb).not_null().default_expr("'[]'::jsonb"),
            ColumnConfig::new("model", Text),
        ],
    );
    syntheses.check.push(TableCheck {
        name: "syntheses_polymorphic_type".into(),
        expression: "polymorphic_type IN ('signal', 'cluster')".into(),
    });
    syntheses
        .indexes
        .push(index("syntheses_target_idx", &["polymorphic_type", "polymorphic_id"]));

    let api_entities = vec![
        ApiEntityConfig {
            table: "users".into(),
            path_segment: "users".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Unscoped,
            sensitive_columns: strings(&["password_hash"]),
            read_only_columns: Vec::new(),
            search_columns: strings(&["email", "name"]),
            order_by: ("created_at".into(), SortDirection::Desc),
            validation: rules(vec![
                ("email", ValidationRule { max_length: Some(320), ..ValidationRule::format("email") }),
                ("name", ValidationRule::max_length(200)),
                ("role", ValidationRule::one_of(&Role::ALL)),
            ]),
        },
        ApiEntityConfig {
            table: "realms".into(),
            path_segment: "realms".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Realm("id".into()),
            sensitive_columns: Vec::new(),
            read_only_columns: Vec::new(),
            search_columns: strings(&["name", "description"]),
            order_by: ("name".into(), SortDirection::Asc),
            validation: rules(vec![
                ("name", ValidationRule::length(1, 200)),
                ("description", ValidationRule::max_length(2000)),
            ]),
        },
        ApiEntityConfig {
            table: "realm_members".into(),
            path_segment: "realm_members".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Realm("realm_id".into()),
            sensitive_columns: Vec::new(),
            read_only_columns: Vec::new(),
            search_columns: Vec::new(),
            order_by: ("created_at".into(), SortDirection::Asc),
            validation: rules(vec![("role", ValidationRule::one_of(&MemberRole::ALL))]),
        },
        ApiEntityConfig {
            table: "signals".into(),
            path_segment: "signals".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Realm("realm_id".into()),
            sensitive_columns: Vec::new(),
            read_only_columns: Vec::new(),
            search_columns: strings(&["title", "signal_type"]),
            order_by: ("occurred_at".into(), SortDirection::Desc),
            validation: rules(vec![
                ("signal_type", ValidationRule::length(1, 64).with_pattern(SLUG_PATTERN)),
                ("visibility", ValidationRule::one_of(&Visibility::ALL)),
                ("title", ValidationRule::max_length(500)),
                ("payload", ValidationRule::json(JsonShape::Object)),
                ("latitude", ValidationRule::range(-90.0, 90.0)),
                ("longitude", ValidationRule::range(-180.0, 180.0)),
                ("embedding", ValidationRule::json(JsonShape::Array)),
            ]),
        },
        ApiEntityConfig {
            table: "clusters".into(),
            path_segment: "clusters".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Realm("realm_id".into()),
            sensitive_columns: Vec::new(),
            read_only_columns: Vec::new(),
            search_columns: strings(&["name", "description"]),
            order_by: ("name".into(), SortDirection::Asc),
            validation: rules(vec![
                ("name", ValidationRule::length(1, 200)),
                ("description", ValidationRule::max_length(4000)),
                ("cluster_type", ValidationRule::length(1, 64).with_pattern(SLUG_PATTERN)),
                ("parent_cluster_id", ValidationRule::format("ulid")),
            ]),
        },
        ApiEntityConfig {
            table: "cluster_signals".into(),
            path_segment: "cluster_signals".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Unscoped,
            sensitive_columns: Vec::new(),
            read_only_columns: Vec::new(),
            search_columns: Vec::new(),
            order_by: ("position".into(), SortDirection::Asc),
            validation: rules(vec![
                ("cluster_id", ValidationRule::format("ulid")),
                ("signal_id", ValidationRule::format("ulid")),
                ("position", ValidationRule { minimum: Some(0.0), ..Default::default() }),
            ]),
        },
        ApiEntityConfig {
            table: "syntheses".into(),
            path_segment: "syntheses".into(),
            operations: Operation::ALL.to_vec(),
            scope: Scope::Realm("realm_id".into()),
            sensitive_columns: Vec::new(),
            read_only_columns: strings(&["history", "errors"]),
            search_columns: strings(&["model"]),
            order_by: ("created_at".into(), SortDirection::Desc),
            validation: rules(vec![
                ("polymorphic_type", ValidationRule::one_of(&SynthesisTarget::KINDS)),
                ("polymorphic_id", ValidationRule::format("ulid")),
                ("content", ValidationRule::json(JsonShape::Object)),
                ("model", ValidationRule::max_length(200)),
            ]),
        },
    ];

    Catalog {
        schema: schema.to_string(),
        tables: vec![users, realms, realm_members, signals, clusters, cluster_signals, syntheses],
        api_entities,
    }
}
