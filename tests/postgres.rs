//! End-to-end tests against a real PostgreSQL server, driven through the router.
//! Each test migrates its own schema and drops it afterwards. Set DATABASE_URL to run them;
//! without it they return early.

use autonomy::auth::JwtKeys;
use autonomy::domain::Role;
use autonomy::{apply_migrations, build_router, catalog, resolve, AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

fn keys() -> JwtKeys {
    JwtKeys::new(SECRET, 3600)
}

struct TestDb {
    pool: PgPool,
    app: Router,
    schema: String,
}

struct Account {
    id: String,
    token: String,
    realm: String,
}

impl TestDb {
    async fn start() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL is not set; skipping");
            return None;
        };
        let pool = PgPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
        let schema = format!("autonomy_test_{}", Uuid::new_v4().simple());
        let catalog = catalog(&schema);
        apply_migrations(&pool, &catalog).await.unwrap();
        let state = AppState {
            pool: pool.clone(),
            model: Arc::new(resolve(&catalog).unwrap()),
            jwt: keys(),
            cookie_secure: false,
        };
        Some(TestDb {
            pool,
            app: build_router(state, 1024 * 1024),
            schema,
        })
    }

    async fn finish(self) {
        sqlx::query(&format!("DROP SCHEMA \"{}\" CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .unwrap();
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        let req = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// POST that must succeed with 201; returns `data`.
    async fn create(&self, token: &str, uri: &str, body: Value) -> Value {
        let (status, res) = self.send(Method::POST, uri, Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "POST {uri}: {res}");
        res["data"].clone()
    }

    /// Register an account and look up its personal realm. The first account of a schema is the admin.
    async fn register(&self, email: &str) -> Account {
        let (status, res) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "password": "correct horse battery" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{res}");
        let id = res["data"]["id"].as_str().unwrap().to_string();
        let role = res["data"]["role"].as_str().unwrap().parse::<Role>().unwrap();
        let token = keys().issue(Uuid::parse_str(&id).unwrap(), email, role).unwrap();
        let (_, realms) = self.send(Method::GET, "/api/realms", Some(&token), None).await;
        let realm = realms["data"][0]["id"].as_str().unwrap().to_string();
        Account { id, token, realm }
    }

    async fn signal(&self, owner: &Account) -> String {
        let data = self
            .create(&owner.token, "/api/signals", json!({ "realmId": owner.realm, "signalType": "note" }))
            .await;
        data["id"].as_str().unwrap().to_string()
    }

    async fn cluster(&self, owner: &Account, name: &str, parent: Option<&str>) -> String {
        let mut body = json!({ "realmId": owner.realm, "name": name });
        if let Some(p) = parent {
            body["parentClusterId"] = json!(p);
        }
        let data = self.create(&owner.token, "/api/clusters", body).await;
        data["id"].as_str().unwrap().to_string()
    }

    async fn synthesis(&self, owner: &Account, kind: &str, target: &str) -> String {
        let body = json!({
            "realmId": owner.realm,
            "polymorphicType": kind,
            "polymorphicId": target,
            "content": { "summary": "first" }
        });
        let data = self.create(&owner.token, "/api/syntheses", body).await;
        data["id"].as_str().unwrap().to_string()
    }
}

fn error_field(body: &Value) -> &str {
    body["error"]["details"][0]["field"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn links_append_after_the_last_position() {
    let Some(db) = TestDb::start().await else { return };
    let admin = db.register("admin@example.com").await;
    let alice = db.register("alice@example.com").await;
    let cluster = db.cluster(&alice, "Walks", None).await;
    let (s1, s2, s3) = (db.signal(&alice).await, db.signal(&alice).await, db.signal(&alice).await);

    let uri = format!("/api/clusters/{cluster}/signals");
    let first = db.create(&alice.token, &uri, json!({ "signalId": s1 })).await;
    let second = db.create(&alice.token, &uri, json!({ "signalId": s2 })).await;
    let third = db
        .create(&admin.token, "/api/admin/cluster_signals", json!({ "clusterId": cluster, "signalId": s3 }))
        .await;
    assert_eq!(
        [&first["position"], &second["position"], &third["position"]],
        [&json!(0), &json!(1), &json!(2)]
    );

    let (status, listed) = db.send(Method::GET, &uri, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = listed["data"].as_array().unwrap().iter().map(|s| s["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![s1.as_str(), s2.as_str(), s3.as_str()]);
    db.finish().await;
}

#[tokio::test]
async fn cluster_parents_cannot_form_a_cycle() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let top = db.cluster(&alice, "Top", None).await;
    let middle = db.cluster(&alice, "Middle", Some(&top)).await;
    let bottom = db.cluster(&alice, "Bottom", Some(&middle)).await;

    let uri = format!("/api/clusters/{top}");
    for parent in [&bottom, &top] {
        let (status, body) = db
            .send(Method::PATCH, &uri, Some(&alice.token), Some(json!({ "parentClusterId": parent })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_field(&body), "parent_cluster_id");
    }

    let (status, children) = db
        .send(Method::GET, &format!("/api/clusters/{top}/children"), Some(&alice.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(children["data"][0]["id"], json!(middle));
    db.finish().await;
}

#[tokio::test]
async fn deleting_a_target_removes_its_syntheses() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let signal = db.signal(&alice).await;
    let on_signal = db.synthesis(&alice, "signal", &signal).await;
    let parent = db.cluster(&alice, "Parent", None).await;
    let child = db.cluster(&alice, "Child", Some(&parent)).await;
    let on_child = db.synthesis(&alice, "cluster", &child).await;

    let (status, _) = db.send(Method::DELETE, &format!("/api/signals/{signal}"), Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = db.send(Method::GET, &format!("/api/syntheses/{on_signal}"), Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = db.send(Method::DELETE, &format!("/api/clusters/{parent}"), Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    for gone in [format!("/api/syntheses/{on_child}"), format!("/api/clusters/{child}")] {
        let (status, _) = db.send(Method::GET, &gone, Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{gone}");
    }
    db.finish().await;
}

#[tokio::test]
async fn replaced_content_is_kept_in_history() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let signal = db.signal(&alice).await;
    let synthesis = db.synthesis(&alice, "signal", &signal).await;
    let uri = format!("/api/syntheses/{synthesis}");

    let (status, body) = db
        .send(Method::PATCH, &uri, Some(&alice.token), Some(json!({ "content": { "summary": "second" } })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"]["summary"], json!("second"));
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["history"][0]["content"]["summary"], json!("first"));

    let (_, body) = db
        .send(Method::PATCH, &uri, Some(&alice.token), Some(json!({ "content": { "summary": "second" } })))
        .await;
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 1);
    db.finish().await;
}

#[tokio::test]
async fn synthesis_targets_must_share_the_realm() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let bob = db.register("bob@example.com").await;
    let alices_signal = db.signal(&alice).await;

    let body = json!({
        "realmId": bob.realm,
        "polymorphicType": "signal",
        "polymorphicId": alices_signal,
        "content": {}
    });
    let (status, res) = db.send(Method::POST, "/api/syntheses", Some(&bob.token), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_field(&res), "polymorphic_id");
    db.finish().await;
}

#[tokio::test]
async fn other_realms_read_as_missing() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let bob = db.register("bob@example.com").await;
    let signal = db.signal(&alice).await;
    let uri = format!("/api/signals/{signal}");

    let (status, _) = db.send(Method::GET, &uri, Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = db
        .send(Method::PATCH, &uri, Some(&bob.token), Some(json!({ "title": "mine now" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = db.send(Method::DELETE, &uri, Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = db.send(Method::GET, "/api/signals", Some(&bob.token), None).await;
    assert_eq!(listed["meta"]["total"], json!(0));
    db.finish().await;
}

#[tokio::test]
async fn members_read_and_editors_write() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let bob = db.register("bob@example.com").await;
    let signal = db.signal(&alice).await;
    let members = format!("/api/realms/{}/members", alice.realm);
    let uri = format!("/api/signals/{signal}");
    let edit = json!({ "title": "edited" });

    db.create(&alice.token, &members, json!({ "userId": bob.id })).await;
    let (status, _) = db.send(Method::GET, &uri, Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = db.send(Method::PATCH, &uri, Some(&bob.token), Some(edit.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    db.create(&alice.token, &members, json!({ "userId": bob.id, "role": "editor" })).await;
    let (status, body) = db.send(Method::PATCH, &uri, Some(&bob.token), Some(edit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], json!("edited"));

    let (status, _) = db
        .send(Method::PATCH, &format!("/api/realms/{}", alice.realm), Some(&bob.token), Some(json!({ "name": "Taken" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    db.finish().await;
}

#[tokio::test]
async fn owners_keep_their_realm() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let bob = db.register("bob@example.com").await;
    let realm = format!("/api/realms/{}", alice.realm);

    let (status, body) = db
        .send(Method::PATCH, &realm, Some(&alice.token), Some(json!({ "ownerId": bob.id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_field(&body), "owner_id");
    let (status, body) = db.send(Method::GET, &realm, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ownerId"], json!(alice.id));

    // The same realm id in another spelling is not a move.
    let signal = db.signal(&alice).await;
    let (status, _) = db
        .send(
            Method::PATCH,
            &format!("/api/signals/{signal}"),
            Some(&alice.token),
            Some(json!({ "realmId": alice.realm.to_uppercase(), "title": "same realm" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    db.finish().await;
}

#[tokio::test]
async fn nearby_ranks_every_candidate() {
    let Some(db) = TestDb::start().await else { return };
    let alice = db.register("alice@example.com").await;
    let near = db
        .create(
            &alice.token,
            "/api/signals",
            json!({
                "realmId": alice.realm,
                "signalType": "note",
                "latitude": 52.0001,
                "longitude": 13.0,
                "occurredAt": "2001-01-01T00:00:00Z"
            }),
        )
        .await;

    // A full page of newer signals about 4.4 km away sorts ahead of the near one.
    let realm = Uuid::parse_str(&alice.realm).unwrap();
    sqlx::query(&format!(
        "INSERT INTO \"{}\".\"signals\" (id, realm_id, signal_type, latitude, longitude) \
         SELECT lpad(g::text, 26, '0'), $1, 'bulk', 52.04, 13.0 FROM generate_series(1, 1000) g",
        db.schema
    ))
    .bind(realm)
    .execute(&db.pool)
    .await
    .unwrap();

    let (status, body) = db
        .send(
            Method::GET,
            "/api/signals/nearby?lat=52.0&lon=13.0&radius_km=10&limit=1",
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], near["id"]);
    assert!(body["data"][0]["distanceKm"].as_f64().unwrap() < 0.1);
    db.finish().await;
}
