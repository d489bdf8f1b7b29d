//! Accounts: registration, credential lookup, password fields on write, admin bootstrap.

use crate::auth::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::domain::Role;
use crate::error::{AppError, AuthError, FieldIssue};
use crate::model::ResolvedModel;
use crate::service::{realms, CrudService};
use serde_json::{json, Map, Value};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Name of the realm created for every new account.
pub const PERSONAL_REALM: &str = "Personal";

/// The fields needed to authenticate a user.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn record(row: (Uuid, String, String, String)) -> Result<UserRecord, AppError> {
    let (id, email, role, password_hash) = row;
    let role = role
        .parse::<Role>()
        .map_err(|e| AppError::BadRequest(format!("user {}: {}", id, e)))?;
    Ok(UserRecord {
        id,
        email,
        role,
        password_hash,
    })
}

pub async fn find_by_email<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    email: &str,
) -> Result<Option<UserRecord>, AppError> {
    let sql = format!(
        "SELECT id, email, role, password_hash FROM {} WHERE email = $1",
        model.table("users")
    );
    let row: Option<(Uuid, String, String, String)> = sqlx::query_as(&sql)
        .bind(normalize_email(email))
        .fetch_optional(exec)
        .await?;
    row.map(record).transpose()
}

/// Check credentials. Unknown email and wrong password are the same error.
pub async fn authenticate(
    pool: &PgPool,
    model: &ResolvedModel,
    email: &str,
    password: &str,
) -> Result<UserRecord, AppError> {
    let user = find_by_email(pool, model, email)
        .await?
        .ok_or(AuthError::BadCredentials)?;
    if !verify_password(password, &user.password_hash)? {
        return Err(AuthError::BadCredentials.into());
    }
    Ok(user)
}

/// Public row of one user (password hash stripped by the caller's presenter).
pub async fn find_row<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    user_id: Uuid,
) -> Result<Option<Value>, AppError> {
    let entity = model
        .entity_by_path("users")
        .ok_or_else(|| AppError::NotFound("users".into()))?;
    CrudService::read(exec, entity, &json!(user_id.to_string()), None).await
}

/// Create an account and its personal realm in one transaction. The very first account is an admin.
pub async fn register(
    pool: &PgPool,
    model: &ResolvedModel,
    email: &str,
    password: &str,
    name: Option<&str>,
    role: Option<Role>,
) -> Result<Value, AppError> {
    check_password(password).map_err(|i| AppError::Validation(vec![i]))?;
    let entity = model
        .entity_by_path("users")
        .ok_or_else(|| AppError::NotFound("users".into()))?;

    let mut tx = pool.begin().await?;
    sqlx::query(&format!(
        "LOCK TABLE {} IN SHARE ROW EXCLUSIVE MODE",
        model.table("users")
    ))
    .execute(&mut *tx)
    .await?;
    let has_users: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {})", model.table("users")))
        .fetch_one(&mut *tx)
        .await?;
    let role = role.unwrap_or(if has_users { Role::User } else { Role::Admin });

    let mut body = Map::new();
    body.insert("email".into(), json!(normalize_email(email)));
    body.insert("password_hash".into(), json!(hash_password(password)?));
    body.insert("role".into(), json!(role.as_str()));
    if let Some(n) = name.map(str::trim).filter(|n| !n.is_empty()) {
        body.insert("name".into(), json!(n));
    }
    let user = CrudService::create(&mut *tx, entity, &body).await?;
    let user_id = user
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
    realms::create_realm(&mut *tx, model, user_id, PERSONAL_REALM, None).await?;
    tx.commit().await?;

    tracing::info!(%user_id, role = role.as_str(), "registered user");
    Ok(user)
}

/// Ensure an admin account exists for `email`: promote it when present, register it otherwise.
pub async fn bootstrap_admin(pool: &PgPool, model: &ResolvedModel, email: &str, password: &str) -> Result<(), AppError> {
    match find_by_email(pool, model, email).await? {
        Some(user) if user.role == Role::Admin => {}
        Some(user) => {
            sqlx::query(&format!(
                "UPDATE {} SET role = $1, updated_at = NOW() WHERE id = $2",
                model.table("users")
            ))
            .bind(Role::Admin.as_str())
            .bind(user.id)
            .execute(pool)
            .await?;
            tracing::info!(user_id = %user.id, "promoted bootstrap user to admin");
        }
        None => {
            register(pool, model, email, password, None, Some(Role::Admin)).await?;
        }
    }
    Ok(())
}

pub fn check_password(password: &str) -> Result<(), FieldIssue> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FieldIssue::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// Remove a plaintext `password` from a user body before validation. Required on create.
pub fn take_password(body: &mut Map<String, Value>, creating: bool) -> Result<Option<String>, FieldIssue> {
    match body.remove("password") {
        None if creating => Err(FieldIssue::new("password", "is required")),
        None => Ok(None),
        Some(Value::String(p)) => check_password(&p).map(|_| Some(p)),
        Some(_) => Err(FieldIssue::new("password", "must be a string")),
    }
}

/// Store the Argon2 hash of a password taken by `take_password`, and normalize the email.
pub fn apply_password(body: &mut Map<String, Value>, password: Option<String>) -> Result<(), AppError> {
    if let Some(Value::String(email)) = body.get_mut("email") {
        *email = normalize_email(email);
    }
    if let Some(p) = password {
        body.insert("password_hash".into(), Value::String(hash_password(&p)?));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_taken_out_of_the_body() {
        let mut body = json!({ "email": " A@Example.com ", "password": "long-enough" })
            .as_object()
            .cloned()
            .unwrap();
        let pw = take_password(&mut body, true).unwrap();
        assert!(!body.contains_key("password"));
        apply_password(&mut body, pw).unwrap();
        assert_eq!(body["email"], json!("a@example.com"));
        assert!(body["password_hash"].as_str().unwrap().starts_with("$argon2id$"));
    }

    #[test]
    fn password_rules() {
        let mut empty = Map::new();
        assert_eq!(take_password(&mut empty, true).unwrap_err().message, "is required");
        assert_eq!(take_password(&mut empty, false).unwrap(), None);
        let mut short = json!({ "password": "short" }).as_object().cloned().unwrap();
        assert!(take_password(&mut short, false).is_err());
        let mut wrong = json!({ "password": 12345678 }).as_object().cloned().unwrap();
        assert_eq!(take_password(&mut wrong, false).unwrap_err().message, "must be a string");
    }
}
