//! Realm tenancy: which realms a user can see, and what they may do in each.

use crate::domain::MemberRole;
use crate::error::AppError;
use crate::model::ResolvedModel;
use crate::service::CrudService;
use serde_json::{json, Map, Value};
use sqlx::PgExecutor;
use uuid::Uuid;

/// What a user may do in one realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealmAccess {
    Owner,
    Editor,
    Member,
}

impl RealmAccess {
    pub fn can_write(self) -> bool {
        matches!(self, RealmAccess::Owner | RealmAccess::Editor)
    }

    pub fn is_owner(self) -> bool {
        self == RealmAccess::Owner
    }

    fn from_row(user_id: Uuid, owner_id: Uuid, member_role: Option<&str>) -> Option<Self> {
        if owner_id == user_id {
            return Some(RealmAccess::Owner);
        }
        match member_role?.parse::<MemberRole>() {
            Ok(MemberRole::Editor) => Some(RealmAccess::Editor),
            _ => Some(RealmAccess::Member),
        }
    }
}

/// Realms the user owns or is a member of.
pub async fn accessible_realm_ids<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    user_id: Uuid,
) -> Result<Vec<Uuid>, AppError> {
    let sql = format!(
        "SELECT id FROM {} WHERE owner_id = $1 UNION SELECT realm_id FROM {} WHERE user_id = $1",
        model.table("realms"),
        model.table("realm_members")
    );
    tracing::debug!(sql = %sql, %user_id, "query");
    Ok(sqlx::query_scalar::<_, Uuid>(&sql).bind(user_id).fetch_all(exec).await?)
}

/// The user's access to `realm_id`; None when the realm does not exist or the user has no part in it.
pub async fn access<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    user_id: Uuid,
    realm_id: Uuid,
) -> Result<Option<RealmAccess>, AppError> {
    let sql = format!(
        "SELECT r.owner_id, m.role FROM {} r LEFT JOIN {} m ON m.realm_id = r.id AND m.user_id = $2 WHERE r.id = $1",
        model.table("realms"),
        model.table("realm_members")
    );
    let row: Option<(Uuid, Option<String>)> = sqlx::query_as(&sql)
        .bind(realm_id)
        .bind(user_id)
        .fetch_optional(exec)
        .await?;
    Ok(row.and_then(|(owner_id, role)| RealmAccess::from_row(user_id, owner_id, role.as_deref())))
}

pub async fn is_owner<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    user_id: Uuid,
    realm_id: Uuid,
) -> Result<bool, AppError> {
    Ok(access(exec, model, user_id, realm_id).await?.is_some_and(RealmAccess::is_owner))
}

/// Invisible realms are 404; visible ones without the needed right are 403.
pub async fn require<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    user_id: Uuid,
    realm_id: Uuid,
    allowed: fn(RealmAccess) -> bool,
) -> Result<RealmAccess, AppError> {
    match access(exec, model, user_id, realm_id).await? {
        None => Err(AppError::NotFound(format!("realm {}", realm_id))),
        Some(a) if allowed(a) => Ok(a),
        Some(_) => Err(AppError::Forbidden(format!("insufficient rights in realm {}", realm_id))),
    }
}

/// The oldest realm the user owns: the one new records land in when no realm is given.
pub async fn default_realm<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    user_id: Uuid,
) -> Result<Option<Uuid>, AppError> {
    let sql = format!(
        "SELECT id FROM {} WHERE owner_id = $1 ORDER BY created_at, id LIMIT 1",
        model.table("realms")
    );
    Ok(sqlx::query_scalar::<_, Uuid>(&sql).bind(user_id).fetch_optional(exec).await?)
}

pub async fn create_realm<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    owner_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<Value, AppError> {
    let entity = model
        .entity_by_path("realms")
        .ok_or_else(|| AppError::NotFound("realms".into()))?;
    let mut body = Map::new();
    body.insert("name".into(), json!(name));
    body.insert("owner_id".into(), json!(owner_id.to_string()));
    if let Some(d) = description {
        body.insert("description".into(), json!(d));
    }
    CrudService::create(exec, entity, &body).await
}

/// Members of a realm with their email and name, oldest first.
pub async fn list_members<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    realm_id: Uuid,
) -> Result<Vec<Value>, AppError> {
    let sql = format!(
        "SELECT m.id, m.realm_id, m.user_id, m.role, m.created_at, m.updated_at, u.email, u.name \
         FROM {} m JOIN {} u ON u.id = m.user_id WHERE m.realm_id = $1 ORDER BY m.created_at, m.id",
        model.table("realm_members"),
        model.table("users")
    );
    tracing::debug!(sql = %sql, %realm_id, "query");
    let rows = sqlx::query(&sql).bind(realm_id).fetch_all(exec).await?;
    rows.iter().map(crate::service::crud::row_to_json).collect()
}

/// Add a member, or change the role of an existing one.
pub async fn add_member<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    realm_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
) -> Result<Value, AppError> {
    let sql = format!(
        "INSERT INTO {} (realm_id, user_id, role) VALUES ($1, $2, $3) \
         ON CONFLICT (realm_id, user_id) DO UPDATE SET role = EXCLUDED.role, updated_at = NOW() \
         RETURNING id, realm_id, user_id, role, created_at, updated_at",
        model.table("realm_members")
    );
    tracing::debug!(sql = %sql, %realm_id, %user_id, "query");
    let row = sqlx::query(&sql)
        .bind(realm_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(exec)
        .await?;
    crate::service::crud::row_to_json(&row)
}

/// Remove a member. False when the user was not a member.
pub async fn remove_member<'c, E: PgExecutor<'c>>(
    exec: E,
    model: &ResolvedModel,
    realm_id: Uuid,
    user_id: Uuid,
) -> Result<bool, AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE realm_id = $1 AND user_id = $2",
        model.table("realm_members")
    );
    let done = sqlx::query(&sql).bind(realm_id).bind(user_id).execute(exec).await?;
    Ok(done.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_beats_membership() {
        let me = Uuid::new_v4();
        assert_eq!(RealmAccess::from_row(me, me, Some("member")), Some(RealmAccess::Owner));
    }

    #[test]
    fn member_roles() {
        let (me, owner) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(RealmAccess::from_row(me, owner, Some("editor")), Some(RealmAccess::Editor));
        assert_eq!(RealmAccess::from_row(me, owner, Some("member")), Some(RealmAccess::Member));
        assert_eq!(RealmAccess::from_row(me, owner, None), None);
        assert!(RealmAccess::Editor.can_write());
        assert!(!RealmAccess::Member.can_write());
        assert!(!RealmAccess::Editor.is_owner());
    }
}
