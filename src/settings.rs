//! Runtime settings from environment variables (after `.env` is loaded by main).

use crate::error::SettingsError;
use crate::model::is_identifier;
use std::net::SocketAddr;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/autonomy";
pub const DEFAULT_SCHEMA: &str = "autonomy";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const MIN_JWT_SECRET_LEN: usize = 32;
const DEV_JWT_SECRET: &str = "autonomy-dev-secret-do-not-use-in-production";

#[derive(Clone, Debug)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub token_ttl_secs: u64,
    pub cookie_secure: bool,
    pub schema: String,
    pub body_limit_bytes: usize,
    pub admin: Option<AdminBootstrap>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("bind_addr", &self.bind_addr)
            .field("db_max_connections", &self.db_max_connections)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("cookie_secure", &self.cookie_secure)
            .field("schema", &self.schema)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dev = parse_bool("AUTONOMY_DEV", var("AUTONOMY_DEV"))?.unwrap_or(false);
        let jwt_secret = match var("JWT_SECRET") {
            Some(s) if s.len() >= MIN_JWT_SECRET_LEN => s,
            Some(_) => {
                return Err(SettingsError::Invalid {
                    key: "JWT_SECRET",
                    message: format!("must be at least {} characters", MIN_JWT_SECRET_LEN),
                })
            }
            None if dev => DEV_JWT_SECRET.to_string(),
            None => return Err(SettingsError::Missing("JWT_SECRET")),
        };

        let bind_addr = match var("BIND_ADDR") {
            Some(s) => s.parse().map_err(|e: std::net::AddrParseError| SettingsError::Invalid {
                key: "BIND_ADDR",
                message: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let schema = var("AUTONOMY_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        if !is_identifier(&schema) {
            return Err(SettingsError::Invalid {
                key: "AUTONOMY_SCHEMA",
                message: "must be a lowercase SQL identifier".into(),
            });
        }

        let admin = match (var("AUTONOMY_ADMIN_EMAIL"), var("AUTONOMY_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(SettingsError::Missing("AUTONOMY_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(SettingsError::Missing("AUTONOMY_ADMIN_EMAIL")),
        };

        let db_max_connections = parse_num("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"))?.unwrap_or(5);
        if db_max_connections == 0 {
            return Err(SettingsError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                message: "must be positive".into(),
            });
        }

        Ok(Settings {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            jwt_secret,
            bind_addr,
            db_max_connections,
            token_ttl_secs: parse_num("TOKEN_TTL_SECS", var("TOKEN_TTL_SECS"))?.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
            cookie_secure: parse_bool("COOKIE_SECURE", var("COOKIE_SECURE"))?.unwrap_or(false),
            schema,
            body_limit_bytes: parse_num("BODY_LIMIT_BYTES", var("BODY_LIMIT_BYTES"))?.unwrap_or(1024 * 1024),
            admin,
        })
    }
}

fn parse_bool(key: &'static str, raw: Option<String>) -> Result<Option<bool>, SettingsError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(None),
        Some("1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some("0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(other) => Err(SettingsError::Invalid {
            key,
            message: format!("expected a boolean, got {:?}", other),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, SettingsError>
where
    T::Err: std::fmt::Display,
{
    raw.map(|s| {
        s.parse::<T>().map_err(|e| SettingsError::Invalid {
            key,
            message: e.to_string(),
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults() {
        let s = settings(&[("JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(s.db_max_connections, 5);
        assert_eq!(s.token_ttl_secs, 604_800);
        assert!(!s.cookie_secure);
        assert_eq!(s.schema, "autonomy");
        assert_eq!(s.body_limit_bytes, 1_048_576);
        assert!(s.admin.is_none());
    }

    #[test]
    fn jwt_secret_required_unless_dev() {
        assert!(matches!(settings(&[]), Err(SettingsError::Missing("JWT_SECRET"))));
        assert!(matches!(
            settings(&[("JWT_SECRET", "short")]),
            Err(SettingsError::Invalid { key: "JWT_SECRET", .. })
        ));
        assert!(settings(&[("AUTONOMY_DEV", "true")]).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(settings(&[("JWT_SECRET", SECRET), ("COOKIE_SECURE", "maybe")]).is_err());
        assert!(settings(&[("JWT_SECRET", SECRET), ("TOKEN_TTL_SECS", "-1")]).is_err());
        assert!(settings(&[("JWT_SECRET", SECRET), ("AUTONOMY_SCHEMA", "Bad-Schema")]).is_err());
        assert!(settings(&[("JWT_SECRET", SECRET), ("AUTONOMY_ADMIN_EMAIL", "a@b.c")]).is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let s = settings(&[("JWT_SECRET", SECRET)]).unwrap();
        assert!(!format!("{:?}", s).contains(SECRET));
    }
}
