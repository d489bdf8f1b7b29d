//! Authentication: Argon2 password hashes, HS256 session tokens, and the extractors that read them.

mod extract;
mod jwt;
mod password;

pub use extract::{clear_cookie, cookie_value, session_cookie, token_from_headers, AdminUser, AuthUser, AUTH_COOKIE};
pub use jwt::{Claims, JwtKeys};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
