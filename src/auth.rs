use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    config::Config,
    error::ApiError,
    models::{Role, User},
    users,
};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Bearer-token claims. Identity is derived from these per request; there is
/// no ambient session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::Internal(anyhow::anyhow!("failed hashing password: {err}")))
}

pub fn verify_password(password_hash: &str, password: &str) -> bool {
    let hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!("failed to parse password hash: {}", err);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

pub fn mint_token(user: &User, config: &Config) -> Result<String, ApiError> {
    let key = signing_key(config)?;
    let now = Utc::now();
    let claims = TokenClaims {
        sub: user.id,
        role: user.role,
        iat: now.timestamp(),
        exp: (now + Duration::days(config.token_ttl_days)).timestamp(),
    };
    claims
        .sign_with_key(&key)
        .map_err(|err| ApiError::Internal(anyhow::anyhow!("failed signing token: {err}")))
}

pub fn verify_token(token: &str, config: &Config) -> Result<TokenClaims, ApiError> {
    let key = signing_key(config)?;
    let claims: TokenClaims = token
        .verify_with_key(&key)
        .map_err(|_| ApiError::unauthorized("Invalid token"))?;

    let now = Utc::now().timestamp();
    if claims.iat > now {
        return Err(ApiError::unauthorized("Invalid token"));
    }
    if claims.exp < now {
        return Err(ApiError::unauthorized("Token expired"));
    }
    Ok(claims)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(raw_header) = headers.get(AUTHORIZATION) else {
        return Err(ApiError::unauthorized("Missing Authorization header"));
    };

    let Ok(value) = raw_header.to_str() else {
        return Err(ApiError::unauthorized("Invalid Authorization header"));
    };

    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized(
            "Authorization must use Bearer token",
        ));
    };

    Ok(token.trim().to_string())
}

/// Resolve the caller from the Authorization header. The user row is loaded
/// fresh so revoked accounts fail even with a live token.
pub fn current_user(
    conn: &Connection,
    headers: &HeaderMap,
    config: &Config,
) -> Result<User, ApiError> {
    let token = extract_bearer_token(headers)?;
    let claims = verify_token(&token, config)?;
    users::find_by_id(conn, claims.sub)?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))
}

pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ))
    }
}

pub fn validate_registration(username: &str, password: &str) -> Result<(), ApiError> {
    if username.trim().chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::validation(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters long"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

fn signing_key(config: &Config) -> Result<Hmac<Sha256>, ApiError> {
    Hmac::<Sha256>::new_from_slice(config.jwt_secret.as_bytes())
        .map_err(|err| ApiError::Internal(anyhow::anyhow!("invalid signing key: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            database_path: ":memory:".into(),
            jwt_secret: "test-secret".to_string(),
            jwt_secret_is_fallback: false,
            token_ttl_days: 30,
            default_page_limit: 10,
            max_page_limit: 100,
            scrape_base_url: "https://www.findhelp.org".to_string(),
        }
    }

    fn test_user(role: Role) -> User {
        User {
            id: 42,
            username: "casey".to_string(),
            password_hash: String::new(),
            full_name: None,
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter26").unwrap();
        assert!(verify_password(&hash, "hunter26"));
        assert!(!verify_password(&hash, "hunter27"));
        assert!(!verify_password("not a phc string", "hunter26"));
    }

    #[test]
    fn token_round_trip_preserves_identity() {
        let config = test_config();
        let token = mint_token(&test_user(Role::Admin), &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let config = test_config();
        let mut other = test_config();
        other.jwt_secret = "different".to_string();

        let token = mint_token(&test_user(Role::CaseManager), &other).unwrap();
        let err = verify_token(&token, &config).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut config = test_config();
        config.token_ttl_days = -1;
        let token = mint_token(&test_user(Role::CaseManager), &config).unwrap();
        let err = verify_token(&token, &config).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn bearer_extraction_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc");
    }

    #[test]
    fn role_gate_allows_listed_roles_only() {
        let admin = test_user(Role::Admin);
        let manager = test_user(Role::CaseManager);

        assert!(require_role(&admin, &[Role::Admin]).is_ok());
        assert!(require_role(&manager, &[Role::CaseManager, Role::Admin]).is_ok());
        assert!(matches!(
            require_role(&manager, &[Role::Admin]),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn registration_rules_enforce_minimum_lengths() {
        assert!(validate_registration("casey", "secret1").is_ok());
        assert!(validate_registration("ab", "secret1").is_err());
        assert!(validate_registration("casey", "abc").is_err());
    }
}
