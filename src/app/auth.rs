use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sqlx::Row;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::domain::user::User;
use crate::infra::db::{is_unique_violation, Db};

const TOKEN_ISSUER: &str = "larder";
const TOKEN_TYPE: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub token_id: Uuid,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub token_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// Encrypts and verifies session tokens. Holds no database handle.
#[derive(Clone)]
pub struct SessionTokens {
    key: [u8; 32],
    ttl_minutes: u64,
}

impl SessionTokens {
    pub fn new(key: [u8; 32], ttl_minutes: u64) -> Self {
        Self { key, ttl_minutes }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_minutes * 60
    }

    pub fn issue(&self, user_id: Uuid) -> Result<IssuedSession> {
        let token_id = Uuid::new_v4();
        let duration = std::time::Duration::from_secs(self.ttl_seconds());
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.token_identifier(&token_id.to_string())?;
        claims.add_additional("typ", TOKEN_TYPE)?;

        let key = SymmetricKey::<V4>::from(&self.key)?;
        let token = local::encrypt(&key, &claims, None, None)?;
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(self.ttl_minutes as i64);

        Ok(IssuedSession {
            token,
            token_id,
            expires_at,
        })
    }

    /// Returns `None` for anything that is not a live token minted with our key.
    pub fn verify(&self, token: &str) -> Result<Option<AuthSession>> {
        let key = SymmetricKey::<V4>::from(&self.key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let claims = match trusted.payload_claims() {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if claim_str(claims, "typ") != Some(TOKEN_TYPE) {
            return Ok(None);
        }

        let user_id = claim_uuid(claims, "sub")?;
        let token_id = claim_uuid(claims, "jti")?;
        let expires_at = claim_str(claims, "exp")
            .ok_or_else(|| anyhow!("missing exp claim"))
            .and_then(|value| Ok(OffsetDateTime::parse(value, &Rfc3339)?))?;

        Ok(Some(AuthSession {
            user_id,
            token_id,
            expires_at,
        }))
    }
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    tokens: SessionTokens,
}

impl AuthService {
    pub fn new(db: Db, tokens: SessionTokens) -> Self {
        Self { db, tokens }
    }

    pub async fn register(
        &self,
        name: String,
        email: String,
        password: String,
    ) -> ServiceResult<(User, IssuedSession)> {
        let password_hash = hash_password(&password)?;
        let row = sqlx::query(
            "INSERT INTO users (name, email, password_hash) \
             VALUES ($1, $2, $3) \
             RETURNING id, name, email, avatar, bio, created_at",
        )
        .bind(name.trim())
        .bind(normalize_email(&email))
        .bind(password_hash)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "users_email_key") {
                ServiceError::conflict("user already exists, please sign in")
            } else {
                ServiceError::from(err)
            }
        })?;

        let user = User {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            avatar: row.get("avatar"),
            bio: row.get("bio"),
            followers: Vec::new(),
            following: Vec::new(),
            favorites: Vec::new(),
            online: false,
            created_at: row.get("created_at"),
        };

        let session = self.tokens.issue(user.id)?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok((user, session))
    }

    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<Option<IssuedSession>> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(self.db.pool())
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: Uuid = row.get("id");
        let password_hash: String = row.get("password_hash");
        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        Ok(Some(self.tokens.issue(user_id)?))
    }

    pub async fn logout(&self, session: &AuthSession) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO revoked_sessions (token_id, expires_at) VALUES ($1, $2) \
             ON CONFLICT (token_id) DO NOTHING",
        )
        .bind(session.token_id)
        .bind(session.expires_at)
        .execute(self.db.pool())
        .await?;

        sqlx::query("DELETE FROM revoked_sessions WHERE expires_at < now()")
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn authenticate(&self, token: &str) -> ServiceResult<Option<AuthSession>> {
        let session = match self.tokens.verify(token)? {
            Some(session) => session,
            None => return Ok(None),
        };

        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM revoked_sessions WHERE token_id = $1)",
        )
        .bind(session.token_id)
        .fetch_one(self.db.pool())
        .await?;

        if revoked {
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let password_hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(self.db.pool())
                .await?;

        let password_hash = password_hash.ok_or_else(|| ServiceError::not_found("user not found"))?;
        if !verify_password(current_password, &password_hash)? {
            return Err(ServiceError::unauthorized("current password is incorrect"));
        }

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(hash_password(new_password)?)
            .execute(self.db.pool())
            .await?;

        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn claim_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get_claim(name).and_then(|value| value.as_str())
}

fn claim_uuid(claims: &Claims, name: &str) -> Result<Uuid> {
    let value = claim_str(claims, name).ok_or_else(|| anyhow!("missing {} claim", name))?;
    Ok(Uuid::parse_str(value)?)
}
