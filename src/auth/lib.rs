use anyhow::Result;
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use chrono::{Duration, Utc};
use libsql::Connection;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, is_unique_violation};
use crate::model::User;

#[derive(Debug, Clone, Deserialize)]
pub struct Register {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

/// Timestamps are stored in the same shape `strftime('%Y-%m-%dT%H:%M:%fZ')`
/// produces so they compare lexicographically.
fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("stored password hash is malformed: {}", e);
            false
        }
    }
}

pub fn new_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Only the digest of a session token is persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct Auth<'a> {
    conn: &'a Connection,
}

impl<'a> Auth<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn register(&self, input: Register) -> Result<User, AuthError> {
        let (email, password, name) = match (input.email, input.password, input.name) {
            (Some(e), Some(p), Some(n)) if !e.trim().is_empty() && !p.is_empty() => (e, p, n),
            _ => return Err(AuthError::Validation("All fields are required".to_string())),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Name cannot be empty".to_string()));
        }
        let email = email.trim().to_lowercase();

        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(&password)?;

        let query = r#"
            INSERT INTO users (email, name, password_hash)
            VALUES (?, ?, ?)
            RETURNING id, email, name, created_at
        "#;

        let mut rows = match self
            .conn
            .query(query, libsql::params![email.as_str(), name, password_hash])
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                let e = anyhow::Error::from(e);
                if is_unique_violation(&e) {
                    return Err(AuthError::EmailTaken);
                }
                return Err(e.into());
            }
        };

        match rows.next().await? {
            Some(row) => Ok(Self::row_to_user(&row)?),
            None => Err(AuthError::Store(anyhow::anyhow!("Failed to create user"))),
        }
    }

    /// Check credentials and open a session. Returns the user and the raw
    /// bearer token; only its hash is stored.
    pub async fn login(&self, input: Login, ttl: Duration) -> Result<(User, String), AuthError> {
        let email = input.email.trim().to_lowercase();

        let query = r#"
            SELECT id, email, name, created_at, password_hash
            FROM users WHERE email = ?
        "#;
        let mut rows = self.conn.query(query, libsql::params![email]).await?;

        let Some(row) = rows.next().await? else {
            return Err(AuthError::InvalidCredentials);
        };

        let password_hash: String = row.get(4)?;
        if !verify_password(&input.password, &password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let user = Self::row_to_user(&row)?;
        let token = new_token();
        let expires_at = timestamp(Utc::now() + ttl);

        self.conn
            .execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?, ?, ?)",
                libsql::params![hash_token(&token), user.id, expires_at],
            )
            .await?;

        Ok((user, token))
    }

    pub async fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        let query = r#"
            SELECT users.id, users.email, users.name, users.created_at
            FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.token_hash = ? AND sessions.expires_at > ?
        "#;

        let mut rows = self
            .conn
            .query(query, libsql::params![hash_token(token), timestamp(Utc::now())])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_user(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        let query = "SELECT id, email, name, created_at FROM users WHERE id = ?";
        let mut rows = self.conn.query(query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_user(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, name, created_at FROM users WHERE email = ?";
        let mut rows = self.conn.query(query, libsql::params![email]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_user(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn logout(&self, token: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE token_hash = ?",
                libsql::params![hash_token(token)],
            )
            .await?;
        Ok(deleted > 0)
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?",
                libsql::params![timestamp(Utc::now())],
            )
            .await?;
        Ok(deleted)
    }

    fn row_to_user(row: &libsql::Row) -> Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
