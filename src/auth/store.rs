//! SQLite-backed user and session store.
//!
//! Access and refresh tokens are encrypted with [`TokenCipher`] before they
//! touch disk. The connection sits behind a mutex so the store can be shared
//! by concurrent requests.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use super::crypto::{CryptoError, TokenCipher};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT NOT NULL PRIMARY KEY,
    email   TEXT NOT NULL,
    name    TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS sessions (
    session_id    TEXT NOT NULL PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    access_token  TEXT NOT NULL,
    refresh_token TEXT,
    expires_at    TEXT NOT NULL
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Token encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(String),

    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

/// A stored login session with decrypted tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

pub struct SessionStore {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl SessionStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path, cipher: TokenCipher) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!("Opened session store at {}", path.display());
        Self::init(conn, cipher)
    }

    pub fn open_in_memory(cipher: TokenCipher) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, cipher)
    }

    fn init(conn: Connection, cipher: TokenCipher) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        if !cipher.is_enabled() {
            tracing::warn!("No encryption key configured, OAuth tokens will be stored as plaintext");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or update a user.
    pub fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO users (user_id, email, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET email = excluded.email, name = excluded.name",
            params![user.user_id, user.email, user.name],
        )?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let user = self
            .conn()?
            .query_row(
                "SELECT user_id, email, name FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Create a session with a random id.
    pub fn create_session(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at,
        };
        self.put_session(&session)?;
        Ok(session)
    }

    /// Insert or replace a session under its own id.
    pub fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        let access = self.cipher.encrypt(&session.access_token)?;
        let refresh = session
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        self.conn()?.execute(
            "INSERT OR REPLACE INTO sessions (session_id, user_id, access_token, refresh_token, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.session_id,
                session.user_id,
                access,
                refresh,
                session.expires_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT session_id, user_id, access_token, refresh_token, expires_at
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((session_id, user_id, access, refresh, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| StoreError::Timestamp(format!("{}: {}", expires_at, e)))?
            .with_timezone(&Utc);

        Ok(Some(Session {
            session_id,
            user_id,
            access_token: self.cipher.decrypt(&access)?,
            refresh_token: refresh.map(|t| self.cipher.decrypt(&t)).transpose()?,
            expires_at,
        }))
    }

    /// Replace the access token after a refresh. Google may rotate the
    /// refresh token; `None` keeps the stored one.
    pub fn update_tokens(
        &self,
        session_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let access = self.cipher.encrypt(access_token)?;
        let refresh = refresh_token.map(|t| self.cipher.encrypt(t)).transpose()?;

        let updated = self.conn()?.execute(
            "UPDATE sessions
             SET access_token = ?2, refresh_token = COALESCE(?3, refresh_token), expires_at = ?4
             WHERE session_id = ?1",
            params![session_id, access, refresh, expires_at.to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        Ok(deleted > 0)
    }
}
