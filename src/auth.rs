use argon2::password_hash::{
    rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier,
    SaltString,
};
use argon2::Argon2;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::BackendError;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("email confirmation required before signing in")]
    ConfirmationRequired,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(BackendError::Sqlite(e))
    }
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailTaken => "email_taken",
            Self::Validation(_) => "bad_params",
            Self::ConfirmationRequired => "confirmation_required",
            Self::Hash(_) => "auth_failed",
            Self::Backend(_) => "backend_failed",
        }
    }
}

/// Normalizes the email and applies the form rules shared by both providers.
pub fn validate_credentials(email: &str, password: &str) -> Result<String, AuthError> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::Validation("a valid email is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(email)
}

pub trait AuthProvider {
    fn sign_up(&mut self, email: &str, password: &str) -> Result<Session, AuthError>;
    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, AuthError>;
    fn sign_out(&mut self, session: &Session) -> Result<(), AuthError>;
}

/// Accounts kept in the workspace database next to the classroom tables.
pub struct LocalAuth {
    conn: Connection,
}

impl LocalAuth {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn issue(user: User) -> Session {
        Session {
            user,
            access_token: Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
        }
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

fn verify_password(expected_hash: &str, candidate: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(expected_hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(AuthError::Hash(e.to_string())),
    }
}

impl AuthProvider for LocalAuth {
    fn sign_up(&mut self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = validate_credentials(email, password)?;
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
            .optional()?;
        if exists.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
        };
        let hash = hash_password(password)?;
        self.conn.execute(
            "INSERT INTO users(id, email, password_hash, created_at) VALUES(?, ?, ?, ?)",
            (
                &user.id,
                &user.email,
                &hash,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        )?;
        info!(user_id = %user.id, "local account created");
        Ok(Self::issue(user))
    }

    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE email = ?",
                [&email],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((id, hash)) = row else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(&hash, password)? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Self::issue(User { id, email }))
    }

    fn sign_out(&mut self, _session: &Session) -> Result<(), AuthError> {
        Ok(())
    }
}

/// GoTrue-compatible hosted auth (`/auth/v1/...`).
pub struct RestAuth {
    base_url: String,
    anon_key: String,
    agent: ureq::Agent,
}

impl RestAuth {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            agent: ureq::Agent::new(),
        }
    }

    fn post(&self, path: &str, bearer: Option<&str>, body: &Value) -> Result<Value, AuthError> {
        let url = format!("{}/auth/v1/{}", self.base_url, path);
        let req = self
            .agent
            .post(&url)
            .set("apikey", &self.anon_key)
            .set(
                "Authorization",
                &format!("Bearer {}", bearer.unwrap_or(&self.anon_key)),
            )
            .set("Content-Type", "application/json");
        match req.send_string(&body.to_string()) {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
            }
            Err(ureq::Error::Status(status, resp)) => {
                let message = resp
                    .into_string()
                    .ok()
                    .and_then(|t| crate::backend::rest_error_message(&t))
                    .unwrap_or_else(|| "request rejected".to_string());
                if status == 400 && message.to_ascii_lowercase().contains("invalid") {
                    return Err(AuthError::InvalidCredentials);
                }
                if status == 422 && message.to_ascii_lowercase().contains("already") {
                    return Err(AuthError::EmailTaken);
                }
                Err(BackendError::Http { status, message }.into())
            }
            Err(e) => Err(BackendError::Transport(e.to_string()).into()),
        }
    }
}

/// Reads `{access_token, user: {id, email}}` out of a GoTrue response.
pub(crate) fn session_from_body(body: &Value) -> Option<Session> {
    let token = body.get("access_token")?.as_str()?;
    let user = body.get("user")?;
    Some(Session {
        user: User {
            id: user.get("id")?.as_str()?.to_string(),
            email: user
                .get("email")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        access_token: token.to_string(),
        issued_at: Utc::now(),
    })
}

impl AuthProvider for RestAuth {
    fn sign_up(&mut self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = validate_credentials(email, password)?;
        let body = self.post("signup", None, &json!({ "email": email, "password": password }))?;
        session_from_body(&body).ok_or(AuthError::ConfirmationRequired)
    }

    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let body = self.post(
            "token?grant_type=password",
            None,
            &json!({ "email": email, "password": password }),
        )?;
        session_from_body(&body).ok_or(AuthError::InvalidCredentials)
    }

    fn sign_out(&mut self, session: &Session) -> Result<(), AuthError> {
        self.post("logout", Some(&session.access_token), &json!({}))?;
        Ok(())
    }
}

/// Current session plus the provider that issued it.
#[derive(Default)]
pub struct SessionHolder {
    provider: Option<Box<dyn AuthProvider>>,
    session: Option<Session>,
}

impl SessionHolder {
    pub fn set_provider(&mut self, provider: Box<dyn AuthProvider>) {
        self.provider = Some(provider);
        self.session = None;
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.access_token.as_str())
    }

    fn provider(&mut self) -> Result<&mut Box<dyn AuthProvider>, AuthError> {
        self.provider
            .as_mut()
            .ok_or_else(|| AuthError::Validation("select a workspace first".to_string()))
    }

    pub fn sign_up(&mut self, email: &str, password: &str) -> Result<&User, AuthError> {
        let session = self.provider()?.sign_up(email, password)?;
        Ok(&self.session.insert(session).user)
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<&User, AuthError> {
        let session = self.provider()?.sign_in(email, password)?;
        info!(user_id = %session.user.id, "signed in");
        Ok(&self.session.insert(session).user)
    }

    /// Always ends the local session; a provider failure is only logged.
    pub fn sign_out(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Some(provider) = self.provider.as_mut() {
            if let Err(e) = provider.sign_out(&session) {
                warn!(error = %e, "provider sign-out failed");
            }
        }
        info!(user_id = %session.user.id, "signed out");
    }
}
