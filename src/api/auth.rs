//! Admin authentication
//!
//! A single shared admin password exchanged for short-lived session tokens.
//! Every state-changing request, over HTTP or WebSocket, is checked against
//! an [`AdminGate`] before it reaches the vote hub.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{Error, Result};
use super::identity::cookie_value;

/// Cookie carrying the admin session token
pub const SESSION_COOKIE: &str = "livevote_session";

const TOKEN_LEN: usize = 32;

/// Decides whether a caller may change round state
#[async_trait]
pub trait AdminGate: Send + Sync {
    /// True if `token` belongs to a live admin session
    async fn is_authorized(&self, token: Option<&str>) -> bool;
}

/// Password login with in-memory session tokens
pub struct SessionGate {
    password: String,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Instant>>,
}

impl SessionGate {
    /// Create a gate for the shared admin password
    pub fn new(password: impl Into<String>, ttl: Duration) -> Self {
        Self {
            password: password.into(),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Exchange the admin password for a session token
    pub async fn login(&self, password: &str) -> Result<String> {
        if !passwords_match(password, &self.password) {
            tracing::warn!("Rejected admin login with wrong password");
            return Err(Error::Unauthorized);
        }

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        sessions.retain(|_, expires| *expires > now);
        sessions.insert(token.clone(), now + self.ttl);
        tracing::info!("Admin logged in ({} active sessions)", sessions.len());

        Ok(token)
    }

    /// End a session. Returns false if the token was unknown.
    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Session lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl AdminGate for SessionGate {
    async fn is_authorized(&self, token: Option<&str>) -> bool {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return false,
        };

        let sessions = self.sessions.read().await;
        match sessions.get(token) {
            Some(expires) => *expires > Instant::now(),
            None => false,
        }
    }
}

/// Pull a session token from `Authorization: Bearer ...` or the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    cookie_value(headers, SESSION_COOKIE)
}

/// Compare without bailing out on the first differing byte
fn passwords_match(given: &str, expected: &str) -> bool {
    let given = given.as_bytes();
    let expected = expected.as_bytes();
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_login_and_authorize() {
        let gate = SessionGate::new("secret", Duration::from_secs(60));

        assert!(matches!(gate.login("wrong").await, Err(Error::Unauthorized)));

        let token = gate.login("secret").await.unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(gate.is_authorized(Some(&token)).await);
        assert!(!gate.is_authorized(Some("forged")).await);
        assert!(!gate.is_authorized(None).await);

        assert!(gate.logout(&token).await);
        assert!(!gate.is_authorized(Some(&token)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires() {
        let gate = SessionGate::new("secret", Duration::from_secs(60));
        let token = gate.login("secret").await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!gate.is_authorized(Some(&token)).await);
    }

    #[test]
    fn test_token_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(session_token(&headers), Some("abc123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; livevote_session=xyz"));
        assert_eq!(session_token(&headers), Some("xyz".to_string()));

        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_password_compare() {
        assert!(passwords_match("hunter2", "hunter2"));
        assert!(!passwords_match("hunter3", "hunter2"));
        assert!(!passwords_match("hunter", "hunter2"));
    }
}
