//! Voter identity resolution
//!
//! Votes are deduplicated per identity. Depending on configuration the
//! identity is the client's network address (optionally taken from a
//! trusted reverse proxy header) or a per-browser session token kept in
//! a cookie.

use std::net::{IpAddr, SocketAddr};

use axum::http::{header, HeaderMap};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::IdentitySource;
use crate::model::VoterIdentity;

/// Cookie carrying the voter session token
pub const VOTER_COOKIE: &str = "livevote_voter";

const VOTER_TOKEN_LEN: usize = 24;
const MAX_VOTER_TOKEN_LEN: usize = 64;

/// Identity of a connecting client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVoter {
    pub voter: VoterIdentity,
    /// `Set-Cookie` value to return when a new session token was minted
    pub set_cookie: Option<String>,
}

/// Maps an incoming request to a voter identity
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver {
    source: IdentitySource,
    trust_forwarded_for: bool,
}

impl IdentityResolver {
    pub fn new(source: IdentitySource, trust_forwarded_for: bool) -> Self {
        Self { source, trust_forwarded_for }
    }

    /// Resolve the identity for a request from `peer`.
    /// `requested` is a session token the client supplied explicitly.
    pub fn resolve(
        &self,
        peer: SocketAddr,
        headers: &HeaderMap,
        requested: Option<&str>,
    ) -> ResolvedVoter {
        match self.source {
            IdentitySource::Address => {
                let addr = if self.trust_forwarded_for {
                    forwarded_address(headers).unwrap_or_else(|| peer.ip())
                } else {
                    peer.ip()
                };
                ResolvedVoter { voter: VoterIdentity::from(addr), set_cookie: None }
            }
            IdentitySource::Session => {
                let existing = requested
                    .map(str::to_string)
                    .or_else(|| cookie_value(headers, VOTER_COOKIE))
                    .filter(|token| is_valid_token(token));

                match existing {
                    Some(token) => ResolvedVoter {
                        voter: VoterIdentity::new(token),
                        set_cookie: None,
                    },
                    None => {
                        let token = new_voter_token();
                        tracing::debug!("Issued voter session for {}", peer);
                        ResolvedVoter {
                            set_cookie: Some(voter_cookie(&token)),
                            voter: VoterIdentity::new(token),
                        }
                    }
                }
            }
        }
    }
}

/// Read one cookie from the `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
}

/// `Set-Cookie` value for a voter session token
pub fn voter_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", VOTER_COOKIE, token)
}

/// First address in `X-Forwarded-For`, else `X-Real-IP`
fn forwarded_address(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_VOTER_TOKEN_LEN
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn new_voter_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VOTER_TOKEN_LEN)
        .map(char::from)
        .collect()
}
