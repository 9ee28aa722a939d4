use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cookie::time::Duration as CookieDuration;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// What a session token asserts: who is logged in and until when.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionClaims {
    /// Authenticated username.
    pub sub: String,
    /// Expiry as Unix epoch seconds.
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("invalid session signature")]
    InvalidSignature,
    #[error("session expired")]
    Expired,
    #[error("session key rejected: {0}")]
    Key(String),
}

/// Issues and verifies signed session tokens and builds the session cookie.
#[derive(Clone)]
pub struct SessionSigner {
    /// Keyed once at construction; cloned per token.
    mac: HmacSha256,
    ttl: Duration,
    cookie_name: String,
    cookie_secure: bool,
}

impl SessionSigner {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, SessionError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| SessionError::Key(e.to_string()))?;
        Ok(Self {
            mac,
            ttl,
            cookie_name: "session".into(),
            cookie_secure: false,
        })
    }

    pub fn with_cookie(mut self, name: &str, secure: bool) -> Self {
        self.cookie_name = name.to_owned();
        self.cookie_secure = secure;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn issue(&self, username: &str) -> String {
        self.issue_at(username, epoch_secs())
    }

    fn issue_at(&self, username: &str, now: u64) -> String {
        let claims = serde_json::json!({
            "sub": username,
            "exp": now.saturating_add(self.ttl.as_secs()),
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signature = hex::encode(self.mac(payload.as_bytes()).finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, epoch_secs())
    }

    fn verify_at(&self, token: &str, now: u64) -> Result<SessionClaims, SessionError> {
        let (payload, signature) = token.split_once('.').ok_or(SessionError::Malformed)?;
        let expected = hex::decode(signature).map_err(|_| SessionError::Malformed)?;

        // Signature first: never parse attacker-controlled claims before this.
        self.mac(payload.as_bytes())
            .verify_slice(&expected)
            .map_err(|_| SessionError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| SessionError::Malformed)?;

        if now >= claims.exp {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac
    }

    /// Cookie establishing the session, to be added to the response jar.
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::seconds(max_age))
            .build()
    }

    /// Empty, already-expired session cookie. Added to the jar rather than
    /// passed to `CookieJar::remove`, which stays silent when the request
    /// carried no session cookie.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }

    /// Verified claims from the request's session cookie, if any.
    ///
    /// RFC 6265 allows the value to be wrapped in double quotes.
    pub fn claims_from_jar(&self, jar: &CookieJar) -> Option<SessionClaims> {
        let cookie = jar.get(&self.cookie_name)?;
        let token = cookie.value_trimmed();
        if token.is_empty() {
            return None;
        }
        match self.verify(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("Rejected session cookie: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl", &self.ttl)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
