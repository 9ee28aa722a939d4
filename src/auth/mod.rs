//! Single-account authentication with stateless signed session cookies.
//!
//! Provides:
//! - The one configured credential pair, compared in constant time
//! - Session tokens: `base64url(claims) "." hex(HMAC-SHA256(secret, base64url(claims)))`
//!   with an embedded expiry, carried in an `HttpOnly` cookie
//!
//! ## Design Decisions
//! - No server-side session table. The signature and expiry are the whole
//!   session; logout clears the cookie on the client.
//! - HMAC via the `hmac`/`sha2` crates with `verify_slice` for constant-time
//!   signature comparison.
//! - Cookies are read from and written to an `axum_extra` `CookieJar`.

pub mod credential;
pub mod session;

pub use credential::Credential;
pub use session::{SessionClaims, SessionError, SessionSigner};
