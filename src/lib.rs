//! Per-user JSON state persistence over HTTP.
//!
//! A client logs in with the single configured credential, receives a signed
//! session cookie, then loads and replaces one JSON document stored on disk
//! under its sanitized username.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod storage;

pub use config::Config;
pub use gateway::{build_router, run_gateway, AppState};
