//! heartbeat-api - keeps bot entitlements alive against the Cfx.re validation service
//!
//! A single `POST /heartbeat` endpoint decides, per bot, whether a new
//! session ticket or an entitlement re-validation is due, performs the call
//! and records the outcome.
//!
//! # Features
//!
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `mysql` - MySQL database backend.
//!
//! # Example
//!
//! ```toml
//! # Defaults (sqlite)
//! heartbeat-api = { path = "." }
//!
//! # MySQL only
//! heartbeat-api = { path = ".", default-features = false, features = ["mysql"] }
//! ```

pub mod config;
pub mod errors;
pub mod timestamps;

#[path = "server/mod.rs"]
pub mod server;
