//! HTTP middleware stack: bearer-token authentication, CORS and per-request
//! trace spans.

pub mod auth;
pub mod cors;
pub mod trace;

pub use auth::AuthUser;
