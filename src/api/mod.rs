//! HTTP API Module
//!
//! REST and WebSocket front end: admin sessions, voter identity and the
//! live event stream.

pub mod auth;
pub mod identity;
mod http;
mod ws;

pub use auth::{AdminGate, SessionGate};
pub use http::{AppState, HttpServer};
pub use identity::IdentityResolver;
