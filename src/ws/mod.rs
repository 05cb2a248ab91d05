//! Outbound WebSocket fan-out: connection management plus bearer-token auth.

pub mod auth;
pub mod manager;

pub use auth::WsAuth;
pub use manager::{WsManager, WsManagerStats};
