//! Helpline API Library
//!
//! Realtime staff call queue and support chat: presence tracking, the call
//! request lifecycle, chat relay, and the HTTP/WebSocket surface around them.

pub mod auth;
pub mod calls;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod presence;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
