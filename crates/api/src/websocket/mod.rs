//! Realtime gateway
//!
//! # Architecture
//!
//! - **Connection**: one live client and its outbound channel
//! - **State**: every live connection plus the presence registry, with
//!   targeted delivery (one connection, all staff, one staff identity, everyone)
//! - **Gateway**: dispatches each inbound event to the call queue or chat router
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod connection;
pub mod events;
pub mod gateway;
pub mod handler;
pub mod state;

pub use handler::ws_handler;
pub use state::WebSocketState;
