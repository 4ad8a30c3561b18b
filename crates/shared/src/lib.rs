//! Helpline Shared Types and Utilities
//!
//! This crate contains the call-request and chat domain types, errors, and
//! database helpers shared by the helpline services.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
