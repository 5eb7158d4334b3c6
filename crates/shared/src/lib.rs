//! Shared types for the QG FURIOSO realtime client and its test servers.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
