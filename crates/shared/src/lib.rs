//! Shared types for the PawnHub chess client: wire protocol, position
//! parsing and protocol errors.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
