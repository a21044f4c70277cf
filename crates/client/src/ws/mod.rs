//! WebSocket module for real-time play against the match server.
//!
//! This module provides:
//! - [`Connection`]: one socket with resume-on-drop
//! - [`HandlerRegistry`]: per-message-type callbacks, run in registration order
//!
//! # Usage
//!
//! ```rust,ignore
//! let connection = pawnhub_client::connection();
//! connection.prepare().await?;
//! connection.send_connect_request("host-id", "42")?;
//!
//! let sub = connection.on(MessageKind::ReceiveMove, |msg| println!("{msg:?}"));
//! // later
//! sub.unsubscribe();
//! ```

mod connection;
mod registry;

pub use connection::{Connection, ConnectionState};
pub use registry::{Handler, HandlerRegistry, Subscription};
