//! PawnHub client library.
//!
//! Connection handling for the two-player chess client: one WebSocket to the
//! match server, typed message dispatch and the session state it maintains.

pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod ws;

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};

pub use config::ClientConfig;
pub use error::ClientError;
pub use pawnhub_shared as shared;
pub use session::{Session, SessionState, SessionStore};
pub use ws::{Connection, ConnectionState, HandlerRegistry, Subscription};

static SESSION: Lazy<Arc<Session>> = Lazy::new(|| Arc::new(Session::new()));

static CONNECTION: OnceCell<Connection> = OnceCell::new();

/// The process-wide session backing [`connection`].
pub fn session() -> Arc<Session> {
    SESSION.clone()
}

/// The process-wide connection, created from the environment on first use.
pub fn connection() -> &'static Connection {
    CONNECTION.get_or_init(|| Connection::new(ClientConfig::from_env(), session()))
}

/// Install the process-wide connection with an explicit configuration.
///
/// Returns `false` if it was already created.
pub fn init_connection(config: ClientConfig) -> bool {
    CONNECTION
        .set(Connection::new(config, session()))
        .is_ok()
}
