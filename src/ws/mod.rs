//! Core WebSocket infrastructure.
//!
//! This module provides a reconnecting, single-socket connection manager that can be
//! specialized for a backend by choosing the message type and its [`MessageParser`].
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Cloneable handle to a background task that owns the socket
//! - [`state::Machine`]: Pure lifecycle state machine driving (re)connection
//! - [`transport::Connector`]: Injected capability that opens links, backed by `tokio-tungstenite`
//! - [`MessageParser`]: Trait for parsing incoming text frames
//!
//! # Example
//!
//! ```ignore
//! // Define your message type
//! #[derive(Clone, Debug, Deserialize)]
//! struct MyMessage { /* ... */ }
//!
//! let connection = ConnectionManager::<MyMessage>::new(endpoint, Config::default(), JsonParser::default())?;
//! let status = connection.status_receiver();
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod transport;

pub use connection::{ConnectionManager, Delivery, Incoming};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use state::{ConnectionState, Status};
pub use traits::*;
