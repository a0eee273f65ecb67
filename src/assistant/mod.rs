//! Client for a voice/text virtual-assistant backend.
//!
//! The backend speaks JSON over a single WebSocket. Finalized transcripts go up wrapped as
//! `{"transcibed_text": ...}` (the field name is part of the wire format), raw audio goes up
//! as binary frames, and the backend streams [`InboundEvent`]s back.
//!
//! # Example
//!
//! ```rust, no_run
//! use assistant_link::assistant::{Client, ReplyBuffer};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::default();
//!     let mut replies = Box::pin(client.replies());
//!     let mut buffer = ReplyBuffer::new();
//!
//!     client.send_text("hello")?;
//!     while let Some(reply) = replies.next().await {
//!         if buffer.apply(&reply?) {
//!             println!("{}", buffer.text());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod endpoint;
pub mod reply;
pub mod transcript;
pub mod types;

pub use client::Client;
pub use endpoint::Endpoint;
pub use reply::{Reply, ReplyBuffer};
pub use transcript::TranscriptGate;
pub use types::request::TranscribedText;
pub use types::response::{InboundEvent, Msg};
