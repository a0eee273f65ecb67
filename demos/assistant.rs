//! Interactive assistant session.
//!
//! Reads lines from stdin, sends each as a finalized transcript and prints the assistant's
//! reply as it streams in. Connection status changes are logged as they happen.
//!
//! Run against a local backend with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example assistant --features tracing -- ws://localhost:8000/ws/device english
//! ```

use assistant_link::assistant::endpoint::{DEFAULT_BASE, DEFAULT_LANGUAGE};
use assistant_link::assistant::{Client, Endpoint, Reply, ReplyBuffer};
use assistant_link::ws::config::Config;
use futures::StreamExt as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let base = args.next().unwrap_or_else(|| DEFAULT_BASE.to_owned());
    let language = args.next().unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned());

    let endpoint = Endpoint::new(&base, &language)?;
    info!(%endpoint, "Starting assistant session");
    let client = Client::new(endpoint, Config::default())?;

    let mut status = client.status_receiver();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match &current.last_error {
                Some(error) => warn!(state = ?current.state, retries = current.retries, %error),
                None => info!(state = ?current.state, retries = current.retries),
            }
            if current.state.is_terminal() {
                break;
            }
        }
    });

    let mut replies = Box::pin(client.replies());
    tokio::spawn(async move {
        let mut buffer = ReplyBuffer::new();
        while let Some(reply) = replies.next().await {
            match reply {
                Ok(Reply::Structured(value)) => info!(structured = %value),
                Ok(reply) => {
                    if buffer.apply(&reply) && buffer.is_complete() {
                        info!(reply = buffer.text(), "Assistant replied");
                    }
                }
                Err(e) => debug!(error = %e, "Skipping frame"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match client.send_transcript(line.trim())? {
            Some(delivery) if !delivery.is_queued() => warn!("Not connected, message dropped"),
            Some(_) => {}
            None => debug!("Skipping repeated transcript"),
        }
    }

    client.dispose();
    client.closed().await;
    Ok(())
}
