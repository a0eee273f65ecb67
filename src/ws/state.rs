//! Connection lifecycle state machine.
//!
//! [`Machine`] is pure: it consumes transport and timer [`Event`]s and answers with the
//! [`Effect`]s the connection driver must perform. It never touches a socket or a clock
//! (beyond stamping `Connected::since`), which keeps every transition unit-testable.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff as _, Constant};
use tokio::time::Instant;

use super::config::ReconnectConfig;
use super::error::WsError;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; a reconnection attempt may be pending
    Disconnected,
    /// Attempting to connect
    Connecting {
        /// Number of failed attempts since the connection was last open
        attempt: u32,
    },
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
        /// Monotonic counter of successful opens, used to discard stale outbound frames
        session: u64,
    },
    /// Disposed; no further transitions occur
    Terminal,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if the connection has been disposed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal)
    }
}

/// Snapshot of the connection published to observers.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Status {
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Most recent transport error; cleared once a connection opens
    pub last_error: Option<Arc<WsError>>,
    /// Failed connection attempts since the connection was last open
    pub retries: u32,
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        let same_error = match (&self.last_error, &other.last_error) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.state == other.state && self.retries == other.retries && same_error
    }
}

/// Externally delivered occurrences the machine reacts to.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    /// First connection attempt after construction
    Start,
    /// The transport finished its opening handshake
    Opened,
    /// The transport reported an error
    Errored(Arc<WsError>),
    /// The transport closed, either by the peer or through network failure
    Closed,
    /// The pending reconnection timer fired
    RetryElapsed,
    /// The owner tore the connection down
    Dispose,
}

/// Work the driver performs on behalf of the machine.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start opening a new transport link
    Open,
    /// Arm the reconnection timer
    ScheduleRetry(Duration),
    /// Disarm the reconnection timer
    CancelRetry,
    /// Close the current link, or abandon an in-flight connect
    CloseTransport,
}

/// Lifecycle state machine for a single logical connection.
#[derive(Debug)]
pub struct Machine {
    state: ConnectionState,
    last_error: Option<Arc<WsError>>,
    retries: u32,
    sessions: u64,
    retry_pending: bool,
    backoff: Constant,
}

impl Machine {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            retries: 0,
            sessions: 0,
            retry_pending: false,
            backoff: config.into(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    #[must_use]
    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            last_error: self.last_error.clone(),
            retries: self.retries,
        }
    }

    /// Apply `event` and return the effects the driver must carry out, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        use ConnectionState::{Connected, Connecting, Disconnected, Terminal};

        match (self.state, event) {
            (Terminal, _) => Vec::new(),

            (_, Event::Dispose) => {
                let mut effects = Vec::with_capacity(2);
                if self.retry_pending {
                    self.retry_pending = false;
                    effects.push(Effect::CancelRetry);
                }
                if matches!(self.state, Connecting { .. } | Connected { .. }) {
                    effects.push(Effect::CloseTransport);
                }
                self.state = Terminal;
                effects
            }

            (Disconnected, Event::Start) => self.open(),
            (Disconnected, Event::RetryElapsed) if self.retry_pending => {
                self.retry_pending = false;
                self.open()
            }

            (Connecting { .. }, Event::Opened) => {
                self.sessions = self.sessions.wrapping_add(1);
                self.state = Connected {
                    since: Instant::now(),
                    session: self.sessions,
                };
                self.retries = 0;
                self.last_error = None;
                self.backoff.reset();
                Vec::new()
            }
            (Connecting { .. }, Event::Errored(error)) => {
                self.last_error = Some(error);
                self.retries = self.retries.saturating_add(1);
                self.disconnect()
            }
            (Connecting { .. }, Event::Closed) => {
                self.retries = self.retries.saturating_add(1);
                self.disconnect()
            }

            (Connected { .. }, Event::Closed) => self.disconnect(),
            // A close is expected to follow
            (Connected { .. } | Disconnected, Event::Errored(error)) => {
                self.last_error = Some(error);
                Vec::new()
            }

            _ => Vec::new(),
        }
    }

    fn open(&mut self) -> Vec<Effect> {
        self.state = ConnectionState::Connecting {
            attempt: self.retries,
        };
        vec![Effect::Open]
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        self.state = ConnectionState::Disconnected;
        if self.retry_pending {
            return Vec::new();
        }

        match self.backoff.next_backoff() {
            Some(delay) => {
                self.retry_pending = true;
                vec![Effect::ScheduleRetry(delay)]
            }
            None => Vec::new(),
        }
    }
}
