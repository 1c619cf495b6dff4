//! # Counterparty Transport
//!
//! The gateway exchanges envelopes with a counterparty through a
//! [`CounterpartyChannel`]: send one request, get one answer or an error.
//! Retries, deadlines and validation live above this seam, in the retry
//! controller, so a channel stays a thin pipe.
//!
//! [`LocalChannel`] connects two gateways in one process. Every envelope
//! crosses it as JSON, the same wire form a network transport would carry.
//! It can drop or delay traffic to exercise the retry and timeout paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use satp_core::SatpError;
use satp_protocol::Envelope;
use thiserror::Error;

use crate::gateway::Gateway;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The envelope or its answer was lost. Worth resending.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The counterparty received the envelope and refused it.
    #[error("counterparty refused envelope: {0}")]
    Rejected(SatpError),
}

#[async_trait]
pub trait CounterpartyChannel: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<Envelope, ChannelError>;
}

#[derive(Debug, Default)]
struct Faults {
    drop_requests: u32,
    drop_responses: u32,
    delay: Option<Duration>,
}

/// In-process channel to another [`Gateway`].
pub struct LocalChannel {
    server: Gateway,
    faults: Mutex<Faults>,
    sent: AtomicU32,
}

impl LocalChannel {
    pub fn new(server: Gateway) -> Self {
        Self {
            server,
            faults: Mutex::new(Faults::default()),
            sent: AtomicU32::new(0),
        }
    }

    /// Lose the next `n` requests before they reach the server.
    pub fn drop_requests(&self, n: u32) {
        self.faults.lock().drop_requests = n;
    }

    /// Deliver the next `n` requests but lose the server's answers.
    pub fn drop_responses(&self, n: u32) {
        self.faults.lock().drop_responses = n;
    }

    /// Hold every request for `by` before delivering it.
    pub fn delay(&self, by: Duration) {
        self.faults.lock().delay = Some(by);
    }

    /// Envelopes handed to this channel, delivered or not.
    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }

    fn take_drop_request(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.drop_requests > 0 {
            faults.drop_requests -= 1;
            return true;
        }
        false
    }

    fn take_drop_response(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.drop_responses > 0 {
            faults.drop_responses -= 1;
            return true;
        }
        false
    }
}

fn over_wire(envelope: &Envelope) -> Result<Envelope, ChannelError> {
    let wire = envelope
        .to_json()
        .map_err(|e| ChannelError::Transport(format!("encode: {e}")))?;
    Envelope::from_json(&wire).map_err(|e| ChannelError::Transport(format!("decode: {e}")))
}

#[async_trait]
impl CounterpartyChannel for LocalChannel {
    async fn send(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let delay = self.faults.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_drop_request() {
            tracing::debug!(message_type = %envelope.message_type(), "request dropped");
            return Err(ChannelError::Transport("request dropped".into()));
        }
        let request = over_wire(&envelope)?;
        let response = self
            .server
            .handle(request)
            .await
            .map_err(ChannelError::Rejected)?;
        if self.take_drop_response() {
            tracing::debug!(message_type = %response.message_type(), "response dropped");
            return Err(ChannelError::Transport("response dropped".into()));
        }
        over_wire(&response)
    }
}
