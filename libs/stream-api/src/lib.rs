pub mod error;
pub mod header;
pub mod record;

pub use error::{ErrorKind, StreamError};
pub use header::{DS_RESERVED, PacketHeader};
pub use record::{EventBatch, EventRecord, RECORD_SIZE};

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Wire types
// ════════════════════════════════════════════════════════════════

/// One discrete transport-level message. An envelope spans one or two
/// frames depending on the codec.
pub type Frame = Vec<u8>;

/// Delivery guarantee of an acknowledged send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAck {
    /// The backend completed the write synchronously.
    Delivered,
    /// The backend accepted the frames for asynchronous delivery.
    Queued,
}

/// Per-send accounting returned by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResult {
    pub frames: usize,
    pub bytes: usize,
    pub ack: SendAck,
}

// ════════════════════════════════════════════════════════════════
//  Transport configuration
// ════════════════════════════════════════════════════════════════

/// Which end of the stream this transport instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Producer side: binds (socket) or publishes (broker).
    Transmitter,
    /// Consumer side: connects (socket) or subscribes (broker).
    Receiver,
}

/// Immutable connection parameters, supplied once at transport open.
///
/// `options` is a passthrough list of backend tuning key/value pairs,
/// forwarded verbatim; unknown keys are ignored by backends that do not
/// understand them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Destination address, `host:port`.
    pub addr: String,
    /// Named channel (broker topic). Informational for the socket backend.
    pub channel: String,
    pub role: Role,
    pub options: Vec<(String, String)>,
}

impl TransportConfig {
    pub fn new(addr: impl Into<String>, channel: impl Into<String>, role: Role) -> Self {
        Self {
            addr: addr.into(),
            channel: channel.into(),
            role,
            options: Vec::new(),
        }
    }

    /// Look up a tuning option by key.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// ════════════════════════════════════════════════════════════════
//  Contracts
// ════════════════════════════════════════════════════════════════

/// Deterministic mapping between (header, batch) and wire frames.
///
/// Implementations are stateless: every call is independent and safe to
/// invoke from concurrent cycles.
pub trait EnvelopeCodec: Send + Sync {
    /// Encode one packet. Fails with [`ErrorKind::Encode`] when the
    /// header count and batch length disagree.
    fn encode(&self, header: &PacketHeader, batch: &EventBatch) -> Result<Vec<Frame>, StreamError>;

    /// Decode the frames of one envelope back into (header, batch).
    fn decode(&self, frames: &[Frame]) -> Result<(PacketHeader, EventBatch), StreamError>;
}

/// Moves encoded frames to a destination. One instance is exclusively
/// owned by one generator for its lifetime.
///
/// All methods are blocking; the frame boundaries handed to `send` are
/// preserved on the wire and reproduced by `recv` on the far side.
pub trait StreamTransport: Send {
    /// Transmit the frames of one envelope, in order. A backend-reported
    /// per-frame failure is [`ErrorKind::Send`]; a lost connection is
    /// [`ErrorKind::Connect`].
    fn send(&mut self, frames: &[Frame]) -> Result<SendResult, StreamError>;

    /// Receive the frames of one envelope.
    fn recv(&mut self) -> Result<Vec<Frame>, StreamError>;

    /// Release backend resources. Idempotent; also runs on drop.
    fn close(&mut self);
}

/// Supplier of event batches. Finite and not restartable: replaying a
/// batch is generator policy, not a source capability.
pub trait EventSource: Send {
    /// Next batch with at most `max_count` records, or `None` when the
    /// source is exhausted.
    fn next_batch(&mut self, max_count: usize) -> Result<Option<EventBatch>, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_lookup() {
        let mut cfg = TransportConfig::new("localhost:9092", "amor.events", Role::Transmitter);
        cfg.options.push(("message.max.bytes".into(), "1024".into()));
        assert_eq!(cfg.option("message.max.bytes"), Some("1024"));
        assert_eq!(cfg.option("missing"), None);
    }
}
