//! Transport backends.
//!
//! Both backends speak the same per-frame wire layout (see [`wire`]) so
//! the codec's multipart boundary survives the byte stream: the broker
//! backend publishes frames to a named channel fire-and-forget, the
//! socket backend pushes them synchronously to one bound/connected peer.

mod broker;
mod socket;
pub(crate) mod wire;

pub use broker::BrokerTransport;
pub use socket::SocketTransport;
pub use wire::read_envelope as read_wire_envelope;

use stream_api::{StreamError, StreamTransport, TransportConfig};

use crate::config::TransportKind;

/// Open the configured backend. Fails fast with [`stream_api::ErrorKind::Connect`]
/// on a bad destination; no retry loop.
pub fn open_transport(
    kind: TransportKind,
    cfg: &TransportConfig,
) -> Result<Box<dyn StreamTransport>, StreamError> {
    match kind {
        TransportKind::Broker => Ok(Box::new(BrokerTransport::open(cfg)?)),
        TransportKind::Socket => Ok(Box::new(SocketTransport::open(cfg)?)),
    }
}
