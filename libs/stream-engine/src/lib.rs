//! Stream engine: codecs, transports, control, and the generator loop.
//!
//! The engine consumes the contracts defined in `stream-api` and wires
//! them into a running producer: a [`generator::Generator`] pulls event
//! batches from an [`stream_api::EventSource`], envelopes them with a
//! [`codec`] and pushes them through a [`transport`] backend, gated by
//! the [`control`] state machine.

pub mod codec;
pub mod config;
pub mod control;
pub mod generator;
pub mod transport;

pub use codec::{PackedCodec, PassthroughCodec, select_codec};
pub use config::{CodecKind, GeneratorConfig, SizingMode, TransportKind};
pub use control::{ControlHandle, ControlState, Controller, PAUSE_POLL};
pub use generator::{Generator, RunStats};
pub use transport::{BrokerTransport, SocketTransport, open_transport};
