//! Direct socket push/pull backend.
//!
//! The transmitter role binds a listener and lazily accepts a single
//! peer; the receiver role connects out. Send and receive are symmetric
//! on the same type, and sends complete synchronously.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use stream_api::{
    Frame, Role, SendAck, SendResult, StreamError, StreamTransport, TransportConfig,
};

use super::wire;

pub struct SocketTransport {
    addr: String,
    role: Role,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("addr", &self.addr)
            .field("role", &self.role)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl SocketTransport {
    /// Bind (transmitter) or connect (receiver). Fails fast; no retries.
    pub fn open(cfg: &TransportConfig) -> Result<Self, StreamError> {
        if cfg.addr.is_empty() {
            return Err(StreamError::connect("socket address is empty"));
        }
        match cfg.role {
            Role::Transmitter => {
                let listener = TcpListener::bind(&cfg.addr)
                    .map_err(|e| StreamError::connect(format!("bind {}: {e}", cfg.addr)))?;
                tracing::info!(addr = %cfg.addr, "socket transmitter listening");
                Ok(Self {
                    addr: cfg.addr.clone(),
                    role: cfg.role,
                    listener: Some(listener),
                    stream: None,
                })
            }
            Role::Receiver => {
                let stream = TcpStream::connect(&cfg.addr)
                    .map_err(|e| StreamError::connect(format!("connect {}: {e}", cfg.addr)))?;
                tracing::info!(addr = %cfg.addr, "socket receiver connected");
                Ok(Self {
                    addr: cfg.addr.clone(),
                    role: cfg.role,
                    listener: None,
                    stream: Some(stream),
                })
            }
        }
    }

    /// Actual bound address. Useful when the configured port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            Some(l) => l.local_addr().ok(),
            None => self.stream.as_ref().and_then(|s| s.local_addr().ok()),
        }
    }

    /// The single peer, accepted on first use in the transmitter role.
    fn peer(&mut self) -> Result<&mut TcpStream, StreamError> {
        if self.stream.is_none() {
            let listener = self
                .listener
                .as_ref()
                .ok_or_else(|| StreamError::connect("socket transport is closed"))?;
            let (stream, peer) = listener
                .accept()
                .map_err(|e| StreamError::connect(format!("accept on {}: {e}", self.addr)))?;
            tracing::info!(%peer, "socket peer connected");
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().expect("stream just ensured"))
    }
}

impl StreamTransport for SocketTransport {
    fn send(&mut self, frames: &[Frame]) -> Result<SendResult, StreamError> {
        if let Some(frame) = frames.iter().find(|f| f.len() > wire::MAX_FRAME_SIZE) {
            return Err(StreamError::send(format!(
                "frame of {} bytes exceeds limit {}",
                frame.len(),
                wire::MAX_FRAME_SIZE
            )));
        }

        let addr = self.addr.clone();
        let stream = self.peer()?;
        let mut bytes = 0;
        for (i, frame) in frames.iter().enumerate() {
            let more = i + 1 < frames.len();
            wire::write_frame(stream, frame, more)
                .map_err(|e| StreamError::connect(format!("write to {addr}: {e}")))?;
            bytes += frame.len();
        }
        stream
            .flush()
            .map_err(|e| StreamError::connect(format!("flush to {addr}: {e}")))?;

        Ok(SendResult {
            frames: frames.len(),
            bytes,
            ack: SendAck::Delivered,
        })
    }

    fn recv(&mut self) -> Result<Vec<Frame>, StreamError> {
        let stream = self.peer()?;
        wire::read_envelope(stream)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.listener = None;
        tracing::debug!(addr = %self.addr, role = ?self.role, "socket transport closed");
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}
