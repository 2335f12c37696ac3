//! Broker publish/subscribe backend.
//!
//! A thin stand-in for a full message broker client: one TCP connection
//! per transport, a one-line `PUB <channel>` / `SUB <channel>` handshake
//! binding the named channel for the transport's lifetime, then wire
//! frames. Publishes are fire-and-forget through a background writer
//! thread with a bounded queue; a dead writer means the connection is
//! gone, which is fatal for the run.

use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use stream_api::{
    Frame, Role, SendAck, SendResult, StreamError, StreamTransport, TransportConfig,
};

use super::wire;

/// Bounded depth of the publish queue.
const DEFAULT_QUEUE_DEPTH: usize = 128;

pub struct BrokerTransport {
    addr: String,
    channel: String,
    role: Role,
    max_message_bytes: usize,
    /// Publish side: sender into the writer thread. `None` after close.
    tx: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    writer_error: Arc<Mutex<Option<String>>>,
    /// Subscribe side: the broker stream we read envelopes from.
    reader: Option<BufReader<TcpStream>>,
}

impl std::fmt::Debug for BrokerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerTransport")
            .field("addr", &self.addr)
            .field("channel", &self.channel)
            .field("role", &self.role)
            .field("max_message_bytes", &self.max_message_bytes)
            .finish_non_exhaustive()
    }
}

impl BrokerTransport {
    /// Connect to the broker and bind the channel. Fails fast on an
    /// unreachable broker or empty destination identifiers.
    pub fn open(cfg: &TransportConfig) -> Result<Self, StreamError> {
        if cfg.addr.is_empty() {
            return Err(StreamError::connect("broker address is empty"));
        }
        if cfg.channel.is_empty() {
            return Err(StreamError::connect("broker channel is not set"));
        }

        let max_message_bytes = match cfg.option("message.max.bytes") {
            Some(v) => v.parse().map_err(|_| {
                StreamError::config(format!("message.max.bytes is not a number: {v:?}"))
            })?,
            None => wire::MAX_FRAME_SIZE,
        };
        let queue_depth = match cfg.option("queue.buffering.max.messages") {
            Some(v) => v.parse().map_err(|_| {
                StreamError::config(format!("queue.buffering.max.messages is not a number: {v:?}"))
            })?,
            None => DEFAULT_QUEUE_DEPTH,
        };

        let mut stream = TcpStream::connect(&cfg.addr)
            .map_err(|e| StreamError::connect(format!("broker {}: {e}", cfg.addr)))?;

        let verb = match cfg.role {
            Role::Transmitter => "PUB",
            Role::Receiver => "SUB",
        };
        stream
            .write_all(format!("{verb} {}\n", cfg.channel).as_bytes())
            .map_err(|e| StreamError::connect(format!("broker handshake {}: {e}", cfg.addr)))?;
        tracing::info!(addr = %cfg.addr, channel = %cfg.channel, %verb, "broker channel bound");

        let writer_error = Arc::new(Mutex::new(None));
        let (tx, writer, reader) = match cfg.role {
            Role::Transmitter => {
                let (tx, rx) = sync_channel(queue_depth);
                let handle = spawn_writer(stream, rx, cfg.addr.clone(), writer_error.clone());
                (Some(tx), Some(handle), None)
            }
            Role::Receiver => (None, None, Some(BufReader::new(stream))),
        };

        Ok(Self {
            addr: cfg.addr.clone(),
            channel: cfg.channel.clone(),
            role: cfg.role,
            max_message_bytes,
            tx,
            writer,
            writer_error,
            reader,
        })
    }

    fn take_writer_error(&self) -> Option<String> {
        self.writer_error.lock().ok().and_then(|mut g| g.take())
    }
}

fn spawn_writer(
    mut stream: TcpStream,
    rx: Receiver<Vec<u8>>,
    addr: String,
    error: Arc<Mutex<Option<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        // Exiting drops the Receiver; the publish side then observes a
        // disconnected queue and reports the stored error.
        for block in rx {
            if let Err(e) = stream.write_all(&block) {
                tracing::error!(%addr, error = %e, "broker write failed");
                if let Ok(mut g) = error.lock() {
                    *g = Some(e.to_string());
                }
                return;
            }
        }
        let _ = stream.flush();
        let _ = stream.shutdown(Shutdown::Both);
    })
}

impl StreamTransport for BrokerTransport {
    fn send(&mut self, frames: &[Frame]) -> Result<SendResult, StreamError> {
        let tx = match (&self.tx, self.role) {
            (Some(tx), _) => tx,
            (None, Role::Receiver) => {
                return Err(StreamError::send("broker receiver cannot publish"));
            }
            (None, Role::Transmitter) => {
                return Err(StreamError::connect("broker transport is closed"));
            }
        };

        if let Some(frame) = frames.iter().find(|f| f.len() > self.max_message_bytes) {
            return Err(StreamError::send(format!(
                "frame of {} bytes exceeds message.max.bytes {}",
                frame.len(),
                self.max_message_bytes
            )));
        }

        let mut block = Vec::new();
        wire::encode_envelope(frames, &mut block);
        let bytes: usize = frames.iter().map(Vec::len).sum();

        if tx.send(block).is_err() {
            let detail = self
                .take_writer_error()
                .unwrap_or_else(|| "writer exited".to_string());
            return Err(StreamError::connect(format!(
                "broker {} connection lost: {detail}",
                self.addr
            )));
        }

        Ok(SendResult {
            frames: frames.len(),
            bytes,
            ack: SendAck::Queued,
        })
    }

    fn recv(&mut self) -> Result<Vec<Frame>, StreamError> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            StreamError::send("broker transmitter cannot consume")
        })?;
        wire::read_envelope(reader)
    }

    fn close(&mut self) {
        // Dropping the sender lets the writer drain queued publishes
        // before it exits.
        self.tx = None;
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.into_inner().shutdown(Shutdown::Both);
        }
        tracing::debug!(addr = %self.addr, channel = %self.channel, "broker transport closed");
    }
}

impl Drop for BrokerTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use stream_api::ErrorKind;

    fn config(addr: &str, channel: &str) -> TransportConfig {
        TransportConfig::new(addr, channel, Role::Transmitter)
    }

    /// Minimal in-test broker: accept one client, return its handshake
    /// line and the connection.
    fn accept_one(listener: &TcpListener) -> (String, BufReader<TcpStream>) {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        (line, reader)
    }

    #[test]
    fn debug_names_the_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || accept_one(&listener).0);

        let mut tx = BrokerTransport::open(&config(&addr, "amor.events")).unwrap();
        let repr = format!("{tx:?}");
        assert!(repr.contains("amor.events"), "got: {repr}");
        tx.close();
        server.join().unwrap();
    }

    #[test]
    fn empty_identifiers_rejected_at_open() {
        let err = BrokerTransport::open(&config("", "events")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);

        let err = BrokerTransport::open(&config("localhost:9092", "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
    }

    #[test]
    fn unreachable_broker_fails_fast() {
        let err = BrokerTransport::open(&config("127.0.0.1:1", "events")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
    }

    #[test]
    fn bad_tuning_value_is_config_error() {
        let mut cfg = config("localhost:9092", "events");
        cfg.options.push(("message.max.bytes".into(), "lots".into()));
        let err = BrokerTransport::open(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn publish_hands_frames_to_the_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = std::thread::spawn(move || {
            let (hello, mut reader) = accept_one(&listener);
            let envelope = wire::read_envelope(&mut reader).unwrap();
            (hello, envelope)
        });

        let mut tx = BrokerTransport::open(&config(&addr, "amor.events")).unwrap();
        let res = tx.send(&[b"header".to_vec(), b"data".to_vec()]).unwrap();
        assert_eq!(res.ack, SendAck::Queued);
        assert_eq!(res.frames, 2);
        tx.close();

        let (hello, envelope) = server.join().unwrap();
        assert_eq!(hello, "PUB amor.events\n");
        assert_eq!(envelope, vec![b"header".to_vec(), b"data".to_vec()]);
    }

    #[test]
    fn oversize_message_is_per_frame_send_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || accept_one(&listener).0);

        let mut cfg = config(&addr, "events");
        cfg.options.push(("message.max.bytes".into(), "16".into()));
        let mut tx = BrokerTransport::open(&cfg).unwrap();

        let err = tx.send(&[vec![0u8; 17]]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Send);

        // A compliant frame still goes through afterwards.
        tx.send(&[vec![0u8; 16]]).unwrap();
        tx.close();
        server.join().unwrap();
    }

    #[test]
    fn lost_connection_becomes_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut tx = BrokerTransport::open(&config(&addr, "events")).unwrap();
        // Accept then immediately drop the server side.
        drop(listener.accept().unwrap());
        drop(listener);

        // The writer needs a failed write to notice; keep publishing
        // until the broken pipe surfaces.
        let mut saw_connect = false;
        for _ in 0..64 {
            match tx.send(&[vec![0u8; 1024]]) {
                Ok(_) => std::thread::sleep(std::time::Duration::from_millis(10)),
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::Connect);
                    saw_connect = true;
                    break;
                }
            }
        }
        assert!(saw_connect, "writer never reported the lost connection");
    }
}
