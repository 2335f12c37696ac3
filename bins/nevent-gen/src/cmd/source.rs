//! Event sources: file replay and synthetic generation.

use std::fs::File;
use std::io::{BufReader, Read};

use stream_api::{EventBatch, EventRecord, EventSource, RECORD_SIZE, StreamError};

use super::error::NeventGenError;

/// Records per natural batch when the caller puts no tighter cap on.
const NATURAL_BATCH: usize = 512;

// ═══════════════════════════════════════════════════════════════
//  File replay
// ═══════════════════════════════════════════════════════════════

/// Replays 8-byte little-endian event records from a binary file, in
/// order, once. A trailing partial record fails the pull.
pub struct FileSource {
    reader: BufReader<File>,
    path: String,
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self, NeventGenError> {
        let file = File::open(path)
            .map_err(|e| NeventGenError::Config(format!("cannot open event file {path}: {e}")))?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_string(),
        })
    }
}

impl EventSource for FileSource {
    fn next_batch(&mut self, max_count: usize) -> Result<Option<EventBatch>, StreamError> {
        let records = read_records(&mut self.reader, max_count.min(NATURAL_BATCH), &self.path)?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(EventBatch::new(records)))
    }
}

fn read_records(
    reader: &mut impl Read,
    cap: usize,
    path: &str,
) -> Result<Vec<EventRecord>, StreamError> {
    let mut records = Vec::with_capacity(cap);
    let mut buf = [0u8; RECORD_SIZE];

    while records.len() < cap {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if n < RECORD_SIZE {
                    // EOF inside a record means a ragged file; anything
                    // else is a genuine read failure.
                    if let Err(e) = reader.read_exact(&mut buf[n..]) {
                        return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                            ragged(path)
                        } else {
                            read_failed(path, &e)
                        });
                    }
                }
                records.push(EventRecord(u64::from_le_bytes(buf)));
            }
            Err(e) => return Err(read_failed(path, &e)),
        }
    }
    Ok(records)
}

fn ragged(path: &str) -> StreamError {
    StreamError::decode(format!(
        "event file {path} ends mid-record (size is not a multiple of {RECORD_SIZE})"
    ))
}

fn read_failed(path: &str, e: &std::io::Error) -> StreamError {
    StreamError::decode(format!("read {path}: {e}"))
}

// ═══════════════════════════════════════════════════════════════
//  Synthetic events
// ═══════════════════════════════════════════════════════════════

/// xorshift64. Deterministic for a fixed non-zero seed.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: i64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1 // ensure non-zero
        } else {
            seed as u64
        };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }
}

/// Endless stream of pseudo-random records. Every `heartbeat_every`-th
/// batch (0 = never) comes out empty so the downstream sees heartbeats.
pub struct SyntheticSource {
    rng: Rng,
    heartbeat_every: u64,
    pulls: u64,
}

impl SyntheticSource {
    pub fn new(seed: i64, heartbeat_every: u64) -> Self {
        Self {
            rng: Rng::new(seed),
            heartbeat_every,
            pulls: 0,
        }
    }
}

impl EventSource for SyntheticSource {
    fn next_batch(&mut self, max_count: usize) -> Result<Option<EventBatch>, StreamError> {
        self.pulls += 1;
        if self.heartbeat_every > 0 && self.pulls % self.heartbeat_every == 0 {
            return Ok(Some(EventBatch::default()));
        }
        let count = max_count.min(NATURAL_BATCH);
        let records = (0..count).map(|_| EventRecord(self.rng.next_u64())).collect();
        Ok(Some(EventBatch::new(records)))
    }
}
