use crate::error::StreamError;

/// Wire size of one event record in bytes.
pub const RECORD_SIZE: usize = 8;

/// One detection event. The engine never interprets the payload bits;
/// they come out of the source exactly as they go onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord(pub u64);

/// An ordered batch of event records. Built once by a source, then only
/// read by the codec and transport layers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventBatch {
    records: Vec<EventRecord>,
}

impl EventBatch {
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self { records }
    }

    /// Number of event records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Payload size of the batch on the wire.
    pub fn byte_len(&self) -> usize {
        self.records.len() * RECORD_SIZE
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Little-endian concatenation of the records, no extra framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for rec in &self.records {
            out.extend_from_slice(&rec.0.to_le_bytes());
        }
        out
    }

    /// Parse a raw payload back into records. The buffer length must be
    /// an exact multiple of [`RECORD_SIZE`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StreamError> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(StreamError::decode(format!(
                "payload length {} is not a multiple of {RECORD_SIZE}",
                bytes.len()
            )));
        }
        let records = bytes
            .chunks_exact(RECORD_SIZE)
            .map(|c| EventRecord(u64::from_le_bytes(c.try_into().expect("chunk is RECORD_SIZE"))))
            .collect();
        Ok(Self { records })
    }

    /// Truncate in place to at most `count` records.
    pub fn truncate(&mut self, count: usize) {
        self.records.truncate(count);
    }

    /// Append a copy of `other`'s records.
    pub fn extend_from(&mut self, other: &EventBatch) {
        self.records.extend_from_slice(&other.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let batch = EventBatch::new(vec![EventRecord(1), EventRecord(0xDEAD_BEEF), EventRecord(u64::MAX)]);
        let bytes = batch.to_bytes();
        assert_eq!(bytes.len(), 3 * RECORD_SIZE);
        assert_eq!(EventBatch::from_bytes(&bytes).unwrap(), batch);
    }

    #[test]
    fn empty_batch_is_zero_bytes() {
        let batch = EventBatch::default();
        assert!(batch.is_empty());
        assert!(batch.to_bytes().is_empty());
        assert_eq!(EventBatch::from_bytes(&[]).unwrap(), batch);
    }

    #[test]
    fn ragged_payload_rejected() {
        let err = EventBatch::from_bytes(&[0u8; RECORD_SIZE + 3]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }

    #[test]
    fn records_are_little_endian() {
        let batch = EventBatch::new(vec![EventRecord(0x0102_0304_0506_0708)]);
        assert_eq!(batch.to_bytes(), vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }
}
