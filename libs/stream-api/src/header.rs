use crate::error::StreamError;
use crate::record::EventBatch;

/// Value of the reserved first slot of the header's `ds` array. Never
/// defined by any consumer we know of; carried as an opaque constant.
pub const DS_RESERVED: u64 = 0;

/// Per-packet metadata. One header is built per send cycle; `packet_id`
/// increases monotonically for the lifetime of a generator instance and
/// `event_count` always matches the batch the header was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_id: u64,
    pub event_count: u64,
}

impl PacketHeader {
    pub fn new(packet_id: u64, event_count: u64) -> Self {
        Self { packet_id, event_count }
    }

    /// Build a header for `batch`, guaranteeing the count invariant.
    pub fn for_batch(packet_id: u64, batch: &EventBatch) -> Self {
        Self { packet_id, event_count: batch.len() as u64 }
    }

    /// A heartbeat carries a header and no data frame.
    pub fn is_heartbeat(&self) -> bool {
        self.event_count == 0
    }

    /// Check the count invariant against an actual batch.
    pub fn matches(&self, batch: &EventBatch) -> Result<(), StreamError> {
        if self.event_count != batch.len() as u64 {
            return Err(StreamError::encode(format!(
                "header event_count {} does not match batch length {}",
                self.event_count,
                batch.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventRecord;

    #[test]
    fn for_batch_upholds_invariant() {
        let batch = EventBatch::new(vec![EventRecord(1), EventRecord(2)]);
        let header = PacketHeader::for_batch(9, &batch);
        assert_eq!(header.event_count, 2);
        assert!(header.matches(&batch).is_ok());
    }

    #[test]
    fn mismatch_is_an_encode_error() {
        let batch = EventBatch::new(vec![EventRecord(1)]);
        let header = PacketHeader::new(0, 3);
        let err = header.matches(&batch).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Encode);
    }

    #[test]
    fn zero_count_is_heartbeat() {
        assert!(PacketHeader::new(5, 0).is_heartbeat());
        assert!(!PacketHeader::new(5, 1).is_heartbeat());
    }
}
