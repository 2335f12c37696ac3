//! The two envelope codecs.
//!
//! `PassthroughCodec` keeps the instrument's historical two-frame layout:
//! a JSON header frame and, when events are present, a raw payload frame.
//! `PackedCodec` folds header and payload into one self-describing binary
//! buffer so a receiver needs no multipart semantics from the transport.

use serde_json::Value;

use stream_api::{DS_RESERVED, EnvelopeCodec, EventBatch, Frame, PacketHeader, StreamError};

use crate::config::CodecKind;

/// Pick the codec implementation for a configured kind.
pub fn select_codec(kind: CodecKind) -> Box<dyn EnvelopeCodec> {
    match kind {
        CodecKind::Passthrough => Box::new(PassthroughCodec),
        CodecKind::Packed => Box::new(PackedCodec),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Passthrough (two-frame) codec
// ═══════════════════════════════════════════════════════════════

/// Header as UTF-8 JSON `{"pid": <id>, "ds": [<reserved>, <count>]}`,
/// payload as a second raw frame iff `event_count > 0`. The frame
/// boundary is the message boundary on the transport.
pub struct PassthroughCodec;

impl PassthroughCodec {
    fn header_frame(header: &PacketHeader) -> Frame {
        serde_json::json!({
            "pid": header.packet_id,
            "ds": [DS_RESERVED, header.event_count],
        })
        .to_string()
        .into_bytes()
    }

    /// Parse a header frame. Unknown extra keys are ignored.
    pub fn parse_header(frame: &[u8]) -> Result<PacketHeader, StreamError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| StreamError::decode(format!("header is not valid JSON: {e}")))?;
        let packet_id = value
            .get("pid")
            .ok_or_else(|| StreamError::decode("header is missing `pid`"))?
            .as_u64()
            .ok_or_else(|| StreamError::decode("header `pid` is not a non-negative integer"))?;
        let ds = value
            .get("ds")
            .ok_or_else(|| StreamError::decode("header is missing `ds`"))?
            .as_array()
            .ok_or_else(|| StreamError::decode("header `ds` is not an array"))?;
        let event_count = ds
            .get(1)
            .and_then(Value::as_u64)
            .ok_or_else(|| StreamError::decode("header `ds[1]` is not a non-negative integer"))?;
        Ok(PacketHeader::new(packet_id, event_count))
    }
}

impl EnvelopeCodec for PassthroughCodec {
    fn encode(&self, header: &PacketHeader, batch: &EventBatch) -> Result<Vec<Frame>, StreamError> {
        header.matches(batch)?;
        let mut frames = vec![Self::header_frame(header)];
        if !batch.is_empty() {
            frames.push(batch.to_bytes());
        }
        Ok(frames)
    }

    fn decode(&self, frames: &[Frame]) -> Result<(PacketHeader, EventBatch), StreamError> {
        let header_frame = frames
            .first()
            .ok_or_else(|| StreamError::decode("no frames to decode"))?;
        let header = Self::parse_header(header_frame)?;

        if header.is_heartbeat() {
            if frames.len() > 1 {
                return Err(StreamError::decode(format!(
                    "heartbeat packet {} arrived with {} extra frame(s)",
                    header.packet_id,
                    frames.len() - 1
                )));
            }
            return Ok((header, EventBatch::default()));
        }

        let payload = frames.get(1).ok_or_else(|| {
            StreamError::decode(format!(
                "header announces {} events but no data frame followed",
                header.event_count
            ))
        })?;
        let batch = EventBatch::from_bytes(payload)?;
        if batch.len() as u64 != header.event_count {
            return Err(StreamError::decode(format!(
                "header announces {} events, data frame carries {}",
                header.event_count,
                batch.len()
            )));
        }
        Ok((header, batch))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Packed (single-frame) codec
// ═══════════════════════════════════════════════════════════════

/// Magic prefix of a packed envelope: "NE".
const MAGIC: [u8; 2] = [0x4E, 0x45];

/// Fixed prelude: magic + pid + event_count + payload_len.
const PRELUDE_SIZE: usize = 2 + 8 + 8 + 4;

/// Single length-delimited buffer:
///
/// ```text
/// magic "NE" (2) | pid u64 LE | event_count u64 LE | payload_len u32 LE | payload
/// ```
///
/// Encoding is a pure function of its inputs: identical (header, batch)
/// always yields byte-identical output.
pub struct PackedCodec;

impl EnvelopeCodec for PackedCodec {
    fn encode(&self, header: &PacketHeader, batch: &EventBatch) -> Result<Vec<Frame>, StreamError> {
        header.matches(batch)?;
        let payload = batch.to_bytes();
        let mut buf = Vec::with_capacity(PRELUDE_SIZE + payload.len());
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&header.packet_id.to_le_bytes());
        buf.extend_from_slice(&header.event_count.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(vec![buf])
    }

    fn decode(&self, frames: &[Frame]) -> Result<(PacketHeader, EventBatch), StreamError> {
        let buf = match frames {
            [single] => single.as_slice(),
            [] => return Err(StreamError::decode("no frames to decode")),
            _ => {
                return Err(StreamError::decode(format!(
                    "packed envelope must be one frame, got {}",
                    frames.len()
                )));
            }
        };

        if buf.len() < PRELUDE_SIZE {
            return Err(StreamError::decode(format!(
                "truncated envelope: {} bytes, prelude needs {PRELUDE_SIZE}",
                buf.len()
            )));
        }
        if buf[0..2] != MAGIC {
            return Err(StreamError::decode(format!(
                "bad magic {:02x}{:02x}",
                buf[0], buf[1]
            )));
        }

        let packet_id = u64::from_le_bytes(buf[2..10].try_into().expect("prelude checked"));
        let event_count = u64::from_le_bytes(buf[10..18].try_into().expect("prelude checked"));
        let payload_len = u32::from_le_bytes(buf[18..22].try_into().expect("prelude checked")) as usize;

        if buf.len() != PRELUDE_SIZE + payload_len {
            return Err(StreamError::decode(format!(
                "payload_len {payload_len} disagrees with buffer length {}",
                buf.len()
            )));
        }
        let batch = EventBatch::from_bytes(&buf[PRELUDE_SIZE..])?;
        if batch.len() as u64 != event_count {
            return Err(StreamError::decode(format!(
                "event_count {event_count} disagrees with payload of {} records",
                batch.len()
            )));
        }
        Ok((PacketHeader::new(packet_id, event_count), batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_api::{ErrorKind, EventRecord};

    fn batch(n: u64) -> EventBatch {
        EventBatch::new((0..n).map(EventRecord).collect())
    }

    #[test]
    fn passthrough_round_trip() {
        let codec = PassthroughCodec;
        let header = PacketHeader::new(7, 3);
        let frames = codec.encode(&header, &batch(3)).unwrap();
        assert_eq!(frames.len(), 2);
        let (h, b) = codec.decode(&frames).unwrap();
        assert_eq!(h, header);
        assert_eq!(b, batch(3));
    }

    #[test]
    fn passthrough_header_shape() {
        let codec = PassthroughCodec;
        let frames = codec.encode(&PacketHeader::new(7, 3), &batch(3)).unwrap();
        let value: Value = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(value["pid"], 7);
        assert_eq!(value["ds"][1], 3);
    }

    #[test]
    fn passthrough_heartbeat_is_one_frame() {
        let codec = PassthroughCodec;
        let frames = codec.encode(&PacketHeader::new(1, 0), &EventBatch::default()).unwrap();
        assert_eq!(frames.len(), 1);
        let (h, b) = codec.decode(&frames).unwrap();
        assert!(h.is_heartbeat());
        assert!(b.is_empty());
    }

    #[test]
    fn passthrough_missing_data_frame() {
        let codec = PassthroughCodec;
        let mut frames = codec.encode(&PacketHeader::new(2, 4), &batch(4)).unwrap();
        frames.truncate(1);
        let err = codec.decode(&frames).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn passthrough_ignores_unknown_header_keys() {
        let frame = br#"{"pid": 12, "ds": [0, 0], "instrument": "AMOR"}"#.to_vec();
        let h = PassthroughCodec::parse_header(&frame).unwrap();
        assert_eq!(h.packet_id, 12);
        assert_eq!(h.event_count, 0);
    }

    #[test]
    fn passthrough_rejects_bad_headers() {
        for bad in [
            &b"not json"[..],
            br#"{"ds": [0, 1]}"#,
            br#"{"pid": 1}"#,
            br#"{"pid": "x", "ds": [0, 1]}"#,
            br#"{"pid": 1, "ds": [0, "y"]}"#,
            br#"{"pid": 1, "ds": 3}"#,
        ] {
            let err = PassthroughCodec::parse_header(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Decode, "accepted: {}", String::from_utf8_lossy(bad));
        }
    }

    #[test]
    fn count_mismatch_is_encode_error() {
        let header = PacketHeader::new(0, 5);
        for codec in [&PassthroughCodec as &dyn EnvelopeCodec, &PackedCodec] {
            let err = codec.encode(&header, &batch(2)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Encode);
        }
    }

    #[test]
    fn packed_round_trip() {
        let codec = PackedCodec;
        let header = PacketHeader::new(42, 5);
        let frames = codec.encode(&header, &batch(5)).unwrap();
        assert_eq!(frames.len(), 1);
        let (h, b) = codec.decode(&frames).unwrap();
        assert_eq!(h, header);
        assert_eq!(b, batch(5));
    }

    #[test]
    fn packed_encode_is_deterministic() {
        let codec = PackedCodec;
        let header = PacketHeader::new(9, 4);
        let a = codec.encode(&header, &batch(4)).unwrap();
        let b = codec.encode(&header, &batch(4)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn packed_rejects_truncation_and_bad_magic() {
        let codec = PackedCodec;
        let frames = codec.encode(&PacketHeader::new(1, 2), &batch(2)).unwrap();

        let truncated = vec![frames[0][..frames[0].len() - 1].to_vec()];
        assert_eq!(codec.decode(&truncated).unwrap_err().kind(), ErrorKind::Decode);

        let mut corrupted = frames.clone();
        corrupted[0][0] = b'X';
        assert_eq!(codec.decode(&corrupted).unwrap_err().kind(), ErrorKind::Decode);

        let short = vec![vec![0u8; 4]];
        assert_eq!(codec.decode(&short).unwrap_err().kind(), ErrorKind::Decode);
    }

    #[test]
    fn packed_rejects_count_payload_disagreement() {
        let codec = PackedCodec;
        let mut frames = codec.encode(&PacketHeader::new(1, 2), &batch(2)).unwrap();
        // Claim 3 events while carrying 2.
        frames[0][10..18].copy_from_slice(&3u64.to_le_bytes());
        assert_eq!(codec.decode(&frames).unwrap_err().kind(), ErrorKind::Decode);
    }
}
