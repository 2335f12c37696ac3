//! Per-frame message layout shared by both backends:
//!
//! ```text
//! len u32 BE | more u8 | payload (len bytes)
//! ```
//!
//! `more = 1` while further frames of the same envelope follow, so a
//! receiver can gather a whole envelope without knowing the codec.

use std::io::{Read, Write};

use stream_api::{Frame, StreamError};

/// Upper bound on a single frame, matching the instrument's historical
/// 100 MB message ceiling. A larger announced length means a corrupt or
/// hostile stream.
pub const MAX_FRAME_SIZE: usize = 100_000_000;

const MORE: u8 = 1;
const LAST: u8 = 0;

pub fn write_frame(w: &mut impl Write, frame: &[u8], more: bool) -> std::io::Result<()> {
    w.write_all(&(frame.len() as u32).to_be_bytes())?;
    w.write_all(&[if more { MORE } else { LAST }])?;
    w.write_all(frame)
}

/// Serialize a whole envelope into `out`, preserving frame boundaries.
pub fn encode_envelope(frames: &[Frame], out: &mut Vec<u8>) {
    for (i, frame) in frames.iter().enumerate() {
        let more = i + 1 < frames.len();
        // Vec<u8> writes are infallible.
        write_frame(out, frame, more).expect("write to Vec cannot fail");
    }
}

/// Read one frame and its more-flag.
pub fn read_frame(r: &mut impl Read) -> Result<(Frame, bool), StreamError> {
    let mut prelude = [0u8; 5];
    r.read_exact(&mut prelude)
        .map_err(|e| StreamError::connect(format!("read frame prelude: {e}")))?;
    let len = u32::from_be_bytes(prelude[..4].try_into().expect("prelude is 5 bytes")) as usize;
    let more = match prelude[4] {
        MORE => true,
        LAST => false,
        other => return Err(StreamError::decode(format!("bad more-flag byte {other:#x}"))),
    };
    if len > MAX_FRAME_SIZE {
        return Err(StreamError::decode(format!(
            "announced frame length {len} exceeds limit {MAX_FRAME_SIZE}"
        )));
    }
    let mut frame = vec![0u8; len];
    r.read_exact(&mut frame)
        .map_err(|e| StreamError::connect(format!("read frame payload: {e}")))?;
    Ok((frame, more))
}

/// Read frames until the more-flag clears: one whole envelope.
pub fn read_envelope(r: &mut impl Read) -> Result<Vec<Frame>, StreamError> {
    let mut frames = Vec::with_capacity(2);
    loop {
        let (frame, more) = read_frame(r)?;
        frames.push(frame);
        if !more {
            return Ok(frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use stream_api::ErrorKind;

    #[test]
    fn envelope_round_trip() {
        let frames = vec![b"header".to_vec(), b"payload".to_vec()];
        let mut buf = Vec::new();
        encode_envelope(&frames, &mut buf);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_envelope(&mut cursor).unwrap(), frames);
        // Stream fully consumed.
        assert_eq!(cursor.position() as usize, cursor.get_ref().len());
    }

    #[test]
    fn single_frame_envelope() {
        let frames = vec![vec![0u8; 32]];
        let mut buf = Vec::new();
        encode_envelope(&frames, &mut buf);
        assert_eq!(read_envelope(&mut Cursor::new(buf)).unwrap(), frames);
    }

    #[test]
    fn two_envelopes_stay_separate() {
        let first = vec![b"h1".to_vec(), b"d1".to_vec()];
        let second = vec![b"h2".to_vec()];
        let mut buf = Vec::new();
        encode_envelope(&first, &mut buf);
        encode_envelope(&second, &mut buf);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_envelope(&mut cursor).unwrap(), first);
        assert_eq!(read_envelope(&mut cursor).unwrap(), second);
    }

    #[test]
    fn truncated_stream_is_connect_error() {
        let mut buf = Vec::new();
        encode_envelope(&[vec![1, 2, 3, 4]], &mut buf);
        buf.truncate(buf.len() - 2);
        let err = read_envelope(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
    }

    #[test]
    fn absurd_length_is_decode_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_be_bytes());
        buf.push(0);
        let err = read_frame(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
