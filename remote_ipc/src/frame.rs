//! Length-prefixed envelope framing for byte streams.
//!
//! ```text
//! | len (4, big-endian) | envelope JSON (len) |
//! ```

use ipc::MessageEnvelope;
use std::io::{self, Read, Write};

/// Frames larger than this are rejected as corrupt.
pub(crate) const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes a whole frame, header included, without touching any stream.
pub(crate) fn encode_frame(envelope: &MessageEnvelope) -> io::Result<Vec<u8>> {
    let body = envelope
        .to_bytes()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit", body.len()),
        ));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub(crate) fn write_frame<W: Write>(writer: &mut W, envelope: &MessageEnvelope) -> io::Result<()> {
    let frame = encode_frame(envelope)?;
    writer.write_all(&frame)?;
    writer.flush()
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<MessageEnvelope>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    MessageEnvelope::from_bytes(&body)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipc::{MessagePayload, SchemaVersion};
    use std::io::Cursor;

    fn envelope(action: &str) -> MessageEnvelope {
        MessageEnvelope::new(
            action,
            SchemaVersion::new(1, 0),
            MessagePayload::new(&42u32).unwrap(),
        )
    }

    #[test]
    fn test_frames_back_to_back() {
        let first = envelope("a");
        let second = envelope("b");
        let mut buf = Vec::new();
        write_frame(&mut buf, &first).unwrap();
        write_frame(&mut buf, &second).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap().id, first.id);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap().id, second.id);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut cursor = Cursor::new(((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_oversized_envelope_not_encoded() {
        let big = MessageEnvelope::new(
            "big",
            SchemaVersion::new(1, 0),
            MessagePayload::from_raw(vec![b'1'; MAX_FRAME_LEN]),
        );
        let err = encode_frame(&big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut buf = Vec::new();
        assert!(write_frame(&mut buf, &big).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_body_is_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &envelope("a")).unwrap();
        buf.truncate(buf.len() - 1);

        let err = read_frame(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
