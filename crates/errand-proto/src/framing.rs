//! Length-prefixed frame reading and writing.
//!
//! A frame is a `u64` little-endian byte count followed by that many payload
//! bytes. Oversized frames are rejected before any allocation so a broken or
//! hostile peer cannot exhaust daemon memory.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_BYTES: u64 = 4 * 1024 * 1024;

/// Errors surfaced while reading or writing a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream or an OS-level read/write failed.
    #[error("frame IO failed: {0}")]
    Io(#[from] io::Error),

    /// The announced payload length exceeds [`MAX_FRAME_BYTES`].
    #[error("frame of {size} bytes exceeds {max} byte limit")]
    TooLarge { size: u64, max: u64 },
}

/// Reads one complete frame, blocking until all announced bytes arrive.
///
/// # Errors
///
/// Returns [`FrameError::Io`] on short reads or socket errors and
/// [`FrameError::TooLarge`] when the length prefix exceeds the frame limit.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0_u8; 8];
    reader.read_exact(&mut prefix)?;
    let size = u64::from_le_bytes(prefix);
    if size > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_FRAME_BYTES,
        });
    }
    #[allow(clippy::cast_possible_truncation)]
    let mut payload = vec![0_u8; size as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] for oversized payloads and
/// [`FrameError::Io`] when the underlying write fails.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let size = payload.len() as u64;
    if size > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_FRAME_BYTES,
        });
    }
    writer.write_all(&size.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case::json(b"{\"command\":[]}".as_slice())]
    #[case::empty(b"".as_slice())]
    #[case::binary(&[0_u8, 255, 10, 13])]
    fn frame_round_trip(#[case] payload: &[u8]) {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, payload).expect("write");
        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_frame(&mut cursor).expect("read"), payload);
    }

    #[test]
    fn rejects_oversized_length_prefix() {
        let mut frame = (MAX_FRAME_BYTES + 1).to_le_bytes().to_vec();
        frame.extend_from_slice(b"x");
        let mut cursor = Cursor::new(frame);
        let error = read_frame(&mut cursor).expect_err("should reject");
        assert!(matches!(error, FrameError::TooLarge { .. }));
    }

    #[test]
    fn short_read_is_an_io_error() {
        let mut frame = 16_u64.to_le_bytes().to_vec();
        frame.extend_from_slice(b"only nine");
        let mut cursor = Cursor::new(frame);
        let error = read_frame(&mut cursor).expect_err("should fail");
        assert!(matches!(error, FrameError::Io(_)));
    }

    #[test]
    fn consecutive_frames_preserve_boundaries() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"first").expect("write first");
        write_frame(&mut buffer, b"second").expect("write second");
        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_frame(&mut cursor).expect("first"), b"first");
        assert_eq!(read_frame(&mut cursor).expect("second"), b"second");
    }
}
