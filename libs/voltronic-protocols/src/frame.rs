//! Voltronic frame codec
//!
//! Wire format in both directions:
//!
//! ```text
//! +---------------+------------------+------+
//! | ASCII payload | CRC16-XMODEM(BE) | 0x0D |
//! +---------------+------------------+------+
//! ```
//!
//! The checksum covers the payload only. The codec is marker-agnostic:
//! the leading `(` on device responses is payload as far as framing is
//! concerned, and checking/stripping it is the transport's job.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use voltronic_comlink::{LinkError, Result};

use crate::crc16::crc16_xmodem;

/// Frame terminator (carriage return)
pub const CR: u8 = 0x0D;

/// Leading marker byte on device responses
pub const MARKER: u8 = b'(';

/// Smallest structurally valid frame: 1 payload byte + 2 checksum + CR
const MIN_FRAME_LEN: usize = 4;

/// Upper bound on a single frame; a stream that never produces a CR
/// must not grow the decode buffer without limit
const MAX_FRAME_LEN: usize = 1024;

/// Pack an ASCII message into a wire frame.
pub fn pack(message: &str) -> Result<Vec<u8>> {
    if !message.is_ascii() {
        return Err(LinkError::encoding(format!(
            "command is not ASCII: {message:?}"
        )));
    }
    Ok(pack_bytes(message.as_bytes()))
}

/// Frame a payload that is already known to be valid wire bytes.
pub(crate) fn pack_bytes(payload: &[u8]) -> Vec<u8> {
    let checksum = crc16_xmodem(payload);
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&checksum.to_be_bytes());
    frame.push(CR);
    frame
}

/// Validate a wire frame and return its payload bytes.
///
/// Checks run in order: terminator, minimum length, checksum. A leading
/// response marker is left in place.
pub fn unpack(frame: &[u8]) -> Result<&[u8]> {
    if frame.last() != Some(&CR) {
        return Err(LinkError::invalid_message(
            "frame missing carriage return terminator",
        ));
    }
    if frame.len() < MIN_FRAME_LEN {
        return Err(LinkError::invalid_message(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }

    let payload = &frame[..frame.len() - 3];
    let expected = u16::from_be_bytes([frame[frame.len() - 3], frame[frame.len() - 2]]);
    let actual = crc16_xmodem(payload);
    if expected != actual {
        return Err(LinkError::ChecksumMismatch { expected, actual });
    }

    Ok(payload)
}

/// Validate a wire frame and return its payload as ASCII text.
pub fn unpack_text(frame: &[u8]) -> Result<String> {
    let payload = unpack(frame)?;
    let text = std::str::from_utf8(payload)
        .map_err(|e| LinkError::encoding(format!("payload is not valid ASCII: {e}")))?;
    Ok(text.to_string())
}

/// Splits an RS232 byte stream into CR-terminated frames.
///
/// Each decoded item includes its trailing `0x0D` so it can be fed to
/// [`unpack`] unchanged.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Bytes>, io::Error> {
        if let Some(pos) = src.iter().position(|&b| b == CR) {
            let frame = src.split_to(pos + 1).freeze();
            return Ok(Some(frame));
        }
        if src.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame exceeds {MAX_FRAME_LEN} bytes without terminator"),
            ));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_known_frames() {
        assert_eq!(
            pack("QPI").unwrap(),
            vec![0x51, 0x50, 0x49, 0xBE, 0xAC, 0x0D]
        );
        assert_eq!(
            pack("VOLTRONICS").unwrap(),
            vec![0x56, 0x4F, 0x4C, 0x54, 0x52, 0x4F, 0x4E, 0x49, 0x43, 0x53, 0x6C, 0x3E, 0x0D]
        );
    }

    #[test]
    fn pack_rejects_non_ascii() {
        let err = pack("QPI\u{2764}").unwrap_err();
        assert_eq!(err.kind(), "encoding");
    }

    #[test]
    fn unpack_round_trip_preserves_marker() {
        let frame = pack("(92931701100510").unwrap();
        let payload = unpack(&frame).unwrap();
        assert_eq!(payload, b"(92931701100510");
        assert_eq!(unpack_text(&frame).unwrap(), "(92931701100510");
    }

    #[test]
    fn unpack_detects_corruption() {
        let mut frame = pack("QPI").unwrap();
        frame[1] ^= 0x01;
        match unpack(&frame) {
            Err(LinkError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, 0xBEAC);
                assert_ne!(actual, 0xBEAC);
            },
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn unpack_rejects_missing_terminator() {
        let mut frame = pack("QPI").unwrap();
        frame.pop();
        let err = unpack(&frame).unwrap_err();
        assert_eq!(err.kind(), "invalid_message");
    }

    #[test]
    fn unpack_rejects_short_frames() {
        assert_eq!(unpack(&[0x0D]).unwrap_err().kind(), "invalid_message");
        assert_eq!(
            unpack(&[0x01, 0x02, 0x0D]).unwrap_err().kind(),
            "invalid_message"
        );
        assert!(unpack(&[]).is_err());
    }

    #[test]
    fn codec_splits_consecutive_frames() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&pack("(ACK").unwrap());
        buf.extend_from_slice(&pack("(NAK").unwrap());

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, Bytes::from(pack("(ACK").unwrap()));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, Bytes::from(pack("(NAK").unwrap()));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn codec_waits_for_terminator() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        let frame = pack("(230.1 49.9").unwrap();
        let (head, tail) = frame.split_at(4);

        buf.extend_from_slice(head);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(tail);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Bytes::from(frame));
    }

    #[test]
    fn codec_rejects_unbounded_garbage() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(vec![b'x'; MAX_FRAME_LEN + 1].as_slice());
        assert!(codec.decode(&mut buf).is_err());
    }
}
