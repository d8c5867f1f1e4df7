//! Docker raw-stream multiplex frame encoding (spec §4.3)
//!
//! Non-TTY attach/exec/logs output is framed as a 1-byte stream type, 3
//! bytes of zero padding, a 4-byte big-endian payload length, then the
//! payload. TTY output is written unframed and is not touched by this
//! module.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl StreamType {
    fn tag(self) -> u8 {
        match self {
            StreamType::Stdout => 1,
            StreamType::Stderr => 2,
        }
    }
}

pub fn encode_frame(stream: StreamType, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.push(stream.tag());
    frame.extend_from_slice(&[0, 0, 0]);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_matches_wire_layout() {
        let frame = encode_frame(StreamType::Stdout, b"hi");
        assert_eq!(frame[0], 1);
        assert_eq!(&frame[1..4], &[0, 0, 0]);
        assert_eq!(u32::from_be_bytes(frame[4..8].try_into().unwrap()), 2);
        assert_eq!(&frame[8..], b"hi");
    }

    #[test]
    fn stderr_tag_is_two() {
        let frame = encode_frame(StreamType::Stderr, b"x");
        assert_eq!(frame[0], 2);
    }
}
