// Wire model for remote drive commands
//
// A datagram is a sequence of 3-byte frames with no separator:
//   [header, payload_lo, payload_hi]
// Payload is a signed 16-bit little-endian duty for the axis headers and
// ignored for the others. No versioning, checksum or acknowledgment.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const FRAME_LEN: usize = 3;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    XAxis = 1,
    YAxis = 2,
    PowerOn = 5,
    PowerOff = 6,
    EStop = 7,
}

impl TryFrom<u8> for Header {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(Header::XAxis),
            2 => Ok(Header::YAxis),
            5 => Ok(Header::PowerOn),
            6 => Ok(Header::PowerOff),
            7 => Ok(Header::EStop),
            other => Err(other),
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Duty for channel A (X axis)
    SetA(i16),
    /// Duty for channel B (Y axis)
    SetB(i16),
    PowerOn,
    PowerOff,
    EStop,
    /// Unrecognised header, skipped by dispatch
    Unknown(u8),
}

impl Command {
    pub fn from_frame(frame: [u8; FRAME_LEN]) -> Self {
        let payload = i16::from_le_bytes([frame[1], frame[2]]);
        match Header::try_from(frame[0]) {
            Ok(Header::XAxis) => Command::SetA(payload),
            Ok(Header::YAxis) => Command::SetB(payload),
            Ok(Header::PowerOn) => Command::PowerOn,
            Ok(Header::PowerOff) => Command::PowerOff,
            Ok(Header::EStop) => Command::EStop,
            Err(header) => Command::Unknown(header),
        }
    }

    /// Frame bytes as sent by a client; payload is zero when unused
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let (header, payload) = match *self {
            Command::SetA(duty) => (Header::XAxis as u8, duty),
            Command::SetB(duty) => (Header::YAxis as u8, duty),
            Command::PowerOn => (Header::PowerOn as u8, 0),
            Command::PowerOff => (Header::PowerOff as u8, 0),
            Command::EStop => (Header::EStop as u8, 0),
            Command::Unknown(header) => (header, 0),
        };
        let [lo, hi] = payload.to_le_bytes();
        [header, lo, hi]
    }
}

/// What to do with a datagram whose length is not a multiple of 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Apply the complete frames and drop the 1-2 trailing bytes
    #[default]
    Truncate,
    /// Drop the whole datagram
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty datagram")]
    Empty,

    #[error("Datagram length {len} is not a multiple of 3")]
    TrailingBytes { len: usize },
}

/// Split a datagram into commands.
///
/// Never reads past the end of `buf`: a partial final frame is either
/// dropped or fails the whole datagram, depending on `policy`.
pub fn decode_frames(buf: &[u8], policy: TrailingPolicy) -> Result<Vec<Command>, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty);
    }

    let chunks = buf.chunks_exact(FRAME_LEN);
    let trailing = chunks.remainder().len();
    if trailing != 0 {
        match policy {
            TrailingPolicy::Reject => return Err(DecodeError::TrailingBytes { len: buf.len() }),
            TrailingPolicy::Truncate => {
                warn!("Dropping {} trailing byte(s) of a {}-byte datagram", trailing, buf.len());
            }
        }
    }

    Ok(chunks
        .map(|chunk| Command::from_frame([chunk[0], chunk[1], chunk[2]]))
        .collect())
}

/// Encode a sequence of commands into one datagram
pub fn encode_frames(commands: &[Command]) -> Vec<u8> {
    commands.iter().flat_map(|cmd| cmd.encode()).collect()
}

/// Health status reported by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_little_endian_signed() {
        assert_eq!(Command::from_frame([1, 0x00, 0x01]), Command::SetA(256));
        assert_eq!(Command::from_frame([2, 0xFF, 0xFF]), Command::SetB(-1));
        assert_eq!(Command::from_frame([1, 0x01, 0xFC]), Command::SetA(-1023));
    }

    #[test]
    fn test_payload_ignored_for_power_headers() {
        assert_eq!(Command::from_frame([5, 0xAB, 0xCD]), Command::PowerOn);
        assert_eq!(Command::from_frame([6, 0, 0]), Command::PowerOff);
        assert_eq!(Command::from_frame([7, 1, 2]), Command::EStop);
    }

    #[test]
    fn test_unknown_header() {
        assert_eq!(Command::from_frame([9, 0, 0]), Command::Unknown(9));
        assert_eq!(Command::from_frame([0, 0, 0]), Command::Unknown(0));
        assert_eq!(Header::try_from(3), Err(3));
    }

    #[test]
    fn test_truncate_drops_trailing_fragment() {
        let buf = [1, 0x00, 0x01, 5, 0x00, 0x00, 7];
        let commands = decode_frames(&buf, TrailingPolicy::Truncate).unwrap();
        assert_eq!(commands, vec![Command::SetA(256), Command::PowerOn]);
    }

    #[test]
    fn test_reject_fails_whole_datagram() {
        let buf = [1, 0x00, 0x01, 5, 0x00, 0x00, 7];
        assert_eq!(
            decode_frames(&buf, TrailingPolicy::Reject),
            Err(DecodeError::TrailingBytes { len: 7 })
        );
        assert_eq!(
            decode_frames(&[5, 0, 0], TrailingPolicy::Reject),
            Ok(vec![Command::PowerOn])
        );
    }

    #[test]
    fn test_empty_and_fragment_only() {
        assert_eq!(decode_frames(&[], TrailingPolicy::Truncate), Err(DecodeError::Empty));
        assert_eq!(decode_frames(&[7, 0], TrailingPolicy::Truncate), Ok(vec![]));
    }

    #[test]
    fn test_encode_matches_wire_layout() {
        assert_eq!(Command::SetB(-2).encode(), [2, 0xFE, 0xFF]);
        assert_eq!(Command::EStop.encode(), [7, 0, 0]);
        let datagram = encode_frames(&[Command::PowerOn, Command::SetA(512)]);
        assert_eq!(datagram, vec![5, 0, 0, 1, 0x00, 0x02]);
    }
}
