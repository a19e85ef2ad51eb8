//! Dynamixel Protocol 1.0 framing.
//!
//! Instruction packet: `FF FF id len instr params… checksum`
//! Status packet:      `FF FF id len error params… checksum`
//!
//! `len` counts the bytes after itself (instruction/error, parameters and
//! checksum).  The checksum is the bitwise NOT of the low byte of the sum of
//! every byte from `id` to the last parameter.

use thiserror::Error;

pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction codes.
pub mod instruction {
    pub const READ: u8 = 0x02;
    pub const WRITE: u8 = 0x03;
}

/// AX-12 control table addresses.
pub mod address {
    /// 1 byte.
    pub const TORQUE_ENABLE: u8 = 24;
    /// 2 bytes, little endian.
    pub const GOAL_POSITION: u8 = 30;
    /// 2 bytes, little endian.
    pub const MOVING_SPEED: u8 = 32;
    /// 2 bytes, little endian.
    pub const PRESENT_POSITION: u8 = 36;
}

/// Framing errors detected while decoding a status packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad header {0:02X?}")]
    BadHeader([u8; 2]),

    #[error("length byte {0} is too small for a status packet")]
    BadLength(u8),

    #[error("frame is {found} bytes, length byte announces {expected}")]
    Truncated { expected: usize, found: usize },

    #[error("checksum mismatch: expected {expected:#04X}, found {found:#04X}")]
    Checksum { expected: u8, found: u8 },

    #[error("status from id {found}, expected id {expected}")]
    IdMismatch { expected: u8, found: u8 },

    #[error("expected {expected} parameter bytes, got {found}")]
    ShortPayload { expected: usize, found: usize },
}

/// Error byte of a status packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    const NAMES: [&'static str; 7] = [
        "input voltage",
        "angle limit",
        "overheating",
        "range",
        "checksum",
        "overload",
        "instruction",
    ];

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Names of every bit set in the error byte.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("ok");
        }
        write!(f, "{}", self.names().join(", "))
    }
}

/// A decoded status packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    pub flags: StatusFlags,
    pub params: Vec<u8>,
}

impl StatusPacket {
    /// Interpret the first two parameter bytes as a little-endian word.
    pub fn word(&self) -> Result<u16, ProtocolError> {
        match self.params.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            other => Err(ProtocolError::ShortPayload {
                expected: 2,
                found: other.len(),
            }),
        }
    }
}

pub fn checksum(body: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for &b in body {
        sum = sum.wrapping_add(b);
    }
    !sum
}

/// Encode an instruction packet.
pub fn instruction_packet(id: u8, instr: u8, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8;
    let mut pkt = Vec::with_capacity(6 + params.len());
    pkt.extend_from_slice(&HEADER);
    pkt.push(id);
    pkt.push(length);
    pkt.push(instr);
    pkt.extend_from_slice(params);
    pkt.push(checksum(&pkt[2..]));
    pkt
}

/// `WRITE_DATA` of `data` starting at `address`.
pub fn write_packet(id: u8, address: u8, data: &[u8]) -> Vec<u8> {
    let mut params = Vec::with_capacity(1 + data.len());
    params.push(address);
    params.extend_from_slice(data);
    instruction_packet(id, instruction::WRITE, &params)
}

/// `READ_DATA` of `len` bytes starting at `address`.
pub fn read_packet(id: u8, address: u8, len: u8) -> Vec<u8> {
    instruction_packet(id, instruction::READ, &[address, len])
}

/// Validate the 4-byte status prefix (`FF FF id len`) and return how many
/// bytes remain to be read.
pub fn remaining_len(prefix: &[u8; 4]) -> Result<usize, ProtocolError> {
    if prefix[..2] != HEADER {
        return Err(ProtocolError::BadHeader([prefix[0], prefix[1]]));
    }
    if prefix[3] < 2 {
        return Err(ProtocolError::BadLength(prefix[3]));
    }
    Ok(prefix[3] as usize)
}

/// Decode a complete status frame, header included.
pub fn parse_status(frame: &[u8]) -> Result<StatusPacket, ProtocolError> {
    if frame.len() < 6 {
        return Err(ProtocolError::Truncated {
            expected: 6,
            found: frame.len(),
        });
    }
    let prefix = [frame[0], frame[1], frame[2], frame[3]];
    let len = remaining_len(&prefix)?;
    if frame.len() != 4 + len {
        return Err(ProtocolError::Truncated {
            expected: 4 + len,
            found: frame.len(),
        });
    }
    let last = frame.len() - 1;
    let expected = checksum(&frame[2..last]);
    if frame[last] != expected {
        return Err(ProtocolError::Checksum {
            expected,
            found: frame[last],
        });
    }
    Ok(StatusPacket {
        id: frame[2],
        flags: StatusFlags(frame[4]),
        params: frame[5..last].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference frames from the AX-12 manual.

    #[test]
    fn write_packet_matches_manual() {
        // Turn on the LED of id 1 (address 0x19).
        assert_eq!(
            write_packet(1, 0x19, &[0x01]),
            vec![0xFF, 0xFF, 0x01, 0x04, 0x03, 0x19, 0x01, 0xDD]
        );
    }

    #[test]
    fn read_packet_matches_manual() {
        // Read the present temperature of id 1 (address 0x2B, 1 byte).
        assert_eq!(
            read_packet(1, 0x2B, 1),
            vec![0xFF, 0xFF, 0x01, 0x04, 0x02, 0x2B, 0x01, 0xCC]
        );
    }

    #[test]
    fn goal_position_write_is_little_endian() {
        let pkt = write_packet(6, address::GOAL_POSITION, &412u16.to_le_bytes());
        assert_eq!(&pkt[5..8], &[30, 0x9C, 0x01]);
        assert_eq!(*pkt.last().unwrap(), checksum(&pkt[2..pkt.len() - 1]));
    }

    #[test]
    fn parse_status_from_manual() {
        let status = parse_status(&[0xFF, 0xFF, 0x01, 0x03, 0x00, 0x20, 0xDB]).unwrap();
        assert_eq!(status.id, 1);
        assert!(status.flags.is_empty());
        assert_eq!(status.params, vec![0x20]);
    }

    #[test]
    fn parse_status_rejects_corrupted_checksum() {
        let err = parse_status(&[0xFF, 0xFF, 0x01, 0x03, 0x00, 0x20, 0xDA]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Checksum {
                expected: 0xDB,
                found: 0xDA
            }
        );
    }

    #[test]
    fn parse_status_rejects_bad_header() {
        let err = parse_status(&[0xFF, 0x00, 0x01, 0x02, 0x00, 0xFC]).unwrap_err();
        assert!(matches!(err, ProtocolError::BadHeader(_)));
    }

    #[test]
    fn parse_status_rejects_truncated_frame() {
        let err = parse_status(&[0xFF, 0xFF, 0x01, 0x04, 0x00, 0x20, 0xDB]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { expected: 8, found: 7 }));
    }

    #[test]
    fn word_reads_two_param_bytes() {
        let body = [0x01, 0x04, 0x00, 0x00, 0x02];
        let mut frame = vec![0xFF, 0xFF];
        frame.extend_from_slice(&body);
        frame.push(checksum(&body));
        let status = parse_status(&frame).unwrap();
        assert_eq!(status.word().unwrap(), 512);
    }

    #[test]
    fn status_flags_name_every_bit() {
        let flags = StatusFlags(0b0010_0010);
        assert_eq!(flags.names(), vec!["angle limit", "overload"]);
        assert_eq!(flags.to_string(), "angle limit, overload");
        assert_eq!(StatusFlags(0).to_string(), "ok");
    }
}
