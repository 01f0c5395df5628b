//! Frame encoding/decoding
//!
//! Implements the fixed-size binary frame format shared by all devices.
//!
//! Frame formats:
//! - Command: `[STX][ADDR][OPCODE][PARAM_LO][PARAM_HI][ETX][CHK_LO][CHK_HI]` (8 bytes)
//! - Factory command: as above but with a 32-bit password after the opcode
//!   and a 32-bit parameter (14 bytes)
//! - Reply: `[STX][ADDR][STATUS][PARAM_LO][PARAM_HI][ETX][CHK_LO][CHK_HI]` (8 bytes)
//!
//! CHK = (sum of all prior bytes) mod 65536, little-endian.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{DeviceErrorKind, ProtocolError};

/// Frame start marker.
pub const STX: u8 = 0xCC;

/// Frame end marker.
pub const ETX: u8 = 0xDD;

/// Encoded size of a command frame, checksum included.
pub const COMMAND_FRAME_LEN: usize = 8;

/// Encoded size of a factory command frame, checksum included.
pub const FACTORY_FRAME_LEN: usize = 14;

/// Encoded size of a reply frame, checksum included.
pub const REPLY_FRAME_LEN: usize = 8;

/// Password embedded in factory command frames.
pub const FACTORY_PASSWORD: u32 = 0xFFEE_BBAA;

/// Compute the frame checksum: byte sum truncated to 16 bits.
pub fn checksum(body: &[u8]) -> u16 {
    body.iter().map(|b| *b as u32).sum::<u32>() as u16
}

/// A command frame addressed to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Device address (0-127).
    pub address: u8,
    /// Function code.
    pub opcode: u8,
    /// 16-bit command parameter.
    pub parameter: u16,
}

impl CommandFrame {
    /// Create a command frame. Addresses above 0x7F are not representable on
    /// the bus; callers validate before constructing.
    pub fn new(address: u8, opcode: u8, parameter: u16) -> Self {
        debug_assert!(address <= 0x7F, "device address must be 0-127");
        Self {
            address,
            opcode,
            parameter,
        }
    }

    /// Encode the frame to raw bytes.
    pub fn to_bytes(&self) -> [u8; COMMAND_FRAME_LEN] {
        let mut bytes = [0u8; COMMAND_FRAME_LEN];
        bytes[0] = STX;
        bytes[1] = self.address;
        bytes[2] = self.opcode;
        LittleEndian::write_u16(&mut bytes[3..5], self.parameter);
        bytes[5] = ETX;
        let chk = checksum(&bytes[..6]);
        LittleEndian::write_u16(&mut bytes[6..8], chk);
        bytes
    }

    /// Decode a command frame from raw bytes.
    ///
    /// Used by the device simulator and by tests; a real device is the usual
    /// consumer of command frames.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < COMMAND_FRAME_LEN {
            return Err(ProtocolError::ShortFrame {
                got: data.len(),
                need: COMMAND_FRAME_LEN,
            });
        }
        if data[0] != STX {
            return Err(ProtocolError::BadStartMarker(data[0]));
        }
        if data[5] != ETX {
            return Err(ProtocolError::BadEndMarker(data[5]));
        }
        let expected = checksum(&data[..6]);
        let actual = LittleEndian::read_u16(&data[6..8]);
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }
        Ok(Self {
            address: data[1],
            opcode: data[2],
            parameter: LittleEndian::read_u16(&data[3..5]),
        })
    }
}

/// A password-protected factory command frame.
///
/// Factory commands change persistent device settings (address, baud rates)
/// and carry a 32-bit parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryFrame {
    /// Device address (0-127).
    pub address: u8,
    /// Factory function code.
    pub opcode: u8,
    /// 32-bit command parameter.
    pub parameter: u32,
}

impl FactoryFrame {
    /// Create a factory command frame.
    pub fn new(address: u8, opcode: u8, parameter: u32) -> Self {
        debug_assert!(address <= 0x7F, "device address must be 0-127");
        Self {
            address,
            opcode,
            parameter,
        }
    }

    /// Encode the frame to raw bytes, password included.
    pub fn to_bytes(&self) -> [u8; FACTORY_FRAME_LEN] {
        let mut bytes = [0u8; FACTORY_FRAME_LEN];
        bytes[0] = STX;
        bytes[1] = self.address;
        bytes[2] = self.opcode;
        LittleEndian::write_u32(&mut bytes[3..7], FACTORY_PASSWORD);
        LittleEndian::write_u32(&mut bytes[7..11], self.parameter);
        bytes[11] = ETX;
        let chk = checksum(&bytes[..12]);
        LittleEndian::write_u16(&mut bytes[12..14], chk);
        bytes
    }
}

/// Status codes a device may report in the STATUS field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// Command accepted and completed.
    Normal,
    /// The device could not parse the command frame.
    FrameError,
    /// The command parameter was rejected.
    ParameterError,
    /// The homing optocoupler misbehaved.
    OptocouplerError,
    /// The motor is busy executing a previous motion.
    MotorBusy,
    /// The motor stalled mid-motion.
    MotorStalled,
    /// The device does not know its current location.
    UnknownLocation,
    /// The device refused the command in its current state.
    CommandRejected,
    /// The requested location is outside travel or port range.
    IllegalLocation,
    /// A task execution error was reported.
    TaskExecution,
    /// An error code outside the published table.
    Unknown(u8),
}

impl ReplyStatus {
    /// Decode the 8-bit STATUS field.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => ReplyStatus::Normal,
            0x01 => ReplyStatus::FrameError,
            0x02 => ReplyStatus::ParameterError,
            0x03 => ReplyStatus::OptocouplerError,
            0x04 => ReplyStatus::MotorBusy,
            0x05 => ReplyStatus::MotorStalled,
            0x06 => ReplyStatus::UnknownLocation,
            0x07 => ReplyStatus::CommandRejected,
            0x08 => ReplyStatus::IllegalLocation,
            0xFE => ReplyStatus::TaskExecution,
            other => ReplyStatus::Unknown(other),
        }
    }

    /// The wire code for this status.
    pub fn code(&self) -> u8 {
        match self {
            ReplyStatus::Normal => 0x00,
            ReplyStatus::FrameError => 0x01,
            ReplyStatus::ParameterError => 0x02,
            ReplyStatus::OptocouplerError => 0x03,
            ReplyStatus::MotorBusy => 0x04,
            ReplyStatus::MotorStalled => 0x05,
            ReplyStatus::UnknownLocation => 0x06,
            ReplyStatus::CommandRejected => 0x07,
            ReplyStatus::IllegalLocation => 0x08,
            ReplyStatus::TaskExecution => 0xFE,
            ReplyStatus::Unknown(code) => *code,
        }
    }

    /// Map the status to an error kind; the normal state maps to `None`.
    pub fn to_error(self) -> Option<DeviceErrorKind> {
        match self {
            ReplyStatus::Normal => None,
            ReplyStatus::FrameError => Some(DeviceErrorKind::FrameError),
            ReplyStatus::ParameterError => Some(DeviceErrorKind::ParameterError),
            ReplyStatus::OptocouplerError => Some(DeviceErrorKind::OptocouplerError),
            ReplyStatus::MotorBusy => Some(DeviceErrorKind::MotorBusy),
            ReplyStatus::MotorStalled => Some(DeviceErrorKind::MotorStalled),
            ReplyStatus::UnknownLocation => Some(DeviceErrorKind::UnknownLocation),
            ReplyStatus::CommandRejected => Some(DeviceErrorKind::CommandRejected),
            ReplyStatus::IllegalLocation => Some(DeviceErrorKind::IllegalLocation),
            ReplyStatus::TaskExecution => Some(DeviceErrorKind::TaskExecution),
            ReplyStatus::Unknown(code) => Some(DeviceErrorKind::Unknown(code)),
        }
    }
}

/// A decoded reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyFrame {
    /// Address of the replying device.
    pub address: u8,
    /// Raw 8-bit status code.
    pub status: u8,
    /// 16-bit reply parameter.
    pub parameter: u16,
}

impl ReplyFrame {
    /// Decode a reply frame from raw bytes.
    ///
    /// Callers must not invoke this until a full frame's worth of bytes has
    /// arrived; it never blocks. The checksum is verified before the status
    /// and parameter fields are trusted.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < REPLY_FRAME_LEN {
            return Err(ProtocolError::ShortFrame {
                got: data.len(),
                need: REPLY_FRAME_LEN,
            });
        }
        if data[0] != STX {
            return Err(ProtocolError::BadStartMarker(data[0]));
        }
        if data[5] != ETX {
            return Err(ProtocolError::BadEndMarker(data[5]));
        }
        let expected = checksum(&data[..6]);
        let actual = LittleEndian::read_u16(&data[6..8]);
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }
        Ok(Self {
            address: data[1],
            status: data[2],
            parameter: LittleEndian::read_u16(&data[3..5]),
        })
    }

    /// Encode the frame to raw bytes.
    ///
    /// Replies normally originate from hardware; this is the simulator's and
    /// the tests' side of the link.
    pub fn to_bytes(&self) -> [u8; REPLY_FRAME_LEN] {
        let mut bytes = [0u8; REPLY_FRAME_LEN];
        bytes[0] = STX;
        bytes[1] = self.address;
        bytes[2] = self.status;
        LittleEndian::write_u16(&mut bytes[3..5], self.parameter);
        bytes[5] = ETX;
        let chk = checksum(&bytes[..6]);
        LittleEndian::write_u16(&mut bytes[6..8], chk);
        bytes
    }

    /// The decoded status field.
    pub fn status(&self) -> ReplyStatus {
        ReplyStatus::from_code(self.status)
    }

    /// Fail with the device's error kind if the status is non-normal.
    pub fn check_status(&self) -> Result<(), DeviceErrorKind> {
        match self.status().to_error() {
            None => Ok(()),
            Some(kind) => Err(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_roundtrip() {
        let original = CommandFrame::new(0x05, 0x42, 0x1234);
        let encoded = original.to_bytes();
        let decoded = CommandFrame::from_bytes(&encoded).expect("Should decode successfully");
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_command_layout() {
        let frame = CommandFrame::new(0x00, 0x20, 0x0000);
        let bytes = frame.to_bytes();
        // STX, addr, opcode, param lo/hi, ETX, checksum of 0xCC+0x20+0xDD.
        assert_eq!(bytes, [0xCC, 0x00, 0x20, 0x00, 0x00, 0xDD, 0xC9, 0x01]);
    }

    #[test]
    fn test_reply_roundtrip() {
        let original = ReplyFrame {
            address: 0x01,
            status: 0x00,
            parameter: 0x0BB8,
        };
        let decoded = ReplyFrame::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_checksum_verification() {
        let frame = CommandFrame::new(0x01, 0x66, 0x0100);
        let mut encoded = frame.to_bytes();

        // Corrupt a parameter byte
        encoded[3] ^= 0xFF;

        assert!(matches!(
            CommandFrame::from_bytes(&encoded),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_short_frame() {
        let err = ReplyFrame::from_bytes(&[0xCC, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortFrame { got: 3, need: 8 }));
    }

    #[test]
    fn test_bad_markers() {
        let mut bytes = ReplyFrame {
            address: 0,
            status: 0,
            parameter: 0,
        }
        .to_bytes();
        bytes[0] = 0xAA;
        assert!(matches!(
            ReplyFrame::from_bytes(&bytes),
            Err(ProtocolError::BadStartMarker(0xAA))
        ));
    }

    #[test]
    fn test_factory_frame_layout() {
        let frame = FactoryFrame::new(0x02, 0x01, 4);
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), FACTORY_FRAME_LEN);
        assert_eq!(bytes[0], STX);
        // Password sits between the opcode and the parameter, little-endian.
        assert_eq!(&bytes[3..7], &[0xAA, 0xBB, 0xEE, 0xFF]);
        assert_eq!(&bytes[7..11], &[0x04, 0x00, 0x00, 0x00]);
        assert_eq!(bytes[11], ETX);
        let chk = checksum(&bytes[..12]);
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), chk);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ReplyStatus::from_code(0x00).to_error(), None);
        assert_eq!(
            ReplyStatus::from_code(0x04).to_error(),
            Some(DeviceErrorKind::MotorBusy)
        );
        assert_eq!(
            ReplyStatus::from_code(0xFE).to_error(),
            Some(DeviceErrorKind::TaskExecution)
        );
        assert_eq!(
            ReplyStatus::from_code(0xFF).to_error(),
            Some(DeviceErrorKind::Unknown(0xFF))
        );
    }
}
