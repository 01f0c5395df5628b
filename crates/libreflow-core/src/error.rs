//! Error taxonomy
//!
//! Errors are split by origin: the serial link (`TransportError`), connection
//! establishment (`ConnectError`), the wire format (`ProtocolError`), the
//! device itself (`DeviceErrorKind`), and caller-side contract violations
//! detected before any I/O (`UsageError`).

use thiserror::Error;

use crate::protocol::Protocol;

/// Errors raised by the byte-stream transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The serial port could not be opened.
    #[error("failed to open {port}: {reason}")]
    OpenFailed {
        /// Port name as passed to the OS.
        port: String,
        /// Underlying serial error text.
        reason: String,
    },

    /// Writing the command frame to the link failed.
    #[error("serial write failed: {0}")]
    WriteFailed(String),

    /// Reading from the link failed.
    #[error("serial read failed: {0}")]
    ReadFailed(String),

    /// No reply arrived within the applicable timeout. The dispatcher stays
    /// in its awaiting state so the caller may retry waiting.
    #[error("no reply within {timeout_ms} ms")]
    ReplyTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

/// Errors raised while establishing a device connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Every candidate baud rate was tried without a coherent handshake reply.
    #[error("no handshake from device on {port} (tried baud rates {tried:?})")]
    NoHandshake {
        /// Port name the connection was attempted on.
        port: String,
        /// Baud rates tried, in order.
        tried: Vec<u32>,
    },

    /// The device reported an address different from the one specified.
    #[error("device address mismatch: specified 0x{specified:02x}, device reports 0x{actual:02x}")]
    AddressMismatch {
        /// Address the caller asked to connect to.
        specified: u8,
        /// Address the device actually reported.
        actual: u8,
    },

    /// The requested protocol variant is declared but not implemented.
    #[error("protocol variant {0:?} is not implemented")]
    UnsupportedProtocol(Protocol),

    /// The syringe volume is not one the hardware variant ships with.
    #[error("unsupported syringe volume {volume_ul} uL (supported: {supported:?})")]
    UnsupportedVolume {
        /// Requested volume in microliters.
        volume_ul: u32,
        /// Volumes the variant supports.
        supported: &'static [u32],
    },

    /// The port count is not one the hardware variant ships with.
    #[error("unsupported port count {count} (supported: {supported:?})")]
    UnsupportedPortCount {
        /// Requested number of ports.
        count: u8,
        /// Port counts the variant supports.
        supported: &'static [u8],
    },
}

/// Errors raised while decoding a reply frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Fewer bytes were available than a full reply frame requires.
    #[error("short frame: got {got} bytes, need {need}")]
    ShortFrame {
        /// Bytes available.
        got: usize,
        /// Bytes a full frame requires.
        need: usize,
    },

    /// The first byte was not the frame start marker.
    #[error("bad start marker 0x{0:02x}")]
    BadStartMarker(u8),

    /// The byte before the checksum was not the frame end marker.
    #[error("bad end marker 0x{0:02x}")]
    BadEndMarker(u8),

    /// The trailing checksum did not match the byte sum of the frame body.
    #[error("checksum mismatch: expected 0x{expected:04x}, got 0x{actual:04x}")]
    ChecksumMismatch {
        /// Checksum computed over the received body.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },

    /// A baud-rate query reply carried a code outside the published table.
    #[error("unrecognized baud rate code {0}")]
    UnknownBaudCode(u16),
}

/// Non-normal status reported by the device in a reply frame.
///
/// These are never retried automatically; the specific code is always
/// surfaced to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// The device could not parse the command frame.
    #[error("frame error")]
    FrameError,

    /// The command parameter was rejected (e.g. a zero-length relative move).
    #[error("parameter error")]
    ParameterError,

    /// The homing optocoupler misbehaved.
    #[error("optocoupler error")]
    OptocouplerError,

    /// The motor is busy executing a previous motion.
    #[error("motor busy")]
    MotorBusy,

    /// The motor stalled mid-motion.
    #[error("motor stalled")]
    MotorStalled,

    /// The device does not know its current location (needs a reset).
    #[error("unknown location")]
    UnknownLocation,

    /// The device refused the command in its current state.
    #[error("command rejected")]
    CommandRejected,

    /// The requested location is outside the device's travel or port range.
    #[error("illegal location")]
    IllegalLocation,

    /// A task execution error was reported.
    #[error("task execution error")]
    TaskExecution,

    /// An error code outside the published table.
    #[error("unknown error code 0x{0:02x}")]
    Unknown(u8),
}

/// Caller-side contract violations, detected before any I/O is performed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageError {
    /// A command was issued while the previous command's reply is still
    /// outstanding and the forced send path was not used.
    #[error("a command is already in flight; wait for its reply or use the forced send path")]
    CommandInFlight,

    /// A reply was requested with no command outstanding.
    #[error("no command in flight to retrieve a reply for")]
    NoCommandInFlight,

    /// A percent, step, volume, or port argument fell outside its valid range.
    #[error("requested {what} ({value}) is out of range [{min} - {max}]")]
    OutOfRange {
        /// What the argument was (e.g. "plunger speed").
        what: &'static str,
        /// The offending value.
        value: f64,
        /// Lower bound, inclusive.
        min: f64,
        /// Upper bound, inclusive.
        max: f64,
    },
}

/// Any error the library can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Connection establishment failure.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Malformed reply frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The device replied with a non-normal status.
    #[error("device error: {0}")]
    Device(#[from] DeviceErrorKind),

    /// Caller-side contract violation.
    #[error(transparent)]
    Usage(#[from] UsageError),
}
