//! Serial protocol communication
//!
//! Implements the fixed-size binary frame protocol spoken by the supported
//! fluidics hardware over a point-to-point RS-232/RS-485 link.
//!
//! The ASCII ("DT") and OEM framings the hardware also understands are
//! declared in [`Protocol`] but not implemented; they would slot in as
//! additional frame codecs without touching the dispatcher.

pub mod dispatcher;
pub mod frame;
pub mod serial;
pub mod transport;

pub use dispatcher::{Dispatcher, DispatcherState};
pub use frame::{CommandFrame, FactoryFrame, ReplyFrame, ReplyStatus};
pub use serial::{list_ports, open_port, PortInfo};
pub use transport::{SerialTransport, Transport};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Command framings the hardware understands.
///
/// Only the binary framing is implemented. The protocol must match the one
/// the device is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Fixed-size binary frames with a 16-bit byte-sum checksum.
    Runze,
    /// ASCII framing ('/' ... '\r'). Declared, not implemented.
    Dt,
    /// OEM binary framing with XOR checksum. Declared, not implemented.
    Oem,
}

/// Factory default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Baud rates the binary protocol supports, in discovery order.
pub const BAUD_CANDIDATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Provisional address used for address discovery; any device answers an
/// address query regardless of the address the query carries.
pub const DEFAULT_ADDRESS: u8 = 0x00;

/// Highest representable device address.
pub const MAX_ADDRESS: u8 = 0x7F;

/// Timeout for queries (address, baud, status, position).
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(250);

/// Timeout for motion commands. The wire protocol does not reply until
/// motion physically completes, and long syringe moves take tens of seconds.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(60);
