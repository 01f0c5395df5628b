//! # LibreFlow Core Library
//!
//! Core functionality for the LibreFlow fluidics control software.
//!
//! This library provides:
//! - A binary frame codec with byte-sum checksums
//! - A command dispatcher enforcing the single-outstanding-command rule
//! - Drivers for syringe pumps, multichannel pump+valve units, and rotary
//!   selector valves, with driver-local shadow position tracking
//! - A simulated device for development without hardware
//!
//! ## Supported hardware
//!
//! - Mini SY04 syringe pumps
//! - SY08 syringe pumps
//! - SY01B multichannel syringe pumps
//! - SV-family rotary selector valves
//!
//! ## Example
//!
//! ```rust,ignore
//! use libreflow_core::device::{ConnectOptions, Session, SyringePump, SyringePumpModel};
//!
//! // Discover baud rate and address, then attach a pump driver.
//! let session = Session::connect("/dev/ttyUSB0", &ConnectOptions::default())?;
//! let mut pump = SyringePump::new(session, SyringePumpModel::Sy08, 25_000)?;
//!
//! pump.reset()?;
//! pump.aspirate(1000.0, true)?;
//! pump.dispense(1000.0, true)?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod device;
pub mod error;
pub mod protocol;
pub mod sim;
pub mod units;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{
        ConnectOptions, MultichannelPump, RotaryValve, Session, SyringePump, SyringePumpModel,
    };
    pub use crate::error::{
        ConnectError, DeviceErrorKind, Error, ProtocolError, TransportError, UsageError,
    };
    pub use crate::protocol::{
        CommandFrame, Dispatcher, DispatcherState, Protocol, ReplyFrame, ReplyStatus,
        SerialTransport, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
