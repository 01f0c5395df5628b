//! Device session
//!
//! Connection establishment and the command/reply plumbing shared by every
//! device type: address/baud discovery, typed command helpers over the
//! dispatcher, and the link-housekeeping queries all devices answer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::codes::{self, COMMON, FACTORY};
use crate::error::{ConnectError, Error, ProtocolError, UsageError};
use crate::protocol::{
    CommandFrame, Dispatcher, FactoryFrame, Protocol, ReplyFrame, SerialTransport, Transport,
    BAUD_CANDIDATES, DEFAULT_ADDRESS, SHORT_TIMEOUT,
};

/// Connection options.
///
/// Leaving `baud` unset tries every supported baud rate in discovery order;
/// leaving `address` unset discovers the device's address over the link
/// (point-to-point RS-232 only; on a shared RS-485 bus the address must be
/// given).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Fixed baud rate, or `None` to try all candidates.
    pub baud: Option<u32>,
    /// Known device address, or `None` to discover it.
    pub address: Option<u8>,
    /// Command framing the device is configured for.
    pub protocol: Protocol,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            baud: None,
            address: None,
            protocol: Protocol::Runze,
        }
    }
}

/// An established link to one device: dispatcher, address, and negotiated
/// baud rate.
#[derive(Debug)]
pub struct Session<T: Transport> {
    dispatcher: Dispatcher<T>,
    address: u8,
    baud_rate: u32,
}

impl<T: Transport> Session<T> {
    /// Establish a session over an already-open transport.
    ///
    /// Sends an address query as the link test. With `address` unset the
    /// query is issued under the provisional address 0 and the device's
    /// answer is adopted; with `address` set the device's answer must match
    /// or the handshake fails with [`ConnectError::AddressMismatch`].
    pub fn handshake(transport: T, baud_rate: u32, address: Option<u8>) -> Result<Self, Error> {
        let mut dispatcher = Dispatcher::new(transport);
        let provisional = address.unwrap_or(DEFAULT_ADDRESS);
        if address.is_none() {
            debug!("discovering device address");
        }

        let frame = CommandFrame::new(provisional, COMMON.get_address, 0);
        dispatcher.send(&frame.to_bytes())?;
        let reply = dispatcher.wait(SHORT_TIMEOUT)?;
        reply.check_status().map_err(Error::Device)?;
        let actual = (reply.parameter & 0x7F) as u8;

        if let Some(specified) = address {
            if specified != actual {
                return Err(ConnectError::AddressMismatch { specified, actual }.into());
            }
        }

        Ok(Self {
            dispatcher,
            address: actual,
            baud_rate,
        })
    }

    /// The device's address on the link.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The baud rate this session was established at.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Whether a command is outstanding on the dispatcher.
    pub fn is_awaiting(&self) -> bool {
        self.dispatcher.is_awaiting()
    }

    /// Send a command and block for its reply, surfacing a non-normal
    /// status as a device error.
    pub fn command(
        &mut self,
        opcode: u8,
        parameter: u16,
        timeout: Duration,
    ) -> Result<ReplyFrame, Error> {
        let frame = CommandFrame::new(self.address, opcode, parameter);
        self.dispatcher.send(&frame.to_bytes())?;
        let reply = self.dispatcher.wait(timeout)?;
        reply.check_status().map_err(Error::Device)?;
        Ok(reply)
    }

    /// Send a command without waiting for its reply. The dispatcher keeps
    /// the command outstanding; callers collect the reply through
    /// [`poll_reply`](Self::poll_reply) or [`wait_reply`](Self::wait_reply).
    pub fn command_no_wait(&mut self, opcode: u8, parameter: u16) -> Result<(), Error> {
        let frame = CommandFrame::new(self.address, opcode, parameter);
        self.dispatcher.send(&frame.to_bytes())
    }

    /// Force-send a command while a reply may be outstanding, without
    /// waiting. Cancellation only; see the halt discipline.
    pub fn command_forced(&mut self, opcode: u8, parameter: u16) -> Result<(), Error> {
        let frame = CommandFrame::new(self.address, opcode, parameter);
        self.dispatcher.send_forced(&frame.to_bytes())
    }

    /// Send a parameterless query with the short timeout.
    pub fn query(&mut self, opcode: u8) -> Result<ReplyFrame, Error> {
        self.command(opcode, 0, SHORT_TIMEOUT)
    }

    /// Send a password-protected factory command and block for its reply.
    pub fn factory_command(&mut self, opcode: u8, parameter: u32) -> Result<ReplyFrame, Error> {
        let frame = FactoryFrame::new(self.address, opcode, parameter);
        self.dispatcher.send(&frame.to_bytes())?;
        let reply = self.dispatcher.wait(SHORT_TIMEOUT)?;
        reply.check_status().map_err(Error::Device)?;
        Ok(reply)
    }

    /// Non-blocking check for the outstanding command's reply.
    pub fn poll_reply(&mut self) -> Result<Option<ReplyFrame>, Error> {
        self.dispatcher.poll()
    }

    /// Block for the outstanding command's reply.
    pub fn wait_reply(&mut self, timeout: Duration) -> Result<ReplyFrame, Error> {
        self.dispatcher.wait(timeout)
    }

    /// Block for any reply regardless of dispatcher state (stale-reply
    /// draining during halt).
    pub fn drain_reply(&mut self, timeout: Duration) -> Result<ReplyFrame, Error> {
        self.dispatcher.wait_forced(timeout)
    }

    /// Query the device's address over the link.
    pub fn query_address(&mut self) -> Result<u8, Error> {
        let reply = self.query(COMMON.get_address)?;
        Ok((reply.parameter & 0x7F) as u8)
    }

    /// Query the firmware version as (major, minor), taken from the two
    /// parameter bytes of the version reply.
    pub fn firmware_version(&mut self) -> Result<(u8, u8), Error> {
        let reply = self.query(COMMON.get_firmware_version)?;
        let [major, minor] = reply.parameter.to_le_bytes();
        Ok((major, minor))
    }

    /// Query the configured RS-232 baud rate.
    pub fn rs232_baudrate(&mut self) -> Result<u32, Error> {
        let reply = self.query(COMMON.get_rs232_baudrate)?;
        codes::baud_rate_from_code(reply.parameter)
            .ok_or_else(|| ProtocolError::UnknownBaudCode(reply.parameter).into())
    }

    /// Query the configured RS-485 baud rate.
    pub fn rs485_baudrate(&mut self) -> Result<u32, Error> {
        let reply = self.query(COMMON.get_rs485_baudrate)?;
        codes::baud_rate_from_code(reply.parameter)
            .ok_or_else(|| ProtocolError::UnknownBaudCode(reply.parameter).into())
    }

    /// Persistently set the device address (factory command). The session
    /// addresses the device by its new address from then on.
    pub fn set_address(&mut self, address: u8) -> Result<(), Error> {
        self.factory_command(FACTORY.set_address, address as u32)?;
        self.address = address;
        Ok(())
    }

    /// Persistently set the RS-232 baud rate (factory command). Takes
    /// effect after the device is power-cycled.
    pub fn set_rs232_baudrate(&mut self, baud: u32) -> Result<(), Error> {
        let code = supported_baud_code(baud)?;
        self.factory_command(FACTORY.set_rs232_baudrate, code as u32)?;
        Ok(())
    }

    /// Persistently set the RS-485 baud rate (factory command). Takes
    /// effect after the device is power-cycled.
    pub fn set_rs485_baudrate(&mut self, baud: u32) -> Result<(), Error> {
        let code = supported_baud_code(baud)?;
        self.factory_command(FACTORY.set_rs485_baudrate, code as u32)?;
        Ok(())
    }

    /// Release the underlying transport, tearing the session down.
    pub fn into_transport(self) -> T {
        self.dispatcher.into_transport()
    }
}

impl Session<SerialTransport> {
    /// Connect to a device on a serial port.
    ///
    /// Tries the fixed baud rate if one is given, otherwise every candidate
    /// in declared order, stopping at the first that yields a coherent
    /// handshake. Exhausting all candidates fails with
    /// [`ConnectError::NoHandshake`]. An address mismatch is a configuration
    /// error, not a link error, and fails immediately.
    pub fn connect(port_name: &str, options: &ConnectOptions) -> Result<Self, Error> {
        if options.protocol != Protocol::Runze {
            return Err(ConnectError::UnsupportedProtocol(options.protocol).into());
        }

        let candidates: Vec<u32> = match options.baud {
            Some(baud) => vec![baud],
            None => BAUD_CANDIDATES.to_vec(),
        };

        for &baud in &candidates {
            debug!("connecting to {} at {} bps", port_name, baud);
            let mut transport = match SerialTransport::open(port_name, baud) {
                Ok(t) => t,
                Err(e) => {
                    debug!("open failed at {} bps: {}", baud, e);
                    continue;
                }
            };
            let _ = transport.clear_buffers();

            match Self::handshake(transport, baud, options.address) {
                Ok(session) => {
                    info!(
                        "connected to {} at {} bps, address 0x{:02x}",
                        port_name,
                        baud,
                        session.address()
                    );
                    return Ok(session);
                }
                Err(Error::Connect(e @ ConnectError::AddressMismatch { .. })) => {
                    return Err(e.into());
                }
                Err(e) => {
                    debug!("handshake failed at {} bps: {}", baud, e);
                }
            }
        }

        Err(ConnectError::NoHandshake {
            port: port_name.to_string(),
            tried: candidates,
        }
        .into())
    }
}

/// Map a requested baud rate to its wire code, failing fast on rates the
/// hardware does not support.
fn supported_baud_code(baud: u32) -> Result<u16, UsageError> {
    codes::baud_code_from_rate(baud).ok_or(UsageError::OutOfRange {
        what: "baud rate",
        value: baud as f64,
        min: 9_600.0,
        max: 115_200.0,
    })
}
