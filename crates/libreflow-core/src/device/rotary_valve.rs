//! Rotary selector valve driver
//!
//! Standalone SV-family valves route one common port to 1 of N selectable
//! ports. Unlike the pumps there is no plunger position to shadow; the only
//! state worth tracking lives on the device and is queried directly.

use tracing::debug;

use super::codes::{self, ValveOpcodes};
use super::session::Session;
use super::{ensure_port, MOTOR_STATUS_BUSY};
use crate::error::{ConnectError, Error};
use crate::protocol::{Transport, LONG_TIMEOUT, SHORT_TIMEOUT};

/// Port counts the SV family ships with (T6 through T16 heads).
pub const SUPPORTED_PORT_COUNTS: &[u8] = &[6, 8, 10, 12, 16];

/// A connected rotary selector valve.
#[derive(Debug)]
pub struct RotaryValve<T: Transport> {
    session: Session<T>,
    opcodes: &'static ValveOpcodes,
    port_count: u8,
}

impl<T: Transport> RotaryValve<T> {
    /// Attach a valve driver to an established session.
    pub fn new(session: Session<T>, port_count: u8) -> Result<Self, Error> {
        if !SUPPORTED_PORT_COUNTS.contains(&port_count) {
            return Err(ConnectError::UnsupportedPortCount {
                count: port_count,
                supported: SUPPORTED_PORT_COUNTS,
            }
            .into());
        }
        Ok(Self {
            session,
            opcodes: &codes::SV,
            port_count,
        })
    }

    /// Number of selectable ports.
    pub fn port_count(&self) -> u8 {
        self.port_count
    }

    /// The device address.
    pub fn address(&self) -> u8 {
        self.session.address()
    }

    /// Borrow the underlying session.
    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    /// Rotate clockwise to the given port (1-based).
    pub fn move_clockwise_to_port(&mut self, port: u8, wait: bool) -> Result<(), Error> {
        ensure_port(port, self.port_count)?;
        self.move_to_port(port, port.saturating_add(1).min(self.port_count), wait)
    }

    /// Rotate counterclockwise to the given port (1-based).
    pub fn move_counterclockwise_to_port(&mut self, port: u8, wait: bool) -> Result<(), Error> {
        ensure_port(port, self.port_count)?;
        self.move_to_port(port, port.saturating_sub(1).max(1), wait)
    }

    /// The rotation sense is conveyed by naming an adjacent approach port:
    /// the parameter packs the approach port in the high byte and the
    /// target in the low byte.
    fn move_to_port(&mut self, port: u8, approach: u8, wait: bool) -> Result<(), Error> {
        let parameter = ((approach as u16) << 8) | port as u16;
        debug!(
            "moving to port {}/{} via port {}",
            port, self.port_count, approach
        );
        if wait {
            self.session
                .command(self.opcodes.move_to_port, parameter, LONG_TIMEOUT)?;
            Ok(())
        } else {
            self.session
                .command_no_wait(self.opcodes.move_to_port, parameter)
        }
    }

    /// Query the current port position.
    pub fn port_position(&mut self) -> Result<u8, Error> {
        let reply = self.session.query(self.opcodes.get_port_position)?;
        Ok(reply.parameter as u8)
    }

    /// Home the rotor to its reset position.
    pub fn reset(&mut self) -> Result<(), Error> {
        debug!("homing rotor to reset position");
        self.session
            .command(self.opcodes.reset_position, 0, LONG_TIMEOUT)?;
        Ok(())
    }

    /// Query the raw motor status word.
    pub fn motor_status(&mut self) -> Result<u16, Error> {
        let reply = self.session.query(self.opcodes.get_motor_status)?;
        Ok(reply.parameter)
    }

    /// Whether the rotor is busy; same two-tier check as the pumps.
    pub fn is_busy(&mut self) -> Result<bool, Error> {
        if self.session.is_awaiting() {
            match self.session.poll_reply()? {
                None => return Ok(true),
                Some(reply) => reply.check_status().map_err(Error::Device)?,
            }
        }
        Ok(self.motor_status()? == MOTOR_STATUS_BUSY)
    }

    /// Halt the rotor. Follows the pump halt discipline: force-send, drain
    /// any stale reply, consume the halt's reply, then re-query the port
    /// position so callers observe settled state.
    pub fn halt(&mut self) -> Result<u8, Error> {
        let was_awaiting = self.session.is_awaiting();
        debug!("halting (move in flight: {})", was_awaiting);
        self.session.command_forced(self.opcodes.force_stop, 0)?;
        if was_awaiting {
            let stale = self.session.wait_reply(LONG_TIMEOUT)?;
            debug!("discarded stale reply (status 0x{:02x})", stale.status);
            let reply = self.session.drain_reply(SHORT_TIMEOUT)?;
            reply.check_status().map_err(Error::Device)?;
        } else {
            let reply = self.session.wait_reply(SHORT_TIMEOUT)?;
            reply.check_status().map_err(Error::Device)?;
        }
        self.port_position()
    }
}
