//! Multichannel pump+valve driver
//!
//! The SY01B pairs a syringe pump with an integrated rotary selector valve.
//! Plunger behavior is exactly the synthesized-absolute pump behavior; this
//! driver composes it with port selection rather than duplicating it.

use tracing::debug;

use super::session::Session;
use super::syringe_pump::{PumpCapabilities, SyringePump, SyringePumpModel};
use super::ensure_port;
use crate::error::{ConnectError, Error};
use crate::protocol::{Transport, LONG_TIMEOUT};

/// Port counts the SY01B ships with.
pub const SUPPORTED_PORT_COUNTS: &[u8] = &[6, 9, 12];

/// A connected multichannel pump+valve.
#[derive(Debug)]
pub struct MultichannelPump<T: Transport> {
    pump: SyringePump<T>,
    port_count: u8,
}

impl<T: Transport> MultichannelPump<T> {
    /// Attach a multichannel pump driver to an established session.
    pub fn new(session: Session<T>, syringe_volume_ul: u32, port_count: u8) -> Result<Self, Error> {
        if !SUPPORTED_PORT_COUNTS.contains(&port_count) {
            return Err(ConnectError::UnsupportedPortCount {
                count: port_count,
                supported: SUPPORTED_PORT_COUNTS,
            }
            .into());
        }
        let pump = SyringePump::new(session, SyringePumpModel::Sy01B, syringe_volume_ul)?;
        Ok(Self { pump, port_count })
    }

    /// Number of selectable ports on the integrated valve.
    pub fn port_count(&self) -> u8 {
        self.port_count
    }

    /// Rotate the integrated valve to the given port (1-based). The device
    /// chooses the approach direction itself.
    pub fn select_port(&mut self, port: u8, wait: bool) -> Result<(), Error> {
        ensure_port(port, self.port_count)?;
        debug!("selecting port {}/{}", port, self.port_count);
        let opcode = self
            .pump
            .model()
            .opcodes()
            .select_port
            .expect("SY01B opcode table carries select_port");
        if wait {
            self.pump
                .session_mut()
                .command(opcode, port as u16, LONG_TIMEOUT)?;
            Ok(())
        } else {
            self.pump.session_mut().command_no_wait(opcode, port as u16)
        }
    }

    /// The underlying pump, for plunger operations.
    pub fn pump(&self) -> &SyringePump<T> {
        &self.pump
    }

    /// The underlying pump, mutably.
    pub fn pump_mut(&mut self) -> &mut SyringePump<T> {
        &mut self.pump
    }

    /// See [`SyringePump::capabilities`].
    pub fn capabilities(&self) -> &PumpCapabilities {
        self.pump.capabilities()
    }

    /// See [`SyringePump::reset`].
    pub fn reset(&mut self) -> Result<(), Error> {
        self.pump.reset()
    }

    /// See [`SyringePump::aspirate`].
    pub fn aspirate(&mut self, microliters: f64, wait: bool) -> Result<(), Error> {
        self.pump.aspirate(microliters, wait)
    }

    /// See [`SyringePump::dispense`].
    pub fn dispense(&mut self, microliters: f64, wait: bool) -> Result<(), Error> {
        self.pump.dispense(microliters, wait)
    }

    /// See [`SyringePump::move_absolute_steps`].
    pub fn move_absolute_steps(&mut self, steps: u16, wait: bool) -> Result<(), Error> {
        self.pump.move_absolute_steps(steps, wait)
    }

    /// See [`SyringePump::move_absolute_percent`].
    pub fn move_absolute_percent(&mut self, percent: f64, wait: bool) -> Result<(), Error> {
        self.pump.move_absolute_percent(percent, wait)
    }

    /// See [`SyringePump::position_steps`].
    pub fn position_steps(&mut self) -> Result<u16, Error> {
        self.pump.position_steps()
    }

    /// See [`SyringePump::set_speed_percent`].
    pub fn set_speed_percent(&mut self, percent: f64) -> Result<(), Error> {
        self.pump.set_speed_percent(percent)
    }

    /// See [`SyringePump::is_busy`].
    pub fn is_busy(&mut self) -> Result<bool, Error> {
        self.pump.is_busy()
    }

    /// See [`SyringePump::halt`]. Stops the plunger and the valve rotor.
    pub fn halt(&mut self) -> Result<(), Error> {
        self.pump.halt()
    }
}
