//! Syringe pump driver
//!
//! Covers the single-channel pump families. The compact Mini SY04 has no
//! native absolute-move command, so absolute positioning is synthesized from
//! relative moves against the driver's shadow step count; the SY08 forwards
//! absolute targets to the firmware directly. Which strategy applies is
//! decided by the variant's opcode table, not by a class hierarchy.

use tracing::debug;

use super::codes::{self, PumpOpcodes};
use super::session::Session;
use super::{ensure_percent, ensure_steps, ensure_volume, MOTOR_STATUS_BUSY};
use crate::error::{ConnectError, Error};
use crate::protocol::{Transport, LONG_TIMEOUT, SHORT_TIMEOUT};
use crate::units;

/// Syringe pump hardware variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyringePumpModel {
    /// Compact pump; absolute moves synthesized in the driver.
    MiniSy04,
    /// Bench pump; firmware-native absolute moves.
    Sy08,
    /// Multichannel pump+valve; synthesized absolute moves plus an
    /// integrated selector valve (see
    /// [`MultichannelPump`](super::MultichannelPump)).
    Sy01B,
}

impl SyringePumpModel {
    /// The variant's opcode table.
    pub fn opcodes(&self) -> &'static PumpOpcodes {
        match self {
            SyringePumpModel::MiniSy04 => &codes::MINI_SY04,
            SyringePumpModel::Sy08 => &codes::SY08,
            SyringePumpModel::Sy01B => &codes::SY01B,
        }
    }

    /// Syringe volumes the variant ships with, in microliters.
    pub fn supported_volumes_ul(&self) -> &'static [u32] {
        match self {
            SyringePumpModel::MiniSy04 => &[5_000, 10_000, 20_000],
            SyringePumpModel::Sy08 => &[5_000, 12_500, 25_000],
            SyringePumpModel::Sy01B => &[25, 50, 125, 500, 1_250, 2_500, 5_000],
        }
    }

    /// Capability constants for the variant fitted with the given syringe,
    /// or `None` if the volume is not one the variant ships with.
    pub fn capabilities(&self, syringe_volume_ul: u32) -> Option<PumpCapabilities> {
        if !self.supported_volumes_ul().contains(&syringe_volume_ul) {
            return None;
        }
        // Full stroke varies with the fitted syringe on the Mini SY04 only;
        // max RPM drops on the largest syringes.
        let (max_speed_rpm, max_position_steps) = match (self, syringe_volume_ul) {
            (SyringePumpModel::MiniSy04, 5_000) => (300, 12_000),
            (SyringePumpModel::MiniSy04, 10_000) => (300, 9_632),
            (SyringePumpModel::MiniSy04, _) => (250, 9_600),
            (SyringePumpModel::Sy08, 25_000) => (500, 12_000),
            (SyringePumpModel::Sy08, _) => (600, 12_000),
            (SyringePumpModel::Sy01B, _) => (450, 6_000),
        };
        Some(PumpCapabilities {
            syringe_volume_ul,
            max_position_steps,
            max_speed_rpm,
            default_speed_percent: 60.0,
        })
    }
}

/// Static capability constants for one pump variant + syringe pairing.
/// Selected once at construction, never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpCapabilities {
    /// Fitted syringe volume in microliters.
    pub syringe_volume_ul: u32,
    /// Encoder steps of a full stroke.
    pub max_position_steps: u16,
    /// Maximum plunger speed in RPM.
    pub max_speed_rpm: u16,
    /// Power-on-reset startup speed, percent of maximum.
    pub default_speed_percent: f64,
}

/// A connected syringe pump.
#[derive(Debug)]
pub struct SyringePump<T: Transport> {
    session: Session<T>,
    model: SyringePumpModel,
    opcodes: &'static PumpOpcodes,
    caps: PumpCapabilities,
    /// Driver-local estimate of the plunger position in steps. Optimistically
    /// updated on every relative move, overwritten by every successful
    /// position query.
    shadow_steps: u16,
    /// Last speed set through this driver; the device is not queried for it.
    speed_percent: Option<f64>,
}

impl<T: Transport> SyringePump<T> {
    /// Attach a pump driver to an established session.
    pub fn new(
        session: Session<T>,
        model: SyringePumpModel,
        syringe_volume_ul: u32,
    ) -> Result<Self, Error> {
        let caps = model
            .capabilities(syringe_volume_ul)
            .ok_or(ConnectError::UnsupportedVolume {
                volume_ul: syringe_volume_ul,
                supported: model.supported_volumes_ul(),
            })?;
        Ok(Self {
            session,
            model,
            opcodes: model.opcodes(),
            caps,
            shadow_steps: 0,
            speed_percent: None,
        })
    }

    /// The hardware variant this driver was built for.
    pub fn model(&self) -> SyringePumpModel {
        self.model
    }

    /// The capability constants selected at construction.
    pub fn capabilities(&self) -> &PumpCapabilities {
        &self.caps
    }

    /// The driver's current position estimate in steps, without touching the
    /// hardware. May transiently disagree with hardware truth between a move
    /// and its resynchronizing query.
    pub fn shadow_steps(&self) -> u16 {
        self.shadow_steps
    }

    /// The device address.
    pub fn address(&self) -> u8 {
        self.session.address()
    }

    /// Borrow the underlying session.
    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    /// Reset and home the plunger, then declare the homed position step 0.
    pub fn reset(&mut self) -> Result<(), Error> {
        // A freshly powered-on device applies a speed change only after its
        // first reset, so request the default speed up front.
        self.set_speed_percent(self.caps.default_speed_percent)?;
        debug!("homing plunger to optocoupler position");
        self.session
            .command(self.opcodes.reset_position, 0, LONG_TIMEOUT)?;
        // Per datasheet the device must then be told that the reset
        // position is position 0.
        self.session
            .command(self.opcodes.sync_position, 0, SHORT_TIMEOUT)?;
        self.shadow_steps = 0;
        debug!("plunger reset");
        Ok(())
    }

    /// Query the absolute plunger position in steps and resynchronize the
    /// shadow count with the reply.
    pub fn position_steps(&mut self) -> Result<u16, Error> {
        let reply = self.session.query(self.opcodes.get_position)?;
        self.shadow_steps = reply.parameter;
        debug!(
            "plunger position: {}/{} steps ({:.2}% full-scale)",
            self.shadow_steps,
            self.caps.max_position_steps,
            units::steps_to_percent(self.shadow_steps, self.caps.max_position_steps)
        );
        Ok(self.shadow_steps)
    }

    /// Query the plunger position in microliters.
    pub fn position_microliters(&mut self) -> Result<f64, Error> {
        let steps = self.position_steps()?;
        Ok(units::steps_to_microliters(
            steps,
            self.caps.max_position_steps,
            self.caps.syringe_volume_ul,
        ))
    }

    /// Query the plunger position as percent of full-scale range.
    pub fn position_percent(&mut self) -> Result<f64, Error> {
        let steps = self.position_steps()?;
        Ok(units::steps_to_percent(steps, self.caps.max_position_steps))
    }

    /// Relative plunger move withdrawing the given number of steps.
    pub fn aspirate_steps(&mut self, steps: u16, wait: bool) -> Result<(), Error> {
        debug!(
            "aspirating {:.2} uL i.e. {} steps",
            units::steps_to_microliters(steps, self.caps.max_position_steps, self.caps.syringe_volume_ul),
            steps
        );
        self.motion_command(self.opcodes.run_ccw, steps, wait)?;
        self.shadow_steps =
            (self.shadow_steps as u32 + steps as u32).min(self.caps.max_position_steps as u32) as u16;
        Ok(())
    }

    /// Relative plunger move dispensing the given number of steps.
    pub fn dispense_steps(&mut self, steps: u16, wait: bool) -> Result<(), Error> {
        debug!(
            "dispensing {:.2} uL i.e. {} steps",
            units::steps_to_microliters(steps, self.caps.max_position_steps, self.caps.syringe_volume_ul),
            steps
        );
        self.motion_command(self.opcodes.run_cw, steps, wait)?;
        self.shadow_steps = self.shadow_steps.saturating_sub(steps);
        Ok(())
    }

    /// Relative plunger move withdrawing the given volume.
    pub fn aspirate(&mut self, microliters: f64, wait: bool) -> Result<(), Error> {
        ensure_volume(microliters, self.caps.syringe_volume_ul)?;
        let steps = units::microliters_to_steps(
            microliters,
            self.caps.max_position_steps,
            self.caps.syringe_volume_ul,
        ) as u16;
        self.aspirate_steps(steps, wait)
    }

    /// Relative plunger move dispensing the given volume.
    pub fn dispense(&mut self, microliters: f64, wait: bool) -> Result<(), Error> {
        ensure_volume(microliters, self.caps.syringe_volume_ul)?;
        let steps = units::microliters_to_steps(
            microliters,
            self.caps.max_position_steps,
            self.caps.syringe_volume_ul,
        ) as u16;
        self.dispense_steps(steps, wait)
    }

    /// Move the plunger to an absolute position in steps.
    ///
    /// On variants with a native absolute-move command the target is
    /// forwarded directly and the shadow count set to it. Otherwise the move
    /// is synthesized as a relative move against the shadow count, and after
    /// a waited move the position is re-queried: actual travel can diverge
    /// from commanded travel near motion limits or on partial completion.
    pub fn move_absolute_steps(&mut self, steps: u16, wait: bool) -> Result<(), Error> {
        ensure_steps(steps, self.caps.max_position_steps)?;
        debug!(
            "absolute move to {}/{} steps ({:.2}% full-scale)",
            steps,
            self.caps.max_position_steps,
            units::steps_to_percent(steps, self.caps.max_position_steps)
        );

        if let Some(opcode) = self.opcodes.move_absolute {
            self.motion_command(opcode, steps, wait)?;
            self.shadow_steps = steps;
            return Ok(());
        }

        let delta = steps as i32 - self.shadow_steps as i32;
        // The hardware answers a zero-length relative move with a parameter
        // error, so a zero delta must never reach the wire.
        if delta == 0 {
            debug!("suppressing zero-length relative move");
            return Ok(());
        }
        if delta > 0 {
            self.aspirate_steps(delta as u16, wait)?;
        } else {
            self.dispense_steps(delta.unsigned_abs() as u16, wait)?;
        }
        if wait {
            // Sync with wherever the plunger actually landed.
            self.position_steps()?;
        }
        Ok(())
    }

    /// Move the plunger to an absolute position as percent of full-scale
    /// range.
    pub fn move_absolute_percent(&mut self, percent: f64, wait: bool) -> Result<(), Error> {
        ensure_percent("plunger position", percent)?;
        let steps = units::percent_to_steps(percent, self.caps.max_position_steps);
        self.move_absolute_steps(steps, wait)
    }

    /// Set the plunger speed as percent of the variant's maximum RPM.
    pub fn set_speed_percent(&mut self, percent: f64) -> Result<(), Error> {
        ensure_percent("plunger speed", percent)?;
        let rpm = units::speed_percent_to_rpm(percent, self.caps.max_speed_rpm);
        debug!("setting speed to {}% (i.e. {} rpm)", percent, rpm);
        self.session
            .command(self.opcodes.set_speed, rpm, SHORT_TIMEOUT)?;
        self.speed_percent = Some(percent);
        Ok(())
    }

    /// The last speed set through this driver, if any. Local value; the
    /// device is not queried.
    pub fn speed_percent(&self) -> Option<f64> {
        self.speed_percent
    }

    /// Query the raw motor status word.
    pub fn motor_status(&mut self) -> Result<u16, Error> {
        let reply = self.session.query(self.opcodes.get_motor_status)?;
        Ok(reply.parameter)
    }

    /// Whether the pump is busy.
    ///
    /// Busy if a motion command is outstanding and its reply has not come
    /// back yet, or, failing that, if an explicit motor-status query reports
    /// the motor moving. The first tier never blocks on a long motion; the
    /// second catches busy states reported independent of an outstanding
    /// reply.
    pub fn is_busy(&mut self) -> Result<bool, Error> {
        if self.session.is_awaiting() {
            match self.session.poll_reply()? {
                None => return Ok(true),
                Some(reply) => reply.check_status().map_err(Error::Device)?,
            }
        }
        Ok(self.motor_status()? == MOTOR_STATUS_BUSY)
    }

    /// Halt the pump in its current location.
    ///
    /// The halt is force-sent so it goes out even while a move is mid-flight.
    /// If one was, the aborted move's reply is drained first and discarded so
    /// it is never misinterpreted as the halt's own reply; the shadow count
    /// is then resynchronized with wherever the plunger stopped.
    pub fn halt(&mut self) -> Result<(), Error> {
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
        self.position_steps()?;
        Ok(())
    }

    /// Query the firmware version as (major, minor). Variants that split the
    /// version across two opcodes are queried twice.
    pub fn firmware_version(&mut self) -> Result<(u16, u16), Error> {
        if let Some(subversion_opcode) = self.opcodes.get_firmware_subversion {
            let major = self.session.query(codes::COMMON.get_firmware_version)?.parameter;
            let minor = self.session.query(subversion_opcode)?.parameter;
            Ok((major, minor))
        } else {
            let (major, minor) = self.session.firmware_version()?;
            Ok((major as u16, minor as u16))
        }
    }

    fn motion_command(&mut self, opcode: u8, parameter: u16, wait: bool) -> Result<(), Error> {
        if wait {
            self.session.command(opcode, parameter, LONG_TIMEOUT)?;
            Ok(())
        } else {
            self.session.command_no_wait(opcode, parameter)
        }
    }
}
