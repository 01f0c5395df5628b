//! Device capability layer
//!
//! Maps domain operations (move, aspirate, dispense, select port, halt) onto
//! protocol commands, per hardware variant. Each variant carries a static
//! opcode table and capability constants selected once at construction; the
//! pumps additionally maintain a locally shadowed plunger position that is
//! reconciled against hardware truth after waited moves.

pub mod codes;
pub mod multichannel;
pub mod rotary_valve;
pub mod session;
pub mod syringe_pump;

pub use multichannel::MultichannelPump;
pub use rotary_valve::RotaryValve;
pub use session::{ConnectOptions, Session};
pub use syringe_pump::{PumpCapabilities, SyringePump, SyringePumpModel};

use crate::error::UsageError;

/// Motor-status reply parameter indicating the motor is still moving.
pub const MOTOR_STATUS_BUSY: u16 = 0x04;

/// Validate a percent argument to [0, 100].
pub(crate) fn ensure_percent(what: &'static str, percent: f64) -> Result<(), UsageError> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(UsageError::OutOfRange {
            what,
            value: percent,
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(())
}

/// Validate a step position to [0, max].
pub(crate) fn ensure_steps(steps: u16, max: u16) -> Result<(), UsageError> {
    if steps > max {
        return Err(UsageError::OutOfRange {
            what: "plunger position",
            value: steps as f64,
            min: 0.0,
            max: max as f64,
        });
    }
    Ok(())
}

/// Validate a port number to [1, count].
pub(crate) fn ensure_port(port: u8, count: u8) -> Result<(), UsageError> {
    if port < 1 || port > count {
        return Err(UsageError::OutOfRange {
            what: "port",
            value: port as f64,
            min: 1.0,
            max: count as f64,
        });
    }
    Ok(())
}

/// Validate a volume argument to [0, syringe volume].
pub(crate) fn ensure_volume(microliters: f64, syringe_volume_ul: u32) -> Result<(), UsageError> {
    if !(0.0..=syringe_volume_ul as f64).contains(&microliters) {
        return Err(UsageError::OutOfRange {
            what: "volume",
            value: microliters,
            min: 0.0,
            max: syringe_volume_ul as f64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_percent() {
        assert!(ensure_percent("plunger speed", 0.0).is_ok());
        assert!(ensure_percent("plunger speed", 100.0).is_ok());
        assert!(ensure_percent("plunger speed", 150.0).is_err());
        assert!(ensure_percent("plunger speed", -1.0).is_err());
    }

    #[test]
    fn test_ensure_port() {
        assert!(ensure_port(1, 6).is_ok());
        assert!(ensure_port(6, 6).is_ok());
        assert!(ensure_port(0, 6).is_err());
        assert!(ensure_port(7, 6).is_err());
    }
}
