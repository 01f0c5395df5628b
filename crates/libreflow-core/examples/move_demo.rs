//! Syringe Pump Move Demo
//!
//! Drives a simulated Mini SY04 through the motions of a real dosing cycle:
//! reset, timed absolute moves, busy-polling, and a mid-motion halt.
//! No hardware is required; point `Session::connect` at a serial port to run
//! the same sequence against a real pump.
//!
//! Usage:
//!   cargo run --example move_demo
//!
//! Set RUST_LOG=libreflow_core=debug for frame-level logging.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use libreflow_core::device::{Session, SyringePump, SyringePumpModel};
use libreflow_core::protocol::DEFAULT_BAUD_RATE;
use libreflow_core::sim::SimulatedDevice;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let sim = SimulatedDevice::pump(0x00, SyringePumpModel::MiniSy04, 20_000)
        .with_motion_duration(Duration::from_millis(400))
        .shared();

    let session = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, None)?;
    println!("connected: address 0x{:02x}", session.address());

    let mut pump = SyringePump::new(session, SyringePumpModel::MiniSy04, 20_000)?;
    println!("firmware: {:?}", pump.firmware_version()?);
    println!("rs232 baud rate: {}", pump.session_mut().rs232_baudrate()?);

    println!("resetting syringe...");
    pump.reset()?;
    pump.set_speed_percent(20.0)?;

    for cycle in 1..=3 {
        println!("cycle {}: starting 10% full-scale move", cycle);
        pump.move_absolute_percent(10.0, false)?;

        // Let the plunger get partway, then stop it where it stands.
        std::thread::sleep(Duration::from_millis(150));
        while pump.is_busy()? {
            pump.halt()?;
            std::thread::sleep(Duration::from_millis(50));
        }
        println!(
            "cycle {}: halted at {:.3}% full-scale",
            cycle,
            pump.position_percent()?
        );

        println!("cycle {}: returning to 0", cycle);
        pump.move_absolute_percent(0.0, true)?;
        println!(
            "cycle {}: position {:.3}% full-scale",
            cycle,
            pump.position_percent()?
        );
    }

    println!("dosing: aspirate 1000 uL, dispense 2x500 uL");
    pump.aspirate(1000.0, true)?;
    pump.dispense(500.0, true)?;
    pump.dispense(500.0, true)?;
    println!("final position: {} steps", pump.position_steps()?);

    Ok(())
}
