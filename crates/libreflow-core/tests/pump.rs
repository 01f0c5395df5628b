//! Syringe pump driver behavior against the simulated device.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use libreflow_core::device::{Session, SyringePump, SyringePumpModel};
use libreflow_core::error::{ConnectError, DeviceErrorKind, Error, UsageError};
use libreflow_core::protocol::{ReplyStatus, DEFAULT_BAUD_RATE};
use libreflow_core::sim::SimulatedDevice;
use pretty_assertions::assert_eq;

type SharedSim = Arc<Mutex<SimulatedDevice>>;

fn connect_pump(model: SyringePumpModel, volume_ul: u32) -> (SyringePump<SharedSim>, SharedSim) {
    let sim = SimulatedDevice::pump(0x00, model, volume_ul).shared();
    let session = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, None).unwrap();
    let pump = SyringePump::new(session, model, volume_ul).unwrap();
    (pump, sim)
}

fn frames_received(sim: &SharedSim) -> usize {
    sim.lock().unwrap().received().len()
}

#[test]
fn test_address_discovery() {
    let sim = SimulatedDevice::pump(0x05, SyringePumpModel::Sy08, 25_000).shared();
    let session = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, None).unwrap();
    assert_eq!(session.address(), 0x05);
}

#[test]
fn test_address_mismatch_rejected() {
    let sim = SimulatedDevice::pump(0x05, SyringePumpModel::Sy08, 25_000).shared();
    let err = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, Some(0x03)).unwrap_err();
    assert!(matches!(
        err,
        Error::Connect(ConnectError::AddressMismatch {
            specified: 0x03,
            actual: 0x05
        })
    ));
}

#[test]
fn test_unsupported_volume_rejected() {
    let sim = SimulatedDevice::pump(0x00, SyringePumpModel::Sy08, 25_000).shared();
    let session = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, None).unwrap();
    let err = SyringePump::new(session, SyringePumpModel::Sy08, 10_000).unwrap_err();
    assert!(matches!(
        err,
        Error::Connect(ConnectError::UnsupportedVolume {
            volume_ul: 10_000,
            ..
        })
    ));
}

#[test]
fn test_step_accounting() {
    // 6000-step stroke on a 5000 uL syringe: 2000 uL is 2400 steps.
    let (mut pump, _sim) = connect_pump(SyringePumpModel::Sy01B, 5_000);
    assert_eq!(pump.shadow_steps(), 0);

    pump.aspirate(2000.0, true).unwrap();
    assert_eq!(pump.shadow_steps(), 2400);

    pump.dispense(2000.0, true).unwrap();
    assert_eq!(pump.shadow_steps(), 0);
}

#[test]
fn test_synthesized_absolute_move_resyncs() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::MiniSy04, 5_000);

    pump.move_absolute_steps(2400, true).unwrap();
    assert_eq!(pump.shadow_steps(), 2400);
    assert_eq!(sim.lock().unwrap().position(), 2400);

    // The waited move issues exactly: relative move + position resync.
    let ops = SyringePumpModel::MiniSy04.opcodes();
    let received = sim.lock().unwrap().received().to_vec();
    let tail: Vec<u8> = received.iter().rev().take(2).map(|f| f.opcode).collect();
    assert_eq!(tail, vec![ops.get_position, ops.run_ccw]);

    // Moving back down synthesizes a dispense.
    pump.move_absolute_steps(1000, true).unwrap();
    assert_eq!(pump.shadow_steps(), 1000);
    assert_eq!(sim.lock().unwrap().position(), 1000);
}

#[test]
fn test_zero_delta_short_circuit() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::MiniSy04, 5_000);
    pump.move_absolute_steps(1200, true).unwrap();
    let frames_before = frames_received(&sim);

    // Moving to where the shadow already points must not touch the wire:
    // the hardware answers zero-length relative moves with a parameter
    // error.
    pump.move_absolute_steps(pump.shadow_steps(), true).unwrap();
    assert_eq!(frames_received(&sim), frames_before);
    assert_eq!(pump.shadow_steps(), 1200);
}

#[test]
fn test_native_absolute_move_skips_resync() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::Sy08, 25_000);

    pump.move_absolute_steps(5000, true).unwrap();
    assert_eq!(pump.shadow_steps(), 5000);

    // One command only, no position query: the firmware guarantees
    // absolute positioning.
    let ops = SyringePumpModel::Sy08.opcodes();
    let last = *sim.lock().unwrap().received().last().unwrap();
    assert_eq!(last.opcode, ops.move_absolute.unwrap());
    assert_eq!(last.parameter, 5000);
}

#[test]
fn test_percent_range_validation_without_io() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::Sy08, 25_000);
    let frames_before = frames_received(&sim);

    for percent in [150.0, -1.0] {
        let err = pump.move_absolute_percent(percent, true).unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::OutOfRange { .. })));
    }
    let err = pump.set_speed_percent(101.0).unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::OutOfRange { .. })));

    assert_eq!(frames_received(&sim), frames_before);
}

#[test]
fn test_step_range_validation() {
    let (mut pump, _sim) = connect_pump(SyringePumpModel::Sy01B, 5_000);
    let err = pump.move_absolute_steps(6001, true).unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::OutOfRange { .. })));
}

#[test]
fn test_speed_percent_to_rpm() {
    // Mini SY04 with the 20 mL syringe tops out at 250 RPM.
    let (mut pump, sim) = connect_pump(SyringePumpModel::MiniSy04, 20_000);
    pump.set_speed_percent(20.0).unwrap();
    assert_eq!(pump.speed_percent(), Some(20.0));

    let ops = SyringePumpModel::MiniSy04.opcodes();
    let last = *sim.lock().unwrap().received().last().unwrap();
    assert_eq!(last.opcode, ops.set_speed);
    assert_eq!(last.parameter, 50);
}

#[test]
fn test_device_error_surfaced_and_reply_consumed() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::Sy08, 25_000);
    sim.lock().unwrap().inject_status(ReplyStatus::MotorBusy);

    let err = pump.aspirate_steps(100, true).unwrap_err();
    assert!(matches!(err, Error::Device(DeviceErrorKind::MotorBusy)));

    // The error reply was consumed; the dispatcher is idle and a fresh
    // command goes straight through.
    assert!(!pump.session_mut().is_awaiting());
    pump.position_steps().unwrap();
}

#[test]
fn test_reset_homes_and_zeroes_shadow() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::MiniSy04, 5_000);
    pump.aspirate_steps(3000, true).unwrap();
    assert_eq!(pump.shadow_steps(), 3000);

    pump.reset().unwrap();
    assert_eq!(pump.shadow_steps(), 0);
    assert_eq!(sim.lock().unwrap().position(), 0);

    // Default speed request precedes the homing commands.
    let ops = SyringePumpModel::MiniSy04.opcodes();
    let opcodes: Vec<u8> = sim
        .lock()
        .unwrap()
        .received()
        .iter()
        .rev()
        .take(3)
        .map(|f| f.opcode)
        .collect();
    assert_eq!(
        opcodes,
        vec![ops.sync_position, ops.reset_position, ops.set_speed]
    );
}

#[test]
fn test_busy_while_move_outstanding() {
    let sim = SimulatedDevice::pump(0x00, SyringePumpModel::Sy08, 25_000)
        .with_motion_duration(Duration::from_millis(60))
        .shared();
    let session = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, None).unwrap();
    let mut pump = SyringePump::new(session, SyringePumpModel::Sy08, 25_000).unwrap();

    pump.move_absolute_steps(4000, false).unwrap();
    assert!(pump.is_busy().unwrap());

    // Once the motion settles, its reply is consumed by the busy poll and
    // the motor reports idle.
    std::thread::sleep(Duration::from_millis(120));
    assert!(!pump.is_busy().unwrap());
    assert_eq!(pump.position_steps().unwrap(), 4000);
}

#[test]
fn test_idle_pump_reports_not_busy() {
    let (mut pump, _sim) = connect_pump(SyringePumpModel::Sy08, 25_000);
    // Nothing outstanding and the motor is stopped: both tiers agree.
    assert!(!pump.is_busy().unwrap());
}

#[test]
fn test_halt_drains_stale_reply() {
    let sim = SimulatedDevice::pump(0x00, SyringePumpModel::MiniSy04, 5_000)
        .with_motion_duration(Duration::from_millis(200))
        .shared();
    let session = Session::handshake(Arc::clone(&sim), DEFAULT_BAUD_RATE, None).unwrap();
    let mut pump = SyringePump::new(session, SyringePumpModel::MiniSy04, 5_000).unwrap();

    pump.move_absolute_steps(9000, false).unwrap();
    assert!(pump.is_busy().unwrap());
    std::thread::sleep(Duration::from_millis(40));

    // Halt mid-motion: the stale move reply, the halt reply, and the
    // resync reply are all consumed, in that order.
    pump.halt().unwrap();
    assert!(!pump.session_mut().is_awaiting());

    let sim_locked = sim.lock().unwrap();
    let position = sim_locked.position();
    drop(sim_locked);

    // The plunger froze mid-travel and the shadow follows hardware truth.
    assert!(position > 0 && position < 9000);
    assert_eq!(pump.shadow_steps(), position);

    // The device is idle again and answers normally.
    assert!(!pump.is_busy().unwrap());
}

#[test]
fn test_halt_without_outstanding_move() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::Sy08, 25_000);
    pump.move_absolute_steps(2000, true).unwrap();

    pump.halt().unwrap();
    assert_eq!(pump.shadow_steps(), 2000);
    assert!(!pump.session_mut().is_awaiting());

    let ops = SyringePumpModel::Sy08.opcodes();
    let opcodes: Vec<u8> = sim
        .lock()
        .unwrap()
        .received()
        .iter()
        .rev()
        .take(2)
        .map(|f| f.opcode)
        .collect();
    assert_eq!(opcodes, vec![ops.get_position, ops.force_stop]);
}

#[test]
fn test_firmware_version_paths() {
    // SY08 reports both fields in one reply.
    let (mut pump, _sim) = connect_pump(SyringePumpModel::Sy08, 25_000);
    assert_eq!(pump.firmware_version().unwrap(), (2, 1));

    // Mini SY04 splits the version across two queries and reports whole
    // words: the first query's full parameter is the major version.
    let (mut pump, _sim) = connect_pump(SyringePumpModel::MiniSy04, 5_000);
    assert_eq!(pump.firmware_version().unwrap(), (258, 7));
}

#[test]
fn test_link_queries() {
    let (mut pump, _sim) = connect_pump(SyringePumpModel::Sy08, 25_000);
    assert_eq!(pump.session_mut().rs232_baudrate().unwrap(), 9600);
    assert_eq!(pump.session_mut().rs485_baudrate().unwrap(), 9600);
    assert_eq!(pump.session_mut().query_address().unwrap(), 0x00);
}

#[test]
fn test_volume_validation() {
    let (mut pump, sim) = connect_pump(SyringePumpModel::Sy01B, 5_000);
    let frames_before = frames_received(&sim);
    let err = pump.aspirate(5001.0, true).unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::OutOfRange { .. })));
    let err = pump.dispense(-2.0, true).unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::OutOfRange { .. })));
    assert_eq!(frames_received(&sim), frames_before);
}
