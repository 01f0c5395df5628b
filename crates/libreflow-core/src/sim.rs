//! Simulated device
//!
//! An in-memory stand-in for real hardware, used by the demo example and the
//! integration tests. It implements [`Transport`], parses the command frames
//! written to it, and produces reply frames with correct checksums and
//! realistic timing: motion commands do not reply until the simulated motion
//! completes, and a forced stop emits the aborted move's reply before the
//! halt's own.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::codes::{PumpOpcodes, ValveOpcodes, COMMON, SV};
use crate::device::SyringePumpModel;
use crate::error::TransportError;
use crate::protocol::frame::{COMMAND_FRAME_LEN, FACTORY_FRAME_LEN};
use crate::protocol::{CommandFrame, ReplyFrame, ReplyStatus, Transport};

/// Which opcode table the simulated device answers to.
#[derive(Debug, Clone, Copy)]
enum Profile {
    Pump(&'static PumpOpcodes),
    Valve(&'static ValveOpcodes),
}

/// One in-flight simulated motion.
#[derive(Debug)]
struct Motion {
    started: Instant,
    due: Instant,
    start_position: u16,
    end_position: u16,
    /// Reply emitted when the motion completes.
    reply: ReplyFrame,
}

/// A simulated pump or valve behind a [`Transport`].
#[derive(Debug)]
pub struct SimulatedDevice {
    address: u8,
    profile: Profile,
    max_position_steps: u16,
    position: u16,
    port: u8,
    speed_rpm: u16,
    motion: Option<Motion>,
    /// Reply bytes ready to be read.
    pending: Vec<u8>,
    /// Every command frame received, oldest first.
    received: Vec<CommandFrame>,
    motion_duration: Duration,
    /// Status forced onto the next reply, for fault-injection tests.
    next_status: Option<ReplyStatus>,
    /// When set, writes are swallowed and nothing ever replies.
    mute: bool,
    rng: StdRng,
}

impl SimulatedDevice {
    /// Simulate a syringe pump of the given variant and syringe volume.
    pub fn pump(address: u8, model: SyringePumpModel, syringe_volume_ul: u32) -> Self {
        let caps = model
            .capabilities(syringe_volume_ul)
            .expect("simulated pump requires a supported volume");
        Self {
            address,
            profile: Profile::Pump(model.opcodes()),
            max_position_steps: caps.max_position_steps,
            position: 0,
            port: 1,
            speed_rpm: 0,
            motion: None,
            pending: Vec::new(),
            received: Vec::new(),
            motion_duration: Duration::ZERO,
            next_status: None,
            mute: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Simulate a rotary selector valve.
    pub fn valve(address: u8) -> Self {
        Self {
            address,
            profile: Profile::Valve(&SV),
            max_position_steps: 0,
            position: 0,
            port: 1,
            speed_rpm: 0,
            motion: None,
            pending: Vec::new(),
            received: Vec::new(),
            motion_duration: Duration::ZERO,
            next_status: None,
            mute: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// How long simulated motions take before their reply is emitted.
    /// Defaults to zero (replies on the next read).
    pub fn with_motion_duration(mut self, duration: Duration) -> Self {
        self.motion_duration = duration;
        self
    }

    /// Wrap the device in a shared handle so a test can keep inspecting it
    /// after moving a clone into a session.
    pub fn shared(self) -> Arc<Mutex<SimulatedDevice>> {
        Arc::new(Mutex::new(self))
    }

    /// Force the given status onto the next reply.
    pub fn inject_status(&mut self, status: ReplyStatus) {
        self.next_status = Some(status);
    }

    /// Stop answering entirely (simulates a dead or mis-bauded link).
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// Every command frame received so far.
    pub fn received(&self) -> &[CommandFrame] {
        &self.received
    }

    /// Current simulated plunger position.
    pub fn position(&self) -> u16 {
        self.position
    }

    /// Current simulated port.
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Last speed the device was commanded to, in RPM.
    pub fn speed_rpm(&self) -> u16 {
        self.speed_rpm
    }

    fn reply(&mut self, parameter: u16) {
        let status = self.next_status.take().unwrap_or(ReplyStatus::Normal);
        let frame = ReplyFrame {
            address: self.address,
            status: status.code(),
            parameter,
        };
        self.pending.extend_from_slice(&frame.to_bytes());
    }

    /// Begin a motion; its reply is withheld until the motion completes.
    fn start_motion(&mut self, end_position: u16) {
        let now = Instant::now();
        let jitter = if self.motion_duration.is_zero() {
            Duration::ZERO
        } else {
            // Real moves never complete in exactly the nominal time.
            self.motion_duration
                .mul_f64(self.rng.gen_range(0.0..0.25))
        };
        let status = self.next_status.take().unwrap_or(ReplyStatus::Normal);
        self.motion = Some(Motion {
            started: now,
            due: now + self.motion_duration + jitter,
            start_position: self.position,
            end_position,
            reply: ReplyFrame {
                address: self.address,
                status: status.code(),
                parameter: 0,
            },
        });
    }

    /// Settle a completed motion, releasing its reply.
    fn tick(&mut self) {
        let due = match &self.motion {
            Some(motion) => motion.due,
            None => return,
        };
        if Instant::now() >= due {
            let motion = self.motion.take().expect("motion checked above");
            self.position = motion.end_position;
            self.pending.extend_from_slice(&motion.reply.to_bytes());
        }
    }

    /// Where the rotor/plunger is right now, interpolating mid-motion.
    fn current_position(&self) -> u16 {
        match &self.motion {
            None => self.position,
            Some(m) => {
                let total = m.due.duration_since(m.started).as_secs_f64();
                if total <= 0.0 {
                    return m.end_position;
                }
                let elapsed = m.started.elapsed().as_secs_f64().min(total);
                let fraction = elapsed / total;
                let span = m.end_position as f64 - m.start_position as f64;
                (m.start_position as f64 + span * fraction).round() as u16
            }
        }
    }

    /// Abort any in-flight motion, freezing the position mid-travel and
    /// releasing the aborted move's reply immediately.
    fn abort_motion(&mut self) {
        if self.motion.is_some() {
            let partial = self.current_position();
            let motion = self.motion.take().unwrap();
            self.position = partial;
            self.pending.extend_from_slice(&motion.reply.to_bytes());
        }
    }

    fn handle_pump_command(&mut self, ops: &'static PumpOpcodes, frame: CommandFrame) {
        let op = frame.opcode;
        let param = frame.parameter;
        if op == COMMON.get_address {
            // Any device answers an address query with its own address,
            // even when addressed incorrectly.
            self.reply(self.address as u16);
        } else if frame.address != self.address {
            // Everything else is ignored unless it is addressed to us.
        } else if op == COMMON.get_rs232_baudrate || op == COMMON.get_rs485_baudrate {
            self.reply(0); // 9600
        } else if op == COMMON.get_firmware_version {
            self.reply(u16::from_le_bytes([2, 1])); // v2.1
        } else if op == ops.get_motor_status {
            let busy = self.motion.is_some();
            self.reply(if busy { 0x04 } else { 0x00 });
        } else if op == ops.get_position {
            self.reply(self.current_position());
        } else if op == ops.sync_position {
            self.reply(0);
        } else if op == ops.reset_position {
            self.start_motion(0);
        } else if op == ops.force_stop {
            self.abort_motion();
            self.reply(0);
        } else if op == ops.set_speed {
            self.speed_rpm = param;
            self.reply(0);
        } else if op == ops.run_ccw {
            if param == 0 {
                // The hardware rejects zero-length relative moves.
                self.next_status = Some(ReplyStatus::ParameterError);
                self.reply(0);
            } else {
                let target =
                    (self.position as u32 + param as u32).min(self.max_position_steps as u32);
                self.start_motion(target as u16);
            }
        } else if op == ops.run_cw {
            if param == 0 {
                self.next_status = Some(ReplyStatus::ParameterError);
                self.reply(0);
            } else {
                self.start_motion(self.position.saturating_sub(param));
            }
        } else if Some(op) == ops.move_absolute {
            self.start_motion(param.min(self.max_position_steps));
        } else if Some(op) == ops.select_port {
            self.port = param as u8;
            self.start_motion(self.position);
        } else if Some(op) == ops.get_firmware_subversion {
            self.reply(7);
        } else {
            self.next_status = Some(ReplyStatus::CommandRejected);
            self.reply(0);
        }
    }

    fn handle_valve_command(&mut self, ops: &'static ValveOpcodes, frame: CommandFrame) {
        let op = frame.opcode;
        let param = frame.parameter;
        if op == COMMON.get_address {
            self.reply(self.address as u16);
        } else if frame.address != self.address {
        } else if op == COMMON.get_rs232_baudrate || op == COMMON.get_rs485_baudrate {
            self.reply(0);
        } else if op == COMMON.get_firmware_version {
            self.reply(u16::from_le_bytes([1, 4]));
        } else if op == ops.get_motor_status {
            let busy = self.motion.is_some();
            self.reply(if busy { 0x04 } else { 0x00 });
        } else if op == ops.get_port_position {
            self.reply(self.port as u16);
        } else if op == ops.reset_position {
            self.port = 1;
            self.start_motion(0);
        } else if op == ops.force_stop {
            self.abort_motion();
            self.reply(0);
        } else if op == ops.move_to_port {
            // Low byte is the target port; the high byte carries the
            // approach port selecting the rotation sense.
            self.port = (param & 0xFF) as u8;
            self.start_motion(0);
        } else {
            self.next_status = Some(ReplyStatus::CommandRejected);
            self.reply(0);
        }
    }
}

impl Transport for SimulatedDevice {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.mute {
            return Ok(());
        }
        if bytes.len() == FACTORY_FRAME_LEN {
            // Factory commands: acknowledge without modeling persistence.
            self.reply(0);
            return Ok(());
        }
        if bytes.len() != COMMAND_FRAME_LEN {
            return Ok(());
        }
        let frame = match CommandFrame::from_bytes(bytes) {
            Ok(frame) => frame,
            // Real hardware answers garbage with a frame error.
            Err(_) => {
                self.next_status = Some(ReplyStatus::FrameError);
                self.reply(0);
                return Ok(());
            }
        };
        self.received.push(frame);
        let profile = self.profile;
        match profile {
            Profile::Pump(ops) => self.handle_pump_command(ops, frame),
            Profile::Valve(ops) => self.handle_valve_command(ops, frame),
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        self.tick();
        let n = self.pending.len();
        buf.append(&mut self.pending);
        Ok(n)
    }
}

impl Transport for Arc<Mutex<SimulatedDevice>> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.lock().expect("simulated device lock").write_all(bytes)
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        self.lock()
            .expect("simulated device lock")
            .read_available(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_address_query() {
        let mut sim = SimulatedDevice::pump(0x05, SyringePumpModel::Sy08, 25_000);
        let query = CommandFrame::new(0x00, COMMON.get_address, 0);
        sim.write_all(&query.to_bytes()).unwrap();

        let mut buf = Vec::new();
        sim.read_available(&mut buf).unwrap();
        let reply = ReplyFrame::from_bytes(&buf).unwrap();
        assert_eq!(reply.parameter, 0x05);
        assert_eq!(reply.status(), ReplyStatus::Normal);
    }

    #[test]
    fn test_ignores_wrong_address() {
        let mut sim = SimulatedDevice::pump(0x05, SyringePumpModel::Sy08, 25_000);
        let cmd = CommandFrame::new(0x09, sim_opcode_get_position(), 0);
        sim.write_all(&cmd.to_bytes()).unwrap();

        let mut buf = Vec::new();
        assert_eq!(sim.read_available(&mut buf).unwrap(), 0);
    }

    fn sim_opcode_get_position() -> u8 {
        SyringePumpModel::Sy08.opcodes().get_position
    }

    #[test]
    fn test_zero_length_move_rejected() {
        let mut sim = SimulatedDevice::pump(0x00, SyringePumpModel::MiniSy04, 5_000);
        let ops = SyringePumpModel::MiniSy04.opcodes();
        let cmd = CommandFrame::new(0x00, ops.run_ccw, 0);
        sim.write_all(&cmd.to_bytes()).unwrap();

        let mut buf = Vec::new();
        sim.read_available(&mut buf).unwrap();
        let reply = ReplyFrame::from_bytes(&buf).unwrap();
        assert_eq!(reply.status(), ReplyStatus::ParameterError);
    }
}
