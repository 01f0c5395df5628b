//! Per-variant opcode tables
//!
//! Pure data. Each hardware variant gets one table, built once as a constant
//! and selected at device construction. Opcode values are shared between
//! variants only where the hardware actually shares them; in particular the
//! relative-move and valve opcodes differ between pump families.

/// Opcodes every device answers, used during connection and for link
/// housekeeping.
pub struct CommonOpcodes {
    /// Query the device address. Any device that receives this replies with
    /// its address, even when addressed incorrectly.
    pub get_address: u8,
    /// Query the configured RS-232 baud rate code.
    pub get_rs232_baudrate: u8,
    /// Query the configured RS-485 baud rate code.
    pub get_rs485_baudrate: u8,
    /// Query the firmware version.
    pub get_firmware_version: u8,
}

/// Common opcode table.
pub const COMMON: CommonOpcodes = CommonOpcodes {
    get_address: 0x20,
    get_rs232_baudrate: 0x21,
    get_rs485_baudrate: 0x22,
    get_firmware_version: 0x3F,
};

/// Password-protected factory opcodes for persistent settings.
pub struct FactoryOpcodes {
    /// Set the device address (RS-485 buses).
    pub set_address: u8,
    /// Set the RS-232 baud rate code.
    pub set_rs232_baudrate: u8,
    /// Set the RS-485 baud rate code.
    pub set_rs485_baudrate: u8,
    /// Restore factory defaults.
    pub factory_reset: u8,
}

/// Factory opcode table.
pub const FACTORY: FactoryOpcodes = FactoryOpcodes {
    set_address: 0x00,
    set_rs232_baudrate: 0x01,
    set_rs485_baudrate: 0x02,
    factory_reset: 0xFF,
};

/// Opcode table for the syringe pump families.
#[derive(Debug)]
pub struct PumpOpcodes {
    /// Query actuator/motor status.
    pub get_motor_status: u8,
    /// Query absolute plunger position in steps.
    pub get_position: u8,
    /// Declare the current (reset) position as step 0.
    pub sync_position: u8,
    /// Home the plunger to the start of travel.
    pub reset_position: u8,
    /// Immediately stop motion.
    pub force_stop: u8,
    /// Set plunger speed in RPM.
    pub set_speed: u8,
    /// Relative move in the dispense direction.
    pub run_cw: u8,
    /// Relative move in the withdraw direction.
    pub run_ccw: u8,
    /// Absolute plunger move, on variants whose firmware supports it.
    pub move_absolute: Option<u8>,
    /// Rotate the integrated valve to a port, on multichannel variants.
    pub select_port: Option<u8>,
    /// Firmware sub-version query, on variants that split the version.
    pub get_firmware_subversion: Option<u8>,
}

/// Compact pump family (Mini SY04). No native absolute move; absolute
/// positioning is synthesized from relative moves in the driver.
pub const MINI_SY04: PumpOpcodes = PumpOpcodes {
    get_motor_status: 0x4A,
    get_position: 0x66,
    sync_position: 0x67,
    reset_position: 0x45,
    force_stop: 0x49,
    set_speed: 0x4B,
    run_cw: 0x42,
    run_ccw: 0x4D,
    move_absolute: None,
    select_port: None,
    get_firmware_subversion: Some(0xEF),
};

/// Bench pump family (SY08). Firmware supports absolute plunger moves.
pub const SY08: PumpOpcodes = PumpOpcodes {
    get_motor_status: 0x4A,
    get_position: 0x66,
    sync_position: 0x67,
    reset_position: 0x45,
    force_stop: 0x49,
    set_speed: 0x4B,
    run_cw: 0x42,
    run_ccw: 0x4D,
    move_absolute: Some(0x4E),
    select_port: None,
    get_firmware_subversion: None,
};

/// Multichannel pump+valve family (SY01B). The withdraw opcode differs from
/// the single-channel pumps, and the integrated valve is addressed through
/// `select_port`.
pub const SY01B: PumpOpcodes = PumpOpcodes {
    get_motor_status: 0x4A,
    get_position: 0x66,
    sync_position: 0x67,
    reset_position: 0x45,
    force_stop: 0x49,
    set_speed: 0x4B,
    run_cw: 0x42,
    run_ccw: 0x43,
    move_absolute: None,
    select_port: Some(0x44),
    get_firmware_subversion: None,
};

/// Opcode table for standalone rotary selector valves (SV family).
#[derive(Debug)]
pub struct ValveOpcodes {
    /// Query motor status.
    pub get_motor_status: u8,
    /// Query the current port position.
    pub get_port_position: u8,
    /// Rotate to a port; the parameter packs approach and target ports.
    pub move_to_port: u8,
    /// Home the rotor to its reset position.
    pub reset_position: u8,
    /// Immediately stop motion.
    pub force_stop: u8,
}

/// Rotary selector valve opcode table.
pub const SV: ValveOpcodes = ValveOpcodes {
    get_motor_status: 0x4A,
    get_port_position: 0x3E,
    move_to_port: 0xA4,
    reset_position: 0x45,
    force_stop: 0x49,
};

/// Decode a baud-rate code from a baud rate query reply.
pub fn baud_rate_from_code(code: u16) -> Option<u32> {
    match code {
        0 => Some(9_600),
        1 => Some(19_200),
        2 => Some(38_400),
        3 => Some(57_600),
        4 => Some(115_200),
        _ => None,
    }
}

/// Encode a baud rate as the code the factory commands expect.
pub fn baud_code_from_rate(baud: u32) -> Option<u16> {
    match baud {
        9_600 => Some(0),
        19_200 => Some(1),
        38_400 => Some(2),
        57_600 => Some(3),
        115_200 => Some(4),
        _ => None,
    }
}
