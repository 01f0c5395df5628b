//! Unit conversion functions
//!
//! Conversions between the units fluidics callers think in and the encoder
//! steps the hardware speaks:
//! - Volume: microliters ↔ steps (scaled by full-stroke step count and
//!   syringe volume)
//! - Travel: percent of full-scale range ↔ steps
//! - Speed: percent of a variant's maximum ↔ RPM
//!
//! All functions are pure and operate on explicit capability constants;
//! range validation is the device layer's job.

/// Convert microliters to encoder steps, rounded to the nearest step.
pub fn microliters_to_steps(microliters: f64, max_position_steps: u16, syringe_volume_ul: u32) -> u32 {
    let steps_per_ul = max_position_steps as f64 / syringe_volume_ul as f64;
    (microliters * steps_per_ul).round() as u32
}

/// Convert encoder steps to microliters.
pub fn steps_to_microliters(steps: u16, max_position_steps: u16, syringe_volume_ul: u32) -> f64 {
    steps as f64 * syringe_volume_ul as f64 / max_position_steps as f64
}

/// Convert encoder steps to percent of full-scale range.
pub fn steps_to_percent(steps: u16, max_position_steps: u16) -> f64 {
    steps as f64 * 100.0 / max_position_steps as f64
}

/// Convert percent of full-scale range to encoder steps, rounded to the
/// nearest step. Percent must already be validated to [0, 100].
pub fn percent_to_steps(percent: f64, max_position_steps: u16) -> u16 {
    (percent / 100.0 * max_position_steps as f64).round() as u16
}

/// Convert a speed percentage to RPM, rounded to the nearest integer RPM.
/// Percent must already be validated to [0, 100].
pub fn speed_percent_to_rpm(percent: f64, max_speed_rpm: u16) -> u16 {
    let rpm_per_percent = max_speed_rpm as f64 / 100.0;
    (percent * rpm_per_percent).round() as u16
}
