//! Linear range mapping and control-unit ↔ degree conversion.
//!
//! AX-12 servos cover 0–300° with 10-bit resolution, so one control-input
//! unit is 300/1023 ≈ 0.2933°.

use teleop_types::REGISTER_MAX;

/// Mechanical travel covered by the full register range.
pub const FULL_RANGE_DEG: f64 = 300.0;

/// Map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Values outside the input range extrapolate linearly.  Returns `None` when
/// the input range is degenerate (`in_min == in_max`).
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> Option<f64> {
    let span = in_max - in_min;
    if span == 0.0 {
        return None;
    }
    Some((value - in_min) / span * (out_max - out_min) + out_min)
}

/// Degrees covered by `units` control-input units.
pub fn units_to_degrees(units: i32) -> f64 {
    f64::from(units) * degrees_per_unit()
}

/// Nearest whole number of control-input units for `degrees`.
pub fn degrees_to_units(degrees: f64) -> i32 {
    (degrees / degrees_per_unit()).round() as i32
}

fn degrees_per_unit() -> f64 {
    // Non-degenerate by construction.
    map_range(1.0, 0.0, f64::from(REGISTER_MAX), 0.0, FULL_RANGE_DEG).unwrap_or(0.0)
}
