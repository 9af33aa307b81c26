//! Codes reported by the `PlayerTrackSurface` channel.
//!
//! The validator compares raw samples against a configurable list; these are
//! the defaults.

pub const NOT_IN_WORLD: i32 = -1;
pub const UNDEFINED: i32 = 0;
pub const ASPHALT_1: i32 = 1;
pub const ASPHALT_2: i32 = 2;
pub const OFF_TRACK: i32 = 3;

/// Surfaces that invalidate a lap when seen on any sample.
pub const DEFAULT_INVALID_SURFACES: [i32; 2] = [OFF_TRACK, NOT_IN_WORLD];

/// Interpret a widened channel sample as a surface code.
///
/// Non-integral or non-finite samples have no surface code.
pub fn surface_code(sample: f64) -> Option<i32> {
    if sample.is_finite() && sample.fract() == 0.0 {
        Some(sample as i32)
    } else {
        None
    }
}
