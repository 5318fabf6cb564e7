//! Calibration-aware conversion of raw soil probe counts.

/// ADC count the probe reports when sitting in open air. Counts at or
/// below this are sensor floor artifacts, not real moisture.
pub const CALIBRATION_OFFSET: f32 = 1000.0;

/// Full-scale count of the 12-bit ADC.
pub const FULL_SCALE: f32 = 4096.0;

/// Convert a raw ADC count to a moisture percentage.
///
/// The result is intentionally unclamped: counts below
/// [`CALIBRATION_OFFSET`] map above 100% and are left for the backend to
/// interpret.
pub fn percent(raw: u16) -> f32 {
    (1.0 - (raw as f32 - CALIBRATION_OFFSET) / (FULL_SCALE - CALIBRATION_OFFSET)) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_count_is_fully_wet() {
        assert_eq!(percent(1000), 100.0);
    }

    #[test]
    fn full_scale_count_is_fully_dry() {
        assert_eq!(percent(4096), 0.0);
    }

    #[test]
    fn counts_below_offset_are_not_clamped() {
        assert!(percent(500) > 100.0);
    }

    #[test]
    fn conversion_decreases_with_raw_count() {
        let mut last = percent(1000);
        for raw in (1100..=4000).step_by(100) {
            let p = percent(raw);
            assert!(p < last, "percent({raw}) = {p} not below {last}");
            last = p;
        }
    }
}
