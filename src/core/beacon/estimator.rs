//! Signal strength to distance conversion
//! Log-distance path-loss model. This is a coarse model: it ignores multipath,
//! obstruction and per-device calibration, so a device reported distance should
//! be preferred whenever one is available.

use crate::core::beacon::constants::{
    DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_POWER_AT_1M, IMMEDIATE_THRESHOLD_M, NEAR_THRESHOLD_M,
    UNAVAILABLE_SIGNAL_STRENGTH, UNKNOWN_DISTANCE,
};
use crate::core::beacon::types::Proximity;

/// Estimates the distance in meters for a signal strength reading.
///
/// `distance = 10 ^ ((reference_power_at_1m - signal_strength) / (10 * path_loss_exponent))`
///
/// Returns [`UNKNOWN_DISTANCE`] when the signal strength is unavailable (0), the
/// exponent is not positive or the result is not finite.
pub fn estimate(signal_strength: i32, reference_power_at_1m: i32, path_loss_exponent: f64) -> f64 {
    if signal_strength == UNAVAILABLE_SIGNAL_STRENGTH || !(path_loss_exponent > 0.0) {
        return UNKNOWN_DISTANCE;
    }
    let exponent = (f64::from(reference_power_at_1m) - f64::from(signal_strength)) / (10.0 * path_loss_exponent);
    let distance = 10_f64.powf(exponent);
    if distance.is_finite() { distance } else { UNKNOWN_DISTANCE }
}

/// Buckets a distance the way ranging APIs report proximity
pub fn classify_proximity(distance: f64) -> Proximity {
    if !(distance > 0.0) || !distance.is_finite() {
        Proximity::Unknown
    } else if distance < IMMEDIATE_THRESHOLD_M {
        Proximity::Immediate
    } else if distance < NEAR_THRESHOLD_M {
        Proximity::Near
    } else {
        Proximity::Far
    }
}

/// Path-loss parameters used when no device distance is reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimator {
    /// Signal strength measured at 1 meter, in dBm
    pub reference_power_at_1m: i32,
    /// 2.0 in free space, higher indoors
    pub path_loss_exponent: f64,
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self {
            reference_power_at_1m: DEFAULT_REFERENCE_POWER_AT_1M,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl DistanceEstimator {
    pub fn new(reference_power_at_1m: i32, path_loss_exponent: f64) -> Self {
        Self {
            reference_power_at_1m,
            path_loss_exponent,
        }
    }

    pub fn estimate(&self, signal_strength: i32) -> f64 {
        estimate(signal_strength, self.reference_power_at_1m, self.path_loss_exponent)
    }

    /// Estimates with a per-frame calibrated power in place of the configured one
    pub fn estimate_with_reference(&self, signal_strength: i32, reference_power_at_1m: i32) -> f64 {
        estimate(signal_strength, reference_power_at_1m, self.path_loss_exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_power_is_one_meter() {
        assert_eq!(estimate(-59, -59, 2.0), 1.0);
    }

    #[test]
    fn test_weaker_signal_is_farther() {
        let d70 = estimate(-70, -59, 2.0);
        let d65 = estimate(-65, -59, 2.0);
        assert!((d70 - 10_f64.powf(11.0 / 20.0)).abs() < 1e-12);
        assert!((d70 - 3.548).abs() < 0.001);
        assert!(d65 < d70);
        assert!((d65 - 1.995).abs() < 0.001);
    }

    #[test]
    fn test_stronger_than_reference_is_under_one_meter() {
        let d = estimate(-49, -59, 2.0);
        assert!((d - 10_f64.powf(-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(estimate(0, -59, 2.0), UNKNOWN_DISTANCE);
        assert_eq!(estimate(-70, -59, 0.0), UNKNOWN_DISTANCE);
        assert_eq!(estimate(-70, -59, -1.5), UNKNOWN_DISTANCE);
        assert_eq!(estimate(-70, -59, f64::NAN), UNKNOWN_DISTANCE);
    }

    #[test]
    fn test_extreme_signal_strength() {
        assert_eq!(estimate(i32::MIN, -59, 2.0), UNKNOWN_DISTANCE);
        assert_eq!(estimate(-100, i32::MAX, 2.0), UNKNOWN_DISTANCE);
        let d = estimate(i32::MAX, -59, 2.0);
        assert!(d.is_finite() && d >= 0.0);
        assert_eq!(classify_proximity(d), Proximity::Unknown);
    }

    #[test]
    fn test_estimator_struct_uses_its_parameters() {
        let estimator = DistanceEstimator::new(-65, 3.0);
        assert_eq!(estimator.estimate(-65), 1.0);
        assert_eq!(estimator.estimate(-95), 10.0);
        assert_eq!(estimator.estimate_with_reference(-59, -59), 1.0);
        assert_eq!(DistanceEstimator::default().estimate(-59), 1.0);
    }

    #[test]
    fn test_classify_proximity() {
        assert_eq!(classify_proximity(0.2), Proximity::Immediate);
        assert_eq!(classify_proximity(1.5), Proximity::Near);
        assert_eq!(classify_proximity(7.0), Proximity::Far);
        assert_eq!(classify_proximity(UNKNOWN_DISTANCE), Proximity::Unknown);
        assert_eq!(classify_proximity(f64::INFINITY), Proximity::Unknown);
    }
}
