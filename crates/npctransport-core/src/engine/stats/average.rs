use crate::engine::error::EngineError;
use serde::Serialize;

/// Weighted average of `value1` and `value2` with weights `weight1` and `weight2`.
///
/// # Errors
///
/// Returns [`EngineError::InvalidWeights`] unless both weights are non-negative and
/// their sum is positive.
pub fn weighted_average(
    value1: f64,
    value2: f64,
    weight1: f64,
    weight2: f64,
) -> Result<f64, EngineError> {
    let valid = weight1 >= 0.0 && weight2 >= 0.0 && weight1 + weight2 > 0.0;
    if !valid {
        return Err(EngineError::InvalidWeights {
            old_weight: weight1,
            delta_weight: weight2,
        });
    }
    Ok((value1 * weight1 + value2 * weight2) / (weight1 + weight2))
}

/// Running average together with the total weight accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WeightedAverage {
    value: f64,
    weight: f64,
}

impl WeightedAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_empty(&self) -> bool {
        self.weight == 0.0
    }

    /// Returns the average after folding in `value` with weight `delta_weight`, leaving
    /// `self` untouched.
    pub fn updated(&self, value: f64, delta_weight: f64) -> Result<Self, EngineError> {
        Ok(Self {
            value: weighted_average(self.value, value, self.weight, delta_weight)?,
            weight: self.weight + delta_weight,
        })
    }

    pub fn update(&mut self, value: f64, delta_weight: f64) -> Result<(), EngineError> {
        *self = self.updated(value, delta_weight)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn weighted_average_rejects_invalid_weights() {
        assert!(matches!(
            weighted_average(1.0, 2.0, 0.0, 0.0),
            Err(EngineError::InvalidWeights { .. })
        ));
        assert!(matches!(
            weighted_average(1.0, 2.0, -1.0, 2.0),
            Err(EngineError::InvalidWeights { .. })
        ));
        assert!(matches!(
            weighted_average(1.0, 2.0, 1.0, f64::NAN),
            Err(EngineError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn sequence_of_updates_gives_weighted_mean() {
        let samples = [(3.0, 1.0), (1.0, 2.0), (5.0, 0.5), (2.0, 4.0)];
        let mut avg = WeightedAverage::new();
        for &(value, weight) in &samples {
            avg.update(value, weight).unwrap();
        }
        let total_weight: f64 = samples.iter().map(|&(_, w)| w).sum();
        let expected = samples.iter().map(|&(v, w)| v * w).sum::<f64>() / total_weight;
        assert!((avg.value() - expected).abs() < TOLERANCE);
        assert!((avg.weight() - total_weight).abs() < TOLERANCE);
    }

    #[test]
    fn reset_then_one_update_yields_that_value() {
        let mut avg = WeightedAverage::new();
        avg.update(10.0, 3.0).unwrap();
        avg.reset();
        assert!(avg.is_empty());
        avg.update(-2.5, 2.0).unwrap();
        assert_eq!(avg.value(), -2.5);
    }

    #[test]
    fn failed_update_leaves_average_unchanged() {
        let mut avg = WeightedAverage::new();
        avg.update(4.0, 1.0).unwrap();
        let before = avg;
        assert!(avg.update(1.0, -5.0).is_err());
        assert_eq!(avg, before);
    }
}
