//! Ensemble weights from cross-validated errors

use crate::error::{ForecastError, Result};
use crate::models::ModelKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Errors below this are treated as this value, so a perfect model gets a
/// large but finite weight
const MIN_ERROR: f64 = 1e-9;

/// Normalised combination weight per model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights(BTreeMap<ModelKind, f64>);

impl EnsembleWeights {
    pub fn get(&self, kind: ModelKind) -> Option<f64> {
        self.0.get(&kind).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelKind, f64)> + '_ {
        self.0.iter().map(|(k, w)| (*k, *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Largest single weight, 0 when empty
    pub fn max_weight(&self) -> f64 {
        self.0.values().copied().fold(0.0, f64::max)
    }

    pub fn as_map(&self) -> &BTreeMap<ModelKind, f64> {
        &self.0
    }
}

impl From<BTreeMap<ModelKind, f64>> for EnsembleWeights {
    fn from(map: BTreeMap<ModelKind, f64>) -> Self {
        Self(map)
    }
}

/// Turns per-model errors into bounded combination weights
#[derive(Debug, Clone)]
pub struct EnsembleWeighter {
    min_weight: f64,
    max_weight: f64,
}

impl Default for EnsembleWeighter {
    fn default() -> Self {
        Self {
            min_weight: 0.1,
            max_weight: 0.5,
        }
    }
}

impl EnsembleWeighter {
    pub fn new(min_weight: f64, max_weight: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_weight) || !(0.0..=1.0).contains(&max_weight) || min_weight > max_weight {
            return Err(ForecastError::InvalidParameter(format!(
                "Weight bounds must satisfy 0 <= min <= max <= 1, got [{}, {}]",
                min_weight, max_weight
            )));
        }
        Ok(Self {
            min_weight,
            max_weight,
        })
    }

    /// Weights proportional to `1 / mae`, clamped to the bounds and normalised.
    ///
    /// Models with a non-finite error are left out. The clamp runs once, so
    /// after the final normalisation a weight can sit outside the bounds when
    /// fewer models are active than the bounds can accommodate.
    pub fn compute_weights(&self, errors: &BTreeMap<ModelKind, f64>) -> Result<EnsembleWeights> {
        let weights = weights_from_errors(errors, self.min_weight, self.max_weight)?;
        debug!(?weights, "computed ensemble weights");
        Ok(EnsembleWeights(weights))
    }
}

/// Inverse-error weighting with a single clamp and renormalisation
pub fn weights_from_errors<K: Ord + Clone>(
    errors: &BTreeMap<K, f64>,
    min_weight: f64,
    max_weight: f64,
) -> Result<BTreeMap<K, f64>> {
    let inverse: BTreeMap<K, f64> = errors
        .iter()
        .filter(|(_, e)| e.is_finite() && **e >= 0.0)
        .map(|(k, e)| (k.clone(), 1.0 / e.max(MIN_ERROR)))
        .collect();

    if inverse.is_empty() {
        return Err(ForecastError::NoActiveModels);
    }

    let total: f64 = inverse.values().sum();
    let clamped: BTreeMap<K, f64> = inverse
        .into_iter()
        .map(|(k, w)| (k, (w / total).clamp(min_weight, max_weight)))
        .collect();

    let total: f64 = clamped.values().sum();
    Ok(clamped.into_iter().map(|(k, w)| (k, w / total)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn errors(values: &[(ModelKind, f64)]) -> BTreeMap<ModelKind, f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_equal_errors_give_equal_weights() {
        let weights = EnsembleWeighter::default()
            .compute_weights(&errors(&[
                (ModelKind::Arima, 5.0),
                (ModelKind::Decomposable, 5.0),
                (ModelKind::RandomForest, 5.0),
            ]))
            .unwrap();
        for (_, w) in weights.iter() {
            assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_dominance_guard() {
        let weights = EnsembleWeighter::default()
            .compute_weights(&errors(&[(ModelKind::Arima, 1.0), (ModelKind::Decomposable, 100.0)]))
            .unwrap();
        assert_relative_eq!(weights.get(ModelKind::Arima).unwrap(), 0.5 / 0.6, epsilon = 1e-12);
        assert_relative_eq!(weights.get(ModelKind::Decomposable).unwrap(), 0.1 / 0.6, epsilon = 1e-12);
    }

    #[rstest]
    #[case(&[4.0, 6.0, 9.0, 12.0])]
    #[case(&[1.0, 1.5, 2.0, 2.5])]
    #[case(&[10.0, 11.0, 12.0, 13.0])]
    fn test_four_models_sum_to_one_within_bounds(#[case] maes: &[f64]) {
        let map: BTreeMap<ModelKind, f64> = ModelKind::ALL.iter().copied().zip(maes.iter().copied()).collect();
        let weights = EnsembleWeighter::default().compute_weights(&map).unwrap();
        assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-9);
        for (_, w) in weights.iter() {
            assert!((0.1 - 1e-9..=0.5 + 1e-9).contains(&w), "weight {} out of bounds", w);
        }
        // lower error never gets less weight
        let ordered: Vec<f64> = ModelKind::ALL.iter().map(|k| weights.get(*k).unwrap()).collect();
        assert!(ordered.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_empty_and_non_finite_inputs() {
        let weighter = EnsembleWeighter::default();
        assert!(matches!(
            weighter.compute_weights(&BTreeMap::new()),
            Err(ForecastError::NoActiveModels)
        ));
        assert!(matches!(
            weighter.compute_weights(&errors(&[(ModelKind::Arima, f64::NAN)])),
            Err(ForecastError::NoActiveModels)
        ));

        let weights = weighter
            .compute_weights(&errors(&[(ModelKind::Arima, 0.0), (ModelKind::RandomForest, f64::INFINITY)]))
            .unwrap();
        assert_eq!(weights.len(), 1);
        assert_relative_eq!(weights.get(ModelKind::Arima).unwrap(), 1.0);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(EnsembleWeighter::new(0.6, 0.5).is_err());
        assert!(EnsembleWeighter::new(-0.1, 0.5).is_err());
    }
}
