use crate::error::CropScanError;
use cropscan_types::disease::Severity;
use std::cmp::Ordering;

pub const DEFAULT_SEVERE_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MODERATE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_PROBABILITY_TOLERANCE: f32 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct PredictionCandidate {
    pub label: String,
    pub class_index: usize,
    pub probability: f32,
    /// None for healthy classes
    pub severity: Option<Severity>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankedResult {
    pub primary: PredictionCandidate,
    pub alternatives: Vec<PredictionCandidate>,
}

impl RankedResult {
    pub fn iter(&self) -> impl Iterator<Item = &PredictionCandidate> {
        std::iter::once(&self.primary).chain(self.alternatives.iter())
    }
}

pub fn is_healthy_label(label: &str) -> bool {
    label.to_lowercase().contains("healthy")
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Turns a probability vector into an ordered top-k result with severity tags.
///
/// Thresholds are inclusive lower bounds: `p >= severe` is severe, `p >= moderate` is moderate,
/// everything else is mild.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ranker {
    severe: f32,
    moderate: f32,
    tolerance: f32,
}

impl Default for Ranker {
    fn default() -> Self {
        Self {
            severe: DEFAULT_SEVERE_THRESHOLD,
            moderate: DEFAULT_MODERATE_THRESHOLD,
            tolerance: DEFAULT_PROBABILITY_TOLERANCE,
        }
    }
}

impl Ranker {
    pub fn new(severe: f32, moderate: f32, tolerance: f32) -> Result<Self, CropScanError> {
        let in_unit = |value: f32| (0.0..=1.0).contains(&value);
        if !in_unit(severe) || !in_unit(moderate) {
            return Err(CropScanError::InvalidConfig(format!(
                "severity thresholds must lie in [0, 1], got severe {severe} moderate {moderate}"
            )));
        }
        if moderate > severe {
            return Err(CropScanError::InvalidConfig(format!(
                "moderate threshold {moderate} is above severe threshold {severe}"
            )));
        }
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(CropScanError::InvalidConfig(format!(
                "probability tolerance must lie in (0, 1), got {tolerance}"
            )));
        }
        Ok(Self {
            severe,
            moderate,
            tolerance,
        })
    }

    pub fn severity_for(&self, probability: f32) -> Severity {
        if probability >= self.severe {
            Severity::Severe
        } else if probability >= self.moderate {
            Severity::Moderate
        } else {
            Severity::Mild
        }
    }

    fn check_probabilities(&self, probabilities: &[f32]) -> Result<(), CropScanError> {
        if let Some((index, value)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || **value < 0.0)
        {
            return Err(CropScanError::MalformedProbabilities(format!(
                "value {value} at class index {index}"
            )));
        }
        let sum: f32 = probabilities.iter().sum();
        if (sum - 1.0).abs() > self.tolerance {
            return Err(CropScanError::MalformedProbabilities(format!(
                "scores sum to {sum}, expected 1 within {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    pub fn rank(
        &self,
        probabilities: &[f32],
        labels: &[String],
        top_k: usize,
    ) -> Result<RankedResult, CropScanError> {
        if probabilities.len() != labels.len() {
            return Err(CropScanError::MalformedProbabilities(format!(
                "{} scores for {} class labels",
                probabilities.len(),
                labels.len()
            )));
        }
        if top_k == 0 || top_k > labels.len() {
            return Err(CropScanError::TopKOutOfBounds {
                top_k,
                max: Some(labels.len()),
            });
        }
        self.check_probabilities(probabilities)?;

        let mut order: Vec<usize> = (0..probabilities.len()).collect();
        // stable, equal scores keep ascending class index
        order.sort_by(|a, b| {
            probabilities[*b]
                .partial_cmp(&probabilities[*a])
                .unwrap_or(Ordering::Equal)
        });

        let mut candidates = order.into_iter().take(top_k).map(|index| {
            let label = labels[index].clone();
            let probability = probabilities[index];
            let severity = (!is_healthy_label(&label)).then(|| self.severity_for(probability));
            PredictionCandidate {
                label,
                class_index: index,
                probability,
                severity,
            }
        });
        let primary = candidates
            .next()
            .ok_or(CropScanError::TopKOutOfBounds { top_k, max: Some(0) })?;
        Ok(RankedResult {
            primary,
            alternatives: candidates.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test_case(0.95, Severity::Severe; "well above severe")]
    #[test_case(0.8, Severity::Severe; "severe boundary is inclusive")]
    #[test_case(0.6, Severity::Moderate; "moderate")]
    #[test_case(0.5, Severity::Moderate; "moderate boundary is inclusive")]
    #[test_case(0.3, Severity::Mild; "mild")]
    fn severity_thresholds(probability: f32, expected: Severity) {
        assert_eq!(Ranker::default().severity_for(probability), expected);
    }

    #[test]
    fn sorts_descending_with_index_tie_break() {
        let result = Ranker::default()
            .rank(
                &[0.1, 0.3, 0.3, 0.25, 0.05],
                &labels(&["a", "b", "c", "d", "e"]),
                4,
            )
            .unwrap();
        let order: Vec<usize> = result.iter().map(|c| c.class_index).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
        assert_eq!(result.alternatives.len(), 3);
    }

    #[test]
    fn healthy_labels_never_carry_severity() {
        let result = Ranker::default()
            .rank(
                &[0.9, 0.1],
                &labels(&["Tomato_healthy", "Tomato_Late_blight"]),
                2,
            )
            .unwrap();
        assert_eq!(result.primary.severity, None);
        assert_eq!(result.alternatives[0].severity, Some(Severity::Mild));
    }

    #[test_case(0; "zero")]
    #[test_case(4; "above class count")]
    fn rejects_top_k_out_of_bounds(top_k: usize) {
        let err = Ranker::default()
            .rank(&[0.2, 0.3, 0.5], &labels(&["a", "b", "c"]), top_k)
            .unwrap_err();
        assert_eq!(err, CropScanError::TopKOutOfBounds { top_k, max: Some(3) });
    }

    #[test_case(&[0.5, 0.2, 0.1]; "does not sum to one")]
    #[test_case(&[f32::NAN, 0.5, 0.5]; "nan")]
    #[test_case(&[-0.2, 0.7, 0.5]; "negative")]
    fn rejects_malformed_vectors(probabilities: &[f32]) {
        let err = Ranker::default()
            .rank(probabilities, &labels(&["a", "b", "c"]), 1)
            .unwrap_err();
        assert!(matches!(err, CropScanError::MalformedProbabilities(_)));
        assert!(err.kind().is_client_error());
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0, 998.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(probs[0], probs[1]);
        assert!(probs[2] < probs[0]);
    }

    #[test]
    fn thresholds_are_validated() {
        assert!(Ranker::new(0.5, 0.8, 0.01).is_err());
        assert!(Ranker::new(1.2, 0.5, 0.01).is_err());
        assert!(Ranker::new(0.9, 0.4, 0.0).is_err());
        assert!(Ranker::new(0.9, 0.4, 0.02).is_ok());
    }
}
