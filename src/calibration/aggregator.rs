use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{Error, Result};

use super::collector::CollectedOutputs;
use super::observer::{REDUCE_MAX_SUFFIX, REDUCE_MIN_SUFFIX};

/// Aggregated (min, max) range per observed tensor
pub type QuantizationThresholds = HashMap<String, (f32, f32)>;

/// Policy for merging per-batch ranges into one range per tensor
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMode {
    /// Minimum of the batch minimums, maximum of the batch maximums
    #[default]
    Naive,
    /// Percentile clipping of the observed distribution (not implemented)
    Percentile,
    /// KL-divergence threshold search (not implemented)
    Kl,
}

/// Per-batch (min, max) samples for each observed tensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeRecord {
    order: Vec<String>,
    samples: HashMap<String, Vec<(f32, f32)>>,
}

impl RangeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch worth of range for `tensor`
    pub fn push(&mut self, tensor: &str, min: f32, max: f32) {
        match self.samples.get_mut(tensor) {
            Some(samples) => samples.push((min, max)),
            None => {
                self.order.push(tensor.to_string());
                self.samples.insert(tensor.to_string(), vec![(min, max)]);
            },
        }
    }

    /// Observed tensors in the order they were first recorded
    pub fn tensors(&self) -> &[String] {
        &self.order
    }

    pub fn samples(&self, tensor: &str) -> Option<&[(f32, f32)]> {
        self.samples.get(tensor).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Merge the samples of every tensor into a single range
    pub fn reduce(&self, mode: CalibrationMode) -> Result<QuantizationThresholds> {
        if mode != CalibrationMode::Naive {
            return Err(Error::UnsupportedCalibrationMode(mode.to_string()));
        }

        Ok(self.order
            .par_iter()
            .map(|tensor| {
                let samples = &self.samples[tensor];
                let min = samples.iter().map(|s| s.0).fold(f32::INFINITY, f32::min);
                let max = samples.iter().map(|s| s.1).fold(f32::NEG_INFINITY, f32::max);
                (tensor.clone(), (min, max))
            })
            .collect())
    }
}

/// Turns raw probe outputs into per-tensor thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeAggregator {
    mode: CalibrationMode,
}

impl RangeAggregator {
    pub fn new(mode: CalibrationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    /// Fail unless the configured mode is implemented
    pub fn check_mode(&self) -> Result<()> {
        match self.mode {
            CalibrationMode::Naive => Ok(()),
            other => Err(Error::UnsupportedCalibrationMode(other.to_string())),
        }
    }

    /// Aggregate collected probe values into thresholds.
    ///
    /// The first `original_output_count` outputs belong to the original model
    /// and are ignored; the rest are (min, max) probe pairs.
    pub fn aggregate(&self, collected: &CollectedOutputs, original_output_count: usize) -> Result<QuantizationThresholds> {
        self.check_mode()?;

        let record = self.record(collected, original_output_count)?;
        let thresholds = record.reduce(self.mode)?;

        log::debug!(
            "Aggregated ranges of {} tensors over {} batches ({} mode)",
            thresholds.len(), collected.num_batches(), self.mode
        );

        Ok(thresholds)
    }

    /// Gather the per-batch probe values into a [`RangeRecord`]
    pub fn record(&self, collected: &CollectedOutputs, original_output_count: usize) -> Result<RangeRecord> {
        let names = &collected.output_names;

        if original_output_count > names.len() {
            return Err(Error::InvalidGraph(format!(
                "model declares {} outputs but the session exposes only {}",
                original_output_count, names.len()
            )));
        }

        let probe_names = &names[original_output_count..];
        if probe_names.len() % 2 != 0 {
            return Err(Error::InvalidGraph(format!(
                "expected (min, max) probe output pairs, found {} probe outputs",
                probe_names.len()
            )));
        }

        let tensors = probe_names
            .chunks(2)
            .map(|pair| Self::probed_tensor(&pair[0], &pair[1]))
            .collect::<Result<Vec<_>>>()?;

        if !tensors.is_empty() && collected.batches.is_empty() {
            return Err(Error::NoCalibrationData);
        }

        let mut record = RangeRecord::new();

        for (batch_index, values) in collected.batches.iter().enumerate() {
            if values.len() != names.len() {
                return Err(Error::InvalidInput(format!(
                    "batch {} holds {} outputs, expected {}",
                    batch_index, values.len(), names.len()
                )));
            }

            let probe_values = &values[original_output_count..];
            for (pair_index, tensor) in tensors.iter().enumerate() {
                let min_value = &probe_values[2 * pair_index];
                let max_value = &probe_values[2 * pair_index + 1];

                // Probes are scalar when the engine honours keepdims=0; reduce anyway
                let min = min_value.iter().copied().reduce(f32::min);
                let max = max_value.iter().copied().reduce(f32::max);

                match (min, max) {
                    (Some(min), Some(max)) => record.push(tensor, min, max),
                    _ => {
                        return Err(Error::InvalidInput(format!(
                            "batch {}: range probes of tensor {} produced an empty value",
                            batch_index, tensor
                        )));
                    },
                }
            }
        }

        Ok(record)
    }

    /// Recover the observed tensor name from a (min, max) probe output pair
    fn probed_tensor<'a>(min_name: &'a str, max_name: &str) -> Result<&'a str> {
        match (min_name.strip_suffix(REDUCE_MIN_SUFFIX), max_name.strip_suffix(REDUCE_MAX_SUFFIX)) {
            (Some(tensor), Some(other)) if tensor == other => Ok(tensor),
            _ => Err(Error::InvalidGraph(format!(
                "outputs {} and {} are not a (min, max) range probe pair",
                min_name, max_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, arr1, ArrayD};

    fn scalar(value: f32) -> ArrayD<f32> {
        arr0(value).into_dyn()
    }

    fn collected(output_names: &[&str], batches: Vec<Vec<ArrayD<f32>>>) -> CollectedOutputs {
        CollectedOutputs {
            output_names: output_names.iter().map(|s| s.to_string()).collect(),
            batches,
        }
    }

    #[test]
    fn test_naive_takes_extremes_across_batches() {
        let outputs = collected(
            &["Y", "X_ReduceMin", "X_ReduceMax", "Y_ReduceMin", "Y_ReduceMax"],
            vec![
                vec![scalar(9.0), scalar(-1.0), scalar(2.0), scalar(0.0), scalar(1.0)],
                vec![scalar(9.0), scalar(-3.0), scalar(5.0), scalar(0.0), scalar(3.0)],
            ],
        );

        let thresholds = RangeAggregator::default().aggregate(&outputs, 1).unwrap();

        assert_eq!(thresholds.len(), 2);
        assert_eq!(thresholds["X"], (-3.0, 5.0));
        assert_eq!(thresholds["Y"], (0.0, 3.0));
    }

    #[test]
    fn test_all_original_outputs_are_skipped() {
        // Two original outputs: both must be skipped, not just the first one
        let outputs = collected(
            &["A", "B", "T_ReduceMin", "T_ReduceMax"],
            vec![vec![scalar(100.0), scalar(-100.0), scalar(-0.5), scalar(0.5)]],
        );

        let thresholds = RangeAggregator::default().aggregate(&outputs, 2).unwrap();

        assert_eq!(thresholds.len(), 1);
        assert_eq!(thresholds["T"], (-0.5, 0.5));
    }

    #[test]
    fn test_record_keeps_one_sample_per_batch() {
        let outputs = collected(
            &["T_ReduceMin", "T_ReduceMax"],
            vec![
                vec![scalar(1.0), scalar(2.0)],
                vec![scalar(-1.0), scalar(4.0)],
                vec![scalar(0.0), scalar(3.0)],
            ],
        );

        let record = RangeAggregator::default().record(&outputs, 0).unwrap();

        assert_eq!(record.tensors(), &["T".to_string()]);
        assert_eq!(record.samples("T").unwrap(), &[(1.0, 2.0), (-1.0, 4.0), (0.0, 3.0)]);
    }

    #[test]
    fn test_non_scalar_probe_values_are_reduced() {
        let outputs = collected(
            &["T_ReduceMin", "T_ReduceMax"],
            vec![vec![arr1(&[0.5, -2.0]).into_dyn(), arr1(&[1.0, 7.0]).into_dyn()]],
        );

        let thresholds = RangeAggregator::default().aggregate(&outputs, 0).unwrap();
        assert_eq!(thresholds["T"], (-2.0, 7.0));
    }

    #[test]
    fn test_unsupported_mode_fails() {
        let outputs = collected(&["T_ReduceMin", "T_ReduceMax"], vec![vec![scalar(0.0), scalar(1.0)]]);

        for mode in [CalibrationMode::Percentile, CalibrationMode::Kl] {
            let result = RangeAggregator::new(mode).aggregate(&outputs, 0);
            assert!(matches!(result, Err(Error::UnsupportedCalibrationMode(_))));
        }
    }

    #[test]
    fn test_no_batches_is_an_error() {
        let outputs = collected(&["Y", "T_ReduceMin", "T_ReduceMax"], Vec::new());

        let result = RangeAggregator::default().aggregate(&outputs, 1);
        assert!(matches!(result, Err(Error::NoCalibrationData)));
    }

    #[test]
    fn test_mismatched_probe_pair_is_rejected() {
        let outputs = collected(&["A_ReduceMin", "B_ReduceMax"], vec![vec![scalar(0.0), scalar(1.0)]]);

        let result = RangeAggregator::default().aggregate(&outputs, 0);
        assert!(matches!(result, Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn test_mode_parses_from_str() {
        assert_eq!("naive".parse::<CalibrationMode>().unwrap(), CalibrationMode::Naive);
        assert_eq!(CalibrationMode::Kl.as_ref(), "kl");
        assert!("entropy".parse::<CalibrationMode>().is_err());
    }
}
