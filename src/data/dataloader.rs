use ndarray::{ArrayViewD, Axis};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::execution::Value;

use super::{Batch, CalibrationDataReader};

/// What to do with the samples left over when the dataset size is not a
/// multiple of the batch size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LastBatch {
    /// Leftover samples roll over to the next pass; a single pass drops them
    #[default]
    Rollover,
    /// Leftover samples form a final, smaller batch
    NoRollover,
}

/// In-memory data loader stacking per-sample inputs into batches.
///
/// Each sample holds one value per graph input. Batching stacks the i-th value
/// of every sample along a new leading axis.
#[derive(Debug, Clone)]
pub struct DataLoader {
    samples: Vec<Vec<Value>>,
    batch_size: usize,
    last_batch: LastBatch,
}

impl DataLoader {
    pub fn new(samples: Vec<Vec<Value>>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }

        Ok(Self {
            samples,
            batch_size,
            last_batch: LastBatch::default(),
        })
    }

    pub fn with_last_batch(mut self, last_batch: LastBatch) -> Self {
        self.last_batch = last_batch;
        self
    }

    /// Number of batches a full pass yields
    pub fn len(&self) -> usize {
        match self.last_batch {
            LastBatch::Rollover => self.samples.len() / self.batch_size,
            LastBatch::NoRollover => (self.samples.len() + self.batch_size - 1) / self.batch_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collate(samples: &[Vec<Value>]) -> Result<Batch> {
        let arity = samples.first().map(Vec::len).unwrap_or(0);

        if let Some(bad) = samples.iter().position(|s| s.len() != arity) {
            return Err(Error::InvalidInput(format!(
                "sample {} has {} inputs, expected {}",
                bad, samples[bad].len(), arity
            )));
        }

        (0..arity)
            .map(|i| {
                let views: Vec<ArrayViewD<f32>> = samples.iter().map(|s| s[i].view()).collect();
                ndarray::stack(Axis(0), &views).map_err(|e| {
                    Error::InvalidInput(format!("cannot stack input {} into a batch: {}", i, e))
                })
            })
            .collect()
    }
}

impl CalibrationDataReader for DataLoader {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let batch_size = self.batch_size;
        let keep_partial = self.last_batch == LastBatch::NoRollover;

        Box::new(
            self.samples
                .chunks(batch_size)
                .filter(move |chunk| keep_partial || chunk.len() == batch_size)
                .map(Self::collate),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, ArrayD, IxDyn};

    fn sample(value: f32) -> Vec<Value> {
        vec![arr1(&[value, value + 1.0]).into_dyn()]
    }

    #[test]
    fn test_rollover_drops_partial_batch() {
        let samples = (0..5).map(|i| sample(i as f32)).collect();
        let mut loader = DataLoader::new(samples, 2).unwrap();

        let batches: Vec<Batch> = loader.batches().collect::<Result<_>>().unwrap();
        assert_eq!(loader.len(), 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].shape(), &[2, 2]);
        assert_eq!(batches[1][0][[0, 0]], 2.0);
    }

    #[test]
    fn test_no_rollover_keeps_partial_batch() {
        let samples = (0..5).map(|i| sample(i as f32)).collect();
        let mut loader = DataLoader::new(samples, 2)
            .unwrap()
            .with_last_batch(LastBatch::NoRollover);

        let batches: Vec<Batch> = loader.batches().collect::<Result<_>>().unwrap();
        assert_eq!(loader.len(), 3);
        assert_eq!(batches[2][0].shape(), &[1, 2]);
        assert_eq!(batches[2][0][[0, 1]], 5.0);
    }

    #[test]
    fn test_mismatched_shapes_fail_to_collate() {
        let samples = vec![
            sample(0.0),
            vec![ArrayD::<f32>::zeros(IxDyn(&[3]))],
        ];
        let mut loader = DataLoader::new(samples, 2).unwrap();

        let first = loader.batches().next().unwrap();
        assert!(matches!(first, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        assert!(matches!(DataLoader::new(Vec::new(), 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_last_batch_parses_from_str() {
        assert_eq!("no_rollover".parse::<LastBatch>().unwrap(), LastBatch::NoRollover);
        assert_eq!(LastBatch::Rollover.to_string(), "rollover");
    }
}
