pub mod dataloader;

pub use dataloader::{DataLoader, LastBatch};

use crate::error::Result;
use crate::execution::Value;

/// One model invocation worth of inputs, aligned with the declared graph inputs
pub type Batch = Vec<Value>;

/// Source of calibration batches.
///
/// `batches` is lazy: the collector pulls only as many batches as it needs,
/// and every call starts a fresh pass over the data.
pub trait CalibrationDataReader {
    /// Number of samples stacked into each batch
    fn batch_size(&self) -> usize;

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

/// Pre-batched data held in memory
impl CalibrationDataReader for Vec<Batch> {
    fn batch_size(&self) -> usize {
        self.first()
            .and_then(|batch| batch.first())
            .and_then(|value| value.shape().first().copied())
            .unwrap_or(1)
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}
