use std::collections::HashMap;

use crate::data::CalibrationDataReader;
use crate::error::{Error, Result};
use crate::execution::{ExecutionProvider, InferenceSession, Value};
use crate::model::OnnxModel;

/// Raw outputs of the augmented model, one entry per processed batch
#[derive(Debug, Clone, Default)]
pub struct CollectedOutputs {
    /// Declared output names of the session, in order
    pub output_names: Vec<String>,
    /// `batches[b][k]` is the value of `output_names[k]` for batch `b`
    pub batches: Vec<Vec<Value>>,
}

impl CollectedOutputs {
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }
}

/// Runs the augmented model over calibration batches
#[derive(Debug, Clone, Copy)]
pub struct InferenceCollector {
    max_batches: usize,
}

impl Default for InferenceCollector {
    fn default() -> Self {
        Self { max_batches: 1 }
    }
}

impl InferenceCollector {
    pub fn new(max_batches: usize) -> Self {
        Self { max_batches }
    }

    pub fn max_batches(&self) -> usize {
        self.max_batches
    }

    /// Execute `model` on at most `max_batches` batches from `reader`.
    ///
    /// Running out of data early is not an error. The session lives only for
    /// the duration of this call.
    pub fn collect<P, R>(&self, provider: &P, model: &OnnxModel, reader: &mut R) -> Result<CollectedOutputs>
    where
        P: ExecutionProvider + ?Sized,
        R: CalibrationDataReader + ?Sized,
    {
        let mut session = provider.load(model)?;
        let input_names = session.input_names().to_vec();
        let output_names = session.output_names().to_vec();

        let mut batches = Vec::new();

        for (index, batch) in reader.batches().take(self.max_batches).enumerate() {
            let batch = batch?;
            let inputs = Self::bind_inputs(index, &input_names, batch)?;

            let outputs = session.run(inputs)?;
            if outputs.len() != output_names.len() {
                return Err(Error::ExecutionError(format!(
                    "batch {}: session returned {} outputs but declares {}",
                    index, outputs.len(), output_names.len()
                )));
            }

            batches.push(outputs);
        }

        log::debug!(
            "Collected outputs of {} batches (limit {}, batch size {})",
            batches.len(), self.max_batches, reader.batch_size()
        );

        Ok(CollectedOutputs {
            output_names,
            batches,
        })
    }

    /// Bind batch values to the declared inputs by position
    fn bind_inputs(index: usize, input_names: &[String], batch: Vec<Value>) -> Result<HashMap<String, Value>> {
        if batch.len() < input_names.len() {
            return Err(Error::InvalidInput(format!(
                "batch {} holds {} values but the model declares {} inputs",
                index, batch.len(), input_names.len()
            )));
        }

        if batch.len() > input_names.len() {
            log::warn!(
                "batch {} holds {} values; ignoring those past the {} declared inputs",
                index, batch.len(), input_names.len()
            );
        }

        Ok(input_names.iter().cloned().zip(batch).collect())
    }
}
