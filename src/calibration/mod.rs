//! Post-training calibration of ONNX models.
//!
//! A run goes through four stages:
//!
//! 1. [`RangeObserver`] appends `ReduceMin`/`ReduceMax` probes to a copy of
//!    the model for every tensor selected for calibration.
//! 2. [`InferenceCollector`] executes the augmented model on calibration
//!    batches through an [`ExecutionProvider`].
//! 3. [`RangeAggregator`] merges the per-batch probe values into one
//!    (min, max) range per tensor.
//! 4. [`QuantParamCalculator`] turns each range into uint8 affine parameters,
//!    narrowing it when the tensor feeds a single `Clip` or `Relu`.
//!
//! [`calibrate`] wires the stages together and saves the augmented model
//! along the way.

pub mod aggregator;
pub mod collector;
pub mod observer;
pub mod options;
pub mod params;
pub mod table;

pub use aggregator::{CalibrationMode, QuantizationThresholds, RangeAggregator, RangeRecord};
pub use collector::{CollectedOutputs, InferenceCollector};
pub use observer::{probe_output_names, RangeObserver, REDUCE_MAX_SUFFIX, REDUCE_MIN_SUFFIX};
pub use options::CalibrationOptions;
pub use params::{QuantParamCalculator, QuantParams, QuantizationParams};
pub use table::{CalibrationTable, TensorCalibration};

use crate::data::CalibrationDataReader;
use crate::error::Result;
use crate::execution::ExecutionProvider;
use crate::model::OnnxModel;
use crate::parser::OnnxModelWriter;

/// Calibrate `model` and return the quantization parameters of every observed tensor
pub fn calibrate<P, R>(
    model: &OnnxModel,
    provider: &P,
    reader: &mut R,
    options: &CalibrationOptions,
) -> Result<QuantizationParams>
where
    P: ExecutionProvider + ?Sized,
    R: CalibrationDataReader + ?Sized,
{
    Ok(calibrate_with_thresholds(model, provider, reader, options)?.quantization_params())
}

/// Like [`calibrate`], but also keep the aggregated ranges
pub fn calibrate_with_thresholds<P, R>(
    model: &OnnxModel,
    provider: &P,
    reader: &mut R,
    options: &CalibrationOptions,
) -> Result<CalibrationTable>
where
    P: ExecutionProvider + ?Sized,
    R: CalibrationDataReader + ?Sized,
{
    options.validate()?;

    let aggregator = RangeAggregator::new(options.mode);
    aggregator.check_mode()?;

    let augmented = RangeObserver::from_options(options).augment(model)?;
    OnnxModelWriter::save_model(&augmented, &options.augmented_model_path)?;
    log::debug!("Saved augmented model to {}", options.augmented_model_path.display());

    let collected = InferenceCollector::new(options.iterations).collect(provider, &augmented, reader)?;
    let thresholds = aggregator.aggregate(&collected, model.graph.outputs.len())?;
    let params = QuantParamCalculator::new().compute(&model.graph, Some(&thresholds))?;

    log::info!(
        "Calibrated, quantized parameters calculated for {} tensors of graph '{}'",
        params.len(), model.graph.name
    );

    Ok(CalibrationTable::new(&thresholds, &params))
}
