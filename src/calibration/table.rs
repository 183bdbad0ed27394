use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::aggregator::QuantizationThresholds;
use super::params::{QuantParams, QuantizationParams};

/// Calibration result of one tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorCalibration {
    pub min: f32,
    pub max: f32,
    pub zero_point: u8,
    pub scale: f32,
}

/// Thresholds and parameters of a calibration run, keyed by tensor name.
///
/// Stored sorted so that the JSON export is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    pub tensors: BTreeMap<String, TensorCalibration>,
}

impl CalibrationTable {
    /// Join thresholds with their parameters; tensors missing from either side are left out
    pub fn new(thresholds: &QuantizationThresholds, params: &QuantizationParams) -> Self {
        let tensors = thresholds.iter()
            .filter_map(|(name, &(min, max))| {
                params.get(name).map(|p| {
                    (name.clone(), TensorCalibration {
                        min,
                        max,
                        zero_point: p.zero_point,
                        scale: p.scale,
                    })
                })
            })
            .collect();

        Self { tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn thresholds(&self) -> QuantizationThresholds {
        self.tensors.iter()
            .map(|(name, t)| (name.clone(), (t.min, t.max)))
            .collect()
    }

    pub fn quantization_params(&self) -> QuantizationParams {
        self.tensors.iter()
            .map(|(name, t)| (name.clone(), QuantParams { zero_point: t.zero_point, scale: t.scale }))
            .collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
