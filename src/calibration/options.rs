use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::aggregator::CalibrationMode;

/// Options controlling a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Operator types whose inputs and outputs are observed
    pub op_types: Vec<String>,
    /// Node names never observed, even when their type matches
    pub excluded_nodes: Vec<String>,
    /// Node names always observed, whatever their type
    pub forced_nodes: Vec<String>,
    /// Where the augmented model is saved for inspection
    pub augmented_model_path: PathBuf,
    /// Maximum number of batches fed through the model
    pub iterations: usize,
    /// How per-batch ranges are merged
    pub mode: CalibrationMode,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            op_types: vec!["Conv".to_string(), "MatMul".to_string()],
            excluded_nodes: Vec::new(),
            forced_nodes: Vec::new(),
            augmented_model_path: PathBuf::from("augmented_model.onnx"),
            iterations: 1,
            mode: CalibrationMode::Naive,
        }
    }
}

impl CalibrationOptions {
    /// Create a new options object with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON file; absent keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    /// Set the operator types to calibrate
    pub fn set_op_types<I, S>(mut self, op_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_types = op_types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the node names excluded from calibration
    pub fn set_excluded_nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_nodes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the node names always calibrated
    pub fn set_forced_nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forced_nodes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set where the augmented model is written
    pub fn set_augmented_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.augmented_model_path = path.into();
        self
    }

    /// Set the maximum number of calibration batches
    pub fn set_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the aggregation mode
    pub fn set_mode(mut self, mode: CalibrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reject option combinations that can never produce parameters
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::InvalidConfig("iterations must be at least 1".to_string()));
        }

        if self.op_types.is_empty() && self.forced_nodes.is_empty() {
            return Err(Error::InvalidConfig(
                "no operator types or forced nodes selected for calibration".to_string(),
            ));
        }

        Ok(())
    }
}
