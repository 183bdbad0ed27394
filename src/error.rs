use thiserror::Error;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Protobuf parsing error: {0}")]
    ProtobufError(#[from] prost::DecodeError),

    #[error("Protobuf encoding error: {0}")]
    ProtobufEncodeError(#[from] prost::EncodeError),

    #[error("Invalid ONNX model: {0}")]
    InvalidModel(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Failed to load model from {0}: {1}")]
    ModelLoadError(PathBuf, String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("Quantization thresholds are required to calculate quantization params (zero point and scale)")]
    MissingThresholds,

    #[error("Unsupported calibration mode '{0}': only naive mode is supported")]
    UnsupportedCalibrationMode(String),

    #[error("No calibration data: the data reader produced no batches")]
    NoCalibrationData,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
