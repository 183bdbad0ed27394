pub mod error;
pub mod model;
pub mod proto;
pub mod parser;
pub mod execution;
pub mod data;
pub mod calibration;

// Re-export commonly used types
pub use model::{OnnxModel, Node, Graph, NodeId, Tensor, TensorInfo, ModelMetadata, Attribute, DataType, Dimension};
pub use error::{Error, Result};
pub use parser::{OnnxModelLoader, OnnxModelWriter, GraphBuilder};
pub use execution::{ExecutionProvider, InferenceSession, Value};
pub use data::{Batch, CalibrationDataReader, DataLoader, LastBatch};
pub use calibration::{
    calibrate, calibrate_with_thresholds, CalibrationMode, CalibrationOptions, CalibrationTable,
    QuantParamCalculator, QuantParams, QuantizationParams, QuantizationThresholds, RangeAggregator,
    RangeObserver, InferenceCollector,
};
