use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use prost::Message;

use crate::error::{Error, Result};
use crate::model::{OnnxModel, ModelMetadata, TensorInfo, DataType, Dimension, Tensor, Node, Graph, Attribute};
use crate::proto::attribute_proto::AttributeType;
use crate::proto::tensor_proto::DataLocation;
use crate::proto::tensor_shape_proto::dimension;
use crate::proto::type_proto;
use crate::proto::{ModelProto, GraphProto, NodeProto, TensorProto, ValueInfoProto, AttributeProto, OperatorSetIdProto};

/// ONNX model loader responsible for parsing and loading ONNX models
pub struct OnnxModelLoader;

impl OnnxModelLoader {
    /// Load an ONNX model from a file path
    pub fn load_model(path: &Path) -> Result<OnnxModel> {
        let mut file = File::open(path).map_err(|e| {
            Error::ModelLoadError(path.to_path_buf(), format!("Failed to open file: {}", e))
        })?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| {
            Error::ModelLoadError(path.to_path_buf(), format!("Failed to read file: {}", e))
        })?;

        log::debug!("Read {} bytes of ONNX model from {}", buffer.len(), path.display());
        Self::load_model_from_bytes(&buffer)
    }

    /// Load an ONNX model from bytes
    pub fn load_model_from_bytes(data: &[u8]) -> Result<OnnxModel> {
        let model_proto = Self::deserialize_model_proto(data)?;
        Self::convert_proto_to_internal(model_proto)
    }

    /// Deserialize protobuf bytes into a ModelProto
    pub fn deserialize_model_proto(bytes: &[u8]) -> Result<ModelProto> {
        ModelProto::decode(bytes).map_err(Error::ProtobufError)
    }

    /// Convert protobuf model to internal representation
    pub fn convert_proto_to_internal(mut proto: ModelProto) -> Result<OnnxModel> {
        if !proto.has_graph() {
            return Err(Error::MissingField("Model is missing graph".to_string()));
        }

        let opset_imports = Self::handle_opset_imports(&proto.opset_import);
        let metadata = Self::extract_model_metadata(&proto);
        let metadata_props = proto.metadata_props.iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect();

        let graph_proto = proto.graph.take()
            .ok_or_else(|| Error::MissingField("Model is missing graph".to_string()))?;
        let graph = Self::convert_graph_proto(graph_proto)?;

        Ok(OnnxModel {
            metadata,
            graph,
            opset_imports,
            metadata_props,
        })
    }

    /// Extract model metadata from protobuf
    pub fn extract_model_metadata(proto: &ModelProto) -> ModelMetadata {
        ModelMetadata {
            producer_name: proto.producer_name.clone(),
            producer_version: proto.producer_version.clone(),
            domain: proto.domain.clone(),
            model_version: proto.model_version,
            doc_string: proto.doc_string.clone(),
            graph_name: proto.graph.as_ref()
                .map(|g| g.name.clone())
                .unwrap_or_default(),
            ir_version: proto.ir_version,
        }
    }

    /// Process opset imports
    pub fn handle_opset_imports(imports: &[OperatorSetIdProto]) -> HashMap<String, i64> {
        imports.iter()
            .map(|import| (import.domain.clone(), import.version))
            .collect()
    }

    /// Convert a GraphProto to internal Graph representation
    fn convert_graph_proto(graph_proto: GraphProto) -> Result<Graph> {
        let initializers = graph_proto.initializer.iter()
            .map(Self::convert_tensor_proto)
            .collect::<Result<Vec<_>>>()?;

        let inputs = graph_proto.input.iter()
            .map(Self::convert_value_info_proto)
            .collect::<Result<Vec<_>>>()?;

        let outputs = graph_proto.output.iter()
            .map(Self::convert_value_info_proto)
            .collect::<Result<Vec<_>>>()?;

        let value_info = graph_proto.value_info.iter()
            .map(Self::convert_value_info_proto)
            .collect::<Result<Vec<_>>>()?;

        let nodes = graph_proto.node.iter().enumerate()
            .map(|(id, node)| Self::convert_node_proto(node, id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Graph {
            name: graph_proto.name,
            nodes,
            inputs,
            outputs,
            initializers,
            value_info,
            doc_string: graph_proto.doc_string,
        })
    }

    /// Convert a NodeProto to internal Node representation
    fn convert_node_proto(node_proto: &NodeProto, id: usize) -> Result<Node> {
        let mut attributes = HashMap::new();

        for attr in &node_proto.attribute {
            let value = Self::convert_attribute_proto(attr)?;
            attributes.insert(attr.name.clone(), value);
        }

        Ok(Node {
            id,
            name: node_proto.name.clone(),
            op_type: node_proto.op_type.clone(),
            domain: node_proto.domain.clone(),
            inputs: node_proto.input.clone(),
            outputs: node_proto.output.clone(),
            attributes,
            doc_string: node_proto.doc_string.clone(),
        })
    }

    /// Convert a TensorProto to internal Tensor representation.
    ///
    /// Typed payloads are normalised to little-endian bytes in the element
    /// width of the data type, matching the `raw_data` layout.
    fn convert_tensor_proto(tensor_proto: &TensorProto) -> Result<Tensor> {
        let data_type = DataType::from_proto(tensor_proto.data_type);

        if tensor_proto.data_location == DataLocation::External as i32 || !tensor_proto.external_data.is_empty() {
            return Err(Error::UnsupportedFeature(format!(
                "Tensor {} stores its data externally",
                tensor_proto.name
            )));
        }

        let data = if !tensor_proto.raw_data.is_empty() {
            tensor_proto.raw_data.clone()
        } else {
            Self::typed_payload(tensor_proto, data_type)?
        };

        Ok(Tensor {
            name: tensor_proto.name.clone(),
            data_type,
            dims: tensor_proto.dims.clone(),
            data,
            doc_string: tensor_proto.doc_string.clone(),
        })
    }

    fn typed_payload(tensor_proto: &TensorProto, data_type: DataType) -> Result<Vec<u8>> {
        let int32 = &tensor_proto.int32_data;
        let uint64 = &tensor_proto.uint64_data;

        let data = match data_type {
            DataType::Float | DataType::Complex64 => tensor_proto.float_data.iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            DataType::Double | DataType::Complex128 => tensor_proto.double_data.iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            DataType::Int64 => tensor_proto.int64_data.iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            DataType::Int32 => int32.iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            DataType::Int8 => int32.iter().map(|&v| v as i8 as u8).collect(),
            DataType::Uint8 | DataType::Bool => int32.iter().map(|&v| v as u8).collect(),
            // float16 and bfloat16 values travel as their bit patterns
            DataType::Int16 | DataType::Uint16 | DataType::Float16 | DataType::BFloat16 => int32.iter()
                .flat_map(|&v| (v as u16).to_le_bytes())
                .collect(),
            DataType::Uint32 => uint64.iter()
                .flat_map(|&v| (v as u32).to_le_bytes())
                .collect(),
            DataType::Uint64 => uint64.iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            DataType::String if tensor_proto.string_data.is_empty() => Vec::new(),
            DataType::String => {
                return Err(Error::UnsupportedFeature(format!(
                    "String tensor {} is not supported",
                    tensor_proto.name
                )));
            },
            DataType::Undefined => {
                return Err(Error::InvalidModel(format!(
                    "Tensor {} has an undefined data type",
                    tensor_proto.name
                )));
            },
        };

        Ok(data)
    }

    /// Convert a ValueInfoProto to internal TensorInfo representation
    fn convert_value_info_proto(value_info: &ValueInfoProto) -> Result<TensorInfo> {
        let name = value_info.name.clone();
        let doc_string = value_info.doc_string.clone();

        let type_proto = value_info.r#type.as_ref()
            .ok_or_else(|| Error::MissingField(format!("Missing type for value info: {}", name)))?;

        let tensor_type = match type_proto.value.as_ref() {
            Some(type_proto::Value::TensorType(tensor)) => tensor,
            None => return Err(Error::MissingField(format!("Missing tensor type for value info: {}", name))),
        };

        let shape = match &tensor_type.shape {
            Some(shape) => shape.dim.iter()
                .map(|dim| match &dim.value {
                    Some(dimension::Value::DimValue(val)) => Dimension::Value(*val),
                    Some(dimension::Value::DimParam(param)) => Dimension::Param(param.clone()),
                    None => Dimension::Param(String::new()),
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(TensorInfo {
            name,
            shape,
            data_type: DataType::from_proto(tensor_type.elem_type),
            doc_string,
        })
    }

    /// Convert an AttributeProto to internal Attribute representation
    fn convert_attribute_proto(attr: &AttributeProto) -> Result<Attribute> {
        match AttributeType::from_i32(attr.r#type) {
            Some(AttributeType::Float) => Ok(Attribute::Float(attr.f)),
            Some(AttributeType::Int) => Ok(Attribute::Int(attr.i)),
            Some(AttributeType::String) => Ok(Attribute::String(String::from_utf8_lossy(&attr.s).into_owned())),
            Some(AttributeType::Tensor) => {
                let tensor = attr.t.as_ref()
                    .ok_or_else(|| Error::MissingField(format!("Missing tensor in attribute {}", attr.name)))?;
                Ok(Attribute::Tensor(Self::convert_tensor_proto(tensor)?))
            },
            Some(AttributeType::Floats) => Ok(Attribute::Floats(attr.floats.clone())),
            Some(AttributeType::Ints) => Ok(Attribute::Ints(attr.ints.clone())),
            Some(AttributeType::Strings) => Ok(Attribute::Strings(
                attr.strings.iter()
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect(),
            )),
            Some(AttributeType::Tensors) => {
                let tensors = attr.tensors.iter()
                    .map(Self::convert_tensor_proto)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Attribute::Tensors(tensors))
            },
            Some(AttributeType::Undefined) => {
                Err(Error::InvalidModel(format!("Undefined type for attribute {}", attr.name)))
            },
            Some(other) => Err(Error::UnsupportedFeature(format!(
                "Attribute {} of type {:?} is not supported",
                attr.name, other
            ))),
            None => Err(Error::InvalidModel(format!("Unknown attribute type: {}", attr.r#type))),
        }
    }
}
