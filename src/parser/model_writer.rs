use std::fs::File;
use std::io::Write;
use std::path::Path;

use bytes::BytesMut;
use prost::Message;

use crate::error::{Error, Result};
use crate::model::{OnnxModel, TensorInfo, Dimension, Tensor, Node, Graph, Attribute};
use crate::proto::attribute_proto::AttributeType;
use crate::proto::tensor_shape_proto::{self, dimension};
use crate::proto::type_proto;
use crate::proto::{
    ModelProto, GraphProto, NodeProto, TensorProto, ValueInfoProto, AttributeProto,
    OperatorSetIdProto, StringStringEntryProto, TypeProto, TensorShapeProto,
};

/// Serializes the internal representation back into the ONNX protobuf layout
pub struct OnnxModelWriter;

impl OnnxModelWriter {
    /// Save a model to a file path, replacing any existing file
    pub fn save_model(model: &OnnxModel, path: &Path) -> Result<()> {
        let bytes = Self::save_model_to_bytes(model)?;

        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.flush()?;

        log::debug!("Wrote {} bytes of ONNX model to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Encode a model as protobuf bytes
    pub fn save_model_to_bytes(model: &OnnxModel) -> Result<Vec<u8>> {
        let proto = Self::convert_internal_to_proto(model);

        let mut buffer = BytesMut::with_capacity(proto.encoded_len());
        proto.encode(&mut buffer).map_err(Error::ProtobufEncodeError)?;

        Ok(buffer.to_vec())
    }

    /// Convert the internal model to its protobuf form
    pub fn convert_internal_to_proto(model: &OnnxModel) -> ModelProto {
        let mut opset_import: Vec<OperatorSetIdProto> = model.opset_imports.iter()
            .map(|(domain, version)| OperatorSetIdProto {
                domain: domain.clone(),
                version: *version,
            })
            .collect();
        opset_import.sort_by(|a, b| a.domain.cmp(&b.domain));

        let mut metadata_props: Vec<StringStringEntryProto> = model.metadata_props.iter()
            .map(|(key, value)| StringStringEntryProto {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        metadata_props.sort_by(|a, b| a.key.cmp(&b.key));

        ModelProto {
            ir_version: model.metadata.ir_version,
            opset_import,
            producer_name: model.metadata.producer_name.clone(),
            producer_version: model.metadata.producer_version.clone(),
            domain: model.metadata.domain.clone(),
            model_version: model.metadata.model_version,
            doc_string: model.metadata.doc_string.clone(),
            graph: Some(Self::convert_graph(&model.graph)),
            metadata_props,
        }
    }

    fn convert_graph(graph: &Graph) -> GraphProto {
        GraphProto {
            node: graph.nodes.iter().map(Self::convert_node).collect(),
            name: graph.name.clone(),
            initializer: graph.initializers.iter().map(Self::convert_tensor).collect(),
            doc_string: graph.doc_string.clone(),
            input: graph.inputs.iter().map(Self::convert_value_info).collect(),
            output: graph.outputs.iter().map(Self::convert_value_info).collect(),
            value_info: graph.value_info.iter().map(Self::convert_value_info).collect(),
        }
    }

    fn convert_node(node: &Node) -> NodeProto {
        // Sorted so that the encoding is stable across runs
        let mut names: Vec<&String> = node.attributes.keys().collect();
        names.sort();

        let attribute = names.into_iter()
            .map(|name| Self::convert_attribute(name, &node.attributes[name]))
            .collect();

        NodeProto {
            input: node.inputs.clone(),
            output: node.outputs.clone(),
            name: node.name.clone(),
            op_type: node.op_type.clone(),
            domain: node.domain.clone(),
            attribute,
            doc_string: node.doc_string.clone(),
        }
    }

    fn convert_tensor(tensor: &Tensor) -> TensorProto {
        TensorProto {
            dims: tensor.dims.clone(),
            data_type: tensor.data_type.to_proto(),
            name: tensor.name.clone(),
            raw_data: tensor.data.clone(),
            doc_string: tensor.doc_string.clone(),
            ..Default::default()
        }
    }

    fn convert_value_info(info: &TensorInfo) -> ValueInfoProto {
        let dim = info.shape.iter()
            .map(|d| tensor_shape_proto::Dimension {
                denotation: String::new(),
                value: match d {
                    Dimension::Value(v) => Some(dimension::Value::DimValue(*v)),
                    Dimension::Param(p) if p.is_empty() => None,
                    Dimension::Param(p) => Some(dimension::Value::DimParam(p.clone())),
                },
            })
            .collect();

        ValueInfoProto {
            name: info.name.clone(),
            r#type: Some(TypeProto {
                denotation: String::new(),
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: info.data_type.to_proto(),
                    shape: Some(TensorShapeProto { dim }),
                })),
            }),
            doc_string: info.doc_string.clone(),
        }
    }

    fn convert_attribute(name: &str, attribute: &Attribute) -> AttributeProto {
        let mut proto = AttributeProto {
            name: name.to_string(),
            ..Default::default()
        };

        let attr_type = match attribute {
            Attribute::Float(f) => {
                proto.f = *f;
                AttributeType::Float
            },
            Attribute::Int(i) => {
                proto.i = *i;
                AttributeType::Int
            },
            Attribute::String(s) => {
                proto.s = s.as_bytes().to_vec();
                AttributeType::String
            },
            Attribute::Tensor(t) => {
                proto.t = Some(Self::convert_tensor(t));
                AttributeType::Tensor
            },
            Attribute::Floats(values) => {
                proto.floats = values.clone();
                AttributeType::Floats
            },
            Attribute::Ints(values) => {
                proto.ints = values.clone();
                AttributeType::Ints
            },
            Attribute::Strings(values) => {
                proto.strings = values.iter().map(|s| s.as_bytes().to_vec()).collect();
                AttributeType::Strings
            },
            Attribute::Tensors(values) => {
                proto.tensors = values.iter().map(Self::convert_tensor).collect();
                AttributeType::Tensors
            },
        };

        proto.r#type = attr_type as i32;
        proto
    }
}
