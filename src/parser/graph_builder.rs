use std::collections::HashMap;

use crate::model::{
    Attribute, DataType, Dimension, Graph, ModelMetadata, Node, OnnxModel, Tensor, TensorInfo,
};

/// Default opset used for models assembled in memory
const DEFAULT_OPSET: i64 = 13;

/// Graph builder for assembling models in memory
///
/// Node ids are assigned in insertion order, which is also the execution
/// order the rest of the crate assumes.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: Graph {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Declare a float graph input
    pub fn input(mut self, name: &str, shape: &[i64]) -> Self {
        self.graph.inputs.push(Self::float_info(name, shape));
        self
    }

    /// Declare a float graph output
    pub fn output(mut self, name: &str, shape: &[i64]) -> Self {
        self.graph.outputs.push(Self::float_info(name, shape));
        self
    }

    /// Add a float constant tensor
    pub fn initializer(mut self, name: &str, dims: &[i64], values: &[f32]) -> Self {
        self.graph.initializers.push(Tensor::from_f32(name, dims.to_vec(), values));
        self
    }

    /// Append a node without attributes
    pub fn node(self, op_type: &str, name: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        self.node_with_attributes(op_type, name, inputs, outputs, HashMap::new())
    }

    /// Append a node carrying attributes
    pub fn node_with_attributes(
        mut self,
        op_type: &str,
        name: &str,
        inputs: &[&str],
        outputs: &[&str],
        attributes: HashMap<String, Attribute>,
    ) -> Self {
        let id = self.graph.next_node_id();
        self.graph.nodes.push(Node {
            id,
            name: name.to_string(),
            op_type: op_type.to_string(),
            domain: String::new(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            attributes,
            doc_string: String::new(),
        });
        self
    }

    /// Append a `Clip` node with `min`/`max` float attributes (pre-opset-11 form)
    pub fn clip(self, name: &str, input: &str, output: &str, min: f32, max: f32) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("min".to_string(), Attribute::Float(min));
        attributes.insert("max".to_string(), Attribute::Float(max));
        self.node_with_attributes("Clip", name, &[input], &[output], attributes)
    }

    pub fn build(self) -> Graph {
        self.graph
    }

    /// Wrap the graph into a model with default metadata
    pub fn build_model(self) -> OnnxModel {
        let graph = self.graph;

        let mut opset_imports = HashMap::new();
        opset_imports.insert(String::new(), DEFAULT_OPSET);

        OnnxModel {
            metadata: ModelMetadata {
                producer_name: env!("CARGO_PKG_NAME").to_string(),
                producer_version: env!("CARGO_PKG_VERSION").to_string(),
                graph_name: graph.name.clone(),
                ir_version: 7,
                ..Default::default()
            },
            graph,
            opset_imports,
            metadata_props: HashMap::new(),
        }
    }

    fn float_info(name: &str, shape: &[i64]) -> TensorInfo {
        TensorInfo {
            name: name.to_string(),
            shape: shape.iter()
                .map(|&d| if d < 0 { Dimension::Param("N".to_string()) } else { Dimension::Value(d) })
                .collect(),
            data_type: DataType::Float,
            doc_string: String::new(),
        }
    }
}
