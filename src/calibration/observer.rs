//! Graph augmentation with range probes.
//!
//! For every calibrated tensor `t` two reduction nodes are appended,
//! `t_ReduceMin` and `t_ReduceMax`, each producing a scalar that is exposed as
//! an extra graph output after the original ones.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::model::{Attribute, DataType, Graph, Node, OnnxModel, TensorInfo};

use super::options::CalibrationOptions;

pub const REDUCE_MIN_SUFFIX: &str = "_ReduceMin";
pub const REDUCE_MAX_SUFFIX: &str = "_ReduceMax";

/// Operator whose last input is an index tensor that must not be calibrated
const ATTENTION_OP: &str = "Attention";

/// Output names of the (min, max) probes for a tensor
pub fn probe_output_names(tensor: &str) -> (String, String) {
    (
        format!("{}{}", tensor, REDUCE_MIN_SUFFIX),
        format!("{}{}", tensor, REDUCE_MAX_SUFFIX),
    )
}

/// Inserts min/max probes at the boundaries of selected operators
#[derive(Debug, Clone, Default)]
pub struct RangeObserver {
    op_types: HashSet<String>,
    excluded_nodes: HashSet<String>,
    forced_nodes: HashSet<String>,
}

impl RangeObserver {
    pub fn new<O, E, F>(op_types: O, excluded_nodes: E, forced_nodes: F) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            op_types: op_types.into_iter().map(Into::into).collect(),
            excluded_nodes: excluded_nodes.into_iter().map(Into::into).collect(),
            forced_nodes: forced_nodes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_options(options: &CalibrationOptions) -> Self {
        Self::new(
            options.op_types.iter(),
            options.excluded_nodes.iter(),
            options.forced_nodes.iter(),
        )
    }

    fn should_calibrate(&self, node: &Node) -> bool {
        (self.op_types.contains(&node.op_type) && !self.excluded_nodes.contains(&node.name))
            || self.forced_nodes.contains(&node.name)
    }

    /// Tensors to observe, in discovery order and without duplicates.
    ///
    /// Initializers are removed after collection: constants have no runtime range.
    pub fn calibration_targets(&self, graph: &Graph) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for node in graph.nodes.iter().filter(|n| self.should_calibrate(n)) {
            let inputs = match node.inputs.split_last() {
                Some((indices, rest)) if node.op_type == ATTENTION_OP => {
                    log::debug!(
                        "indices input {} of attention node {} can't be calibrated",
                        indices, node.name
                    );
                    rest
                },
                _ => node.inputs.as_slice(),
            };

            for tensor in inputs.iter().chain(node.outputs.iter()) {
                // Empty names mark absent optional inputs
                if !tensor.is_empty() && seen.insert(tensor.as_str()) {
                    targets.push(tensor.clone());
                }
            }
        }

        let initializers = graph.initializer_names();
        targets.retain(|t| !initializers.contains(t.as_str()));
        targets
    }

    /// Return a copy of `model` with range probes appended.
    ///
    /// Probes already present from an earlier augmentation are reused, so the
    /// result never observes the same tensor twice.
    pub fn augment(&self, model: &OnnxModel) -> Result<OnnxModel> {
        let targets = self.calibration_targets(&model.graph);
        let mut augmented = model.clone();

        let producers: HashMap<&str, &Node> = model.graph.nodes.iter()
            .flat_map(|node| node.outputs.iter().map(move |out| (out.as_str(), node)))
            .collect();
        let mut declared: HashSet<String> = model.graph.outputs.iter()
            .map(|o| o.name.clone())
            .collect();

        let mut next_id = augmented.graph.next_node_id();
        let mut added_nodes = 0;

        for tensor in &targets {
            let (min_name, max_name) = probe_output_names(tensor);

            for (op_type, probe_name) in [("ReduceMin", min_name), ("ReduceMax", max_name)] {
                match producers.get(probe_name.as_str()) {
                    Some(existing) if Self::is_probe(existing, op_type, tensor) => {},
                    Some(existing) => {
                        return Err(Error::InvalidGraph(format!(
                            "cannot add range probe {}: tensor already produced by node '{}' ({})",
                            probe_name, existing.name, existing.op_type
                        )));
                    },
                    None => {
                        augmented.graph.nodes.push(Self::make_probe(next_id, op_type, tensor, &probe_name));
                        next_id += 1;
                        added_nodes += 1;
                    },
                }

                if declared.insert(probe_name.clone()) {
                    augmented.graph.outputs.push(TensorInfo::scalar(probe_name, DataType::Float));
                }
            }
        }

        log::debug!(
            "Augmented graph '{}': {} tensors observed, {} probe nodes added",
            model.graph.name, targets.len(), added_nodes
        );

        Ok(augmented)
    }

    fn is_probe(node: &Node, op_type: &str, tensor: &str) -> bool {
        node.op_type == op_type && node.inputs.len() == 1 && node.inputs[0] == tensor
    }

    fn make_probe(id: usize, op_type: &str, tensor: &str, output: &str) -> Node {
        let mut attributes = HashMap::new();
        attributes.insert("keepdims".to_string(), Attribute::Int(0));

        Node {
            id,
            name: output.to_string(),
            op_type: op_type.to_string(),
            domain: String::new(),
            inputs: vec![tensor.to_string()],
            outputs: vec![output.to_string()],
            attributes,
            doc_string: String::new(),
        }
    }
}
