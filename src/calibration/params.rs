use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Graph, Node};

use super::aggregator::QuantizationThresholds;

/// Largest value representable by the unsigned 8-bit target type
const QUANT_MAX: f64 = 255.0;

/// Affine uint8 quantization parameters of one tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub zero_point: u8,
    pub scale: f32,
}

/// Final per-tensor parameters
pub type QuantizationParams = HashMap<String, QuantParams>;

/// Derives (zero point, scale) pairs from tensor ranges
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantParamCalculator;

impl QuantParamCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Compute parameters for every tensor in `thresholds`.
    ///
    /// `graph` must be the original model graph: a tensor is narrowed against
    /// its consumer only when it has exactly one, and range probes would count
    /// as extra consumers.
    pub fn compute(&self, graph: &Graph, thresholds: Option<&QuantizationThresholds>) -> Result<QuantizationParams> {
        let thresholds = thresholds.ok_or(Error::MissingThresholds)?;
        let consumers = graph.input_name_to_nodes();

        let mut params = HashMap::with_capacity(thresholds.len());

        for (tensor, &(rmin, rmax)) in thresholds {
            let next = match consumers.get(tensor.as_str()) {
                Some(nodes) if nodes.len() == 1 => Some(nodes[0]),
                _ => None,
            };

            let tensor_params = self.calculate_scale_zero_point(graph, next, rmin, rmax)
                .map_err(|e| match e {
                    Error::InvalidAttribute(msg) => Error::InvalidAttribute(format!("tensor {}: {}", tensor, msg)),
                    other => other,
                })?;
            params.insert(tensor.clone(), tensor_params);
        }

        Ok(params)
    }

    /// Scale and zero point for one range, narrowed by the consuming node.
    ///
    /// The range is first widened to contain zero so that zero is exactly
    /// representable. A `Clip` or `Relu` consumer bounds the values that can
    /// matter downstream, so the range is tightened to those bounds.
    pub fn calculate_scale_zero_point(&self, graph: &Graph, next: Option<&Node>, rmin: f32, rmax: f32) -> Result<QuantParams> {
        let mut rmin = f64::from(rmin).min(0.0);
        let mut rmax = f64::from(rmax).max(0.0);

        if let Some(node) = next {
            match node.op_type.as_str() {
                "Clip" => {
                    let (clip_min, clip_max) = Self::clip_bounds(graph, node)?;
                    if rmin < clip_min {
                        rmin = clip_min;
                    }
                    if rmax > clip_max {
                        rmax = clip_max;
                    }
                },
                "Relu" => {
                    if rmin < 0.0 {
                        rmin = 0.0;
                    }
                },
                _ => {},
            }
        }

        // A Clip lying entirely above the observed range inverts it
        if rmin > rmax {
            rmax = rmin;
        }

        let scale = if rmin != rmax { ((rmax - rmin) / QUANT_MAX) as f32 } else { 1.0 };

        let initial_zero_point = (0.0 - rmin) / f64::from(scale);
        let zero_point = initial_zero_point.clamp(0.0, QUANT_MAX).round_ties_even() as u8;

        Ok(QuantParams { zero_point, scale })
    }

    /// Clip bounds from the `min`/`max` attributes, or from constant inputs
    /// (opset 11 and later)
    fn clip_bounds(graph: &Graph, node: &Node) -> Result<(f64, f64)> {
        let min = Self::clip_bound(graph, node, "min", 1)?;
        let max = Self::clip_bound(graph, node, "max", 2)?;
        Ok((f64::from(min), f64::from(max)))
    }

    fn clip_bound(graph: &Graph, node: &Node, attribute: &str, input_index: usize) -> Result<f32> {
        if let Some(value) = node.float_attribute(attribute) {
            return Ok(value);
        }

        let constant = node.inputs.get(input_index)
            .filter(|name| !name.is_empty())
            .and_then(|name| graph.initializer(name))
            .and_then(|tensor| tensor.to_f32_vec())
            .and_then(|values| match values.as_slice() {
                [value] => Some(*value),
                _ => None,
            });

        constant.ok_or_else(|| Error::InvalidAttribute(format!(
            "Clip node '{}' has no scalar '{}' bound",
            node.name, attribute
        )))
    }
}
