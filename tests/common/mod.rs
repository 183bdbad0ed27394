#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use ndarray::{arr0, arr1, ArrayD};

use onnx_calibrate::{
    Error, ExecutionProvider, GraphBuilder, InferenceSession, OnnxModel, Result, Value,
};

pub fn values(data: &[f32]) -> ArrayD<f32> {
    arr1(data).into_dyn()
}

/// Conv_1: (X, W) -> Y, with W an initializer
pub fn conv_model() -> OnnxModel {
    GraphBuilder::new("conv_graph")
        .input("X", &[-1, 3])
        .initializer("W", &[3], &[0.5, -0.5, 1.0])
        .node("Conv", "Conv_1", &["X", "W"], &["Y"])
        .output("Y", &[-1, 3])
        .build_model()
}

/// Engine double: graph inputs come from the bound batch, intermediate
/// tensors from a per-batch script, and range probes are evaluated for real.
pub struct ScriptedProvider {
    pub activations: Vec<HashMap<String, Value>>,
    pub seen_inputs: Rc<RefCell<Vec<HashMap<String, Value>>>>,
    pub loads: Cell<usize>,
    pub released: Rc<Cell<usize>>,
    pub fail_on_batch: Option<usize>,
}

impl ScriptedProvider {
    pub fn new(activations: Vec<HashMap<String, Value>>) -> Self {
        Self {
            activations,
            seen_inputs: Rc::new(RefCell::new(Vec::new())),
            loads: Cell::new(0),
            released: Rc::new(Cell::new(0)),
            fail_on_batch: None,
        }
    }

    /// Script where each batch only sets the given tensors
    pub fn with_tensors(batches: Vec<Vec<(&str, Value)>>) -> Self {
        Self::new(
            batches
                .into_iter()
                .map(|tensors| tensors.into_iter().map(|(n, v)| (n.to_string(), v)).collect())
                .collect(),
        )
    }
}

pub struct ScriptedSession {
    model: OnnxModel,
    input_names: Vec<String>,
    output_names: Vec<String>,
    activations: Vec<HashMap<String, Value>>,
    batch: usize,
    seen_inputs: Rc<RefCell<Vec<HashMap<String, Value>>>>,
    released: Rc<Cell<usize>>,
    fail_on_batch: Option<usize>,
}

impl ExecutionProvider for ScriptedProvider {
    type Session = ScriptedSession;

    fn load(&self, model: &OnnxModel) -> Result<ScriptedSession> {
        self.loads.set(self.loads.get() + 1);

        Ok(ScriptedSession {
            model: model.clone(),
            input_names: model.graph.inputs.iter().map(|i| i.name.clone()).collect(),
            output_names: model.graph.outputs.iter().map(|o| o.name.clone()).collect(),
            activations: self.activations.clone(),
            batch: 0,
            seen_inputs: Rc::clone(&self.seen_inputs),
            released: Rc::clone(&self.released),
            fail_on_batch: self.fail_on_batch,
        })
    }
}

impl ScriptedSession {
    fn evaluate(&self, name: &str, script: &HashMap<String, Value>, inputs: &HashMap<String, Value>) -> Result<Value> {
        if let Some(value) = inputs.get(name) {
            return Ok(value.clone());
        }

        let producer = self.model.graph.nodes.iter().find(|n| n.outputs.iter().any(|o| o == name));
        match producer {
            Some(node) if node.op_type == "ReduceMin" => {
                let source = self.evaluate(&node.inputs[0], script, inputs)?;
                Ok(arr0(source.iter().copied().fold(f32::INFINITY, f32::min)).into_dyn())
            },
            Some(node) if node.op_type == "ReduceMax" => {
                let source = self.evaluate(&node.inputs[0], script, inputs)?;
                Ok(arr0(source.iter().copied().fold(f32::NEG_INFINITY, f32::max)).into_dyn())
            },
            _ => script
                .get(name)
                .cloned()
                .ok_or_else(|| Error::ExecutionError(format!("no value scripted for {}", name))),
        }
    }
}

impl InferenceSession for ScriptedSession {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn run(&mut self, inputs: HashMap<String, Value>) -> Result<Vec<Value>> {
        if self.fail_on_batch == Some(self.batch) {
            return Err(Error::ExecutionError(format!("engine failure on batch {}", self.batch)));
        }

        let empty = HashMap::new();
        let script = self.activations.get(self.batch).unwrap_or(&empty);
        self.seen_inputs.borrow_mut().push(inputs.clone());

        let outputs = self.output_names
            .iter()
            .map(|name| self.evaluate(name, script, &inputs))
            .collect();

        self.batch += 1;
        outputs
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}
