//! Interface to the engine that executes a model.
//!
//! The crate never runs operators itself. Callers plug in a runtime by
//! implementing [`ExecutionProvider`], which turns an in-memory model into an
//! [`InferenceSession`]. The session is dropped as soon as the caller is done
//! with it, which is where implementations release engine resources.

use std::collections::HashMap;

use ndarray::ArrayD;

use crate::error::Result;
use crate::model::OnnxModel;

/// Runtime value bound to a graph input or produced as a graph output
pub type Value = ArrayD<f32>;

/// A loaded, runnable model
pub trait InferenceSession {
    /// Declared graph input names, in declaration order
    fn input_names(&self) -> &[String];

    /// Declared graph output names, in declaration order
    fn output_names(&self) -> &[String];

    /// Execute the model once.
    ///
    /// The returned values are ordered as [`InferenceSession::output_names`].
    fn run(&mut self, inputs: HashMap<String, Value>) -> Result<Vec<Value>>;
}

/// Factory for sessions of a particular runtime
pub trait ExecutionProvider {
    type Session: InferenceSession;

    fn load(&self, model: &OnnxModel) -> Result<Self::Session>;
}

impl<P: ExecutionProvider + ?Sized> ExecutionProvider for &P {
    type Session = P::Session;

    fn load(&self, model: &OnnxModel) -> Result<Self::Session> {
        (**self).load(model)
    }
}
