pub mod session;

pub use session::{ExecutionProvider, InferenceSession, Value};
