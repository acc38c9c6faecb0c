mod adapter;
mod backend;
pub mod backends;
mod registry;
mod result;

pub use adapter::{ClassifierAdapter, ModelState};
pub use backend::Classifier;
pub use backends::{ScriptedBackend, SimulatedBackend};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
