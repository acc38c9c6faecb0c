use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Classifier backend trait.
///
/// Any inference backend (on-device, remote, simulated) implements this. The
/// backend's output is authoritative for class and confidence; backends must
/// not persist anything or otherwise cause side effects.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Load model weights. May take an arbitrary amount of time.
    fn load_model(&mut self) -> Result<()>;

    /// Run inference on one well-formed frame.
    ///
    /// Errors are absorbed by `ClassifierAdapter`; callers of the adapter
    /// never see them.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}
