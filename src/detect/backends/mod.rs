pub mod scripted;
pub mod simulated;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedBackend;
pub use simulated::SimulatedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
