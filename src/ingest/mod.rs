//! Frame sources.
//!
//! Only the synthetic `stub://` camera ships with the core; real cameras live
//! outside it and plug in through `FrameSource`.

pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::FrameSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Open a frame source by URL.
pub fn open_source(url: &str, width: u32, height: u32) -> Result<Box<dyn FrameSource>> {
    if url.starts_with("stub://") {
        let source = SyntheticSource::new(SyntheticConfig {
            url: url.to_string(),
            width,
            height,
            warmup_polls: 0,
        })?;
        return Ok(Box::new(source));
    }
    Err(anyhow!(
        "unsupported frame source '{}' (only stub:// is built in)",
        url
    ))
}
