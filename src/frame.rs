//! Camera frames and the pull-based source contract.
//!
//! - `Frame`: one captured RGB8 image, owned by the detection loop for a single tick.
//! - `FrameSource`: pull-based camera abstraction; `Ok(None)` means "not ready yet".

use anyhow::Result;
#[cfg(feature = "enrich-gemini")]
use anyhow::{anyhow, Context};

/// Captured RGB8 frame.
///
/// Pixel data is private; consumers go through `pixels()` so a frame can only
/// be read, never mutated, once captured.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time in milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            captured_at_ms: crate::now_ms(),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// True when dimensions are non-zero and the buffer holds exactly
    /// `width * height * 3` bytes.
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .is_some_and(|expected| expected == self.pixels.len())
    }

    /// Encode the frame as a JPEG still for the enrichment collaborator.
    #[cfg(feature = "enrich-gemini")]
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        use image::codecs::jpeg::JpegEncoder;
        use image::ExtendedColorType;

        if !self.is_well_formed() {
            return Err(anyhow!(
                "cannot encode malformed frame {}x{} ({} bytes)",
                self.width,
                self.height,
                self.pixels.len()
            ));
        }
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(&self.pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .context("encode frame as jpeg")?;
        Ok(out)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .field("captured_at_ms", &self.captured_at_ms)
            .finish()
    }
}

/// Pull-based frame source.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Current frame, or `Ok(None)` while the source has no pixel data yet.
    fn current_frame(&mut self) -> Result<Option<Frame>>;
}
