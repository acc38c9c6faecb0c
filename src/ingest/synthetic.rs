//! Synthetic camera (`stub://` URLs).
//!
//! Produces a moving gradient so consecutive frames differ, and reports
//! "not ready" for a configurable number of polls to mimic a camera that is
//! still negotiating its stream.

use anyhow::{anyhow, Result};

use crate::frame::{Frame, FrameSource};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL, must start with `stub://`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Polls answered with "not ready" before the first frame.
    pub warmup_polls: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 640,
            warmup_polls: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    polls: u64,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source requires a stub:// url, got '{}'",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        log::info!(
            "SyntheticSource: {} ({}x{}, warmup {} polls)",
            config.url,
            config.width,
            config.height,
            config.warmup_polls
        );
        Ok(Self {
            config,
            polls: 0,
            frame_count: 0,
            scene_state: 0,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        self.polls += 1;
        if self.polls <= self.config.warmup_polls as u64 {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_polls_report_not_ready() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 4,
            height: 4,
            warmup_polls: 2,
            ..SyntheticConfig::default()
        })
        .unwrap();
        assert!(source.current_frame().unwrap().is_none());
        assert!(source.current_frame().unwrap().is_none());
        let frame = source.current_frame().unwrap().expect("frame after warmup");
        assert!(frame.is_well_formed());
        assert_eq!(source.frames_captured(), 1);
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 8,
            height: 8,
            ..SyntheticConfig::default()
        })
        .unwrap();
        let a = source.current_frame().unwrap().unwrap();
        let b = source.current_frame().unwrap().unwrap();
        assert_ne!(a.pixels(), b.pixels());
    }

    #[test]
    fn rejects_non_stub_urls() {
        let result = SyntheticSource::new(SyntheticConfig {
            url: "rtsp://camera".to_string(),
            ..SyntheticConfig::default()
        });
        assert!(result.is_err());
    }
}
