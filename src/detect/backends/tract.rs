#![cfg(feature = "backend-tract")]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::category::WasteCategory;
use crate::detect::backend::Classifier;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>>;

/// COCO indices the stock YOLOv8n export shares with the waste categories.
pub fn coco_class_map() -> HashMap<usize, WasteCategory> {
    HashMap::from([(39, WasteCategory::Bottle), (41, WasteCategory::Cup)])
}

/// Tract-based YOLOv8 backend.
///
/// Loads a local ONNX file and decodes the `[1, 4 + classes, anchors]` output
/// into boxes in frame pixel space. Frames must match the model input size.
pub struct TractBackend {
    model_path: PathBuf,
    model: Option<Plan>,
    input_size: u32,
    class_map: HashMap<usize, WasteCategory>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            input_size,
            class_map: coco_class_map(),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.input_size || frame.height != self.input_size {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.input_size,
                self.input_size
            ));
        }

        let pixels = frame.pixels();
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            let idx = (y * size + x) * 3 + channel;
            pixels[idx] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let anchors = shape[2];

        let mut candidates = Vec::new();
        for a in 0..anchors {
            let (best_class, best_score) = (0..classes)
                .map(|c| (c, view[[0, 4 + c, a]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if best_score < self.confidence_threshold {
                continue;
            }
            let Some(category) = self.class_map.get(&best_class).copied() else {
                continue;
            };
            let (cx, cy, w, h) = (
                view[[0, 0, a]],
                view[[0, 1, a]],
                view[[0, 2, a]],
                view[[0, 3, a]],
            );
            let bbox = BoundingBox {
                x: (cx - w / 2.0).max(0.0),
                y: (cy - h / 2.0).max(0.0),
                width: w,
                height: h,
            };
            candidates.push(Detection::new(category, best_score.min(1.0), bbox));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.category == candidate.category && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

impl Classifier for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load_model(&mut self) -> Result<()> {
        let size = self.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!("failed to load ONNX model from {}", self.model_path.display())
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.model = Some(model);
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract model not loaded"))?;
        let input = self.build_input(frame)?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}
