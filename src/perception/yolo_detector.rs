/// ONNX YOLOv8 inference for UI control detection.
///
/// Loads a YOLOv8 ONNX model and runs detection on captured frames. Output
/// order is confidence-descending after NMS; the registry assigns ids in
/// exactly that order.
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::ControlDetector;
use crate::perception::types::{ControlKind, DetectedControl};

const INPUT_SIZE: u32 = 640;

/// Raw detection before NMS.
#[derive(Debug, Clone)]
struct RawDetection {
    bbox: [f32; 4], // [x1, y1, x2, y2] normalised to [0,1]
    confidence: f32,
    class_id: usize,
}

pub struct YoloDetector {
    session: Session,
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    pub fn load(
        model_path: &str,
        conf_threshold: f32,
        iou_threshold: f32,
        class_names: Vec<String>,
    ) -> PilotResult<Self> {
        if !Path::new(model_path).exists() {
            return Err(PilotError::Config(format!("YOLO model not found at {model_path}")));
        }
        let session = Session::builder()
            .map_err(|e| PilotError::Config(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PilotError::Config(format!("ort opt-level: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| PilotError::Config(format!("ort load model: {e}")))?;
        tracing::info!(path = %model_path, classes = class_names.len(), "YOLO detector loaded");

        Ok(Self {
            session,
            conf_threshold,
            iou_threshold,
            class_names,
        })
    }

    fn run(&mut self, frame: &RgbaImage) -> PilotResult<Vec<DetectedControl>> {
        let img = DynamicImage::ImageRgba8(frame.clone());
        let (orig_w, orig_h) = (img.width(), img.height());
        let letterbox = preprocess(&img);

        let input_value = Tensor::from_array(letterbox.tensor.clone())
            .map_err(|e| PilotError::Detection(format!("ort tensor: {e}")))?;

        let output_owned = {
            let outputs = self
                .session
                .run(ort::inputs![input_value])
                .map_err(|e| PilotError::Detection(format!("ort run: {e}")))?;

            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| PilotError::Detection(format!("extract tensor: {e}")))?
                .to_owned()
        };

        let raw = postprocess(
            &output_owned.view(),
            orig_w,
            orig_h,
            &letterbox,
            self.conf_threshold,
        )?;
        let kept = nms(&raw, self.iou_threshold);

        Ok(kept
            .into_iter()
            .map(|i| {
                let det = &raw[i];
                let label = self
                    .class_names
                    .get(det.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", det.class_id));
                DetectedControl {
                    kind: ControlKind::from_label(&label),
                    content: label,
                    bbox: det.bbox.map(f64::from),
                }
            })
            .collect())
    }
}

#[async_trait(?Send)]
impl ControlDetector for YoloDetector {
    async fn detect(&mut self, frame: &RgbaImage) -> PilotResult<Vec<DetectedControl>> {
        let started = Instant::now();
        let controls = self.run(frame)?;
        tracing::debug!(
            count = controls.len(),
            ms = started.elapsed().as_millis() as u64,
            "YOLO detection complete"
        );
        Ok(controls)
    }
}

// ── Pre-processing ──────────────────────────────────────────────────────────

struct Letterbox {
    tensor: Array4<f32>,
    pad_x: f32,
    pad_y: f32,
    scale: f32,
}

/// Resize + letterbox + normalise → NCHW f32 tensor.
fn preprocess(img: &DynamicImage) -> Letterbox {
    let sz = INPUT_SIZE;
    let (ow, oh) = (img.width() as f32, img.height() as f32);
    let scale = (sz as f32 / ow).min(sz as f32 / oh);
    let nw = ((ow * scale).round() as u32).clamp(1, sz);
    let nh = ((oh * scale).round() as u32).clamp(1, sz);
    let pad_x = (sz - nw) as f32 / 2.0;
    let pad_y = (sz - nh) as f32 / 2.0;

    let rgb = img
        .resize_exact(nw, nh, image::imageops::FilterType::CatmullRom)
        .to_rgb8();

    let mut canvas = image::RgbImage::from_pixel(sz, sz, image::Rgb([114, 114, 114]));
    image::imageops::overlay(&mut canvas, &rgb, pad_x.round() as i64, pad_y.round() as i64);

    let mut tensor = Array4::<f32>::zeros((1, 3, sz as usize, sz as usize));
    for (x, y, p) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = p[c] as f32 / 255.0;
        }
    }

    Letterbox {
        tensor,
        pad_x,
        pad_y,
        scale,
    }
}

// ── Post-processing ─────────────────────────────────────────────────────────

fn postprocess(
    output: &ndarray::ArrayViewD<f32>,
    orig_w: u32,
    orig_h: u32,
    lb: &Letterbox,
    conf_threshold: f32,
) -> PilotResult<Vec<RawDetection>> {
    // YOLOv8 output: [1, 4+num_classes, num_proposals]
    let shape = output.shape();
    if shape.len() < 3 || shape[1] < 5 {
        return Err(PilotError::Detection(format!("unexpected output shape: {shape:?}")));
    }
    let num_classes = shape[1] - 4;
    let num_preds = shape[2];

    let mut detections = Vec::new();
    for i in 0..num_preds {
        let (cx, cy, w, h) = (
            output[[0, 0, i]],
            output[[0, 1, i]],
            output[[0, 2, i]],
            output[[0, 3, i]],
        );

        let (class_id, score) = (0..num_classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < conf_threshold {
            continue;
        }

        // Undo letterbox → original pixels → normalise.
        let unpad = |v: f32, pad: f32, dim: u32| (((v - pad) / lb.scale) / dim as f32).clamp(0.0, 1.0);
        detections.push(RawDetection {
            bbox: [
                unpad(cx - w / 2.0, lb.pad_x, orig_w),
                unpad(cy - h / 2.0, lb.pad_y, orig_h),
                unpad(cx + w / 2.0, lb.pad_x, orig_w),
                unpad(cy + h / 2.0, lb.pad_y, orig_h),
            ],
            confidence: score,
            class_id,
        });
    }
    Ok(detections)
}

/// Greedy per-class NMS. Returns kept indices, highest confidence first.
fn nms(dets: &[RawDetection], iou_threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..dets.len()).collect();
    indices.sort_by(|&a, &b| {
        dets[b]
            .confidence
            .partial_cmp(&dets[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];
    for &i in &indices {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &indices {
            if !suppressed[j]
                && i != j
                && dets[i].class_id == dets[j].class_id
                && iou(&dets[i].bbox, &dets[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;

    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
