/// YOLO detectors using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and per-class NMS, and maps
/// boxes back to image coordinates. One loaded session serves concurrent
/// callers through a mutex.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::detection::{BoxGeometry, Detection, DetectionKind, DetectionSource};
use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::object_detector::{ObjectClass, ObjectDetector};
use crate::shared::pixel_buffer::PixelBuffer;
use crate::shared::region::BoundingBox;

use super::execution_provider::ExecutionBackend;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// First class-score feature; features 0..4 are `cx, cy, w, h`.
const SCORE_OFFSET: usize = 4;

/// What the model's score features mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YoloHead {
    /// Single-class face model: one score at feature 4 (keypoints may follow).
    Face,
    /// 80-class COCO model: class `i` scores at feature `4 + i`.
    Coco,
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: Mutex<ort::session::Session>,
    head: YoloHead,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, head: YoloHead, confidence: f64) -> Result<Self, DetectionError> {
        let session = build_session(model_path)
            .map_err(|e| DetectionError::ModelLoad(format!("{}: {e}", model_path.display())))?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded {head:?} model {} (input {input_size}px)",
            model_path.display()
        );
        Ok(Self {
            session: Mutex::new(session),
            head,
            confidence,
            input_size,
        })
    }

    /// Runs the model and returns boxes in image coordinates, after NMS.
    fn run(&self, buffer: &PixelBuffer, scores: &ScoreLayout) -> Result<Vec<RawBox>, DetectionError> {
        if buffer.width() == 0 || buffer.height() == 0 {
            return Ok(Vec::new());
        }
        let (input_tensor, letterbox) = letterbox(buffer, self.input_size);
        let (shape, data) = self
            .infer(input_tensor)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let mut boxes = parse_output(&data, &shape, scores, self.confidence, &letterbox)
            .map_err(DetectionError::Inference)?;
        Ok(nms(&mut boxes, NMS_IOU_THRESH))
    }

    fn infer(
        &self,
        input: ndarray::Array4<f32>,
    ) -> Result<(Vec<usize>, Vec<f32>), Box<dyn std::error::Error>> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.iter().copied().collect();
        Ok((shape, data))
    }
}

fn build_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let backend = ExecutionBackend::for_platform();
    log::info!("Loading {} on the {} backend", model_path.display(), backend.name());
    Ok(ort::session::Session::builder()?
        .with_execution_providers(backend.providers())?
        .commit_from_file(model_path)?)
}

impl FaceDetector for OnnxYoloDetector {
    fn detect_faces(&self, buffer: &PixelBuffer) -> Result<Vec<Detection>, DetectionError> {
        if self.head != YoloHead::Face {
            return Err(DetectionError::Unavailable("face"));
        }
        let boxes = self.run(buffer, &ScoreLayout::Single)?;
        Ok(boxes
            .into_iter()
            .map(|b| b.into_detection(DetectionKind::Face))
            .collect())
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect_objects(
        &self,
        buffer: &PixelBuffer,
        classes: &[ObjectClass],
    ) -> Result<Vec<Detection>, DetectionError> {
        if self.head != YoloHead::Coco {
            return Err(DetectionError::Unavailable("object"));
        }
        if classes.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<usize> = classes.iter().map(|c| c.coco_id()).collect();
        let boxes = self.run(buffer, &ScoreLayout::Classes(&ids))?;
        Ok(boxes
            .into_iter()
            .map(|b| b.into_detection(classes[b.label].kind()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping between letterboxed model coordinates and image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_image(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize an RGBA buffer to `target_size` × `target_size`, dropping alpha.
fn letterbox(buffer: &PixelBuffer, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = buffer.width() as f64;
    let fh = buffer.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded with 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = buffer.as_ndarray();
    let src_h = buffer.height() as usize;
    let src_w = buffer.width() as usize;

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Which score features to read from each output row.
enum ScoreLayout<'a> {
    Single,
    /// COCO class ids; the label of a box is its index in this slice.
    Classes(&'a [usize]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct RawBox {
    bbox: BoundingBox,
    confidence: f64,
    label: usize,
}

impl RawBox {
    fn into_detection(self, kind: DetectionKind) -> Detection {
        Detection::new(
            kind,
            BoxGeometry::Corners {
                x1: self.bbox.x,
                y1: self.bbox.y,
                x2: self.bbox.right(),
                y2: self.bbox.bottom(),
            },
            self.confidence,
            DetectionSource::MlAdapter,
        )
    }
}

/// Parses a `[1, features, N]` or `[1, N, features]` YOLO output.
fn parse_output(
    data: &[f32],
    shape: &[usize],
    scores: &ScoreLayout,
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawBox>, String> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}"));
    }
    // More candidates than features is the transposed layout.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(format!(
            "YOLO output has {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        ));
    }
    let feature = |i: usize, f: usize| {
        if transposed {
            data[f * num_dets + i]
        } else {
            data[i * num_feats + f]
        }
    };

    let mut boxes = Vec::new();
    for i in 0..num_dets {
        let best = match scores {
            ScoreLayout::Single if num_feats > SCORE_OFFSET => {
                Some((0, feature(i, SCORE_OFFSET) as f64))
            }
            ScoreLayout::Single => None,
            ScoreLayout::Classes(ids) => ids
                .iter()
                .enumerate()
                .filter(|&(_, &id)| SCORE_OFFSET + id < num_feats)
                .map(|(label, &id)| (label, feature(i, SCORE_OFFSET + id) as f64))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)),
        };
        let Some((label, conf)) = best else { continue };
        if conf < confidence {
            continue;
        }

        let cx = feature(i, 0) as f64;
        let cy = feature(i, 1) as f64;
        let w = feature(i, 2) as f64;
        let h = feature(i, 3) as f64;
        let (x1, y1) = letterbox.to_image(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_image(cx + w / 2.0, cy + h / 2.0);

        boxes.push(RawBox {
            bbox: BoundingBox::from_corners(x1, y1, x2, y2),
            confidence: conf,
            label,
        });
    }
    Ok(boxes)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

/// Greedy per-label NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(boxes: &mut [RawBox], iou_thresh: f64) -> Vec<RawBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawBox> = Vec::new();
    for candidate in boxes.iter() {
        let suppressed = keep
            .iter()
            .any(|k| k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_thresh);
        if !suppressed {
            keep.push(*candidate);
        }
    }
    keep
}
