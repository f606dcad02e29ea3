use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::constants::{FACE_MODEL_NAME, FACE_MODEL_URL, OBJECT_MODEL_NAME};

use super::model_provider::{Detectors, LazyModelProvider};
use super::model_resolver::{self, ModelLocation};
use super::onnx_yolo_detector::{OnnxYoloDetector, YoloHead, DEFAULT_CONFIDENCE};

/// Where the learned detectors come from and how strict they are.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// When false no model is loaded and only the classical detectors run.
    pub enabled: bool,
    pub face_model: Option<PathBuf>,
    pub object_model: Option<PathBuf>,
    pub face_model_name: String,
    pub face_model_url: Option<String>,
    pub object_model_name: String,
    pub object_model_url: Option<String>,
    pub bundled_dir: Option<PathBuf>,
    pub face_confidence: f64,
    pub object_confidence: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            face_model: None,
            object_model: None,
            face_model_name: FACE_MODEL_NAME.to_string(),
            face_model_url: Some(FACE_MODEL_URL.to_string()),
            object_model_name: OBJECT_MODEL_NAME.to_string(),
            object_model_url: None,
            bundled_dir: None,
            face_confidence: DEFAULT_CONFIDENCE,
            object_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl ModelConfig {
    fn face_location(&self) -> ModelLocation<'_> {
        ModelLocation {
            explicit: self.face_model.as_deref(),
            name: &self.face_model_name,
            url: self.face_model_url.as_deref(),
            bundled_dir: self.bundled_dir.as_deref(),
        }
    }

    fn object_location(&self) -> ModelLocation<'_> {
        ModelLocation {
            explicit: self.object_model.as_deref(),
            name: &self.object_model_name,
            url: self.object_model_url.as_deref(),
            bundled_dir: self.bundled_dir.as_deref(),
        }
    }
}

/// Resolves and loads both YOLO models.
///
/// A model that cannot be resolved or loaded is left out and its stage falls
/// back to the classical detectors. Only when neither loads is this an error.
pub fn load_onnx_detectors(config: &ModelConfig) -> Result<Detectors, DetectionError> {
    if !config.enabled {
        return Ok(Detectors::default());
    }

    let faces = load_detector(config.face_location(), YoloHead::Face, config.face_confidence);
    let objects = load_detector(
        config.object_location(),
        YoloHead::Coco,
        config.object_confidence,
    );

    match (faces, objects) {
        (Err(face_err), Err(object_err)) => Err(DetectionError::ModelLoad(format!(
            "face model: {face_err}; object model: {object_err}"
        ))),
        (faces, objects) => {
            if let Err(ref e) = faces {
                log::warn!("Face model unavailable, using skin-tone fallback: {e}");
            }
            if let Err(ref e) = objects {
                log::warn!("Object model unavailable, using edge-based plate fallback: {e}");
            }
            Ok(Detectors {
                faces: faces.ok().map(|d| Box::new(d) as Box<dyn FaceDetector>),
                objects: objects.ok().map(|d| Box::new(d) as Box<dyn ObjectDetector>),
            })
        }
    }
}

fn load_detector(
    location: ModelLocation<'_>,
    head: YoloHead,
    confidence: f64,
) -> Result<OnnxYoloDetector, DetectionError> {
    log::info!("Resolving model: {}", location.name);
    let path = model_resolver::resolve(&location, None)
        .map_err(|e| DetectionError::ModelLoad(e.to_string()))?;
    OnnxYoloDetector::new(&path, head, confidence)
}

/// A lazily loading provider backed by the ONNX models in `config`.
pub fn onnx_provider(config: ModelConfig) -> LazyModelProvider {
    LazyModelProvider::new(Box::new(move || load_onnx_detectors(&config)))
}

/// The process-wide provider. The first caller's config wins; later calls
/// return the same instance.
pub fn shared_onnx_provider(config: &ModelConfig) -> Arc<LazyModelProvider> {
    static SHARED: OnceLock<Arc<LazyModelProvider>> = OnceLock::new();
    SHARED
        .get_or_init(|| Arc::new(onnx_provider(config.clone())))
        .clone()
}
