use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ScopedJoinHandle};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::blurring::domain::region_blurrer::RegionBlurrer;
use crate::blurring::infrastructure::cpu_box_blurrer::CpuBoxBlurrer;
use crate::detection::domain::detection::{Detection, DetectionKind};
use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::object_detector::{ObjectClass, ObjectDetector};
use crate::detection::domain::plate_detector::EdgeBasedPlateDetector;
use crate::detection::domain::skin_region_detector::SkinRegionDetector;
use crate::detection::infrastructure::model_provider::{Detectors, ModelProvider};
use crate::redaction::domain::overlap_resolver::OverlapResolver;
use crate::redaction::domain::region_policy::RegionPolicyEngine;
use crate::shared::pixel_buffer::PixelBuffer;
use crate::shared::region::{BoundingBox, RedactionRegion};

use super::redaction_config::RedactionConfig;

/// What one call to [`PrivacyProtector::apply_privacy_protection`] found and blurred.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProtectionSummary {
    pub faces_detected: usize,
    pub people_detected: usize,
    pub vehicles_detected: usize,
    pub total_blurred: usize,
}

/// When a classical detector runs in addition to (or instead of) its model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    Disabled,
    /// Only when the model stage found nothing, for whatever reason.
    #[default]
    WhenEmpty,
    Always,
}

impl FallbackMode {
    pub fn should_run(self, model_found_nothing: bool) -> bool {
        match self {
            FallbackMode::Disabled => false,
            FallbackMode::WhenEmpty => model_found_nothing,
            FallbackMode::Always => true,
        }
    }
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(FallbackMode::Disabled),
            "when-empty" | "when_empty" => Ok(FallbackMode::WhenEmpty),
            "always" => Ok(FallbackMode::Always),
            other => Err(format!(
                "unknown fallback mode '{other}' (expected disabled, when-empty or always)"
            )),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub skin: FallbackMode,
    pub plates: FallbackMode,
}

/// Model detections of one image, each stage already folded to a list.
struct ModelDetections {
    faces: Vec<Detection>,
    people: Vec<Detection>,
    vehicles: Vec<Detection>,
}

/// Redacts faces, heads and plates in one buffer at a time.
///
/// Detection never fails the call: a missing model, a stage error or a
/// panicking detector all count as "nothing found" and are logged. The worst
/// case is an untouched buffer and an all-zero summary.
pub struct PrivacyProtector {
    models: Arc<dyn ModelProvider>,
    skin: SkinRegionDetector,
    plates: EdgeBasedPlateDetector,
    policy: RegionPolicyEngine,
    resolver: OverlapResolver,
    blurrer: Box<dyn RegionBlurrer>,
    fallback: FallbackConfig,
}

impl PrivacyProtector {
    pub fn new(models: Arc<dyn ModelProvider>, config: &RedactionConfig) -> Self {
        let blurrer = Box::new(CpuBoxBlurrer::new(config.blur.clone()));
        Self::with_blurrer(models, config, blurrer)
    }

    pub fn with_blurrer(
        models: Arc<dyn ModelProvider>,
        config: &RedactionConfig,
        blurrer: Box<dyn RegionBlurrer>,
    ) -> Self {
        let resolver = OverlapResolver::new(config.overlap.clone());
        Self {
            models,
            skin: SkinRegionDetector::new(config.skin.clone()),
            plates: EdgeBasedPlateDetector::new(config.plates.clone(), resolver.clone()),
            policy: RegionPolicyEngine::new(config.policy.clone()),
            resolver,
            blurrer,
            fallback: config.fallback.clone(),
        }
    }

    /// Starts loading the models in the background. A failure here is only
    /// logged; the next real call tries again.
    pub fn preload_model(&self) -> JoinHandle<()> {
        let models = Arc::clone(&self.models);
        thread::spawn(move || {
            if let Err(e) = models.detectors() {
                log::info!("Model preload failed, loading will be retried on use: {e}");
            }
        })
    }

    pub fn apply_privacy_protection(&self, buffer: &mut PixelBuffer) -> ProtectionSummary {
        let started = Instant::now();
        let detectors = self
            .models
            .detectors()
            .map_err(|e| log::warn!("Models unavailable, using classical detectors only: {e}"))
            .ok();

        let frame: &PixelBuffer = buffer;
        let found = detect_with_models(frame, detectors.as_deref());
        let detected_at = started.elapsed();

        let run_skin = self.fallback.skin.should_run(found.faces.is_empty());
        let run_plates = self.fallback.plates.should_run(found.vehicles.is_empty());
        let vehicle_boxes: Vec<BoundingBox> = found.vehicles.iter().map(|d| d.bbox).collect();
        let (skin, plates, vehicles) = (&self.skin, &self.plates, vehicle_boxes.as_slice());
        let (skin_faces, plate_candidates) = thread::scope(|s| {
            let skin_job = run_skin.then(|| s.spawn(move || skin.detect(frame)));
            let plate_job = run_plates.then(|| s.spawn(move || plates.detect(frame, vehicles)));
            (
                settle_fallback("skin fallback", skin_job),
                settle_fallback("plate fallback", plate_job),
            )
        });
        let fallback_at = started.elapsed();

        let summary = ProtectionSummary {
            faces_detected: found.faces.len() + skin_faces.len(),
            people_detected: found.people.len(),
            vehicles_detected: found.vehicles.len(),
            total_blurred: 0,
        };

        let (fw, fh) = (frame.width(), frame.height());
        let mut detections = found.faces;
        detections.extend(skin_faces);
        detections.extend(found.people);
        detections.extend(found.vehicles);
        let mut regions = self.policy.regions_for(&detections, fw, fh);
        regions.extend(
            plate_candidates
                .iter()
                .filter_map(|c| self.policy.region_for_plate(c, fw, fh)),
        );
        let regions = self.resolver.dedupe_regions(regions);

        let total_blurred = self.blur_all(buffer, &regions);

        log::debug!(
            "Privacy protection: detect {:?}, fallback {:?}, total {:?}; {} region(s) blurred",
            detected_at,
            fallback_at - detected_at,
            started.elapsed(),
            total_blurred
        );

        ProtectionSummary {
            total_blurred,
            ..summary
        }
    }

    /// Blurs in the order given and returns how many regions succeeded.
    fn blur_all(&self, buffer: &mut PixelBuffer, regions: &[RedactionRegion]) -> usize {
        let mut blurred = 0;
        for region in regions {
            match panic::catch_unwind(AssertUnwindSafe(|| self.blurrer.blur(buffer, region))) {
                Ok(Ok(())) => blurred += 1,
                Ok(Err(e)) => log::warn!("Blurring {:?} region failed: {e}", region.priority),
                Err(_) => log::warn!("Blurring {:?} region panicked", region.priority),
            }
        }
        blurred
    }
}

/// Runs the face and object stages on separate threads. People and vehicles
/// come from one object pass and are split by kind.
fn detect_with_models(buffer: &PixelBuffer, detectors: Option<&Detectors>) -> ModelDetections {
    let faces_model = detectors.and_then(|d| d.faces.as_deref());
    let objects_model = detectors.and_then(|d| d.objects.as_deref());

    thread::scope(|s| {
        let faces = s.spawn(move || detect_faces(faces_model, buffer));
        let objects = s.spawn(move || detect_objects(objects_model, buffer, &ObjectClass::ALL));
        let (people, vehicles): (Vec<Detection>, Vec<Detection>) =
            settle("object detection", objects.join())
                .into_iter()
                .partition(|d| d.kind == DetectionKind::Person);
        ModelDetections {
            faces: settle("face detection", faces.join()),
            people,
            vehicles,
        }
    })
}

fn detect_faces(
    model: Option<&dyn FaceDetector>,
    buffer: &PixelBuffer,
) -> Result<Vec<Detection>, DetectionError> {
    model
        .ok_or(DetectionError::Unavailable("face"))?
        .detect_faces(buffer)
}

fn detect_objects(
    model: Option<&dyn ObjectDetector>,
    buffer: &PixelBuffer,
    classes: &[ObjectClass],
) -> Result<Vec<Detection>, DetectionError> {
    model
        .ok_or(DetectionError::Unavailable("object"))?
        .detect_objects(buffer, classes)
}

/// Folds a stage outcome into a list, logging why it is empty.
fn settle(
    stage: &'static str,
    joined: thread::Result<Result<Vec<Detection>, DetectionError>>,
) -> Vec<Detection> {
    match joined.unwrap_or(Err(DetectionError::Panicked(stage))) {
        Ok(detections) => detections,
        Err(e @ DetectionError::Unavailable(_)) => {
            log::debug!("Skipping {stage}: {e}");
            Vec::new()
        }
        Err(e) => {
            log::warn!("{stage} failed, treating as empty: {e}");
            Vec::new()
        }
    }
}

fn settle_fallback<T>(stage: &str, job: Option<ScopedJoinHandle<'_, Vec<T>>>) -> Vec<T> {
    let Some(job) = job else {
        return Vec::new();
    };
    job.join().unwrap_or_else(|_| {
        log::warn!("{stage} panicked, treating as empty");
        Vec::new()
    })
}
