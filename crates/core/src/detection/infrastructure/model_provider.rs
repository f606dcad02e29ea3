use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::object_detector::ObjectDetector;

/// The learned detectors available to the pipeline. Either may be missing,
/// in which case the classical fallbacks cover its stage.
#[derive(Default)]
pub struct Detectors {
    pub faces: Option<Box<dyn FaceDetector>>,
    pub objects: Option<Box<dyn ObjectDetector>>,
}

/// Hands out the process-wide detectors, loading them on first use.
pub trait ModelProvider: Send + Sync {
    fn detectors(&self) -> Result<Arc<Detectors>, DetectionError>;
}

pub type DetectorLoader = Box<dyn Fn() -> Result<Detectors, DetectionError> + Send + Sync>;

enum SlotState {
    Empty,
    Loading,
    Ready(Arc<Detectors>),
}

struct Slot {
    state: SlotState,
    /// Bumped whenever a load attempt finishes, so waiters can tell theirs is done.
    attempts: u64,
    last_error: Option<DetectionError>,
}

/// Memoized, single-flight model loading.
///
/// The first caller runs the loader while concurrent callers block on the
/// same attempt. A successful load is kept for the life of the provider. A
/// failed load is reported to everyone waiting on it and the slot is
/// emptied, so a later call tries again.
pub struct LazyModelProvider {
    loader: DetectorLoader,
    slot: Mutex<Slot>,
    ready: Condvar,
    loads: AtomicUsize,
}

impl LazyModelProvider {
    pub fn new(loader: DetectorLoader) -> Self {
        Self::with_state(loader, SlotState::Empty)
    }

    /// A provider that never loads anything.
    pub fn preloaded(detectors: Detectors) -> Self {
        Self::with_state(
            Box::new(|| Err(DetectionError::Unavailable("model loader"))),
            SlotState::Ready(Arc::new(detectors)),
        )
    }

    fn with_state(loader: DetectorLoader, state: SlotState) -> Self {
        Self {
            loader,
            slot: Mutex::new(Slot {
                state,
                attempts: 0,
                last_error: None,
            }),
            ready: Condvar::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// How many times the loader has been invoked.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        matches!(slot.state, SlotState::Ready(_))
    }

    fn load(&self) -> Result<Detectors, DetectionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        panic::catch_unwind(AssertUnwindSafe(|| (self.loader)()))
            .unwrap_or_else(|_| Err(DetectionError::ModelLoad("model loader panicked".into())))
    }
}

impl ModelProvider for LazyModelProvider {
    fn detectors(&self) -> Result<Arc<Detectors>, DetectionError> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let SlotState::Ready(ref detectors) = slot.state {
            return Ok(detectors.clone());
        }
        if matches!(slot.state, SlotState::Loading) {
            let attempt = slot.attempts;
            while slot.attempts == attempt {
                slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
            }
            if let SlotState::Ready(ref detectors) = slot.state {
                return Ok(detectors.clone());
            }
            return Err(slot
                .last_error
                .clone()
                .unwrap_or(DetectionError::ModelLoad("model load failed".into())));
        }
        slot.state = SlotState::Loading;
        drop(slot);

        let result = self.load().map(Arc::new);

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.attempts += 1;
        match &result {
            Ok(detectors) => {
                slot.state = SlotState::Ready(detectors.clone());
                slot.last_error = None;
            }
            Err(e) => {
                log::warn!("Model loading failed: {e}");
                slot.state = SlotState::Empty;
                slot.last_error = Some(e.clone());
            }
        }
        self.ready.notify_all();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::Detection;
    use crate::shared::pixel_buffer::PixelBuffer;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    struct NoFaces;

    impl FaceDetector for NoFaces {
        fn detect_faces(&self, _buffer: &PixelBuffer) -> Result<Vec<Detection>, DetectionError> {
            Ok(Vec::new())
        }
    }

    fn face_only() -> Detectors {
        Detectors {
            faces: Some(Box::new(NoFaces)),
            objects: None,
        }
    }

    #[test]
    fn test_concurrent_first_callers_share_one_load() {
        let provider = Arc::new(LazyModelProvider::new(Box::new(|| {
            thread::sleep(Duration::from_millis(50));
            Ok(face_only())
        })));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = provider.clone();
                thread::spawn(move || p.detectors().map(|d| Arc::as_ptr(&d) as usize))
            })
            .collect();
        let ptrs: Vec<usize> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(provider.load_count(), 1);
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
        assert!(provider.is_loaded());
    }

    #[test]
    fn test_success_is_memoized() {
        let provider = LazyModelProvider::new(Box::new(|| Ok(face_only())));
        let first = provider.detectors().unwrap();
        let second = provider.detectors().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.load_count(), 1);
    }

    #[test]
    fn test_failure_is_reported_and_retried() {
        let fail = Arc::new(AtomicBool::new(true));
        let flag = fail.clone();
        let provider = LazyModelProvider::new(Box::new(move || {
            if flag.load(Ordering::SeqCst) {
                Err(DetectionError::ModelLoad("missing file".into()))
            } else {
                Ok(face_only())
            }
        }));

        assert_eq!(
            provider.detectors().err(),
            Some(DetectionError::ModelLoad("missing file".into()))
        );
        assert!(!provider.is_loaded());

        fail.store(false, Ordering::SeqCst);
        assert!(provider.detectors().is_ok());
        assert_eq!(provider.load_count(), 2);
    }

    #[test]
    fn test_waiters_see_the_same_failure() {
        let provider = Arc::new(LazyModelProvider::new(Box::new(|| {
            thread::sleep(Duration::from_millis(50));
            Err(DetectionError::ModelLoad("corrupt".into()))
        })));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = provider.clone();
                thread::spawn(move || p.detectors().err())
            })
            .collect();
        for h in handles {
            assert_eq!(
                h.join().unwrap(),
                Some(DetectionError::ModelLoad("corrupt".into()))
            );
        }
        // Late callers may start a second attempt, but never one per caller.
        assert!(provider.load_count() < 4);
    }

    #[test]
    fn test_loader_panic_becomes_error() {
        let provider = LazyModelProvider::new(Box::new(|| panic!("boom")));
        assert!(matches!(
            provider.detectors(),
            Err(DetectionError::ModelLoad(_))
        ));
        assert!(!provider.is_loaded());
    }

    #[test]
    fn test_preloaded_never_invokes_loader() {
        let provider = LazyModelProvider::preloaded(Detectors::default());
        let detectors = provider.detectors().unwrap();
        assert!(detectors.faces.is_none());
        assert!(detectors.objects.is_none());
        assert_eq!(provider.load_count(), 0);
    }
}
