use thiserror::Error;

/// Failures a detection stage can report. The pipeline folds all of them
/// into an empty result; they exist so the reason can be logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("model failed to load: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("no {0} detector is available")]
    Unavailable(&'static str),
    #[error("detector thread panicked during {0}")]
    Panicked(&'static str),
}

