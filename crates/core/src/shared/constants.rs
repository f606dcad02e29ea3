/// Directory name used under the platform cache dir.
pub const APP_DIR_NAME: &str = "hazard-redact";

pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// COCO-trained YOLO model for people and vehicles. Not downloaded
/// automatically; place it in the cache or bundled dir, or pass a path.
pub const OBJECT_MODEL_NAME: &str = "yolo11n.onnx";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
