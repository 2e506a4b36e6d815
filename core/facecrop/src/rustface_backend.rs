use std::path::Path;

use async_trait::async_trait;
use image::RgbaImage;

use crate::error::FaceCropError;
use crate::face_detector::{DetectionOptions, FaceBounds, FaceDetector};

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`) is not bundled;
/// load it from bytes or from a file path.
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Build a detector from the raw bytes of a SeetaFace model.
    pub fn from_model_bytes(model_data: &[u8]) -> Result<Self, FaceCropError> {
        let model = rustface::read_model(std::io::Cursor::new(model_data))
            .map_err(|e| FaceCropError::DetectionFailed(format!("invalid model: {e}")))?;
        Ok(Self { model })
    }

    /// Build a detector from a SeetaFace model file.
    pub fn from_model_path(path: impl AsRef<Path>) -> Result<Self, FaceCropError> {
        let path = path.as_ref();
        let model = rustface::load_model(&path.to_string_lossy()).map_err(|e| {
            FaceCropError::DetectionFailed(format!("failed to load {}: {e}", path.display()))
        })?;
        Ok(Self { model })
    }
}

#[async_trait(?Send)]
impl FaceDetector for RustfaceDetector {
    async fn detect(
        &self,
        surface: &RgbaImage,
        options: &DetectionOptions,
    ) -> Result<Vec<FaceBounds>, FaceCropError> {
        let gray = image::imageops::grayscale(surface);
        let (width, height) = (gray.width(), gray.height());

        // SeetaFace has no neighbor-merge threshold, so `min_neighbors` is
        // not forwarded.
        let step = options.interval.max(1);
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(step, step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBounds {
                    x: bbox.x() as f64,
                    y: bbox.y() as f64,
                    width: bbox.width() as f64,
                    height: bbox.height() as f64,
                    confidence: face.score(),
                }
            })
            .collect())
    }
}
