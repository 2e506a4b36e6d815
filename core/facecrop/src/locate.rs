use tracing::{debug, warn};

use crate::codec::decode_image;
use crate::face_detector::{DetectionOptions, FaceBounds, FaceDetector};
use crate::record::{EncodedImage, ImageRecord};

/// Run `detector` on an encoded analysis image.
///
/// Never fails: a surface that cannot be decoded or a detector error both
/// yield an empty list.
pub async fn detect_faces(
    analysis: &EncodedImage,
    detector: &dyn FaceDetector,
    options: &DetectionOptions,
) -> Vec<FaceBounds> {
    let surface = match decode_image(&analysis.data) {
        Ok(image) => image.to_rgba8(),
        Err(e) => {
            warn!(name = %analysis.name, error = %e, "analysis image unreadable, skipping detection");
            return Vec::new();
        }
    };

    match detector.detect(&surface, options).await {
        Ok(faces) => faces,
        Err(e) => {
            warn!(name = %analysis.name, error = %e, "face detection failed");
            Vec::new()
        }
    }
}

/// Face Locator stage: fill `record.faces` from the analysis image.
///
/// Failed records are skipped without calling the detector.
pub async fn locate_faces(
    record: &mut ImageRecord,
    detector: &dyn FaceDetector,
    options: &DetectionOptions,
) {
    if record.failed {
        return;
    }
    let Some(analysis) = record.analysis.as_ref() else {
        warn!(name = %record.original.name, "no analysis image, skipping detection");
        record.faces.clear();
        return;
    };

    let faces = detect_faces(analysis, detector, options).await;
    debug!(name = %record.original.name, faces = faces.len(), "face detection done");
    record.faces = faces;
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use async_trait::async_trait;
    use image::RgbaImage;

    use super::*;
    use crate::error::FaceCropError;
    use crate::intake::SourceImage;

    struct FixedDetector {
        result: Result<Vec<FaceBounds>, String>,
        calls: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl FaceDetector for FixedDetector {
        async fn detect(
            &self,
            _surface: &RgbaImage,
            _options: &DetectionOptions,
        ) -> Result<Vec<FaceBounds>, FaceCropError> {
            self.calls.set(self.calls.get() + 1);
            self.result.clone().map_err(FaceCropError::DetectionFailed)
        }
    }

    fn analysed_record() -> ImageRecord {
        let mut record = ImageRecord::new(SourceImage::new("a.png", "image/png", Vec::new()));
        let rgb = image::RgbImage::from_pixel(40, 30, image::Rgb([90, 90, 90]));
        record.analysis = Some(EncodedImage {
            name: "cropped_a.png".to_string(),
            media_type: "image/jpeg".to_string(),
            data: crate::codec::encode_jpeg(&rgb, 90).unwrap(),
            width: 40,
            height: 30,
        });
        record
    }

    #[tokio::test]
    async fn faces_are_stored_on_the_record() {
        let detector = FixedDetector {
            result: Ok(vec![FaceBounds::new(1.0, 2.0, 10.0, 10.0)]),
            calls: Cell::new(0),
        };
        let mut record = analysed_record();
        locate_faces(&mut record, &detector, &DetectionOptions::default()).await;
        assert_eq!(record.faces, vec![FaceBounds::new(1.0, 2.0, 10.0, 10.0)]);
    }

    #[tokio::test]
    async fn detector_error_degrades_to_no_faces() {
        let detector = FixedDetector {
            result: Err("model crashed".to_string()),
            calls: Cell::new(0),
        };
        let mut record = analysed_record();
        locate_faces(&mut record, &detector, &DetectionOptions::default()).await;
        assert!(record.faces.is_empty());
        assert!(!record.failed);
        assert_eq!(detector.calls.get(), 1);
    }

    #[tokio::test]
    async fn failed_records_skip_the_detector() {
        let detector = FixedDetector {
            result: Ok(vec![FaceBounds::new(0.0, 0.0, 5.0, 5.0)]),
            calls: Cell::new(0),
        };
        let mut record = analysed_record();
        record.failed = true;
        locate_faces(&mut record, &detector, &DetectionOptions::default()).await;
        assert_eq!(detector.calls.get(), 0);
        assert!(record.faces.is_empty());
    }
}
