use async_trait::async_trait;
use image::RgbaImage;

use crate::error::FaceCropError;

/// Bounding box of a detected face within an image.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBounds {
    /// X coordinate of the top-left corner (pixels).
    pub x: f64,
    /// Y coordinate of the top-left corner (pixels).
    pub y: f64,
    /// Width of the bounding box (pixels).
    pub width: f64,
    /// Height of the bounding box (pixels).
    pub height: f64,
    /// Detection confidence score, or 0.0 when the detector reports none.
    pub confidence: f64,
}

impl FaceBounds {
    /// Create a box without a confidence score.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 0.0,
        }
    }
}

/// Tuning hints forwarded to the face detector on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionOptions {
    /// Sampling interval: how many pixels the detector skips between
    /// candidate windows.
    pub interval: u32,
    /// Minimum number of overlapping candidates required to report a face.
    pub min_neighbors: u32,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            interval: 4,
            min_neighbors: 1,
        }
    }
}

/// Pluggable face detection backend.
///
/// Detection runs against the downsampled analysis image only, so returned
/// boxes are in the surface's own pixel space. The pipeline is driven from a
/// single thread, which lets implementations wrap non-`Send` handles such as
/// JavaScript promises.
///
/// Errors never abort a batch: the pipeline treats them as "no face found".
#[async_trait(?Send)]
pub trait FaceDetector {
    /// Detect faces in an RGBA surface.
    async fn detect(
        &self,
        surface: &RgbaImage,
        options: &DetectionOptions,
    ) -> Result<Vec<FaceBounds>, FaceCropError>;
}
