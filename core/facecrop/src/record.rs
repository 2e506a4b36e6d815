use crate::crop::{CropRegion, RegionSource};
use crate::face_detector::FaceBounds;
use crate::intake::SourceImage;

/// An image produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Output file name.
    pub name: String,
    /// Media type of `data`.
    pub media_type: String,
    /// Encoded bytes.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// The unit of work, updated in place by each pipeline stage.
///
/// At the end of a batch a record is either `failed` or carries a `crop`,
/// never both.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// The unmodified input.
    pub original: SourceImage,
    /// Downsampled JPEG copy used for face detection.
    pub analysis: Option<EncodedImage>,
    /// Original width divided by analysis width.
    pub scale_factor: f64,
    /// Width of the analysis image.
    pub analysis_width: u32,
    /// Height of the analysis image.
    pub analysis_height: u32,
    /// Faces found in the analysis image, in analysis coordinates.
    pub faces: Vec<FaceBounds>,
    /// Set when a stage could not process the record; later stages skip it.
    pub failed: bool,
    /// Source square, in original coordinates, used for the crop.
    pub region: Option<CropRegion>,
    /// Final square PNG.
    pub crop: Option<EncodedImage>,
    /// Width of the final crop.
    pub final_width: u32,
    /// Height of the final crop.
    pub final_height: u32,
}

impl ImageRecord {
    /// Wrap an accepted input in a pending record.
    pub fn new(original: SourceImage) -> Self {
        Self {
            original,
            analysis: None,
            scale_factor: 1.0,
            analysis_width: 0,
            analysis_height: 0,
            faces: Vec::new(),
            failed: false,
            region: None,
            crop: None,
            final_width: 0,
            final_height: 0,
        }
    }

    /// Whether the record went through every stage and holds a crop.
    pub fn is_cropped(&self) -> bool {
        !self.failed && self.crop.is_some()
    }

    /// Whether the crop was centered on a detected face.
    pub fn is_face_crop(&self) -> bool {
        matches!(
            self.region,
            Some(CropRegion {
                source: RegionSource::Face,
                ..
            })
        ) && self.is_cropped()
    }
}
