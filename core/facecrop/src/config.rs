use crate::error::FaceCropError;
use crate::face_detector::DetectionOptions;

/// Default bound on the larger side of the analysis image.
pub const DEFAULT_MAX_ANALYSIS_SIZE: u32 = 400;

/// Default number of records processed concurrently per group.
pub const DEFAULT_GROUP_SIZE: usize = 5;

/// Default crop side as a multiple of the face width (face + hair + shoulders).
pub const DEFAULT_MARGIN: f64 = 2.2;

/// Default side of the square output, in pixels.
pub const DEFAULT_OUTPUT_SIZE: u32 = 500;

/// Default JPEG quality of the analysis copy.
pub const DEFAULT_ANALYSIS_QUALITY: u8 = 90;

/// What to do with a face-centered region that extends past the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegionPolicy {
    /// Use the region as derived. Parts outside the image render transparent.
    #[default]
    Permissive,

    /// Shrink the region to fit and shift it inside the image bounds.
    Clamp,
}

/// Pipeline settings.
///
/// ```
/// use facecrop::{CropConfig, RegionPolicy};
///
/// let config = CropConfig::default()
///     .output_size(256)
///     .margin(1.8)
///     .region_policy(RegionPolicy::Clamp);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CropConfig {
    /// Bound on the larger side of the analysis image.
    pub max_analysis_size: u32,
    /// Records processed concurrently before progress is reported.
    pub group_size: usize,
    /// Crop side = face width × margin.
    pub margin: f64,
    /// Side of the square output image.
    pub output_size: u32,
    /// JPEG quality (1–100) of the analysis copy.
    pub analysis_quality: u8,
    /// Hints forwarded to the face detector.
    pub detection: DetectionOptions,
    /// Handling of out-of-bounds face regions.
    pub region_policy: RegionPolicy,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            max_analysis_size: DEFAULT_MAX_ANALYSIS_SIZE,
            group_size: DEFAULT_GROUP_SIZE,
            margin: DEFAULT_MARGIN,
            output_size: DEFAULT_OUTPUT_SIZE,
            analysis_quality: DEFAULT_ANALYSIS_QUALITY,
            detection: DetectionOptions::default(),
            region_policy: RegionPolicy::default(),
        }
    }
}

impl CropConfig {
    /// Set the analysis bound in pixels (default: 400).
    pub fn max_analysis_size(mut self, size: u32) -> Self {
        self.max_analysis_size = size;
        self
    }

    /// Set the group size (default: 5).
    pub fn group_size(mut self, size: usize) -> Self {
        self.group_size = size;
        self
    }

    /// Set the face margin multiplier (default: 2.2).
    pub fn margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Set the output side in pixels (default: 500).
    pub fn output_size(mut self, size: u32) -> Self {
        self.output_size = size;
        self
    }

    /// Set the analysis JPEG quality (default: 90).
    pub fn analysis_quality(mut self, quality: u8) -> Self {
        self.analysis_quality = quality;
        self
    }

    /// Set the detector hints (default: interval 4, min neighbors 1).
    pub fn detection(mut self, options: DetectionOptions) -> Self {
        self.detection = options;
        self
    }

    /// Set the region policy (default: [`RegionPolicy::Permissive`]).
    pub fn region_policy(mut self, policy: RegionPolicy) -> Self {
        self.region_policy = policy;
        self
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), FaceCropError> {
        if self.max_analysis_size == 0 {
            return Err(FaceCropError::InvalidMaxAnalysisSize);
        }
        if self.group_size == 0 {
            return Err(FaceCropError::InvalidGroupSize);
        }
        if self.output_size == 0 {
            return Err(FaceCropError::InvalidOutputSize);
        }
        if !self.margin.is_finite() || self.margin <= 0.0 {
            return Err(FaceCropError::InvalidMargin(self.margin));
        }
        if self.analysis_quality == 0 || self.analysis_quality > 100 {
            return Err(FaceCropError::InvalidQuality(self.analysis_quality));
        }
        Ok(())
    }
}
