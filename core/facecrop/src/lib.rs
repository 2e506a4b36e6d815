//! Batch profile-photo cropping: downsample each image, find the most
//! prominent face, and cut a fixed-size square centered on it.
//!
//! Images without a detectable face get a centered square instead.
//! Face detection is pluggable through [`FaceDetector`].
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use facecrop::{
//!     records_from, CropPipeline, DetectionOptions, FaceBounds, FaceCropError, FaceDetector,
//!     Progress, SourceImage,
//! };
//! use image::RgbaImage;
//!
//! struct NoFaces;
//!
//! #[async_trait(?Send)]
//! impl FaceDetector for NoFaces {
//!     async fn detect(
//!         &self,
//!         _surface: &RgbaImage,
//!         _options: &DetectionOptions,
//!     ) -> Result<Vec<FaceBounds>, FaceCropError> {
//!         Ok(vec![])
//!     }
//! }
//!
//! # async fn demo() -> Result<(), FaceCropError> {
//! let bytes = std::fs::read("portrait.jpg").unwrap();
//! let mut records = records_from(vec![SourceImage::new("portrait.jpg", "image/jpeg", bytes)]);
//!
//! let pipeline = CropPipeline::new(Box::new(NoFaces));
//! let report = pipeline
//!     .run(&mut records, &mut Progress::none(), |record| {
//!         println!("{} ready", record.original.name);
//!     })
//!     .await?;
//! println!("{} of {} cropped", report.cropped, report.total);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

/// Group scheduling, progress reporting and frame yielding.
pub mod batch;
mod codec;
mod config;
/// Face selection, region derivation and square rendering.
pub mod crop;
/// Analysis-copy generation.
pub mod downsample;
mod error;
/// Face detection traits and data types.
pub mod face_detector;
mod intake;
/// Face detection against analysis images.
pub mod locate;
mod record;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;

/// Group scheduling and progress targets.
pub use batch::{FrameYield, Progress, ProgressBar, ProgressLabel, YieldNow};
/// Pipeline settings.
pub use config::{
    CropConfig, RegionPolicy, DEFAULT_ANALYSIS_QUALITY, DEFAULT_GROUP_SIZE, DEFAULT_MARGIN,
    DEFAULT_MAX_ANALYSIS_SIZE, DEFAULT_OUTPUT_SIZE,
};
/// Crop geometry.
pub use crop::{CropRegion, RegionSource};
/// Error type returned by facecrop operations.
pub use error::FaceCropError;
/// Face detection trait, options and face bounding-box type.
pub use face_detector::{DetectionOptions, FaceBounds, FaceDetector};
/// Input filtering.
pub use intake::{
    filter_images, is_accepted_media_type, records_from, SourceImage, ACCEPTED_MEDIA_TYPES,
};
/// Per-image pipeline state.
pub use record::{EncodedImage, ImageRecord};
#[cfg(feature = "rustface")]
/// Built-in detector that loads a SeetaFace model.
pub use rustface_backend::RustfaceDetector;

use tracing::info;

use crate::batch::process_in_groups;
use crate::crop::synthesize_crop;
use crate::downsample::downsample;
use crate::locate::locate_faces;

/// Outcome counts of a [`CropPipeline::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records in the batch.
    pub total: usize,
    /// Records that hold a final crop.
    pub cropped: usize,
    /// Records marked failed.
    pub failed: usize,
    /// Crops centered on a detected face.
    pub face_crops: usize,
    /// Crops that fell back to the image center.
    pub fallback_crops: usize,
}

impl BatchReport {
    /// Tally the state of `records`.
    pub fn from_records(records: &[ImageRecord]) -> Self {
        records.iter().fold(
            Self {
                total: records.len(),
                ..Self::default()
            },
            |mut report, record| {
                if record.is_cropped() {
                    report.cropped += 1;
                    if record.is_face_crop() {
                        report.face_crops += 1;
                    } else {
                        report.fallback_crops += 1;
                    }
                } else {
                    report.failed += 1;
                }
                report
            },
        )
    }
}

/// Batch cropper.
///
/// Holds the configuration, the face detector and the host's frame yield.
/// Every pass processes records in groups of [`CropConfig::group_size`] and
/// reports progress after each group. Failures stay with their record: a
/// pass never stops early.
pub struct CropPipeline {
    config: CropConfig,
    detector: Box<dyn FaceDetector>,
    frames: Box<dyn FrameYield>,
}

impl CropPipeline {
    /// Create a pipeline with default settings around `detector`.
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            config: CropConfig::default(),
            detector,
            frames: Box::new(YieldNow),
        }
    }

    /// Replace the settings.
    pub fn config(mut self, config: CropConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace how control is handed back to the host between groups
    /// (default: [`YieldNow`]).
    pub fn frame_yield(mut self, frames: Box<dyn FrameYield>) -> Self {
        self.frames = frames;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &CropConfig {
        &self.config
    }

    /// Take every record through downsampling, face detection and cropping
    /// in a single scheduled pass.
    ///
    /// `on_ready` is called once per record as soon as its crop exists.
    /// Only invalid settings produce an error; per-record failures are
    /// recorded on the records and counted in the report.
    pub async fn run<F>(
        &self,
        records: &mut [ImageRecord],
        progress: &mut Progress<'_>,
        on_ready: F,
    ) -> Result<BatchReport, FaceCropError>
    where
        F: Fn(&ImageRecord),
    {
        self.config.validate()?;
        info!(
            records = records.len(),
            group_size = self.config.group_size,
            "starting crop batch"
        );

        let config = &self.config;
        let detector = self.detector.as_ref();
        let on_ready: &dyn Fn(&ImageRecord) = &on_ready;
        process_in_groups(
            records,
            config.group_size,
            progress,
            self.frames.as_ref(),
            |record, _| async move {
                downsample(record, config);
                locate_faces(record, detector, &config.detection).await;
                synthesize_crop(record, config, on_ready);
            },
        )
        .await;

        let report = BatchReport::from_records(records);
        info!(
            cropped = report.cropped,
            failed = report.failed,
            face_crops = report.face_crops,
            "crop batch finished"
        );
        Ok(report)
    }

    /// Downsampler pass on its own.
    pub async fn downsample_all(
        &self,
        records: &mut [ImageRecord],
        progress: &mut Progress<'_>,
    ) -> Result<(), FaceCropError> {
        self.config.validate()?;
        let config = &self.config;
        process_in_groups(
            records,
            config.group_size,
            progress,
            self.frames.as_ref(),
            |record, _| async move { downsample(record, config) },
        )
        .await;
        Ok(())
    }

    /// Face Locator pass on its own. Expects downsampled records.
    pub async fn locate_all(
        &self,
        records: &mut [ImageRecord],
        progress: &mut Progress<'_>,
    ) -> Result<(), FaceCropError> {
        self.config.validate()?;
        let options = &self.config.detection;
        let detector = self.detector.as_ref();
        process_in_groups(
            records,
            self.config.group_size,
            progress,
            self.frames.as_ref(),
            |record, _| async move { locate_faces(record, detector, options).await },
        )
        .await;
        Ok(())
    }

    /// Crop Synthesizer pass on its own.
    pub async fn crop_all<F>(
        &self,
        records: &mut [ImageRecord],
        progress: &mut Progress<'_>,
        on_ready: F,
    ) -> Result<(), FaceCropError>
    where
        F: Fn(&ImageRecord),
    {
        self.config.validate()?;
        let config = &self.config;
        let on_ready: &dyn Fn(&ImageRecord) = &on_ready;
        process_in_groups(
            records,
            config.group_size,
            progress,
            self.frames.as_ref(),
            |record, _| async move { synthesize_crop(record, config, on_ready) },
        )
        .await;
        Ok(())
    }
}
