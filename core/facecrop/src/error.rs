use thiserror::Error;

/// Errors produced while cropping or by invalid settings.
#[derive(Debug, Error)]
pub enum FaceCropError {
    /// Input bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    /// Decoded image has a zero width or height.
    #[error("image dimensions are zero")]
    ZeroDimensions,

    /// Analysis copy or crop could not be encoded.
    #[error("failed to encode image: {0}")]
    EncodeError(String),

    /// The face detector reported an error.
    #[error("face detection failed: {0}")]
    DetectionFailed(String),

    /// `max_analysis_size` is zero.
    #[error("max analysis size must be > 0")]
    InvalidMaxAnalysisSize,

    /// `group_size` is zero.
    #[error("group size must be > 0")]
    InvalidGroupSize,

    /// `output_size` is zero.
    #[error("output size must be > 0")]
    InvalidOutputSize,

    /// `margin` is not a finite positive number.
    #[error("margin must be a finite value > 0, got {0}")]
    InvalidMargin(f64),

    /// `analysis_quality` is outside 1..=100.
    #[error("analysis quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),
}
