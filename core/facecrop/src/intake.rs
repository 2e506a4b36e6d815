use tracing::debug;

use crate::record::ImageRecord;

/// Media types accepted by the pipeline.
pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// A file-like input blob supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// File name, used to derive output names.
    pub name: String,
    /// Declared media type, e.g. `image/jpeg`.
    pub media_type: String,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

impl SourceImage {
    /// Create a source image from its name, declared media type and bytes.
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data,
        }
    }

    /// Whether the declared media type is on the allow-list.
    pub fn is_supported(&self) -> bool {
        is_accepted_media_type(&self.media_type)
    }
}

/// Match a declared media type against [`ACCEPTED_MEDIA_TYPES`].
///
/// Comparison ignores case and any `;`-separated parameters.
pub fn is_accepted_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    ACCEPTED_MEDIA_TYPES
        .iter()
        .any(|accepted| essence.eq_ignore_ascii_case(accepted))
}

/// Keep the candidates with an accepted media type, preserving order.
pub fn filter_images<I>(candidates: I) -> Vec<SourceImage>
where
    I: IntoIterator<Item = SourceImage>,
{
    candidates
        .into_iter()
        .filter(|candidate| {
            let keep = candidate.is_supported();
            if !keep {
                debug!(
                    name = %candidate.name,
                    media_type = %candidate.media_type,
                    "skipping unsupported input"
                );
            }
            keep
        })
        .collect()
}

/// Filter the candidates and wrap each accepted one in a pending record.
pub fn records_from<I>(candidates: I) -> Vec<ImageRecord>
where
    I: IntoIterator<Item = SourceImage>,
{
    filter_images(candidates)
        .into_iter()
        .map(ImageRecord::new)
        .collect()
}
