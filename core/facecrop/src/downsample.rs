use image::imageops::FilterType;
use tracing::{debug, warn};

use crate::codec::{decode_image, encode_jpeg, flatten_alpha};
use crate::config::CropConfig;
use crate::error::FaceCropError;
use crate::intake::SourceImage;
use crate::record::{EncodedImage, ImageRecord};

/// Analysis copy of an image plus the factor mapping it back to the original.
#[derive(Debug, Clone)]
pub struct Downsampled {
    /// The encoded analysis image.
    pub image: EncodedImage,
    /// Original width divided by analysis width.
    pub scale_factor: f64,
}

/// Size of the analysis image for a `width` × `height` original.
///
/// The larger side is scaled to `max_size` and the aspect ratio is kept.
/// Originals smaller than `max_size` are enlarged. Fractional pixels are
/// truncated and each side is at least one pixel.
pub fn analysis_dimensions(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let larger = width.max(height).max(1) as f64;
    let scaled = |side: u32| ((side as f64 * max_size as f64) / larger).floor().max(1.0) as u32;
    (scaled(width), scaled(height))
}

/// Decode `source` and produce its JPEG analysis copy.
pub fn reduce_image(
    source: &SourceImage,
    max_size: u32,
    quality: u8,
) -> Result<Downsampled, FaceCropError> {
    let decoded = decode_image(&source.data)?;
    let (width, height) = (decoded.width(), decoded.height());
    let (analysis_width, analysis_height) = analysis_dimensions(width, height, max_size);

    let resized = decoded.resize_exact(analysis_width, analysis_height, FilterType::Triangle);
    let rgb = flatten_alpha(&resized);
    let data = encode_jpeg(&rgb, quality)?;

    Ok(Downsampled {
        image: EncodedImage {
            name: format!("cropped_{}", source.name),
            media_type: "image/jpeg".to_string(),
            data,
            width: analysis_width,
            height: analysis_height,
        },
        scale_factor: width as f64 / analysis_width as f64,
    })
}

/// Downsampler stage: attach the analysis copy to `record`.
///
/// A record that cannot be decoded or encoded is marked failed.
pub fn downsample(record: &mut ImageRecord, config: &CropConfig) {
    if record.failed {
        return;
    }

    match reduce_image(
        &record.original,
        config.max_analysis_size,
        config.analysis_quality,
    ) {
        Ok(Downsampled {
            image,
            scale_factor,
        }) => {
            debug!(
                name = %record.original.name,
                width = image.width,
                height = image.height,
                scale_factor,
                "downsampled"
            );
            record.analysis_width = image.width;
            record.analysis_height = image.height;
            record.scale_factor = scale_factor;
            record.analysis = Some(image);
        }
        Err(e) => {
            warn!(name = %record.original.name, error = %e, "failed to downsample image");
            record.failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, RgbImage};

    fn make_test_png(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        let mut buffer = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    #[test]
    fn landscape_is_bounded_by_width() {
        assert_eq!(analysis_dimensions(800, 600, 400), (400, 300));
        assert_eq!(analysis_dimensions(1200, 900, 400), (400, 300));
    }

    #[test]
    fn portrait_is_bounded_by_height() {
        assert_eq!(analysis_dimensions(1000, 2000, 400), (200, 400));
    }

    #[test]
    fn small_images_are_enlarged() {
        assert_eq!(analysis_dimensions(200, 100, 400), (400, 200));
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(analysis_dimensions(10_000, 5, 400), (400, 1));
    }

    #[test]
    fn fractional_sides_are_truncated() {
        // 1000 x 333 → 400 x 133.2
        assert_eq!(analysis_dimensions(1000, 333, 400), (400, 133));
    }

    #[test]
    fn reduce_image_reports_scale_back_to_original() {
        let source = SourceImage::new("big.png", "image/png", make_test_png(1000, 500));
        let reduced = reduce_image(&source, 400, 90).unwrap();
        assert_eq!((reduced.image.width, reduced.image.height), (400, 200));
        assert!((reduced.scale_factor - 2.5).abs() < 1e-9);
        assert_eq!(reduced.image.name, "cropped_big.png");
        assert_eq!(reduced.image.media_type, "image/jpeg");
        assert_eq!(&reduced.image.data[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn downsample_updates_record() {
        let mut record = ImageRecord::new(SourceImage::new(
            "p.png",
            "image/png",
            make_test_png(300, 600),
        ));
        downsample(&mut record, &CropConfig::default());
        assert!(!record.failed);
        assert_eq!((record.analysis_width, record.analysis_height), (200, 400));
        assert!((record.scale_factor * record.analysis_width as f64 - 300.0).abs() < 1e-9);
        assert!(record.analysis.is_some());
    }

    #[test]
    fn undecodable_input_marks_record_failed() {
        let mut record = ImageRecord::new(SourceImage::new(
            "broken.jpg",
            "image/jpeg",
            b"definitely not a jpeg".to_vec(),
        ));
        downsample(&mut record, &CropConfig::default());
        assert!(record.failed);
        assert!(record.analysis.is_none());
    }
}
