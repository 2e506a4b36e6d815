use std::cmp::Ordering;

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use tracing::{debug, error, warn};

use crate::codec::{decode_image, encode_png};
use crate::config::{CropConfig, RegionPolicy};
use crate::error::FaceCropError;
use crate::face_detector::FaceBounds;
use crate::record::{EncodedImage, ImageRecord};

/// How a crop region was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// Centered on the widest detected face.
    Face,
    /// Centered square of the whole image; no face was found.
    CenterFallback,
}

/// Square source region in original-image coordinates.
///
/// Face regions are not bounds-checked: `x` and `y` may be negative and the
/// square may extend past the right or bottom edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Side length.
    pub size: f64,
    /// Which derivation produced the region.
    pub source: RegionSource,
}

impl CropRegion {
    /// Center of the square.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.size / 2.0, self.y + self.size / 2.0)
    }
}

/// Pick the widest face. Among equally wide faces the first one wins.
pub fn select_face(faces: &[FaceBounds]) -> Option<&FaceBounds> {
    faces.iter().fold(None, |best, face| match best {
        Some(best) if face.width.partial_cmp(&best.width) != Some(Ordering::Greater) => {
            Some(best)
        }
        _ => Some(face),
    })
}

/// Square region around `face`, mapped from analysis to original coordinates.
///
/// The side is the face width in original pixels times `margin`.
pub fn face_region(face: &FaceBounds, scale_factor: f64, margin: f64) -> CropRegion {
    let center_x = (face.x + face.width / 2.0) * scale_factor;
    let center_y = (face.y + face.height / 2.0) * scale_factor;
    let size = face.width * scale_factor * margin;

    CropRegion {
        x: center_x - size / 2.0,
        y: center_y - size / 2.0,
        size,
        source: RegionSource::Face,
    }
}

/// Largest centered square of a `width` × `height` image.
pub fn center_region(width: u32, height: u32) -> CropRegion {
    let min_dim = width.min(height) as f64;
    CropRegion {
        x: (width as f64 - min_dim) / 2.0,
        y: (height as f64 - min_dim) / 2.0,
        size: min_dim,
        source: RegionSource::CenterFallback,
    }
}

/// Shrink `region` to fit the image and shift it inside the bounds,
/// keeping it square.
pub fn clamp_region(region: CropRegion, width: u32, height: u32) -> CropRegion {
    let size = region.size.min(width.min(height) as f64).max(0.0);
    let (center_x, center_y) = region.center();
    let max_x = width as f64 - size;
    let max_y = height as f64 - size;

    CropRegion {
        x: (center_x - size / 2.0).clamp(0.0, max_x),
        y: (center_y - size / 2.0).clamp(0.0, max_y),
        size,
        source: region.source,
    }
}

/// Source region for an original of `width` × `height` pixels.
///
/// Uses the widest face when there is one, the centered square otherwise.
pub fn crop_region(
    faces: &[FaceBounds],
    scale_factor: f64,
    width: u32,
    height: u32,
    config: &CropConfig,
) -> CropRegion {
    match select_face(faces) {
        Some(face) => {
            let region = face_region(face, scale_factor, config.margin);
            match config.region_policy {
                RegionPolicy::Permissive => region,
                RegionPolicy::Clamp => clamp_region(region, width, height),
            }
        }
        None => center_region(width, height),
    }
}

/// Draw `region` of `image` into a transparent `output_size` square.
///
/// The region is scaled uniformly to the output. Parts of the region outside
/// the image stay transparent, and a region that is degenerate or misses
/// the image entirely leaves the whole canvas transparent.
pub fn render_square(image: &DynamicImage, region: &CropRegion, output_size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::new(output_size, output_size);

    let finite = region.x.is_finite() && region.y.is_finite() && region.size.is_finite();
    if !finite || region.size <= 0.0 {
        warn!(?region, "degenerate crop region, output left blank");
        return canvas;
    }

    let (width, height) = (image.width() as f64, image.height() as f64);
    let left = region.x.max(0.0);
    let top = region.y.max(0.0);
    let right = (region.x + region.size).min(width);
    let bottom = (region.y + region.size).min(height);
    if right <= left || bottom <= top {
        warn!(?region, "crop region lies outside the image, output left blank");
        return canvas;
    }

    let scale = output_size as f64 / region.size;
    let dest_left = ((left - region.x) * scale).round();
    let dest_top = ((top - region.y) * scale).round();
    let dest_right = ((right - region.x) * scale).round().min(output_size as f64);
    let dest_bottom = ((bottom - region.y) * scale).round().min(output_size as f64);
    let dest_width = (dest_right - dest_left).max(1.0) as u32;
    let dest_height = (dest_bottom - dest_top).max(1.0) as u32;

    let src_x = left.floor() as u32;
    let src_y = top.floor() as u32;
    let src_width = (right.ceil() as u32).saturating_sub(src_x).max(1);
    let src_height = (bottom.ceil() as u32).saturating_sub(src_y).max(1);

    let block = image
        .crop_imm(src_x, src_y, src_width, src_height)
        .resize_exact(dest_width, dest_height, FilterType::Lanczos3)
        .to_rgba8();
    image::imageops::replace(&mut canvas, &block, dest_left as i64, dest_top as i64);

    canvas
}

/// Replace the extension of `name` with `.png`.
///
/// Names without an extension are returned unchanged.
pub fn png_file_name(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains('/') => {
            format!("{}.png", &name[..dot])
        }
        _ => name.to_string(),
    }
}

fn render_crop(
    record: &ImageRecord,
    config: &CropConfig,
) -> Result<(CropRegion, EncodedImage), FaceCropError> {
    let original = decode_image(&record.original.data)?;
    let region = crop_region(
        &record.faces,
        record.scale_factor,
        original.width(),
        original.height(),
        config,
    );
    let canvas = render_square(&original, &region, config.output_size);
    let data = encode_png(&canvas)?;

    Ok((
        region,
        EncodedImage {
            name: png_file_name(&record.original.name),
            media_type: "image/png".to_string(),
            data,
            width: config.output_size,
            height: config.output_size,
        },
    ))
}

/// Crop Synthesizer stage: render the final square and hand the record to
/// `on_ready`.
///
/// Failed records are skipped. A record that cannot be rendered is marked
/// failed and `on_ready` is not called.
pub fn synthesize_crop(
    record: &mut ImageRecord,
    config: &CropConfig,
    on_ready: &dyn Fn(&ImageRecord),
) {
    if record.failed {
        return;
    }

    match render_crop(record, config) {
        Ok((region, image)) => {
            debug!(name = %record.original.name, ?region, "cropped");
            record.region = Some(region);
            record.final_width = image.width;
            record.final_height = image.height;
            record.crop = Some(image);
            on_ready(record);
        }
        Err(e) => {
            error!(name = %record.original.name, error = %e, "failed to crop image");
            record.failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn face(x: f64, y: f64, width: f64, height: f64) -> FaceBounds {
        FaceBounds::new(x, y, width, height)
    }

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 10, 10]),
        ))
    }

    #[test]
    fn widest_face_is_selected() {
        let faces = [
            face(0.0, 0.0, 20.0, 20.0),
            face(5.0, 5.0, 60.0, 10.0),
            face(9.0, 9.0, 40.0, 90.0),
        ];
        assert_eq!(select_face(&faces), Some(&faces[1]));
    }

    #[test]
    fn equal_widths_keep_detector_order() {
        let faces = [face(1.0, 0.0, 30.0, 30.0), face(2.0, 0.0, 30.0, 30.0)];
        assert_eq!(select_face(&faces).map(|f| f.x), Some(1.0));
    }

    #[test]
    fn no_faces_selects_nothing() {
        assert_eq!(select_face(&[]), None);
    }

    #[test]
    fn face_region_maps_back_to_original() {
        let region = face_region(&face(50.0, 50.0, 40.0, 40.0), 5.0, 2.2);
        let (cx, cy) = region.center();
        assert!((cx - 350.0).abs() < 1e-9);
        assert!((cy - 350.0).abs() < 1e-9);
        assert!((region.size - 440.0).abs() < 1e-9);
        assert!((region.x - 130.0).abs() < 1e-9);
        assert!((region.y - 130.0).abs() < 1e-9);
        assert_eq!(region.source, RegionSource::Face);
    }

    #[test]
    fn face_region_may_leave_the_image() {
        let region = face_region(&face(0.0, 0.0, 40.0, 40.0), 1.0, 2.2);
        assert!(region.x < 0.0);
        assert!(region.y < 0.0);
    }

    #[test]
    fn fallback_is_centered_square() {
        let region = center_region(800, 600);
        assert_eq!(region.size, 600.0);
        assert_eq!(region.x, 100.0);
        assert_eq!(region.y, 0.0);
        assert_eq!(region.source, RegionSource::CenterFallback);

        let portrait = center_region(300, 500);
        assert_eq!((portrait.x, portrait.y, portrait.size), (0.0, 100.0, 300.0));
    }

    #[test]
    fn crop_region_without_faces_falls_back() {
        let region = crop_region(&[], 2.0, 800, 600, &CropConfig::default());
        assert_eq!(region, center_region(800, 600));
    }

    #[test]
    fn clamp_policy_keeps_region_inside() {
        let config = CropConfig::default().region_policy(RegionPolicy::Clamp);
        let region = crop_region(&[face(0.0, 0.0, 100.0, 100.0)], 2.0, 300, 200, &config);
        assert_eq!(region.size, 200.0);
        assert_eq!(region.x, 0.0);
        assert_eq!(region.y, 0.0);

        let permissive = crop_region(
            &[face(0.0, 0.0, 100.0, 100.0)],
            2.0,
            300,
            200,
            &CropConfig::default(),
        );
        assert!(permissive.x < 0.0);
    }

    #[test]
    fn render_inside_image_fills_canvas() {
        let image = solid(800, 600);
        let canvas = render_square(&image, &center_region(800, 600), 500);
        assert_eq!(canvas.dimensions(), (500, 500));
        assert_eq!(canvas.get_pixel(0, 0).0[3], 255);
        assert_eq!(canvas.get_pixel(499, 499).0[3], 255);
    }

    #[test]
    fn render_out_of_bounds_leaves_transparent_margin() {
        let image = solid(100, 100);
        let region = CropRegion {
            x: -100.0,
            y: -100.0,
            size: 200.0,
            source: RegionSource::Face,
        };
        let canvas = render_square(&image, &region, 100);
        assert_eq!(canvas.dimensions(), (100, 100));
        // Top-left quadrant is outside the source.
        assert_eq!(canvas.get_pixel(10, 10).0[3], 0);
        // Bottom-right quadrant maps onto the image.
        assert_eq!(canvas.get_pixel(80, 80).0[3], 255);
    }

    #[test]
    fn degenerate_region_renders_blank_canvas() {
        let image = solid(50, 50);
        for region in [
            CropRegion {
                x: 0.0,
                y: 0.0,
                size: 0.0,
                source: RegionSource::Face,
            },
            CropRegion {
                x: f64::NAN,
                y: 0.0,
                size: 10.0,
                source: RegionSource::Face,
            },
            CropRegion {
                x: 500.0,
                y: 500.0,
                size: 10.0,
                source: RegionSource::Face,
            },
        ] {
            let canvas = render_square(&image, &region, 32);
            assert_eq!(canvas.dimensions(), (32, 32));
            assert!(canvas.pixels().all(|p| p.0[3] == 0));
        }
    }

    #[test]
    fn png_name_replaces_extension() {
        assert_eq!(png_file_name("photo.jpg"), "photo.png");
        assert_eq!(png_file_name("archive.tar.webp"), "archive.tar.png");
        assert_eq!(png_file_name("noext"), "noext");
        assert_eq!(png_file_name("dir.v2/noext"), "dir.v2/noext");
        assert_eq!(png_file_name("trailing."), "trailing.");
    }

    #[test]
    fn failed_record_is_not_cropped() {
        let mut record = ImageRecord::new(crate::intake::SourceImage::new(
            "a.png",
            "image/png",
            Vec::new(),
        ));
        record.failed = true;
        let calls = Cell::new(0);
        synthesize_crop(&mut record, &CropConfig::default(), &|_: &ImageRecord| calls.set(calls.get() + 1));
        assert_eq!(calls.get(), 0);
        assert!(record.crop.is_none());
    }

    #[test]
    fn unreadable_original_marks_record_failed() {
        let mut record = ImageRecord::new(crate::intake::SourceImage::new(
            "a.png",
            "image/png",
            b"garbage".to_vec(),
        ));
        let calls = Cell::new(0);
        synthesize_crop(&mut record, &CropConfig::default(), &|_: &ImageRecord| calls.set(calls.get() + 1));
        assert!(record.failed);
        assert!(record.crop.is_none());
        assert_eq!(calls.get(), 0);
    }
}
