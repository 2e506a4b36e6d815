use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};

use crate::error::FaceCropError;

/// Decode input bytes into a `DynamicImage`, rejecting empty rasters.
pub(crate) fn decode_image(input: &[u8]) -> Result<DynamicImage, FaceCropError> {
    let image =
        image::load_from_memory(input).map_err(|e| FaceCropError::DecodeError(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(FaceCropError::ZeroDimensions);
    }
    Ok(image)
}

/// Flatten alpha channel by compositing onto a white background.
pub(crate) fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([over_white(r), over_white(g), over_white(b)]));
    }

    rgb
}

/// Encode an RGB raster as JPEG at `quality` percent.
pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FaceCropError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| FaceCropError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

/// Encode an RGBA raster as PNG.
pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, FaceCropError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| FaceCropError::EncodeError(e.to_string()))?;
    Ok(buffer)
}
