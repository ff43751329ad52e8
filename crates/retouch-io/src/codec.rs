//! Conversion between encoded image files and [`PixelBuffer`]s.
//!
//! Decoding goes through the `image` crate. Images with more than eight
//! bits per channel become 16-bit buffers; everything else becomes 8-bit.
//! Channels are swapped from RGBA to the buffer's BGRA order. Images
//! without an alpha channel get an opaque alpha.

use std::io::Cursor;
use std::path::Path;

use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, ImageReader, Rgba};
use retouch_pipeline::PixelBuffer;

use crate::IoError;

/// Whether `color` carries more than eight bits per channel.
const fn is_high_depth(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16
            | ColorType::Rgb32F
            | ColorType::Rgba32F
    )
}

/// Convert a decoded image into a BGRA buffer.
#[must_use]
pub fn from_dynamic_image(image: &DynamicImage) -> PixelBuffer {
    let (width, height) = (image.width(), image.height());
    let has_alpha = image.color().has_alpha();
    if is_high_depth(image.color()) {
        let data = image
            .to_rgba16()
            .pixels()
            .flat_map(|&Rgba([r, g, b, a])| [b, g, r, a])
            .flat_map(u16::to_le_bytes)
            .collect();
        PixelBuffer::from_vec(width, height, true, has_alpha, data)
    } else {
        let data = image
            .to_rgba8()
            .pixels()
            .flat_map(|&Rgba([r, g, b, a])| [b, g, r, a])
            .collect();
        PixelBuffer::from_vec(width, height, false, has_alpha, data)
    }
}

/// Convert a BGRA buffer into an RGBA (or RGB without alpha) image,
/// keeping its depth.
///
/// # Errors
///
/// Returns [`IoError::NullImage`] for the null buffer.
pub fn to_dynamic_image(buffer: &PixelBuffer) -> Result<DynamicImage, IoError> {
    if buffer.is_null() {
        return Err(IoError::NullImage);
    }
    let (width, height) = (buffer.width(), buffer.height());
    let image = if buffer.sixteen_bit() {
        let raw: Vec<u16> = buffer
            .data()
            .chunks_exact(8)
            .flat_map(|px| {
                let channel = |c: usize| u16::from_le_bytes([px[2 * c], px[2 * c + 1]]);
                [channel(2), channel(1), channel(0), channel(3)]
            })
            .collect();
        ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgba16)
    } else {
        let raw: Vec<u8> = buffer
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect();
        ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, raw).map(DynamicImage::ImageRgba8)
    }
    .ok_or(IoError::NullImage)?;

    Ok(match (buffer.has_alpha(), buffer.sixteen_bit()) {
        (true, _) => image,
        (false, true) => DynamicImage::ImageRgb16(image.to_rgb16()),
        (false, false) => DynamicImage::ImageRgb8(image.to_rgb8()),
    })
}

/// Reduce `image` to what `format` can store.
fn fit_for_format(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        ImageFormat::Png => image,
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ if image.color().has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Decode an in-memory image (PNG, JPEG, BMP, WebP).
///
/// # Errors
///
/// Returns [`IoError::Image`] if the format is unrecognized or the data
/// is corrupt.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, IoError> {
    let image = image::load_from_memory(bytes)?;
    Ok(from_dynamic_image(&image))
}

/// Encode `buffer` in `format`. 16-bit data is kept for PNG only.
///
/// # Errors
///
/// Returns [`IoError::NullImage`] for the null buffer and
/// [`IoError::Image`] if encoding fails.
pub fn encode(buffer: &PixelBuffer, format: ImageFormat) -> Result<Vec<u8>, IoError> {
    let image = fit_for_format(to_dynamic_image(buffer)?, format);
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format)?;
    Ok(bytes.into_inner())
}

/// Load an image file. The format is guessed from the content.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be read and
/// [`IoError::Image`] if it cannot be decoded.
pub fn load(path: impl AsRef<Path>) -> Result<PixelBuffer, IoError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    log::debug!(
        "loaded {} ({}x{}, {:?})",
        path.display(),
        image.width(),
        image.height(),
        image.color()
    );
    Ok(from_dynamic_image(&image))
}

/// Save `buffer`; the format follows the file extension.
///
/// # Errors
///
/// Returns [`IoError::NullImage`] for the null buffer, and
/// [`IoError::Image`] for an unknown extension or an encoding failure.
pub fn save(buffer: &PixelBuffer, path: impl AsRef<Path>) -> Result<(), IoError> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    let image = fit_for_format(to_dynamic_image(buffer)?, format);
    image.save_with_format(path, format)?;
    log::debug!("saved {} as {format:?}", path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use retouch_pipeline::Color;

    use super::*;

    fn sample(sixteen_bit: bool, has_alpha: bool) -> PixelBuffer {
        let max = if sixteen_bit { 65535 } else { 255 };
        let base = Color::opaque(10, 20, 30, sixteen_bit);
        let mut buffer = PixelBuffer::filled(3, 2, has_alpha, base);
        let alpha = if has_alpha { 77 } else { max };
        buffer.set_pixel(1, 0, Color::new(max, 0, max / 3, alpha, sixteen_bit));
        let alpha = if has_alpha { 0 } else { max };
        buffer.set_pixel(2, 1, Color::new(1, 2, 3, alpha, sixteen_bit));
        buffer
    }

    #[test]
    fn channels_are_swapped_to_rgba() {
        let image = to_dynamic_image(&sample(false, true)).unwrap();
        let rgba = image.as_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [255, 0, 85, 77]);
    }

    #[test]
    fn dynamic_round_trip_8_bit() {
        let buffer = sample(false, true);
        let back = from_dynamic_image(&to_dynamic_image(&buffer).unwrap());
        assert_eq!(back, buffer);
        assert!(back.has_alpha());
    }

    #[test]
    fn dynamic_round_trip_16_bit_without_alpha() {
        let buffer = sample(true, false);
        let image = to_dynamic_image(&buffer).unwrap();
        assert_eq!(image.color(), ColorType::Rgb16);
        let back = from_dynamic_image(&image);
        assert_eq!(back, buffer);
        assert!(!back.has_alpha());
    }

    #[test]
    fn png_keeps_16_bit() {
        let buffer = sample(true, true);
        let bytes = encode(&buffer, ImageFormat::Png).unwrap();
        assert_eq!(decode(&bytes).unwrap(), buffer);
    }

    #[test]
    fn bmp_stores_8_bit() {
        let buffer = sample(false, false);
        let bytes = encode(&buffer, ImageFormat::Bmp).unwrap();
        assert_eq!(decode(&bytes).unwrap(), buffer);
    }

    #[test]
    fn null_buffer_is_rejected() {
        assert!(matches!(
            encode(&PixelBuffer::null(), ImageFormat::Png),
            Err(IoError::NullImage)
        ));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(decode(b"not an image"), Err(IoError::Image(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        let buffer = sample(false, true);
        save(&buffer, &path).unwrap();
        assert_eq!(load(&path).unwrap(), buffer);
    }

    #[test]
    fn unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.unknown");
        assert!(matches!(save(&sample(false, false), &path), Err(IoError::Image(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(dir.path().join("absent.png")), Err(IoError::Io(_))));
    }
}
