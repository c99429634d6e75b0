use crate::error::{Error, Result};
use base64::Engine;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

pub fn decode_overlay(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Top-left corner that puts `overlay` flush with the bottom-right corner of
/// `base`. Negative when the overlay is larger than the page.
pub fn overlay_offset(base: (u32, u32), overlay: (u32, u32)) -> (i64, i64) {
    (
        i64::from(base.0) - i64::from(overlay.0),
        i64::from(base.1) - i64::from(overlay.1),
    )
}

/// Draws `overlay` over `base`, bottom-right aligned and unscaled. Parts of
/// an oversized overlay that fall outside the page are clipped; the result
/// always has the base's dimensions.
pub fn composite_overlay(mut base: RgbaImage, overlay: Option<&RgbaImage>) -> RgbaImage {
    let Some(overlay) = overlay else {
        return base;
    };
    let (x, y) = overlay_offset(base.dimensions(), overlay.dimensions());
    imageops::overlay(&mut base, overlay, x, y);
    base
}

pub fn encode_png_base64(image: &RgbaImage) -> Result<String> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(Error::Image)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}
