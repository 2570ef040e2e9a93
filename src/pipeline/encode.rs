//! Image encoding: `DynamicImage` → base64 PNG.
//!
//! PNG is lossless; JPEG artefacts around rendered glyphs measurably hurt
//! the model's reading of small print, tables and formulae.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as base64 PNG (no `data:` prefix).
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );
    Ok(b64)
}
