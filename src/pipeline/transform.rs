//! Per-asset content transforms
//!
//! Decoding and re-encoding images is CPU bound, so the shipped transform
//! runs on the blocking pool rather than on the bridge worker.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{GenericImageView, ImageFormat};
use std::io::Cursor;

/// Transform applied to every fetched asset before it is archived
#[async_trait]
pub trait AssetTransform: Send + Sync {
    /// Return the bytes to store for the entry `name`
    async fn apply(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<u8>>;
}

/// Stores assets unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

#[async_trait]
impl AssetTransform for Passthrough {
    async fn apply(&self, _name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(bytes)
    }
}

/// Rotates landscape pages a quarter turn counter-clockwise
///
/// Portrait and square pages are stored byte-for-byte as fetched. Rotated
/// pages are re-encoded in their original format.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortraitOrientation;

#[async_trait]
impl AssetTransform for PortraitOrientation {
    async fn apply(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || ensure_portrait(&name, bytes))
            .await
            .map_err(|e| Error::TaskPanicked(e.to_string()))?
    }
}

/// Rotate `bytes` to portrait if the image is wider than it is tall
pub fn ensure_portrait(name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
    let transform_error = |e: image::ImageError| Error::Transform {
        name: name.to_string(),
        message: e.to_string(),
    };

    let format = image::guess_format(&bytes).map_err(transform_error)?;
    let page = image::load_from_memory_with_format(&bytes, format).map_err(transform_error)?;
    let (width, height) = page.dimensions();
    if width <= height {
        return Ok(bytes);
    }

    let rotated = page.rotate270();
    let mut out = Cursor::new(Vec::with_capacity(bytes.len()));
    rotated
        .write_to(&mut out, output_format(format))
        .map_err(transform_error)?;
    Ok(out.into_inner())
}

fn output_format(input: ImageFormat) -> ImageFormat {
    match input {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP => input,
        _ => ImageFormat::Png,
    }
}
