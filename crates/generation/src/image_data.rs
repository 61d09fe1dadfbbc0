//! Encoded raster images exchanged with providers
//!
//! Images are kept in their encoded form (PNG, JPEG, WebP). Only the header is
//! inspected, to learn the dimensions and to reject files that are not images.
//! Pixels are decoded only to re-encode a non-PNG image as PNG.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Errors produced while loading or decoding images
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Not a decodable image: {0}")]
    Decode(String),

    #[error("Cannot encode image: {0}")]
    Encode(String),

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// An encoded image with its pixel dimensions
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Encoded bytes, serialized as base64
    #[serde(with = "base64_bytes")]
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageData {
    /// Wrap encoded bytes, probing the header for the dimensions
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
        let (width, height) = probe_dimensions(&bytes)?;
        Ok(Self {
            bytes,
            width,
            height,
        })
    }

    /// Decode a base64 payload (a `data:image/...;base64,` prefix is accepted)
    pub fn from_base64(encoded: &str) -> Result<Self, ImageError> {
        let payload = match encoded.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => encoded,
        };
        let bytes = STANDARD.decode(payload.trim())?;
        Self::from_bytes(bytes)
    }

    /// Read and probe an image file
    pub async fn load(path: &Path) -> Result<Self, ImageError> {
        let bytes = fs::read(path).await?;
        log::debug!("Read {} bytes from '{}'", bytes.len(), path.display());
        Self::from_bytes(bytes)
    }

    /// Write the encoded bytes to disk, creating parent directories if needed
    pub async fn save(&self, path: &Path) -> Result<(), ImageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, &self.bytes).await?;
        log::debug!("Wrote {} bytes to '{}'", self.bytes.len(), path.display());
        Ok(())
    }

    /// Encode as standard base64 (no data URL prefix)
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_png(&self) -> bool {
        self.bytes.starts_with(PNG_SIGNATURE)
    }

    /// The same image encoded as PNG; JPEG and WebP are decoded and re-encoded
    pub fn to_png(&self) -> Result<Self, ImageError> {
        if self.is_png() {
            return Ok(self.clone());
        }

        let decoded = image::load_from_memory(&self.bytes)
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        let mut out = Cursor::new(Vec::new());
        decoded
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        log::debug!(
            "Re-encoded {}x{} image as PNG ({} -> {} bytes)",
            self.width,
            self.height,
            self.bytes.len(),
            out.get_ref().len()
        );

        Ok(Self {
            bytes: out.into_inner(),
            width: self.width,
            height: self.height,
        })
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| ImageError::Decode(e.to_string()))
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::tempdir;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 100, 50]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_to_png_reencodes_jpeg() {
        let original = ImageData::from_bytes(jpeg(9, 4)).unwrap();
        assert!(!original.is_png());

        let converted = original.to_png().unwrap();
        assert!(converted.is_png());
        assert_eq!(converted.dimensions(), (9, 4));
        assert_eq!(
            ImageData::from_bytes(converted.bytes().to_vec()).unwrap().dimensions(),
            (9, 4)
        );
    }

    #[test]
    fn test_to_png_keeps_png_bytes() {
        let original = ImageData::from_bytes(png(3, 3)).unwrap();
        assert!(original.is_png());
        assert_eq!(original.to_png().unwrap(), original);
    }

    #[test]
    fn test_probe_png_dimensions() {
        let image = ImageData::from_bytes(png(7, 3)).unwrap();
        assert_eq!(image.dimensions(), (7, 3));
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let err = ImageData::from_bytes(b"definitely not a png".to_vec()).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn test_base64_with_data_url_prefix() {
        let original = ImageData::from_bytes(png(2, 2)).unwrap();
        let url = format!("data:image/png;base64,{}", original.to_base64());
        let decoded = ImageData::from_base64(&url).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_invalid_base64() {
        let err = ImageData::from_base64("@@@not base64@@@").unwrap_err();
        assert!(matches!(err, ImageError::Base64(_)));
    }

    #[test]
    fn test_serde_uses_base64_string() {
        let image = ImageData::from_bytes(png(1, 1)).unwrap();
        let json = serde_json::to_value(&image).unwrap();
        assert!(json["bytes"].is_string());
        assert_eq!(json["width"], 1);
        let back: ImageData = serde_json::from_value(json).unwrap();
        assert_eq!(back, image);
    }

    #[tokio::test]
    async fn test_save_creates_directories_and_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/canvas.png");
        let image = ImageData::from_bytes(png(4, 5)).unwrap();

        image.save(&path).await.unwrap();
        assert!(path.exists());

        let loaded = ImageData::load(&path).await.unwrap();
        assert_eq!(loaded.dimensions(), (4, 5));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = ImageData::load(&dir.path().join("missing.png")).await.unwrap_err();
        assert!(matches!(err, ImageError::Io(_)));
    }
}
