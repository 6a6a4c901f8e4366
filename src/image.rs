//! Image resources addressed by content hash.

use crate::error::{ConversionError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// English Metric Units per CSS pixel (96 dpi).
pub const EMU_PER_PX: u64 = 9525;

/// English Metric Units per twip.
pub const EMU_PER_TWIP: u64 = 635;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.starts_with(b"BM") && bytes.len() > 26 {
            Some(ImageFormat::Bmp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
        }
    }
}

/// Image extent in EMU for a pixel size.
pub fn px_to_emu(px: u32) -> u64 {
    px as u64 * EMU_PER_PX
}

fn be16(b: &[u8], at: usize) -> Option<u32> {
    Some(u16::from_be_bytes([*b.get(at)?, *b.get(at + 1)?]) as u32)
}

fn le16(b: &[u8], at: usize) -> Option<u32> {
    Some(u16::from_le_bytes([*b.get(at)?, *b.get(at + 1)?]) as u32)
}

fn be32(b: &[u8], at: usize) -> Option<u32> {
    let s = b.get(at..at + 4)?;
    Some(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
}

fn le32(b: &[u8], at: usize) -> Option<i32> {
    let s = b.get(at..at + 4)?;
    Some(i32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

fn jpeg_dimensions(b: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 3 < b.len() {
        if b[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = b[i + 1];
        match marker {
            0xFF => i += 1,
            0x01 | 0xD0..=0xD9 => i += 2,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let h = be16(b, i + 5)?;
                let w = be16(b, i + 7)?;
                return Some((w, h));
            }
            _ => i += 2 + be16(b, i + 2)? as usize,
        }
    }
    None
}

/// Intrinsic pixel size read from the image header.
pub fn dimensions(bytes: &[u8], format: ImageFormat) -> Option<(u32, u32)> {
    let (w, h) = match format {
        ImageFormat::Png => (be32(bytes, 16)?, be32(bytes, 20)?),
        ImageFormat::Gif => (le16(bytes, 6)?, le16(bytes, 8)?),
        ImageFormat::Bmp => (
            le32(bytes, 18)?.unsigned_abs(),
            le32(bytes, 22)?.unsigned_abs(),
        ),
        ImageFormat::Jpeg => jpeg_dimensions(bytes)?,
    };
    (w > 0 && h > 0).then_some((w, h))
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Decode a `data:` URI. Only base64 payloads are accepted.
pub fn decode_data_uri(src: &str) -> Result<Vec<u8>> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| ConversionError::resource(abbreviate(src), "not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ConversionError::resource(abbreviate(src), "data URI has no payload"))?;
    if !header.split(';').any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ConversionError::resource(
            abbreviate(src),
            "only base64 data URIs are supported",
        ));
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| ConversionError::resource(abbreviate(src), format!("invalid base64: {e}")))
}

/// Data URIs can be megabytes long; keep error messages readable.
pub fn abbreviate(src: &str) -> String {
    const MAX: usize = 64;
    if src.len() <= MAX {
        return src.to_string();
    }
    let mut end = MAX;
    while !src.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &src[..end])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
    /// Intrinsic size in pixels, when the header could be read.
    pub size: Option<(u32, u32)>,
}

/// Images referenced by a document, keyed by content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    images: BTreeMap<String, ImageData>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return their content hash. Identical images share
    /// one entry.
    pub fn insert(&mut self, src: &str, bytes: Vec<u8>) -> Result<String> {
        let format = ImageFormat::sniff(&bytes)
            .ok_or_else(|| ConversionError::resource(abbreviate(src), "unsupported image format"))?;
        let hash = content_hash(&bytes);
        let size = dimensions(&bytes, format);
        self.images
            .entry(hash.clone())
            .or_insert(ImageData { format, bytes, size });
        Ok(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&ImageData> {
        self.images.get(hash)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ImageData)> {
        self.images.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 1x1 transparent PNG.
    pub(crate) const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    pub(crate) fn pixel_png() -> Vec<u8> {
        STANDARD.decode(PIXEL_PNG).unwrap()
    }

    #[test]
    fn sniffs_png_and_reads_size() {
        let png = pixel_png();
        assert_eq!(ImageFormat::sniff(&png), Some(ImageFormat::Png));
        assert_eq!(dimensions(&png, ImageFormat::Png), Some((1, 1)));
    }

    #[test]
    fn reads_gif_size() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x20, 0x00, 0x10, 0x00, 0, 0, 0]);
        assert_eq!(ImageFormat::sniff(&gif), Some(ImageFormat::Gif));
        assert_eq!(dimensions(&gif, ImageFormat::Gif), Some((32, 16)));
    }

    #[test]
    fn reads_jpeg_size_past_app_segments() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00];
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x30, 0x00, 0x40]);
        assert_eq!(ImageFormat::sniff(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(dimensions(&jpeg, ImageFormat::Jpeg), Some((64, 48)));
    }

    #[test]
    fn decodes_base64_data_uri() {
        let src = format!("data:image/png;base64,{PIXEL_PNG}");
        assert_eq!(decode_data_uri(&src).unwrap(), pixel_png());
        let err = decode_data_uri("data:text/plain,hello").unwrap_err();
        assert_eq!(err.code(), "RESOURCE");
    }

    #[test]
    fn identical_images_share_one_entry() {
        let mut set = ImageSet::new();
        let a = set.insert("a.png", pixel_png()).unwrap();
        let b = set.insert("b.png", pixel_png()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rejects_unknown_formats() {
        let err = ImageSet::new().insert("x.txt", b"plain text".to_vec()).unwrap_err();
        assert!(matches!(err, ConversionError::Resource { .. }));
    }
}
