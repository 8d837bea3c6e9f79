//! Page images: locating, decoding and preparing them for PDF embedding.

use crate::error::{Error, Result};
use crate::model::Page;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, ImageFormat};
use log::{debug, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

/// How the image bytes are stored in the PDF stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    /// JPEG data copied as-is.
    Dct,
    /// Raw samples compressed with zlib.
    Flate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageColorSpace {
    Gray,
    Rgb,
}

impl ImageColorSpace {
    pub fn pdf_name(&self) -> &'static [u8] {
        match self {
            ImageColorSpace::Gray => b"DeviceGray",
            ImageColorSpace::Rgb => b"DeviceRGB",
        }
    }
}

/// A decoded page image ready to become an image XObject.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Horizontal and vertical resolution, when the file declares one.
    pub dpi: Option<(f32, f32)>,
    pub color_space: ImageColorSpace,
    pub filter: ImageFilter,
    pub data: Vec<u8>,
}

impl PageImage {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::image(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes).map_err(|e| Error::image(path, e))?;
        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| Error::image(path, e))?;
        let dpi = read_dpi(bytes);
        let (width, height) = (decoded.width(), decoded.height());
        let gray = matches!(
            decoded.color(),
            ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
        );

        // DCT data is only usable as-is for one or three components; CMYK and
        // YCCK JPEGs are re-encoded from their decoded samples.
        let passthrough = if format == ImageFormat::Jpeg {
            match jpeg_components(bytes) {
                Some(1) => Some(ImageColorSpace::Gray),
                Some(3) => Some(ImageColorSpace::Rgb),
                _ => None,
            }
        } else {
            None
        };

        let (filter, color_space, data) = match passthrough {
            Some(color_space) => (ImageFilter::Dct, color_space, bytes.to_vec()),
            None => {
                let (color_space, samples) = if gray {
                    (ImageColorSpace::Gray, decoded.to_luma8().into_raw())
                } else {
                    (ImageColorSpace::Rgb, decoded.to_rgb8().into_raw())
                };
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&samples)?;
                (ImageFilter::Flate, color_space, encoder.finish()?)
            }
        };

        debug!(
            "image {}: {}x{} px, dpi {:?}, {:?}",
            path.display(),
            width,
            height,
            dpi,
            filter
        );

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            dpi,
            color_space,
            filter,
            data,
        })
    }
}

/// Resolution declared in a PNG `pHYs` chunk or a JPEG JFIF header.
pub fn read_dpi(bytes: &[u8]) -> Option<(f32, f32)> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        png_dpi(bytes)
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        jfif_dpi(bytes)
    } else {
        None
    }
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn png_dpi(bytes: &[u8]) -> Option<(f32, f32)> {
    let mut offset = 8;
    while offset + 8 <= bytes.len() {
        let length = be_u32(bytes, offset)? as usize;
        let kind = bytes.get(offset + 4..offset + 8)?;
        let data = offset + 8;
        match kind {
            b"pHYs" => {
                let x = be_u32(bytes, data)?;
                let y = be_u32(bytes, data + 4)?;
                // Unit 1 is pixels per metre; unit 0 only gives an aspect ratio.
                if *bytes.get(data + 8)? != 1 || x == 0 || y == 0 {
                    return None;
                }
                return Some((x as f32 * 0.0254, y as f32 * 0.0254));
            }
            b"IDAT" | b"IEND" => return None,
            _ => offset = data + length + 4,
        }
    }
    None
}

fn jfif_dpi(bytes: &[u8]) -> Option<(f32, f32)> {
    let mut offset = 2;
    while offset + 4 <= bytes.len() {
        if bytes[offset] != 0xFF {
            return None;
        }
        let marker = bytes[offset + 1];
        let length = be_u16(bytes, offset + 2)? as usize;
        if marker == 0xE0 && bytes.get(offset + 4..offset + 9) == Some(&b"JFIF\0"[..]) {
            let units = *bytes.get(offset + 11)?;
            let x = be_u16(bytes, offset + 12)? as f32;
            let y = be_u16(bytes, offset + 14)? as f32;
            if x == 0.0 || y == 0.0 {
                return None;
            }
            return match units {
                1 => Some((x, y)),
                2 => Some((x * 2.54, y * 2.54)),
                _ => None,
            };
        }
        // Start of scan: no JFIF header before the image data.
        if marker == 0xDA {
            return None;
        }
        offset += 2 + length;
    }
    None
}

/// Component count from the first JPEG frame header.
pub fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut offset = 2;
    while offset + 4 <= bytes.len() {
        if bytes[offset] != 0xFF {
            return None;
        }
        let marker = bytes[offset + 1];
        let length = be_u16(bytes, offset + 2)? as usize;
        match marker {
            // SOF0..SOF15, minus DHT, JPG and DAC.
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                return bytes.get(offset + 9).copied();
            }
            0xDA => return None,
            _ => offset += 2 + length,
        }
    }
    None
}

/// Decides which image file belongs to which page.
///
/// Explicit paths always win over the `image`/`file` reference inside the
/// hOCR; when there are fewer explicit paths than pages the last one repeats.
#[derive(Debug, Clone, Default)]
pub struct ImagePolicy {
    pub explicit: Vec<PathBuf>,
    pub ignore_hocr: bool,
    pub base_dir: Option<PathBuf>,
}

impl ImagePolicy {
    pub fn from_options(options: &crate::options::ConvertOptions) -> Self {
        Self {
            explicit: options.image_paths.clone(),
            ignore_hocr: options.ignore_hocr_images,
            base_dir: options.image_base_dir.clone(),
        }
    }

    /// Image path for the page at `index` (0-based), if any.
    pub fn resolve(&self, index: usize, page: &Page) -> Option<PathBuf> {
        if let Some(path) = self.explicit.get(index).or_else(|| self.explicit.last()) {
            if page.image().is_some() {
                debug!("page {}: hOCR image overridden by {}", page.number, path.display());
            }
            return Some(path.clone());
        }
        if self.ignore_hocr {
            return None;
        }
        let reference = Path::new(page.image()?);
        match &self.base_dir {
            Some(dir) if reference.is_relative() => Some(dir.join(reference)),
            _ => Some(reference.to_path_buf()),
        }
    }

    /// Load the page image; a failure is fatal only when `strict` is set.
    pub fn load(&self, index: usize, page: &Page, strict: bool) -> Result<Option<PageImage>> {
        let Some(path) = self.resolve(index, page) else {
            debug!("page {}: no image", page.number);
            return Ok(None);
        };
        match PageImage::load(&path) {
            Ok(image) => Ok(Some(image)),
            Err(err) if strict => Err(err),
            Err(err) => {
                warn!("page {}: {}; continuing without image", page.number, err);
                Ok(None)
            }
        }
    }
}
