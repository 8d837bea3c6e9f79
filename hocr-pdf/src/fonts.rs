//! Fonts for the text layer
//!
//! The default face is the built-in Courier, which every PDF viewer has and
//! whose metrics are fixed. A TrueType file can be supplied instead; it is
//! loaded with fontdue for metrics and glyph lookup and embedded as a
//! composite font.

use crate::error::{Error, Result};
use fontdue::{Font, FontSettings};
use log::info;
use lopdf::{Object, StringFormat};
use std::path::Path;

/// Advance width of every Courier glyph, in 1/1000 em.
const COURIER_ADVANCE: f32 = 600.0;

/// PDF glyph space: 1000 units per em.
const GLYPH_SPACE: f32 = 1000.0;

/// A TrueType font loaded from disk.
#[derive(Clone)]
pub struct EmbeddedFont {
    pub font: Font,
    /// PDF-safe base font name.
    pub name: String,
    /// Raw font file, embedded as `FontFile2`.
    pub data: Vec<u8>,
}

/// Font-wide metrics of an embedded font, in glyph space units.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfFontMetrics {
    pub ascent: f32,
    pub descent: f32,
    pub cap_height: f32,
    /// `[xmin, ymin, xmax, ymax]` over all glyphs.
    pub bbox: [f32; 4],
    /// Advance of glyph 0, used for CIDs missing from `widths`.
    pub default_width: f32,
    /// Advance of every mapped BMP character, sorted by code point.
    pub widths: Vec<(u16, f32)>,
}

impl EmbeddedFont {
    /// Advance of `ch` in glyph space units, as it is encoded.
    pub fn advance(&self, ch: char) -> f32 {
        self.font.metrics(bmp_or_placeholder(ch), GLYPH_SPACE).advance_width
    }

    pub fn pdf_metrics(&self) -> PdfFontMetrics {
        let mut widths: Vec<(u16, f32)> = self
            .font
            .chars()
            .keys()
            .filter_map(|&ch| {
                let cid = u16::try_from(ch as u32).ok()?;
                Some((cid, self.advance(ch)))
            })
            .collect();
        widths.sort_by_key(|(cid, _)| *cid);

        let mut bbox = [0.0f32; 4];
        for index in 0..self.font.glyph_count() {
            let b = self.font.metrics_indexed(index, GLYPH_SPACE).bounds;
            bbox[0] = bbox[0].min(b.xmin);
            bbox[1] = bbox[1].min(b.ymin);
            bbox[2] = bbox[2].max(b.xmin + b.width);
            bbox[3] = bbox[3].max(b.ymin + b.height);
        }

        let (ascent, descent) = self
            .font
            .horizontal_line_metrics(GLYPH_SPACE)
            .map(|m| (m.ascent, m.descent))
            .unwrap_or((bbox[3], bbox[1]));
        let cap_height = if self.font.lookup_glyph_index('H') != 0 {
            let b = self.font.metrics('H', GLYPH_SPACE).bounds;
            b.ymin + b.height
        } else {
            ascent
        };

        PdfFontMetrics {
            ascent,
            descent,
            cap_height,
            bbox,
            default_width: self.font.metrics_indexed(0, GLYPH_SPACE).advance_width,
            widths,
        }
    }
}

/// Font used for every text run of a document.
#[derive(Clone)]
pub enum FontFace {
    /// One of the standard 14 Type1 fonts, WinAnsi encoded.
    Builtin { base_font: String },
    Embedded(EmbeddedFont),
}

impl Default for FontFace {
    fn default() -> Self {
        FontFace::courier()
    }
}

impl FontFace {
    pub fn courier() -> Self {
        FontFace::Builtin {
            base_font: "Courier".to_string(),
        }
    }

    /// Load a TrueType font for embedding.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Font(format!("cannot read {}: {}", path.display(), e)))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_bytes(data, &stem)
    }

    pub fn from_bytes(data: Vec<u8>, name: &str) -> Result<Self> {
        let font = Font::from_bytes(data.clone(), FontSettings::default())
            .map_err(|e| Error::Font(format!("failed to load font {}: {}", name, e)))?;
        let name = sanitize_pdf_font_name(name);
        info!("Loaded font {} ({} glyphs)", name, font.glyph_count());
        Ok(FontFace::Embedded(EmbeddedFont { font, name, data }))
    }

    /// Width of `text` set at `size`, in the same unit as `size`.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        match self {
            FontFace::Builtin { .. } => {
                text.chars().count() as f32 * COURIER_ADVANCE / 1000.0 * size
            }
            FontFace::Embedded(embedded) => {
                text.chars().map(|ch| embedded.advance(ch)).sum::<f32>() / GLYPH_SPACE * size
            }
        }
    }

    /// Encode `text` as a PDF string operand for this font.
    pub fn encode(&self, text: &str) -> Object {
        match self {
            FontFace::Builtin { .. } => {
                let bytes = text.chars().map(win_ansi_byte).collect();
                Object::String(bytes, StringFormat::Literal)
            }
            FontFace::Embedded(_) => {
                // Identity-H: two-byte CIDs equal to the UTF-16 code unit; only the BMP is mapped.
                let mut utf16be = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let unit = bmp_or_placeholder(ch) as u32 as u16;
                    utf16be.extend_from_slice(&unit.to_be_bytes());
                }
                Object::String(utf16be, StringFormat::Hexadecimal)
            }
        }
    }
}

fn bmp_or_placeholder(ch: char) -> char {
    if (ch as u32) <= 0xFFFF {
        ch
    } else {
        '?'
    }
}

/// WinAnsiEncoding code for `ch`, `?` when it has none.
pub fn win_ansi_byte(ch: char) -> u8 {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => code as u8,
        _ => match ch {
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        },
    }
}

fn sanitize_pdf_font_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('-');
        }
    }
    if out.is_empty() {
        "CustomFont".to_string()
    } else {
        out
    }
}
