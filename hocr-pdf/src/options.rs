//! Conversion options and configuration.

use crate::error::Result;
use crate::geometry::SourceCoordinateConvention;
use crate::model::ElementKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Resolution assumed for hOCR coordinates when no image DPI is known.
pub const DEFAULT_DPI: f32 = 300.0;

/// US Letter at [`DEFAULT_DPI`], used when a page declares no size at all.
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize {
    width: 2550.0,
    height: 3300.0,
};

/// Output artifact produced by a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pdf,
    Text,
}

/// Which elements carry the positioned text runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextGranularity {
    #[default]
    Word,
    Line,
}

impl TextGranularity {
    pub fn kind(&self) -> ElementKind {
        match self {
            TextGranularity::Word => ElementKind::Word,
            TextGranularity::Line => ElementKind::Line,
        }
    }
}

/// Page size in hOCR units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Options controlling how an hOCR document is converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Stroke a rectangle around every block, paragraph, line and word
    pub draw_bounding_boxes: bool,

    /// Place positioned text runs
    pub draw_text: bool,

    /// Source coordinates have a top-left origin and must be flipped
    pub invert_coordinates: bool,

    /// Put the page image underneath the text
    pub include_images: bool,

    /// Draw text with visible ink instead of the invisible render mode
    pub text_visible: bool,

    pub output_format: OutputFormat,

    pub granularity: TextGranularity,

    /// Font size as a fraction of the reconciled box height
    pub font_scale: f32,

    /// Resolution assumed for hOCR coordinates without image DPI
    pub default_dpi: f32,

    /// Fallback page size when neither markup, image nor text gives one
    pub default_page_size: PageSize,

    /// TrueType font to embed instead of the built-in Courier
    pub font_path: Option<PathBuf>,

    /// Explicit page images; the last one repeats for remaining pages
    pub image_paths: Vec<PathBuf>,

    /// Never use the image referenced from the hOCR `title`
    pub ignore_hocr_images: bool,

    /// Directory relative hOCR image references resolve against
    pub image_base_dir: Option<PathBuf>,

    /// Fail instead of warning when a page image cannot be loaded
    pub strict_images: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            draw_bounding_boxes: false,
            draw_text: true,
            invert_coordinates: false,
            include_images: false,
            text_visible: false,
            output_format: OutputFormat::Pdf,
            granularity: TextGranularity::Word,
            font_scale: 1.0,
            default_dpi: DEFAULT_DPI,
            default_page_size: DEFAULT_PAGE_SIZE,
            font_path: None,
            image_paths: Vec::new(),
            ignore_hocr_images: false,
            image_base_dir: None,
            strict_images: false,
        }
    }
}

impl ConvertOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: ConvertOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn convention(&self) -> SourceCoordinateConvention {
        SourceCoordinateConvention::from_invert(self.invert_coordinates)
    }

    /// Reject values that would produce an unusable page.
    pub fn validate(&self) -> Result<()> {
        if !(self.font_scale.is_finite() && self.font_scale > 0.0) {
            return Err(crate::Error::Options(format!(
                "font_scale must be positive, got {}",
                self.font_scale
            )));
        }
        if !(self.default_dpi.is_finite() && self.default_dpi > 0.0) {
            return Err(crate::Error::Options(format!(
                "default_dpi must be positive, got {}",
                self.default_dpi
            )));
        }
        let size = self.default_page_size;
        if !(size.width > 0.0 && size.height > 0.0) {
            return Err(crate::Error::Options(format!(
                "default_page_size must be positive, got {}x{}",
                size.width, size.height
            )));
        }
        Ok(())
    }

    pub fn with_bounding_boxes(mut self, draw: bool) -> Self {
        self.draw_bounding_boxes = draw;
        self
    }

    pub fn with_text(mut self, draw: bool) -> Self {
        self.draw_text = draw;
        self
    }

    pub fn with_inverted_coordinates(mut self, invert: bool) -> Self {
        self.invert_coordinates = invert;
        self
    }

    pub fn with_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }

    pub fn with_visible_text(mut self, visible: bool) -> Self {
        self.text_visible = visible;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_granularity(mut self, granularity: TextGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_paths.push(path.into());
        self
    }

    pub fn with_image_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_base_dir = Some(dir.into());
        self
    }

    pub fn with_strict_images(mut self, strict: bool) -> Self {
        self.strict_images = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConvertOptions::default();
        assert!(options.draw_text);
        assert!(!options.text_visible);
        assert!(!options.draw_bounding_boxes);
        assert_eq!(options.output_format, OutputFormat::Pdf);
        assert_eq!(options.granularity, TextGranularity::Word);
        assert_eq!(options.convention(), SourceCoordinateConvention::BottomLeft);
        assert_eq!(options.default_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_builder() {
        let options = ConvertOptions::new()
            .with_inverted_coordinates(true)
            .with_visible_text(true)
            .with_granularity(TextGranularity::Line)
            .with_image_path("a.png")
            .with_image_path("b.png");
        assert_eq!(options.convention(), SourceCoordinateConvention::TopLeft);
        assert!(options.text_visible);
        assert_eq!(options.granularity.kind(), ElementKind::Line);
        assert_eq!(options.image_paths.len(), 2);
    }

    #[test]
    fn test_from_json_partial() {
        let options = ConvertOptions::from_json(
            r#"{"invert_coordinates": true, "output_format": "text", "granularity": "line"}"#,
        )
        .unwrap();
        assert!(options.invert_coordinates);
        assert_eq!(options.output_format, OutputFormat::Text);
        assert_eq!(options.granularity, TextGranularity::Line);
        assert!(options.draw_text);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(ConvertOptions::from_json(r#"{"font_scale": 0}"#).is_err());
        assert!(ConvertOptions::from_json(r#"{"output_format": "docx"}"#).is_err());
        assert!(ConvertOptions::from_json("not json").is_err());
    }
}
