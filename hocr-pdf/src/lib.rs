//! hOCR to PDF converter
//!
//! Parses hOCR markup into a page tree, renders each page as a list of drawing
//! commands (scanned image, optional box outlines, positioned text) and writes
//! them out as a searchable multi-page PDF. A plain-text mode emits one line
//! per `ocr_line` instead.

pub mod error;
pub mod fonts;
pub mod geometry;
pub mod image_source;
pub mod model;
pub mod options;
pub mod parser;
pub mod render;
pub mod serializer;
pub mod text;
pub mod walker;

// Re-export commonly used functions and types
pub use error::{Error, Result};
pub use fonts::FontFace;
pub use geometry::{reconcile, Rect, SourceCoordinateConvention};
pub use model::{BBox, Document, Element, ElementKind, Node, Page};
pub use options::{ConvertOptions, OutputFormat, PageSize, TextGranularity};
pub use parser::parse_document;
pub use render::{DrawCommand, PageRenderer, RenderedPage};
pub use serializer::{serialize_pdf, serialize_text, PdfSerializer};
pub use text::{extract_text, to_text_string};

use image_source::ImagePolicy;
use log::{error, info};
use std::ffi::CStr;
use std::io::Write;
use std::os::raw::{c_char, c_int};
use std::path::Path;

/// A parsed hOCR document together with the options used to convert it.
pub struct Converter {
    document: Document,
    options: ConvertOptions,
}

impl Converter {
    pub fn from_bytes(input: &[u8], options: ConvertOptions) -> Result<Self> {
        options.validate()?;
        let document = parse_document(input)?;
        info!("parsed hOCR document with {} page(s)", document.page_count());
        Ok(Self { document, options })
    }

    pub fn from_path(path: &Path, options: ConvertOptions) -> Result<Self> {
        let input = std::fs::read(path)?;
        Self::from_bytes(&input, options)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Render every page, loading page images when they are enabled.
    pub fn render(&self) -> Result<Vec<RenderedPage>> {
        let mut pages = Vec::with_capacity(self.document.page_count());
        self.render_each(|page| {
            pages.push(page);
            Ok(())
        })?;
        Ok(pages)
    }

    /// Render pages one at a time in document order, handing each to `sink`.
    fn render_each<F>(&self, mut sink: F) -> Result<()>
    where
        F: FnMut(RenderedPage) -> Result<()>,
    {
        let policy = ImagePolicy::from_options(&self.options);
        let mut renderer = PageRenderer::new(&self.options);
        for (index, page) in self.document.pages.iter().enumerate() {
            let image = if self.options.include_images {
                policy.load(index, page, self.options.strict_images)?
            } else {
                None
            };
            sink(renderer.render_page(page, image)?)?;
        }
        Ok(())
    }

    fn font(&self) -> Result<FontFace> {
        match &self.options.font_path {
            Some(path) => FontFace::load(path),
            None => Ok(FontFace::courier()),
        }
    }

    pub fn to_pdf<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.build_pdf()?.finish(writer)
    }

    /// Write the PDF to `path`; nothing is created when conversion fails.
    pub fn to_pdf_file(&self, path: &Path) -> Result<()> {
        self.build_pdf()?.save(path)
    }

    fn build_pdf(&self) -> Result<PdfSerializer> {
        if self.document.is_empty() {
            return Err(Error::EmptyDocument);
        }
        let mut serializer = PdfSerializer::new(self.font()?)?;
        self.render_each(|page| serializer.add_page(&page))?;
        Ok(serializer)
    }

    pub fn to_text<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.document.is_empty() {
            return Err(Error::EmptyDocument);
        }
        serialize_text(extract_text(&self.document), writer)
    }

    /// Write the output format selected in the options.
    pub fn convert<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self.options.output_format {
            OutputFormat::Pdf => self.to_pdf(writer),
            OutputFormat::Text => self.to_text(writer),
        }
    }
}

/// Convert the hOCR file at `input` and write the result to `output`.
///
/// The output file is written only once the whole conversion has succeeded.
pub fn convert_file(input: &Path, output: &Path, options: &ConvertOptions) -> Result<()> {
    let converter = Converter::from_path(input, options.clone())?;
    let mut buffer = Vec::new();
    converter.convert(&mut buffer)?;
    std::fs::write(output, &buffer)?;
    info!("wrote {} ({} bytes)", output.display(), buffer.len());
    Ok(())
}

unsafe fn c_str_arg(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// C entry point: convert an hOCR file. `options_json` may be null.
///
/// Returns 0 on success and -1 on failure.
///
/// # Safety
///
/// Every non-null pointer must reference a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hocr_convert_file(
    input_path: *const c_char,
    output_path: *const c_char,
    options_json: *const c_char,
) -> c_int {
    let (Some(input_path), Some(output_path)) = (c_str_arg(input_path), c_str_arg(output_path))
    else {
        error!("hocr_convert_file: input and output paths are required");
        return -1;
    };

    let options = match c_str_arg(options_json) {
        Some(json) => match ConvertOptions::from_json(&json) {
            Ok(options) => options,
            Err(e) => {
                error!("hocr_convert_file: {}", e);
                return -1;
            }
        },
        None => ConvertOptions::default(),
    };

    match convert_file(Path::new(&input_path), Path::new(&output_path), &options) {
        Ok(()) => 0, // Success
        Err(e) => {
            error!("hOCR conversion failed: {}", e);
            -1 // Error
        }
    }
}
