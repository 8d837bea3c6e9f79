//! Page rendering
//!
//! Turns one hOCR page into a list of drawing commands in page space. The
//! commands are replayed by the PDF serializer in emission order, so the page
//! image always goes first and the text layer sits on top of it.

use crate::error::Result;
use crate::geometry::{reconcile, Rect, SourceCoordinateConvention};
use crate::image_source::PageImage;
use crate::model::{Element, ElementKind, Page};
use crate::options::{ConvertOptions, PageSize};
use crate::walker::{walk_page, PageVisitor};
use log::{debug, info, warn};

/// RGB colour with components in `0.0..=1.0`.
pub type Color = (f32, f32, f32);

/// Stroke colour of a bounding box for each element kind.
pub fn box_color(kind: ElementKind) -> Color {
    match kind {
        ElementKind::Line => (0.0, 1.0, 0.0),
        ElementKind::Word => (0.0, 1.0, 1.0),
        ElementKind::Block => (1.0, 1.0, 0.0),
        ElementKind::Paragraph => (1.0, 0.0, 0.0),
        _ => (0.0, 0.0, 0.0),
    }
}

/// Fill colour of visible text for each element kind.
pub fn text_color(kind: ElementKind) -> Color {
    match kind {
        ElementKind::Block | ElementKind::Paragraph => (1.0, 0.0, 0.0),
        _ => (0.0, 0.0, 0.0),
    }
}

/// One drawing primitive in page space (hOCR units, bottom-left origin).
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Stroke the outline of a box.
    Rectangle { rect: Rect, kind: ElementKind },
    /// Place a single run of text with its baseline origin at `rect`'s bottom-left.
    Text {
        rect: Rect,
        text: String,
        font_size: f32,
        visible: bool,
        kind: ElementKind,
    },
    /// Paint the page image scaled into `rect`.
    Image { rect: Rect },
}

impl DrawCommand {
    pub fn is_text(&self) -> bool {
        matches!(self, DrawCommand::Text { .. })
    }
}

/// Where the page size came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSizeSource {
    Declared,
    Image,
    TextExtent,
    Default,
}

/// A page ready for serialization.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub number: u32,
    pub width: f32,
    pub height: f32,
    pub size_source: PageSizeSource,
    /// PDF points per hOCR unit, horizontally and vertically.
    pub scale: (f32, f32),
    pub image: Option<PageImage>,
    pub commands: Vec<DrawCommand>,
}

impl RenderedPage {
    /// Page size in PDF points.
    pub fn media_box(&self) -> (f32, f32) {
        (self.width * self.scale.0, self.height * self.scale.1)
    }

    pub fn text_commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands.iter().filter(|c| c.is_text())
    }
}

/// Resolve the page size: declared bbox, then image pixels, then text extent, then the default.
pub fn resolve_page_size(
    page: &Page,
    image: Option<&PageImage>,
    fallback: PageSize,
) -> (f32, f32, PageSizeSource) {
    if let Some((w, h)) = page.declared_size() {
        return (w, h, PageSizeSource::Declared);
    }
    if let Some(image) = image.filter(|i| i.width > 0 && i.height > 0) {
        return (image.width as f32, image.height as f32, PageSizeSource::Image);
    }
    if let Some((w, h)) = page.text_extent() {
        return (w, h, PageSizeSource::TextExtent);
    }
    (fallback.width, fallback.height, PageSizeSource::Default)
}

/// Renders pages according to a set of options.
pub struct PageRenderer<'a> {
    options: &'a ConvertOptions,
    convention: SourceCoordinateConvention,
    text_kind: ElementKind,
    page_height: f32,
    commands: Vec<DrawCommand>,
}

impl<'a> PageRenderer<'a> {
    pub fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            convention: options.convention(),
            text_kind: options.granularity.kind(),
            page_height: 0.0,
            commands: Vec::new(),
        }
    }

    /// Produce the drawing commands for `page`, with `image` underneath when given.
    pub fn render_page(&mut self, page: &Page, image: Option<PageImage>) -> Result<RenderedPage> {
        let (width, height, size_source) =
            resolve_page_size(page, image.as_ref(), self.options.default_page_size);
        match size_source {
            PageSizeSource::Declared => {}
            PageSizeSource::Default => warn!(
                "page {}: no size in hOCR, image or text; using default {}x{}",
                page.number, width, height
            ),
            source => info!(
                "page {}: size {}x{} taken from {:?}",
                page.number, width, height, source
            ),
        }

        let scale = self.page_scale(width, height, image.as_ref());

        self.page_height = height;
        self.commands.clear();
        if image.is_some() {
            self.commands.push(DrawCommand::Image {
                rect: Rect::new(0.0, 0.0, width, height),
            });
        }
        walk_page(page, self)?;

        let commands = std::mem::take(&mut self.commands);
        info!(
            "page {}: {}x{} units, {} command(s)",
            page.number,
            width,
            height,
            commands.len()
        );

        Ok(RenderedPage {
            number: page.number,
            width,
            height,
            size_source,
            scale,
            image,
            commands,
        })
    }

    /// Points per hOCR unit. An image with a known DPI fixes the physical page
    /// size; otherwise hOCR units are taken to be at the default DPI.
    fn page_scale(&self, width: f32, height: f32, image: Option<&PageImage>) -> (f32, f32) {
        let default = 72.0 / self.options.default_dpi;
        match image {
            Some(image) if image.width > 0 && image.height > 0 => match image.dpi {
                Some((dpi_x, dpi_y)) if dpi_x > 0.0 && dpi_y > 0.0 => {
                    let page_w_pt = image.width as f32 / dpi_x * 72.0;
                    let page_h_pt = image.height as f32 / dpi_y * 72.0;
                    (page_w_pt / width, page_h_pt / height)
                }
                _ => (default, default),
            },
            _ => (default, default),
        }
    }
}

impl PageRenderer<'_> {
    /// Whether `element` gets its own text run. Under word granularity a line
    /// without word elements (as ocropus writes them) is placed whole.
    fn places_text(&self, element: &Element) -> bool {
        if element.kind == self.text_kind {
            return true;
        }
        self.text_kind == ElementKind::Word
            && element.kind == ElementKind::Line
            && !element
                .descendants()
                .skip(1)
                .any(|e| e.kind == ElementKind::Word)
    }
}

impl PageVisitor for PageRenderer<'_> {
    fn visit_element(&mut self, element: &Element, _depth: usize) -> Result<()> {
        if !element.kind.is_structural() {
            return Ok(());
        }
        let Some(bbox) = element.bbox else {
            return Ok(());
        };
        let rect = reconcile(&bbox, self.page_height, self.convention);

        if self.options.draw_bounding_boxes {
            self.commands.push(DrawCommand::Rectangle {
                rect,
                kind: element.kind,
            });
        }

        if self.options.draw_text && self.places_text(element) {
            let text = element.normalized_text();
            if text.is_empty() {
                return Ok(());
            }
            debug!("{:?} {:?} -> {:?}: {}", element.kind, bbox, rect, text);
            self.commands.push(DrawCommand::Text {
                rect,
                text,
                font_size: rect.height * self.options.font_scale,
                visible: self.options.text_visible,
                kind: element.kind,
            });
        }
        Ok(())
    }
}
