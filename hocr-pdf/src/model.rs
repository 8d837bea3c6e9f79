//! hOCR document model
//!
//! A parsed hOCR file is a `Document` owning its `Page`s, each of which owns an
//! `Element` tree mirroring the source markup. The tree is never mutated after
//! parsing; rendering and text extraction only read it.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Bounding box in hOCR native space (top-left origin, y increasing downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Build a box, swapping reversed corners so that `x1 >= x0` and `y1 >= y0`.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Zero width or zero height.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Structural role of an element, derived from its hOCR `class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Page,
    Block,
    Paragraph,
    Line,
    Word,
    Unknown,
}

impl ElementKind {
    /// Map a single hOCR class name to a kind.
    pub fn from_class(class: &str) -> Self {
        match class {
            "ocr_page" => ElementKind::Page,
            "ocr_carea" | "ocr_block" | "ocrx_block" => ElementKind::Block,
            "ocr_par" => ElementKind::Paragraph,
            "ocr_line" | "ocrx_line" | "ocr_textfloat" | "ocr_header" | "ocr_caption" => {
                ElementKind::Line
            }
            "ocrx_word" | "ocr_word" => ElementKind::Word,
            _ => ElementKind::Unknown,
        }
    }

    /// Kind of a whitespace separated `class` attribute; the first recognised class wins.
    pub fn from_class_attr(attr: &str) -> Self {
        attr.split_whitespace()
            .map(Self::from_class)
            .find(|kind| *kind != ElementKind::Unknown)
            .unwrap_or(ElementKind::Unknown)
    }

    /// Block, paragraph, line and word carry OCR geometry worth drawing.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ElementKind::Block | ElementKind::Paragraph | ElementKind::Line | ElementKind::Word
        )
    }
}

/// Child of an element: a nested element or a text node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One markup element of the hOCR tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    /// Local tag name, e.g. `span` or `div`.
    pub tag: String,
    pub bbox: Option<BBox>,
    /// `image` / `file` reference from the `title` attribute.
    pub image: Option<String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(kind: ElementKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
            bbox: None,
            image: None,
            children: Vec::new(),
        }
    }

    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Direct child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Raw aggregated text: every descendant text node concatenated in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out, false);
        out
    }

    /// Text as rendered and extracted.
    ///
    /// Word boundaries count as whitespace, whitespace runs collapse to a single
    /// space, and the result is trimmed and NFC-normalised.
    pub fn normalized_text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw, true);
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .nfc()
            .collect()
    }

    fn collect_text(&self, out: &mut String, word_breaks: bool) {
        enum Step<'a> {
            Visit(&'a Node),
            Break,
        }

        let mut stack: Vec<Step<'_>> = self.children.iter().rev().map(Step::Visit).collect();
        while let Some(step) = stack.pop() {
            match step {
                Step::Break => out.push(' '),
                Step::Visit(Node::Text(text)) => out.push_str(text),
                Step::Visit(Node::Element(child)) => {
                    if word_breaks && child.kind == ElementKind::Word {
                        out.push(' ');
                        stack.push(Step::Break);
                    }
                    stack.extend(child.children.iter().rev().map(Step::Visit));
                }
            }
        }
    }

    /// Lazy pre-order traversal of this element and all nested elements.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

// The derived drop would recurse once per nesting level.
impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let Node::Element(mut element) = node {
                pending.append(&mut element.children);
            }
        }
    }
}

/// Pre-order iterator returned by [`Element::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        let children: Vec<&Element> = element.child_elements().collect();
        self.stack.extend(children.into_iter().rev());
        Some(element)
    }
}

/// One `ocr_page` container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based position in the document.
    pub number: u32,
    pub root: Element,
}

impl Page {
    pub fn new(number: u32, root: Element) -> Self {
        Self { number, root }
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.root.bbox
    }

    /// Image reference embedded in the page's `title`.
    pub fn image(&self) -> Option<&str> {
        self.root.image.as_deref()
    }

    /// Page size declared by the markup, ignoring empty boxes.
    pub fn declared_size(&self) -> Option<(f32, f32)> {
        self.root
            .bbox
            .filter(|bbox| !bbox.is_degenerate())
            .map(|bbox| (bbox.width(), bbox.height()))
    }

    /// Right/bottom extent of all lines on the page, if any line has a box.
    pub fn text_extent(&self) -> Option<(f32, f32)> {
        self.root
            .descendants()
            .filter(|element| element.kind == ElementKind::Line)
            .filter_map(|element| element.bbox)
            .reduce(|acc, bbox| acc.union(&bbox))
            .map(|bbox| (bbox.x1, bbox.y1))
            .filter(|(w, h)| *w > 0.0 && *h > 0.0)
    }

    pub fn elements(&self) -> Descendants<'_> {
        self.root.descendants()
    }
}

/// A parsed hOCR document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
