//! Plain-text extraction.
//!
//! Emits one line per `ocr_line`-kind element, pages concatenated in order.
//! Nothing here looks at geometry or render options.

use crate::model::{Descendants, Document, ElementKind, Page};

/// Lazy iterator over the text lines of a document, each ending in `\n`.
pub struct TextLines<'a> {
    pages: std::slice::Iter<'a, Page>,
    current: Option<Descendants<'a>>,
}

impl<'a> Iterator for TextLines<'a> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(elements) = self.current.as_mut() {
                if let Some(line) = elements.find(|e| e.kind == ElementKind::Line) {
                    let mut text = line.normalized_text();
                    text.push('\n');
                    return Some(text);
                }
            }
            self.current = Some(self.pages.next()?.elements());
        }
    }
}

/// Text lines of `document`, produced on demand.
pub fn extract_text(document: &Document) -> TextLines<'_> {
    TextLines {
        pages: document.pages.iter(),
        current: None,
    }
}

/// All lines of `document` joined into one string.
pub fn to_text_string(document: &Document) -> String {
    extract_text(document).collect()
}
