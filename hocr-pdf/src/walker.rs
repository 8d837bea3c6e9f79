//! Document-order traversal of the hOCR tree.
//!
//! The walker knows nothing about output formats; it hands every element to a
//! [`PageVisitor`] in the order it appears in the markup. Elements of unknown
//! kind are visited like any other and their children are always descended.

use crate::error::Result;
use crate::model::{Document, Element, Page};

/// Receives the elements of each page in document order.
pub trait PageVisitor {
    /// Called before the first element of a page.
    fn begin_page(&mut self, page: &Page) -> Result<()> {
        let _ = page;
        Ok(())
    }

    /// Called once per element, parents before children.
    fn visit_element(&mut self, element: &Element, depth: usize) -> Result<()>;

    /// Called after the last element of a page.
    fn end_page(&mut self, page: &Page) -> Result<()> {
        let _ = page;
        Ok(())
    }
}

/// Visit `element` and everything nested under it.
///
/// Uses an explicit stack, so nesting depth is bounded by memory only.
pub fn walk_element<V: PageVisitor + ?Sized>(
    element: &Element,
    depth: usize,
    visitor: &mut V,
) -> Result<()> {
    let mut stack = vec![(element, depth)];
    while let Some((element, depth)) = stack.pop() {
        visitor.visit_element(element, depth)?;
        let children: Vec<&Element> = element.child_elements().collect();
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }
    Ok(())
}

/// Visit one page from its `ocr_page` element down.
pub fn walk_page<V: PageVisitor + ?Sized>(page: &Page, visitor: &mut V) -> Result<()> {
    visitor.begin_page(page)?;
    walk_element(&page.root, 0, visitor)?;
    visitor.end_page(page)
}

/// Visit every page in order.
pub fn walk<V: PageVisitor + ?Sized>(document: &Document, visitor: &mut V) -> Result<()> {
    for page in &document.pages {
        walk_page(page, visitor)?;
    }
    Ok(())
}
