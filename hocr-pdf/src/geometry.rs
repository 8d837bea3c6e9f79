//! Coordinate reconciliation between hOCR space and PDF page space.

use crate::model::BBox;
use serde::{Deserialize, Serialize};

/// Vertical orientation of the coordinates produced by the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCoordinateConvention {
    /// Top-left origin, y grows downward (tesseract). Needs a flip.
    TopLeft,
    /// Already bottom-left origin (ocropus). Passed through.
    #[default]
    BottomLeft,
}

impl SourceCoordinateConvention {
    pub fn from_invert(invert: bool) -> Self {
        if invert {
            SourceCoordinateConvention::TopLeft
        } else {
            SourceCoordinateConvention::BottomLeft
        }
    }
}

/// Rectangle in page space: bottom-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Map an hOCR box onto the output page.
pub fn reconcile(bbox: &BBox, page_height: f32, convention: SourceCoordinateConvention) -> Rect {
    let width = bbox.x1 - bbox.x0;
    let height = bbox.y1 - bbox.y0;
    let y = match convention {
        SourceCoordinateConvention::TopLeft => page_height - bbox.y1,
        SourceCoordinateConvention::BottomLeft => bbox.y0,
    };
    Rect::new(bbox.x0, y, width, height)
}

/// Mirror a box vertically within a page of the given height.
pub fn flip(bbox: &BBox, page_height: f32) -> BBox {
    BBox {
        x0: bbox.x0,
        y0: page_height - bbox.y1,
        x1: bbox.x1,
        y1: page_height - bbox.y0,
    }
}
