//! Error types for hOCR conversion.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the conversion pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The hOCR markup could not be parsed.
    #[error("malformed hOCR input at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// The document contains no `ocr_page` element.
    #[error("hOCR document contains no pages")]
    EmptyDocument,

    /// A page image was requested but could not be loaded.
    #[error("cannot load image {}: {message}", path.display())]
    Image { path: PathBuf, message: String },

    /// A custom font could not be loaded.
    #[error("Font error: {0}")]
    Font(String),

    /// The PDF document could not be assembled or written.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Conversion options are invalid.
    #[error("Invalid options: {0}")]
    Options(String),
}

impl Error {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Image {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Pdf(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Options(err.to_string())
    }
}
