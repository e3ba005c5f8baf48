//! Error types for the watermarking engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the watermarking engine
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported or corrupt source file
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A drawing surface could not be created
    #[error("Rendering surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// No font capable of rendering the watermark text could be obtained
    #[error("Font unavailable: {0}")]
    FontUnavailable(String),

    /// A single watermark instance could not be drawn
    #[error("Failed to draw watermark: {0}")]
    DrawFailure(String),

    /// Watermark text rejected by the language gate
    #[error("Watermark text blocked: {0}")]
    LanguageBlocked(String),

    /// Word package without a main document part
    #[error("Word package is malformed: {0}")]
    PackageMalformed(String),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Zip container error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parse or write error
    #[error("XML error: {0}")]
    Xml(String),

    /// Spec (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A fatal error tied to the file that triggered it
    #[error("{file}: {source}")]
    File {
        file: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the triggering file name to this error
    pub fn in_file(self, file: impl Into<String>) -> Self {
        match self {
            err @ Error::File { .. } => err,
            err => Error::File {
                file: file.into(),
                source: Box::new(err),
            },
        }
    }

    /// The underlying error with any file wrapper removed
    pub fn root(&self) -> &Error {
        match self {
            Error::File { source, .. } => source.root(),
            other => other,
        }
    }
}
