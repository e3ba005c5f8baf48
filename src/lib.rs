//! Document Watermark Library
//!
//! Places text watermarks on raster images, PDF documents and Word packages.
//! This library provides functionality to:
//! - Compute watermark anchor points for corner, edge, center and pattern layouts
//! - Resolve solid, gradient and multi-color paints
//! - Composite watermarks onto images
//! - Draw watermarks onto every page of a PDF without touching existing content
//! - Insert watermark paragraphs into Word documents
//! - Convert Word text to a paginated, watermarked PDF
//!
//! # Example
//!
//! ```no_run
//! use doc_watermark::{InputFile, Processor, ProcessorConfig, WatermarkSpec};
//!
//! let processor = Processor::new(ProcessorConfig::offline());
//! let spec = WatermarkSpec::from_json(r#"{"content": "CONFIDENTIAL"}"#)?;
//! let input = InputFile::new("report.pdf", std::fs::read("report.pdf")?);
//!
//! let output = processor.process(&input, &spec)?;
//! std::fs::write("report-watermarked.pdf", &output.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod color;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod language;
pub mod layout;
pub mod ooxml;
pub mod pdf;
pub mod process;
pub mod raster;
pub mod reflow;
pub mod spec;

// Re-export commonly used items
pub use error::{Error, Result};
pub use process::{DocumentKind, InputFile, OutputKind, ProcessOutput, Processor, ProcessorConfig};
pub use spec::WatermarkSpec;
