//! Single-document entry point
//!
//! [`Processor::process`] checks the watermark text, detects the input
//! container, hands the bytes to the matching [`DocumentMutator`] and wraps
//! the result with its format tag and metadata.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fonts::{FontCache, FontChain};
use crate::geometry::{compute_anchors, Frame, VerticalOrigin};
use crate::language::check_text;
use crate::ooxml::{docx_text, is_word_package, watermark_docx};
use crate::pdf::{image_to_pdf, load_pdf, save_pdf, watermark_document};
use crate::raster::codec::{self, RasterFormat};
use crate::raster::{composite_watermark, RasterSurface};
use crate::reflow::text_to_pdf;
use crate::spec::{OutputFormat, WatermarkSpec};

/// Container of an input document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Word,
    Raster(RasterFormat),
}

/// Container of a produced document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Pdf,
    Docx,
    Png,
    Jpeg,
    Webp,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Pdf => "pdf",
            OutputKind::Docx => "docx",
            OutputKind::Png => "png",
            OutputKind::Jpeg => "jpeg",
            OutputKind::Webp => "webp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputKind::Pdf => "application/pdf",
            OutputKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputKind::Png => RasterFormat::Png.mime(),
            OutputKind::Jpeg => RasterFormat::Jpeg.mime(),
            OutputKind::Webp => RasterFormat::Webp.mime(),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Pdf => "pdf",
            OutputKind::Docx => "docx",
            OutputKind::Png => RasterFormat::Png.extension(),
            OutputKind::Jpeg => RasterFormat::Jpeg.extension(),
            OutputKind::Webp => RasterFormat::Webp.extension(),
        }
    }
}

impl From<RasterFormat> for OutputKind {
    fn from(format: RasterFormat) -> Self {
        match format {
            RasterFormat::Png => OutputKind::Png,
            RasterFormat::Jpeg => OutputKind::Jpeg,
            RasterFormat::Webp => OutputKind::Webp,
        }
    }
}

/// Identify the input container from its magic bytes, then its extension
pub fn detect_kind(name: &str, bytes: &[u8]) -> Result<DocumentKind> {
    if bytes.starts_with(b"%PDF") {
        return Ok(DocumentKind::Pdf);
    }
    if bytes.starts_with(b"PK") && is_word_package(bytes) {
        return Ok(DocumentKind::Word);
    }
    if let Some(format) = codec::sniff(bytes) {
        return Ok(DocumentKind::Raster(format));
    }

    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => Ok(DocumentKind::Pdf),
        Some("docx") => Ok(DocumentKind::Word),
        Some("png") => Ok(DocumentKind::Raster(RasterFormat::Png)),
        Some("jpg") | Some("jpeg") => Ok(DocumentKind::Raster(RasterFormat::Jpeg)),
        Some("webp") => Ok(DocumentKind::Raster(RasterFormat::Webp)),
        _ => Err(Error::InvalidInput(format!("unsupported file type: {}", name))),
    }
}

fn unsupported(kind: DocumentKind, format: OutputFormat) -> Error {
    Error::InvalidInput(format!("cannot produce {:?} output from {:?} input", format, kind))
}

/// Bytes produced by a mutator
#[derive(Debug, Clone)]
pub struct Mutation {
    pub bytes: Vec<u8>,
    pub kind: OutputKind,
    pub page_count: usize,
}

/// Watermarking for one document container.
///
/// Implementations own the output routing for their container: they honor
/// `spec.output_format` or fail with [`Error::InvalidInput`].
pub trait DocumentMutator {
    fn name(&self) -> &'static str;

    fn mutate(&self, bytes: &[u8], spec: &WatermarkSpec, rng: &mut dyn RngCore) -> Result<Mutation>;
}

/// PDF pages: native text, image fallback for text no font can render
pub struct PdfMutator<'a> {
    pub fonts: &'a FontChain,
}

impl DocumentMutator for PdfMutator<'_> {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn mutate(
        &self,
        bytes: &[u8],
        spec: &WatermarkSpec,
        rng: &mut dyn RngCore,
    ) -> Result<Mutation> {
        match spec.output_format {
            OutputFormat::Original | OutputFormat::Pdf => {}
            other => return Err(unsupported(DocumentKind::Pdf, other)),
        }
        let mut doc = load_pdf(bytes)?;
        let page_count = watermark_document(&mut doc, spec, self.fonts, rng)?;
        Ok(Mutation {
            bytes: save_pdf(&mut doc)?,
            kind: OutputKind::Pdf,
            page_count,
        })
    }
}

/// Word packages: watermark paragraphs, or conversion to a watermarked PDF
pub struct OoxmlMutator<'a> {
    pub fonts: &'a FontChain,
}

impl DocumentMutator for OoxmlMutator<'_> {
    fn name(&self) -> &'static str {
        "ooxml"
    }

    fn mutate(
        &self,
        bytes: &[u8],
        spec: &WatermarkSpec,
        rng: &mut dyn RngCore,
    ) -> Result<Mutation> {
        match spec.output_format {
            OutputFormat::Original | OutputFormat::Docx => Ok(Mutation {
                bytes: watermark_docx(bytes, spec, rng)?,
                kind: OutputKind::Docx,
                page_count: 1,
            }),
            OutputFormat::WordToPdf | OutputFormat::Pdf => {
                let text = docx_text(bytes)?;
                let mut doc = text_to_pdf(&text, self.fonts)?;
                let page_count = watermark_document(&mut doc, spec, self.fonts, rng)?;
                Ok(Mutation {
                    bytes: save_pdf(&mut doc)?,
                    kind: OutputKind::Pdf,
                    page_count,
                })
            }
            other => Err(unsupported(DocumentKind::Word, other)),
        }
    }
}

/// Raster images: composited pixels, or a single-page watermarked PDF
pub struct RasterMutator<'a> {
    pub fonts: &'a FontChain,
    pub format: RasterFormat,
}

impl DocumentMutator for RasterMutator<'_> {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn mutate(
        &self,
        bytes: &[u8],
        spec: &WatermarkSpec,
        rng: &mut dyn RngCore,
    ) -> Result<Mutation> {
        let target = match spec.output_format {
            OutputFormat::Original => self.format,
            OutputFormat::Png => RasterFormat::Png,
            OutputFormat::Jpeg => RasterFormat::Jpeg,
            OutputFormat::Webp => RasterFormat::Webp,
            OutputFormat::Pdf => {
                let image = codec::decode(bytes)?;
                let mut doc = image_to_pdf(&image)?;
                let page_count = watermark_document(&mut doc, spec, self.fonts, rng)?;
                return Ok(Mutation {
                    bytes: save_pdf(&mut doc)?,
                    kind: OutputKind::Pdf,
                    page_count,
                });
            }
            other => return Err(unsupported(DocumentKind::Raster(self.format), other)),
        };

        let image = codec::decode(bytes)?;
        let mut surface = RasterSurface::from_image(&image)?;
        let frame = Frame::new(
            surface.width() as f32,
            surface.height() as f32,
            spec.effective_margin(),
            spec.raster_font_size(),
            VerticalOrigin::Top,
        );
        let anchors = compute_anchors(&frame, &spec.placement);
        let font = self.fonts.resolve_or_bundled(&spec.content);
        let drawn = composite_watermark(&mut surface, spec, &anchors, &font, rng)?;
        debug!(anchors = anchors.len(), drawn, "image watermarked");

        Ok(Mutation {
            bytes: codec::encode(surface.into_image(), target)?,
            kind: target.into(),
            page_count: 1,
        })
    }
}

/// A named input document
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Descriptive data about a produced document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub page_count: usize,
    pub byte_size: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Result of processing one document
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub bytes: Vec<u8>,
    pub format: OutputKind,
    pub metadata: OutputMetadata,
}

impl ProcessOutput {
    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), STANDARD.encode(&self.bytes))
    }
}

/// Settings shared by every document a [`Processor`] handles
pub struct ProcessorConfig {
    /// Overrides the margin of every spec when set
    pub margin: Option<f32>,
    /// Font sources, with the cache they fill
    pub fonts: FontChain,
}

impl ProcessorConfig {
    /// Bundled font only; no network access
    pub fn offline() -> Self {
        Self {
            margin: None,
            fonts: FontChain::new(Arc::new(FontCache::new())),
        }
    }

    /// Bundled font plus the default remote CJK fonts
    pub fn with_default_fonts(cache: Arc<FontCache>) -> Result<Self> {
        Ok(Self {
            margin: None,
            fonts: FontChain::with_defaults(cache)?,
        })
    }
}

/// Watermarks documents one at a time
pub struct Processor {
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    fn mutator_for(&self, kind: DocumentKind) -> Box<dyn DocumentMutator + '_> {
        let fonts = &self.config.fonts;
        match kind {
            DocumentKind::Pdf => Box::new(PdfMutator { fonts }),
            DocumentKind::Word => Box::new(OoxmlMutator { fonts }),
            DocumentKind::Raster(format) => Box::new(RasterMutator { fonts, format }),
        }
    }

    /// Watermark one document. Fatal errors carry the input file name.
    pub fn process(&self, input: &InputFile, spec: &WatermarkSpec) -> Result<ProcessOutput> {
        self.process_with_rng(input, spec, &mut rand::thread_rng())
    }

    /// Like [`process`](Self::process) with a caller-supplied generator for
    /// per-instance color choices
    pub fn process_with_rng(
        &self,
        input: &InputFile,
        spec: &WatermarkSpec,
        rng: &mut dyn RngCore,
    ) -> Result<ProcessOutput> {
        self.run(input, spec, rng).map_err(|e| e.in_file(&input.name))
    }

    fn run(
        &self,
        input: &InputFile,
        spec: &WatermarkSpec,
        rng: &mut dyn RngCore,
    ) -> Result<ProcessOutput> {
        let started = Instant::now();

        // Rejected text must not cost a document load
        check_text(&spec.content, &spec.security)?;
        if spec.content.trim().is_empty() {
            return Err(Error::InvalidInput("watermark text is empty".to_string()));
        }

        let mut spec = spec.clone();
        if let Some(margin) = self.config.margin {
            spec.margin = margin;
        }

        let kind = detect_kind(&input.name, &input.bytes)?;
        let mutator = self.mutator_for(kind);
        debug!(file = %input.name, mutator = mutator.name(), "processing");
        let mutation = mutator.mutate(&input.bytes, &spec, rng)?;

        let metadata = OutputMetadata {
            page_count: mutation.page_count,
            byte_size: mutation.bytes.len(),
            elapsed: started.elapsed(),
        };
        info!(
            file = %input.name,
            format = mutation.kind.as_str(),
            pages = metadata.page_count,
            bytes = metadata.byte_size,
            elapsed_ms = metadata.elapsed.as_millis() as u64,
            "watermarked"
        );
        Ok(ProcessOutput {
            bytes: mutation.bytes,
            format: mutation.kind,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::SecurityOptions;
    use image::{Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        codec::encode(image, RasterFormat::Png).unwrap()
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind("x.bin", b"%PDF-1.7\n").unwrap(), DocumentKind::Pdf);
        assert_eq!(
            detect_kind("photo", &png(2, 2)).unwrap(),
            DocumentKind::Raster(RasterFormat::Png)
        );
        assert_eq!(detect_kind("report.DOCX", b"").unwrap(), DocumentKind::Word);
        assert!(matches!(detect_kind("notes.txt", b"hello"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_language_gate_runs_first() {
        let processor = Processor::new(ProcessorConfig::offline());
        let spec = WatermarkSpec {
            content: "水印测试".to_string(),
            security: SecurityOptions {
                block_chinese_characters: true,
                allowed_languages: None,
            },
            ..Default::default()
        };
        // Garbage input: the gate must fire before detection
        let input = InputFile::new("broken.bin", b"garbage".to_vec());
        let err = processor.process(&input, &spec).unwrap_err();
        assert!(matches!(err.root(), Error::LanguageBlocked(_)));
        assert!(err.to_string().starts_with("broken.bin:"));
    }

    #[test]
    fn test_raster_to_png() {
        let processor = Processor::new(ProcessorConfig::offline());
        let input = InputFile::new("a.png", png(400, 300));
        let mut rng = StdRng::seed_from_u64(3);
        let out = processor
            .process_with_rng(&input, &WatermarkSpec::default(), &mut rng)
            .unwrap();
        assert_eq!(out.format, OutputKind::Png);
        assert_eq!(out.metadata.byte_size, out.bytes.len());

        let image = codec::decode(&out.bytes).unwrap();
        assert_eq!(image.dimensions(), (400, 300));
        assert!(image.pixels().any(|p| p.0 != [255, 255, 255, 255]));
    }

    #[test]
    fn test_raster_to_pdf() {
        let processor = Processor::new(ProcessorConfig::offline());
        let spec = WatermarkSpec {
            output_format: OutputFormat::Pdf,
            ..Default::default()
        };
        let out = processor.process(&InputFile::new("a.png", png(200, 100)), &spec).unwrap();
        assert_eq!(out.format, OutputKind::Pdf);
        assert!(out.bytes.starts_with(b"%PDF"));
        assert_eq!(out.metadata.page_count, 1);
    }

    #[test]
    fn test_unsupported_route() {
        let processor = Processor::new(ProcessorConfig::offline());
        let spec = WatermarkSpec {
            output_format: OutputFormat::Docx,
            ..Default::default()
        };
        let err = processor.process(&InputFile::new("a.png", png(10, 10)), &spec).unwrap_err();
        assert!(matches!(err.root(), Error::InvalidInput(_)));
    }

    #[test]
    fn test_empty_text_rejected() {
        let processor = Processor::new(ProcessorConfig::offline());
        let spec = WatermarkSpec {
            content: "  ".to_string(),
            ..Default::default()
        };
        let err = processor.process(&InputFile::new("a.png", png(10, 10)), &spec).unwrap_err();
        assert!(matches!(err.root(), Error::InvalidInput(_)));
    }

    #[test]
    fn test_data_url() {
        let out = ProcessOutput {
            bytes: b"hi".to_vec(),
            format: OutputKind::Png,
            metadata: OutputMetadata {
                page_count: 1,
                byte_size: 2,
                elapsed: Duration::from_millis(5),
            },
        };
        assert_eq!(out.data_url(), "data:image/png;base64,aGk=");
        let json = serde_json::to_value(&out.metadata).unwrap();
        assert_eq!(json["elapsed"], 5);
        assert_eq!(json["pageCount"], 1);
    }
}
