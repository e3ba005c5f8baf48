//! Watermark drawing on existing PDF pages
//!
//! Original page content is never rewritten: each page's existing streams are
//! wrapped in `q`/`Q` and one new stream holding all watermark instances is
//! appended after them.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::color::{resolve_color, Rgb};
use crate::error::{Error, Result};
use crate::fonts::FontChain;
use crate::geometry::{compute_anchors, AnchorPoint, Frame, VerticalOrigin};
use crate::pdf::create::add_image_xobject;
use crate::pdf::fonts::{
    embed_type0_font, encode_helvetica, encode_helvetica_lossy, use_helvetica_font, CidEncoder,
    EncodedText,
};
use crate::pdf::page::{page_boxes, PageBox};
use crate::pdf::resources::{
    add_content_stream, add_page_resource, append_content_to_page, isolate_page_content,
};
use crate::raster::render_text_image;
use crate::spec::{Alignment, SafeDraw, WatermarkSpec, SAFE_FALLBACK};

/// Baseline shift, as a fraction of the font size, that centers capitals on
/// the anchor
const BASELINE_SHIFT: f32 = 0.35;

/// How the watermark text is put on the page
enum Ink {
    /// Native text with a font resource
    Text { font: ObjectId, encoded: EncodedText },
    /// Pre-rasterized text, one image per color
    Image { images: HashMap<Rgb, TextXObject> },
}

#[derive(Debug, Clone, Copy)]
struct TextXObject {
    id: ObjectId,
    width: f32,
    height: f32,
    baseline: f32,
}

/// Document-wide drawing state shared by all pages
struct Painter<'a> {
    spec: &'a WatermarkSpec,
    fonts: &'a FontChain,
    size: f32,
    ink: Ink,
    helvetica: Option<ObjectId>,
    states: HashMap<u32, ObjectId>,
}

/// Per-page resource names, registered on first use
struct PageResources {
    page: PageBox,
    names: HashMap<ObjectId, String>,
}

impl PageResources {
    fn name(
        &mut self,
        doc: &mut Document,
        category: &str,
        prefix: &str,
        id: ObjectId,
    ) -> Result<String> {
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }
        let name = add_page_resource(doc, self.page.id, category, prefix, id)?;
        self.names.insert(id, name.clone());
        Ok(name)
    }
}

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

fn finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}

impl<'a> Painter<'a> {
    fn new(doc: &mut Document, spec: &'a WatermarkSpec, fonts: &'a FontChain) -> Self {
        let size = spec.pdf_font_size();
        let ink = Self::choose_ink(doc, spec, fonts);
        Self {
            spec,
            fonts,
            size,
            ink,
            helvetica: None,
            states: HashMap::new(),
        }
    }

    /// Helvetica when it can encode the text, else an embedded font, else
    /// images of the rendered text
    fn choose_ink(doc: &mut Document, spec: &WatermarkSpec, fonts: &FontChain) -> Ink {
        let text = &spec.content;
        if let Ok(encoded) = encode_helvetica(text) {
            return Ink::Text {
                font: use_helvetica_font(doc),
                encoded,
            };
        }

        let embedded = fonts.resolve(text).and_then(|font| {
            let encoded = CidEncoder::new(&font.data)?.encode(text)?;
            let id = embed_type0_font(doc, &font, text)?;
            debug!(font = %font.id, "embedded watermark font");
            Ok(Ink::Text { font: id, encoded })
        });
        embedded.unwrap_or_else(|e| {
            warn!(error = %e, "watermark font unavailable, drawing text as images");
            Ink::Image {
                images: HashMap::new(),
            }
        })
    }

    fn helvetica(&mut self, doc: &mut Document) -> ObjectId {
        *self.helvetica.get_or_insert_with(|| use_helvetica_font(doc))
    }

    /// ExtGState for an opacity, shared across pages
    fn graphics_state(&mut self, doc: &mut Document, opacity: f32) -> ObjectId {
        let key = (opacity.clamp(0.0, 1.0) * 1000.0).round() as u32;
        *self.states.entry(key).or_insert_with(|| {
            let alpha = key as f32 / 1000.0;
            doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => alpha,
                "CA" => alpha,
            })
        })
    }

    /// Text image for a color, rendered on first use
    fn text_image(&mut self, doc: &mut Document, color: Rgb) -> Result<TextXObject> {
        let Ink::Image { images } = &mut self.ink else {
            return Err(Error::DrawFailure("not drawing with images".to_string()));
        };
        if let Some(found) = images.get(&color) {
            return Ok(*found);
        }
        let font = self.fonts.resolve_or_bundled(&self.spec.content);
        let rendered = render_text_image(&self.spec.content, &font, self.size, color)?;
        let xobject = TextXObject {
            id: add_image_xobject(doc, &rendered.image)?,
            width: rendered.width,
            height: rendered.height,
            baseline: rendered.baseline,
        };
        images.insert(color, xobject);
        Ok(xobject)
    }

    /// Operators for one instance drawn with the document's ink
    #[allow(clippy::too_many_arguments)]
    fn instance_ops(
        &mut self,
        doc: &mut Document,
        res: &mut PageResources,
        anchor: AnchorPoint,
        color: Rgb,
        size: f32,
        opacity: f32,
        rotation: f32,
        alignment: Alignment,
    ) -> Result<Vec<Operation>> {
        let theta = (-rotation).to_radians();
        let (sin, cos) = theta.sin_cos();
        if !finite(&[anchor.x, anchor.y, size, sin, cos]) {
            return Err(Error::DrawFailure(format!(
                "non-finite geometry at ({}, {})",
                anchor.x, anchor.y
            )));
        }

        let gs_id = self.graphics_state(doc, opacity);
        let gs = res.name(doc, "ExtGState", "WmGS", gs_id)?;
        let rotate = vec![
            cos.into(),
            sin.into(),
            (-sin).into(),
            cos.into(),
            anchor.x.into(),
            anchor.y.into(),
        ];

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![name(&gs)]),
        ];

        let native = match &self.ink {
            Ink::Text { font, encoded } => Some((*font, encoded.clone())),
            Ink::Image { .. } => None,
        };
        match native {
            Some((font, encoded)) => {
                let font_name = res.name(doc, "Font", "WmF", font)?;
                let dx = align_offset(alignment, encoded.width(size));
                let [r, g, b] = color.components();
                ops.extend([
                    Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![name(&font_name), size.into()]),
                    Operation::new("Tm", rotate),
                    Operation::new("Td", vec![dx.into(), (-size * BASELINE_SHIFT).into()]),
                    Operation::new("Tj", vec![encoded.object()]),
                    Operation::new("ET", vec![]),
                ]);
            }
            None => {
                let image = self.text_image(doc, color)?;
                let image_name = res.name(doc, "XObject", "WmImg", image.id)?;
                let dx = align_offset(alignment, image.width);
                let dy = -size * BASELINE_SHIFT - image.baseline;
                ops.extend([
                    Operation::new("cm", rotate),
                    Operation::new(
                        "cm",
                        vec![
                            image.width.into(),
                            0.into(),
                            0.into(),
                            image.height.into(),
                            dx.into(),
                            dy.into(),
                        ],
                    ),
                    Operation::new("Do", vec![name(&image_name)]),
                ]);
            }
        }

        ops.push(Operation::new("Q", vec![]));
        Ok(ops)
    }

    /// Last-resort instance: Helvetica in the safe colour at the clamped
    /// anchor, unrotated
    fn safe_ops(
        &mut self,
        doc: &mut Document,
        res: &mut PageResources,
        anchor: AnchorPoint,
        safe: &SafeDraw,
    ) -> Result<Vec<Operation>> {
        let page = res.page;
        let clamp = |v: f32, lo: f32, span: f32| {
            if v.is_finite() {
                v.clamp(lo, lo + span)
            } else {
                lo + span / 2.0
            }
        };
        let anchor = AnchorPoint::new(
            clamp(anchor.x, page.x, page.width),
            clamp(anchor.y, page.y, page.height),
        );

        let font = self.helvetica(doc);
        let font_name = res.name(doc, "Font", "WmF", font)?;
        let gs_id = self.graphics_state(doc, safe.opacity);
        let gs = res.name(doc, "ExtGState", "WmGS", gs_id)?;
        let encoded = encode_helvetica_lossy(&self.spec.content);
        let [r, g, b] = safe.color.components();

        Ok(vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![name(&gs)]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![name(&font_name), safe.font_size.into()]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), anchor.x.into(), anchor.y.into()],
            ),
            Operation::new("Tj", vec![encoded.object()]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ])
    }

    /// Draw all anchors of one page. Returns the number of instances drawn.
    fn paint_page<R: Rng + ?Sized>(
        &mut self,
        doc: &mut Document,
        page: PageBox,
        rng: &mut R,
    ) -> Result<usize> {
        let frame = Frame::new(
            page.width,
            page.height,
            self.spec.effective_margin(),
            self.size,
            VerticalOrigin::Bottom,
        );
        let anchors: Vec<AnchorPoint> = compute_anchors(&frame, &self.spec.placement)
            .into_iter()
            .map(|a| AnchorPoint::new(a.x + page.x, a.y + page.y))
            .collect();

        isolate_page_content(doc, page.id)?;
        let mut res = PageResources {
            page,
            names: HashMap::new(),
        };

        let opacity = self.spec.clamped_opacity();
        let alignment = self.spec.placement.alignment();
        let mut operations = Vec::new();
        let mut drawn = 0usize;

        for anchor in anchors {
            // Multi palettes pick a color per instance
            let color =
                resolve_color(&self.spec.color, page.width, page.height, rng)?.representative();
            let size = self.size;
            let rotation = self.spec.rotation;
            let drawn_ops = self.instance_ops(
                doc, &mut res, anchor, color, size, opacity, rotation, alignment,
            );
            let ops = match drawn_ops {
                Ok(ops) => Some(ops),
                Err(e) => {
                    warn!(error = %e, "watermark draw failed, retrying with safe parameters");
                    self.safe_ops(doc, &mut res, anchor, &SAFE_FALLBACK)
                        .map_err(|e| warn!(error = %e, "safe draw failed; skipping instance"))
                        .ok()
                }
            };
            if let Some(ops) = ops {
                operations.extend(ops);
                drawn += 1;
            }
        }

        if !operations.is_empty() {
            let content = Content { operations }.encode()?;
            let stream_id = add_content_stream(doc, content)?;
            append_content_to_page(doc, page.id, stream_id)?;
        }
        Ok(drawn)
    }
}

fn align_offset(alignment: Alignment, width: f32) -> f32 {
    match alignment {
        Alignment::Left => 0.0,
        Alignment::Center => -width / 2.0,
        Alignment::Right => -width,
    }
}

/// Watermark every page of a loaded document. Returns the page count.
pub fn watermark_document<R: Rng + ?Sized>(
    doc: &mut Document,
    spec: &WatermarkSpec,
    fonts: &FontChain,
    rng: &mut R,
) -> Result<usize> {
    let pages = page_boxes(doc);
    if pages.is_empty() {
        return Err(Error::InvalidInput("PDF has no pages".to_string()));
    }

    let mut painter = Painter::new(doc, spec, fonts);
    let mut drawn = 0usize;
    for (i, page) in pages.iter().enumerate() {
        let n = painter.paint_page(doc, *page, rng)?;
        debug!(page = i + 1, instances = n, "watermarked page");
        drawn += n;
    }
    info!(pages = pages.len(), instances = drawn, "PDF watermarked");
    Ok(pages.len())
}

/// Parse a PDF from memory
pub fn load_pdf(bytes: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| Error::InvalidInput(format!("cannot parse PDF: {}", e)))?;
    if doc.is_encrypted() {
        return Err(Error::InvalidInput("encrypted PDFs are not supported".to_string()));
    }
    Ok(doc)
}

/// Serialize without object streams
pub fn save_pdf(doc: &mut Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Watermark PDF bytes. Returns the new bytes and the page count.
pub fn watermark_pdf<R: Rng + ?Sized>(
    bytes: &[u8],
    spec: &WatermarkSpec,
    fonts: &FontChain,
    rng: &mut R,
) -> Result<(Vec<u8>, usize)> {
    let mut doc = load_pdf(bytes)?;
    let pages = watermark_document(&mut doc, spec, fonts, rng)?;
    Ok((save_pdf(&mut doc)?, pages))
}
