//! Watermark paragraphs for Word documents
//!
//! Watermarks are plain paragraphs inserted as the first children of
//! `<w:body>`. Existing paragraphs are streamed through untouched.

use std::io::Write;

use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, Event};
use quick_xml::{Reader, Writer};
use rand::Rng;
use regex::bytes::Regex;
use tracing::{debug, info, warn};

use crate::color::resolve_color;
use crate::error::{Error, Result};
use crate::ooxml::package::WordPackage;
use crate::spec::{Alignment, FontStyle, FontWeight, WatermarkSpec};

/// Number of paragraphs written for pattern placement
pub const PATTERN_PARAGRAPHS: usize = 6;

/// Surface used to resolve gradients; Word pages have no pixel size
const NOMINAL_PAGE: (f32, f32) = (595.0, 842.0);

const PATTERN_ALIGNMENTS: [Alignment; 3] = [Alignment::Left, Alignment::Center, Alignment::Right];

/// Alignment of each watermark paragraph, in document order
pub fn paragraph_alignments(spec: &WatermarkSpec) -> Vec<Alignment> {
    if spec.placement.is_pattern() {
        PATTERN_ALIGNMENTS.iter().copied().cycle().take(PATTERN_PARAGRAPHS).collect()
    } else {
        vec![spec.placement.alignment()]
    }
}

/// Run size in half-points for a font size given in CSS pixels
fn half_points(px: f32) -> u32 {
    (px * 0.75 * 2.0).round().max(2.0) as u32
}

/// One watermark paragraph
pub fn paragraph_xml(spec: &WatermarkSpec, alignment: Alignment, color_hex: &str) -> String {
    let family = escape(spec.font.family.as_str());
    let mut run_props = format!(
        r#"<w:rFonts w:ascii="{f}" w:hAnsi="{f}" w:eastAsia="{f}" w:cs="{f}"/>"#,
        f = family
    );
    if spec.font.weight == FontWeight::Bold {
        run_props.push_str("<w:b/>");
    }
    if spec.font.style == FontStyle::Italic {
        run_props.push_str("<w:i/>");
    }
    run_props.push_str(&format!(
        r#"<w:color w:val="{}"/><w:sz w:val="{sz}"/><w:szCs w:val="{sz}"/>"#,
        color_hex,
        sz = half_points(spec.raster_font_size())
    ));

    format!(
        r#"<w:p><w:pPr><w:jc w:val="{}"/></w:pPr><w:r><w:rPr>{}</w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        alignment.ooxml_value(),
        run_props,
        escape(spec.content.as_str())
    )
}

/// All watermark paragraphs for `spec`, concatenated
pub fn watermark_fragment<R: Rng + ?Sized>(spec: &WatermarkSpec, rng: &mut R) -> Result<String> {
    let (w, h) = NOMINAL_PAGE;
    let opacity = spec.clamped_opacity();
    let mut fragment = String::new();
    for alignment in paragraph_alignments(spec) {
        // Multi palettes pick a color per paragraph
        let color = resolve_color(&spec.color, w, h, rng)?
            .representative()
            .over_white(opacity);
        fragment.push_str(&paragraph_xml(spec, alignment, &color.to_hex()));
    }
    Ok(fragment)
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

/// Stream the document through a parser, writing `fragment` right after the
/// opening body tag. Fails on malformed XML or when there is no body.
pub fn insert_structured(xml: &[u8], fragment: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + fragment.len()));
    let mut inserted = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Eof => break,
            Event::Start(e) if !inserted && e.local_name().as_ref() == b"body" => {
                writer.write_event(Event::Start(e)).map_err(xml_error)?;
                writer.get_mut().write_all(fragment.as_bytes())?;
                inserted = true;
            }
            Event::Empty(e) if !inserted && e.local_name().as_ref() == b"body" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e)).map_err(xml_error)?;
                writer.get_mut().write_all(fragment.as_bytes())?;
                writer.write_event(Event::End(BytesEnd::new(name))).map_err(xml_error)?;
                inserted = true;
            }
            event => writer.write_event(event).map_err(xml_error)?,
        }
    }

    if !inserted {
        return Err(Error::Xml("document has no body element".to_string()));
    }
    Ok(writer.into_inner())
}

/// Splice `fragment` in after the first body (or, failing that, document)
/// open tag found by pattern match. A self-closing element is expanded so
/// the fragment lands inside it.
pub fn insert_spliced(xml: &[u8], fragment: &str) -> Result<Vec<u8>> {
    for element in ["w:body", "w:document"] {
        let re = Regex::new(&format!(r"<{}(\s[^>]*?)?(/?)>", element)).map_err(xml_error)?;
        let Some(caps) = re.captures(xml) else {
            continue;
        };
        let Some(tag) = caps.get(0) else {
            continue;
        };
        let self_closing = caps.get(2).is_some_and(|m| !m.is_empty());

        let mut out = Vec::with_capacity(xml.len() + fragment.len() + element.len() + 3);
        out.extend_from_slice(&xml[..tag.start()]);
        if self_closing {
            let attrs = caps.get(1).map(|m| m.as_bytes()).unwrap_or_default();
            out.extend_from_slice(format!("<{}", element).as_bytes());
            out.extend_from_slice(attrs);
            out.push(b'>');
            out.extend_from_slice(fragment.as_bytes());
            out.extend_from_slice(format!("</{}>", element).as_bytes());
        } else {
            out.extend_from_slice(tag.as_bytes());
            out.extend_from_slice(fragment.as_bytes());
        }
        out.extend_from_slice(&xml[tag.end()..]);
        return Ok(out);
    }
    Err(Error::PackageMalformed(
        "no body or document element in main document part".to_string(),
    ))
}

/// Insert watermark paragraphs into a document part, falling back to string
/// splicing when the XML cannot be parsed
pub fn watermark_document_xml<R: Rng + ?Sized>(
    xml: &[u8],
    spec: &WatermarkSpec,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let fragment = watermark_fragment(spec, rng)?;
    match insert_structured(xml, &fragment) {
        Ok(out) => Ok(out),
        Err(e) => {
            warn!(error = %e, "structured insert failed, splicing watermark into raw XML");
            insert_spliced(xml, &fragment)
        }
    }
}

/// Watermark a Word package. Returns the re-zipped package.
pub fn watermark_docx<R: Rng + ?Sized>(
    bytes: &[u8],
    spec: &WatermarkSpec,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let mut package = WordPackage::from_bytes(bytes)?;
    let xml = watermark_document_xml(package.document_xml(), spec, rng)?;
    debug!(bytes = xml.len(), "rewrote main document part");
    package.set_document_xml(xml);

    let out = package.to_bytes()?;
    info!(paragraphs = paragraph_alignments(spec).len(), "Word document watermarked");
    Ok(out)
}
