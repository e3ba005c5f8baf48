//! PDF creation: image pages and reflowed text pages

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::Result;
use crate::fonts::LoadedFont;
use crate::layout::TextLayout;
use crate::pdf::fonts::{embed_type0_font, encode_helvetica_lossy, use_helvetica_font, CidEncoder};
use crate::reflow::Page;

fn zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Add an RGB image XObject, with a soft mask when the image has any
/// transparency
pub fn add_image_xobject(doc: &mut Document, image: &RgbaImage) -> Result<ObjectId> {
    let (w, h) = image.dimensions();
    let mut rgb = Vec::with_capacity((w * h * 3) as usize);
    let mut alpha = Vec::with_capacity((w * h) as usize);
    for px in image.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px.0[3]);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => w as i64,
        "Height" => h as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8_i64,
        "Filter" => "FlateDecode",
    };

    if alpha.iter().any(|a| *a != 255) {
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            zlib(&alpha)?,
        );
        let smask_id = doc.add_object(smask);
        dict.set("SMask", Object::Reference(smask_id));
    }

    Ok(doc.add_object(Stream::new(dict, zlib(&rgb)?)))
}

/// Assemble pages under a new Pages node and catalog
fn finish_document(doc: &mut Document, pages_id: ObjectId, page_ids: Vec<Object>) {
    let count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}

/// Single-page PDF showing `image` at one point per pixel
pub fn image_to_pdf(image: &RgbaImage) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let (w, h) = image.dimensions();
    let (w_pt, h_pt) = (Object::Integer(w as i64), Object::Integer(h as i64));

    let img_id = add_image_xobject(&mut doc, image)?;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w_pt.clone(), 0.into(), 0.into(), h_pt.clone(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), w_pt, h_pt],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => img_id,
            },
        },
    });

    finish_document(&mut doc, pages_id, vec![page_id.into()]);
    Ok(doc)
}

/// Font used for converted body text
pub enum BodyFont<'a> {
    /// Standard Helvetica; characters outside WinAnsi print as `?`
    Helvetica,
    /// Embedded font covering the document text
    Embedded(&'a LoadedFont),
}

/// Build a PDF with one page per reflowed page. Lines are placed at the
/// baselines computed during pagination.
pub fn text_pages_to_pdf(
    pages: &[Page],
    layout: &TextLayout,
    font: BodyFont<'_>,
) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    // Glyph set for the embedded font; lines never hold control characters
    let all_text: String = pages
        .iter()
        .flat_map(|p| p.lines.iter())
        .map(|l| l.text.as_str())
        .collect();

    let (font_id, encoder) = match font {
        BodyFont::Helvetica => (use_helvetica_font(&mut doc), None),
        BodyFont::Embedded(loaded) => (
            embed_type0_font(&mut doc, loaded, &all_text)?,
            Some(CidEncoder::new(&loaded.data)?),
        ),
    };

    let (page_w, page_h) = (layout.page_width(), layout.page_height());
    let left = layout.margins.left.pt();
    let mut page_ids = Vec::with_capacity(pages.len());

    for page in pages {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), layout.font_size.into()]),
        ];
        for line in &page.lines {
            if line.text.is_empty() {
                continue;
            }
            let encoded = match &encoder {
                Some(encoder) => encoder.encode(&line.text)?,
                None => encode_helvetica_lossy(&line.text),
            };
            ops.push(Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), left.into(), line.y.into()],
            ));
            ops.push(Operation::new("Tj", vec![encoded.object()]));
        }
        ops.push(Operation::new("ET", vec![]));

        let mut stream = Stream::new(dictionary! {}, Content { operations: ops }.encode()?);
        stream.compress()?;
        let content_id = doc.add_object(stream);

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page_w.into(), page_h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        page_ids.push(page_id.into());
    }

    debug!(pages = page_ids.len(), "built text PDF");
    finish_document(&mut doc, pages_id, page_ids);
    Ok(doc)
}
