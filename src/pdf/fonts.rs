//! Fonts for native PDF text
//!
//! Text Helvetica can encode uses the standard Type1 font with WinAnsi
//! encoding. Anything else is written with an embedded TrueType/OpenType font
//! as a Type0 composite font, two bytes per glyph (Identity-H).

use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::{Error, Result};
use crate::fonts::metrics::HelveticaMetrics;
use crate::fonts::LoadedFont;

/// Glyph entries per bfchar block; PostScript limits each block to 100
const CMAP_BLOCK: usize = 100;

/// Use Helvetica (standard PDF font - simpler than embedding)
pub fn use_helvetica_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Text ready for a `Tj` operator, with its advance width
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    pub format: StringFormat,
    /// Advance in 1/1000 em
    pub width_units: f32,
}

impl EncodedText {
    pub fn width(&self, size: f32) -> f32 {
        self.width_units * size / 1000.0
    }

    pub fn object(&self) -> Object {
        Object::String(self.bytes.clone(), self.format)
    }
}

/// Single-byte WinAnsi encoding for Helvetica
pub fn encode_helvetica(text: &str) -> Result<EncodedText> {
    let mut bytes = Vec::with_capacity(text.len());
    let mut width_units = 0.0;
    for c in text.chars() {
        let (code, w) = HelveticaMetrics::winansi(c).ok_or_else(|| {
            Error::FontUnavailable(format!("Helvetica cannot encode {:?}", c))
        })?;
        bytes.push(code);
        width_units += w as f32;
    }
    Ok(EncodedText {
        bytes,
        format: StringFormat::Literal,
        width_units,
    })
}

/// Helvetica encoding with unencodable characters replaced by `?`
pub fn encode_helvetica_lossy(text: &str) -> EncodedText {
    let replaced: String = text
        .chars()
        .map(|c| if HelveticaMetrics::char_width(c).is_some() { c } else { '?' })
        .collect();
    // Every character is encodable after replacement
    encode_helvetica(&replaced).unwrap_or(EncodedText {
        bytes: Vec::new(),
        format: StringFormat::Literal,
        width_units: 0.0,
    })
}

/// Maps text to glyph ids of an embedded font
pub struct CidEncoder<'a> {
    face: rustybuzz::Face<'a>,
    scale: f32,
}

impl<'a> CidEncoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let face = rustybuzz::Face::from_slice(data, 0)
            .ok_or_else(|| Error::FontUnavailable("font data could not be parsed".to_string()))?;
        let scale = 1000.0 / face.units_per_em().max(1) as f32;
        Ok(Self { face, scale })
    }

    fn glyph(&self, c: char) -> Result<u16> {
        self.face
            .glyph_index(c)
            .map(|g| g.0)
            .ok_or_else(|| Error::FontUnavailable(format!("font has no glyph for {:?}", c)))
    }

    fn advance(&self, gid: u16) -> f32 {
        self.face
            .glyph_hor_advance(rustybuzz::ttf_parser::GlyphId(gid))
            .unwrap_or(0) as f32
            * self.scale
    }

    /// Two bytes per glyph, big-endian
    pub fn encode(&self, text: &str) -> Result<EncodedText> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        let mut width_units = 0.0;
        for c in text.chars() {
            let gid = self.glyph(c)?;
            bytes.extend_from_slice(&gid.to_be_bytes());
            width_units += self.advance(gid);
        }
        Ok(EncodedText {
            bytes,
            format: StringFormat::Hexadecimal,
            width_units,
        })
    }

    /// Glyph id to character for every distinct character of `text` the
    /// font can render
    fn glyph_map(&self, text: &str) -> BTreeMap<u16, char> {
        let mut map = BTreeMap::new();
        for c in text.chars() {
            if let Ok(gid) = self.glyph(c) {
                map.entry(gid).or_insert(c);
            }
        }
        map
    }

    fn postscript_name(&self) -> String {
        let name = self
            .face
            .names()
            .into_iter()
            .find(|n| n.name_id == rustybuzz::ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .unwrap_or_default();
        let name: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        if name.is_empty() {
            "WatermarkFont".to_string()
        } else {
            name
        }
    }
}

/// Build a ToUnicode CMap for the given glyphs
fn create_tounicode_cmap(glyphs: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo\n\
         << /Registry (Adobe)\n\
         /Ordering (UCS)\n\
         /Supplement 0\n\
         >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );

    let entries: Vec<(&u16, &char)> = glyphs.iter().collect();
    for block in entries.chunks(CMAP_BLOCK) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (gid, c) in block {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}

/// Embed `font` as a Type0 font able to show every character of `text`.
///
/// CFF-flavoured OpenType data (`OTTO`) is embedded as `FontFile3` with a
/// `CIDFontType0` descendant; glyf-based fonts as `FontFile2` with
/// `CIDFontType2`.
pub fn embed_type0_font(doc: &mut Document, font: &LoadedFont, text: &str) -> Result<ObjectId> {
    let encoder = CidEncoder::new(&font.data)?;
    // Fail before writing any objects if a glyph is missing
    encoder.encode(text)?;

    let glyphs = encoder.glyph_map(text);
    let base_font = encoder.postscript_name();
    let face = &encoder.face;
    let scale = encoder.scale;
    let is_cff = font.data.starts_with(b"OTTO");

    let mut font_stream = if is_cff {
        Stream::new(dictionary! { "Subtype" => "OpenType" }, font.data.to_vec())
    } else {
        Stream::new(
            dictionary! { "Length1" => font.data.len() as i64 },
            font.data.to_vec(),
        )
    };
    font_stream.compress()?;
    let font_stream_id = doc.add_object(font_stream);

    let bbox = face.global_bounding_box();
    let ascent = face.ascender() as f32 * scale;
    let descent = face.descender() as f32 * scale;
    let cap_height = face
        .capital_height()
        .map(|h| h as f32 * scale)
        .unwrap_or(ascent);
    let mut font_descriptor = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_font.clone().into_bytes()),
        "Flags" => 4, // Symbolic
        "FontBBox" => vec![
            Object::Real(bbox.x_min as f32 * scale),
            Object::Real(bbox.y_min as f32 * scale),
            Object::Real(bbox.x_max as f32 * scale),
            Object::Real(bbox.y_max as f32 * scale),
        ],
        "ItalicAngle" => 0,
        "Ascent" => Object::Real(ascent),
        "Descent" => Object::Real(descent),
        "CapHeight" => Object::Real(cap_height),
        "StemV" => 80,
    };
    font_descriptor.set(
        if is_cff { "FontFile3" } else { "FontFile2" },
        Object::Reference(font_stream_id),
    );
    let font_descriptor_id = doc.add_object(font_descriptor);

    let widths: Vec<Object> = glyphs
        .keys()
        .flat_map(|gid| {
            [
                Object::Integer(*gid as i64),
                Object::Array(vec![Object::Real(encoder.advance(*gid))]),
            ]
        })
        .collect();

    let mut cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => if is_cff { "CIDFontType0" } else { "CIDFontType2" },
        "BaseFont" => Object::Name(base_font.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::String(b"Adobe".to_vec(), StringFormat::Literal),
            "Ordering" => Object::String(b"Identity".to_vec(), StringFormat::Literal),
            "Supplement" => 0,
        },
        "FontDescriptor" => font_descriptor_id,
        "DW" => 1000,
        "W" => widths,
    };
    if !is_cff {
        cid_font.set("CIDToGIDMap", "Identity");
    }
    let cid_font_id = doc.add_object(cid_font);

    let cmap = create_tounicode_cmap(&glyphs);
    let mut to_unicode = Stream::new(Dictionary::new(), cmap.into_bytes());
    to_unicode.compress()?;
    let to_unicode_id = doc.add_object(to_unicode);

    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(base_font.into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => to_unicode_id,
    }))
}
