//! Text width measurement

use tracing::trace;

use crate::error::{Error, Result};
use crate::language::is_wide;

/// Width of a line of text at a given size
pub trait TextMeasure {
    /// Width in the same unit as `size`. Fails when the font cannot render a
    /// character of `text`.
    fn measure(&self, text: &str, size: f32) -> Result<f32>;
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // space - /
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0 - 9
    278, 278, 584, 584, 584, 556, 1015, // : - @
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A - M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N - Z
    278, 278, 278, 469, 556, 333, // [ - `
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a - m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n - z
    334, 260, 334, 584, // { - ~
];

/// Width used for Latin-1 supplement characters, which have no table entry
const HELVETICA_LATIN1_WIDTH: u16 = 556;

/// WinAnsi codes 0x80..=0x9F: character, code, Helvetica width
const WINANSI_HIGH: [(char, u8, u16); 27] = [
    ('\u{20AC}', 0x80, 556),  // Euro
    ('\u{201A}', 0x82, 222),  // quotesinglbase
    ('\u{0192}', 0x83, 556),  // florin
    ('\u{201E}', 0x84, 333),  // quotedblbase
    ('\u{2026}', 0x85, 1000), // ellipsis
    ('\u{2020}', 0x86, 556),  // dagger
    ('\u{2021}', 0x87, 556),  // daggerdbl
    ('\u{02C6}', 0x88, 333),  // circumflex
    ('\u{2030}', 0x89, 1000), // perthousand
    ('\u{0160}', 0x8A, 667),  // Scaron
    ('\u{2039}', 0x8B, 333),  // guilsinglleft
    ('\u{0152}', 0x8C, 1000), // OE
    ('\u{017D}', 0x8E, 611),  // Zcaron
    ('\u{2018}', 0x91, 222),  // quoteleft
    ('\u{2019}', 0x92, 222),  // quoteright
    ('\u{201C}', 0x93, 333),  // quotedblleft
    ('\u{201D}', 0x94, 333),  // quotedblright
    ('\u{2022}', 0x95, 350),  // bullet
    ('\u{2013}', 0x96, 556),  // endash
    ('\u{2014}', 0x97, 1000), // emdash
    ('\u{02DC}', 0x98, 333),  // tilde
    ('\u{2122}', 0x99, 1000), // trademark
    ('\u{0161}', 0x9A, 500),  // scaron
    ('\u{203A}', 0x9B, 333),  // guilsinglright
    ('\u{0153}', 0x9C, 944),  // oe
    ('\u{017E}', 0x9E, 500),  // zcaron
    ('\u{0178}', 0x9F, 667),  // Ydieresis
];

/// Metrics of the standard Helvetica font
#[derive(Debug, Clone, Copy, Default)]
pub struct HelveticaMetrics;

impl HelveticaMetrics {
    /// WinAnsi byte and width in 1/1000 em, if WinAnsi can encode `c`
    pub fn winansi(c: char) -> Option<(u8, u16)> {
        match c as u32 {
            cp @ 32..=126 => Some((cp as u8, HELVETICA_WIDTHS[(cp - 32) as usize])),
            cp @ 160..=255 => Some((cp as u8, HELVETICA_LATIN1_WIDTH)),
            _ => WINANSI_HIGH
                .iter()
                .find(|(ch, _, _)| *ch == c)
                .map(|&(_, code, width)| (code, width)),
        }
    }

    /// Width of one character in 1/1000 em, if WinAnsi can encode it
    pub fn char_width(c: char) -> Option<u16> {
        Self::winansi(c).map(|(_, width)| width)
    }

    /// True if every visible character has a single-byte WinAnsi code.
    /// Whitespace is skipped: laid-out lines collapse it to plain spaces.
    pub fn can_encode(text: &str) -> bool {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .all(|c| Self::char_width(c).is_some())
    }
}

impl TextMeasure for HelveticaMetrics {
    fn measure(&self, text: &str, size: f32) -> Result<f32> {
        let mut units = 0u32;
        for c in text.chars() {
            let w = Self::char_width(c).ok_or_else(|| {
                Error::FontUnavailable(format!("Helvetica has no glyph for {:?}", c))
            })?;
            units += w as u32;
        }
        Ok(units as f32 * size / 1000.0)
    }
}

/// Metrics taken from a TrueType/OpenType font through shaping
pub struct ShapedMetrics<'a> {
    face: rustybuzz::Face<'a>,
}

impl<'a> ShapedMetrics<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let face = rustybuzz::Face::from_slice(data, 0)
            .ok_or_else(|| Error::FontUnavailable("font data could not be parsed".to_string()))?;
        Ok(Self { face })
    }
}

impl TextMeasure for ShapedMetrics<'_> {
    fn measure(&self, text: &str, size: f32) -> Result<f32> {
        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        let output = rustybuzz::shape(&self.face, &[], buffer);

        if output.glyph_infos().iter().any(|info| info.glyph_id == 0) {
            return Err(Error::FontUnavailable(format!(
                "font lacks glyphs for {:?}",
                text
            )));
        }

        let advance: i32 = output.glyph_positions().iter().map(|p| p.x_advance).sum();
        let upem = self.face.units_per_em().max(1) as f32;
        Ok(advance as f32 * size / upem)
    }
}

/// Width estimate used when no metrics are available: wide characters take
/// a full em, everything else 0.6 em.
pub fn estimate_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|c| if is_wide(c) { size } else { size * 0.6 })
        .sum()
}

/// Measure with `metrics`, substituting the estimate on failure
pub fn measure_or_estimate(metrics: &dyn TextMeasure, text: &str, size: f32) -> f32 {
    metrics.measure(text, size).unwrap_or_else(|e| {
        trace!(error = %e, "estimating text width");
        estimate_width(text, size)
    })
}
