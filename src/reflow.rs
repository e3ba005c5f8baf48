//! Word-wrapping and pagination of plain text for PDF output
//!
//! Lines are wrapped greedily against the content width and placed top to
//! bottom; a new page starts whenever the next baseline would fall below the
//! bottom margin. Both layout modes share this algorithm and differ only in
//! their [`TextLayout`] preset and CJK handling.

use lopdf::Document;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fonts::metrics::{measure_or_estimate, HelveticaMetrics, ShapedMetrics, TextMeasure};
use crate::fonts::FontChain;
use crate::language::contains_cjk;
use crate::layout::TextLayout;
use crate::pdf::create::{text_pages_to_pdf, BodyFont};

/// Replacement for CJK lines when no font can render them
pub const CJK_PLACEHOLDER: &str = "[Chinese text - font not available]";

/// One laid-out line
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    /// Baseline in PDF user space (origin bottom-left)
    pub y: f32,
}

/// Lines placed on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub lines: Vec<Line>,
}

/// Layout mode, chosen by whether a font for the text could be embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflowMode {
    Normal,
    Fallback,
}

impl ReflowMode {
    pub fn layout(&self) -> TextLayout {
        match self {
            ReflowMode::Normal => TextLayout::normal(),
            ReflowMode::Fallback => TextLayout::fallback(),
        }
    }
}

/// Split `word` into pieces that each fit within `max_width`. A single
/// character wider than the limit still gets its own piece.
fn split_long_word(
    word: &str,
    measure: &dyn TextMeasure,
    size: f32,
    max_width: f32,
) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        current.push(c);
        if current.chars().count() > 1 && measure_or_estimate(measure, &current, size) > max_width {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Greedy word wrap of one paragraph
pub fn wrap_paragraph(
    paragraph: &str,
    measure: &dyn TextMeasure,
    size: f32,
    max_width: f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        let pieces = if measure_or_estimate(measure, word, size) > max_width {
            split_long_word(word, measure, size, max_width)
        } else {
            vec![word.to_string()]
        };

        for piece in pieces {
            if current.is_empty() {
                current = piece;
                continue;
            }
            let candidate = format!("{} {}", current, piece);
            if measure_or_estimate(measure, &candidate, size) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, piece));
            }
        }
    }

    // Blank paragraphs keep their vertical space
    lines.push(current);
    lines
}

/// Wrap `text` and distribute the lines over pages.
///
/// Paragraphs are separated by `\n`. The first baseline of every page is at
/// `page height - top margin`.
pub fn reflow_and_paginate(
    text: &str,
    measure: &dyn TextMeasure,
    layout: &TextLayout,
) -> Vec<Page> {
    let size = layout.font_size;
    let width = layout.content_width();
    let top = layout.page_height() - layout.margins.top.pt();
    let bottom = layout.margins.bottom.pt();
    let line_height = layout.line_height();

    let mut pages = Vec::new();
    let mut page = Page::default();
    let mut y = top;

    for paragraph in text.lines() {
        for line in wrap_paragraph(paragraph, measure, size, width) {
            if y < bottom && !page.lines.is_empty() {
                pages.push(std::mem::take(&mut page));
                y = top;
            }
            page.lines.push(Line { text: line, y });
            y -= line_height;
        }
    }

    if !page.lines.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    pages
}

/// Replace every line containing CJK characters with [`CJK_PLACEHOLDER`]
pub fn replace_cjk_lines(text: &str) -> String {
    text.lines()
        .map(|line| if contains_cjk(line) { CJK_PLACEHOLDER } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lay out plain text as a new PDF document.
///
/// WinAnsi-encodable text uses Helvetica. Anything else needs a font from
/// `fonts`; when none covers the text, the fallback layout is used and CJK
/// lines are replaced by a placeholder.
pub fn text_to_pdf(text: &str, fonts: &FontChain) -> Result<Document> {
    if HelveticaMetrics::can_encode(text) {
        let layout = ReflowMode::Normal.layout();
        let pages = reflow_and_paginate(text, &HelveticaMetrics, &layout);
        debug!(pages = pages.len(), "text laid out with Helvetica");
        return text_pages_to_pdf(&pages, &layout, BodyFont::Helvetica);
    }

    match fonts.resolve(text) {
        Ok(font) => {
            let layout = ReflowMode::Normal.layout();
            let pages = match ShapedMetrics::new(&font.data) {
                Ok(metrics) => reflow_and_paginate(text, &metrics, &layout),
                Err(_) => reflow_and_paginate(text, &HelveticaMetrics, &layout),
            };
            info!(font = %font.id, pages = pages.len(), "text laid out with embedded font");
            text_pages_to_pdf(&pages, &layout, BodyFont::Embedded(&font))
        }
        Err(e) => {
            warn!(error = %e, "no font for document text, using fallback layout");
            let layout = ReflowMode::Fallback.layout();
            let text = replace_cjk_lines(text);
            let pages = reflow_and_paginate(&text, &HelveticaMetrics, &layout);
            text_pages_to_pdf(&pages, &layout, BodyFont::Helvetica)
        }
    }
}
