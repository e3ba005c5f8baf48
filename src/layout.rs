//! Page layout for generated PDFs

/// Simple length type in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length(pub f32);

impl Length {
    /// Create a length from millimeters
    pub fn from_mm(mm: f32) -> Self {
        Length(mm)
    }

    /// Create a length from points (1/72 inch)
    pub fn from_pt(pt: f32) -> Self {
        Length(pt * 25.4 / 72.0)
    }

    /// Get the value in points (1/72 inch)
    pub fn pt(&self) -> f32 {
        self.0 * 72.0 / 25.4
    }
}

/// Page dimensions
#[derive(Debug, Clone, Copy)]
pub struct PageDimensions {
    pub width: Length,
    pub height: Length,
}

impl PageDimensions {
    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self {
            width: Length::from_mm(210.0),
            height: Length::from_mm(297.0),
        }
    }

    /// Width and height in whole points, as used in a MediaBox
    pub fn points(&self) -> (f32, f32) {
        (self.width.pt().round(), self.height.pt().round())
    }
}

/// Margins for page content
#[derive(Debug, Clone, Copy)]
pub struct Margins {
    pub top: Length,
    pub bottom: Length,
    pub left: Length,
    pub right: Length,
}

impl Margins {
    /// Create margins with same value on all sides
    pub fn uniform(margin: Length) -> Self {
        Self {
            top: margin,
            bottom: margin,
            left: margin,
            right: margin,
        }
    }
}

/// Line layout for text converted from Word documents
#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    pub page: PageDimensions,
    pub margins: Margins,
    /// Font size in points
    pub font_size: f32,
    /// Baseline-to-baseline distance as a multiple of the font size
    pub line_spacing: f32,
}

impl TextLayout {
    /// A4 with 50pt margins, 12pt text at 1.5 line spacing
    pub fn normal() -> Self {
        Self {
            page: PageDimensions::a4(),
            margins: Margins::uniform(Length::from_pt(50.0)),
            font_size: 12.0,
            line_spacing: 1.5,
        }
    }

    /// Tighter layout used when the document font could not be embedded and
    /// CJK lines are replaced by a placeholder
    pub fn fallback() -> Self {
        Self {
            page: PageDimensions::a4(),
            margins: Margins::uniform(Length::from_pt(40.0)),
            font_size: 12.0,
            line_spacing: 1.4,
        }
    }

    pub fn page_width(&self) -> f32 {
        self.page.points().0
    }

    pub fn page_height(&self) -> f32 {
        self.page.points().1
    }

    pub fn content_width(&self) -> f32 {
        self.page_width() - self.margins.left.pt() - self.margins.right.pt()
    }

    /// Line height in points
    pub fn line_height(&self) -> f32 {
        self.font_size * self.line_spacing
    }
}
