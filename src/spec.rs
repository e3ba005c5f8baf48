//! Declarative watermark configuration
//!
//! A [`WatermarkSpec`] is built by the caller (usually deserialized from JSON)
//! and passed read-only through a single processing call.

use serde::{Deserialize, Serialize};

use crate::color::{ColorSpec, Rgb};
use crate::language::SecurityOptions;

/// Spacing substituted when a pattern is configured with zero or negative spacing.
pub const DEFAULT_SPACING: f32 = 150.0;

/// Default distance kept between anchors and the surface edges.
pub const DEFAULT_MARGIN: f32 = 50.0;

/// Smallest pattern step, in pixels or points
pub const MIN_SPACING: f32 = 1.0;

/// Bounds applied to `scale` before any drawing.
pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 2.0;

/// PDF paths use a higher scale floor so text stays legible at page size.
pub const PDF_MIN_SCALE: f32 = 0.3;

/// Minimum font size for native PDF text.
pub const PDF_MIN_FONT_SIZE: f32 = 18.0;

/// Parameters for the single retry made after a watermark instance fails to
/// draw. The result is meant to be visible rather than pretty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeDraw {
    pub font_size: f32,
    pub color: Rgb,
    pub opacity: f32,
    pub rotation: f32,
}

pub const SAFE_FALLBACK: SafeDraw = SafeDraw {
    font_size: 16.0,
    color: Rgb::red(),
    opacity: 1.0,
    rotation: 0.0,
};

fn default_content() -> String {
    "WATERMARK".to_string()
}

fn default_opacity() -> f32 {
    0.3
}

fn default_scale() -> f32 {
    1.0
}

fn default_rotation() -> f32 {
    -45.0
}

fn default_margin() -> f32 {
    DEFAULT_MARGIN
}

fn default_font_family() -> String {
    "Helvetica".to_string()
}

fn default_font_size() -> f32 {
    48.0
}

fn default_spacing() -> Spacing {
    Spacing { x: 200.0, y: 150.0 }
}

fn default_columns() -> u32 {
    3
}

fn default_density() -> f32 {
    1.0
}

/// Font weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

/// Font style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Font selection for the watermark text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontOptions {
    #[serde(default = "default_font_family")]
    pub family: String,
    /// Size in pixels, before `scale` is applied
    #[serde(default = "default_font_size")]
    pub size: f32,
    #[serde(default)]
    pub weight: FontWeight,
    #[serde(default)]
    pub style: FontStyle,
}

impl Default for FontOptions {
    fn default() -> Self {
        Self {
            family: default_font_family(),
            size: default_font_size(),
            weight: FontWeight::Normal,
            style: FontStyle::Normal,
        }
    }
}

/// Corner of a page or canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Edge of a page or canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Horizontal alignment of text relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    /// The `w:jc` value used by Word for this alignment
    pub fn ooxml_value(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

/// Layout algorithm for repeated watermarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternMode {
    #[default]
    Default,
    #[serde(alias = "tiled-3-column")]
    Tiled,
    Random,
}

/// Two-dimensional step or offset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Spacing {
    pub x: f32,
    pub y: f32,
}

/// Parameters for repeated placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternOptions {
    #[serde(default)]
    pub mode: PatternMode,
    #[serde(default = "default_spacing")]
    pub spacing: Spacing,
    #[serde(default)]
    pub offset: Spacing,
    #[serde(default)]
    pub stagger: bool,
    #[serde(default = "default_columns")]
    pub columns: u32,
    /// Fixed row count for tiled mode; derived from spacing when absent
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default = "default_density")]
    pub density: f32,
    #[serde(default)]
    pub random_seed: Option<u32>,
    #[serde(default)]
    pub avoid_overlap: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            mode: PatternMode::Default,
            spacing: default_spacing(),
            offset: Spacing::default(),
            stagger: false,
            columns: default_columns(),
            rows: None,
            density: default_density(),
            random_seed: None,
            avoid_overlap: false,
        }
    }
}

impl PatternOptions {
    /// Copy with non-positive or non-finite spacing replaced by [`DEFAULT_SPACING`]
    /// and the column count forced to at least one.
    ///
    /// Non-finite offsets become zero. Negative offsets are reduced modulo the
    /// spacing, which leaves the visible grid unchanged.
    pub fn sanitized(&self) -> Self {
        let fix = |v: f32| {
            if v.is_finite() && v > 0.0 {
                v.max(MIN_SPACING)
            } else {
                DEFAULT_SPACING
            }
        };
        let spacing = Spacing {
            x: fix(self.spacing.x),
            y: fix(self.spacing.y),
        };
        let shift = |v: f32, step: f32| {
            if !v.is_finite() {
                0.0
            } else if v < 0.0 {
                v.rem_euclid(step)
            } else {
                v
            }
        };
        Self {
            spacing,
            offset: Spacing {
                x: shift(self.offset.x, spacing.x),
                y: shift(self.offset.y, spacing.y),
            },
            columns: self.columns.max(1),
            rows: self.rows.map(|r| r.max(1)),
            density: if self.density.is_finite() {
                self.density.max(0.0)
            } else {
                default_density()
            },
            ..self.clone()
        }
    }
}

/// Where the watermark goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Placement {
    Corner {
        #[serde(default)]
        corner: Corner,
    },
    Center,
    Edge {
        edge: Edge,
    },
    Pattern(PatternOptions),
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Pattern(PatternOptions::default())
    }
}

impl Placement {
    /// Text alignment relative to the anchor: left-leaning corners and edges
    /// align left, right-leaning ones align right, everything else centers.
    pub fn alignment(&self) -> Alignment {
        match self {
            Placement::Corner {
                corner: Corner::TopLeft | Corner::BottomLeft,
            }
            | Placement::Edge { edge: Edge::Left } => Alignment::Left,
            Placement::Corner {
                corner: Corner::TopRight | Corner::BottomRight,
            }
            | Placement::Edge { edge: Edge::Right } => Alignment::Right,
            _ => Alignment::Center,
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Placement::Pattern(_))
    }
}

/// Target container for the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
    Pdf,
    Docx,
    #[default]
    Original,
    WordToPdf,
}

/// Complete configuration for one watermarking operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkSpec {
    #[serde(default = "default_content")]
    pub content: String,
    #[serde(default)]
    pub font: FontOptions,
    #[serde(default)]
    pub color: ColorSpec,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Degrees, positive turns the text clockwise as seen on the page
    #[serde(default = "default_rotation")]
    pub rotation: f32,
    #[serde(default = "default_margin")]
    pub margin: f32,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub security: SecurityOptions,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            content: default_content(),
            font: FontOptions::default(),
            color: ColorSpec::default(),
            placement: Placement::default(),
            opacity: default_opacity(),
            scale: default_scale(),
            rotation: default_rotation(),
            margin: default_margin(),
            output_format: OutputFormat::Original,
            security: SecurityOptions::default(),
        }
    }
}

impl WatermarkSpec {
    /// Parse a spec from JSON, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Scale clamped into the supported range
    pub fn clamped_scale(&self) -> f32 {
        if self.scale.is_finite() {
            self.scale.clamp(MIN_SCALE, MAX_SCALE)
        } else {
            default_scale()
        }
    }

    /// Opacity clamped into `[0, 1]`
    pub fn clamped_opacity(&self) -> f32 {
        if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            default_opacity()
        }
    }

    /// Margin with negative or non-finite values replaced by the default
    pub fn effective_margin(&self) -> f32 {
        if self.margin.is_finite() && self.margin >= 0.0 {
            self.margin
        } else {
            DEFAULT_MARGIN
        }
    }

    /// Font size in pixels for raster targets
    pub fn raster_font_size(&self) -> f32 {
        (self.font.size * self.clamped_scale()).max(1.0)
    }

    /// Font size in points for native PDF text
    pub fn pdf_font_size(&self) -> f32 {
        let scale = self.clamped_scale().max(PDF_MIN_SCALE);
        (self.font.size * scale).max(PDF_MIN_FONT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let spec = WatermarkSpec::from_json("{}").unwrap();
        assert_eq!(spec, WatermarkSpec::default());
    }

    #[test]
    fn test_parse_pattern_spec() {
        let json = r##"{
            "content": "DRAFT",
            "color": { "type": "solid", "value": "#336699" },
            "placement": {
                "type": "pattern",
                "mode": "random",
                "spacing": { "x": 120, "y": 80 },
                "randomSeed": 42,
                "avoidOverlap": true
            },
            "outputFormat": "word-to-pdf",
            "security": { "blockChineseCharacters": true }
        }"##;
        let spec = WatermarkSpec::from_json(json).unwrap();
        assert_eq!(spec.content, "DRAFT");
        assert_eq!(spec.output_format, OutputFormat::WordToPdf);
        assert!(spec.security.block_chinese_characters);
        match spec.placement {
            Placement::Pattern(p) => {
                assert_eq!(p.mode, PatternMode::Random);
                assert_eq!(p.random_seed, Some(42));
                assert!(p.avoid_overlap);
                assert_eq!(p.spacing, Spacing { x: 120.0, y: 80.0 });
            }
            other => panic!("unexpected placement {:?}", other),
        }
    }

    #[test]
    fn test_tiled_alias() {
        let json = r#"{ "placement": { "type": "pattern", "mode": "tiled-3-column" } }"#;
        let spec = WatermarkSpec::from_json(json).unwrap();
        assert!(matches!(
            spec.placement,
            Placement::Pattern(PatternOptions { mode: PatternMode::Tiled, .. })
        ));
    }

    #[test]
    fn test_corner_defaults_to_bottom_right() {
        let spec = WatermarkSpec::from_json(r#"{ "placement": { "type": "corner" } }"#).unwrap();
        assert_eq!(
            spec.placement,
            Placement::Corner {
                corner: Corner::BottomRight
            }
        );
    }

    #[test]
    fn test_sanitized_spacing() {
        let pattern = PatternOptions {
            spacing: Spacing { x: 0.0, y: -20.0 },
            columns: 0,
            ..Default::default()
        };
        let fixed = pattern.sanitized();
        assert_eq!(fixed.spacing, Spacing { x: DEFAULT_SPACING, y: DEFAULT_SPACING });
        assert_eq!(fixed.columns, 1);
    }

    #[test]
    fn test_sanitized_offset() {
        let pattern = PatternOptions {
            spacing: Spacing { x: 200.0, y: 150.0 },
            offset: Spacing { x: f32::NAN, y: -1e30 },
            ..Default::default()
        };
        let fixed = pattern.sanitized();
        assert_eq!(fixed.offset.x, 0.0);
        assert!(fixed.offset.y >= 0.0 && fixed.offset.y < 150.0);

        let pattern = PatternOptions {
            spacing: Spacing { x: 200.0, y: 150.0 },
            offset: Spacing { x: -50.0, y: 30.0 },
            ..Default::default()
        };
        assert_eq!(pattern.sanitized().offset, Spacing { x: 150.0, y: 30.0 });
    }

    #[test]
    fn test_extreme_offset_json_parses() {
        let json = r#"{ "placement": { "type": "pattern", "offset": { "x": 0, "y": -1e30 } } }"#;
        let spec = WatermarkSpec::from_json(json).unwrap();
        match spec.placement {
            Placement::Pattern(options) => assert!(options.sanitized().offset.y.is_finite()),
            other => panic!("unexpected placement {:?}", other),
        }
    }

    #[test]
    fn test_scale_clamping() {
        let spec = WatermarkSpec {
            scale: 5.0,
            ..Default::default()
        };
        assert_eq!(spec.clamped_scale(), MAX_SCALE);

        let tiny = WatermarkSpec {
            scale: 0.01,
            font: FontOptions {
                size: 20.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(tiny.clamped_scale(), MIN_SCALE);
        // 20 * 0.3 = 6, floored to 18pt
        assert_eq!(tiny.pdf_font_size(), PDF_MIN_FONT_SIZE);
    }

    #[test]
    fn test_alignment_from_placement() {
        assert_eq!(
            Placement::Corner { corner: Corner::TopLeft }.alignment(),
            Alignment::Left
        );
        assert_eq!(
            Placement::Edge { edge: Edge::Right }.alignment(),
            Alignment::Right
        );
        assert_eq!(Placement::Edge { edge: Edge::Top }.alignment(), Alignment::Center);
        assert_eq!(Placement::Center.alignment(), Alignment::Center);
    }
}
