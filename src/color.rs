//! Color resolution
//!
//! Turns a declarative [`ColorSpec`] into a [`Paint`] with concrete
//! coordinates for one target surface. `Multi` palettes resolve to a single
//! color per call, so every watermark instance draws its own pick.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Point;

fn default_solid() -> String {
    "#FF0000".to_string()
}

/// RGB color with 8-bit channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255)
    }

    pub const fn red() -> Self {
        Self::new(255, 0, 0)
    }

    /// Channels scaled to `[0, 1]` for PDF color operators
    pub fn components(&self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }

    /// Upper-case `RRGGBB` without the leading `#`
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Color as seen at `opacity` over a white page
    pub fn over_white(&self, opacity: f32) -> Self {
        let a = opacity.clamp(0.0, 1.0);
        let mix = |c: u8| (c as f32 * a + 255.0 * (1.0 - a)).round() as u8;
        Self::new(mix(self.r), mix(self.g), mix(self.b))
    }
}

/// Parse `#RGB` / `#RRGGBB` (the `#` is optional).
pub fn parse_hex_color(hex: &str) -> Result<Rgb> {
    let digits = hex.trim();
    let digits = digits.strip_prefix('#').unwrap_or(digits);
    let channel = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| Error::InvalidInput(format!("invalid hex color: {}", hex)))
    };

    if !digits.is_ascii() {
        return Err(Error::InvalidInput(format!("invalid hex color: {}", hex)));
    }

    match digits.len() {
        3 => Ok(Rgb::new(
            channel(&digits[0..1])? * 17,
            channel(&digits[1..2])? * 17,
            channel(&digits[2..3])? * 17,
        )),
        6 => Ok(Rgb::new(
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        )),
        _ => Err(Error::InvalidInput(format!(
            "color must be #RGB or #RRGGBB, got {}",
            hex
        ))),
    }
}

/// Gradient geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientKind {
    #[default]
    Linear,
    Radial,
}

/// One declared gradient stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub offset: f32,
    pub color: String,
}

/// Declared gradient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientSpec {
    #[serde(default)]
    pub kind: GradientKind,
    pub stops: Vec<ColorStop>,
    /// Direction of a linear gradient in degrees
    #[serde(default)]
    pub angle: f32,
    #[serde(default)]
    pub center: Option<Point>,
    #[serde(default)]
    pub radius: Option<f32>,
}

/// Declarative color configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ColorSpec {
    Solid {
        #[serde(default = "default_solid")]
        value: String,
    },
    Gradient(GradientSpec),
    Multi {
        palette: Vec<String>,
    },
}

impl Default for ColorSpec {
    fn default() -> Self {
        ColorSpec::Solid {
            value: default_solid(),
        }
    }
}

/// A resolved gradient stop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stop {
    pub offset: f32,
    pub color: Rgb,
}

/// Renderer-ready paint
#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Rgb),
    Linear {
        start: Point,
        end: Point,
        stops: Vec<Stop>,
    },
    Radial {
        center: Point,
        radius: f32,
        stops: Vec<Stop>,
    },
}

impl Paint {
    /// A single color standing in for this paint on targets without gradients
    pub fn representative(&self) -> Rgb {
        match self {
            Paint::Solid(rgb) => *rgb,
            Paint::Linear { stops, .. } | Paint::Radial { stops, .. } => stops
                .first()
                .map(|s| s.color)
                .unwrap_or_else(Rgb::red),
        }
    }
}

/// Resolve a color spec for a surface of the given size.
///
/// `rng` drives `Multi` palette selection only; gradients and solids are
/// deterministic.
pub fn resolve_color<R: Rng + ?Sized>(
    spec: &ColorSpec,
    width: f32,
    height: f32,
    rng: &mut R,
) -> Result<Paint> {
    match spec {
        ColorSpec::Solid { value } => Ok(Paint::Solid(parse_hex_color(value)?)),
        ColorSpec::Multi { palette } => {
            if palette.is_empty() {
                return Err(Error::InvalidInput("multi-color palette is empty".to_string()));
            }
            let pick = &palette[rng.gen_range(0..palette.len())];
            Ok(Paint::Solid(parse_hex_color(pick)?))
        }
        ColorSpec::Gradient(gradient) => resolve_gradient(gradient, width, height),
    }
}

fn resolve_gradient(gradient: &GradientSpec, width: f32, height: f32) -> Result<Paint> {
    if gradient.stops.is_empty() {
        return Err(Error::InvalidInput("gradient has no stops".to_string()));
    }

    let mut stops = gradient
        .stops
        .iter()
        .map(|s| {
            Ok(Stop {
                offset: if s.offset.is_finite() { s.offset.clamp(0.0, 1.0) } else { 0.0 },
                color: parse_hex_color(&s.color)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    stops.sort_by(|a, b| a.offset.total_cmp(&b.offset));

    let center = Point::new(width / 2.0, height / 2.0);

    match gradient.kind {
        GradientKind::Linear => {
            let theta = gradient.angle.to_radians();
            let (sin, cos) = theta.sin_cos();
            // Half the surface extent projected onto the gradient direction
            let half = (width * cos.abs() + height * sin.abs()) / 2.0;
            Ok(Paint::Linear {
                start: Point::new(center.x - half * cos, center.y - half * sin),
                end: Point::new(center.x + half * cos, center.y + half * sin),
                stops,
            })
        }
        GradientKind::Radial => Ok(Paint::Radial {
            center: gradient.center.unwrap_or(center),
            radius: gradient
                .radius
                .filter(|r| r.is_finite() && *r > 0.0)
                .unwrap_or_else(|| width.min(height) / 2.0),
            stops,
        }),
    }
}
