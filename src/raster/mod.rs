//! Raster compositor
//!
//! Watermark text is turned into vector outlines (ab_glyph), filled with the
//! resolved paint by tiny-skia, and composited onto the pixel buffer with a
//! soft white shadow.

pub mod codec;

use ab_glyph::{Font, FontRef, GlyphId, OutlineCurve, PxScale, ScaleFont};
use image::RgbaImage;
use rand::Rng;
use tiny_skia::{
    Color, ColorU8, FillRule, GradientStop, LinearGradient, Paint as SkPaint, Path, PathBuilder,
    Pixmap, PixmapPaint, Point as SkPoint, RadialGradient, Shader, SpreadMode, Transform,
};
use tracing::{debug, warn};

use crate::color::{resolve_color, Paint, Rgb, Stop};
use crate::error::{Error, Result};
use crate::fonts::{LoadedFont, BUNDLED_FONT};
use crate::geometry::AnchorPoint;
use crate::spec::{Alignment, SafeDraw, WatermarkSpec, SAFE_FALLBACK};

/// Shadow offset in pixels, both axes
const SHADOW_OFFSET: i32 = 1;

/// Shadow blur radius in pixels
const SHADOW_BLUR: usize = 2;

/// Shadow alpha relative to the watermark opacity
const SHADOW_STRENGTH: f32 = 0.5;

/// Supersampling used when text is rasterized for embedding in a PDF
const IMAGE_TEXT_SUPERSAMPLE: f32 = 2.0;

/// An RGBA pixel buffer being watermarked
pub struct RasterSurface {
    pixmap: Pixmap,
}

impl RasterSurface {
    /// A transparent surface
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            Error::SurfaceUnavailable(format!("cannot allocate {}x{} surface", width, height))
        })?;
        Ok(Self { pixmap })
    }

    /// A surface holding a copy of `image`
    pub fn from_image(image: &RgbaImage) -> Result<Self> {
        let mut surface = Self::new(image.width(), image.height())?;
        for (dst, src) in surface.pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn into_image(self) -> RgbaImage {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let mut out = RgbaImage::new(w, h);
        for (dst, src) in out.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
        }
        out
    }
}

/// Vector outline of a laid-out line of text, baseline at y = 0
struct TextRun {
    path: Option<Path>,
    advance: f32,
    ascent: f32,
    descent: f32,
}

/// Lay out `text` on one line. Each character uses the first font that has
/// a glyph for it, so the bundled font can fill gaps in the primary one.
fn layout_text(fonts: &[FontRef<'_>], text: &str, size: f32) -> TextRun {
    let scale = PxScale::from(size);
    let (ascent, descent) = fonts
        .first()
        .map(|f| {
            let scaled = f.as_scaled(scale);
            (scaled.ascent(), scaled.descent())
        })
        .unwrap_or((size * 0.8, -size * 0.2));

    let mut builder = PathBuilder::new();
    let mut caret = 0.0f32;
    let mut prev: Option<(usize, GlyphId)> = None;

    for c in text.chars() {
        let (index, id) = fonts
            .iter()
            .enumerate()
            .map(|(i, f)| (i, f.glyph_id(c)))
            .find(|(_, id)| id.0 != 0)
            .unwrap_or((0, GlyphId(0)));
        let Some(font) = fonts.get(index) else {
            break;
        };
        let scaled = font.as_scaled(scale);

        if let Some((prev_index, prev_id)) = prev {
            if prev_index == index {
                caret += scaled.kern(prev_id, id);
            }
        }

        let outline = font.outline(id);
        if outline.is_none() && id.0 == 0 && !c.is_whitespace() {
            push_missing_glyph_box(&mut builder, caret, size);
        }
        if let Some(outline) = outline {
            let (hx, vy) = (scaled.h_scale_factor(), scaled.v_scale_factor());
            let map = |p: ab_glyph::Point| (caret + p.x * hx, -p.y * vy);
            let mut last: Option<(f32, f32)> = None;
            for curve in &outline.curves {
                let start = match curve {
                    OutlineCurve::Line(p0, _)
                    | OutlineCurve::Quad(p0, _, _)
                    | OutlineCurve::Cubic(p0, _, _, _) => map(*p0),
                };
                if last != Some(start) {
                    if last.is_some() {
                        builder.close();
                    }
                    builder.move_to(start.0, start.1);
                }
                let end = match curve {
                    OutlineCurve::Line(_, p1) => {
                        let p1 = map(*p1);
                        builder.line_to(p1.0, p1.1);
                        p1
                    }
                    OutlineCurve::Quad(_, p1, p2) => {
                        let (p1, p2) = (map(*p1), map(*p2));
                        builder.quad_to(p1.0, p1.1, p2.0, p2.1);
                        p2
                    }
                    OutlineCurve::Cubic(_, p1, p2, p3) => {
                        let (p1, p2, p3) = (map(*p1), map(*p2), map(*p3));
                        builder.cubic_to(p1.0, p1.1, p2.0, p2.1, p3.0, p3.1);
                        p3
                    }
                };
                last = Some(end);
            }
            if last.is_some() {
                builder.close();
            }
        }

        let advance = scaled.h_advance(id);
        caret += if id.0 == 0 && advance <= 0.0 { size * 0.6 } else { advance };
        prev = Some((index, id));
    }

    TextRun {
        path: builder.finish(),
        advance: caret,
        ascent,
        descent,
    }
}

/// Hollow box standing in for a character no font can draw
fn push_missing_glyph_box(builder: &mut PathBuilder, x: f32, size: f32) {
    let (left, right) = (x + size * 0.08, x + size * 0.52);
    let (top, bottom) = (-size * 0.7, 0.0);
    let t = (size * 0.06).max(0.5);

    builder.move_to(left, top);
    builder.line_to(right, top);
    builder.line_to(right, bottom);
    builder.line_to(left, bottom);
    builder.close();

    // Opposite winding cuts the hole
    builder.move_to(left + t, top + t);
    builder.line_to(left + t, bottom - t);
    builder.line_to(right - t, bottom - t);
    builder.line_to(right - t, top + t);
    builder.close();
}

fn sk_color(rgb: Rgb, alpha: f32) -> Color {
    Color::from_rgba8(rgb.r, rgb.g, rgb.b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn gradient_stops(stops: &[Stop], alpha: f32) -> Vec<GradientStop> {
    stops
        .iter()
        .map(|s| GradientStop::new(s.offset, sk_color(s.color, alpha)))
        .collect()
}

/// Shader in surface coordinates
fn shader_for(paint: &Paint, alpha: f32) -> Shader<'static> {
    let solid = Shader::SolidColor(sk_color(paint.representative(), alpha));
    match paint {
        Paint::Solid(_) => solid,
        Paint::Linear { start, end, stops } => LinearGradient::new(
            SkPoint::from_xy(start.x, start.y),
            SkPoint::from_xy(end.x, end.y),
            gradient_stops(stops, alpha),
            SpreadMode::Pad,
            Transform::identity(),
        )
        .unwrap_or(solid),
        Paint::Radial {
            center,
            radius,
            stops,
        } => RadialGradient::new(
            SkPoint::from_xy(center.x, center.y),
            SkPoint::from_xy(center.x, center.y),
            *radius,
            gradient_stops(stops, alpha),
            SpreadMode::Pad,
            Transform::identity(),
        )
        .unwrap_or(solid),
    }
}

/// Simple box blur over premultiplied RGBA; keeps channels premultiplied
fn box_blur(pixmap: &mut Pixmap, radius: usize) {
    let (w, h) = (pixmap.width() as usize, pixmap.height() as usize);
    if radius == 0 || w == 0 || h == 0 {
        return;
    }
    let data = pixmap.data_mut();
    let mut tmp = vec![0u8; data.len()];

    for y in 0..h {
        for x in 0..w {
            let (lo, hi) = (x.saturating_sub(radius), (x + radius).min(w - 1));
            for c in 0..4 {
                let sum: u32 = (lo..=hi).map(|i| data[(y * w + i) * 4 + c] as u32).sum();
                tmp[(y * w + x) * 4 + c] = (sum / (hi - lo + 1) as u32) as u8;
            }
        }
    }
    for y in 0..h {
        let (lo, hi) = (y.saturating_sub(radius), (y + radius).min(h - 1));
        for x in 0..w {
            for c in 0..4 {
                let sum: u32 = (lo..=hi).map(|j| tmp[(j * w + x) * 4 + c] as u32).sum();
                data[(y * w + x) * 4 + c] = (sum / (hi - lo + 1) as u32) as u8;
            }
        }
    }
}

/// One watermark instance to draw
struct Instance<'p> {
    anchor: AnchorPoint,
    size: f32,
    rotation: f32,
    opacity: f32,
    alignment: Alignment,
    paint: &'p Paint,
}

fn draw_instance(
    pixmap: &mut Pixmap,
    fonts: &[FontRef<'_>],
    text: &str,
    inst: &Instance,
) -> Result<()> {
    if !(inst.anchor.x.is_finite() && inst.anchor.y.is_finite() && inst.size.is_finite()) {
        return Err(Error::DrawFailure(format!("non-finite geometry at {:?}", inst.anchor)));
    }

    let run = layout_text(fonts, text, inst.size);
    let Some(path) = run.path else {
        // Whitespace only
        return Ok(());
    };

    let dx = match inst.alignment {
        Alignment::Left => 0.0,
        Alignment::Center => -run.advance / 2.0,
        Alignment::Right => -run.advance,
    };
    // Vertically center the line box on the anchor
    let dy = (run.ascent + run.descent) / 2.0;

    let transform = Transform::from_translate(inst.anchor.x, inst.anchor.y)
        .pre_rotate(inst.rotation)
        .pre_translate(dx, dy);
    let device_path = path
        .transform(transform)
        .ok_or_else(|| Error::DrawFailure(format!("cannot transform text at {:?}", inst.anchor)))?;

    draw_shadow(pixmap, &device_path, inst.opacity * SHADOW_STRENGTH);

    let paint = SkPaint {
        shader: shader_for(inst.paint, inst.opacity),
        anti_alias: true,
        ..SkPaint::default()
    };
    pixmap.fill_path(&device_path, &paint, FillRule::Winding, Transform::identity(), None);
    Ok(())
}

/// White blurred copy of the text drawn under it
fn draw_shadow(pixmap: &mut Pixmap, device_path: &Path, alpha: f32) {
    let bounds = device_path.bounds();
    let pad = (SHADOW_BLUR + 2) as f32;
    let (left, top) = ((bounds.left() - pad).floor(), (bounds.top() - pad).floor());
    let w = (bounds.width() + 2.0 * pad).ceil() as u32 + 1;
    let h = (bounds.height() + 2.0 * pad).ceil() as u32 + 1;

    let Some(mut layer) = Pixmap::new(w, h) else {
        return;
    };
    let Some(local) = device_path.clone().transform(Transform::from_translate(-left, -top)) else {
        return;
    };
    let paint = SkPaint {
        shader: Shader::SolidColor(sk_color(Rgb::white(), alpha)),
        anti_alias: true,
        ..SkPaint::default()
    };
    layer.fill_path(&local, &paint, FillRule::Winding, Transform::identity(), None);
    box_blur(&mut layer, SHADOW_BLUR);

    pixmap.draw_pixmap(
        left as i32 + SHADOW_OFFSET,
        top as i32 + SHADOW_OFFSET,
        layer.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Parse `font` plus the bundled font as a fallback chain
fn font_refs(font: &LoadedFont) -> Vec<FontRef<'_>> {
    let mut fonts = Vec::with_capacity(2);
    match FontRef::try_from_slice(&font.data) {
        Ok(f) => fonts.push(f),
        Err(e) => warn!(font = %font.id, error = %e, "font could not be parsed"),
    }
    if !font.is_bundled() {
        if let Ok(f) = FontRef::try_from_slice(BUNDLED_FONT) {
            fonts.push(f);
        }
    }
    fonts
}

/// Draw the watermark at every anchor. Returns the number of instances drawn.
///
/// A failed instance is retried once with [`SAFE_FALLBACK`] at the clamped
/// anchor, then skipped.
pub fn composite_watermark<R: Rng + ?Sized>(
    surface: &mut RasterSurface,
    spec: &WatermarkSpec,
    anchors: &[AnchorPoint],
    font: &LoadedFont,
    rng: &mut R,
) -> Result<usize> {
    let fonts = font_refs(font);
    if fonts.is_empty() {
        return Err(Error::FontUnavailable(font.id.clone()));
    }
    let (w, h) = (surface.width() as f32, surface.height() as f32);
    let alignment = spec.placement.alignment();
    let size = spec.raster_font_size();
    let opacity = spec.clamped_opacity();

    let mut drawn = 0usize;
    for anchor in anchors {
        // Multi palettes pick a color per instance
        let paint = resolve_color(&spec.color, w, h, rng)?;
        let inst = Instance {
            anchor: *anchor,
            size,
            rotation: spec.rotation,
            opacity,
            alignment,
            paint: &paint,
        };
        match draw_instance(&mut surface.pixmap, &fonts, &spec.content, &inst) {
            Ok(()) => drawn += 1,
            Err(e) => {
                warn!(error = %e, "watermark draw failed, retrying with safe parameters");
                let pixmap = &mut surface.pixmap;
                if retry_safe(pixmap, &fonts, &spec.content, anchor, w, h, &SAFE_FALLBACK) {
                    drawn += 1;
                }
            }
        }
    }
    debug!(anchors = anchors.len(), drawn, "raster watermark composited");
    Ok(drawn)
}

fn retry_safe(
    pixmap: &mut Pixmap,
    fonts: &[FontRef<'_>],
    text: &str,
    anchor: &AnchorPoint,
    width: f32,
    height: f32,
    safe: &SafeDraw,
) -> bool {
    let clamp = |v: f32, max: f32| if v.is_finite() { v.clamp(0.0, max) } else { max / 2.0 };
    let paint = Paint::Solid(safe.color);
    let inst = Instance {
        anchor: AnchorPoint::new(clamp(anchor.x, width), clamp(anchor.y, height)),
        size: safe.font_size,
        rotation: safe.rotation,
        opacity: safe.opacity,
        alignment: Alignment::Center,
        paint: &paint,
    };
    match draw_instance(pixmap, fonts, text, &inst) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "safe watermark draw failed; skipping instance");
            false
        }
    }
}

/// Text rendered to an image for placement on a PDF page
pub struct TextImage {
    pub image: RgbaImage,
    /// Size of the image in the text's own units (points)
    pub width: f32,
    pub height: f32,
    /// Distance from the bottom edge of the image to the text baseline
    pub baseline: f32,
}

/// Rasterize one line of text, unrotated, on a transparent background.
///
/// The image is supersampled; `width`/`height` report the size it should be
/// drawn at.
pub fn render_text_image(
    text: &str,
    font: &LoadedFont,
    size: f32,
    color: Rgb,
) -> Result<TextImage> {
    let fonts = font_refs(font);
    if fonts.is_empty() {
        return Err(Error::FontUnavailable(font.id.clone()));
    }
    let px = size * IMAGE_TEXT_SUPERSAMPLE;
    let run = layout_text(&fonts, text, px);
    let path = run
        .path
        .ok_or_else(|| Error::DrawFailure("watermark text has no visible glyphs".to_string()))?;

    let pad = (px * 0.1).ceil();
    let w = (run.advance + 2.0 * pad).ceil().max(1.0) as u32;
    let h = (run.ascent - run.descent + 2.0 * pad).ceil().max(1.0) as u32;

    let mut surface = RasterSurface::new(w, h)?;
    let baseline_y = pad + run.ascent;
    let path = path
        .transform(Transform::from_translate(pad, baseline_y))
        .ok_or_else(|| Error::DrawFailure("cannot place text in image".to_string()))?;
    let paint = SkPaint {
        shader: Shader::SolidColor(sk_color(color, 1.0)),
        anti_alias: true,
        ..SkPaint::default()
    };
    surface
        .pixmap
        .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

    Ok(TextImage {
        image: surface.into_image(),
        width: w as f32 / IMAGE_TEXT_SUPERSAMPLE,
        height: h as f32 / IMAGE_TEXT_SUPERSAMPLE,
        baseline: (h as f32 - baseline_y) / IMAGE_TEXT_SUPERSAMPLE,
    })
}
