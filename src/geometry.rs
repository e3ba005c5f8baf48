//! Watermark anchor computation
//!
//! Pure functions producing the list of points where watermark instances are
//! drawn. Layouts are computed with a top-left origin and flipped for targets
//! whose y axis grows upward (PDF pages).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spec::{Corner, Edge, PatternMode, PatternOptions, Placement};

/// Attempts made for each random candidate before it is dropped.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 50;

/// Upper bound on random-mode instances regardless of density.
pub const MAX_RANDOM_ANCHORS: usize = 10_000;

/// Upper bound on grid-mode instances.
pub const MAX_GRID_ANCHORS: usize = 10_000;

/// A point in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Where a watermark instance is drawn
pub type AnchorPoint = Point;

/// Direction of the surface's y axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalOrigin {
    /// y grows downward (canvas pixels)
    Top,
    /// y grows upward (PDF user space)
    Bottom,
}

/// The surface a layout is computed for
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    /// Approximate height of one watermark line, used to keep edge anchors
    /// clear of the margin
    pub glyph_height: f32,
    pub origin: VerticalOrigin,
}

impl Frame {
    pub fn new(
        width: f32,
        height: f32,
        margin: f32,
        glyph_height: f32,
        origin: VerticalOrigin,
    ) -> Self {
        Self {
            width,
            height,
            margin,
            glyph_height,
            origin,
        }
    }

    fn too_small(&self) -> bool {
        self.width < 2.0 * self.margin || self.height < 2.0 * self.margin
    }

    fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Keep a point inside `[margin, dimension - margin]` on both axes
    fn contain(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.margin, self.width - self.margin),
            p.y.clamp(self.margin, self.height - self.margin),
        )
    }

    fn to_target(&self, p: Point) -> Point {
        match self.origin {
            VerticalOrigin::Top => p,
            VerticalOrigin::Bottom => Point::new(p.x, self.height - p.y),
        }
    }
}

/// Linear congruential generator used for reproducible random layouts
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Seeded from the wall clock; layouts are not reproducible
    pub fn from_time() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis() as u32)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        self.state
    }

    /// Uniform value in `[0, 1)`
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() as f64 / 4_294_967_296.0) as f32
    }
}

/// Compute anchors for a placement on the given frame.
///
/// Output order is row-major for grid layouts and insertion order for random
/// layouts. Every anchor lies within the frame minus its margin, unless the
/// frame is smaller than twice the margin, in which case a single centered
/// anchor is returned.
pub fn compute_anchors(frame: &Frame, placement: &Placement) -> Vec<AnchorPoint> {
    if frame.too_small() {
        return vec![frame.center()];
    }

    let points = match placement {
        Placement::Corner { corner } => vec![corner_anchor(frame, *corner)],
        Placement::Center => vec![frame.center()],
        Placement::Edge { edge } => vec![edge_anchor(frame, *edge)],
        Placement::Pattern(options) => {
            let options = options.sanitized();
            match options.mode {
                PatternMode::Default => grid_anchors(frame, &options),
                PatternMode::Tiled => column_anchors(frame, &options),
                PatternMode::Random => {
                    let mut rng = match options.random_seed {
                        Some(seed) => Lcg::new(seed),
                        None => Lcg::from_time(),
                    };
                    random_anchors(frame, &options, &mut rng)
                }
            }
        }
    };

    points.into_iter().map(|p| frame.to_target(p)).collect()
}

fn corner_anchor(frame: &Frame, corner: Corner) -> Point {
    let inset = frame.margin + frame.glyph_height;
    let x = match corner {
        Corner::TopLeft | Corner::BottomLeft => frame.margin,
        Corner::TopRight | Corner::BottomRight => frame.width - frame.margin,
    };
    let y = match corner {
        Corner::TopLeft | Corner::TopRight => inset,
        Corner::BottomLeft | Corner::BottomRight => frame.height - inset,
    };
    frame.contain(Point::new(x, y))
}

fn edge_anchor(frame: &Frame, edge: Edge) -> Point {
    let inset = frame.margin + frame.glyph_height;
    let c = frame.center();
    let p = match edge {
        Edge::Top => Point::new(c.x, inset),
        Edge::Bottom => Point::new(c.x, frame.height - inset),
        Edge::Left => Point::new(frame.margin, c.y),
        Edge::Right => Point::new(frame.width - frame.margin, c.y),
    };
    frame.contain(p)
}

/// Regular grid stepping by the spacing from the margin plus offset.
/// Odd rows shift right by half a step when staggered.
fn grid_anchors(frame: &Frame, options: &PatternOptions) -> Vec<Point> {
    let (sx, sy) = (options.spacing.x, options.spacing.y);
    let (min_x, max_x) = (frame.margin, frame.width - frame.margin);
    let (min_y, max_y) = (frame.margin, frame.height - frame.margin);
    let start_x = frame.margin + options.offset.x;
    let start_y = frame.margin + options.offset.y;

    let mut points = Vec::new();
    for row in grid_steps(start_y, sy, min_y, max_y).take(MAX_GRID_ANCHORS) {
        let y = start_y + row as f32 * sy;
        let shift = if options.stagger && row % 2 == 1 { sx / 2.0 } else { 0.0 };
        let row_x = start_x + shift;
        for col in grid_steps(row_x, sx, min_x, max_x) {
            if points.len() >= MAX_GRID_ANCHORS {
                debug!(limit = MAX_GRID_ANCHORS, "grid truncated");
                return points;
            }
            let x = row_x + col as f32 * sx;
            if (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y) {
                points.push(Point::new(x, y));
            }
        }
    }
    points
}

/// Indices `i` with `min <= start + i * step <= max`, `i >= 0`
fn grid_steps(start: f32, step: f32, min: f32, max: f32) -> std::ops::Range<usize> {
    let first = ((min - start) / step).ceil().max(0.0);
    let last = ((max - start) / step).floor();
    if !first.is_finite() || !last.is_finite() || last < first {
        return 0..0;
    }
    // Float to int casts saturate
    first as usize..(last as usize).saturating_add(1)
}

/// One anchor per column per row, centered in equal-width columns.
fn column_anchors(frame: &Frame, options: &PatternOptions) -> Vec<Point> {
    let available_w = frame.width - 2.0 * frame.margin;
    let available_h = frame.height - 2.0 * frame.margin;
    let columns = options.columns.max(1) as usize;
    let rows = options
        .rows
        .map(|r| r.max(1) as usize)
        .unwrap_or_else(|| ((available_h / options.spacing.y).floor() as usize).max(1));

    let column_w = available_w / columns as f32;
    let row_h = available_h / rows as f32;

    let mut points = Vec::with_capacity(rows * columns);
    for row in 0..rows {
        let y = frame.margin + row_h * (row as f32 + 0.5);
        for col in 0..columns {
            let x = frame.margin + column_w * (col as f32 + 0.5);
            points.push(Point::new(x, y));
        }
    }
    points
}

/// Rejection-sampled scatter. Candidates that fail all attempts are dropped,
/// so the result may hold fewer points than the density target.
fn random_anchors(frame: &Frame, options: &PatternOptions, rng: &mut Lcg) -> Vec<Point> {
    let (sx, sy) = (options.spacing.x, options.spacing.y);
    let target = ((frame.width * frame.height * options.density) / (sx * sy)).floor();
    let target = if target.is_finite() && target > 0.0 {
        (target as usize).min(MAX_RANDOM_ANCHORS)
    } else {
        0
    };
    let min_distance = sx.min(sy);
    let span_x = frame.width - 2.0 * frame.margin;
    let span_y = frame.height - 2.0 * frame.margin;

    let mut points: Vec<Point> = Vec::with_capacity(target);
    let mut dropped = 0usize;

    for _ in 0..target {
        let mut placed = false;
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let candidate = Point::new(
                frame.margin + rng.next_f32() * span_x,
                frame.margin + rng.next_f32() * span_y,
            );
            let clear = !options.avoid_overlap
                || points.iter().all(|p| p.distance(&candidate) >= min_distance);
            if clear {
                points.push(candidate);
                placed = true;
                break;
            }
        }
        if !placed {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!(target_count = target, dropped, "random layout dropped unplaceable anchors");
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spacing;

    fn a4(origin: VerticalOrigin) -> Frame {
        Frame::new(595.0, 842.0, 50.0, 20.0, origin)
    }

    fn pattern(mode: PatternMode) -> PatternOptions {
        PatternOptions {
            mode,
            spacing: Spacing { x: 200.0, y: 150.0 },
            ..Default::default()
        }
    }

    fn assert_contained(frame: &Frame, anchors: &[AnchorPoint]) {
        for p in anchors {
            assert!(
                p.x >= frame.margin && p.x <= frame.width - frame.margin,
                "x out of bounds: {:?}",
                p
            );
            assert!(
                p.y >= frame.margin && p.y <= frame.height - frame.margin,
                "y out of bounds: {:?}",
                p
            );
        }
    }

    #[test]
    fn test_grid_a4_counts() {
        let frame = a4(VerticalOrigin::Bottom);
        let anchors = compute_anchors(&frame, &Placement::Pattern(pattern(PatternMode::Default)));
        // 3 columns (50, 250, 450) x 5 rows (50 .. 650)
        assert_eq!(anchors.len(), 15);
        assert_contained(&frame, &anchors);
    }

    #[test]
    fn test_grid_is_row_major() {
        let frame = a4(VerticalOrigin::Top);
        let anchors = compute_anchors(&frame, &Placement::Pattern(pattern(PatternMode::Default)));
        assert_eq!(anchors[0], Point::new(50.0, 50.0));
        assert_eq!(anchors[1], Point::new(250.0, 50.0));
        assert_eq!(anchors[3], Point::new(50.0, 200.0));
    }

    #[test]
    fn test_grid_stagger_shifts_odd_rows() {
        let frame = a4(VerticalOrigin::Top);
        let mut options = pattern(PatternMode::Default);
        options.stagger = true;
        let anchors = compute_anchors(&frame, &Placement::Pattern(options));
        let second_row: Vec<_> = anchors.iter().filter(|p| p.y == 200.0).collect();
        assert_eq!(second_row[0].x, 150.0);
        assert_contained(&frame, &anchors);
    }

    #[test]
    fn test_zero_spacing_terminates() {
        let frame = a4(VerticalOrigin::Top);
        let mut options = pattern(PatternMode::Default);
        options.spacing = Spacing { x: 0.0, y: -1.0 };
        let anchors = compute_anchors(&frame, &Placement::Pattern(options));
        assert!(!anchors.is_empty());
        assert_contained(&frame, &anchors);
    }

    #[test]
    fn test_grid_offset_shifts_origin() {
        let frame = a4(VerticalOrigin::Top);
        let mut options = pattern(PatternMode::Default);
        options.offset = Spacing { x: 20.0, y: 10.0 };
        let anchors = compute_anchors(&frame, &Placement::Pattern(options));
        assert_eq!(anchors[0], Point::new(70.0, 60.0));
        assert_contained(&frame, &anchors);
    }

    #[test]
    fn test_negative_offset_matches_reduced_offset() {
        let frame = a4(VerticalOrigin::Top);
        let mut negative = pattern(PatternMode::Default);
        negative.offset = Spacing { x: -150.0, y: -100.0 };
        let mut reduced = pattern(PatternMode::Default);
        reduced.offset = Spacing { x: 50.0, y: 50.0 };
        assert_eq!(
            compute_anchors(&frame, &Placement::Pattern(negative)),
            compute_anchors(&frame, &Placement::Pattern(reduced))
        );
    }

    #[test]
    fn test_extreme_offsets_terminate() {
        let frame = a4(VerticalOrigin::Bottom);
        for offset in [
            Spacing { x: 0.0, y: -1e30 },
            Spacing { x: f32::NAN, y: f32::NAN },
            Spacing { x: f32::NEG_INFINITY, y: 0.0 },
            Spacing { x: 1e30, y: 1e30 },
        ] {
            let mut options = pattern(PatternMode::Default);
            options.offset = offset;
            let anchors = compute_anchors(&frame, &Placement::Pattern(options));
            assert!(anchors.len() <= 15);
            assert_contained(&frame, &anchors);
        }
    }

    #[test]
    fn test_tiny_spacing_is_bounded() {
        let frame = a4(VerticalOrigin::Top);
        let mut options = pattern(PatternMode::Default);
        options.spacing = Spacing { x: 1e-30, y: 1e-30 };
        let anchors = compute_anchors(&frame, &Placement::Pattern(options));
        assert_eq!(anchors.len(), MAX_GRID_ANCHORS);
    }

    #[test]
    fn test_tiled_three_columns() {
        let frame = a4(VerticalOrigin::Top);
        let anchors = compute_anchors(&frame, &Placement::Pattern(pattern(PatternMode::Tiled)));
        // floor(742 / 150) = 4 rows
        assert_eq!(anchors.len(), 12);
        let column_w = 495.0 / 3.0;
        assert!((anchors[0].x - (50.0 + column_w / 2.0)).abs() < 1e-3);
        assert!((anchors[1].x - (50.0 + column_w * 1.5)).abs() < 1e-3);
        assert_contained(&frame, &anchors);
    }

    #[test]
    fn test_tiled_minimum_one_row() {
        let frame = Frame::new(400.0, 120.0, 50.0, 10.0, VerticalOrigin::Top);
        let anchors = compute_anchors(&frame, &Placement::Pattern(pattern(PatternMode::Tiled)));
        assert_eq!(anchors.len(), 3);
    }

    #[test]
    fn test_random_is_deterministic_with_seed() {
        let frame = a4(VerticalOrigin::Bottom);
        let mut options = pattern(PatternMode::Random);
        options.random_seed = Some(1234);
        let placement = Placement::Pattern(options);
        let first = compute_anchors(&frame, &placement);
        let second = compute_anchors(&frame, &placement);
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert_contained(&frame, &first);
    }

    #[test]
    fn test_random_avoid_overlap() {
        let frame = a4(VerticalOrigin::Top);
        let mut options = pattern(PatternMode::Random);
        options.random_seed = Some(99);
        options.avoid_overlap = true;
        options.density = 3.0;
        let anchors = compute_anchors(&frame, &Placement::Pattern(options));
        // Target is floor(595 * 842 * 3 / 30000) = 50; overlap rejection drops some
        assert!(anchors.len() <= 50);
        for (i, a) in anchors.iter().enumerate() {
            for b in &anchors[i + 1..] {
                assert!(a.distance(b) >= 150.0, "{:?} too close to {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_random_target_count_without_overlap_check() {
        let frame = a4(VerticalOrigin::Top);
        let mut options = pattern(PatternMode::Random);
        options.random_seed = Some(5);
        let anchors = compute_anchors(&frame, &Placement::Pattern(options));
        // floor(595 * 842 / 30000) = 16
        assert_eq!(anchors.len(), 16);
    }

    #[test]
    fn test_corner_bottom_right_pdf() {
        let frame = Frame::new(612.0, 792.0, 50.0, 24.0, VerticalOrigin::Bottom);
        let anchors = compute_anchors(
            &frame,
            &Placement::Corner {
                corner: Corner::BottomRight,
            },
        );
        assert_eq!(anchors, vec![Point::new(562.0, 74.0)]);
    }

    #[test]
    fn test_corner_top_left_canvas() {
        let frame = Frame::new(800.0, 600.0, 50.0, 24.0, VerticalOrigin::Top);
        let anchors = compute_anchors(&frame, &Placement::Corner { corner: Corner::TopLeft });
        assert_eq!(anchors, vec![Point::new(50.0, 74.0)]);
    }

    #[test]
    fn test_edges_and_center() {
        let frame = Frame::new(800.0, 600.0, 50.0, 0.0, VerticalOrigin::Top);
        assert_eq!(
            compute_anchors(&frame, &Placement::Center),
            vec![Point::new(400.0, 300.0)]
        );
        assert_eq!(
            compute_anchors(&frame, &Placement::Edge { edge: Edge::Left }),
            vec![Point::new(50.0, 300.0)]
        );
        assert_eq!(
            compute_anchors(&frame, &Placement::Edge { edge: Edge::Bottom }),
            vec![Point::new(400.0, 550.0)]
        );
    }

    #[test]
    fn test_small_surface_falls_back_to_center() {
        let frame = Frame::new(80.0, 60.0, 50.0, 10.0, VerticalOrigin::Top);
        let anchors = compute_anchors(&frame, &Placement::Pattern(pattern(PatternMode::Default)));
        assert_eq!(anchors, vec![Point::new(40.0, 30.0)]);
    }

    #[test]
    fn test_containment_across_modes() {
        let frames = [
            Frame::new(100.0, 100.0, 50.0, 30.0, VerticalOrigin::Top),
            Frame::new(1920.0, 1080.0, 50.0, 60.0, VerticalOrigin::Top),
            Frame::new(612.0, 792.0, 50.0, 18.0, VerticalOrigin::Bottom),
        ];
        let placements = [
            Placement::Center,
            Placement::Corner { corner: Corner::TopRight },
            Placement::Corner { corner: Corner::BottomLeft },
            Placement::Edge { edge: Edge::Top },
            Placement::Edge { edge: Edge::Right },
            Placement::Pattern(pattern(PatternMode::Default)),
            Placement::Pattern(pattern(PatternMode::Tiled)),
            Placement::Pattern(PatternOptions {
                random_seed: Some(3),
                ..pattern(PatternMode::Random)
            }),
        ];
        for frame in &frames {
            for placement in &placements {
                assert_contained(frame, &compute_anchors(frame, placement));
            }
        }
    }

    #[test]
    fn test_lcg_sequence() {
        let mut rng = Lcg::new(0);
        assert_eq!(rng.next_u32(), 1_013_904_223);
        assert_eq!(rng.next_u32(), 1_196_435_762);
    }
}
