//! Layout algorithms for normalize and arrange.
//!
//! These only compute target geometry. The scene wraps the results in
//! commands so each operation is one undo step.

use crate::config::NormalizePolicy;
use crate::item::Item;
use kurbo::{Point, Rect, Vec2};

/// Dimension matched by a normalize operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    Height,
    Width,
    /// Rendered area.
    Size,
}

impl NormalizeMode {
    pub fn label(self) -> &'static str {
        match self {
            NormalizeMode::Height => "Normalize height",
            NormalizeMode::Width => "Normalize width",
            NormalizeMode::Size => "Normalize size",
        }
    }

    /// Unscaled measure of the visible region.
    fn base(self, item: &Item) -> f64 {
        let crop = item.crop();
        match self {
            NormalizeMode::Height => crop.height(),
            NormalizeMode::Width => crop.width(),
            NormalizeMode::Size => crop.area(),
        }
    }

    fn rendered(self, item: &Item) -> f64 {
        let size = item.rendered_size();
        match self {
            NormalizeMode::Height => size.height,
            NormalizeMode::Width => size.width,
            NormalizeMode::Size => size.width * size.height,
        }
    }
}

/// Target scale for each item so they all render at the same height,
/// width or area. Items already at the target keep their scale exactly.
pub fn normalize_scales(items: &[&Item], mode: NormalizeMode, policy: NormalizePolicy) -> Vec<f64> {
    let measures: Vec<f64> = items.iter().map(|item| mode.rendered(item)).collect();
    let Some(target) = pick_target(&measures, policy) else {
        return Vec::new();
    };

    items
        .iter()
        .zip(&measures)
        .map(|(item, &measure)| {
            if (measure - target).abs() <= f64::EPSILON * target.abs() {
                return item.scale();
            }
            let base = mode.base(item);
            let ratio = target / base;
            // Nothing to scale against, or a degenerate target.
            if base <= 0.0 || !(ratio.is_finite() && ratio > 0.0) {
                return item.scale();
            }
            match mode {
                NormalizeMode::Size => ratio.sqrt(),
                _ => ratio,
            }
        })
        .collect()
}

fn pick_target(measures: &[f64], policy: NormalizePolicy) -> Option<f64> {
    if measures.is_empty() {
        return None;
    }
    let target = match policy {
        NormalizePolicy::Largest => measures.iter().copied().fold(f64::MIN, f64::max),
        NormalizePolicy::Smallest => measures.iter().copied().fold(f64::MAX, f64::min),
        NormalizePolicy::Mean => measures.iter().sum::<f64>() / measures.len() as f64,
    };
    Some(target)
}

fn union_bounds(items: &[&Item]) -> Option<Rect> {
    items
        .iter()
        .map(|item| item.bounds())
        .reduce(|acc, bounds| acc.union(bounds))
}

/// Lay items out in a row (or column) in the given order, starting at the
/// top-left of their current combined bounds. Returns new positions.
pub fn arrange_linear(items: &[&Item], vertical: bool, gap: f64) -> Vec<Point> {
    let Some(anchor) = union_bounds(items) else {
        return Vec::new();
    };

    let mut cursor = if vertical { anchor.y0 } else { anchor.x0 };
    items
        .iter()
        .map(|item| {
            let bounds = item.bounds();
            let delta = if vertical {
                Vec2::new(anchor.x0 - bounds.x0, cursor - bounds.y0)
            } else {
                Vec2::new(cursor - bounds.x0, anchor.y0 - bounds.y0)
            };
            cursor += if vertical { bounds.height() } else { bounds.width() } + gap;
            item.position + delta
        })
        .collect()
}

/// A grid of `cols` columns and the resulting cell sizes.
#[derive(Debug, Clone, PartialEq)]
struct Grid {
    col_widths: Vec<f64>,
    row_heights: Vec<f64>,
}

impl Grid {
    fn new(sizes: &[(f64, f64)], cols: usize) -> Self {
        let rows = sizes.len().div_ceil(cols);
        let mut col_widths = vec![0.0_f64; cols];
        let mut row_heights = vec![0.0_f64; rows];
        for (i, &(w, h)) in sizes.iter().enumerate() {
            col_widths[i % cols] = col_widths[i % cols].max(w);
            row_heights[i / cols] = row_heights[i / cols].max(h);
        }
        Self {
            col_widths,
            row_heights,
        }
    }

    fn extent(&self, gap: f64) -> (f64, f64) {
        let width = self.col_widths.iter().sum::<f64>() + gap * (self.col_widths.len() - 1) as f64;
        let height = self.row_heights.iter().sum::<f64>() + gap * (self.row_heights.len() - 1) as f64;
        (width, height)
    }

    fn offsets(lengths: &[f64], gap: f64) -> Vec<f64> {
        let mut offset = 0.0;
        lengths
            .iter()
            .map(|length| {
                let start = offset;
                offset += length + gap;
                start
            })
            .collect()
    }
}

/// Choose a column count whose grid's aspect ratio is closest to
/// `target_aspect` (compared on a log scale). Ties go to fewer columns.
fn best_grid(sizes: &[(f64, f64)], target_aspect: f64, gap: f64) -> Grid {
    let target = if target_aspect.is_finite() && target_aspect > 0.0 {
        target_aspect
    } else {
        1.0
    };

    let mut best: Option<(f64, Grid)> = None;
    for cols in 1..=sizes.len() {
        let grid = Grid::new(sizes, cols);
        let (width, height) = grid.extent(gap);
        let score = if width > 0.0 && height > 0.0 {
            ((width / height) / target).ln().abs()
        } else {
            f64::INFINITY
        };
        if best.as_ref().is_none_or(|(best_score, _)| score < *best_score) {
            best = Some((score, grid));
        }
    }
    best.map(|(_, grid)| grid).unwrap_or_else(|| Grid::new(sizes, 1))
}

/// Pack items into the grid that best matches `target_aspect`, in order,
/// row by row. Each item is centered in its cell and the layout keeps the
/// center of the items' combined bounds. Returns new positions.
pub fn arrange_optimal(items: &[&Item], target_aspect: f64, gap: f64) -> Vec<Point> {
    let Some(previous) = union_bounds(items) else {
        return Vec::new();
    };

    let sizes: Vec<(f64, f64)> = items
        .iter()
        .map(|item| {
            let bounds = item.bounds();
            (bounds.width(), bounds.height())
        })
        .collect();
    let grid = best_grid(&sizes, target_aspect, gap);
    let cols = grid.col_widths.len();
    let (width, height) = grid.extent(gap);
    let col_x = Grid::offsets(&grid.col_widths, gap);
    let row_y = Grid::offsets(&grid.row_heights, gap);
    let origin = previous.center() - Vec2::new(width / 2.0, height / 2.0);

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let (col, row) = (i % cols, i / cols);
            let cell_center = Point::new(
                origin.x + col_x[col] + grid.col_widths[col] / 2.0,
                origin.y + row_y[row] + grid.row_heights[row] / 2.0,
            );
            item.position + (cell_center - item.bounds().center())
        })
        .collect()
}
