//! Point snapping policies applied to raw pointer coordinates.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapMode {
    None,
    Rounded,
    #[default]
    Grid,
    SecondaryGrid,
}

/// Maps a raw point to an adjusted one. Returning `None` means "leave the point as is".
pub trait SnapProvider {
    fn snap_point(&self, point: Point, mode: SnapMode) -> Option<Point>;
}

/// Snaps to whole units or to one of two square grids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSnapper {
    grid: f64,
    secondary_grid: f64,
}

impl GridSnapper {
    pub fn new(grid: f64, secondary_grid: f64) -> Self {
        Self {
            grid,
            secondary_grid,
        }
    }
}

fn round_to(v: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return v;
    }
    (v / step).round() * step
}

impl SnapProvider for GridSnapper {
    fn snap_point(&self, point: Point, mode: SnapMode) -> Option<Point> {
        let step = match mode {
            SnapMode::None => return None,
            SnapMode::Rounded => 1.0,
            SnapMode::Grid => self.grid,
            SnapMode::SecondaryGrid => self.secondary_grid,
        };
        Some(Point::new(round_to(point.x, step), round_to(point.y, step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_modes() {
        let s = GridSnapper::new(8.0, 32.0);
        let p = Point::new(13.4, 2.6);
        assert_eq!(s.snap_point(p, SnapMode::None), None);
        assert_eq!(s.snap_point(p, SnapMode::Rounded), Some(Point::new(13.0, 3.0)));
        assert_eq!(s.snap_point(p, SnapMode::Grid), Some(Point::new(16.0, 0.0)));
        assert_eq!(
            s.snap_point(Point::new(50.0, 10.0), SnapMode::SecondaryGrid),
            Some(Point::new(64.0, 0.0))
        );
    }

    #[test]
    fn zero_spacing_is_identity() {
        let s = GridSnapper::new(0.0, 0.0);
        let p = Point::new(1.25, 7.5);
        assert_eq!(s.snap_point(p, SnapMode::Grid), Some(p));
    }
}
