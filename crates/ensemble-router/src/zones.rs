//! Zone grid
//!
//! The unit square is split into `side x side` equal cells, numbered
//! row-major from 1:
//!
//! ```text
//!  y=0 +---+---+
//!      | 1 | 2 |
//!      +---+---+
//!      | 3 | 4 |
//!  y=1 +---+---+
//!     x=0     x=1
//! ```

use ensemble_core::SessionId;
use std::collections::BTreeSet;

use crate::error::{Result, RouterError};

/// Fixed partition of the unit square into `count` zones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneGrid {
    count: u32,
    side: u32,
}

impl ZoneGrid {
    /// Build a grid; `count` must be a positive perfect square
    pub fn new(count: u32) -> Result<Self> {
        let side = (count as f64).sqrt().round() as u32;
        if count == 0 || side.checked_mul(side) != Some(count) {
            return Err(RouterError::InvalidZoneCount(count));
        }
        Ok(Self { count, side })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Zone containing the point `(x, y)`.
    ///
    /// Coordinates are clamped to [0, 1]; the right and bottom edges belong
    /// to the last column and row.
    pub fn classify(&self, x: f64, y: f64) -> u32 {
        let col = self.cell(x);
        let row = self.cell(y);
        row * self.side + col + 1
    }

    fn cell(&self, v: f64) -> u32 {
        let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        ((v * self.side as f64).floor() as u32).min(self.side - 1)
    }

    /// Zone for a newly placed session: the first zone nobody holds, or a
    /// shared zone picked by id once every zone is taken.
    pub fn first_free(&self, held: &BTreeSet<u32>, id: SessionId) -> u32 {
        (1..=self.count)
            .find(|zone| !held.contains(zone))
            .unwrap_or_else(|| (id.saturating_sub(1) % self.count as u64) as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_squares_only() {
        for count in [1, 4, 9, 16, 25, 100] {
            assert_eq!(ZoneGrid::new(count).unwrap().count(), count);
        }
        for count in [0, 2, 3, 5, 8, 10, 15] {
            assert!(matches!(
                ZoneGrid::new(count),
                Err(RouterError::InvalidZoneCount(c)) if c == count
            ));
        }
    }

    #[test]
    fn test_classify_quadrants() {
        let grid = ZoneGrid::new(4).unwrap();
        assert_eq!(grid.classify(0.1, 0.1), 1);
        assert_eq!(grid.classify(0.9, 0.1), 2);
        assert_eq!(grid.classify(0.1, 0.9), 3);
        assert_eq!(grid.classify(0.9, 0.9), 4);
        assert_eq!(grid.classify(0.5, 0.5), 4);
    }

    #[test]
    fn test_classify_edges_clamped() {
        let grid = ZoneGrid::new(9).unwrap();
        assert_eq!(grid.classify(1.0, 1.0), 9);
        assert_eq!(grid.classify(0.0, 0.0), 1);
        assert_eq!(grid.classify(-3.0, 7.0), 7);
        assert_eq!(grid.classify(f64::NAN, 0.5), 4);
    }

    #[test]
    fn test_first_free_then_shared() {
        let grid = ZoneGrid::new(4).unwrap();
        let mut held = BTreeSet::new();

        assert_eq!(grid.first_free(&held, 1), 1);
        held.insert(1);
        held.insert(3);
        assert_eq!(grid.first_free(&held, 7), 2);

        held.extend([2, 4]);
        assert_eq!(grid.first_free(&held, 5), 1);
        assert_eq!(grid.first_free(&held, 6), 2);
        assert_eq!(grid.first_free(&held, 8), 4);
    }
}
