//! Neighborhood definitions for focal and flow operations

/// Rectangular focal window centered on a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighborhood {
    pub rows: usize,
    pub cols: usize,
}

impl Neighborhood {
    /// 3x3 rectangle
    pub const RECT_3X3: Neighborhood = Neighborhood { rows: 3, cols: 3 };

    pub fn rectangle(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Relative (row, col) offsets covered by the window, center included.
    ///
    /// Even sizes extend one further toward the top-left.
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let (hr, hc) = ((self.rows / 2) as isize, (self.cols / 2) as isize);
        let (r0, c0) = (-hr, -hc);
        let (r1, c1) = (r0 + self.rows as isize - 1, c0 + self.cols as isize - 1);
        (r0..=r1)
            .flat_map(|dr| (c0..=c1).map(move |dc| (dr, dc)))
            .collect()
    }
}

/// D8 flow directions.
///
/// Codes 1..=8 run counter-clockwise from east. 0 marks a cell with no
/// outflow.
pub mod d8 {
    /// (row_offset, col_offset) indexed by direction code
    pub const OFFSETS: [(isize, isize); 9] = [
        (0, 0),   // none
        (0, 1),   // E
        (-1, 1),  // NE
        (-1, 0),  // N
        (-1, -1), // NW
        (0, -1),  // W
        (1, -1),  // SW
        (1, 0),   // S
        (1, 1),   // SE
    ];

    /// Step length in cells
    pub const DISTANCES: [f64; 9] = [
        0.0,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
    ];

    pub fn opposite(dir: u8) -> u8 {
        if dir == 0 { 0 } else { ((dir - 1 + 4) % 8) + 1 }
    }

    /// Neighbor of (row, col) in direction `dir`, if inside the grid
    pub fn step(row: usize, col: usize, dir: u8, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = *OFFSETS.get(dir as usize)?;
        if dir == 0 {
            return None;
        }
        let r = row as isize + dr;
        let c = col as isize + dc;
        (r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols)
            .then_some((r as usize, c as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_offsets() {
        let offsets = Neighborhood::RECT_3X3.offsets();
        assert_eq!(offsets.len(), 9);
        assert!(offsets.contains(&(-1, -1)));
        assert!(offsets.contains(&(1, 1)));
    }

    #[test]
    fn test_d8_opposite() {
        assert_eq!(d8::opposite(1), 5);
        assert_eq!(d8::opposite(3), 7);
        assert_eq!(d8::opposite(2), 6);
    }

    #[test]
    fn test_d8_step_edges() {
        assert_eq!(d8::step(0, 0, 3, 5, 5), None);
        assert_eq!(d8::step(0, 0, 8, 5, 5), Some((1, 1)));
        assert_eq!(d8::step(2, 2, 0, 5, 5), None);
    }
}
