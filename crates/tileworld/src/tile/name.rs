use std::fmt;

/// Largest grid coordinate magnitude accepted from config or save files.
/// Keeps neighbor arithmetic far from the `i32` limits.
pub const MAX_GRID_COORD: i32 = 1_000_000_000;

/// Grid position of a cell. `x` grows toward +X (right), `y` toward +Z (down).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Both components lie within `±MAX_GRID_COORD`.
    pub fn is_in_bounds(self) -> bool {
        self.x.unsigned_abs() <= MAX_GRID_COORD.unsigned_abs()
            && self.y.unsigned_abs() <= MAX_GRID_COORD.unsigned_abs()
    }
}

/// A tile file name split into its parts: `<prefix>_<x>_<y>.<extension>`.
///
/// This is the only place tile names are parsed or built; every other module
/// goes through [`TileName::parse`] and the [`fmt::Display`] impl.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileName {
    pub prefix: String,
    pub coord: GridCoord,
    pub extension: String,
}

impl TileName {
    pub fn new(prefix: impl Into<String>, coord: GridCoord, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            coord,
            extension: extension.into(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (stem, extension) = raw.rsplit_once('.')?;
        let (rest, y) = stem.rsplit_once('_')?;
        let (prefix, x) = rest.rsplit_once('_')?;
        if prefix.is_empty() || extension.is_empty() {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            coord: GridCoord {
                x: x.parse().ok()?,
                y: y.parse().ok()?,
            },
            extension: extension.to_string(),
        })
    }

    /// Name of the cell `(dx, dy)` away, keeping prefix and extension.
    pub fn neighbor(&self, dx: i32, dy: i32) -> Self {
        Self {
            prefix: self.prefix.clone(),
            coord: self.coord.offset(dx, dy),
            extension: self.extension.clone(),
        }
    }
}

impl fmt::Display for TileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}.{}",
            self.prefix, self.coord.x, self.coord.y, self.extension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_are_inverse() {
        let name = TileName::parse("tile_3_-7.txt").expect("parse");
        assert_eq!(name.prefix, "tile");
        assert_eq!(name.coord, GridCoord::new(3, -7));
        assert_eq!(name.extension, "txt");
        assert_eq!(name.to_string(), "tile_3_-7.txt");
    }

    #[test]
    fn prefix_may_contain_underscores() {
        let name = TileName::parse("north_shore_0_12.tile").expect("parse");
        assert_eq!(name.prefix, "north_shore");
        assert_eq!(name.coord, GridCoord::new(0, 12));
    }

    #[test]
    fn malformed_names_are_rejected() {
        for raw in [
            "empty",
            "tile_1_2",
            "tile_x_2.txt",
            "tile_1.txt",
            "_1_2.txt",
            "tile_1_2.",
        ] {
            assert!(TileName::parse(raw).is_none(), "{raw} should not parse");
        }
    }

    #[test]
    fn offset_saturates_at_integer_limits() {
        let edge = GridCoord::new(i32::MAX, i32::MIN);
        assert_eq!(edge.offset(1, -1), edge);
        assert!(!edge.is_in_bounds());
        assert!(GridCoord::new(MAX_GRID_COORD, -MAX_GRID_COORD).is_in_bounds());
    }

    #[test]
    fn neighbor_applies_grid_delta() {
        let name = TileName::parse("tile_0_0.txt").expect("parse");
        assert_eq!(name.neighbor(-1, 1).to_string(), "tile_-1_1.txt");
    }
}
