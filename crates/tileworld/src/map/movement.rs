use tracing::{debug, warn};

use crate::geometry::{Position, Vector};
use crate::tile::Direction;

use super::{Slot, TileMap};

/// Two boundary intersections closer than this are treated as a corner hit.
pub const DIAGONAL_TIE_EPSILON: f32 = 1e-4;

/// Upper bound on tile transitions within one move. Each pass either stops
/// or crosses into another slot, so a bounded window never needs this many.
const MAX_MOVE_STEPS: usize = 64;

/// Which boundaries of the current tile an intended end point lies beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    None,
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Crossing {
    /// Classifies `point` (tile-local) against a tile of half-width
    /// `half_extent`. A point exactly on a boundary does not cross it.
    pub fn classify(point: Position, half_extent: f32) -> Crossing {
        let up = point.z < -half_extent;
        let down = point.z > half_extent;
        let left = point.x < -half_extent;
        let right = point.x > half_extent;
        match (up, down, left, right) {
            (true, _, true, _) => Crossing::UpLeft,
            (true, _, _, true) => Crossing::UpRight,
            (_, true, true, _) => Crossing::DownLeft,
            (_, true, _, true) => Crossing::DownRight,
            (true, ..) => Crossing::Up,
            (_, true, ..) => Crossing::Down,
            (_, _, true, _) => Crossing::Left,
            (_, _, _, true) => Crossing::Right,
            _ => Crossing::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Up,
    Down,
    Left,
    Right,
}

impl Edge {
    fn direction(self) -> Direction {
        match self {
            Edge::Up => Direction::Up,
            Edge::Down => Direction::Down,
            Edge::Left => Direction::Left,
            Edge::Right => Direction::Right,
        }
    }

    fn endpoints(self, half: f32) -> (Position, Position) {
        let corner = |x: f32, z: f32| Position::new(x, 0.0, z);
        match self {
            Edge::Up => (corner(-half, -half), corner(half, -half)),
            Edge::Down => (corner(-half, half), corner(half, half)),
            Edge::Left => (corner(-half, -half), corner(-half, half)),
            Edge::Right => (corner(half, -half), corner(half, half)),
        }
    }

    /// Pins the coordinate the edge fixes so boundary points sit exactly on it.
    fn snap(self, point: Position, half: f32) -> Position {
        match self {
            Edge::Up => Position { z: -half, ..point },
            Edge::Down => Position { z: half, ..point },
            Edge::Left => Position { x: -half, ..point },
            Edge::Right => Position { x: half, ..point },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundaryHit {
    point: Position,
    direction: Direction,
}

/// Result of resolving one move against the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    /// Slot the move ended in, in the window as it was before the move.
    pub slot: Slot,
    /// End position relative to the center of the tile in `slot`. After
    /// [`TileMap::move_player`] that tile is the center, so this is the
    /// player's new position.
    pub local: Position,
    /// End position relative to the window center before the move.
    pub world: Position,
    /// True when an impassable or unloaded cell stopped the move at a tile
    /// boundary.
    pub blocked: bool,
}

impl TileMap {
    /// Walks `distance` along `direction` from `start` through the window,
    /// scaling the remaining distance by each tile's fluidity and stopping at
    /// boundaries into impassable cells. The map is not changed.
    ///
    /// `start` is relative to the window center and must lie inside the
    /// center tile. Only the XZ part of `direction` is used; the returned
    /// positions keep `start.y`.
    pub fn resolve_movement(
        &self,
        start: Position,
        direction: Vector,
        distance: f32,
    ) -> MoveOutcome {
        let stay = MoveOutcome {
            slot: Slot::CENTER,
            local: start,
            world: start,
            blocked: false,
        };
        let heading = Vector::new(direction.x, 0.0, direction.z);
        if distance.is_nan() || distance <= 0.0 || heading.is_zero() || !start.is_finite() {
            return stay;
        }
        let heading = heading.normalized();
        if !heading.x.is_finite() || !heading.z.is_finite() {
            return stay;
        }

        let half = self.tile_size / 2.0;
        let mut slot = Slot::CENTER;
        let mut from = start.flat();
        let mut remaining = distance;
        let mut blocked = false;

        for step in 0.. {
            if step == MAX_MOVE_STEPS {
                warn!(distance, remaining, "move_step_limit_reached");
                break;
            }
            let fluidity = self.tiles[slot.index()].fluidity();
            if fluidity <= 0.0 {
                debug!(slot = slot.index(), "move_departs_impassable_tile");
                break;
            }

            let target = from + heading * (fluidity * remaining);
            let crossing = Crossing::classify(target, half);
            let hit = match crossing {
                Crossing::None => {
                    from = target;
                    break;
                }
                Crossing::Up => edge_hit(from, target, Edge::Up, half),
                Crossing::Down => edge_hit(from, target, Edge::Down, half),
                Crossing::Left => edge_hit(from, target, Edge::Left, half),
                Crossing::Right => edge_hit(from, target, Edge::Right, half),
                Crossing::UpLeft => {
                    corner_hit(from, target, Edge::Up, Edge::Left, Direction::UpLeft, half)
                }
                Crossing::UpRight => {
                    corner_hit(from, target, Edge::Up, Edge::Right, Direction::UpRight, half)
                }
                Crossing::DownLeft => corner_hit(
                    from,
                    target,
                    Edge::Down,
                    Edge::Left,
                    Direction::DownLeft,
                    half,
                ),
                Crossing::DownRight => corner_hit(
                    from,
                    target,
                    Edge::Down,
                    Edge::Right,
                    Direction::DownRight,
                    half,
                ),
            };
            let Some(hit) = hit else {
                // Heading runs parallel to the crossed edge; nothing to resolve.
                break;
            };

            let travelled = from.distance_to(hit.point);
            remaining -= travelled / fluidity;

            let next = slot
                .neighbor(hit.direction)
                .filter(|next| self.tiles[next.index()].fluidity() > 0.0);
            let Some(next) = next else {
                // Any further step would start on this boundary and travel nothing.
                from = hit.point;
                blocked = true;
                break;
            };
            let (dx, dy) = hit.direction.delta();
            let shift = Vector::new(
                dx as f32 * self.tile_size,
                0.0,
                dy as f32 * self.tile_size,
            );
            from = hit.point - shift;
            slot = next;
            // A pass that started on the boundary hands over the tile and ends the move.
            if remaining <= 0.0 || travelled <= 0.0 {
                break;
            }
        }

        let local = Position::new(from.x, start.y, from.z);
        let offset = self.offsets[slot.index()];
        MoveOutcome {
            slot,
            local,
            world: local + Vector::new(offset.x, 0.0, offset.z),
            blocked,
        }
    }

    /// Resolves the move and re-centers the window on the tile the player
    /// ended in. `outcome.local` is the player's position relative to the
    /// (possibly new) center.
    pub fn move_player(&mut self, start: Position, direction: Vector, distance: f32) -> MoveOutcome {
        let outcome = self.resolve_movement(start, direction, distance);
        if outcome.slot != Slot::CENTER {
            self.recenter(outcome.slot);
        }
        outcome
    }
}

fn edge_hit(from: Position, target: Position, edge: Edge, half: f32) -> Option<BoundaryHit> {
    let (a, b) = edge.endpoints(half);
    let point = line_intersection(from, target, a, b)?;
    Some(BoundaryHit {
        point: edge.snap(point, half),
        direction: edge.direction(),
    })
}

/// Picks whichever of the two crossed edges the path reaches first, or the
/// corner itself when both are reached at the same point.
fn corner_hit(
    from: Position,
    target: Position,
    vertical: Edge,
    horizontal: Edge,
    diagonal: Direction,
    half: f32,
) -> Option<BoundaryHit> {
    let through_vertical = edge_hit(from, target, vertical, half);
    let through_horizontal = edge_hit(from, target, horizontal, half);
    let (v, h) = match (through_vertical, through_horizontal) {
        (Some(v), Some(h)) => (v, h),
        (v, h) => return v.or(h),
    };
    let to_vertical = from.distance_to(v.point);
    let to_horizontal = from.distance_to(h.point);
    if (to_vertical - to_horizontal).abs() <= DIAGONAL_TIE_EPSILON {
        let corner = horizontal.snap(vertical.snap(v.point, half), half);
        Some(BoundaryHit {
            point: corner,
            direction: diagonal,
        })
    } else if to_vertical < to_horizontal {
        Some(v)
    } else {
        Some(h)
    }
}

/// Intersection of the infinite lines through `p1, p2` and `p3, p4` in the
/// XZ plane. `None` when they are parallel.
fn line_intersection(p1: Position, p2: Position, p3: Position, p4: Position) -> Option<Position> {
    let denominator = (p1.x - p2.x) * (p3.z - p4.z) - (p1.z - p2.z) * (p3.x - p4.x);
    if denominator == 0.0 {
        return None;
    }
    let a = p1.x * p2.z - p1.z * p2.x;
    let b = p3.x * p4.z - p3.z * p4.x;
    let x = (a * (p3.x - p4.x) - (p1.x - p2.x) * b) / denominator;
    let z = (a * (p3.z - p4.z) - (p1.z - p2.z) * b) / denominator;
    Some(Position::new(x, 0.0, z))
}
