mod movement;

use std::mem;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, WorldConfig};
use crate::geometry::{Position, Vector};
use crate::render::{DrawParams, Drawable, ModelLibrary, RenderBackend};
use crate::storage::{StorageError, TileStore};
use crate::tile::{
    decode_tile, is_encodable_model_ref, Direction, GridCoord, Tile, TileName, TileOffset,
};

pub use movement::{Crossing, MoveOutcome, DIAGONAL_TIE_EPSILON};

pub const WINDOW_TILES: usize = 9;

/// Index into the 3×3 window, row-major. Row 0 is up (−Z), column 0 is left (−X).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(u8);

impl Slot {
    pub const CENTER: Slot = Slot(4);

    pub fn new(index: usize) -> Option<Slot> {
        (index < WINDOW_TILES).then_some(Slot(index as u8))
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        (0..WINDOW_TILES as u8).map(Slot)
    }

    fn from_row_col(row: i32, col: i32) -> Option<Slot> {
        if !(0..3).contains(&row) || !(0..3).contains(&col) {
            return None;
        }
        Some(Slot((row * 3 + col) as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn row(self) -> i32 {
        i32::from(self.0) / 3
    }

    fn col(self) -> i32 {
        i32::from(self.0) % 3
    }

    /// Grid delta from the window center.
    pub fn delta(self) -> (i32, i32) {
        (self.col() - 1, self.row() - 1)
    }

    /// The slot next to this one, or `None` past the window edge.
    pub fn neighbor(self, direction: Direction) -> Option<Slot> {
        let (dx, dy) = direction.delta();
        Slot::from_row_col(self.row() + dy, self.col() + dx)
    }

    pub fn offset(self, tile_size: f32) -> TileOffset {
        let (dx, dy) = self.delta();
        TileOffset {
            x: dx as f32 * tile_size,
            z: dy as f32 * tile_size,
        }
    }
}

#[derive(Debug, Error)]
pub enum TileMapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
struct NewTileDefaults {
    base_model: String,
    fluidity: f32,
}

/// The 3×3 window of live tiles around the player.
///
/// Positions handed to and returned from the map are relative to the center
/// of the center tile. The window's place in the grid is carried by the
/// center tile's name; slot `i` holds cell `center + i.delta()` or an empty
/// sentinel when that cell has no file yet.
pub struct TileMap {
    tile_size: f32,
    offsets: [TileOffset; WINDOW_TILES],
    tiles: [Tile; WINDOW_TILES],
    pending_writes: [bool; WINDOW_TILES],
    center: TileName,
    defaults: NewTileDefaults,
    store: Arc<dyn TileStore>,
}

impl TileMap {
    /// Loads the window around `center`. A missing center cell is brought to
    /// life so the player always stands on a populated tile.
    pub fn open(
        config: &WorldConfig,
        store: Arc<dyn TileStore>,
        center: TileName,
    ) -> Result<Self, TileMapError> {
        config.validate()?;
        let tile_size = config.tile_size;
        let offsets = std::array::from_fn(|i| Slot(i as u8).offset(tile_size));
        let tiles = std::array::from_fn(|_| Tile::empty());
        let mut map = Self {
            tile_size,
            offsets,
            tiles,
            pending_writes: [false; WINDOW_TILES],
            center,
            defaults: NewTileDefaults {
                base_model: config.default_base_model.clone(),
                fluidity: config.default_fluidity,
            },
            store,
        };

        let mut loaded = 0usize;
        for slot in Slot::all() {
            let tile = map.load_cell(slot);
            if !tile.is_empty() {
                loaded += 1;
            }
            map.install(slot, tile);
        }
        if map.tiles[Slot::CENTER.index()].is_empty() {
            map.bring_slot_to_life(Slot::CENTER)?;
        }
        info!(
            center = %map.center,
            tile_size,
            loaded,
            "tile_window_opened"
        );
        Ok(map)
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn center_name(&self) -> &TileName {
        &self.center
    }

    pub fn center_coord(&self) -> GridCoord {
        self.center.coord
    }

    pub fn tile(&self, slot: Slot) -> &Tile {
        &self.tiles[slot.index()]
    }

    pub fn tiles(&self) -> impl Iterator<Item = (Slot, &Tile)> {
        Slot::all().map(move |slot| (slot, &self.tiles[slot.index()]))
    }

    pub fn slot_offset(&self, slot: Slot) -> TileOffset {
        self.offsets[slot.index()]
    }

    /// Name of the cell a slot covers, whether or not it is alive.
    pub fn cell_name(&self, slot: Slot) -> TileName {
        let (dx, dy) = slot.delta();
        self.center.neighbor(dx, dy)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.pending_writes.iter().any(|pending| *pending)
    }

    /// True when `position` lies inside the window's total extent.
    pub fn is_position_valid(&self, position: Position) -> bool {
        let limit = 1.5 * self.tile_size;
        position.x.abs() <= limit && position.z.abs() <= limit
    }

    /// Slot containing `position`. A point exactly on a boundary between a
    /// straight slot and a corner belongs to the straight slot.
    pub fn slot_at(&self, position: Position) -> Option<Slot> {
        if !self.is_position_valid(position) {
            return None;
        }
        let half = self.tile_size / 2.0;
        let band = |value: f32| {
            if value < -half {
                0
            } else if value > half {
                2
            } else {
                1
            }
        };
        Slot::from_row_col(band(position.z), band(position.x))
    }

    /// Adds a static object at `position` to the tile under it and persists
    /// that tile. `Ok(None)` when the position is outside the window, the
    /// cell there has not been brought to life, or `model_ref` cannot be
    /// written to a tile file.
    pub fn place_object(
        &mut self,
        model_ref: &str,
        position: Position,
        rotation_degrees: f32,
    ) -> Result<Option<Slot>, TileMapError> {
        if !is_encodable_model_ref(model_ref) {
            debug!(model = model_ref, "place_object_unencodable_model");
            return Ok(None);
        }
        let Some(slot) = self.slot_at(position) else {
            debug!(x = position.x, z = position.z, "place_object_outside_window");
            return Ok(None);
        };
        if self.tiles[slot.index()].is_empty() {
            debug!(slot = slot.index(), "place_object_on_empty_cell");
            return Ok(None);
        }
        let offset = self.offsets[slot.index()];
        let local = position - Vector::new(offset.x, 0.0, offset.z);
        self.tiles[slot.index()].add_model(model_ref, local, rotation_degrees);
        self.persist(slot)?;
        debug!(
            tile = self.tiles[slot.index()].name(),
            model = model_ref,
            "object_placed"
        );
        Ok(Some(slot))
    }

    /// Upgrades the empty cell under `position` to a populated, persisted
    /// tile. `Ok(None)` when the position is outside the window or the cell
    /// is already alive.
    pub fn bring_to_life(&mut self, position: Position) -> Result<Option<Slot>, TileMapError> {
        match self.slot_at(position) {
            Some(slot) => self.bring_slot_to_life(slot),
            None => Ok(None),
        }
    }

    pub fn bring_slot_to_life(&mut self, slot: Slot) -> Result<Option<Slot>, TileMapError> {
        if !self.tiles[slot.index()].is_empty() {
            return Ok(None);
        }
        let name = self.cell_name(slot);
        let mut tile = Tile::populated(&name, &self.defaults.base_model, self.defaults.fluidity);
        let offset = self.offsets[slot.index()];
        tile.set_offset(offset.x, offset.z);
        self.store.write(tile.name(), &tile.serialize())?;
        info!(tile = tile.name(), slot = slot.index(), "tile_brought_to_life");
        self.tiles[slot.index()] = tile;
        self.pending_writes[slot.index()] = false;
        Ok(Some(slot))
    }

    fn persist(&mut self, slot: Slot) -> Result<(), StorageError> {
        let tile = &self.tiles[slot.index()];
        match self.store.write(tile.name(), &tile.serialize()) {
            Ok(()) => {
                self.pending_writes[slot.index()] = false;
                Ok(())
            }
            Err(error) => {
                self.pending_writes[slot.index()] = true;
                Err(error)
            }
        }
    }

    fn load_cell(&self, slot: Slot) -> Tile {
        let name = self.cell_name(slot).to_string();
        match self.store.read(&name) {
            Ok(Some(text)) => decode_tile(&name, &text),
            Ok(None) => Tile::empty(),
            Err(error) => {
                warn!(tile = %name, error = %error, "tile_read_failed_using_empty");
                Tile::empty()
            }
        }
    }

    fn install(&mut self, slot: Slot, mut tile: Tile) {
        let offset = self.offsets[slot.index()];
        tile.set_offset(offset.x, offset.z);
        self.tiles[slot.index()] = tile;
    }

    /// Shifts the window so the cell in `slot` becomes the center. Tiles that
    /// stay inside the window are kept, the rest are dropped and the newly
    /// exposed cells are loaded or synthesized.
    fn recenter(&mut self, slot: Slot) {
        if slot == Slot::CENTER {
            return;
        }
        let (dx, dy) = slot.delta();
        let next_center = self.center.neighbor(dx, dy);
        let previous_center = mem::replace(&mut self.center, next_center);
        let mut previous: [Option<Tile>; WINDOW_TILES] =
            std::array::from_fn(|i| Some(mem::replace(&mut self.tiles[i], Tile::empty())));
        let previous_pending = mem::replace(&mut self.pending_writes, [false; WINDOW_TILES]);

        let mut reused = 0usize;
        let mut loaded = 0usize;
        for target in Slot::all() {
            let kept = Slot::from_row_col(target.row() + dy, target.col() + dx)
                .and_then(|source| {
                    let tile = previous[source.index()].take()?;
                    Some((tile, previous_pending[source.index()]))
                });
            let tile = match kept {
                Some((tile, pending)) => {
                    reused += 1;
                    self.pending_writes[target.index()] = pending;
                    tile
                }
                None => {
                    loaded += 1;
                    self.load_cell(target)
                }
            };
            self.install(target, tile);
        }

        for (index, tile) in previous.iter().enumerate() {
            let Some(tile) = tile else {
                continue;
            };
            if previous_pending[index] {
                self.flush_dropped(tile);
            }
        }

        info!(
            from = %previous_center,
            to = %self.center,
            reused,
            loaded,
            "tile_window_recentered"
        );
    }

    fn flush_dropped(&self, tile: &Tile) {
        if let Err(error) = self.store.write(tile.name(), &tile.serialize()) {
            warn!(tile = tile.name(), error = %error, "tile_changes_lost_on_recenter");
        }
    }
}

impl Drawable for TileMap {
    fn initialise(&mut self, models: &dyn ModelLibrary) {
        for tile in &mut self.tiles {
            tile.initialise(models);
        }
    }

    fn draw(
        &mut self,
        params: &DrawParams,
        models: &dyn ModelLibrary,
        backend: &mut dyn RenderBackend,
    ) {
        for tile in &mut self.tiles {
            tile.draw(params, models, backend);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::config::WorldConfig;
    use crate::storage::MemoryTileStore;
    use crate::tile::{GridCoord, Tile, TileName};

    use super::{Slot, TileMap};

    pub(crate) fn cell(x: i32, y: i32) -> TileName {
        TileName::new("tile", GridCoord::new(x, y), "txt")
    }

    /// Store with one file per `Some` entry, laid out around cell (0, 0) in
    /// window order.
    pub(crate) fn seeded_store(fluidities: [Option<f32>; 9]) -> Arc<MemoryTileStore> {
        let store = Arc::new(MemoryTileStore::new());
        for slot in Slot::all() {
            if let Some(fluidity) = fluidities[slot.index()] {
                let (dx, dy) = slot.delta();
                let name = cell(dx, dy);
                let tile = Tile::populated(&name, "ground", fluidity);
                store.insert(name.to_string(), tile.serialize());
            }
        }
        store
    }

    pub(crate) fn open_map(store: Arc<MemoryTileStore>) -> TileMap {
        TileMap::open(&WorldConfig::default(), store, cell(0, 0)).expect("open map")
    }

    pub(crate) fn uniform_map(fluidity: f32) -> TileMap {
        open_map(seeded_store([Some(fluidity); 9]))
    }
}
