mod codec;
mod name;

use std::sync::Arc;

use tracing::warn;

use crate::geometry::{Position, Vector};
use crate::render::{DrawParams, Drawable, ModelData, ModelLibrary, RenderBackend};

pub use codec::{decode_tile, encode_tile, is_encodable_model_ref};
pub use name::{GridCoord, TileName, MAX_GRID_COORD};

/// Name carried by placeholder tiles and returned for any missing neighbor or
/// base model reference.
pub const EMPTY_TILE_NAME: &str = "empty";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Left,
    Right,
    Flip,
}

impl Rotation {
    pub fn degrees(self) -> f32 {
        match self {
            Rotation::None => 0.0,
            Rotation::Left => 270.0,
            Rotation::Right => 90.0,
            Rotation::Flip => 180.0,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            Rotation::None => "",
            Rotation::Left => "Left",
            Rotation::Right => "Right",
            Rotation::Flip => "Flip",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "" => Some(Rotation::None),
            "Left" => Some(Rotation::Left),
            "Right" => Some(Rotation::Right),
            "Flip" => Some(Rotation::Flip),
            _ => None,
        }
    }
}

/// One of the eight cells around a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    UpLeft,
    Up,
    UpRight,
    Left,
    Right,
    DownLeft,
    Down,
    DownRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::UpLeft,
        Direction::Up,
        Direction::UpRight,
        Direction::Left,
        Direction::Right,
        Direction::DownLeft,
        Direction::Down,
        Direction::DownRight,
    ];

    /// Grid delta `(dx, dy)`; up is `-y`, left is `-x`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::UpLeft => (-1, -1),
            Direction::Up => (0, -1),
            Direction::UpRight => (1, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::DownLeft => (-1, 1),
            Direction::Down => (0, 1),
            Direction::DownRight => (1, 1),
        }
    }

    fn index(self) -> usize {
        match self {
            Direction::UpLeft => 0,
            Direction::Up => 1,
            Direction::UpRight => 2,
            Direction::Left => 3,
            Direction::Right => 4,
            Direction::DownLeft => 5,
            Direction::Down => 6,
            Direction::DownRight => 7,
        }
    }
}

/// A static object placed on a tile, positioned relative to the tile center.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedObject {
    pub model_ref: String,
    pub local_position: Position,
    pub rotation_degrees: f32,
}

/// A placed object resolved against the model library, in world space.
#[derive(Debug, Clone)]
pub struct Renderable {
    pub model: Arc<ModelData>,
    pub world_position: Position,
    pub rotation_degrees: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TileOffset {
    pub x: f32,
    pub z: f32,
}

#[derive(Debug, Clone)]
pub struct Tile {
    name: String,
    base_model: Option<String>,
    base_rotation: Rotation,
    neighbors: [Option<String>; 8],
    fluidity: f32,
    objects: Vec<PlacedObject>,
    offset: TileOffset,
    renderables: Vec<Renderable>,
    dirty: bool,
}

impl Tile {
    /// Placeholder for a cell with no file yet. Impassable.
    pub fn empty() -> Self {
        Self::blank(EMPTY_TILE_NAME.to_string(), 0.0)
    }

    /// A fresh cell whose neighbor names are derived from its grid position.
    pub fn populated(name: &TileName, base_model: impl Into<String>, fluidity: f32) -> Self {
        let mut tile = Self::blank(name.to_string(), fluidity);
        tile.base_model = Some(base_model.into());
        for direction in Direction::ALL {
            let (dx, dy) = direction.delta();
            tile.set_neighbor(direction, name.neighbor(dx, dy).to_string());
        }
        tile
    }

    pub(crate) fn blank(name: String, fluidity: f32) -> Self {
        Self {
            name,
            base_model: None,
            base_rotation: Rotation::None,
            neighbors: Default::default(),
            fluidity: clamp_fluidity(fluidity),
            objects: Vec::new(),
            offset: TileOffset::default(),
            renderables: Vec::new(),
            dirty: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tile_name(&self) -> Option<TileName> {
        TileName::parse(&self.name)
    }

    pub fn grid_coord(&self) -> Option<GridCoord> {
        self.tile_name().map(|name| name.coord)
    }

    pub fn is_empty(&self) -> bool {
        self.name == EMPTY_TILE_NAME
    }

    pub fn fluidity(&self) -> f32 {
        self.fluidity
    }

    pub fn set_fluidity(&mut self, fluidity: f32) {
        self.fluidity = clamp_fluidity(fluidity);
    }

    pub fn base_model(&self) -> &str {
        non_empty_or_sentinel(self.base_model.as_deref())
    }

    pub fn set_base_model(&mut self, model_ref: impl Into<String>) {
        self.base_model = normalize_ref(model_ref.into());
        self.dirty = true;
    }

    pub fn base_rotation(&self) -> Rotation {
        self.base_rotation
    }

    pub fn set_base_rotation(&mut self, rotation: Rotation) {
        self.base_rotation = rotation;
        self.dirty = true;
    }

    pub fn neighbor_name(&self, direction: Direction) -> &str {
        non_empty_or_sentinel(self.neighbors[direction.index()].as_deref())
    }

    pub fn set_neighbor(&mut self, direction: Direction, name: impl Into<String>) {
        self.neighbors[direction.index()] = normalize_ref(name.into());
    }

    pub fn objects(&self) -> &[PlacedObject] {
        &self.objects
    }

    pub fn add_model(
        &mut self,
        model_ref: impl Into<String>,
        local_position: Position,
        rotation_degrees: f32,
    ) {
        self.objects.push(PlacedObject {
            model_ref: model_ref.into(),
            local_position,
            rotation_degrees,
        });
        self.dirty = true;
    }

    pub fn offset(&self) -> TileOffset {
        self.offset
    }

    /// Moves every materialized renderable from the previous offset to the new one.
    pub fn set_offset(&mut self, x: f32, z: f32) {
        let shift = Vector::new(x - self.offset.x, 0.0, z - self.offset.z);
        for renderable in &mut self.renderables {
            renderable.world_position = renderable.world_position + shift;
        }
        self.offset = TileOffset { x, z };
    }

    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    pub fn needs_initialise(&self) -> bool {
        self.dirty
    }

    pub fn serialize(&self) -> String {
        encode_tile(self)
    }

    pub fn deserialize(name: &str, text: &str) -> Self {
        decode_tile(name, text)
    }

    fn world_position(&self, local: Position) -> Position {
        local + Vector::new(self.offset.x, 0.0, self.offset.z)
    }

    fn resolve(
        &self,
        models: &dyn ModelLibrary,
        model_ref: &str,
        local: Position,
        rotation_degrees: f32,
    ) -> Option<Renderable> {
        let Some(model) = models.model_data(model_ref) else {
            warn!(tile = %self.name, model = model_ref, "tile_model_missing");
            return None;
        };
        Some(Renderable {
            model,
            world_position: self.world_position(local),
            rotation_degrees,
        })
    }

    // Raw field access for the codec.
    pub(crate) fn base_model_raw(&self) -> Option<&str> {
        self.base_model.as_deref()
    }

    pub(crate) fn neighbor_raw(&self, direction: Direction) -> Option<&str> {
        self.neighbors[direction.index()].as_deref()
    }
}

impl Drawable for Tile {
    fn initialise(&mut self, models: &dyn ModelLibrary) {
        let mut renderables = Vec::with_capacity(self.objects.len() + 1);
        if let Some(base) = self.base_model.as_deref() {
            renderables.extend(self.resolve(
                models,
                base,
                Position::ORIGIN,
                self.base_rotation.degrees(),
            ));
        }
        for object in &self.objects {
            renderables.extend(self.resolve(
                models,
                &object.model_ref,
                object.local_position,
                object.rotation_degrees,
            ));
        }
        self.renderables = renderables;
        self.dirty = false;
    }

    fn draw(
        &mut self,
        params: &DrawParams,
        models: &dyn ModelLibrary,
        backend: &mut dyn RenderBackend,
    ) {
        if self.dirty {
            self.initialise(models);
        }
        for renderable in &self.renderables {
            backend.draw_model(
                &renderable.model,
                renderable.world_position,
                renderable.rotation_degrees,
                params,
            );
        }
    }
}

pub(crate) fn clamp_fluidity(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn normalize_ref(value: String) -> Option<String> {
    if value.is_empty() || value == EMPTY_TILE_NAME {
        None
    } else {
        Some(value)
    }
}

fn non_empty_or_sentinel(value: Option<&str>) -> &str {
    value.unwrap_or(EMPTY_TILE_NAME)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::render::{MaterialId, MeshId};

    struct FixedModels(HashMap<String, Arc<ModelData>>);

    impl FixedModels {
        fn with(names: &[&str]) -> Self {
            Self(
                names
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| {
                        (
                            name.to_string(),
                            Arc::new(ModelData {
                                name: name.to_string(),
                                mesh: MeshId(idx as u32),
                                material: MaterialId(0),
                            }),
                        )
                    })
                    .collect(),
            )
        }
    }

    impl ModelLibrary for FixedModels {
        fn model_data(&self, name: &str) -> Option<Arc<ModelData>> {
            self.0.get(name).cloned()
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<(String, Position)>,
    }

    impl RenderBackend for RecordingBackend {
        fn draw_model(
            &mut self,
            model: &ModelData,
            world_position: Position,
            _y_rotation_degrees: f32,
            _params: &DrawParams,
        ) {
            self.calls.push((model.name.clone(), world_position));
        }
    }

    fn origin_tile() -> Tile {
        let name = TileName::parse("tile_0_0.txt").expect("name");
        Tile::populated(&name, "ground", 1.0)
    }

    #[test]
    fn empty_tile_is_impassable_sentinel() {
        let tile = Tile::empty();
        assert!(tile.is_empty());
        assert_eq!(tile.fluidity(), 0.0);
        assert_eq!(tile.grid_coord(), None);
        assert_eq!(tile.base_model(), EMPTY_TILE_NAME);
    }

    #[test]
    fn missing_neighbors_read_as_sentinel() {
        let mut tile = Tile::empty();
        assert_eq!(tile.neighbor_name(Direction::Up), EMPTY_TILE_NAME);
        tile.set_neighbor(Direction::Up, "");
        assert_eq!(tile.neighbor_name(Direction::Up), EMPTY_TILE_NAME);
        tile.set_neighbor(Direction::Up, "tile_0_-1.txt");
        assert_eq!(tile.neighbor_name(Direction::Up), "tile_0_-1.txt");
    }

    #[test]
    fn populated_tile_derives_neighbor_names() {
        let tile = origin_tile();
        assert!(!tile.is_empty());
        assert_eq!(tile.grid_coord(), Some(GridCoord::new(0, 0)));
        assert_eq!(tile.neighbor_name(Direction::Up), "tile_0_-1.txt");
        assert_eq!(tile.neighbor_name(Direction::DownRight), "tile_1_1.txt");
        assert_eq!(tile.neighbor_name(Direction::Left), "tile_-1_0.txt");
    }

    #[test]
    fn fluidity_is_clamped_to_unit_range() {
        let mut tile = origin_tile();
        tile.set_fluidity(1.5);
        assert_eq!(tile.fluidity(), 1.0);
        tile.set_fluidity(-0.2);
        assert_eq!(tile.fluidity(), 0.0);
        tile.set_fluidity(f32::NAN);
        assert_eq!(tile.fluidity(), 0.0);
    }

    #[test]
    fn add_model_marks_tile_dirty_until_initialised() {
        let models = FixedModels::with(&["ground", "tree"]);
        let mut tile = origin_tile();
        tile.initialise(&models);
        assert!(!tile.needs_initialise());

        tile.add_model("tree", Position::new(2.0, 0.0, 3.0), 45.0);
        assert!(tile.needs_initialise());
        assert_eq!(tile.objects().len(), 1);

        tile.initialise(&models);
        assert!(!tile.needs_initialise());
        assert_eq!(tile.renderables().len(), 2);
    }

    #[test]
    fn set_offset_moves_materialized_objects() {
        let models = FixedModels::with(&["ground", "tree"]);
        let mut tile = origin_tile();
        tile.add_model("tree", Position::new(2.0, 1.0, 3.0), 0.0);
        tile.set_offset(20.0, 0.0);
        tile.initialise(&models);
        assert_eq!(
            tile.renderables()[1].world_position,
            Position::new(22.0, 1.0, 3.0)
        );

        tile.set_offset(0.0, -20.0);
        assert_eq!(tile.offset(), TileOffset { x: 0.0, z: -20.0 });
        assert_eq!(
            tile.renderables()[0].world_position,
            Position::new(0.0, 0.0, -20.0)
        );
        assert_eq!(
            tile.renderables()[1].world_position,
            Position::new(2.0, 1.0, -17.0)
        );
    }

    #[test]
    fn draw_initialises_dirty_tile_and_skips_unknown_models() {
        let models = FixedModels::with(&["ground"]);
        let mut tile = origin_tile();
        tile.add_model("unknown_statue", Position::new(1.0, 0.0, 1.0), 0.0);
        let mut backend = RecordingBackend::default();

        tile.draw(&DrawParams::default(), &models, &mut backend);

        assert!(!tile.needs_initialise());
        assert_eq!(
            backend.calls,
            vec![("ground".to_string(), Position::ORIGIN)]
        );
    }

    #[test]
    fn empty_tile_draws_nothing() {
        let models = FixedModels::with(&["ground"]);
        let mut tile = Tile::empty();
        let mut backend = RecordingBackend::default();
        tile.draw(&DrawParams::default(), &models, &mut backend);
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn rotation_tags_and_degrees() {
        assert_eq!(Rotation::Left.degrees(), 270.0);
        assert_eq!(Rotation::Right.degrees(), 90.0);
        assert_eq!(Rotation::Flip.degrees(), 180.0);
        for rotation in [
            Rotation::None,
            Rotation::Left,
            Rotation::Right,
            Rotation::Flip,
        ] {
            assert_eq!(Rotation::from_tag(rotation.as_tag()), Some(rotation));
        }
        assert_eq!(Rotation::from_tag("Sideways"), None);
    }
}
