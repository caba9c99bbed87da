use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Position;
use crate::storage::write_text_atomic;
use crate::tile::{TileName, MAX_GRID_COORD};

pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Position> for SavedPosition {
    fn from(position: Position) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }
}

impl From<SavedPosition> for Position {
    fn from(saved: SavedPosition) -> Self {
        Position::new(saved.x, saved.y, saved.z)
    }
}

/// Where the player is: the center tile of the window and the offset from
/// that tile's center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub save_version: u32,
    pub current_tile: String,
    pub player_offset: SavedPosition,
}

impl SaveRecord {
    pub fn new(current_tile: impl Into<String>, player_offset: Position) -> Self {
        Self {
            save_version: SAVE_VERSION,
            current_tile: current_tile.into(),
            player_offset: player_offset.into(),
        }
    }

    pub fn player_offset(&self) -> Position {
        self.player_offset.into()
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to read save {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write save {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode save: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse save json at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("save validation failed at {path}: {message}")]
    Invalid { path: &'static str, message: String },
}

/// Narrow interface to the save-game database.
pub trait SaveStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SaveRecord>, SaveError>;
    fn store(&self, record: &SaveRecord) -> Result<(), SaveError>;
}

#[derive(Debug, Clone)]
pub struct JsonSaveFile {
    path: PathBuf,
}

impl JsonSaveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaveStore for JsonSaveFile {
    fn load(&self) -> Result<Option<SaveRecord>, SaveError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SaveError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let record = parse_save_record_json(&raw)?;
        validate_save_record(&record)?;
        Ok(Some(record))
    }

    fn store(&self, record: &SaveRecord) -> Result<(), SaveError> {
        validate_save_record(record)?;
        let json = serde_json::to_string_pretty(record).map_err(SaveError::Encode)?;
        write_text_atomic(&self.path, &json).map_err(|source| SaveError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn parse_save_record_json(raw: &str) -> Result<SaveRecord, SaveError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SaveRecord>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let message = error.into_inner().to_string();
        SaveError::Parse {
            path: if path.is_empty() { ".".to_string() } else { path },
            message,
        }
    })
}

fn expected_actual(path: &'static str, expected: impl Display, actual: impl Display) -> SaveError {
    SaveError::Invalid {
        path,
        message: format!("expected {expected}, got {actual}"),
    }
}

pub fn validate_save_record(record: &SaveRecord) -> Result<(), SaveError> {
    if record.save_version != SAVE_VERSION {
        return Err(expected_actual(
            "save_version",
            SAVE_VERSION,
            record.save_version,
        ));
    }
    let Some(name) = TileName::parse(&record.current_tile) else {
        return Err(expected_actual(
            "current_tile",
            "<prefix>_<x>_<y>.<ext>",
            &record.current_tile,
        ));
    };
    if !name.coord.is_in_bounds() {
        return Err(expected_actual(
            "current_tile",
            format!("coordinates within ±{MAX_GRID_COORD}"),
            &record.current_tile,
        ));
    }
    let offset = record.player_offset;
    for (path, value) in [
        ("player_offset.x", offset.x),
        ("player_offset.y", offset.y),
        ("player_offset.z", offset.z),
    ] {
        if !value.is_finite() {
            return Err(expected_actual(path, "finite number", value));
        }
    }
    Ok(())
}
