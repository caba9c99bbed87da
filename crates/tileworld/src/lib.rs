use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod config;
pub mod geometry;
pub mod map;
pub mod render;
pub mod save;
pub mod shared;
pub mod storage;
pub mod tile;

pub use config::{load_world_config, ConfigError, WorldConfig, DEFAULT_TILE_SIZE};
pub use geometry::{Position, Vector};
pub use map::{Crossing, MoveOutcome, Slot, TileMap, TileMapError, DIAGONAL_TIE_EPSILON};
pub use render::{DrawParams, Drawable, MaterialId, MeshId, ModelData, ModelLibrary, RenderBackend};
pub use save::{JsonSaveFile, SaveError, SaveRecord, SaveStore, SAVE_VERSION};
pub use shared::SharedTileMap;
pub use storage::{FsTileStore, MemoryTileStore, StorageError, TileStore};
pub use tile::{
    decode_tile, encode_tile, Direction, GridCoord, PlacedObject, Rotation, Tile, TileName,
    TileOffset, EMPTY_TILE_NAME, MAX_GRID_COORD,
};

pub const ROOT_ENV_VAR: &str = "TILEWORLD_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub tiles_dir: PathBuf,
    pub saves_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    /// Layout under `root` without touching the filesystem.
    pub fn under(root: PathBuf) -> Self {
        let world_dir = root.join("world");
        Self {
            tiles_dir: world_dir.join("tiles"),
            saves_dir: world_dir.join("saves"),
            config_path: world_dir.join("world.json"),
            root,
        }
    }

    pub fn save_path(&self) -> PathBuf {
        self.saves_dir.join("player.json")
    }

    pub fn create_data_dirs(&self) -> Result<(), StartupError> {
        for dir in [&self.tiles_dir, &self.saves_dir] {
            fs::create_dir_all(dir).map_err(|source| StartupError::CreateDataDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create data directory at {path}: {source}")]
    CreateDataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "TILEWORLD_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or world/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or world/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/tileworld\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let paths = AppPaths::under(resolve_root()?);
    paths.create_data_dirs()?;
    Ok(paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(Path::new(&value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_world = path.join("world").is_dir();

    cargo_toml && (has_crates || has_world)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir(temp.path().join("world")).expect("world dir");
        assert!(!is_repo_marker(temp.path()));

        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("cargo toml");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn layout_lives_under_world_dir() {
        let temp = TempDir::new().expect("temp");
        let paths = AppPaths::under(temp.path().to_path_buf());
        assert_eq!(paths.tiles_dir, temp.path().join("world").join("tiles"));
        assert_eq!(paths.config_path, temp.path().join("world").join("world.json"));
        assert_eq!(
            paths.save_path(),
            temp.path().join("world").join("saves").join("player.json")
        );

        paths.create_data_dirs().expect("create dirs");
        assert!(paths.tiles_dir.is_dir());
        assert!(paths.saves_dir.is_dir());
    }
}
