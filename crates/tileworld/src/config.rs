use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::tile::{GridCoord, TileName, MAX_GRID_COORD};

pub const DEFAULT_TILE_SIZE: f32 = 20.0;

/// Static world layout. Loaded once at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    pub tile_size: f32,
    pub tile_prefix: String,
    pub tile_extension: String,
    pub start_x: i32,
    pub start_y: i32,
    pub default_base_model: String,
    pub default_fluidity: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_prefix: "tile".to_string(),
            tile_extension: "txt".to_string(),
            start_x: 0,
            start_y: 0,
            default_base_model: "ground".to_string(),
            default_fluidity: 1.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read world config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse world config {path} at {field}: {message}")]
    Parse {
        path: PathBuf,
        field: String,
        message: String,
    },
    #[error("invalid world config field {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl WorldConfig {
    pub fn start_tile_name(&self) -> TileName {
        TileName::new(
            self.tile_prefix.clone(),
            GridCoord::new(self.start_x, self.start_y),
            self.tile_extension.clone(),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "tile_size",
                message: format!("expected finite number > 0, got {}", self.tile_size),
            });
        }
        if !(0.0..=1.0).contains(&self.default_fluidity) {
            return Err(ConfigError::Invalid {
                field: "default_fluidity",
                message: format!("expected value in [0, 1], got {}", self.default_fluidity),
            });
        }
        if self.tile_prefix.is_empty() || self.tile_prefix.contains(&['/', '\\', '.'][..]) {
            return Err(ConfigError::Invalid {
                field: "tile_prefix",
                message: format!("'{}' cannot be used in a file name", self.tile_prefix),
            });
        }
        if self.tile_extension.is_empty() || self.tile_extension.contains(&['/', '\\', '.', '_'][..]) {
            return Err(ConfigError::Invalid {
                field: "tile_extension",
                message: format!("'{}' cannot be used as an extension", self.tile_extension),
            });
        }
        for (field, value) in [("start_x", self.start_x), ("start_y", self.start_y)] {
            if !GridCoord::new(value, 0).is_in_bounds() {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("expected value in ±{MAX_GRID_COORD}, got {value}"),
                });
            }
        }
        if self.default_base_model.is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_base_model",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Reads `path` when it exists, otherwise falls back to defaults. Missing
/// fields take their default value.
pub fn load_world_config(path: &Path) -> Result<WorldConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(raw) => parse_world_config(path, &raw)?,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "world_config_missing_using_defaults");
            WorldConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    config.validate()?;
    Ok(config)
}

fn parse_world_config(path: &Path, raw: &str) -> Result<WorldConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, WorldConfig>(&mut deserializer).map_err(|error| {
        let field = match error.path().to_string() {
            json_path if json_path.is_empty() || json_path == "." => "<root>".to_string(),
            json_path => json_path,
        };
        ConfigError::Parse {
            path: path.to_path_buf(),
            field,
            message: error.into_inner().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let temp = TempDir::new().expect("temp");
        let config = load_world_config(&temp.path().join("world.json")).expect("config");
        assert_eq!(config, WorldConfig::default());
        assert_eq!(config.start_tile_name().to_string(), "tile_0_0.txt");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("world.json");
        fs::write(&path, r#"{ "tile_size": 8.0, "start_x": -2 }"#).expect("write");
        let config = load_world_config(&path).expect("config");
        assert_eq!(config.tile_size, 8.0);
        assert_eq!(config.start_x, -2);
        assert_eq!(config.tile_prefix, "tile");
        assert_eq!(config.start_tile_name().to_string(), "tile_-2_0.txt");
    }

    #[test]
    fn parse_error_names_the_field() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("world.json");
        fs::write(&path, r#"{ "tile_size": "big" }"#).expect("write");
        let err = load_world_config(&path).expect_err("parse error");
        let ConfigError::Parse { field, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(field, "tile_size");
    }

    #[test]
    fn validation_rejects_non_positive_tile_size() {
        let config = WorldConfig {
            tile_size: 0.0,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "tile_size",
                ..
            })
        ));
    }

    #[test]
    fn validation_rejects_extension_with_separator() {
        let config = WorldConfig {
            tile_extension: "t.xt".to_string(),
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_start_cell_near_integer_limits() {
        let config = WorldConfig {
            start_x: i32::MAX,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "start_x",
                ..
            })
        ));
        let config = WorldConfig {
            start_y: i32::MIN,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "start_y",
                ..
            })
        ));
    }
}
