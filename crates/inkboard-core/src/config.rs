//! Engine tuning knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables of the board engine. Unknown JSON fields are rejected; missing
/// ones take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Side length of a chunk tile in board units.
    pub tile_size: f32,
    pub quadtree_capacity: usize,
    pub quadtree_max_depth: u32,
    pub history_capacity: usize,
    /// Inflation applied to removed/changed bounds before repainting.
    pub damage_margin: f32,
    /// Items processed per frame tick by an asynchronous rebuild.
    pub rebuild_batch: usize,
    /// Packed `0xRRGGBBAA` tile background.
    pub background: u32,
    pub save_debounce_ms: u64,
    /// Ramer-Douglas-Peucker tolerance for freshly drawn strokes.
    pub simplify_tolerance: f32,
    /// Hit-test slack in screen pixels.
    pub hit_tolerance: f32,
    /// Most tiles a single item may cover. Larger items are refused.
    pub max_item_tiles: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: 2000.0,
            quadtree_capacity: crate::quadtree::DEFAULT_CAPACITY,
            quadtree_max_depth: crate::quadtree::DEFAULT_MAX_DEPTH,
            history_capacity: 100,
            damage_margin: 45.0,
            rebuild_batch: 10,
            background: 0xFFFF_FFFF,
            save_debounce_ms: 1000,
            simplify_tolerance: 0.5,
            hit_tolerance: 4.0,
            max_item_tiles: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        positive("tile_size", self.tile_size)?;
        if !self.damage_margin.is_finite() || self.damage_margin < 0.0 {
            return Err(invalid("damage_margin", "must be finite and non-negative"));
        }
        if self.quadtree_capacity == 0 {
            return Err(invalid("quadtree_capacity", "must be at least 1"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity", "must be at least 1"));
        }
        if self.max_item_tiles == 0 {
            return Err(invalid("max_item_tiles", "must be at least 1"));
        }
        if self.rebuild_batch == 0 {
            return Err(invalid("rebuild_batch", "must be at least 1"));
        }
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(invalid("simplify_tolerance", "must be finite and non-negative"));
        }
        if !self.hit_tolerance.is_finite() || self.hit_tolerance < 0.0 {
            return Err(invalid("hit_tolerance", "must be finite and non-negative"));
        }
        Ok(())
    }
}

fn positive(field: &'static str, v: f32) -> ConfigResult<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("expected a positive number, got {v}")))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tile_size, 2000.0);
        assert_eq!(config.history_capacity, 100);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{"tile_size": 512}"#).unwrap();
        assert_eq!(config.tile_size, 512.0);
        assert_eq!(config.rebuild_batch, 10);
    }

    #[test]
    fn test_rejects_non_positive_tile() {
        let err = EngineConfig::from_json(r#"{"tile_size": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "tile_size", .. }));
    }

    #[test]
    fn test_rejects_zero_tile_limit() {
        let err = EngineConfig::from_json(r#"{"max_item_tiles": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_item_tiles", .. }));
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"tile": 5}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"history_capacity": 5}}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.history_capacity, 5);
    }
}
