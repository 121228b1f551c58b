//! Engine configuration and errors.

use serde::{Deserialize, Serialize};

use complex_ecs::world::WorldConfig;
use complex_ecs::{BoxError, EcsError};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`SceneRunner`](crate::scene::SceneRunner).
///
/// Missing JSON fields fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed time step in seconds per frame. Must be positive and finite.
    pub fixed_dt: f64,
    /// Headless mode: no presentation layer, frames run back to back.
    pub headless: bool,
    /// Filter directives used by [`logging::init`](crate::logging::init)
    /// when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Configuration of the world each runner creates.
    pub world: WorldConfig,
}

impl Default for EngineConfig {
    /// Defaults to 60 Hz, headless off, `info` logging.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
            log_filter: "info".to_owned(),
            world: WorldConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fixed_dt > 0.0 && self.fixed_dt.is_finite() {
            Ok(())
        } else {
            Err(EngineError::InvalidTimestep(self.fixed_dt))
        }
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors produced by the engine layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("fixed_dt must be positive and finite, got {0}")]
    InvalidTimestep(f64),

    #[error("invalid engine config: {0}")]
    Config(#[from] serde_json::Error),

    /// `load()` was called twice.
    #[error("scene '{0}' has already been loaded")]
    AlreadyLoaded(String),

    /// `run()` was called before `load()`.
    #[error("scene '{0}' must be loaded before it can run")]
    NotLoaded(String),

    /// `run()` was called twice.
    #[error("scene '{0}' is already running")]
    AlreadyRunning(String),

    /// `update()` was called before `run()`.
    #[error("scene '{0}' is not running")]
    NotRunning(String),

    #[error("scene '{scene}' failed to load: {source}")]
    Load {
        scene: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to install log subscriber: {0}")]
    Logging(#[source] BoxError),

    #[error(transparent)]
    Ecs(#[from] EcsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sixty_hertz() {
        let config = EngineConfig::default();
        assert!((config.fixed_dt - 1.0 / 60.0).abs() < 1e-12);
        assert!(!config.headless);
        assert!(config.world.isolate_system_errors);
        config.validate().unwrap();
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = EngineConfig::from_json_str(
            r#"{ "fixed_dt": 0.01, "headless": true, "world": { "isolate_system_errors": false } }"#,
        )
        .unwrap();
        assert_eq!(config.fixed_dt, 0.01);
        assert!(config.headless);
        assert_eq!(config.log_filter, "info");
        assert!(!config.world.isolate_system_errors);
        assert!(!config.world.notify_late_systems);
    }

    #[test]
    fn rejects_bad_timestep() {
        let err = EngineConfig::from_json_str(r#"{ "fixed_dt": 0.0 }"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTimestep(dt) if dt == 0.0));

        let config = EngineConfig {
            fixed_dt: f64::INFINITY,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
