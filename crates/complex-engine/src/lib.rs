//! Complex Engine -- scenes, startup and scripting on top of the ECS core.
//!
//! This crate builds on [`complex_ecs`] to provide the application layer: a
//! [`SceneRunner`](scene::SceneRunner) that loads a scene into a world and
//! updates it at a fixed timestep, a one-shot [`InitQueue`](init::InitQueue),
//! per-entity [`Script`](script::Script)s, configuration and log setup.
//!
//! # Quick Start
//!
//! ```
//! use complex_engine::prelude::*;
//!
//! struct Greeter;
//! impl Script for Greeter {
//!     fn update(&mut self, _entity: &mut Entity) -> SystemResult {
//!         Ok(())
//!     }
//! }
//!
//! struct Level;
//! impl Scene for Level {
//!     fn name(&self) -> &str {
//!         "level"
//!     }
//!     fn load(&mut self, world: &mut World) -> anyhow::Result<()> {
//!         world.add_entity_system(ScriptSystem::new());
//!         world.add_entity(Entity::new().with(ScriptComponent::new(Greeter)));
//!         Ok(())
//!     }
//! }
//!
//! let mut runner = SceneRunner::new(Level, EngineConfig::default()).unwrap();
//! runner.start().unwrap();
//! runner.run_frames(10).unwrap();
//! assert_eq!(runner.frame_count(), 10);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod init;
pub mod logging;
pub mod scene;
pub mod script;

/// Re-export the ECS crate for convenience.
pub use complex_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use complex_ecs::prelude::*;

    // Engine-specific exports.
    pub use crate::config::{EngineConfig, EngineError};
    pub use crate::init::{InitFn, InitQueue};
    pub use crate::scene::{Scene, ScenePhase, SceneRunner};
    pub use crate::script::{Script, ScriptComponent, ScriptSystem};
}
