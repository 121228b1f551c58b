//! Scenes and the fixed-timestep scene runner.
//!
//! A [`Scene`] populates a fresh [`World`] in [`Scene::load`]. The
//! [`SceneRunner`] owns the scene and its world and walks them through the
//! lifecycle:
//!
//! 1. [`load`](SceneRunner::load): the scene registers its systems,
//!    managers and entities.
//! 2. [`run`](SceneRunner::run): the world is initialized.
//! 3. [`update`](SceneRunner::update): one world update per call, each
//!    advancing simulation time by `fixed_dt`.
//!
//! # Example
//!
//! ```
//! use complex_engine::prelude::*;
//!
//! struct Empty;
//! impl Scene for Empty {
//!     fn name(&self) -> &str {
//!         "empty"
//!     }
//!     fn load(&mut self, _world: &mut World) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let config = EngineConfig { fixed_dt: 0.5, ..Default::default() };
//! let mut runner = SceneRunner::new(Empty, config).unwrap();
//! runner.start().unwrap();
//! runner.run_frames(4).unwrap();
//!
//! assert_eq!(runner.frame_count(), 4);
//! assert_eq!(runner.sim_time(), 2.0);
//! ```

use tracing::{debug, info};

use complex_ecs::world::{FrameReport, World};

use crate::config::{EngineConfig, EngineError};

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// A named world setup.
pub trait Scene {
    fn name(&self) -> &str;

    /// Populate `world`. Called once, before the world is initialized.
    fn load(&mut self, world: &mut World) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ScenePhase
// ---------------------------------------------------------------------------

/// Where a [`SceneRunner`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePhase {
    Created,
    Loaded,
    Running,
}

// ---------------------------------------------------------------------------
// SceneRunner
// ---------------------------------------------------------------------------

/// Drives one scene's world at a fixed timestep.
pub struct SceneRunner<S: Scene> {
    scene: S,
    world: World,
    config: EngineConfig,
    phase: ScenePhase,
    last_report: Option<FrameReport>,
}

impl<S: Scene> SceneRunner<S> {
    /// Create a runner with a fresh world built from `config.world`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidTimestep`] if `config.fixed_dt` is not positive
    /// and finite.
    pub fn new(scene: S, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            scene,
            world: World::with_config(config.world),
            config,
            phase: ScenePhase::Created,
            last_report: None,
        })
    }

    /// Let the scene populate its world.
    pub fn load(&mut self) -> Result<(), EngineError> {
        if self.phase != ScenePhase::Created {
            return Err(EngineError::AlreadyLoaded(self.scene_name()));
        }
        self.scene
            .load(&mut self.world)
            .map_err(|source| EngineError::Load {
                scene: self.scene.name().to_owned(),
                source: source.into(),
            })?;
        self.phase = ScenePhase::Loaded;
        info!(
            scene = self.scene.name(),
            entities = self.world.entity_count(),
            systems = self.world.system_count(),
            "scene loaded"
        );
        Ok(())
    }

    /// Initialize the world.
    pub fn run(&mut self) -> Result<(), EngineError> {
        match self.phase {
            ScenePhase::Created => return Err(EngineError::NotLoaded(self.scene_name())),
            ScenePhase::Running => return Err(EngineError::AlreadyRunning(self.scene_name())),
            ScenePhase::Loaded => {}
        }
        info!(scene = self.scene.name(), "initializing scene");
        self.world.init()?;
        self.phase = ScenePhase::Running;
        Ok(())
    }

    /// [`load`](Self::load) then [`run`](Self::run).
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.load()?;
        self.run()
    }

    /// Run one world update.
    pub fn update(&mut self) -> Result<&FrameReport, EngineError> {
        if self.phase != ScenePhase::Running {
            return Err(EngineError::NotRunning(self.scene_name()));
        }
        let report = self.world.update()?;
        debug!(
            scene = self.scene.name(),
            frame = report.frame,
            failures = report.failures.len(),
            "frame updated"
        );
        Ok(self.last_report.insert(report))
    }

    /// Run `count` updates in sequence. Returns the number of isolated system
    /// failures across all of them.
    pub fn run_frames(&mut self, count: u64) -> Result<usize, EngineError> {
        let mut failures = 0;
        for _ in 0..count {
            failures += self.update()?.failures.len();
        }
        Ok(failures)
    }

    // -- accessors ----------------------------------------------------------

    /// Number of world updates run so far.
    pub fn frame_count(&self) -> u64 {
        self.world.frame()
    }

    /// Simulation time in seconds.
    ///
    /// Computed as `frame_count * fixed_dt` so it does not drift.
    pub fn sim_time(&self) -> f64 {
        self.world.frame() as f64 * self.config.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    pub fn phase(&self) -> ScenePhase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Report of the most recent successful update.
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    fn scene_name(&self) -> String {
        self.scene.name().to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
