//! The ECS world: the container that owns entities, systems and managers and
//! drives the update protocol.
//!
//! # Update protocol
//!
//! [`World::update`] runs four phases in a fixed order:
//!
//! 1. **Commands**: the deferred [`CommandBuffer`] is applied in FIFO order.
//! 2. **Reap**: every entity whose `alive` flag is cleared is removed, which
//!    notifies systems through [`System::removed`](crate::system::System::removed).
//! 3. **Void pass**: every [`VoidSystem`] runs once, in slot order.
//! 4. **Entity pass**: every [`EntitySystem`] runs against the live entities
//!    holding all of its required kinds, in entity slot order.
//!
//! An entity destroyed during a pass keeps its slot until the next reap, but
//! no later system in the same update sees it.

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::command::{ApplyReport, CommandBuffer};
use crate::component::ComponentSet;
use crate::entity::{Entity, EntityId};
use crate::manager::{Manager, ManagerRegistry};
use crate::slot::SlotArena;
use crate::system::{
    EntitySystem, Hook, RemovedSystem, SystemContext, SystemFailure, SystemHandle, SystemRegistry,
    VoidSystem,
};
use crate::{BoxError, EcsError};

// ---------------------------------------------------------------------------
// WorldId
// ---------------------------------------------------------------------------

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`World`].
///
/// Entities and systems hold this instead of a reference to their world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(u64);

impl WorldId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Behaviour switches for a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Keep running the remaining systems of an update after one fails.
    /// When `false`, the first failure aborts the update with
    /// [`EcsError::System`].
    pub isolate_system_errors: bool,
    /// Call [`System::added_to_world`](crate::system::System::added_to_world)
    /// on systems registered after [`World::init`].
    pub notify_late_systems: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            isolate_system_errors: true,
            notify_late_systems: false,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameReport
// ---------------------------------------------------------------------------

/// What happened during one [`World::update`].
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Number of updates completed before this one.
    pub frame: u64,
    /// Result of applying the deferred commands.
    pub commands: ApplyReport,
    /// Handles of the entities removed by the reap phase.
    pub reaped: Vec<EntityId>,
    /// Isolated system failures, in the order they happened.
    pub failures: Vec<SystemFailure>,
    /// Wall time of each system run, in run order.
    pub system_times: Vec<(String, Duration)>,
    /// Wall time of the whole update.
    pub total_time: Duration,
}

impl FrameReport {
    /// Whether every system succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Owner of entities, systems and managers.
pub struct World {
    id: WorldId,
    config: WorldConfig,
    entities: SlotArena<EntityId, Entity>,
    systems: SystemRegistry,
    managers: ManagerRegistry,
    commands: CommandBuffer,
    initialized: bool,
    frame: u64,
}

impl World {
    /// Create an empty world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            id: WorldId::next(),
            config,
            entities: SlotArena::new(),
            systems: SystemRegistry::default(),
            managers: ManagerRegistry::new(),
            commands: CommandBuffer::new(),
            initialized: false,
            frame: 0,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of updates run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    // -- entities -----------------------------------------------------------

    /// Store `entity` in the lowest free slot, stamp it with its handle and
    /// this world, then notify every system in registration order.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        let world = self.id;
        let id = self.entities.insert_with(|id| {
            entity.set_index(Some(id));
            entity.set_world(Some(world));
            entity
        });
        debug!(entity = %id, "entity added");
        if let Some(entity) = self.entities.get(id) {
            self.systems.notify_all(&Hook::Added(entity));
        }
        id
    }

    /// Notify every system, then remove the entity and clear its handle and
    /// world.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotFound`] if the slot is empty or `id` is stale.
    /// Callers holding an `&Entity` that may never have been added should
    /// go through [`Entity::require_index`], which reports
    /// [`EcsError::Unregistered`].
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Entity, EcsError> {
        let entity = self.entities.get(id).ok_or(EcsError::EntityNotFound(id))?;
        self.systems.notify_all(&Hook::Removed(entity));

        let mut entity = self
            .entities
            .remove(id)
            .ok_or(EcsError::EntityNotFound(id))?;
        entity.set_index(None);
        entity.set_world(None);
        debug!(entity = %id, "entity removed");
        Ok(entity)
    }

    /// The entity behind `id`.
    pub fn get_entity(&self, id: EntityId) -> Result<&Entity, EcsError> {
        self.entities.get(id).ok_or(EcsError::EntityNotFound(id))
    }

    pub fn get_entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, EcsError> {
        self.entities.get_mut(id).ok_or(EcsError::EntityNotFound(id))
    }

    /// The current handle of the entity in slot `index`, if the slot is
    /// occupied.
    pub fn entity_at(&self, index: u32) -> Option<EntityId> {
        self.entities.key_at(index)
    }

    /// Whether `id` resolves to an entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    /// Stored entities, live or awaiting reap, in slot order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    /// Number of stored entities, including those awaiting reap.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Size of the entity index space, including empty slots.
    pub fn entity_slot_count(&self) -> usize {
        self.entities.slot_count()
    }

    /// Handles of the live entities holding every kind in `required`, in
    /// slot order.
    pub fn matching_entities(&self, required: &ComponentSet) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.is_alive() && e.has_all(required))
            .map(|(id, _)| id)
            .collect()
    }

    // -- systems ------------------------------------------------------------

    /// Register a void system in the lowest free void slot.
    pub fn add_void_system<S: VoidSystem>(&mut self, mut system: S) -> SystemHandle {
        system.set_world(self.id);
        let handle = self.systems.add_void(Box::new(system));
        self.after_system_added(handle);
        handle
    }

    /// Register an entity system in the lowest free entity slot.
    pub fn add_entity_system<S: EntitySystem>(&mut self, mut system: S) -> SystemHandle {
        system.set_world(self.id);
        let handle = self.systems.add_entity(Box::new(system));
        self.after_system_added(handle);
        handle
    }

    /// Unregister the system behind `handle` and hand it back. Its slot is
    /// reused by the next registration in the same list.
    pub fn remove_system(&mut self, handle: SystemHandle) -> Result<RemovedSystem, EcsError> {
        let removed = self
            .systems
            .remove(handle)
            .ok_or_else(|| EcsError::SystemNotFound(format!("{handle:?}")))?;
        debug!(system = removed.name(), ?handle, "system removed");
        Ok(removed)
    }

    /// The first registered system of type `S`.
    pub fn get_system<S: crate::system::System>(&self) -> Result<&S, EcsError> {
        self.systems
            .find::<S>()
            .ok_or_else(|| EcsError::SystemNotFound(type_name::<S>().to_owned()))
    }

    pub fn get_system_mut<S: crate::system::System>(&mut self) -> Result<&mut S, EcsError> {
        self.systems
            .find_mut::<S>()
            .ok_or_else(|| EcsError::SystemNotFound(type_name::<S>().to_owned()))
    }

    /// Handle of the first system, in registration order, named `name`.
    pub fn get_system_by_name(&self, name: &str) -> Result<SystemHandle, EcsError> {
        self.systems
            .find_by_name(name)
            .ok_or_else(|| EcsError::SystemNotFound(name.to_owned()))
    }

    /// Name of the system behind `handle`.
    pub fn system_name(&self, handle: SystemHandle) -> Result<&str, EcsError> {
        self.systems
            .name(handle)
            .ok_or_else(|| EcsError::SystemNotFound(format!("{handle:?}")))
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    // -- managers -----------------------------------------------------------

    pub fn add_manager<M: Manager>(&mut self, mut manager: M) {
        manager.set_world(self.id);
        self.managers.add(manager);
    }

    pub fn get_manager<M: Manager>(&self) -> Result<&M, EcsError> {
        self.managers.get::<M>()
    }

    pub fn get_manager_mut<M: Manager>(&mut self) -> Result<&mut M, EcsError> {
        self.managers.get_mut::<M>()
    }

    // -- commands -----------------------------------------------------------

    /// Commands waiting for the next update.
    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    /// Apply the deferred commands now instead of at the next update.
    pub fn apply_commands(&mut self) -> ApplyReport {
        let mut commands = std::mem::take(&mut self.commands);
        let report = commands.apply(self);
        self.commands = commands;
        report
    }

    // -- lifecycle ----------------------------------------------------------

    /// Notify every registered system, in registration order, that the world
    /// is ready. Must be called exactly once, before the first update.
    pub fn init(&mut self) -> Result<(), EcsError> {
        if self.initialized {
            return Err(EcsError::AlreadyInitialized);
        }
        self.initialized = true;
        self.systems.notify_all(&Hook::AddedToWorld);
        info!(
            world = %self.id,
            systems = self.systems.len(),
            entities = self.entities.len(),
            "world initialized"
        );
        Ok(())
    }

    /// Run one frame of the update protocol.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotInitialized`] before [`init`](Self::init), with no side
    /// effects. [`EcsError::System`] if a system fails while
    /// [`WorldConfig::isolate_system_errors`] is off; the rest of that
    /// update is skipped.
    pub fn update(&mut self) -> Result<FrameReport, EcsError> {
        if !self.initialized {
            return Err(EcsError::NotInitialized);
        }
        let frame_start = Instant::now();
        let frame = self.frame;
        self.frame += 1;

        let commands = self.apply_commands();
        let reaped = self.reap();
        let mut report = FrameReport {
            frame,
            commands,
            reaped,
            ..FrameReport::default()
        };

        self.run_void_systems(&mut report)?;
        self.run_entity_systems(&mut report)?;

        report.total_time = frame_start.elapsed();
        trace!(
            frame,
            reaped = report.reaped.len(),
            failures = report.failures.len(),
            total_us = report.total_time.as_micros() as u64,
            "frame complete"
        );
        Ok(report)
    }

    // -- internal helpers ---------------------------------------------------

    fn after_system_added(&mut self, handle: SystemHandle) {
        debug!(?handle, system = self.systems.name(handle).unwrap_or(""), "system added");
        if self.initialized && self.config.notify_late_systems {
            self.systems.notify(handle, &Hook::AddedToWorld);
        }
    }

    fn reap(&mut self) -> Vec<EntityId> {
        let dead: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| !e.is_alive())
            .map(|(id, _)| id)
            .collect();
        dead.into_iter()
            .filter(|&id| self.remove_entity(id).is_ok())
            .collect()
    }

    fn run_void_systems(&mut self, report: &mut FrameReport) -> Result<(), EcsError> {
        let world = self.id;
        let isolate = self.config.isolate_system_errors;
        for (id, registered) in self.systems.void.iter_mut() {
            let name = registered.system.name().to_owned();
            let mut ctx = SystemContext::new(
                world,
                report.frame,
                &name,
                &mut self.commands,
                &mut self.managers,
            );
            let start = Instant::now();
            let result = registered.system.update(&mut ctx);
            report.system_times.push((name.clone(), start.elapsed()));

            if let Err(error) = result {
                let failure = SystemFailure {
                    system: name.clone(),
                    handle: SystemHandle::Void(id),
                    entity: None,
                    error,
                };
                record_failure(isolate, failure, report)?;
            }
        }
        Ok(())
    }

    fn run_entity_systems(&mut self, report: &mut FrameReport) -> Result<(), EcsError> {
        let world = self.id;
        let isolate = self.config.isolate_system_errors;
        for (id, registered) in self.systems.entity.iter_mut() {
            let name = registered.system.name().to_owned();
            let required = registered.system.components();
            let mut matched: Vec<&mut Entity> = self
                .entities
                .iter_mut()
                .map(|(_, entity)| entity)
                .filter(|entity| entity.is_alive() && entity.has_all(required))
                .collect();

            let mut ctx = SystemContext::new(
                world,
                report.frame,
                &name,
                &mut self.commands,
                &mut self.managers,
            );
            let start = Instant::now();
            let failures = registered.system.process_entities(&mut matched, &mut ctx);
            report.system_times.push((name.clone(), start.elapsed()));

            for failed in failures {
                let failure = SystemFailure {
                    system: name.clone(),
                    handle: SystemHandle::Entity(id),
                    entity: failed.entity,
                    error: failed.error,
                };
                record_failure(isolate, failure, report)?;
            }
        }
        Ok(())
    }
}

/// Log a system failure and either keep it in the report or turn it into
/// the update's error.
fn record_failure(
    isolate: bool,
    failure: SystemFailure,
    report: &mut FrameReport,
) -> Result<(), EcsError> {
    warn!(
        system = %failure.system,
        entity = ?failure.entity,
        frame = report.frame,
        error = %failure.error,
        "system failed"
    );
    if isolate {
        report.failures.push(failure);
        return Ok(());
    }
    let source: BoxError = failure.error;
    Err(EcsError::System {
        system: failure.system,
        source,
    })
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("initialized", &self.initialized)
            .field("frame", &self.frame)
            .field("entities", &self.entities.len())
            .field("systems", &self.systems.len())
            .field("managers", &self.managers.len())
            .field("queued_commands", &self.commands.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
