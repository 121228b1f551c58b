//! Deferred world mutations.
//!
//! Systems receive the world's [`CommandBuffer`] through their
//! [`SystemContext`](crate::system::SystemContext) and queue structural
//! changes there instead of touching the entity arena mid-pass. The world
//! applies the buffer in FIFO order at the start of the next
//! [`update`](crate::world::World::update), before the reap phase.
//!
//! ```
//! use complex_ecs::prelude::*;
//!
//! let mut world = World::new();
//! world.commands_mut().spawn(Entity::new());
//! assert_eq!(world.entity_count(), 0);
//!
//! let report = world.apply_commands();
//! assert_eq!(report.success_count, 1);
//! assert_eq!(world.entity_count(), 1);
//! ```

use std::collections::HashMap;

use tracing::warn;

use crate::component::{AnyComponent, Component, ComponentKind};
use crate::entity::{Entity, EntityId};
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// What mutation a command performs.
#[derive(Debug)]
pub enum CommandKind {
    /// Add a new entity to the world.
    Spawn(Entity),
    /// Mark an entity dead; it is reaped in the same update.
    Destroy(EntityId),
    /// Remove an entity from the world immediately, skipping the reap pass.
    Remove(EntityId),
    /// Attach a component to an entity.
    AddComponent {
        target: EntityId,
        component: Box<dyn AnyComponent>,
    },
    /// Remove every component of `kind` from an entity.
    RemoveComponent {
        target: EntityId,
        kind: ComponentKind,
    },
}

impl CommandKind {
    /// The entity the command addresses, `None` for spawns.
    pub fn target(&self) -> Option<EntityId> {
        match self {
            CommandKind::Spawn(_) => None,
            CommandKind::Destroy(target)
            | CommandKind::Remove(target)
            | CommandKind::AddComponent { target, .. }
            | CommandKind::RemoveComponent { target, .. } => Some(*target),
        }
    }

    /// The component kind the command touches, if any.
    fn component_kind(&self) -> Option<ComponentKind> {
        match self {
            CommandKind::AddComponent { component, .. } => Some(component.kind()),
            CommandKind::RemoveComponent { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single queued mutation.
#[derive(Debug)]
pub struct Command {
    /// What to do.
    pub kind: CommandKind,
    /// Name of the system that queued the command, `None` when queued from
    /// outside a system.
    pub issued_by: Option<String>,
    /// Sequential index within the buffer (set on insertion).
    pub command_index: u32,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of one [`CommandBuffer::apply`] call.
///
/// `conflict_count` counts (entity, component kind) pairs that were targeted
/// by more than one command. Conflicts are warnings: the later command wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of (entity, kind) pairs targeted by multiple commands.
    pub conflict_count: usize,
    /// Number of commands that failed to apply.
    pub failed_count: usize,
    /// Number of commands that applied successfully.
    pub success_count: usize,
    /// Handles of the entities created by spawn commands, in command order.
    pub spawned: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// FIFO queue of deferred mutations.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_index: u32,
    last_apply_report: ApplyReport,
}

impl CommandBuffer {
    /// Create a new, empty command buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue adding `entity` to the world.
    pub fn spawn(&mut self, entity: Entity) {
        self.push(CommandKind::Spawn(entity), None);
    }

    /// Queue marking `target` dead.
    pub fn destroy(&mut self, target: EntityId) {
        self.push(CommandKind::Destroy(target), None);
    }

    /// Queue removing `target` from the world.
    pub fn remove_entity(&mut self, target: EntityId) {
        self.push(CommandKind::Remove(target), None);
    }

    /// Queue attaching `component` to `target`.
    pub fn add_component<T: Component>(&mut self, target: EntityId, component: T) {
        self.add_boxed(target, Box::new(component));
    }

    /// Queue attaching an already boxed component to `target`.
    pub fn add_boxed(&mut self, target: EntityId, component: Box<dyn AnyComponent>) {
        self.push(CommandKind::AddComponent { target, component }, None);
    }

    /// Queue removing every component of `kind` from `target`.
    pub fn remove_component(&mut self, target: EntityId, kind: ComponentKind) {
        self.push(CommandKind::RemoveComponent { target, kind }, None);
    }

    /// Queued commands in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Report from the last [`apply`](Self::apply) call.
    ///
    /// All zero if `apply()` has never been called.
    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_apply_report
    }

    /// Apply every queued command to `world` in insertion order and clear
    /// the buffer.
    ///
    /// Commands addressing missing or stale entities are logged and counted
    /// as failures; the remaining commands still run.
    pub fn apply(&mut self, world: &mut World) -> ApplyReport {
        let commands = std::mem::take(&mut self.commands);
        self.next_index = 0;

        // --- Conflict detection ---
        let mut seen: HashMap<(EntityId, ComponentKind), Vec<u32>> = HashMap::new();
        for cmd in &commands {
            if let (Some(target), Some(kind)) = (cmd.kind.target(), cmd.kind.component_kind()) {
                seen.entry((target, kind))
                    .or_default()
                    .push(cmd.command_index);
            }
        }
        let mut conflict_count = 0;
        for ((entity, kind), indices) in &seen {
            if indices.len() > 1 {
                conflict_count += 1;
                warn!(
                    entity = %entity,
                    component = %kind,
                    command_indices = ?indices,
                    "conflict: {} commands target the same entity+component (last command wins)",
                    indices.len()
                );
            }
        }

        // --- Apply loop ---
        let mut report = ApplyReport {
            conflict_count,
            ..ApplyReport::default()
        };
        for cmd in commands {
            let Command {
                kind,
                issued_by,
                command_index,
            } = cmd;
            let target = kind.target();
            match Self::apply_one(world, kind) {
                Ok(spawned) => {
                    report.success_count += 1;
                    report.spawned.extend(spawned);
                }
                Err(e) => {
                    report.failed_count += 1;
                    warn!(
                        command_index,
                        target = ?target,
                        issued_by = issued_by.as_deref().unwrap_or("<external>"),
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }

        self.last_apply_report = report.clone();
        report
    }

    /// Clear the buffer without applying any commands.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_index = 0;
    }

    // -- internal helpers ---------------------------------------------------

    pub(crate) fn push(&mut self, kind: CommandKind, issued_by: Option<String>) {
        let index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            kind,
            issued_by,
            command_index: index,
        });
    }

    fn apply_one(world: &mut World, kind: CommandKind) -> Result<Option<EntityId>, EcsError> {
        match kind {
            CommandKind::Spawn(entity) => Ok(Some(world.add_entity(entity))),
            CommandKind::Destroy(target) => {
                world.get_entity_mut(target)?.destroy();
                Ok(None)
            }
            CommandKind::Remove(target) => world.remove_entity(target).map(|_| None),
            CommandKind::AddComponent { target, component } => {
                world.get_entity_mut(target)?.add_boxed(component);
                Ok(None)
            }
            CommandKind::RemoveComponent { target, kind } => {
                world.get_entity_mut(target)?.remove_kind(kind);
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
