//! Systems: the behaviour half of the ECS.
//!
//! A [`VoidSystem`] runs once per update with no entity. An [`EntitySystem`]
//! declares a [`ComponentSet`] and is handed every live entity that holds all
//! of those kinds. Both share the [`System`] lifecycle hooks, which the world
//! calls in system registration order.

use std::any::type_name;
use std::fmt;

use crate::command::{CommandBuffer, CommandKind};
use crate::component::{AnyComponent, Component, ComponentKind, ComponentSet};
use crate::entity::{Entity, EntityId};
use crate::manager::{Manager, ManagerRegistry};
use crate::slot::{SlotArena, SlotKey};
use crate::world::WorldId;
use crate::{AsAny, BoxError, EcsError};

/// Outcome of one system invocation.
pub type SystemResult = Result<(), BoxError>;

// ---------------------------------------------------------------------------
// SystemId / SystemHandle
// ---------------------------------------------------------------------------

/// Generational slot handle of a registered system.
///
/// Layout: `[generation: u32 | index: u32]`, same as
/// [`EntityId`](crate::entity::EntityId).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(u64);

impl SystemId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl SlotKey for SystemId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self::new(index, generation)
    }

    fn index(self) -> u32 {
        SystemId::index(self)
    }

    fn generation(self) -> u32 {
        SystemId::generation(self)
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({}v{})", self.index(), self.generation())
    }
}

/// Which list a system lives in, plus its slot in that list.
///
/// Void and entity systems have independent index spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemHandle {
    Void(SystemId),
    Entity(SystemId),
}

impl SystemHandle {
    /// Slot handle within the system's own list.
    pub fn id(self) -> SystemId {
        match self {
            SystemHandle::Void(id) | SystemHandle::Entity(id) => id,
        }
    }
}

// ---------------------------------------------------------------------------
// SystemState
// ---------------------------------------------------------------------------

/// Attachment state kept by systems that want to remember their world.
///
/// A system starts `Unattached` and becomes `Attached` when the world calls
/// [`System::set_world`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SystemState {
    #[default]
    Unattached,
    Attached(WorldId),
}

impl SystemState {
    pub fn attach(&mut self, world: WorldId) {
        *self = SystemState::Attached(world);
    }

    pub fn world(&self) -> Option<WorldId> {
        match self {
            SystemState::Unattached => None,
            SystemState::Attached(world) => Some(*world),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, SystemState::Attached(_))
    }
}

// ---------------------------------------------------------------------------
// System traits
// ---------------------------------------------------------------------------

/// Lifecycle hooks shared by every system. All have empty defaults.
pub trait System: AsAny {
    /// Name used in logs, reports and [`World::get_system_by_name`]. Read
    /// each time it is needed, so it may change while the system is in the
    /// world.
    ///
    /// [`World::get_system_by_name`]: crate::world::World::get_system_by_name
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Called when the system is registered, before any other hook.
    fn set_world(&mut self, _world: WorldId) {}

    /// Called once from [`World::init`](crate::world::World::init).
    fn added_to_world(&mut self) {}

    /// Called after an entity has been added to the world.
    fn added(&mut self, _entity: &Entity) {}

    /// Called before an entity is removed from the world.
    fn removed(&mut self, _entity: &Entity) {}
}

/// A system that runs once per update, independent of entities.
pub trait VoidSystem: System {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult;
}

/// A system that runs against every live entity holding all of
/// [`components`](Self::components).
pub trait EntitySystem: System {
    /// Kinds an entity must hold (all of them) to be processed.
    fn components(&self) -> &ComponentSet;

    /// Process one matching entity.
    fn process(&mut self, entity: &mut Entity, ctx: &mut SystemContext<'_>) -> SystemResult;

    /// Process this update's batch of matching entities, in slot order.
    ///
    /// The default calls [`process`](Self::process) for each entity and keeps
    /// going after a failure; every failure is returned.
    fn process_entities(
        &mut self,
        entities: &mut [&mut Entity],
        ctx: &mut SystemContext<'_>,
    ) -> Vec<EntityFailure> {
        let mut failures = Vec::new();
        for entity in entities.iter_mut() {
            if let Err(error) = self.process(entity, ctx) {
                failures.push(EntityFailure {
                    entity: entity.index(),
                    error,
                });
            }
        }
        failures
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// One entity that an entity system failed to process.
#[derive(Debug)]
pub struct EntityFailure {
    pub entity: Option<EntityId>,
    pub error: BoxError,
}

/// A failure recorded in a [`FrameReport`](crate::world::FrameReport).
#[derive(Debug)]
pub struct SystemFailure {
    /// [`System::name`] of the failing system.
    pub system: String,
    pub handle: SystemHandle,
    /// The entity being processed, `None` for void systems.
    pub entity: Option<EntityId>,
    pub error: BoxError,
}

impl fmt::Display for SystemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity {
            Some(entity) => write!(f, "{} on entity {}: {}", self.system, entity, self.error),
            None => write!(f, "{}: {}", self.system, self.error),
        }
    }
}

// ---------------------------------------------------------------------------
// SystemContext
// ---------------------------------------------------------------------------

/// What a running system can reach besides its own state and the entity.
///
/// Structural changes queued here are applied at the start of the next
/// update and are tagged with the system's name.
pub struct SystemContext<'a> {
    world: WorldId,
    frame: u64,
    system: &'a str,
    commands: &'a mut CommandBuffer,
    managers: &'a mut ManagerRegistry,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        world: WorldId,
        frame: u64,
        system: &'a str,
        commands: &'a mut CommandBuffer,
        managers: &'a mut ManagerRegistry,
    ) -> Self {
        Self {
            world,
            frame,
            system,
            commands,
            managers,
        }
    }

    /// The world being updated.
    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Number of updates the world completed before this one.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Name of the running system.
    pub fn system_name(&self) -> &str {
        self.system
    }

    /// Queue adding `entity` to the world.
    pub fn spawn(&mut self, entity: Entity) {
        self.push(CommandKind::Spawn(entity));
    }

    /// Queue marking `target` dead.
    pub fn destroy(&mut self, target: EntityId) {
        self.push(CommandKind::Destroy(target));
    }

    /// Queue removing `target` from the world.
    pub fn remove_entity(&mut self, target: EntityId) {
        self.push(CommandKind::Remove(target));
    }

    /// Queue attaching `component` to `target`.
    pub fn add_component<T: Component>(&mut self, target: EntityId, component: T) {
        self.add_boxed(target, Box::new(component));
    }

    pub fn add_boxed(&mut self, target: EntityId, component: Box<dyn AnyComponent>) {
        self.push(CommandKind::AddComponent { target, component });
    }

    /// Queue removing every component of `kind` from `target`.
    pub fn remove_component(&mut self, target: EntityId, kind: ComponentKind) {
        self.push(CommandKind::RemoveComponent { target, kind });
    }

    /// The world's command buffer, for commands not tagged with this system.
    pub fn commands(&mut self) -> &mut CommandBuffer {
        self.commands
    }

    pub fn manager<M: Manager>(&self) -> Result<&M, EcsError> {
        self.managers.get::<M>()
    }

    pub fn manager_mut<M: Manager>(&mut self) -> Result<&mut M, EcsError> {
        self.managers.get_mut::<M>()
    }

    fn push(&mut self, kind: CommandKind) {
        self.commands.push(kind, Some(self.system.to_owned()));
    }
}

impl fmt::Debug for SystemContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemContext")
            .field("world", &self.world)
            .field("frame", &self.frame)
            .field("system", &self.system)
            .field("queued", &self.commands.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RemovedSystem
// ---------------------------------------------------------------------------

/// A system taken out of a world by
/// [`World::remove_system`](crate::world::World::remove_system).
pub enum RemovedSystem {
    Void(Box<dyn VoidSystem>),
    Entity(Box<dyn EntitySystem>),
}

impl RemovedSystem {
    pub fn name(&self) -> &str {
        match self {
            RemovedSystem::Void(system) => system.name(),
            RemovedSystem::Entity(system) => system.name(),
        }
    }

    /// Downcast to the concrete system type.
    pub fn downcast<S: System>(self) -> Option<Box<S>> {
        let any: Box<dyn std::any::Any> = match self {
            RemovedSystem::Void(system) => system.into_any(),
            RemovedSystem::Entity(system) => system.into_any(),
        };
        any.downcast::<S>().ok()
    }
}

impl fmt::Debug for RemovedSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovedSystem::Void(_) => write!(f, "RemovedSystem::Void({})", self.name()),
            RemovedSystem::Entity(_) => write!(f, "RemovedSystem::Entity({})", self.name()),
        }
    }
}

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

/// A registered system plus its bookkeeping.
pub(crate) struct Registered<S: ?Sized> {
    /// Global registration sequence across both lists.
    pub(crate) seq: u64,
    pub(crate) system: Box<S>,
}

/// World lifecycle event delivered to every system.
pub(crate) enum Hook<'e> {
    AddedToWorld,
    Added(&'e Entity),
    Removed(&'e Entity),
}

fn dispatch<S: System + ?Sized>(system: &mut S, hook: &Hook<'_>) {
    match hook {
        Hook::AddedToWorld => system.added_to_world(),
        Hook::Added(entity) => system.added(entity),
        Hook::Removed(entity) => system.removed(entity),
    }
}

/// The world's two system lists.
#[derive(Default)]
pub(crate) struct SystemRegistry {
    pub(crate) void: SlotArena<SystemId, Registered<dyn VoidSystem>>,
    pub(crate) entity: SlotArena<SystemId, Registered<dyn EntitySystem>>,
    next_seq: u64,
}

impl SystemRegistry {
    pub(crate) fn add_void(&mut self, system: Box<dyn VoidSystem>) -> SystemHandle {
        let seq = self.bump_seq();
        SystemHandle::Void(self.void.insert(Registered { seq, system }))
    }

    pub(crate) fn add_entity(&mut self, system: Box<dyn EntitySystem>) -> SystemHandle {
        let seq = self.bump_seq();
        SystemHandle::Entity(self.entity.insert(Registered { seq, system }))
    }

    /// Take the system behind `handle` out of its list.
    pub(crate) fn remove(&mut self, handle: SystemHandle) -> Option<RemovedSystem> {
        match handle {
            SystemHandle::Void(id) => self.void.remove(id).map(|r| RemovedSystem::Void(r.system)),
            SystemHandle::Entity(id) => self
                .entity
                .remove(id)
                .map(|r| RemovedSystem::Entity(r.system)),
        }
    }

    /// The system's current [`System::name`].
    pub(crate) fn name(&self, handle: SystemHandle) -> Option<&str> {
        match handle {
            SystemHandle::Void(id) => self.void.get(id).map(|r| r.system.name()),
            SystemHandle::Entity(id) => self.entity.get(id).map(|r| r.system.name()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.void.len() + self.entity.len()
    }

    /// Every handle, ordered by registration.
    pub(crate) fn registration_order(&self) -> Vec<SystemHandle> {
        let mut order: Vec<(u64, SystemHandle)> = self
            .void
            .iter()
            .map(|(id, r)| (r.seq, SystemHandle::Void(id)))
            .chain(
                self.entity
                    .iter()
                    .map(|(id, r)| (r.seq, SystemHandle::Entity(id))),
            )
            .collect();
        order.sort_unstable_by_key(|(seq, _)| *seq);
        order.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Deliver `hook` to every system in registration order.
    pub(crate) fn notify_all(&mut self, hook: &Hook<'_>) {
        for handle in self.registration_order() {
            self.notify(handle, hook);
        }
    }

    /// Deliver `hook` to one system.
    pub(crate) fn notify(&mut self, handle: SystemHandle, hook: &Hook<'_>) {
        match handle {
            SystemHandle::Void(id) => {
                if let Some(r) = self.void.get_mut(id) {
                    dispatch(&mut *r.system, hook);
                }
            }
            SystemHandle::Entity(id) => {
                if let Some(r) = self.entity.get_mut(id) {
                    dispatch(&mut *r.system, hook);
                }
            }
        }
    }

    /// The first system of type `S`, void list first.
    pub(crate) fn find<S: System>(&self) -> Option<&S> {
        self.void
            .iter()
            .find_map(|(_, r)| (*r.system).as_any().downcast_ref::<S>())
            .or_else(|| {
                self.entity
                    .iter()
                    .find_map(|(_, r)| (*r.system).as_any().downcast_ref::<S>())
            })
    }

    pub(crate) fn find_mut<S: System>(&mut self) -> Option<&mut S> {
        let SystemRegistry { void, entity, .. } = self;
        if let Some(found) = void
            .iter_mut()
            .find_map(|(_, r)| (*r.system).as_any_mut().downcast_mut::<S>())
        {
            return Some(found);
        }
        entity
            .iter_mut()
            .find_map(|(_, r)| (*r.system).as_any_mut().downcast_mut::<S>())
    }

    /// The first system whose name is `name`, in registration order.
    pub(crate) fn find_by_name(&self, name: &str) -> Option<SystemHandle> {
        self.registration_order()
            .into_iter()
            .find(|handle| self.name(*handle) == Some(name))
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        ticks: u32,
    }
    impl System for Counter {}
    impl VoidSystem for Counter {
        fn update(&mut self, _ctx: &mut SystemContext<'_>) -> SystemResult {
            self.ticks += 1;
            Ok(())
        }
    }

    struct Named;
    impl System for Named {
        fn name(&self) -> &str {
            "named"
        }
    }
    impl VoidSystem for Named {
        fn update(&mut self, _ctx: &mut SystemContext<'_>) -> SystemResult {
            Ok(())
        }
    }

    struct Health(i32);
    impl Component for Health {
        const KIND: ComponentKind = ComponentKind::new("health");
    }

    struct FailOnNegative {
        required: ComponentSet,
    }
    impl System for FailOnNegative {}
    impl EntitySystem for FailOnNegative {
        fn components(&self) -> &ComponentSet {
            &self.required
        }
        fn process(&mut self, entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
            if entity.get_component::<Health>()?.0 < 0 {
                return Err("negative health".into());
            }
            Ok(())
        }
    }

    fn context<'a>(
        commands: &'a mut CommandBuffer,
        managers: &'a mut ManagerRegistry,
    ) -> SystemContext<'a> {
        SystemContext::new(WorldId::next(), 0, "test", commands, managers)
    }

    #[test]
    fn default_name_is_type_name() {
        let counter = Counter { ticks: 0 };
        assert!(counter.name().ends_with("Counter"));
        assert_eq!(Named.name(), "named");
    }

    #[test]
    fn system_state_attaches() {
        let mut state = SystemState::default();
        assert!(!state.is_attached());
        let world = WorldId::next();
        state.attach(world);
        assert_eq!(state.world(), Some(world));
    }

    #[test]
    fn default_process_entities_isolates_failures() {
        let mut commands = CommandBuffer::new();
        let mut managers = ManagerRegistry::new();
        let mut ctx = context(&mut commands, &mut managers);

        let mut ok = Entity::new().with(Health(1));
        let mut bad = Entity::new().with(Health(-1));
        let mut ok_again = Entity::new().with(Health(2));
        let mut batch = [&mut ok, &mut bad, &mut ok_again];

        let mut system = FailOnNegative {
            required: ComponentSet::of::<(Health,)>(),
        };
        let failures = system.process_entities(&mut batch, &mut ctx);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.to_string(), "negative health");
    }

    #[test]
    fn context_commands_are_tagged_with_system_name() {
        let mut commands = CommandBuffer::new();
        let mut managers = ManagerRegistry::new();
        {
            let mut ctx = context(&mut commands, &mut managers);
            ctx.spawn(Entity::new());
            ctx.destroy(EntityId::new(0, 0));
            ctx.commands().spawn(Entity::new());
        }
        let issuers: Vec<Option<&str>> = commands
            .commands()
            .iter()
            .map(|c| c.issued_by.as_deref())
            .collect();
        assert_eq!(issuers, vec![Some("test"), Some("test"), None]);
    }

    #[test]
    fn registry_orders_by_registration_across_lists() {
        let mut registry = SystemRegistry::default();
        let a = registry.add_void(Box::new(Named));
        let b = registry.add_entity(Box::new(FailOnNegative {
            required: ComponentSet::default(),
        }));
        let c = registry.add_void(Box::new(Counter { ticks: 0 }));

        assert_eq!(registry.registration_order(), vec![a, b, c]);
        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 0);
        assert_eq!(c.id().index(), 1);
        assert_eq!(registry.find_by_name("named"), Some(a));
        assert!(registry.find::<Counter>().is_some());
        registry.find_mut::<Counter>().unwrap().ticks = 7;
        assert_eq!(registry.find::<Counter>().unwrap().ticks, 7);

        assert_eq!(registry.remove(a).unwrap().name(), "named");
        assert!(registry.remove(a).is_none());
        let counter = registry.remove(c).unwrap().downcast::<Counter>().unwrap();
        assert_eq!(counter.ticks, 7);
        assert_eq!(registry.len(), 1);
    }
}
