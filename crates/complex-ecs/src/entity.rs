//! Entities: slot-recycled component containers with liveness flags and
//! named event listeners.
//!
//! An [`EntityId`] is a 64-bit handle that packs the slot *generation* in the
//! high 32 bits and the slot *index* in the low 32 bits. The index is the
//! entity's position in the owning [`World`](crate::world::World); it is only
//! meaningful between registration and removal.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{AnyComponent, Component, ComponentKind, ComponentSet};
use crate::slot::SlotKey;
use crate::world::WorldId;
use crate::{BoxError, EcsError};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct an `EntityId` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl SlotKey for EntityId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self::new(index, generation)
    }

    fn index(self) -> u32 {
        EntityId::index(self)
    }

    fn generation(self) -> u32 {
        EntityId::generation(self)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Callback registered under an event name on an [`Entity`].
pub type Listener = Box<dyn FnMut(&serde_json::Value) -> Result<(), BoxError>>;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// An ordered collection of component slots plus liveness flags.
///
/// Removing a component tombstones its slot without shifting the others; the
/// next [`add_component`](Self::add_component) fills the first empty slot.
/// Lookup is always by kind, so slot order carries no meaning.
pub struct Entity {
    components: Vec<Option<Box<dyn AnyComponent>>>,
    alive: bool,
    pending_removal: bool,
    index: Option<EntityId>,
    world: Option<WorldId>,
    listeners: HashMap<String, Vec<Listener>>,
}

impl Entity {
    /// Create a live, unregistered entity with no components.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            alive: true,
            pending_removal: false,
            index: None,
            world: None,
            listeners: HashMap::new(),
        }
    }

    /// Builder form of [`add_component`](Self::add_component).
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.add_component(component);
        self
    }

    // -- components ---------------------------------------------------------

    /// Attach a component, reusing the first empty slot if there is one.
    pub fn add_component<T: Component>(&mut self, component: T) -> &mut Self {
        self.add_boxed(Box::new(component))
    }

    /// Attach an already boxed component.
    pub fn add_boxed(&mut self, component: Box<dyn AnyComponent>) -> &mut Self {
        match self.components.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(component),
            None => self.components.push(Some(component)),
        }
        self
    }

    /// The first component of type `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentNotFound`] if the entity holds no `T`. Use
    /// [`has_component`](Self::has_component) first for "maybe" semantics.
    pub fn get_component<T: Component>(&self) -> Result<&T, EcsError> {
        self.occupied()
            .filter(|c| c.kind() == T::KIND)
            .find_map(|c| c.as_any().downcast_ref::<T>())
            .ok_or_else(|| self.not_found(T::KIND))
    }

    /// Mutable access to the first component of type `T`.
    pub fn get_component_mut<T: Component>(&mut self) -> Result<&mut T, EcsError> {
        let kind = T::KIND;
        let index = self.index;
        self.components
            .iter_mut()
            .flatten()
            .filter(|c| c.kind() == kind)
            .find_map(|c| c.as_any_mut().downcast_mut::<T>())
            .ok_or(EcsError::ComponentNotFound {
                kind,
                entity: index,
            })
    }

    /// The first component whose runtime kind is `kind`.
    pub fn get_component_dyn(&self, kind: ComponentKind) -> Result<&dyn AnyComponent, EcsError> {
        self.occupied()
            .find(|c| c.kind() == kind)
            .ok_or_else(|| self.not_found(kind))
    }

    /// Whether the entity holds a component of type `T`.
    pub fn has_component<T: Component>(&self) -> bool {
        self.get_component::<T>().is_ok()
    }

    /// Whether the entity holds a component of the given kind.
    pub fn has_kind(&self, kind: ComponentKind) -> bool {
        self.occupied().any(|c| c.kind() == kind)
    }

    /// Whether the entity holds every kind in `required`.
    pub fn has_all(&self, required: &ComponentSet) -> bool {
        required.iter().all(|kind| self.has_kind(kind))
    }

    /// Every component of type `T`, in slot order.
    pub fn get_components<T: Component>(&self) -> Vec<&T> {
        self.occupied()
            .filter(|c| c.kind() == T::KIND)
            .filter_map(|c| c.as_any().downcast_ref::<T>())
            .collect()
    }

    /// Every component of the given kind, in slot order.
    pub fn get_components_dyn(&self, kind: ComponentKind) -> Vec<&dyn AnyComponent> {
        self.occupied().filter(|c| c.kind() == kind).collect()
    }

    /// Tombstone every slot holding a component of type `T`.
    ///
    /// Returns the number of removed components.
    pub fn remove_component<T: Component>(&mut self) -> usize {
        self.remove_kind(T::KIND)
    }

    /// Tombstone every slot holding a component of the given kind. Other
    /// slots keep their positions.
    pub fn remove_kind(&mut self, kind: ComponentKind) -> usize {
        let mut removed = 0;
        for slot in &mut self.components {
            if slot.as_ref().is_some_and(|c| c.kind() == kind) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Kinds of the attached components, in slot order.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.occupied().map(|c| c.kind())
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.occupied().count()
    }

    /// Number of component slots, including tombstones.
    pub fn slot_count(&self) -> usize {
        self.components.len()
    }

    // -- listeners ----------------------------------------------------------

    /// Register `callback` under `event`. Several callbacks may share a name;
    /// they run in registration order.
    pub fn add_listener<F>(&mut self, event: impl Into<String>, callback: F) -> &mut Self
    where
        F: FnMut(&serde_json::Value) -> Result<(), BoxError> + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(callback));
        self
    }

    /// Unregister every callback under `event`. Returns how many were dropped.
    pub fn remove_listener(&mut self, event: &str) -> usize {
        self.listeners.remove(event).map_or(0, |list| list.len())
    }

    /// Number of callbacks registered under `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Synchronously invoke every callback registered under `event`.
    ///
    /// # Errors
    ///
    /// The first callback error stops the emission and is returned as
    /// [`EcsError::Listener`]; later callbacks do not run.
    pub fn emit(&mut self, event: &str, data: &serde_json::Value) -> Result<(), EcsError> {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return Ok(());
        };
        for listener in listeners.iter_mut() {
            listener(data).map_err(|source| EcsError::Listener {
                event: event.to_owned(),
                source,
            })?;
        }
        Ok(())
    }

    // -- lifecycle ----------------------------------------------------------

    /// Mark the entity dead. The owning world removes it on its next reap pass.
    pub fn destroy(&mut self) {
        self.alive = false;
        self.pending_removal = true;
    }

    /// Whether the entity has not been destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the entity is waiting to be reaped.
    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal
    }

    /// Slot handle in the owning world, `None` while unregistered.
    pub fn index(&self) -> Option<EntityId> {
        self.index
    }

    /// Slot handle in the owning world.
    ///
    /// # Errors
    ///
    /// [`EcsError::Unregistered`] if the entity has not been added to a world.
    pub fn require_index(&self) -> Result<EntityId, EcsError> {
        self.index.ok_or(EcsError::Unregistered)
    }

    /// The owning world, `None` while unregistered.
    pub fn world(&self) -> Option<WorldId> {
        self.world
    }

    pub(crate) fn set_index(&mut self, index: Option<EntityId>) {
        self.index = index;
    }

    pub(crate) fn set_world(&mut self, world: Option<WorldId>) {
        self.world = world;
    }

    // -- internal helpers ---------------------------------------------------

    fn occupied(&self) -> impl Iterator<Item = &(dyn AnyComponent + 'static)> {
        self.components.iter().flatten().map(|c| &**c)
    }

    fn not_found(&self, kind: ComponentKind) -> EcsError {
        EcsError::ComponentNotFound {
            kind,
            entity: self.index,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<ComponentKind> = self.kinds().collect();
        f.debug_struct("Entity")
            .field("index", &self.index)
            .field("alive", &self.alive)
            .field("components", &kinds)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
