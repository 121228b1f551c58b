//! Complex ECS -- a minimal Entity-Component-System runtime.
//!
//! A [`World`](world::World) owns entities, systems and managers and drives
//! the per-frame update protocol:
//!
//! 1. apply the deferred [`CommandBuffer`](command::CommandBuffer),
//! 2. reap entities whose `alive` flag is cleared,
//! 3. run every [`VoidSystem`](system::VoidSystem) in slot order,
//! 4. run every [`EntitySystem`](system::EntitySystem) against the live
//!    entities holding all of its required component kinds.
//!
//! Entities and systems live in slot arenas that reuse the lowest free index
//! first, so indices stay dense but are only valid between registration and
//! removal.
//!
//! # Quick Start
//!
//! ```
//! use complex_ecs::prelude::*;
//!
//! struct Position { x: f32 }
//! impl Component for Position {
//!     const KIND: ComponentKind = ComponentKind::new("position");
//! }
//!
//! struct Drift { required: ComponentSet }
//! impl System for Drift {}
//! impl EntitySystem for Drift {
//!     fn components(&self) -> &ComponentSet {
//!         &self.required
//!     }
//!     fn process(&mut self, entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
//!         entity.get_component_mut::<Position>()?.x += 1.0;
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! world.add_entity_system(Drift { required: ComponentSet::of::<(Position,)>() });
//! let id = world.add_entity(Entity::new().with(Position { x: 0.0 }));
//! world.init().unwrap();
//! world.update().unwrap();
//!
//! let x = world.get_entity(id).unwrap().get_component::<Position>().unwrap().x;
//! assert_eq!(x, 1.0);
//! ```

#![deny(unsafe_code)]

use std::any::Any;

pub mod command;
pub mod component;
pub mod entity;
pub mod manager;
pub mod slot;
pub mod system;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Boxed error returned by systems and listener callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity holds no component of the requested kind.
    #[error("component '{kind}' not found on entity {entity:?}")]
    ComponentNotFound {
        kind: component::ComponentKind,
        entity: Option<entity::EntityId>,
    },

    /// The handle points at an empty slot or at a slot that has been reused.
    #[error("entity {0} does not exist (empty slot or stale handle)")]
    EntityNotFound(entity::EntityId),

    /// No registered system matches the lookup.
    #[error("system '{0}' is not registered")]
    SystemNotFound(String),

    /// No registered manager has the requested type.
    #[error("manager '{0}' is not registered")]
    ManagerNotFound(&'static str),

    /// The entity has no index: it was never added to a world, or has been
    /// removed from one.
    #[error("entity is not registered with a world")]
    Unregistered,

    /// `update()` was called before `init()`.
    #[error("world must be initialized before update()")]
    NotInitialized,

    /// `init()` was called a second time.
    #[error("world has already been initialized")]
    AlreadyInitialized,

    /// A listener callback failed during `emit`.
    #[error("listener for event '{event}' failed: {source}")]
    Listener {
        event: String,
        #[source]
        source: BoxError,
    },

    /// A system failed and the world is configured not to isolate failures.
    #[error("system '{system}' failed: {source}")]
    System {
        system: String,
        #[source]
        source: BoxError,
    },
}

impl EcsError {
    /// Whether this is a lookup miss (component, entity, system or manager).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EcsError::ComponentNotFound { .. }
                | EcsError::EntityNotFound(_)
                | EcsError::SystemNotFound(_)
                | EcsError::ManagerNotFound(_)
        )
    }

    /// Whether the operation was called in a state that does not allow it.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            EcsError::Unregistered | EcsError::NotInitialized | EcsError::AlreadyInitialized
        )
    }
}

// ---------------------------------------------------------------------------
// AsAny
// ---------------------------------------------------------------------------

/// Upcast to [`Any`] so boxed systems and managers can be looked up by type.
///
/// Implemented for every `'static` type. Call it on the trait object
/// (`(*boxed).as_any()`), not on the `Box`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::command::{ApplyReport, Command, CommandBuffer, CommandKind};
    pub use crate::component::{AnyComponent, Component, ComponentKind, ComponentSet};
    pub use crate::entity::{Entity, EntityId};
    pub use crate::manager::{Manager, ManagerRegistry};
    pub use crate::system::{
        EntityFailure, EntitySystem, System, SystemContext, SystemFailure, SystemHandle,
        RemovedSystem, SystemId, SystemResult, SystemState, VoidSystem,
    };
    pub use crate::world::{FrameReport, World, WorldConfig, WorldId};
    pub use crate::{BoxError, EcsError};
}
