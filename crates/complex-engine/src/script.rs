//! Per-entity scripts.
//!
//! Attach a [`ScriptComponent`] holding a [`Script`] to an entity and register
//! a [`ScriptSystem`]. Each frame the system runs the script's
//! [`setup`](Script::setup) once, the first time it sees it, then
//! [`update`](Script::update).

use tracing::debug;

use complex_ecs::component::{Component, ComponentKind, ComponentSet};
use complex_ecs::entity::Entity;
use complex_ecs::system::{EntitySystem, System, SystemContext, SystemResult};
use complex_ecs::AsAny;

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Behaviour attached to a single entity.
pub trait Script: AsAny {
    /// Runs once, before the first [`update`](Self::update).
    fn setup(&mut self, _entity: &mut Entity) -> SystemResult {
        Ok(())
    }

    /// Runs every frame after a successful setup.
    fn update(&mut self, entity: &mut Entity) -> SystemResult;
}

// ---------------------------------------------------------------------------
// ScriptComponent
// ---------------------------------------------------------------------------

/// Component holding an entity's script and whether it has been set up.
pub struct ScriptComponent {
    /// `None` only while the script is running.
    script: Option<Box<dyn Script>>,
    setup: bool,
}

impl ScriptComponent {
    pub fn new<S: Script>(script: S) -> Self {
        Self {
            script: Some(Box::new(script)),
            setup: false,
        }
    }

    /// Whether [`Script::setup`] has completed.
    pub fn is_setup(&self) -> bool {
        self.setup
    }

    /// The script, if it has type `S`.
    pub fn script<S: Script>(&self) -> Option<&S> {
        self.script
            .as_deref()
            .and_then(|script| script.as_any().downcast_ref::<S>())
    }

    pub fn script_mut<S: Script>(&mut self) -> Option<&mut S> {
        self.script
            .as_deref_mut()
            .and_then(|script| script.as_any_mut().downcast_mut::<S>())
    }
}

impl Component for ScriptComponent {
    const KIND: ComponentKind = ComponentKind::new("cx.scriptcomponent");
}

impl std::fmt::Debug for ScriptComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptComponent")
            .field("setup", &self.setup)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ScriptSystem
// ---------------------------------------------------------------------------

/// Entity system that drives every [`ScriptComponent`].
pub struct ScriptSystem {
    required: ComponentSet,
}

impl ScriptSystem {
    pub const NAME: &'static str = "cx.scriptsystem";

    pub fn new() -> Self {
        Self {
            required: ComponentSet::of::<(ScriptComponent,)>(),
        }
    }
}

impl Default for ScriptSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ScriptSystem {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl EntitySystem for ScriptSystem {
    fn components(&self) -> &ComponentSet {
        &self.required
    }

    fn process(&mut self, entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
        // The script is taken out of its component so it can borrow the
        // entity mutably, then put back.
        let (mut script, needs_setup) = {
            let component = entity.get_component_mut::<ScriptComponent>()?;
            match component.script.take() {
                Some(script) => (script, !component.setup),
                None => return Ok(()),
            }
        };

        let mut outcome = if needs_setup {
            script.setup(entity)
        } else {
            Ok(())
        };
        let set_up = outcome.is_ok();
        if set_up {
            outcome = script.update(entity);
        }

        let index = entity.index();
        match entity.get_component_mut::<ScriptComponent>() {
            Ok(component) => {
                component.script = Some(script);
                component.setup |= set_up;
            }
            Err(_) => debug!(entity = ?index, "script component removed while running"),
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
