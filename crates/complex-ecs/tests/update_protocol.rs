//! End-to-end tests of the world update protocol: slot reuse, matching,
//! reap ordering, notification fan-out, deferred commands and failure
//! isolation.

use std::cell::RefCell;
use std::rc::Rc;

use complex_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Test component types
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct A;
impl Component for A {
    const KIND: ComponentKind = ComponentKind::new("a");
}

#[derive(Debug, PartialEq)]
struct B;
impl Component for B {
    const KIND: ComponentKind = ComponentKind::new("b");
}

#[derive(Debug, PartialEq)]
struct C;
impl Component for C {
    const KIND: ComponentKind = ComponentKind::new("c");
}

#[derive(Debug, PartialEq)]
struct Counter(u32);
impl Component for Counter {
    const KIND: ComponentKind = ComponentKind::new("counter");
}

// ---------------------------------------------------------------------------
// Test systems
// ---------------------------------------------------------------------------

type Events = Rc<RefCell<Vec<String>>>;

/// Records entity add/remove notifications.
struct Watcher {
    label: String,
    events: Events,
}

impl Watcher {
    fn new(label: &str, events: &Events) -> Self {
        Self {
            label: label.to_owned(),
            events: Rc::clone(events),
        }
    }
}

impl System for Watcher {
    fn name(&self) -> &str {
        &self.label
    }
    fn added(&mut self, _entity: &Entity) {
        self.events.borrow_mut().push(format!("{}:added", self.label));
    }
    fn removed(&mut self, _entity: &Entity) {
        self.events
            .borrow_mut()
            .push(format!("{}:removed", self.label));
    }
}

impl VoidSystem for Watcher {
    fn update(&mut self, _ctx: &mut SystemContext<'_>) -> SystemResult {
        Ok(())
    }
}

/// Records which entities it was handed each frame.
struct Collect {
    required: ComponentSet,
    seen: Rc<RefCell<Vec<EntityId>>>,
}

impl System for Collect {}

impl EntitySystem for Collect {
    fn components(&self) -> &ComponentSet {
        &self.required
    }
    fn process(&mut self, entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
        self.seen.borrow_mut().push(entity.require_index()?);
        Ok(())
    }
}

/// Increments the counter on every entity holding one.
struct Tick {
    required: ComponentSet,
}

impl Tick {
    fn new() -> Self {
        Self {
            required: ComponentSet::of::<(Counter,)>(),
        }
    }
}

impl System for Tick {}

impl EntitySystem for Tick {
    fn components(&self) -> &ComponentSet {
        &self.required
    }
    fn process(&mut self, entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
        entity.get_component_mut::<Counter>()?.0 += 1;
        Ok(())
    }
}

/// Entity system requiring `A` that records add/remove notifications.
struct EntityWatcher {
    label: String,
    required: ComponentSet,
    events: Events,
}

impl EntityWatcher {
    fn new(label: &str, events: &Events) -> Self {
        Self {
            label: label.to_owned(),
            required: ComponentSet::of::<(A,)>(),
            events: Rc::clone(events),
        }
    }
}

impl System for EntityWatcher {
    fn name(&self) -> &str {
        &self.label
    }
    fn added(&mut self, _entity: &Entity) {
        self.events.borrow_mut().push(format!("{}:added", self.label));
    }
    fn removed(&mut self, _entity: &Entity) {
        self.events
            .borrow_mut()
            .push(format!("{}:removed", self.label));
    }
}

impl EntitySystem for EntityWatcher {
    fn components(&self) -> &ComponentSet {
        &self.required
    }
    fn process(&mut self, _entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
        self.events.borrow_mut().push(format!("{}:process", self.label));
        Ok(())
    }
}

/// Void system that always fails.
struct Broken;
impl System for Broken {
    fn name(&self) -> &str {
        "broken"
    }
}
impl VoidSystem for Broken {
    fn update(&mut self, _ctx: &mut SystemContext<'_>) -> SystemResult {
        Err("broken on purpose".into())
    }
}

/// Void system that counts its runs.
#[derive(Default)]
struct Runs(u32);
impl System for Runs {}
impl VoidSystem for Runs {
    fn update(&mut self, _ctx: &mut SystemContext<'_>) -> SystemResult {
        self.0 += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Slot reuse
// ---------------------------------------------------------------------------

#[test]
fn removed_entity_slot_is_reused_by_the_next_add() {
    let mut world = World::new();
    let ids: Vec<EntityId> = (0..5).map(|_| world.add_entity(Entity::new())).collect();

    world.remove_entity(ids[2]).unwrap();
    let replacement = world.add_entity(Entity::new());

    assert_eq!(replacement.index(), 2);
    assert_eq!(world.entity_slot_count(), 5);
    assert!(world.get_entity(ids[2]).unwrap_err().is_not_found());
    assert_eq!(
        world.get_entity(replacement).unwrap().index(),
        Some(replacement)
    );
}

#[test]
fn removed_system_slot_is_reused() {
    let mut world = World::new();
    let first = world.add_void_system(Runs::default());
    let _second = world.add_void_system(Runs::default());

    world.remove_system(first).unwrap();
    let third = world.add_void_system(Runs::default());
    assert_eq!(third.id().index(), 0);
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[test]
fn entity_system_sees_only_entities_with_all_kinds() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    world.add_entity_system(Collect {
        required: ComponentSet::of::<(A, B)>(),
        seen: Rc::clone(&seen),
    });

    let e1 = world.add_entity(Entity::new().with(A).with(B));
    let _e2 = world.add_entity(Entity::new().with(A));
    let e3 = world.add_entity(Entity::new().with(A).with(B).with(C));

    world.init().unwrap();
    world.update().unwrap();

    assert_eq!(*seen.borrow(), vec![e1, e3]);
    assert_eq!(
        world.matching_entities(&ComponentSet::of::<(A, B)>()),
        vec![e1, e3]
    );
}

#[test]
fn matching_is_recomputed_every_frame() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    world.add_entity_system(Collect {
        required: ComponentSet::of::<(A,)>(),
        seen: Rc::clone(&seen),
    });
    let id = world.add_entity(Entity::new());
    world.init().unwrap();

    world.update().unwrap();
    assert!(seen.borrow().is_empty());

    world.get_entity_mut(id).unwrap().add_component(A);
    world.update().unwrap();
    assert_eq!(*seen.borrow(), vec![id]);
}

// ---------------------------------------------------------------------------
// Reap ordering
// ---------------------------------------------------------------------------

#[test]
fn destroyed_entity_is_reaped_once_with_one_notification_per_system() {
    let events = Events::default();
    let mut world = World::new();
    world.add_void_system(Watcher::new("v1", &events));
    world.add_void_system(Watcher::new("v2", &events));
    let id = world.add_entity(Entity::new());
    world.init().unwrap();
    events.borrow_mut().clear();

    world.get_entity_mut(id).unwrap().destroy();
    let report = world.update().unwrap();
    assert_eq!(report.reaped, vec![id]);
    assert_eq!(*events.borrow(), vec!["v1:removed", "v2:removed"]);
    assert_eq!(world.entity_at(id.index()), None);

    let report = world.update().unwrap();
    assert!(report.reaped.is_empty());
    assert_eq!(events.borrow().len(), 2);
}

#[test]
fn entity_destroyed_mid_frame_is_skipped_by_later_systems() {
    struct Killer {
        required: ComponentSet,
    }
    impl System for Killer {}
    impl EntitySystem for Killer {
        fn components(&self) -> &ComponentSet {
            &self.required
        }
        fn process(&mut self, entity: &mut Entity, _ctx: &mut SystemContext<'_>) -> SystemResult {
            entity.destroy();
            Ok(())
        }
    }

    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut world = World::new();
    world.add_entity_system(Killer {
        required: ComponentSet::of::<(A,)>(),
    });
    world.add_entity_system(Collect {
        required: ComponentSet::of::<(A,)>(),
        seen: Rc::clone(&seen),
    });
    let id = world.add_entity(Entity::new().with(A));
    world.init().unwrap();

    world.update().unwrap();
    assert!(seen.borrow().is_empty());
    assert!(world.get_entity(id).unwrap().is_pending_removal());

    let report = world.update().unwrap();
    assert_eq!(report.reaped, vec![id]);
}

// ---------------------------------------------------------------------------
// Notification fan-out
// ---------------------------------------------------------------------------

#[test]
fn adding_an_entity_notifies_every_system_in_registration_order() {
    let events = Events::default();
    let mut world = World::new();
    world.add_void_system(Watcher::new("first", &events));
    world.add_void_system(Watcher::new("second", &events));
    world.add_void_system(Watcher::new("third", &events));

    world.add_entity(Entity::new());

    assert_eq!(
        *events.borrow(),
        vec!["first:added", "second:added", "third:added"]
    );
}

#[test]
fn entity_systems_are_notified_even_for_entities_they_do_not_match() {
    let events = Events::default();
    let mut world = World::new();
    world.add_void_system(Watcher::new("v1", &events));
    world.add_entity_system(EntityWatcher::new("e1", &events));
    world.add_void_system(Watcher::new("v2", &events));
    world.init().unwrap();

    let id = world.add_entity(Entity::new().with(B));
    assert_eq!(*events.borrow(), vec!["v1:added", "e1:added", "v2:added"]);
    events.borrow_mut().clear();

    world.get_entity_mut(id).unwrap().destroy();
    let report = world.update().unwrap();
    assert_eq!(report.reaped, vec![id]);
    assert_eq!(*events.borrow(), vec!["v1:removed", "e1:removed", "v2:removed"]);

    world.update().unwrap();
    assert_eq!(events.borrow().len(), 3);
}

// ---------------------------------------------------------------------------
// Init guard
// ---------------------------------------------------------------------------

#[test]
fn update_before_init_fails_and_changes_nothing() {
    let mut world = World::new();
    world.add_void_system(Runs::default());
    let id = world.add_entity(Entity::new());
    world.get_entity_mut(id).unwrap().destroy();

    let err = world.update().unwrap_err();
    assert!(matches!(err, EcsError::NotInitialized));
    assert!(err.is_invalid_state());
    assert_eq!(world.get_system::<Runs>().unwrap().0, 0);
    assert!(world.contains(id));
    assert!(!world.is_initialized());
}

// ---------------------------------------------------------------------------
// Deferred commands
// ---------------------------------------------------------------------------

#[test]
fn spawn_queued_in_frame_n_is_processed_in_frame_n_plus_one() {
    struct Spawner {
        done: bool,
    }
    impl System for Spawner {}
    impl VoidSystem for Spawner {
        fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
            if !self.done {
                ctx.spawn(Entity::new().with(Counter(0)));
                self.done = true;
            }
            Ok(())
        }
    }

    let mut world = World::new();
    world.add_void_system(Spawner { done: false });
    world.add_entity_system(Tick::new());
    world.init().unwrap();

    let first = world.update().unwrap();
    assert!(first.commands.spawned.is_empty());
    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.commands().len(), 1);
    assert_eq!(
        world.commands().commands()[0].issued_by.as_deref(),
        Some(std::any::type_name::<Spawner>())
    );

    let second = world.update().unwrap();
    assert_eq!(second.commands.spawned.len(), 1);
    let spawned = second.commands.spawned[0];
    assert_eq!(
        world.get_entity(spawned).unwrap().get_component::<Counter>().unwrap(),
        &Counter(1)
    );
}

#[test]
fn component_changes_through_context_apply_next_frame() {
    struct Tagger {
        required: ComponentSet,
    }
    impl System for Tagger {}
    impl EntitySystem for Tagger {
        fn components(&self) -> &ComponentSet {
            &self.required
        }
        fn process(&mut self, entity: &mut Entity, ctx: &mut SystemContext<'_>) -> SystemResult {
            let id = entity.require_index()?;
            ctx.remove_component(id, A::KIND);
            ctx.add_component(id, B);
            Ok(())
        }
    }

    let mut world = World::new();
    world.add_entity_system(Tagger {
        required: ComponentSet::of::<(A,)>(),
    });
    let id = world.add_entity(Entity::new().with(A));
    world.init().unwrap();

    world.update().unwrap();
    assert!(world.get_entity(id).unwrap().has_component::<A>());

    let report = world.update().unwrap();
    assert_eq!(report.commands.success_count, 2);
    let entity = world.get_entity(id).unwrap();
    assert!(!entity.has_component::<A>());
    assert!(entity.has_component::<B>());
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn isolated_failure_does_not_stop_later_systems() {
    let mut world = World::new();
    world.add_void_system(Broken);
    world.add_void_system(Runs::default());
    world.add_entity_system(Tick::new());
    let id = world.add_entity(Entity::new().with(Counter(0)));
    world.init().unwrap();

    let report = world.update().unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].system, "broken");
    assert_eq!(report.failures[0].entity, None);
    assert_eq!(world.get_system::<Runs>().unwrap().0, 1);
    assert_eq!(
        world.get_entity(id).unwrap().get_component::<Counter>().unwrap(),
        &Counter(1)
    );
}

#[test]
fn failure_aborts_the_frame_without_isolation() {
    let mut world = World::with_config(WorldConfig {
        isolate_system_errors: false,
        ..WorldConfig::default()
    });
    world.add_void_system(Broken);
    world.add_void_system(Runs::default());
    world.init().unwrap();

    let err = world.update().unwrap_err();
    assert!(matches!(err, EcsError::System { ref system, .. } if system == "broken"));
    assert_eq!(world.get_system::<Runs>().unwrap().0, 0);
}

#[test]
fn one_failing_entity_does_not_stop_the_batch() {
    let mut world = World::new();
    world.add_entity_system(Tick::new());
    let good = world.add_entity(Entity::new().with(Counter(0)));
    // Holds the kind but not the type, so the typed lookup misses.
    struct Impostor;
    impl Component for Impostor {
        const KIND: ComponentKind = Counter::KIND;
    }
    let bad = world.add_entity(Entity::new().with(Impostor));
    let good_again = world.add_entity(Entity::new().with(Counter(10)));
    world.init().unwrap();

    let report = world.update().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity, Some(bad));
    let count = |id| {
        world
            .get_entity(id)
            .unwrap()
            .get_component::<Counter>()
            .unwrap()
            .0
    };
    assert_eq!(count(good), 1);
    assert_eq!(count(good_again), 11);
}

// ---------------------------------------------------------------------------
// Managers
// ---------------------------------------------------------------------------

#[test]
fn systems_reach_managers_through_the_context() {
    #[derive(Default)]
    struct Score(u32);
    impl Manager for Score {}

    struct Scorer;
    impl System for Scorer {}
    impl VoidSystem for Scorer {
        fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
            ctx.manager_mut::<Score>()?.0 += 10;
            Ok(())
        }
    }

    let mut world = World::new();
    world.add_manager(Score::default());
    world.add_void_system(Scorer);
    world.init().unwrap();
    world.update().unwrap();
    world.update().unwrap();

    assert_eq!(world.get_manager::<Score>().unwrap().0, 20);
    assert_eq!(world.frame(), 2);
}
