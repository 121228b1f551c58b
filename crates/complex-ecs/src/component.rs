//! Component kinds and the component contract.
//!
//! Every component type carries an explicit [`ComponentKind`] tag. Entities
//! and systems are matched by comparing kinds by value; the Rust type is only
//! consulted when handing out typed references.

use std::any::Any;
use std::fmt;

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Stable tag identifying a component type, compared by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKind(&'static str);

impl ComponentKind {
    /// Create a kind from its tag, e.g. `ComponentKind::new("cx.position")`.
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    /// The tag string.
    pub const fn tag(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.0)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// ---------------------------------------------------------------------------
// Component / AnyComponent
// ---------------------------------------------------------------------------

/// A data bag that can be attached to an [`Entity`](crate::entity::Entity).
///
/// ```
/// use complex_ecs::prelude::*;
///
/// struct Position { x: f32, y: f32 }
///
/// impl Component for Position {
///     const KIND: ComponentKind = ComponentKind::new("position");
/// }
///
/// let entity = Entity::new().with(Position { x: 1.0, y: 2.0 });
/// assert!(entity.has_kind(Position::KIND));
/// ```
pub trait Component: Any {
    /// The kind shared by every value of this type.
    const KIND: ComponentKind;
}

/// Object-safe view of a [`Component`], as stored in entity slots.
pub trait AnyComponent: Any {
    /// The runtime kind of this component.
    fn kind(&self) -> ComponentKind;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyComponent for T {
    fn kind(&self) -> ComponentKind {
        T::KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for dyn AnyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyComponent({})", self.kind())
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// Sorted, deduplicated set of component kinds.
///
/// Used by entity systems to declare the kinds an entity must hold (all of
/// them) to be processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ComponentSet {
    kinds: Vec<ComponentKind>,
}

impl ComponentSet {
    /// Build a set from any list of kinds. Duplicates collapse.
    pub fn new(kinds: impl IntoIterator<Item = ComponentKind>) -> Self {
        let mut kinds: Vec<ComponentKind> = kinds.into_iter().collect();
        kinds.sort();
        kinds.dedup();
        Self { kinds }
    }

    /// Build a set from a tuple of component types.
    ///
    /// ```
    /// use complex_ecs::prelude::*;
    ///
    /// struct A;
    /// impl Component for A { const KIND: ComponentKind = ComponentKind::new("a"); }
    /// struct B;
    /// impl Component for B { const KIND: ComponentKind = ComponentKind::new("b"); }
    ///
    /// let set = ComponentSet::of::<(A, B)>();
    /// assert_eq!(set.len(), 2);
    /// assert!(set.contains(A::KIND));
    /// ```
    pub fn of<T: ComponentTuple>() -> Self {
        Self::new(T::kinds())
    }

    /// Whether `kind` is a member.
    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.kinds.binary_search(&kind).is_ok()
    }

    /// Members in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the set is empty. An empty requirement matches every entity.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl FromIterator<ComponentKind> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ---------------------------------------------------------------------------
// ComponentTuple
// ---------------------------------------------------------------------------

/// Tuples of component types, used to spell a [`ComponentSet`] by type.
pub trait ComponentTuple {
    /// The kinds of the tuple members, in tuple order.
    fn kinds() -> Vec<ComponentKind>;
}

macro_rules! impl_component_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentTuple for ($($name,)+) {
            fn kinds() -> Vec<ComponentKind> {
                vec![$($name::KIND),+]
            }
        }
    };
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);
impl_component_tuple!(A, B, C, D, E);
impl_component_tuple!(A, B, C, D, E, F);
impl_component_tuple!(A, B, C, D, E, F, G);
impl_component_tuple!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
