//! Managers: world-scoped services that systems reach by type.

use std::any::type_name;

use crate::world::WorldId;
use crate::{AsAny, EcsError};

/// A service object owned by a world, looked up by concrete type.
pub trait Manager: AsAny {
    /// Called once when the manager is added to a world.
    fn set_world(&mut self, _world: WorldId) {}
}

/// Type-indexed store of a world's managers.
#[derive(Default)]
pub struct ManagerRegistry {
    managers: Vec<Box<dyn Manager>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manager. A manager of the same type added earlier shadows it.
    pub fn add<M: Manager>(&mut self, manager: M) {
        self.managers.push(Box::new(manager));
    }

    /// The first manager of type `M`.
    pub fn get<M: Manager>(&self) -> Result<&M, EcsError> {
        self.managers
            .iter()
            .find_map(|m| (**m).as_any().downcast_ref::<M>())
            .ok_or(EcsError::ManagerNotFound(type_name::<M>()))
    }

    /// Mutable access to the first manager of type `M`.
    pub fn get_mut<M: Manager>(&mut self) -> Result<&mut M, EcsError> {
        self.managers
            .iter_mut()
            .find_map(|m| (**m).as_any_mut().downcast_mut::<M>())
            .ok_or(EcsError::ManagerNotFound(type_name::<M>()))
    }

    pub fn contains<M: Manager>(&self) -> bool {
        self.get::<M>().is_ok()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("len", &self.managers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Score(u32);
    impl Manager for Score {}

    #[derive(Debug)]
    struct Clock;
    impl Manager for Clock {}

    #[test]
    fn lookup_by_type() {
        let mut managers = ManagerRegistry::new();
        managers.add(Score(3));
        assert_eq!(managers.get::<Score>().unwrap().0, 3);
        managers.get_mut::<Score>().unwrap().0 += 1;
        assert_eq!(managers.get::<Score>().unwrap().0, 4);
        assert_eq!(managers.len(), 1);
    }

    #[test]
    fn missing_manager_is_not_found() {
        let managers = ManagerRegistry::new();
        let err = managers.get::<Clock>().unwrap_err();
        assert!(err.is_not_found());
        assert!(!managers.contains::<Clock>());
    }
}
