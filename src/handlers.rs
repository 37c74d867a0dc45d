use bevy::{ecs::system::SystemParam, prelude::*};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum Capability {
    /// Receives down and up.
    Press,
    Click,
    /// Receives initialize potential drag, begin drag, drag and end drag.
    Drag,
    Drop,
}

impl Capability {
    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Marks an entity as a target for pointer notifications it declared interest in.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub struct PointerHandlers {
    mask: u8,
    pub enabled: bool,
}

impl PointerHandlers {
    pub const fn new() -> Self {
        PointerHandlers {
            mask: 0,
            enabled: true,
        }
    }
    pub const fn with(mut self, capability: Capability) -> Self {
        self.mask |= capability.bit();
        self
    }
    pub const fn with_press(self) -> Self {
        self.with(Capability::Press)
    }
    pub const fn with_click(self) -> Self {
        self.with(Capability::Click)
    }
    pub const fn with_drag(self) -> Self {
        self.with(Capability::Drag)
    }
    pub const fn with_drop(self) -> Self {
        self.with(Capability::Drop)
    }
    pub const fn handles(&self, capability: Capability) -> bool {
        self.enabled && self.mask & capability.bit() != 0
    }
}

/// Parent and handler lookups the router walks to find notification targets.
pub trait PointerHierarchy {
    fn parent(&self, entity: Entity) -> Option<Entity>;
    fn handlers(&self, entity: Entity) -> Option<PointerHandlers>;

    /// Nearest entity, starting at `entity` itself, with an enabled `capability` handler.
    fn handler_for(&self, entity: Entity, capability: Capability) -> Option<Entity> {
        let mut current = Some(entity);
        while let Some(e) = current {
            if self.handlers(e).is_some_and(|h| h.handles(capability)) {
                return Some(e);
            }
            current = self.parent(e);
        }
        None
    }
    /// `entity` followed by all its ancestors.
    fn chain(&self, entity: Entity) -> Vec<Entity> {
        let mut out = vec![entity];
        while let Some(parent) = out.last().and_then(|e| self.parent(*e)) {
            if out.contains(&parent) {
                error!("hierarchy cycle at {parent}");
                break;
            }
            out.push(parent);
        }
        out
    }
}

#[derive(SystemParam)]
pub struct HandlerHierarchy<'w, 's> {
    parents: Query<'w, 's, &'static ChildOf>,
    handlers: Query<'w, 's, &'static PointerHandlers>,
}

impl PointerHierarchy for HandlerHierarchy<'_, '_> {
    fn parent(&self, entity: Entity) -> Option<Entity> {
        self.parents.get(entity).ok().map(ChildOf::parent)
    }
    fn handlers(&self, entity: Entity) -> Option<PointerHandlers> {
        self.handlers.get(entity).ok().copied()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bevy::platform::collections::HashMap;

    use super::*;

    /// In memory hierarchy for router tests.
    #[derive(Default)]
    pub(crate) struct TestHierarchy {
        pub parents: HashMap<Entity, Entity>,
        pub handlers: HashMap<Entity, PointerHandlers>,
    }

    impl PointerHierarchy for TestHierarchy {
        fn parent(&self, entity: Entity) -> Option<Entity> {
            self.parents.get(&entity).copied()
        }
        fn handlers(&self, entity: Entity) -> Option<PointerHandlers> {
            self.handlers.get(&entity).copied()
        }
    }

    fn e(i: u32) -> Entity {
        Entity::from_raw(i)
    }

    fn tree() -> TestHierarchy {
        // 1 <- 2 <- 3, 1 <- 4
        let mut h = TestHierarchy::default();
        h.parents.insert(e(2), e(1));
        h.parents.insert(e(3), e(2));
        h.parents.insert(e(4), e(1));
        h
    }

    #[test]
    fn handler_lookup_walks_up_and_skips_disabled() {
        let mut h = tree();
        h.handlers
            .insert(e(1), PointerHandlers::new().with_click());
        let mut disabled = PointerHandlers::new().with_click();
        disabled.enabled = false;
        h.handlers.insert(e(2), disabled);
        assert_eq!(h.handler_for(e(3), Capability::Click), Some(e(1)));
        assert_eq!(h.handler_for(e(3), Capability::Drag), None);
    }

    #[test]
    fn chain_walks_to_the_root() {
        let h = tree();
        assert_eq!(h.chain(e(3)), vec![e(3), e(2), e(1)]);
        assert_eq!(h.chain(e(4)), vec![e(4), e(1)]);
        assert_eq!(h.chain(e(9)), vec![e(9)]);
    }
}
