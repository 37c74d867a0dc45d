use bevy::{ecs::system::SystemParam, prelude::*};

use crate::{
    controller::{Controller, DeviceId},
    hand::{resolve_hand, Hand},
    head::HeadDevice,
    DeviceActive,
};

/// The configured controllers and heads, in priority order.
#[derive(Resource, Clone, Debug, Default)]
pub struct ControllerRegistry {
    pub controllers: Vec<Entity>,
    pub heads: Vec<Entity>,
}

impl ControllerRegistry {
    pub fn new(controllers: impl Into<Vec<Entity>>) -> Self {
        ControllerRegistry {
            controllers: controllers.into(),
            heads: Vec::new(),
        }
    }
    pub fn with_heads(mut self, heads: impl Into<Vec<Entity>>) -> Self {
        self.heads = heads.into();
        self
    }
}

/// Read access to the registered controllers.
#[derive(SystemParam)]
pub struct Controllers<'w, 's> {
    registry: Option<Res<'w, ControllerRegistry>>,
    controllers: Query<'w, 's, (&'static Controller, &'static DeviceActive)>,
    heads: Query<'w, 's, &'static DeviceActive, With<HeadDevice>>,
}

impl Controllers<'_, '_> {
    pub fn registry_exists(&self) -> bool {
        self.registry.is_some()
    }

    /// Active controllers in registry order.
    pub fn iter_active(&self) -> impl Iterator<Item = (Entity, &Controller)> + '_ {
        self.registry
            .iter()
            .flat_map(|registry| registry.controllers.iter().copied())
            .filter_map(|entity| {
                self.controllers
                    .get(entity)
                    .inspect_err(|err| warn_once!("invalid registered controller: {err}"))
                    .ok()
                    .filter(|(_, active)| active.0)
                    .map(|(controller, _)| (entity, controller))
            })
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    /// The `index`th active controller.
    pub fn controller_at(&self, index: usize) -> Option<Entity> {
        self.iter_active().nth(index).map(|(entity, _)| entity)
    }

    /// Active and available controller with the given device id.
    pub fn controller_by_device_id(&self, id: DeviceId) -> Option<Entity> {
        self.iter_active()
            .find(|(_, c)| c.available && c.device_id == id)
            .map(|(entity, _)| entity)
    }

    pub fn current_hand(&self, entity: Entity) -> Option<Hand> {
        let (controller, _) = self.controllers.get(entity).ok()?;
        // a despawned pair counts as no pair
        let other_available = controller.other.and_then(|other| {
            self.controllers
                .get(other)
                .inspect_err(|err| warn_once!("invalid paired controller: {err}"))
                .ok()
                .map(|(c, _)| c.available)
        });
        Some(resolve_hand(
            controller.starting_hand,
            controller.available,
            other_available,
            || controller.hand_guess,
        ))
    }

    pub fn left_hand(&self) -> Option<Entity> {
        self.hand(Hand::Left)
    }

    pub fn right_hand(&self) -> Option<Entity> {
        self.hand(Hand::Right)
    }

    fn hand(&self, hand: Hand) -> Option<Entity> {
        self.iter_active()
            .map(|(entity, _)| entity)
            .find(|entity| self.current_hand(*entity) == Some(hand))
    }

    /// First registered head that is active.
    pub fn active_head(&self) -> Option<Entity> {
        self.registry.as_ref()?.heads.iter().copied().find(|head| {
            self.heads
                .get(*head)
                .inspect_err(|err| warn_once!("invalid registered head: {err}"))
                .is_ok_and(|active| active.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::SystemState;

    use super::*;
    use crate::controller::ControllerBackend;

    fn spawn(world: &mut World, id: u32, hand: Hand, available: bool, active: bool) -> Entity {
        let mut controller = Controller::new(DeviceId(id), hand, ControllerBackend::Tracked);
        controller.available = available;
        world.spawn((controller, DeviceActive(active))).id()
    }

    #[test]
    fn lookups_skip_inactive_controllers() {
        let mut world = World::new();
        let a = spawn(&mut world, 1, Hand::Left, true, false);
        let b = spawn(&mut world, 2, Hand::Right, true, true);
        let c = spawn(&mut world, 3, Hand::Left, false, true);
        world.insert_resource(ControllerRegistry::new([a, b, c]));

        let mut state = SystemState::<Controllers>::new(&mut world);
        let controllers = state.get(&world);
        assert_eq!(controllers.active_count(), 2);
        assert_eq!(controllers.controller_at(0), Some(b));
        assert_eq!(controllers.controller_at(1), Some(c));
        assert_eq!(controllers.controller_at(2), None);
        assert_eq!(controllers.controller_by_device_id(DeviceId(2)), Some(b));
        // not available
        assert_eq!(controllers.controller_by_device_id(DeviceId(3)), None);
        // not active
        assert_eq!(controllers.controller_by_device_id(DeviceId(1)), None);
        assert_eq!(controllers.left_hand(), Some(c));
        assert_eq!(controllers.right_hand(), Some(b));
    }

    #[test]
    fn any_hands_resolve_through_the_pair() {
        let mut world = World::new();
        let a = spawn(&mut world, 1, Hand::Any, true, true);
        let b = spawn(&mut world, 2, Hand::Any, false, true);
        for (this, other) in [(a, b), (b, a)] {
            if let Some(mut c) = world.get_mut::<Controller>(this) {
                c.other = Some(other);
            }
        }
        world.insert_resource(ControllerRegistry::new([a, b]));

        let mut state = SystemState::<Controllers>::new(&mut world);
        assert_eq!(state.get(&world).current_hand(a), Some(Hand::Right));
        assert_eq!(state.get(&world).current_hand(b), Some(Hand::Any));

        if let Some(mut c) = world.get_mut::<Controller>(b) {
            c.available = true;
            c.hand_guess = Hand::Left;
        }
        let controllers = state.get(&world);
        assert_eq!(controllers.current_hand(a), Some(Hand::Right));
        assert_eq!(controllers.current_hand(b), Some(Hand::Left));
        assert_eq!(controllers.left_hand(), Some(b));
    }

    #[test]
    fn despawned_pair_keeps_the_starting_hand() {
        let mut world = World::new();
        let a = spawn(&mut world, 1, Hand::Any, true, true);
        let b = spawn(&mut world, 2, Hand::Any, true, true);
        if let Some(mut c) = world.get_mut::<Controller>(a) {
            c.other = Some(b);
        }
        world.despawn(b);
        world.insert_resource(ControllerRegistry::new([a]));

        let mut state = SystemState::<Controllers>::new(&mut world);
        assert_eq!(state.get(&world).current_hand(a), Some(Hand::Any));
    }

    #[test]
    fn missing_registry_has_no_controllers() {
        let mut world = World::new();
        spawn(&mut world, 1, Hand::Left, true, true);
        let mut state = SystemState::<Controllers>::new(&mut world);
        let controllers = state.get(&world);
        assert!(!controllers.registry_exists());
        assert_eq!(controllers.active_count(), 0);
        assert_eq!(controllers.active_head(), None);
    }
}
