use bevy::prelude::*;
use thiserror::Error;

use crate::{
    controller_input::{ControllerInput, PointerRay},
    hand::Hand,
    DeviceActive,
};

/// Identifies a physical device, also used as the pointer id by the router.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct DeviceId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum ControllerBackend {
    #[default]
    Tracked,
    Fallback,
}

#[derive(Component, Debug, Clone, Reflect)]
#[require(ControllerInput, PointerRay, DeviceActive, Transform)]
pub struct Controller {
    /// Overwritten by the tracked backend once hardware is acquired.
    pub device_id: DeviceId,
    pub starting_hand: Hand,
    /// The controller held in the other hand, if any.
    pub other: Option<Entity>,
    pub available: bool,
    pub input_focus: bool,
    /// Hand the backend thinks the controller is in, consulted once both controllers of
    /// a pair are available.
    pub hand_guess: Hand,
    pub backend: ControllerBackend,
}

impl Controller {
    pub const fn new(device_id: DeviceId, starting_hand: Hand, backend: ControllerBackend) -> Self {
        Controller {
            device_id,
            starting_hand,
            other: None,
            available: false,
            input_focus: true,
            hand_guess: Hand::Right,
            backend,
        }
    }
    pub const fn with_other(mut self, other: Entity) -> Self {
        self.other = Some(other);
        self
    }
}

/// A backend acquired the hardware for a controller.
#[derive(Event, Clone, Copy, Debug)]
pub struct ControllerInitialized {
    pub controller: Entity,
    pub device: DeviceId,
}

#[derive(Event, Clone, Copy, Debug)]
pub struct InputFocusChanged {
    pub controller: Entity,
    pub focus: bool,
}

/// Shows `target` only while `controller` has input focus.
#[derive(Component, Clone, Copy, Debug)]
pub struct HideOnFocusLost {
    pub controller: Entity,
    pub target: Entity,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    #[error("paired controller {0} does not exist")]
    Missing(Entity),
    #[error("paired controller {0} is not paired back")]
    NotReciprocal(Entity),
    #[error("starting hand {this:?} does not match the paired controllers hand {other:?}")]
    MismatchedHands { this: Hand, other: Hand },
}

/// Checks that a pair points at each other and holds opposite hands, or both `Any`.
pub fn validate_pairing(
    this: Entity,
    controller: &Controller,
    other: Option<&Controller>,
) -> Result<(), PairingError> {
    let Some(other_entity) = controller.other else {
        return Ok(());
    };
    let Some(other) = other else {
        return Err(PairingError::Missing(other_entity));
    };
    if other.other != Some(this) {
        return Err(PairingError::NotReciprocal(other_entity));
    }
    let expected = match controller.starting_hand {
        Hand::Any => Hand::Any,
        hand => hand.opposite(),
    };
    if other.starting_hand != expected {
        return Err(PairingError::MismatchedHands {
            this: controller.starting_hand,
            other: other.starting_hand,
        });
    }
    Ok(())
}

pub(crate) fn warn_invalid_pairings(
    added: Query<(Entity, &Controller), Added<Controller>>,
    controllers: Query<&Controller>,
) {
    for (entity, controller) in &added {
        let other = controller.other.and_then(|e| controllers.get(e).ok());
        if let Err(err) = validate_pairing(entity, controller, other) {
            warn!("controller {entity}: {err}");
        }
    }
}

/// Points the rays of pose driven controllers along their forward axis.
pub(crate) fn update_pose_pointer_rays(
    mut query: Query<(&GlobalTransform, &mut PointerRay, &Controller)>,
) {
    for (transform, mut ray, controller) in &mut query {
        if controller.backend != ControllerBackend::Tracked {
            continue;
        }
        ray.0 = Ray3d::new(transform.translation(), transform.forward());
    }
}

pub(crate) fn update_hide_on_focus_lost(
    mut events: EventReader<InputFocusChanged>,
    query: Query<&HideOnFocusLost>,
    mut visibility: Query<&mut Visibility>,
) {
    for event in events.read() {
        for hide in query.iter().filter(|h| h.controller == event.controller) {
            let Ok(mut vis) = visibility.get_mut(hide.target) else {
                warn_once!("HideOnFocusLost target {} has no Visibility", hide.target);
                continue;
            };
            *vis = match event.focus {
                true => Visibility::Inherited,
                false => Visibility::Hidden,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: Hand, b: Hand) -> (Entity, Controller, Entity, Controller) {
        let ea = Entity::from_raw(1);
        let eb = Entity::from_raw(2);
        (
            ea,
            Controller::new(DeviceId(1), a, ControllerBackend::Tracked).with_other(eb),
            eb,
            Controller::new(DeviceId(2), b, ControllerBackend::Tracked).with_other(ea),
        )
    }

    #[test]
    fn opposite_hands_are_valid() {
        let (ea, a, _, b) = pair(Hand::Left, Hand::Right);
        assert_eq!(validate_pairing(ea, &a, Some(&b)), Ok(()));
        let (ea, a, _, b) = pair(Hand::Any, Hand::Any);
        assert_eq!(validate_pairing(ea, &a, Some(&b)), Ok(()));
    }

    #[test]
    fn mismatched_hands() {
        let (ea, a, _, b) = pair(Hand::Left, Hand::Left);
        assert!(matches!(
            validate_pairing(ea, &a, Some(&b)),
            Err(PairingError::MismatchedHands { .. })
        ));
        let (ea, a, _, b) = pair(Hand::Any, Hand::Right);
        assert!(validate_pairing(ea, &a, Some(&b)).is_err());
    }

    #[test]
    fn not_reciprocal() {
        let (ea, a, eb, mut b) = pair(Hand::Left, Hand::Right);
        b.other = None;
        assert_eq!(
            validate_pairing(ea, &a, Some(&b)),
            Err(PairingError::NotReciprocal(eb))
        );
    }

    #[test]
    fn missing_pair() {
        let (ea, a, eb, _) = pair(Hand::Left, Hand::Right);
        assert_eq!(validate_pairing(ea, &a, None), Err(PairingError::Missing(eb)));
    }

    #[test]
    fn hide_on_focus_lost_toggles_visibility() {
        let mut app = App::new();
        app.add_event::<InputFocusChanged>();
        app.add_systems(Update, update_hide_on_focus_lost);
        let controller = app.world_mut().spawn_empty().id();
        let target = app.world_mut().spawn(Visibility::Inherited).id();
        app.world_mut().spawn(HideOnFocusLost { controller, target });

        app.world_mut().send_event(InputFocusChanged {
            controller,
            focus: false,
        });
        app.update();
        assert_eq!(
            app.world().get::<Visibility>(target),
            Some(&Visibility::Hidden)
        );

        app.world_mut().send_event(InputFocusChanged {
            controller,
            focus: true,
        });
        app.update();
        assert_eq!(
            app.world().get::<Visibility>(target),
            Some(&Visibility::Inherited)
        );
    }
}
