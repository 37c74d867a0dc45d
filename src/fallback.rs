use bevy::{
    input::InputSystem,
    prelude::*,
    render::camera::RenderTarget,
    window::{PrimaryWindow, WindowRef},
};

use crate::{
    controller::{Controller, ControllerBackend, DeviceId},
    controller_input::{ControlMap, ControlMask, ControllerInput, PointerRay},
    field::{CollisionLayers, Field, LayerMask},
    hand::Hand,
    raycast::cast_fields,
    SyncDevices, VrPreUpdateSets,
};

pub struct VrFallbackPlugin;

impl Plugin for VrFallbackPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            PreUpdate,
            update_fallback_input
                .in_set(VrPreUpdateSets::UpdateDevices)
                .in_set(SyncDevices)
                .after(InputSystem),
        );
        app.add_systems(
            PreUpdate,
            update_fallback_rays.in_set(VrPreUpdateSets::UpdatePointerRays),
        );
    }
}

/// Mouse driven stand in for a tracked controller, pointing through the cursor of
/// `camera`.
#[derive(Component, Clone, Copy, Debug)]
#[require(Controller = Controller::new(DeviceId(0), Hand::Right, ControllerBackend::Fallback))]
pub struct FallbackController {
    pub camera: Entity,
    pub trace_mask: LayerMask,
    pub max_distance: f32,
    /// Items attached to the interactor, while non zero the interactor keeps its distance.
    pub attach_counter: u32,
    /// Negative until something has been hit.
    pub interactor_distance: f32,
    last_position: Vec3,
}

impl FallbackController {
    pub fn new(camera: Entity) -> Self {
        FallbackController {
            camera,
            trace_mask: LayerMask::ALL,
            max_distance: 10.0,
            attach_counter: 0,
            interactor_distance: -1.0,
            last_position: Vec3::ZERO,
        }
    }

    /// Where the interactor sits along `ray` this tick. `hit_distance` is the trace result
    /// and is only consulted while nothing is attached.
    pub fn place_interactor(
        &mut self,
        ray: Ray3d,
        hit_distance: Option<f32>,
        current: Vec3,
    ) -> Vec3 {
        if self.attach_counter > 0 {
            return ray.get_point(self.interactor_distance);
        }
        if let Some(distance) = hit_distance {
            self.interactor_distance = self.max_distance.min(distance);
            return ray.get_point(distance);
        }
        if self.interactor_distance > 0.0 {
            return ray.get_point(self.max_distance.min(self.interactor_distance));
        }
        current
    }

    /// Velocity of the interactor moving to `position`, zero on the tick the cursor
    /// comes back so the jump from the last known position is not reported.
    pub fn track_velocity(&mut self, position: Vec3, was_available: bool, delta_secs: f32) -> Vec3 {
        let last = std::mem::replace(&mut self.last_position, position);
        match was_available && delta_secs > 0.0 {
            true => (position - last) / delta_secs,
            false => Vec3::ZERO,
        }
    }
}

pub fn mouse_control_mask(buttons: &ButtonInput<MouseButton>) -> ControlMask {
    [
        (MouseButton::Left, ControlMap::Trigger),
        (MouseButton::Right, ControlMap::Grip),
        (MouseButton::Middle, ControlMap::Touchpad),
    ]
    .into_iter()
    .filter(|(button, _)| buttons.pressed(*button))
    .map(|(_, control)| control)
    .collect()
}

fn cursor_ray(
    camera: &Camera,
    camera_transform: &GlobalTransform,
    window: &Window,
) -> Option<Ray3d> {
    let position = window.cursor_position()?;
    if let Some(viewport) = camera.logical_viewport_rect() {
        if !viewport.contains(position) {
            return None;
        }
    }
    camera.viewport_to_world(camera_transform, position).ok()
}

fn update_fallback_input(
    mut query: Query<(&mut Controller, &mut ControllerInput), With<FallbackController>>,
    buttons: Option<Res<ButtonInput<MouseButton>>>,
) {
    let held = buttons.as_deref().map_or(ControlMask::NONE, mouse_control_mask);
    for (mut controller, mut input) in &mut query {
        controller.hand_guess = Hand::Right;
        match controller.available {
            true => input.set_buttons(held),
            false => input.clear(),
        }
    }
}

fn update_fallback_rays(
    primary_window: Query<Entity, With<PrimaryWindow>>,
    windows: Query<&Window>,
    cams: Query<(&Camera, &GlobalTransform)>,
    fields: Query<(Entity, &Field, &GlobalTransform, Option<&CollisionLayers>)>,
    mut query: Query<(
        &mut FallbackController,
        &mut Controller,
        &mut ControllerInput,
        &mut PointerRay,
        &mut Transform,
    )>,
    time: Res<Time>,
) {
    for (mut fallback, mut controller, mut input, mut pointer, mut transform) in &mut query {
        let Ok((camera, cam_transform)) = cams.get(fallback.camera) else {
            error_once!("fallback controller camera {} is not a camera", fallback.camera);
            continue;
        };
        let window = match camera.target {
            RenderTarget::Window(WindowRef::Primary) => primary_window.single().ok(),
            RenderTarget::Window(WindowRef::Entity(e)) => Some(e),
            _ => None,
        };
        let ray = window
            .and_then(|w| windows.get(w).ok())
            .and_then(|w| cursor_ray(camera, cam_transform, w));
        let Some(ray) = ray else {
            if controller.available {
                controller.available = false;
                input.clear();
            }
            continue;
        };
        let was_available = std::mem::replace(&mut controller.available, true);
        pointer.0 = ray;

        let hit_distance = match fallback.attach_counter {
            0 => cast_fields(ray, fallback.trace_mask, fallback.max_distance, &fields)
                .map(|(_, distance)| distance),
            _ => None,
        };
        let position = fallback.place_interactor(ray, hit_distance, transform.translation);
        transform.translation = position;
        input.velocity = fallback.track_velocity(position, was_available, time.delta_secs());
        input.angular_velocity = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ray() -> Ray3d {
        Ray3d::new(Vec3::ZERO, Dir3::NEG_Z)
    }

    #[test]
    fn buttons_map_to_controls() {
        let mut buttons = ButtonInput::<MouseButton>::default();
        buttons.press(MouseButton::Left);
        buttons.press(MouseButton::Middle);
        let mask = mouse_control_mask(&buttons);
        assert!(mask.contains(ControlMap::Trigger));
        assert!(mask.contains(ControlMap::Touchpad));
        assert!(!mask.contains(ControlMap::Grip));
        assert!(!mask.contains(ControlMap::System));
    }

    #[test]
    fn interactor_snaps_to_hits_and_remembers_distance() {
        let mut fallback = FallbackController::new(Entity::PLACEHOLDER);
        let current = Vec3::new(5.0, 5.0, 5.0);
        assert_eq!(fallback.place_interactor(ray(), None, current), current);

        let pos = fallback.place_interactor(ray(), Some(2.0), current);
        assert_eq!(pos, Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(fallback.interactor_distance, 2.0);

        let sideways = Ray3d::new(Vec3::ZERO, Dir3::X);
        let pos = fallback.place_interactor(sideways, None, pos);
        assert_eq!(pos, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn attached_items_keep_distance() {
        let mut fallback = FallbackController::new(Entity::PLACEHOLDER);
        fallback.interactor_distance = 0.3;
        fallback.attach_counter = 1;
        let pos = fallback.place_interactor(ray(), Some(4.0), Vec3::ZERO);
        assert_eq!(pos, Vec3::new(0.0, 0.0, -0.3));
        assert_eq!(fallback.interactor_distance, 0.3);
    }

    #[test]
    fn velocity_is_zero_when_the_cursor_returns() {
        let mut fallback = FallbackController::new(Entity::PLACEHOLDER);
        let far = Vec3::new(0.0, 0.0, -8.0);
        assert_eq!(fallback.track_velocity(far, false, 0.5), Vec3::ZERO);
        let velocity = fallback.track_velocity(Vec3::new(1.0, 0.0, -8.0), true, 0.5);
        assert_eq!(velocity, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(fallback.track_velocity(Vec3::ZERO, true, 0.0), Vec3::ZERO);
    }
}
