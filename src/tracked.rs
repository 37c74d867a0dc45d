//! Controllers and heads driven by a VR runtime.
//!
//! The runtime integration writes [`TrackedDevices`] every frame before
//! [`VrPreUpdateSets::UpdateDevices`], this module acquires devices for controllers and
//! copies their state over.

use bevy::{platform::collections::HashSet, prelude::*};

use crate::{
    controller::{Controller, ControllerBackend, ControllerInitialized, DeviceId, InputFocusChanged},
    controller_input::{ControlMask, ControllerInput},
    hand::Hand,
    head::HeadDevice,
    SyncDevices, VrPreUpdateSets,
};

pub struct VrTrackedPlugin;

impl Plugin for VrTrackedPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TrackedAcquisitionConfig>();
        app.add_systems(
            PreUpdate,
            (
                start_acquisition,
                acquire_controllers,
                sync_controllers,
                sync_heads,
            )
                .chain()
                .in_set(VrPreUpdateSets::UpdateDevices)
                .in_set(SyncDevices),
        );
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum TrackedDeviceClass {
    Controller,
    Hmd,
    #[default]
    Other,
}

#[derive(Clone, Copy, Debug, Default, Reflect)]
pub struct TrackedDevice {
    pub class: TrackedDeviceClass,
    pub valid: bool,
    /// Relative to the tracking origin.
    pub pose: Isometry3d,
    /// Tracking origin space.
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub buttons: ControlMask,
    pub touchpad: Vec2,
    pub trigger: f32,
}

/// Device state reported by the VR runtime, indexed by device index.
#[derive(Resource, Clone, Debug, Reflect)]
pub struct TrackedDevices {
    pub session_running: bool,
    pub input_focus: bool,
    pub leftmost_controller: Option<u32>,
    pub rightmost_controller: Option<u32>,
    pub devices: Vec<TrackedDevice>,
}

impl Default for TrackedDevices {
    fn default() -> Self {
        Self {
            session_running: false,
            input_focus: true,
            leftmost_controller: None,
            rightmost_controller: None,
            devices: Vec::new(),
        }
    }
}

impl TrackedDevices {
    pub fn get(&self, index: u32) -> Option<&TrackedDevice> {
        self.devices.get(index as usize)
    }
    pub fn is_valid(&self, index: u32, class: TrackedDeviceClass) -> bool {
        self.get(index).is_some_and(|d| d.valid && d.class == class)
    }
    /// Distinct leftmost and rightmost controller indices, once the runtime knows both.
    pub fn hand_indices(&self) -> Option<(u32, u32)> {
        match (self.leftmost_controller, self.rightmost_controller) {
            (Some(left), Some(right)) if left != right => Some((left, right)),
            _ => None,
        }
    }
}

/// Ticks between acquisition attempts.
#[derive(Resource, Clone, Copy, Debug)]
pub struct TrackedAcquisitionConfig {
    pub first_poll_delay: u32,
    pub retry_interval: u32,
    pub max_retry_interval: u32,
}

impl Default for TrackedAcquisitionConfig {
    fn default() -> Self {
        Self {
            first_poll_delay: 0,
            retry_interval: 60,
            max_retry_interval: 480,
        }
    }
}

#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum TrackedAcquisition {
    Searching { ticks_until_poll: u32, interval: u32 },
    Acquired(u32),
    Cancelled,
}

impl TrackedAcquisition {
    pub fn new(config: &TrackedAcquisitionConfig) -> Self {
        TrackedAcquisition::Searching {
            ticks_until_poll: config.first_poll_delay,
            interval: config.retry_interval,
        }
    }
    pub fn cancel(&mut self) {
        if matches!(self, TrackedAcquisition::Searching { .. }) {
            *self = TrackedAcquisition::Cancelled;
        }
    }
    pub fn index(&self) -> Option<u32> {
        match self {
            TrackedAcquisition::Acquired(index) => Some(*index),
            _ => None,
        }
    }
    pub fn is_searching(&self) -> bool {
        matches!(self, TrackedAcquisition::Searching { .. })
    }
    /// Counts down, returns true when this tick should poll.
    fn tick(&mut self) -> bool {
        match self {
            TrackedAcquisition::Searching {
                ticks_until_poll: 0,
                ..
            } => true,
            TrackedAcquisition::Searching {
                ticks_until_poll, ..
            } => {
                *ticks_until_poll -= 1;
                false
            }
            _ => false,
        }
    }
    fn back_off(&mut self, max_interval: u32) {
        if let TrackedAcquisition::Searching {
            ticks_until_poll,
            interval,
        } = self
        {
            *ticks_until_poll = *interval;
            *interval = interval.saturating_mul(2).min(max_interval);
        }
    }
}

fn start_acquisition(
    query: Query<(Entity, &Controller), Without<TrackedAcquisition>>,
    config: Res<TrackedAcquisitionConfig>,
    mut cmds: Commands,
) {
    for (entity, controller) in &query {
        if controller.backend == ControllerBackend::Tracked {
            cmds.entity(entity).insert(TrackedAcquisition::new(&config));
        }
    }
}

fn acquire_controllers(
    devices: Option<Res<TrackedDevices>>,
    config: Res<TrackedAcquisitionConfig>,
    mut query: Query<(Entity, &mut Controller, &mut TrackedAcquisition)>,
    mut initialized: EventWriter<ControllerInitialized>,
) {
    let Some(devices) = devices else {
        return;
    };
    if !devices.session_running {
        return;
    }

    let mut polling = Vec::new();
    for (entity, _, mut acquisition) in &mut query {
        if acquisition.tick() {
            polling.push(entity);
        }
    }
    if polling.is_empty() {
        return;
    }

    let mut taken = query
        .iter()
        .filter_map(|(_, _, acquisition)| acquisition.index())
        .collect::<HashSet<_>>();
    let mut claims: Vec<(Entity, u32)> = Vec::new();
    for &entity in &polling {
        if claims.iter().any(|(e, _)| *e == entity) {
            continue;
        }
        let Ok((_, controller, _)) = query.get(entity) else {
            continue;
        };
        match controller.starting_hand {
            Hand::Left | Hand::Right => {
                let Some((left, right)) = devices.hand_indices() else {
                    continue;
                };
                let (this, other) = match controller.starting_hand {
                    Hand::Left => (left, right),
                    _ => (right, left),
                };
                claims.push((entity, this));
                taken.insert(this);
                let Some(other_entity) = controller.other else {
                    continue;
                };
                match query.get(other_entity) {
                    Ok((_, _, acquisition)) if acquisition.is_searching() => {
                        claims.push((other_entity, other));
                        taken.insert(other);
                    }
                    Ok(_) => {}
                    Err(_) => warn!(
                        "paired controller {other_entity} of {entity} is not a tracked controller"
                    ),
                }
            }
            Hand::Any => {
                let owned_by_other = controller
                    .other
                    .and_then(|other| query.get(other).ok())
                    .filter(|(_, other, _)| other.available)
                    .and_then(|(_, _, acquisition)| acquisition.index());
                let found = (0..devices.devices.len() as u32).find(|index| {
                    devices.is_valid(*index, TrackedDeviceClass::Controller)
                        && Some(*index) != owned_by_other
                        && !taken.contains(index)
                });
                if let Some(index) = found {
                    claims.push((entity, index));
                    taken.insert(index);
                }
            }
        }
    }

    for entity in polling {
        if claims.iter().any(|(e, _)| *e == entity) {
            continue;
        }
        if let Ok((_, _, mut acquisition)) = query.get_mut(entity) {
            acquisition.back_off(config.max_retry_interval);
            debug!("no tracked device for controller {entity} yet");
        }
    }

    for (entity, index) in claims {
        let Ok((_, mut controller, mut acquisition)) = query.get_mut(entity) else {
            continue;
        };
        *acquisition = TrackedAcquisition::Acquired(index);
        controller.device_id = DeviceId(index);
        info!("controller {entity} acquired tracked device {index}");
        initialized.write(ControllerInitialized {
            controller: entity,
            device: DeviceId(index),
        });
    }
}

fn sync_controllers(
    devices: Option<Res<TrackedDevices>>,
    config: Res<TrackedAcquisitionConfig>,
    mut query: Query<(
        Entity,
        &mut Controller,
        &mut ControllerInput,
        &mut Transform,
        &mut TrackedAcquisition,
        Option<&ChildOf>,
    )>,
    parents: Query<&GlobalTransform>,
    mut focus_events: EventWriter<InputFocusChanged>,
) {
    let Some(devices) = devices else {
        return;
    };
    for (entity, mut controller, mut input, mut transform, mut acquisition, parent) in &mut query {
        if controller.input_focus != devices.input_focus {
            controller.input_focus = devices.input_focus;
            focus_events.write(InputFocusChanged {
                controller: entity,
                focus: devices.input_focus,
            });
        }

        let Some(index) = acquisition.index() else {
            continue;
        };
        if !devices.session_running {
            info!("session ended, releasing tracked device {index} of controller {entity}");
            *acquisition = TrackedAcquisition::new(&config);
            controller.available = false;
            input.clear();
            continue;
        }

        controller.hand_guess = match devices.leftmost_controller == Some(index) {
            true => Hand::Left,
            false => Hand::Right,
        };
        let device = devices
            .get(index)
            .filter(|d| d.valid && d.class == TrackedDeviceClass::Controller);
        let Some(device) = device else {
            if controller.available {
                controller.available = false;
                input.clear();
            }
            continue;
        };
        controller.available = true;
        transform.translation = device.pose.translation.into();
        transform.rotation = device.pose.rotation;

        let to_world = parent
            .and_then(|p| parents.get(p.parent()).ok())
            .map_or(GlobalTransform::IDENTITY, |t| *t);
        input.set_buttons(device.buttons);
        input.touchpad = device.touchpad;
        input.trigger = device.trigger;
        input.velocity = to_world.affine().transform_vector3(device.velocity);
        input.angular_velocity = to_world.affine().transform_vector3(device.angular_velocity);
    }
}

fn sync_heads(
    devices: Option<Res<TrackedDevices>>,
    mut query: Query<(&mut HeadDevice, &mut Transform)>,
) {
    let hmd = devices.as_ref().filter(|d| d.session_running).and_then(|d| {
        d.devices
            .iter()
            .find(|device| device.valid && device.class == TrackedDeviceClass::Hmd)
    });
    for (mut head, mut transform) in &mut query {
        if head.backend != ControllerBackend::Tracked {
            continue;
        }
        if head.available != hmd.is_some() {
            head.available = hmd.is_some();
        }
        if let Some(hmd) = hmd {
            transform.translation = hmd.pose.translation.into();
            transform.rotation = hmd.pose.rotation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_device() -> TrackedDevice {
        TrackedDevice {
            class: TrackedDeviceClass::Controller,
            valid: true,
            ..default()
        }
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_event::<ControllerInitialized>();
        app.add_event::<InputFocusChanged>();
        app.configure_sets(PreUpdate, VrPreUpdateSets::UpdateDevices);
        app.insert_resource(TrackedAcquisitionConfig {
            first_poll_delay: 0,
            retry_interval: 2,
            max_retry_interval: 4,
        });
        app.add_plugins(VrTrackedPlugin);
        app
    }

    fn acquisition(app: &App, entity: Entity) -> Option<TrackedAcquisition> {
        app.world().get::<TrackedAcquisition>(entity).copied()
    }

    #[test]
    fn hands_acquire_leftmost_and_rightmost() {
        let mut app = app();
        let mut devices = TrackedDevices {
            session_running: true,
            ..default()
        };
        devices.devices = vec![TrackedDevice::default(), controller_device(), controller_device()];
        app.insert_resource(devices);
        let left = app.world_mut().spawn_empty().id();
        let right = app
            .world_mut()
            .spawn(
                Controller::new(DeviceId(0), Hand::Right, ControllerBackend::Tracked)
                    .with_other(left),
            )
            .id();
        app.world_mut().entity_mut(left).insert(
            Controller::new(DeviceId(0), Hand::Left, ControllerBackend::Tracked).with_other(right),
        );

        // indices unknown, backs off
        app.update();
        assert_eq!(
            acquisition(&app, right),
            Some(TrackedAcquisition::Searching {
                ticks_until_poll: 2,
                interval: 4
            })
        );

        {
            let mut devices = app.world_mut().resource_mut::<TrackedDevices>();
            devices.leftmost_controller = Some(2);
            devices.rightmost_controller = Some(1);
        }
        app.update();
        app.update();
        app.update();
        assert_eq!(acquisition(&app, right), Some(TrackedAcquisition::Acquired(1)));
        assert_eq!(acquisition(&app, left), Some(TrackedAcquisition::Acquired(2)));
        let controller = app.world().get::<Controller>(left);
        assert_eq!(controller.map(|c| c.device_id), Some(DeviceId(2)));
        assert_eq!(controller.map(|c| c.available), Some(true));
        assert_eq!(controller.map(|c| c.hand_guess), Some(Hand::Left));
        let events = app.world().resource::<Events<ControllerInitialized>>();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn any_skips_devices_owned_by_the_pair() {
        let mut app = app();
        app.insert_resource(TrackedDevices {
            session_running: true,
            devices: vec![controller_device(), controller_device()],
            ..default()
        });
        let a = app
            .world_mut()
            .spawn(Controller::new(DeviceId(0), Hand::Any, ControllerBackend::Tracked))
            .id();
        app.update();
        app.update();
        assert_eq!(acquisition(&app, a), Some(TrackedAcquisition::Acquired(0)));

        let b = app
            .world_mut()
            .spawn(
                Controller::new(DeviceId(0), Hand::Any, ControllerBackend::Tracked).with_other(a),
            )
            .id();
        if let Some(mut c) = app.world_mut().get_mut::<Controller>(a) {
            c.other = Some(b);
        }
        app.update();
        app.update();
        assert_eq!(acquisition(&app, b), Some(TrackedAcquisition::Acquired(1)));
    }

    #[test]
    fn session_end_releases_and_focus_is_mirrored() {
        let mut app = app();
        let mut device = controller_device();
        device.pose = Isometry3d::from_translation(Vec3::new(0.0, 1.0, 0.0));
        device.buttons = ControlMask::NONE.with(crate::controller_input::ControlMap::Trigger);
        app.insert_resource(TrackedDevices {
            session_running: true,
            devices: vec![device],
            ..default()
        });
        let a = app
            .world_mut()
            .spawn(Controller::new(DeviceId(5), Hand::Any, ControllerBackend::Tracked))
            .id();
        app.update();
        app.update();
        assert_eq!(
            app.world().get::<Transform>(a).map(|t| t.translation),
            Some(Vec3::new(0.0, 1.0, 0.0))
        );
        assert_eq!(
            app.world()
                .get::<ControllerInput>(a)
                .map(|i| i.get_button_down(crate::controller_input::ControlMap::Trigger)),
            Some(true)
        );

        {
            let mut devices = app.world_mut().resource_mut::<TrackedDevices>();
            devices.session_running = false;
            devices.input_focus = false;
        }
        app.update();
        assert!(acquisition(&app, a).is_some_and(|a| a.is_searching()));
        assert_eq!(app.world().get::<Controller>(a).map(|c| c.available), Some(false));
        assert_eq!(app.world().get::<Controller>(a).map(|c| c.input_focus), Some(false));
        let events = app.world().resource::<Events<InputFocusChanged>>();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn cancel_stops_searching() {
        let mut acquisition = TrackedAcquisition::new(&TrackedAcquisitionConfig::default());
        acquisition.cancel();
        assert_eq!(acquisition, TrackedAcquisition::Cancelled);
        let mut acquired = TrackedAcquisition::Acquired(3);
        acquired.cancel();
        assert_eq!(acquired.index(), Some(3));
    }
}
