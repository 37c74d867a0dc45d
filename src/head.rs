use bevy::{ecs::system::SystemParam, prelude::*};

use crate::{controller::ControllerBackend, registry::ControllerRegistry, DeviceActive};

/// A head mounted display, or the camera standing in for one.
#[derive(Component, Clone, Copy, Debug, Reflect)]
#[require(Transform, DeviceActive)]
pub struct HeadDevice {
    pub available: bool,
    pub backend: ControllerBackend,
}

impl HeadDevice {
    pub const fn new(backend: ControllerBackend) -> Self {
        HeadDevice {
            available: false,
            backend,
        }
    }
}

/// Which of the two rigs is currently enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum RigMode {
    #[default]
    None,
    Vr,
    Fallback,
}

/// Switches between the tracked rig and the mouse fallback rig.
///
/// Entities under the disabled rig are hidden and their devices deactivated. Until
/// [`VrRig::set_fallback`] is called the rig follows tracked head availability.
#[derive(Resource, Clone, Debug)]
pub struct VrRig {
    /// Devices are tracked relative to this entity.
    pub tracking_origin: Entity,
    pub vr: Option<Entity>,
    pub fallback: Option<Entity>,
    /// Re-parented to the active head whenever the rig switches.
    pub attach: Option<Entity>,
    pub enable_fallback_if_no_device: bool,
    mode: RigMode,
    requested: Option<RigMode>,
    manual: bool,
}

impl VrRig {
    pub fn new(tracking_origin: Entity) -> Self {
        VrRig {
            tracking_origin,
            vr: None,
            fallback: None,
            attach: None,
            enable_fallback_if_no_device: true,
            mode: RigMode::None,
            requested: None,
            manual: false,
        }
    }
    pub fn with_rigs(mut self, vr: Entity, fallback: Entity) -> Self {
        self.vr = Some(vr);
        self.fallback = Some(fallback);
        self
    }
    pub fn with_attach(mut self, attach: Entity) -> Self {
        self.attach = Some(attach);
        self
    }
    pub fn mode(&self) -> RigMode {
        self.mode
    }
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some() && self.mode == RigMode::Fallback
    }
    /// Applied on the next tick, disables automatic switching.
    pub fn set_fallback(&mut self, fallback: bool) {
        self.manual = true;
        self.requested = Some(match fallback {
            true => RigMode::Fallback,
            false => RigMode::Vr,
        });
    }

    fn next_mode(&mut self, tracked_head_available: bool) -> Option<RigMode> {
        if let Some(requested) = self.requested.take() {
            return Some(requested);
        }
        if self.manual {
            return None;
        }
        if tracked_head_available {
            Some(RigMode::Vr)
        } else if self.enable_fallback_if_no_device {
            Some(RigMode::Fallback)
        } else {
            None
        }
    }
}

pub(crate) fn update_fallback_heads(mut query: Query<&mut HeadDevice>) {
    for mut head in &mut query {
        if head.backend == ControllerBackend::Fallback && !head.available {
            head.available = true;
        }
    }
}

pub(crate) fn update_rig(
    rig: Option<ResMut<VrRig>>,
    registry: Option<Res<ControllerRegistry>>,
    heads: Query<&HeadDevice>,
    children: Query<&Children>,
    mut devices: Query<&mut DeviceActive>,
    mut visibility: Query<&mut Visibility>,
    mut cmds: Commands,
) {
    let Some(mut rig) = rig else {
        return;
    };
    let tracked_head_available = heads
        .iter()
        .any(|h| h.backend == ControllerBackend::Tracked && h.available);
    let Some(mode) = rig.next_mode(tracked_head_available) else {
        return;
    };
    if mode == rig.mode {
        return;
    }
    info!("switching to {mode:?} rig");
    rig.mode = mode;

    for (root, enabled) in [
        (rig.vr, mode == RigMode::Vr),
        (rig.fallback, mode == RigMode::Fallback),
    ] {
        let Some(root) = root else {
            continue;
        };
        if let Ok(mut vis) = visibility.get_mut(root) {
            *vis = match enabled {
                true => Visibility::Inherited,
                false => Visibility::Hidden,
            };
        }
        for entity in std::iter::once(root).chain(children.iter_descendants(root)) {
            if let Ok(mut active) = devices.get_mut(entity) {
                active.0 = enabled;
            }
        }
    }

    let Some(attach) = rig.attach else {
        return;
    };
    let active_head = registry.iter().flat_map(|r| r.heads.iter()).copied().find(|head| {
        devices.get(*head).is_ok_and(|active| active.0)
    });
    match active_head {
        Some(head) => {
            cmds.entity(attach)
                .insert((ChildOf(head), Transform::IDENTITY));
        }
        None => warn!("no active head to attach {attach} to"),
    }
}

/// Body metrics derived from the active head and the tracking origin.
#[derive(SystemParam)]
pub struct HeadTracking<'w, 's> {
    rig: Option<Res<'w, VrRig>>,
    registry: Option<Res<'w, ControllerRegistry>>,
    heads: Query<'w, 's, (&'static GlobalTransform, &'static DeviceActive), With<HeadDevice>>,
    transforms: Query<'w, 's, &'static GlobalTransform>,
}

impl HeadTracking<'_, '_> {
    fn origin(&self) -> Option<&GlobalTransform> {
        let rig = self.rig.as_ref()?;
        self.transforms
            .get(rig.tracking_origin)
            .inspect_err(|err| warn_once!("invalid tracking origin: {err}"))
            .ok()
    }
    fn hmd(&self) -> Option<&GlobalTransform> {
        self.registry
            .as_ref()?
            .heads
            .iter()
            .filter_map(|head| self.heads.get(*head).ok())
            .find(|(_, active)| active.0)
            .map(|(transform, _)| transform)
    }
    pub fn eye_height(&self) -> Option<f32> {
        Some(eye_height(self.origin()?, self.hmd()))
    }
    pub fn feet_position_guess(&self) -> Option<Vec3> {
        Some(feet_position_guess(self.origin()?, self.hmd()))
    }
    pub fn body_direction_guess(&self) -> Option<Vec3> {
        Some(body_direction_guess(self.origin()?, self.hmd()))
    }
}

/// Height of the eyes above the tracking origins floor, in tracking space units.
pub fn eye_height(origin: &GlobalTransform, hmd: Option<&GlobalTransform>) -> f32 {
    let Some(hmd) = hmd else {
        return 0.0;
    };
    let offset = (hmd.translation() - origin.translation()).project_onto_normalized(*origin.up());
    offset.length() / origin.scale().x
}

/// Point on the floor directly beneath the head.
pub fn feet_position_guess(origin: &GlobalTransform, hmd: Option<&GlobalTransform>) -> Vec3 {
    let Some(hmd) = hmd else {
        return origin.translation();
    };
    origin.translation()
        + (hmd.translation() - origin.translation()).reject_from_normalized(*origin.up())
}

/// Gaze direction flattened onto the floor plane, flipped when the head is upside down.
pub fn body_direction_guess(origin: &GlobalTransform, hmd: Option<&GlobalTransform>) -> Vec3 {
    let Some(hmd) = hmd else {
        return origin.forward().as_vec3();
    };
    let direction = hmd.forward().reject_from_normalized(*origin.up());
    match hmd.up().dot(*origin.up()) < 0.0 {
        true => -direction,
        false => direction,
    }
}
