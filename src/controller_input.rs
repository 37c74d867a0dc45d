use bevy::prelude::*;

/// Logical controls every controller backend maps its hardware onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum ControlMap {
    System,
    Menu,
    Touchpad,
    Trigger,
    Grip,
}

impl ControlMap {
    pub const ALL: [ControlMap; 5] = [
        ControlMap::System,
        ControlMap::Menu,
        ControlMap::Touchpad,
        ControlMap::Trigger,
        ControlMap::Grip,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of held controls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub struct ControlMask(pub u8);

impl ControlMask {
    pub const NONE: ControlMask = ControlMask(0);

    pub const fn contains(self, control: ControlMap) -> bool {
        self.0 & control.bit() != 0
    }
    pub const fn with(self, control: ControlMap) -> ControlMask {
        ControlMask(self.0 | control.bit())
    }
    pub fn set(&mut self, control: ControlMap, held: bool) {
        if held {
            self.0 |= control.bit();
        } else {
            self.0 &= !control.bit();
        }
    }
}

impl FromIterator<ControlMap> for ControlMask {
    fn from_iter<T: IntoIterator<Item = ControlMap>>(iter: T) -> Self {
        iter.into_iter().fold(ControlMask::NONE, ControlMask::with)
    }
}

/// Per tick input snapshot of a controller, written by its backend in
/// [`VrPreUpdateSets::UpdateDevices`](crate::VrPreUpdateSets::UpdateDevices).
#[derive(Clone, Copy, Component, Debug, Default, Reflect)]
pub struct ControllerInput {
    current: ControlMask,
    previous: ControlMask,
    pub touchpad: Vec2,
    pub trigger: f32,
    /// world space, units per second
    pub velocity: Vec3,
    /// world space, radians per second
    pub angular_velocity: Vec3,
}

impl ControllerInput {
    /// Stores this ticks held controls, the previous ones are kept for edge detection.
    pub fn set_buttons(&mut self, held: ControlMask) {
        self.previous = self.current;
        self.current = held;
    }
    /// Resets everything to the idle state, used when a device becomes unavailable.
    pub fn clear(&mut self) {
        *self = ControllerInput {
            previous: self.current,
            ..default()
        };
    }
    pub fn buttons(&self) -> ControlMask {
        self.current
    }
    /// Held this tick.
    pub fn get_button_down(&self, control: ControlMap) -> bool {
        self.current.contains(control)
    }
    /// Went down this tick.
    pub fn get_button_pressed(&self, control: ControlMap) -> bool {
        self.current.contains(control) && !self.previous.contains(control)
    }
    /// Went up this tick.
    pub fn get_button_released(&self, control: ControlMap) -> bool {
        !self.current.contains(control) && self.previous.contains(control)
    }
    /// One dimensional axes are reported in `x`.
    pub fn get_axis(&self, control: ControlMap) -> Vec2 {
        match control {
            ControlMap::Touchpad => self.touchpad,
            ControlMap::Trigger => Vec2::new(self.trigger, 0.0),
            ControlMap::System | ControlMap::Menu | ControlMap::Grip => Vec2::ZERO,
        }
    }
    pub fn tracked_velocity(&self) -> Vec3 {
        self.velocity
    }
    pub fn tracked_angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }
}

/// World space ray a controller points along.
#[derive(Clone, Copy, Component, Debug, Deref, DerefMut, Reflect)]
pub struct PointerRay(pub Ray3d);

impl Default for PointerRay {
    fn default() -> Self {
        Self(Ray3d::new(Vec3::ZERO, Dir3::NEG_Z))
    }
}
