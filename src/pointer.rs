use bevy::prelude::*;

use crate::{controller::DeviceId, raycast::PointerHit};

/// Interaction state of one controller pointer, owned by the
/// [`PointerRouter`](crate::router::PointerRouter).
#[derive(Clone, Debug, PartialEq)]
pub struct PointerState {
    pub id: DeviceId,
    /// Root panel the 2D position is measured on.
    pub panel: Option<Entity>,
    pub position: Vec2,
    pub delta: Vec2,
    pub press_position: Vec2,
    pub world_delta: Vec3,
    pub current_hit: Option<PointerHit>,
    pub press_hit: Option<PointerHit>,
    /// Hovered target, `hovered` holds it and all of its ancestors.
    pub enter: Option<Entity>,
    pub hovered: Vec<Entity>,
    pub press: Option<Entity>,
    pub raw_press: Option<Entity>,
    pub drag: Option<Entity>,
    pub eligible_for_click: bool,
    pub dragging: bool,
    pub use_drag_threshold: bool,
    pub click_count: u32,
    pub click_time: f64,
}

impl PointerState {
    pub fn new(id: DeviceId) -> Self {
        PointerState {
            id,
            panel: None,
            position: Vec2::ZERO,
            delta: Vec2::ZERO,
            press_position: Vec2::ZERO,
            world_delta: Vec3::ZERO,
            current_hit: None,
            press_hit: None,
            enter: None,
            hovered: Vec::new(),
            press: None,
            raw_press: None,
            drag: None,
            eligible_for_click: false,
            dragging: false,
            use_drag_threshold: true,
            click_count: 0,
            click_time: 0.0,
        }
    }

    /// Takes in this ticks ray hit. `pressed` is true on the tick the select control went
    /// down, deltas are zeroed on that tick.
    pub fn update_from_hit(&mut self, hit: Option<PointerHit>, pressed: bool) {
        match hit {
            Some(hit) => {
                if hit.panel.is_some() && hit.panel == self.panel {
                    self.delta = match pressed {
                        true => Vec2::ZERO,
                        false => hit.panel_position - self.position,
                    };
                } else {
                    self.panel = hit.panel;
                    self.delta = Vec2::ZERO;
                }
                self.position = hit.panel_position;
            }
            None => self.delta = Vec2::ZERO,
        }

        if pressed {
            self.press_hit = hit;
            self.world_delta = Vec3::ZERO;
        } else {
            self.world_delta = match (hit, self.current_hit) {
                (Some(hit), Some(last)) => hit.world_position - last.world_position,
                _ => Vec3::ZERO,
            };
        }
        self.current_hit = hit;
    }

    pub fn target(&self) -> Option<Entity> {
        self.current_hit.map(|hit| hit.target)
    }

    pub fn is_moving(&self) -> bool {
        match self.panel {
            Some(_) => self.delta != Vec2::ZERO,
            None => self.world_delta != Vec3::ZERO,
        }
    }

    pub fn should_start_drag(&self, threshold: f32) -> bool {
        if !self.use_drag_threshold {
            return true;
        }
        let threshold_sq = threshold * threshold;
        if self.panel.is_some() {
            return (self.press_position - self.position).length_squared() >= threshold_sq;
        }
        match (self.press_hit, self.current_hit) {
            (Some(press), Some(current)) => {
                (press.world_position - current.world_position).length_squared() >= threshold_sq
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> PointerSnapshot {
        PointerSnapshot {
            position: self.position,
            delta: self.delta,
            press_position: self.press_position,
            world_delta: self.world_delta,
            hit: self.current_hit,
            enter: self.enter,
            press: self.press,
            drag: self.drag,
            dragging: self.dragging,
            click_count: self.click_count,
        }
    }
}

/// Copy of a pointers state carried by every notification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSnapshot {
    pub position: Vec2,
    pub delta: Vec2,
    pub press_position: Vec2,
    pub world_delta: Vec3,
    pub hit: Option<PointerHit>,
    pub enter: Option<Entity>,
    pub press: Option<Entity>,
    pub drag: Option<Entity>,
    pub dragging: bool,
    pub click_count: u32,
}
