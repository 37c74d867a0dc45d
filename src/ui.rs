use bevy::prelude::*;

use crate::field::LayerMask;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum PanelRenderMode {
    #[default]
    WorldSpace,
    /// Drawn over the screen, never hit by controller rays.
    ScreenSpaceOverlay,
}

/// A flat rectangle of ui in the world, facing its local +Z.
///
/// Panels nested under another panel are part of that root panel and are not cast
/// against on their own.
#[derive(Component, Clone, Copy, Debug, Reflect)]
#[require(Transform, PanelRaycaster)]
pub struct UiPanel {
    pub size: Vec2,
    /// Fraction of `size`, `(0, 0)` is the bottom left corner.
    pub pivot: Vec2,
    pub render_mode: PanelRenderMode,
}

impl UiPanel {
    pub const fn new(size: Vec2) -> Self {
        UiPanel {
            size,
            pivot: Vec2::splat(0.5),
            render_mode: PanelRenderMode::WorldSpace,
        }
    }
    pub const fn with_pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = pivot;
        self
    }
    pub const fn with_render_mode(mut self, render_mode: PanelRenderMode) -> Self {
        self.render_mode = render_mode;
        self
    }
    /// bottom left, top left, top right, bottom right
    pub fn world_corners(&self, transform: &GlobalTransform) -> [Vec3; 4] {
        let rect = local_rect(self.size, self.pivot);
        [
            Vec3::new(rect.min.x, rect.min.y, 0.0),
            Vec3::new(rect.min.x, rect.max.y, 0.0),
            Vec3::new(rect.max.x, rect.max.y, 0.0),
            Vec3::new(rect.max.x, rect.min.y, 0.0),
        ]
        .map(|corner| transform.transform_point(corner))
    }
    /// The corners interpolated by the pivot.
    pub fn pivot_center(&self, transform: &GlobalTransform) -> Vec3 {
        let [bottom_left, top_left, top_right, bottom_right] = self.world_corners(transform);
        let bottom = bottom_left.lerp(bottom_right, self.pivot.x);
        let top = top_left.lerp(top_right, self.pivot.x);
        bottom.lerp(top, self.pivot.y)
    }
    pub fn normal(transform: &GlobalTransform) -> Dir3 {
        transform.back()
    }
    /// Position of `world_point` in the panels plane, relative to the pivot center along
    /// the panels right and up axes.
    pub fn to_panel_point(&self, transform: &GlobalTransform, world_point: Vec3) -> Vec2 {
        let offset = world_point - self.pivot_center(transform);
        Vec2::new(
            offset.dot(transform.right().as_vec3()),
            offset.dot(transform.up().as_vec3()),
        )
    }
}

/// Settings for casting controller rays against a [`UiPanel`].
#[derive(Component, Clone, Copy, Debug, Reflect)]
pub struct PanelRaycaster {
    /// Skip graphics facing away from the ray.
    pub ignore_reversed_graphics: bool,
    /// Let fields in `blocking_mask` in front of the panel block its graphics.
    pub block_3d_objects: bool,
    pub blocking_mask: LayerMask,
    /// Negative means unlimited.
    pub max_distance: f32,
    /// Camera whose clip span limits the blocking cast.
    pub event_camera: Option<Entity>,
}

impl Default for PanelRaycaster {
    fn default() -> Self {
        Self {
            ignore_reversed_graphics: true,
            block_3d_objects: false,
            blocking_mask: LayerMask::ALL,
            max_distance: -1.0,
            event_camera: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum GraphicShape {
    #[default]
    Rect,
    /// Ellipse inscribed in the rect.
    Ellipse,
}

/// A hittable rect on a [`UiPanel`], facing its local +Z.
#[derive(Component, Clone, Copy, Debug, Reflect)]
#[require(Transform)]
pub struct UiGraphic {
    pub size: Vec2,
    pub pivot: Vec2,
    /// Draw order on the panel, `-1` means the graphic is not drawn.
    pub depth: i32,
    pub raycast_target: bool,
    pub shape: GraphicShape,
}

impl UiGraphic {
    pub const fn new(size: Vec2, depth: i32) -> Self {
        UiGraphic {
            size,
            pivot: Vec2::splat(0.5),
            depth,
            raycast_target: true,
            shape: GraphicShape::Rect,
        }
    }
    pub const fn with_shape(mut self, shape: GraphicShape) -> Self {
        self.shape = shape;
        self
    }
    pub const fn with_raycast_target(mut self, raycast_target: bool) -> Self {
        self.raycast_target = raycast_target;
        self
    }
    /// `local_point` is in the graphics local space.
    pub fn contains(&self, local_point: Vec2) -> bool {
        let rect = local_rect(self.size, self.pivot);
        if !rect.contains(local_point) {
            return false;
        }
        match self.shape {
            GraphicShape::Rect => true,
            GraphicShape::Ellipse => {
                let half = rect.half_size();
                if half.x <= 0.0 || half.y <= 0.0 {
                    return false;
                }
                ((local_point - rect.center()) / half).length_squared() <= 1.0
            }
        }
    }
}

fn local_rect(size: Vec2, pivot: Vec2) -> Rect {
    let min = -pivot * size;
    Rect::from_corners(min, min + size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_center_matches_panel_origin() {
        let panel = UiPanel::new(Vec2::new(2.0, 1.0)).with_pivot(Vec2::new(0.25, 0.0));
        let transform = GlobalTransform::from(
            Transform::from_xyz(1.0, 2.0, 3.0).with_rotation(Quat::from_rotation_y(0.7)),
        );
        let center = panel.pivot_center(&transform);
        assert!(center.distance(Vec3::new(1.0, 2.0, 3.0)) < 1e-5);
    }

    #[test]
    fn corners_follow_pivot() {
        let panel = UiPanel::new(Vec2::new(2.0, 1.0)).with_pivot(Vec2::ZERO);
        let corners = panel.world_corners(&GlobalTransform::IDENTITY);
        assert_eq!(corners[0], Vec3::ZERO);
        assert_eq!(corners[2], Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn panel_point_uses_right_and_up() {
        let panel = UiPanel::new(Vec2::ONE);
        let transform = GlobalTransform::from_rotation(Quat::from_rotation_z(
            std::f32::consts::FRAC_PI_2,
        ));
        // rotated a quarter turn, world up is the panels right
        let point = panel.to_panel_point(&transform, Vec3::new(0.0, 0.3, 0.0));
        assert!(point.distance(Vec2::new(0.3, 0.0)) < 1e-5);
    }

    #[test]
    fn ellipse_excludes_corners() {
        let graphic = UiGraphic::new(Vec2::new(2.0, 1.0), 0).with_shape(GraphicShape::Ellipse);
        assert!(graphic.contains(Vec2::new(0.9, 0.0)));
        assert!(!graphic.contains(Vec2::new(0.9, 0.45)));
        let rect = UiGraphic::new(Vec2::new(2.0, 1.0), 0);
        assert!(rect.contains(Vec2::new(0.9, 0.45)));
        assert!(!rect.contains(Vec2::new(1.1, 0.0)));
    }
}
