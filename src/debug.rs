use bevy::{color::palettes::css, prelude::*};

use crate::{
    controller::Controller,
    controller_input::PointerRay,
    field::Field,
    router::PointerRouter,
    ui::UiPanel,
    DeviceActive,
};

pub struct VrPointerDebugGizmosPlugin;

impl Plugin for VrPointerDebugGizmosPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, draw_pointer_gizmos);
        app.add_systems(Update, (draw_fields, draw_panels));
    }
}

fn draw_pointer_gizmos(
    controller_query: Query<(&Controller, &PointerRay, &DeviceActive)>,
    router: Option<Res<PointerRouter>>,
    mut gizmos: Gizmos,
) {
    for (controller, ray, active) in &controller_query {
        let pointer = router
            .as_ref()
            .and_then(|router| router.pointer(controller.device_id));
        let hit = pointer.and_then(|p| p.current_hit);
        let color = match (active.0 && controller.available, pointer) {
            (true, Some(p)) if p.dragging => css::ORANGE,
            (true, Some(p)) if p.press.is_some() => css::LIME,
            (true, Some(p)) if p.enter.is_some() => css::BLUE,
            (true, _) => css::WHITE,
            (false, _) => css::LIGHT_GRAY,
        };
        let length = hit.map_or(0.2, |hit| hit.distance);
        gizmos.line(ray.origin, ray.get_point(length), color);
        if let Some(hit) = hit {
            let normal = Dir3::new(hit.world_normal).unwrap_or(Dir3::Z);
            gizmos.circle(
                Isometry3d::new(hit.world_position, Quat::from_rotation_arc(Vec3::Z, *normal)),
                0.01,
                color,
            );
        }
    }
}

fn draw_panels(panel_query: Query<(&GlobalTransform, &UiPanel)>, mut gizmos: Gizmos) {
    for (transform, panel) in &panel_query {
        let [a, b, c, d] = panel.world_corners(transform);
        gizmos.linestrip([a, b, c, d, a], css::AQUA);
    }
}

fn draw_fields(field_query: Query<(&GlobalTransform, &Field)>, mut gizmos: Gizmos) {
    for (transform, field) in &field_query {
        match field {
            Field::Sphere(r) => {
                gizmos.sphere(transform.to_isometry(), *r, css::LIME);
            }
            Field::Cuboid(cuboid) => gizmos.cuboid(
                transform.mul_transform(Transform::from_scale(cuboid.half_size * 2.0)),
                css::LIME,
            ),
            Field::Torus(torus) => {
                let iso = transform.to_isometry();
                gizmos.primitive_3d(torus, iso, css::LIME);
            }
            Field::Cylinder(cylinder) => {
                let iso = transform.to_isometry();
                gizmos.primitive_3d(cylinder, iso, css::LIME);
            }
        }
    }
}
