use std::cmp::Ordering;

use bevy::{ecs::system::SystemParam, platform::collections::HashMap, prelude::*};

use crate::{
    field::{CollisionLayers, Field, LayerMask},
    ui::{PanelRaycaster, PanelRenderMode, UiGraphic, UiPanel},
};

/// Clip span used for the blocking cast when a panel has no usable event camera.
pub const DEFAULT_BLOCKING_DISTANCE: f32 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum HitSource {
    Ui,
    Physics,
}

/// Result of resolving a controller ray.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct PointerHit {
    pub target: Entity,
    pub distance: f32,
    pub world_position: Vec3,
    pub world_normal: Vec3,
    /// Position on `panel`, zero when the hit is not on a panel.
    pub panel_position: Vec2,
    /// Root panel the hit lies on.
    pub panel: Option<Entity>,
    pub depth: i32,
    pub source: HitSource,
}

impl PointerHit {
    /// Nearest first, ui wins ties against physics, then the higher depth.
    pub fn cmp_nearest(&self, other: &PointerHit) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (self.source, other.source) {
                (HitSource::Ui, HitSource::Physics) => Ordering::Less,
                (HitSource::Physics, HitSource::Ui) => Ordering::Greater,
                _ => Ordering::Equal,
            })
            .then_with(|| other.depth.cmp(&self.depth))
    }
}

/// Casts `ray` against one world space panel and its graphics.
///
/// `blocking_distance` is the distance to the nearest blocking 3D object, graphics at or
/// beyond it are not hit.
pub fn raycast_panel<'a>(
    ray: Ray3d,
    panel_entity: Entity,
    panel: &UiPanel,
    panel_transform: &GlobalTransform,
    raycaster: &PanelRaycaster,
    graphics: impl IntoIterator<Item = (Entity, &'a UiGraphic, &'a GlobalTransform)>,
    blocking_distance: f32,
) -> Option<PointerHit> {
    if panel.render_mode != PanelRenderMode::WorldSpace {
        return None;
    }
    let center = panel.pivot_center(panel_transform);
    let normal = UiPanel::normal(panel_transform);
    let plane_distance = ray.intersect_plane(center, InfinitePlane3d { normal })?;
    if raycaster.max_distance >= 0.0 && plane_distance > raycaster.max_distance {
        return None;
    }
    let world_position = ray.get_point(plane_distance);
    let panel_position = panel.to_panel_point(panel_transform, world_position);

    let mut candidates = graphics
        .into_iter()
        .filter(|(_, graphic, _)| graphic.depth >= 0 && graphic.raycast_target)
        .filter_map(|(entity, graphic, transform)| {
            let distance = distance_along_forward(ray, transform)?;
            let local = transform
                .affine()
                .inverse()
                .transform_point3(ray.get_point(distance));
            graphic
                .contains(local.xy())
                .then_some((entity, graphic, transform, distance))
        })
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| b.1.depth.cmp(&a.1.depth));

    let mut best: Option<(Entity, &UiGraphic, f32)> = None;
    for (entity, graphic, transform, distance) in candidates {
        if raycaster.ignore_reversed_graphics
            && transform.forward().dot(*ray.direction) <= 0.0
        {
            continue;
        }
        if distance < 0.0 || distance >= blocking_distance {
            continue;
        }
        if best.is_none_or(|(_, _, d)| distance < d) {
            best = Some((entity, graphic, distance));
        }
    }

    best.map(|(target, graphic, distance)| PointerHit {
        target,
        distance,
        world_position,
        world_normal: normal.as_vec3(),
        panel_position,
        panel: Some(panel_entity),
        depth: graphic.depth,
        source: HitSource::Ui,
    })
}

/// Signed distance along `ray` to the plane through the transform with its forward axis as
/// normal, `None` when the ray runs parallel to it.
fn distance_along_forward(ray: Ray3d, transform: &GlobalTransform) -> Option<f32> {
    let forward = transform.forward();
    let denominator = forward.dot(*ray.direction);
    if denominator.abs() <= f32::EPSILON {
        return None;
    }
    Some(forward.dot(transform.translation() - ray.origin) / denominator)
}

/// Nearest field in `mask` hit by `ray`, negative `max_distance` means unlimited.
pub fn cast_fields<'a>(
    ray: Ray3d,
    mask: LayerMask,
    max_distance: f32,
    fields: impl IntoIterator<
        Item = (
            Entity,
            &'a Field,
            &'a GlobalTransform,
            Option<&'a CollisionLayers>,
        ),
    >,
) -> Option<(Entity, f32)> {
    let max_distance = match max_distance < 0.0 {
        true => f32::INFINITY,
        false => max_distance,
    };
    fields
        .into_iter()
        .filter(|(_, _, _, layers)| layers.copied().unwrap_or_default().0.intersects(mask))
        .filter_map(|(entity, field, transform, _)| {
            field
                .cast_ray(transform, ray, max_distance)
                .map(|distance| (entity, distance))
        })
        .min_by(|(_, d1), (_, d2)| d1.partial_cmp(d2).unwrap_or(Ordering::Equal))
}

/// Resolves controller rays against ui panels and collision fields.
#[derive(SystemParam)]
pub struct RayResolver<'w, 's> {
    panels: Query<
        'w,
        's,
        (
            Entity,
            &'static UiPanel,
            &'static PanelRaycaster,
            &'static GlobalTransform,
        ),
    >,
    graphics: Query<'w, 's, (Entity, &'static UiGraphic, &'static GlobalTransform)>,
    fields: Query<
        'w,
        's,
        (
            Entity,
            &'static Field,
            &'static GlobalTransform,
            Option<&'static CollisionLayers>,
        ),
    >,
    parents: Query<'w, 's, &'static ChildOf>,
    projections: Query<'w, 's, &'static Projection>,
}

impl RayResolver<'_, '_> {
    /// Topmost panel among `entity` and its ancestors.
    pub fn root_panel(&self, entity: Entity) -> Option<Entity> {
        let mut root = None;
        let mut current = Some(entity);
        while let Some(e) = current {
            if self.panels.contains(e) {
                root = Some(e);
            }
            current = self.parents.get(e).ok().map(ChildOf::parent);
        }
        root
    }

    fn blocking_distance(&self, ray: Ray3d, raycaster: &PanelRaycaster) -> f32 {
        if !raycaster.block_3d_objects {
            return f32::MAX;
        }
        let span = raycaster
            .event_camera
            .and_then(|camera| {
                self.projections
                    .get(camera)
                    .inspect_err(|err| warn_once!("invalid panel event camera: {err}"))
                    .ok()
            })
            .and_then(|projection| match projection {
                Projection::Perspective(p) => Some(p.far - p.near),
                Projection::Orthographic(o) => Some(o.far - o.near),
                Projection::Custom(_) => None,
            })
            .unwrap_or(DEFAULT_BLOCKING_DISTANCE);
        cast_fields(ray, raycaster.blocking_mask, span, &self.fields)
            .map_or(f32::MAX, |(_, distance)| distance)
    }

    /// Nearest hit of `ray` over all root panels and all fields in `mask`.
    pub fn resolve(&self, ray: Ray3d, mask: LayerMask, max_distance: f32) -> Option<PointerHit> {
        let mut graphics_by_panel: HashMap<Entity, Vec<_>> = HashMap::default();
        for graphic in &self.graphics {
            if let Some(panel) = self.root_panel(graphic.0) {
                graphics_by_panel.entry(panel).or_default().push(graphic);
            }
        }

        let ui_hits = self
            .panels
            .iter()
            .filter(|(entity, ..)| self.root_panel(*entity) == Some(*entity))
            .filter_map(|(entity, panel, raycaster, transform)| {
                raycast_panel(
                    ray,
                    entity,
                    panel,
                    transform,
                    raycaster,
                    graphics_by_panel.remove(&entity).unwrap_or_default(),
                    self.blocking_distance(ray, raycaster),
                )
            });

        let physics_hit = cast_fields(ray, mask, max_distance, &self.fields).and_then(
            |(target, distance)| {
                let (_, field, transform, _) = self.fields.get(target).ok()?;
                let world_position = ray.get_point(distance);
                let panel = self.root_panel(target);
                let panel_position = panel
                    .and_then(|panel| self.panels.get(panel).ok())
                    .map_or(Vec2::ZERO, |(_, panel, _, panel_transform)| {
                        panel.to_panel_point(panel_transform, world_position)
                    });
                Some(PointerHit {
                    target,
                    distance,
                    world_position,
                    world_normal: field.normal(transform, world_position).into(),
                    panel_position,
                    panel,
                    depth: 0,
                    source: HitSource::Physics,
                })
            },
        );

        ui_hits
            .chain(physics_hit)
            .min_by(PointerHit::cmp_nearest)
    }
}
