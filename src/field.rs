use bevy::{
    math::{vec3a, Vec3A},
    prelude::*,
};

pub const RAYCAST_MAX_STEPS: u32 = 256;
/// Distance at which sphere tracing counts as touching the surface.
pub const RAYCAST_HIT_DISTANCE: f32 = 0.0005;

/// Signed distance collider used by ray casts, distances are in the fields local space.
#[derive(Component, Debug, Clone, Copy)]
#[require(Transform)]
pub enum Field {
    Sphere(f32),
    Cuboid(Cuboid),
    Torus(Torus),
    Cylinder(Cylinder),
}
impl Field {
    pub fn closest_point(
        &self,
        field_transform: &GlobalTransform,
        point: impl Into<Vec3A>,
    ) -> Vec3A {
        let point = point.into();
        point - self.normal(field_transform, point) * self.distance(field_transform, point)
    }
    /// point should be in world-space
    pub fn normal(&self, field_transform: &GlobalTransform, point: impl Into<Vec3A>) -> Vec3A {
        let point = point.into();
        let distance_vec = Vec3A::splat(self.distance(field_transform, point));
        const R: f32 = 0.0001;
        let r_vec = Vec3A::new(
            self.distance(field_transform, point + vec3a(R, 0.0, 0.0)),
            self.distance(field_transform, point + vec3a(0.0, R, 0.0)),
            self.distance(field_transform, point + vec3a(0.0, 0.0, R)),
        );
        let local_normal = distance_vec - r_vec;
        -field_transform
            .affine()
            .transform_vector3a(local_normal)
            .normalize()
    }
    /// point should be in world-space
    pub fn distance(&self, field_transform: &GlobalTransform, point: impl Into<Vec3A>) -> f32 {
        let point = point.into();
        let world_to_local_matrix = field_transform.compute_matrix().inverse();
        let p = world_to_local_matrix.transform_point3a(point);
        match self {
            Field::Sphere(radius) => p.length() - radius,
            Field::Cuboid(cuboid) => {
                let q = Vec3::new(
                    p.x.abs() - cuboid.half_size.x,
                    p.y.abs() - cuboid.half_size.y,
                    p.z.abs() - cuboid.half_size.z,
                );
                let v = Vec3::new(q.x.max(0_f32), q.y.max(0_f32), q.z.max(0_f32));
                v.length() + q.x.max(q.y.max(q.z)).min(0_f32)
            }
            Field::Torus(torus) => {
                let q = vec2(p.xz().length() - torus.major_radius, p.y);
                q.length() - torus.minor_radius
            }
            Field::Cylinder(cylinder) => {
                let d = vec2(
                    p.xz().length().abs() - cylinder.radius,
                    p.y.abs() - cylinder.half_height,
                );
                d.x.max(d.y).min(0.0) + d.max(vec2(0.0, 0.0)).length()
            }
        }
    }
    /// Sphere traces `ray` against the field and returns the world space distance to the
    /// surface. Rays starting inside the field do not hit it.
    pub fn cast_ray(
        &self,
        field_transform: &GlobalTransform,
        ray: Ray3d,
        max_distance: f32,
    ) -> Option<f32> {
        // local distances shrink or grow with the transform, stepping by the smallest
        // scale axis never overshoots the surface
        let scale = field_transform.scale().abs().min_element();
        if scale <= f32::EPSILON {
            return None;
        }
        if self.distance(field_transform, ray.origin) <= 0.0 {
            return None;
        }
        let mut length = 0.0;
        for _ in 0..RAYCAST_MAX_STEPS {
            let distance = self.distance(field_transform, ray.get_point(length)) * scale;
            if distance < RAYCAST_HIT_DISTANCE {
                return Some(length);
            }
            length += distance;
            if length > max_distance {
                return None;
            }
        }
        None
    }
}

/// Bit set of collision layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: LayerMask = LayerMask(u32::MAX);
    pub const NONE: LayerMask = LayerMask(0);

    pub const fn layer(layer: u8) -> LayerMask {
        LayerMask(1 << layer)
    }
    pub const fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Layers a [`Field`] belongs to, fields without it are on layer 0.
#[derive(Clone, Copy, Component, Debug, Deref, DerefMut, Reflect)]
pub struct CollisionLayers(pub LayerMask);

impl Default for CollisionLayers {
    fn default() -> Self {
        Self(LayerMask::layer(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_hits_sphere_surface() {
        let transform = GlobalTransform::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let ray = Ray3d::new(Vec3::ZERO, Dir3::NEG_Z);
        let distance = Field::Sphere(1.0).cast_ray(&transform, ray, 100.0);
        assert!(distance.is_some_and(|d| (d - 4.0).abs() < 0.01));
    }

    #[test]
    fn ray_respects_max_distance() {
        let transform = GlobalTransform::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let ray = Ray3d::new(Vec3::ZERO, Dir3::NEG_Z);
        assert_eq!(Field::Sphere(1.0).cast_ray(&transform, ray, 3.0), None);
    }

    #[test]
    fn ray_misses_and_inside_start() {
        let transform = GlobalTransform::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let field = Field::Cuboid(Cuboid::new(1.0, 1.0, 1.0));
        let ray = Ray3d::new(Vec3::new(3.0, 0.0, 0.0), Dir3::NEG_Z);
        assert_eq!(field.cast_ray(&transform, ray, 100.0), None);
        let inside = Ray3d::new(Vec3::new(0.0, 0.0, -5.0), Dir3::NEG_Z);
        assert_eq!(field.cast_ray(&transform, inside, 100.0), None);
    }

    #[test]
    fn scaled_field_uses_world_distance() {
        let transform = GlobalTransform::from(
            Transform::from_xyz(0.0, 0.0, -10.0).with_scale(Vec3::splat(2.0)),
        );
        let ray = Ray3d::new(Vec3::ZERO, Dir3::NEG_Z);
        let distance = Field::Sphere(1.0).cast_ray(&transform, ray, 100.0);
        assert!(distance.is_some_and(|d| (d - 8.0).abs() < 0.01));
    }

    #[test]
    fn layer_masks() {
        assert!(LayerMask::ALL.intersects(LayerMask::layer(3)));
        assert!(!LayerMask::layer(1).intersects(LayerMask::layer(2)));
        assert!(!LayerMask::NONE.intersects(LayerMask::ALL));
    }
}
