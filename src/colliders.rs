// Analytic collider primitives: world-space implicit shapes plus a broad-phase
// AABB, rebuilt from scene transforms once per sub-step and consumed by the
// boundary-force stage.
use glam::{Mat4, Quat, Vec3};

/// Stand-in for a resolved scene-graph transform (position, rotation,
/// non-uniform scale).
#[derive(Clone, Copy, Debug)]
pub struct SceneTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl SceneTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self { position, ..Self::IDENTITY }
    }

    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Aabb {
    pub center: Vec3,
    pub extents: Vec3,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Capsule {
    pub pos1: Vec3,
    pub pos2: Vec3,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

/// Oriented box as six half-space planes around a stored center. Plane
/// distances are center-relative: the corner cloud is rotated and scaled with
/// no translation, translation lives only in `center`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxShape {
    pub center: Vec3,
    pub planes: [Plane; 6],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SphereCollider {
    pub aabb: Aabb,
    pub shape: Sphere,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CapsuleCollider {
    pub aabb: Aabb,
    pub shape: Capsule,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BoxCollider {
    pub aabb: Aabb,
    pub shape: BoxShape,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapsuleAxis {
    X,
    Y,
    Z,
}

/// Consumer of freshly built collider shapes. Implemented by every simulation;
/// sources broadcast through the registry, never through hidden globals.
pub trait ColliderSink {
    fn add_sphere_collider(&mut self, collider: SphereCollider);
    fn add_capsule_collider(&mut self, collider: CapsuleCollider);
    fn add_box_collider(&mut self, collider: BoxCollider);
}

// Non-uniform scale on spheres is unsupported; only scale.x is honored,
// matching the capsule radius convention.
pub fn build_sphere_collider(t: &SceneTransform, radius: f32) -> SphereCollider {
    let r = radius * t.scale.x;
    SphereCollider {
        shape: Sphere { center: t.position, radius: r },
        aabb: Aabb { center: t.position, extents: Vec3::splat(r) },
    }
}

pub fn build_capsule_collider(
    t: &SceneTransform,
    radius: f32,
    length: f32,
    axis: CapsuleAxis,
) -> CapsuleCollider {
    let h = (length - 2.0 * radius).max(0.0);
    let r = radius * t.scale.x;
    let e = match axis {
        CapsuleAxis::X => Vec3::new(h * 0.5, 0.0, 0.0),
        CapsuleAxis::Y => Vec3::new(0.0, h * 0.5, 0.0),
        CapsuleAxis::Z => Vec3::new(0.0, 0.0, h * 0.5),
    };
    let mat = t.to_matrix();
    CapsuleCollider {
        shape: Capsule {
            pos1: mat.transform_point3(e),
            pos2: mat.transform_point3(-e),
            radius: r,
        },
        // conservative, not tight
        aabb: Aabb { center: t.position, extents: Vec3::splat(r + h) },
    }
}

/// Derives the six face planes of a box under an arbitrary affine matrix
/// (shear included). Corners are transformed with w = 0, so the planes stay
/// center-relative while `center` carries the translation column.
pub fn build_box(mat: &Mat4, size: Vec3) -> BoxShape {
    let s = 0.5 * size;
    let corners = [
        Vec3::new(s.x, s.y, s.z),
        Vec3::new(-s.x, s.y, s.z),
        Vec3::new(-s.x, -s.y, s.z),
        Vec3::new(s.x, -s.y, s.z),
        Vec3::new(s.x, s.y, -s.z),
        Vec3::new(-s.x, s.y, -s.z),
        Vec3::new(-s.x, -s.y, -s.z),
        Vec3::new(s.x, -s.y, -s.z),
    ]
    .map(|v| mat.transform_vector3(v));

    let normals = [
        (corners[3] - corners[0]).cross(corners[4] - corners[0]).normalize(),
        (corners[5] - corners[1]).cross(corners[2] - corners[1]).normalize(),
        (corners[7] - corners[3]).cross(corners[2] - corners[3]).normalize(),
        (corners[1] - corners[0]).cross(corners[4] - corners[0]).normalize(),
        (corners[1] - corners[0]).cross(corners[3] - corners[0]).normalize(),
        (corners[7] - corners[4]).cross(corners[5] - corners[4]).normalize(),
    ];
    let anchors = [
        corners[0], corners[1], corners[0], corners[3], corners[0], corners[4],
    ];

    let mut planes = [Plane::default(); 6];
    for i in 0..6 {
        planes[i] = Plane {
            normal: normals[i],
            distance: -anchors[i].dot(normals[i]),
        };
    }

    BoxShape {
        center: mat.col(3).truncate(),
        planes,
    }
}

pub fn build_box_collider(t: &SceneTransform, size: Vec3) -> BoxCollider {
    let shape = build_box(&t.to_matrix(), size);
    let scaled = size * t.scale;
    let s = scaled.x.max(scaled.y).max(scaled.z);
    BoxCollider {
        shape,
        // loose isotropic bound to keep the broad-phase test branch-free
        aabb: Aabb { center: t.position, extents: Vec3::splat(s * 1.415) },
    }
}

impl Sphere {
    /// Signed distance to the surface (negative inside) and outward normal.
    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> (f32, Vec3) {
        let d = p - self.center;
        let len = d.length();
        let normal = if len > 1e-6 { d / len } else { Vec3::Y };
        (len - self.radius, normal)
    }
}

impl Capsule {
    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> (f32, Vec3) {
        let axis = self.pos2 - self.pos1;
        let len_sq = axis.length_squared();
        let t = if len_sq > 1e-12 {
            ((p - self.pos1).dot(axis) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = self.pos1 + axis * t;
        let d = p - closest;
        let len = d.length();
        let normal = if len > 1e-6 { d / len } else { Vec3::Y };
        (len - self.radius, normal)
    }
}

impl BoxShape {
    /// Signed distance of the nearest face plane (negative inside all six)
    /// and that plane's outward normal. Positive for points outside, measured
    /// against the most separating plane.
    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> (f32, Vec3) {
        let rel = p - self.center;
        let mut best = f32::NEG_INFINITY;
        let mut normal = Vec3::Y;
        for plane in &self.planes {
            let d = plane.normal.dot(rel) + plane.distance;
            if d > best {
                best = d;
                normal = plane.normal;
            }
        }
        (best, normal)
    }
}

impl Aabb {
    /// Broad-phase test: sphere of `radius` around `p` against the box.
    #[inline]
    pub fn overlaps_sphere(&self, p: Vec3, radius: f32) -> bool {
        let d = (p - self.center).abs() - (self.extents + Vec3::splat(radius));
        d.x <= 0.0 && d.y <= 0.0 && d.z <= 0.0
    }
}
