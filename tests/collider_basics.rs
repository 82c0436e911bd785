use bevy_gpu_wcsph::colliders::{
    CapsuleAxis, SceneTransform, build_box, build_box_collider, build_capsule_collider,
    build_sphere_collider,
};
use glam::{Quat, Vec3};

const EPS: f32 = 1e-4;

#[test]
fn sphere_honors_scale_x() {
    let t = SceneTransform {
        position: Vec3::new(1.0, 2.0, 3.0),
        rotation: Quat::IDENTITY,
        scale: Vec3::new(2.0, 5.0, 9.0), // only x matters
    };
    let c = build_sphere_collider(&t, 0.5);
    assert_eq!(c.shape.radius, 1.0);
    assert_eq!(c.shape.center, t.position);
    assert_eq!(c.aabb.extents, Vec3::splat(1.0));

    let (sd, normal) = c.shape.signed_distance(t.position + Vec3::X * 1.0);
    assert!(sd.abs() < EPS); // on the surface
    assert!((normal - Vec3::X).length() < EPS);
    let (inside, _) = c.shape.signed_distance(t.position);
    assert!(inside < 0.0);
}

#[test]
fn capsule_endpoints_follow_axis_and_transform() {
    let t = SceneTransform::from_position(Vec3::new(0.0, 1.0, 0.0));
    let c = build_capsule_collider(&t, 0.25, 2.0, CapsuleAxis::Y);
    // half segment = (length - 2 radius) / 2 = 0.75
    assert!((c.shape.pos1 - Vec3::new(0.0, 1.75, 0.0)).length() < EPS);
    assert!((c.shape.pos2 - Vec3::new(0.0, 0.25, 0.0)).length() < EPS);
    assert_eq!(c.shape.radius, 0.25);

    // on the lateral surface at the segment midpoint
    let (sd, normal) = c.shape.signed_distance(Vec3::new(0.25, 1.0, 0.0));
    assert!(sd.abs() < EPS);
    assert!((normal - Vec3::X).length() < EPS);

    // beyond an endcap the distance is measured from the endpoint
    let (sd, _) = c.shape.signed_distance(Vec3::new(0.0, 2.5, 0.0));
    assert!((sd - 0.5).abs() < EPS);
}

#[test]
fn capsule_shorter_than_diameter_degenerates_to_sphere() {
    let t = SceneTransform::IDENTITY;
    let c = build_capsule_collider(&t, 0.5, 0.4, CapsuleAxis::X);
    assert!((c.shape.pos1 - c.shape.pos2).length() < EPS);
}

#[test]
fn box_planes_face_outward() {
    let t = SceneTransform::IDENTITY;
    let shape = build_box(&t.to_matrix(), Vec3::ONE);

    // center is inside all six planes
    let (sd, _) = shape.signed_distance(Vec3::ZERO);
    assert!((sd + 0.5).abs() < EPS);

    // face centers sit exactly on the surface
    for face in [
        Vec3::X * 0.5,
        -Vec3::X * 0.5,
        Vec3::Y * 0.5,
        -Vec3::Y * 0.5,
        Vec3::Z * 0.5,
        -Vec3::Z * 0.5,
    ] {
        let (sd, normal) = shape.signed_distance(face);
        assert!(sd.abs() < EPS, "face {face} sd = {sd}");
        assert!((normal - face.normalize()).length() < EPS, "face {face} normal {normal}");
    }

    // every corner satisfies every plane
    for sx in [-0.5, 0.5] {
        for sy in [-0.5, 0.5] {
            for sz in [-0.5, 0.5] {
                let corner = Vec3::new(sx, sy, sz);
                for plane in &shape.planes {
                    let d = plane.normal.dot(corner) + plane.distance;
                    assert!(d <= EPS, "corner {corner} outside plane ({d})");
                }
            }
        }
    }
}

#[test]
fn box_translation_lives_in_center_only() {
    let t = SceneTransform::from_position(Vec3::new(3.0, 0.0, 0.0));
    let shape = build_box(&t.to_matrix(), Vec3::ONE);
    assert!((shape.center - Vec3::new(3.0, 0.0, 0.0)).length() < EPS);

    // plane distances stay center-relative
    let (sd, _) = shape.signed_distance(Vec3::new(3.0, 0.0, 0.0));
    assert!((sd + 0.5).abs() < EPS);
    let (sd, normal) = shape.signed_distance(Vec3::new(3.5, 0.0, 0.0));
    assert!(sd.abs() < EPS);
    assert!((normal - Vec3::X).length() < EPS);
}

#[test]
fn rotated_box_rotates_normals() {
    let t = SceneTransform {
        position: Vec3::ZERO,
        rotation: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        scale: Vec3::ONE,
    };
    let shape = build_box(&t.to_matrix(), Vec3::new(2.0, 1.0, 1.0));
    // the long axis now points along y
    let (sd, _) = shape.signed_distance(Vec3::new(0.0, 1.0, 0.0));
    assert!(sd.abs() < 1e-3);
    let (sd, _) = shape.signed_distance(Vec3::new(1.0, 0.0, 0.0));
    assert!((sd - 0.5).abs() < 1e-3);
}

#[test]
fn box_collider_aabb_is_isotropic_and_loose() {
    let t = SceneTransform::IDENTITY;
    let c = build_box_collider(&t, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(c.aabb.extents, Vec3::splat(3.0 * 1.415));
    assert_eq!(c.aabb.center, Vec3::ZERO);
}

#[test]
fn aabb_broad_phase_inflates_by_particle_radius() {
    let c = build_sphere_collider(&SceneTransform::IDENTITY, 1.0);
    assert!(c.aabb.overlaps_sphere(Vec3::new(1.05, 0.0, 0.0), 0.1));
    assert!(!c.aabb.overlaps_sphere(Vec3::new(1.2, 0.0, 0.0), 0.1));
    assert!(c.aabb.overlaps_sphere(Vec3::ZERO, 0.0));
}
