use bevy_gpu_wcsph::ColliderSource;
use bevy_gpu_wcsph::colliders::{CapsuleAxis, SceneTransform, build_sphere_collider};
use bevy_gpu_wcsph::cpu::grid3d::{cell_coord, cell_hash};
use bevy_gpu_wcsph::cpu::wcsph3d::{ParticleAttributes, WcsphSimulation};
use bevy_gpu_wcsph::emitter::BlockEmitter;
use bevy_gpu_wcsph::kernels::KernelPoly6;
use bevy_gpu_wcsph::params::SimulationConfig;
use glam::{UVec3, Vec3};

fn quiet_config() -> SimulationConfig {
    SimulationConfig {
        gravity: Vec3::ZERO,
        ..SimulationConfig::default()
    }
}

fn no_colliders(_: &mut dyn bevy_gpu_wcsph::colliders::ColliderSink) {}

#[test]
fn insertions_stage_until_the_next_sub_step() {
    let mut sim = WcsphSimulation::new(quiet_config());
    for i in 0..3 {
        let ok = sim.insert_particle(
            Vec3::new(2.0 + i as f32 * 0.1, 2.0, 2.0),
            Vec3::ZERO,
            Vec3::ZERO,
            ParticleAttributes::fluid(0.05, 0.01),
        );
        assert!(ok);
    }
    assert_eq!(sim.staged_insertion_count(), 3);
    assert_eq!(sim.live_particle_count(), 0);

    sim.run_sub_step(0.005, &mut no_colliders);
    assert_eq!(sim.staged_insertion_count(), 0);
    assert_eq!(sim.live_particle_count(), 3);
}

#[test]
fn insertions_beyond_capacity_are_rejected() {
    let config = SimulationConfig {
        max_particles: 4,
        ..quiet_config()
    };
    let mut sim = WcsphSimulation::new(config);
    let mut accepted = 0;
    for i in 0..6 {
        if sim.insert_particle(
            Vec3::new(2.0 + i as f32 * 0.1, 2.0, 2.0),
            Vec3::ZERO,
            Vec3::ZERO,
            ParticleAttributes::fluid(0.05, 0.01),
        ) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 4);

    sim.run_sub_step(0.005, &mut no_colliders);
    assert_eq!(sim.live_particle_count(), 4);

    // still full afterwards
    assert!(!sim.insert_particle(
        Vec3::splat(2.0),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    ));
}

#[test]
fn single_particle_free_fall() {
    let config = SimulationConfig {
        gravity: Vec3::new(0.0, -9.81, 0.0),
        ..SimulationConfig::default()
    };
    let mut sim = WcsphSimulation::new(config);
    let p0 = Vec3::new(5.0, 5.0, 5.0);
    sim.insert_particle(p0, Vec3::ZERO, Vec3::ZERO, ParticleAttributes::fluid(0.05, 0.01));

    let dt = 0.01;
    sim.run_sub_step(dt, &mut no_colliders);

    let vel = sim.vel_rho()[0].truncate();
    let pos = sim.pos_press()[0].truncate();
    let g = Vec3::new(0.0, -9.81, 0.0);
    assert!((vel - g * dt).length() < 1e-5, "vel = {vel}");
    assert!((pos - (p0 + g * dt * dt)).length() < 1e-5, "pos = {pos}");
}

#[test]
fn isolated_particles_see_only_themselves() {
    // cell width 2h = 1.0 on a 4^3 grid; the two particles sit in
    // non-adjacent cells, so each density sum has exactly one term
    let config = SimulationConfig {
        smoothing_length: 0.5,
        grid_size: UVec3::new(4, 4, 4),
        world_origin: Vec3::ZERO,
        ..quiet_config()
    };
    let mass = 0.02;
    let mut sim = WcsphSimulation::new(config);
    sim.insert_particle(
        Vec3::splat(0.5),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, mass),
    );
    sim.insert_particle(
        Vec3::splat(3.5),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, mass),
    );
    sim.run_sub_step(0.005, &mut no_colliders);

    let params = *sim.params();
    let hash_a = cell_hash(cell_coord(Vec3::splat(0.5), &params), params.grid_size);
    let hash_b = cell_hash(cell_coord(Vec3::splat(3.5), &params), params.grid_size);
    assert_ne!(hash_a, hash_b);
    assert_eq!(sim.grid().cell(hash_a).len(), 1);
    assert_eq!(sim.grid().cell(hash_b).len(), 1);

    let expected = mass * KernelPoly6::evaluate(0.5, 0.0);
    for v in sim.vel_rho() {
        assert!((v.w - expected).abs() / expected < 1e-4, "density = {}", v.w);
    }
    // far below rest density, so the clamped equation of state reports zero
    for p in sim.pos_press() {
        assert_eq!(p.w, 0.0);
    }
}

#[test]
fn velocity_limit_caps_speed() {
    let config = SimulationConfig {
        gravity: Vec3::new(0.0, -2000.0, 0.0),
        velocity_limit: 1.0,
        ..SimulationConfig::default()
    };
    let mut sim = WcsphSimulation::new(config);
    sim.insert_particle(
        Vec3::splat(10.0),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    );
    sim.step(&mut |_| {});

    let speed = sim.vel_rho()[0].truncate().length();
    assert!(speed <= 1.0 + 1e-5, "speed = {speed}");
}

#[test]
fn box_container_confines_particles() {
    let config = SimulationConfig {
        gravity: Vec3::new(0.0, -9.81, 0.0),
        enable_box: true,
        world_origin: Vec3::splat(2.0),
        box_size: Vec3::ONE,
        ..SimulationConfig::default()
    };
    let mut sim = WcsphSimulation::new(config);
    sim.insert_particle(
        Vec3::splat(2.0),
        Vec3::new(0.0, -5.0, 0.0),
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    );
    for _ in 0..20 {
        sim.step(&mut |_| {});
    }
    let pos = sim.pos_press()[0].truncate();
    for axis in 0..3 {
        assert!(pos[axis] >= 1.0 - 1e-4 && pos[axis] <= 3.0 + 1e-4, "pos = {pos}");
    }
}

#[test]
fn custom_equation_of_state_is_used() {
    let mut sim = WcsphSimulation::new(quiet_config());
    sim.set_equation_of_state(|_, _| 123.0);
    sim.insert_particle(
        Vec3::splat(2.0),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    );
    sim.run_sub_step(0.005, &mut no_colliders);
    assert_eq!(sim.pos_press()[0].w, 123.0);
}

#[test]
fn sphere_collider_pushes_particles_out() {
    let mut sim = WcsphSimulation::new(quiet_config());
    sim.insert_particle(
        Vec3::splat(2.0),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    );
    // collider centered just below the particle, deep overlap
    let collider =
        build_sphere_collider(&SceneTransform::from_position(Vec3::new(2.0, 1.8, 2.0)), 0.5);
    sim.run_sub_step(0.005, &mut |sink| sink.add_sphere_collider(collider));

    assert_eq!(sim.colliders().spheres().len(), 1);
    let vel = sim.vel_rho()[0].truncate();
    assert!(vel.y > 0.0, "expected upward push, vel = {vel}");
    assert!(vel.x.abs() < 1e-5 && vel.z.abs() < 1e-5);
}

#[test]
fn colliders_are_rebuilt_every_sub_step() {
    let config = SimulationConfig {
        sub_iterations: 4,
        ..quiet_config()
    };
    let mut sim = WcsphSimulation::new(config);
    sim.insert_particle(
        Vec3::splat(2.0),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    );
    let collider = build_sphere_collider(&SceneTransform::from_position(Vec3::splat(8.0)), 0.2);
    let mut calls = 0;
    sim.step(&mut |sink| {
        calls += 1;
        sink.add_sphere_collider(collider);
    });
    assert_eq!(calls, 4);
    assert_eq!(sim.colliders().spheres().len(), 1); // overwritten, not appended
}

#[test]
fn collider_sources_feed_every_shape_kind() {
    let mut sim = WcsphSimulation::new(quiet_config());
    sim.insert_particle(
        Vec3::splat(2.0),
        Vec3::ZERO,
        Vec3::ZERO,
        ParticleAttributes::fluid(0.05, 0.01),
    );
    let sources = [
        ColliderSource::Sphere {
            transform: SceneTransform::from_position(Vec3::splat(8.0)),
            radius: 0.2,
        },
        ColliderSource::Capsule {
            transform: SceneTransform::from_position(Vec3::splat(9.0)),
            radius: 0.2,
            length: 1.0,
            axis: CapsuleAxis::Y,
        },
        ColliderSource::Box {
            transform: SceneTransform::from_position(Vec3::splat(10.0)),
            size: Vec3::ONE,
        },
    ];
    sim.step(&mut |sink| {
        for source in &sources {
            source.push_to(sink);
        }
    });
    assert_eq!(sim.colliders().spheres().len(), 1);
    assert_eq!(sim.colliders().capsules().len(), 1);
    assert_eq!(sim.colliders().boxes().len(), 1);
}

#[test]
fn emitter_stages_one_block_per_interval() {
    let mut sim = WcsphSimulation::new(quiet_config());
    let mut emitter =
        BlockEmitter::new(Vec3::splat(4.0), Vec3::new(0.0, -1.0, 0.0), 0.05, 0.01, 1.0);

    assert_eq!(emitter.update(0.5, &mut sim), 0);
    let first = emitter.update(0.6, &mut sim);
    assert!(first > 0);
    assert_eq!(sim.staged_insertion_count(), first);

    // two intervals elapse at once
    let second = emitter.update(2.0, &mut sim);
    assert_eq!(second, first * 2);
}

#[test]
fn emitter_with_zero_interval_stays_idle() {
    let mut sim = WcsphSimulation::new(quiet_config());
    let mut emitter =
        BlockEmitter::new(Vec3::splat(4.0), Vec3::new(0.0, -1.0, 0.0), 0.05, 0.01, 0.0);

    assert_eq!(emitter.update(1.0, &mut sim), 0);
    assert_eq!(sim.staged_insertion_count(), 0);

    // a negative interval is treated the same way
    emitter.interval = -0.5;
    assert_eq!(emitter.update(1.0, &mut sim), 0);
}
