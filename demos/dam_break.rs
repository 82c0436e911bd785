use bevy::prelude::*;
use bevy_gpu_wcsph::colliders::SceneTransform;
use glam::Vec3;
use bevy_gpu_wcsph::cpu::wcsph3d::{ParticleAttributes, WcsphSimulation};
use bevy_gpu_wcsph::params::SimulationConfig;
use bevy_gpu_wcsph::{ColliderSource, ColliderSources, SimulationRegistry, WcsphPlugin};

const SPACING: f32 = 0.1;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(SimulationConfig {
            enable_box: true,
            world_origin: Vec3::splat(3.0),
            box_size: Vec3::new(3.0, 3.0, 3.0),
            ..SimulationConfig::default()
        })
        .add_plugins(WcsphPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, report)
        .run();
}

fn setup(
    mut commands: Commands,
    mut registry: ResMut<SimulationRegistry>,
    mut sources: ResMut<ColliderSources>,
    config: Res<SimulationConfig>,
) {
    commands.spawn(Camera3d::default());

    let mut sim = WcsphSimulation::new(config.clone());
    let mass = config.rest_density * SPACING * SPACING * SPACING;
    // water column in one corner of the container
    for x in 0..15 {
        for y in 0..25 {
            for z in 0..15 {
                sim.insert_particle(
                    Vec3::new(1.0, 1.0, 1.0)
                        + Vec3::new(x as f32, y as f32, z as f32) * SPACING,
                    Vec3::ZERO,
                    Vec3::ZERO,
                    ParticleAttributes::fluid(SPACING * 0.5, mass),
                );
            }
        }
    }
    registry.register(sim);

    // obstacle in the middle of the floor
    sources.0.push(ColliderSource::Sphere {
        transform: SceneTransform::from_position(Vec3::new(3.0, 0.5, 3.0)),
        radius: 0.6,
    });
}

fn report(registry: Res<SimulationRegistry>, time: Res<Time>, mut elapsed: Local<f32>) {
    *elapsed += time.delta_secs();
    if *elapsed >= 1.0 {
        *elapsed = 0.0;
        if let Some(sim) = registry.iter_active().next() {
            info!("{} particles live", sim.live_particle_count());
        }
    }
}
