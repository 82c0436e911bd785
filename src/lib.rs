use bevy::prelude::*;
// shadows the prelude's re-exported Vec3 so collider sources share the
// simulation's glam types
use glam::Vec3;

pub mod colliders;
pub mod emitter;
pub mod kernels;
pub mod params;
pub mod sort;

pub mod cpu {
    pub mod grid3d;
    pub mod wcsph3d;
}

pub mod gpu {
    pub mod buffers;
    pub mod ffi;
    pub mod pipeline;
    pub mod sort;
}

use colliders::{
    CapsuleAxis, ColliderSink, SceneTransform, build_box_collider, build_capsule_collider,
    build_sphere_collider,
};
use cpu::wcsph3d::WcsphSimulation;
use params::SimulationConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SimulationHandle(usize);

/// Explicit registry of live simulation instances, owned by the host driver.
/// Collider sources broadcast through `for_each_active`; there is no hidden
/// global instance list.
#[derive(Resource, Default)]
pub struct SimulationRegistry {
    slots: Vec<Option<WcsphSimulation>>,
}

impl SimulationRegistry {
    pub fn register(&mut self, sim: WcsphSimulation) -> SimulationHandle {
        if let Some(free) = self.slots.iter().position(Option::is_none) {
            self.slots[free] = Some(sim);
            return SimulationHandle(free);
        }
        self.slots.push(Some(sim));
        SimulationHandle(self.slots.len() - 1)
    }

    pub fn unregister(&mut self, handle: SimulationHandle) -> Option<WcsphSimulation> {
        self.slots.get_mut(handle.0).and_then(Option::take)
    }

    pub fn get(&self, handle: SimulationHandle) -> Option<&WcsphSimulation> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: SimulationHandle) -> Option<&mut WcsphSimulation> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &WcsphSimulation> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn for_each_active(&mut self, mut f: impl FnMut(&mut WcsphSimulation)) {
        for slot in self.slots.iter_mut().flatten() {
            f(slot);
        }
    }
}

/// One scene collider feeding the simulations. Sources are enumerated every
/// sub-step and rebuilt into world-space shapes; nothing is cached across
/// steps.
#[derive(Clone, Copy, Debug)]
pub enum ColliderSource {
    Sphere {
        transform: SceneTransform,
        radius: f32,
    },
    Capsule {
        transform: SceneTransform,
        radius: f32,
        length: f32,
        axis: CapsuleAxis,
    },
    Box {
        transform: SceneTransform,
        size: Vec3,
    },
}

impl ColliderSource {
    pub fn push_to(&self, sink: &mut dyn ColliderSink) {
        match self {
            Self::Sphere { transform, radius } => {
                sink.add_sphere_collider(build_sphere_collider(transform, *radius));
            }
            Self::Capsule { transform, radius, length, axis } => {
                sink.add_capsule_collider(build_capsule_collider(transform, *radius, *length, *axis));
            }
            Self::Box { transform, size } => {
                sink.add_box_collider(build_box_collider(transform, *size));
            }
        }
    }
}

#[derive(Resource, Default)]
pub struct ColliderSources(pub Vec<ColliderSource>);

/// Host driver: steps every registered simulation from the fixed-timestep
/// schedule, feeding it the current frame's collider shapes.
pub struct WcsphPlugin;

impl Plugin for WcsphPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimulationRegistry>()
            .init_resource::<ColliderSources>();
        if app.world().get_resource::<SimulationConfig>().is_none() {
            app.insert_resource(SimulationConfig::default());
        }
        app.add_systems(FixedUpdate, step_simulations);

        // headless hosts run the reference simulation only
        if app.get_sub_app(bevy::render::RenderApp).is_some() {
            app.add_plugins(gpu::buffers::GpuWcsphPlugin);
        }
    }
}

fn step_simulations(sources: Res<ColliderSources>, mut registry: ResMut<SimulationRegistry>) {
    registry.for_each_active(|sim| {
        sim.step(&mut |sink| {
            for source in &sources.0 {
                source.push_to(sink);
            }
        });
    });
}
