use bevy::prelude::Resource;
use glam::{UVec3, Vec3};

use crate::kernels::{KernelCubicSpline, KernelM4, KernelPoly6, KernelSpiky, KernelViscosity};

/// User-facing configuration. Derived quantities (cell size, cell count,
/// kernel coefficients) are recomputed from this every sub-step and never
/// edited directly.
#[derive(Resource, Clone, Debug)]
pub struct SimulationConfig {
    pub max_particles: usize,
    pub sub_iterations: u32,
    pub fixed_timestep: f32,
    pub smoothing_length: f32,
    pub rest_density: f32,
    pub artificial_viscosity: f32,
    pub velocity_limit: f32,
    pub gravity: Vec3,
    pub world_origin: Vec3,
    pub grid_size: UVec3,
    pub box_size: Vec3,
    pub enable_box: bool,
    pub eos_stiffness: f32,
    pub eos_exponent: f32,
    pub boundary_stiffness: f32,
    pub boundary_dampening: f32,
    pub max_sphere_colliders: usize,
    pub max_capsule_colliders: usize,
    pub max_box_colliders: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_particles: 100_000,
            sub_iterations: 10,
            fixed_timestep: 0.05,
            smoothing_length: 0.228,
            rest_density: 1000.0,
            artificial_viscosity: 1.0,
            velocity_limit: 20.0,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            world_origin: Vec3::ZERO,
            grid_size: UVec3::new(64, 64, 64),
            box_size: Vec3::new(5.0, 5.0, 5.0),
            enable_box: false,
            eos_stiffness: 200.0,
            eos_exponent: 7.0,
            boundary_stiffness: 30_000.0,
            boundary_dampening: 128.0,
            max_sphere_colliders: 256,
            max_capsule_colliders: 256,
            max_box_colliders: 256,
        }
    }
}

/// Per-sub-step snapshot handed to every stage (and uploaded to the GPU
/// mirror). One instance, value type.
#[derive(Clone, Copy, Debug)]
pub struct SimulationParameters {
    pub max_particles: u32,
    pub num_particles: u32,
    pub timestep: f32,
    pub smoothing_length: f32,
    pub smoothing_length_sq: f32,
    pub inv_smoothing_length: f32,
    pub rest_density: f32,
    pub artificial_viscosity: f32,
    pub velocity_limit: f32,
    pub gravity: Vec3,
    pub world_origin: Vec3,
    pub cell_size: Vec3,
    pub grid_size: UVec3,
    pub box_size: Vec3,
    pub enable_box: bool,
    pub num_cells: u32,
    pub eos_stiffness: f32,
    pub eos_exponent: f32,
    pub boundary_stiffness: f32,
    pub boundary_dampening: f32,

    pub num_sphere_colliders: u32,
    pub num_capsule_colliders: u32,
    pub num_box_colliders: u32,

    // kernel coefficients cached once per smoothing-length change
    pub coeff_weighted_volume: f32,
    pub coeff_density: f32,
    pub coeff_pressure: f32,
    pub coeff_viscosity: f32,
    pub coeff_cs_kernel: f32,
    pub coeff_cs_gradient: f32,
}

impl SimulationParameters {
    pub fn derive(config: &SimulationConfig, num_particles: u32, timestep: f32) -> Self {
        let h = config.smoothing_length;
        let cell_width = 2.0 * h;
        let grid = config.grid_size;
        Self {
            max_particles: config.max_particles as u32,
            num_particles,
            timestep,
            smoothing_length: h,
            smoothing_length_sq: h * h,
            inv_smoothing_length: 1.0 / h,
            rest_density: config.rest_density,
            artificial_viscosity: config.artificial_viscosity,
            velocity_limit: config.velocity_limit,
            gravity: config.gravity,
            world_origin: config.world_origin,
            cell_size: Vec3::splat(cell_width),
            grid_size: grid,
            box_size: config.box_size,
            enable_box: config.enable_box,
            num_cells: grid.x * grid.y * grid.z,
            eos_stiffness: config.eos_stiffness,
            eos_exponent: config.eos_exponent,
            boundary_stiffness: config.boundary_stiffness,
            boundary_dampening: config.boundary_dampening,
            num_sphere_colliders: 0,
            num_capsule_colliders: 0,
            num_box_colliders: 0,
            coeff_weighted_volume: KernelM4::constant(h),
            coeff_density: KernelPoly6::constant(h),
            coeff_pressure: KernelSpiky::gradient_constant(h),
            coeff_viscosity: KernelViscosity::laplacian_constant(h),
            coeff_cs_kernel: KernelCubicSpline::constant(h),
            coeff_cs_gradient: KernelCubicSpline::gradient_constant(h),
        }
    }
}

/// Default weakly-compressible equation of state: Tait-like with configurable
/// stiffness and exponent, clamped so free surfaces never pull.
pub fn wcsph_eos(params: &SimulationParameters, density: f32) -> f32 {
    if density <= 0.0 {
        return 0.0;
    }
    let ratio = density / params.rest_density;
    (params.eos_stiffness * (ratio.powf(params.eos_exponent) - 1.0)).max(0.0)
}
