// Pod mirrors of the WGSL-side structs. Layouts are hand-padded to WGSL
// uniform/storage rules; not using glam here so the byte layout stays explicit.
use bytemuck::{Pod, Zeroable};

use crate::colliders::{BoxCollider, CapsuleCollider, SphereCollider};
use crate::params::SimulationParameters;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuSimParams {
    pub max_particles: u32,
    pub num_particles: u32,
    pub timestep: f32,
    pub smoothing_length: f32,

    pub smoothing_length_sq: f32,
    pub inv_smoothing_length: f32,
    pub rest_density: f32,
    pub artificial_viscosity: f32,

    pub velocity_limit: f32,
    pub eos_stiffness: f32,
    pub eos_exponent: f32,
    pub boundary_stiffness: f32,

    pub boundary_dampening: f32,
    pub enable_box: u32,
    pub num_cells: u32,
    pub _pad0: u32,

    pub gravity: [f32; 3],
    pub _pad1: f32,
    pub world_origin: [f32; 3],
    pub _pad2: f32,
    pub cell_size: [f32; 3],
    pub _pad3: f32,
    pub box_size: [f32; 3],
    pub _pad4: f32,

    pub grid_size: [u32; 3],
    pub num_sphere_colliders: u32,

    pub num_capsule_colliders: u32,
    pub num_box_colliders: u32,
    pub coeff_weighted_volume: f32,
    pub coeff_density: f32,

    pub coeff_pressure: f32,
    pub coeff_viscosity: f32,
    pub coeff_cs_kernel: f32,
    pub coeff_cs_gradient: f32,
}

impl From<&SimulationParameters> for GpuSimParams {
    fn from(p: &SimulationParameters) -> Self {
        Self {
            max_particles: p.max_particles,
            num_particles: p.num_particles,
            timestep: p.timestep,
            smoothing_length: p.smoothing_length,
            smoothing_length_sq: p.smoothing_length_sq,
            inv_smoothing_length: p.inv_smoothing_length,
            rest_density: p.rest_density,
            artificial_viscosity: p.artificial_viscosity,
            velocity_limit: p.velocity_limit,
            eos_stiffness: p.eos_stiffness,
            eos_exponent: p.eos_exponent,
            boundary_stiffness: p.boundary_stiffness,
            boundary_dampening: p.boundary_dampening,
            enable_box: p.enable_box as u32,
            num_cells: p.num_cells,
            _pad0: 0,
            gravity: p.gravity.to_array(),
            _pad1: 0.0,
            world_origin: p.world_origin.to_array(),
            _pad2: 0.0,
            cell_size: p.cell_size.to_array(),
            _pad3: 0.0,
            box_size: p.box_size.to_array(),
            _pad4: 0.0,
            grid_size: p.grid_size.to_array(),
            num_sphere_colliders: p.num_sphere_colliders,
            num_capsule_colliders: p.num_capsule_colliders,
            num_box_colliders: p.num_box_colliders,
            coeff_weighted_volume: p.coeff_weighted_volume,
            coeff_density: p.coeff_density,
            coeff_pressure: p.coeff_pressure,
            coeff_viscosity: p.coeff_viscosity,
            coeff_cs_kernel: p.coeff_cs_kernel,
            coeff_cs_gradient: p.coeff_cs_gradient,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuCell {
    pub begin: u32,
    pub end: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuAabb {
    pub center: [f32; 3],
    pub _pad0: f32,
    pub extents: [f32; 3],
    pub _pad1: f32,
}

impl From<crate::colliders::Aabb> for GpuAabb {
    fn from(a: crate::colliders::Aabb) -> Self {
        Self {
            center: a.center.to_array(),
            _pad0: 0.0,
            extents: a.extents.to_array(),
            _pad1: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuSphereCollider {
    pub aabb: GpuAabb,
    pub center: [f32; 3],
    pub radius: f32,
}

impl From<&SphereCollider> for GpuSphereCollider {
    fn from(c: &SphereCollider) -> Self {
        Self {
            aabb: c.aabb.into(),
            center: c.shape.center.to_array(),
            radius: c.shape.radius,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuCapsuleCollider {
    pub aabb: GpuAabb,
    pub pos1: [f32; 3],
    pub radius: f32,
    pub pos2: [f32; 3],
    pub _pad0: f32,
}

impl From<&CapsuleCollider> for GpuCapsuleCollider {
    fn from(c: &CapsuleCollider) -> Self {
        Self {
            aabb: c.aabb.into(),
            pos1: c.shape.pos1.to_array(),
            radius: c.shape.radius,
            pos2: c.shape.pos2.to_array(),
            _pad0: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuPlane {
    pub normal: [f32; 3],
    pub distance: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuBoxCollider {
    pub aabb: GpuAabb,
    pub center: [f32; 3],
    pub _pad0: f32,
    pub planes: [GpuPlane; 6],
}

impl From<&BoxCollider> for GpuBoxCollider {
    fn from(c: &BoxCollider) -> Self {
        let mut planes = [GpuPlane { normal: [0.0; 3], distance: 0.0 }; 6];
        for (dst, src) in planes.iter_mut().zip(c.shape.planes.iter()) {
            *dst = GpuPlane {
                normal: src.normal.to_array(),
                distance: src.distance,
            };
        }
        Self {
            aabb: c.aabb.into(),
            center: c.shape.center.to_array(),
            _pad0: 0.0,
            planes,
        }
    }
}

/// Bitonic compare-exchange pass parameters, one uniform slot per pass
/// (bound with a dynamic offset).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuSortPassParams {
    pub k: u32,
    pub j: u32,
    pub count: u32,
    pub _pad: u32,
}
