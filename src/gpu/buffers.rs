use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferInitDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::SimulationRegistry;
use crate::gpu::ffi::{
    GpuBoxCollider, GpuCapsuleCollider, GpuCell, GpuSimParams, GpuSphereCollider,
};
use crate::gpu::pipeline::{add_wcsph_node_to_graph, prepare_wcsph_pipelines};
use crate::gpu::sort::{init_sort_pass_params, prepare_sort_bind_group};
use crate::params::SimulationConfig;
use crate::sort::{SortPair, round_up_pow2};

// ==================== resources ======================================

/// Set once at startup after probing the device; every init/prepare system
/// bails when compute is unavailable (whole feature disabled, never partial).
#[derive(Resource, Clone, Copy, ExtractResource)]
pub struct ComputeSupport(pub bool);

#[derive(Resource)]
pub struct SimParamsBuffer {
    pub buffer: Buffer,
}

/// Double-buffered SoA particle state: slot 0 is the frame's source, slot 1
/// the cell-sorted working set the WCSPH stages read and write.
#[derive(Resource)]
pub struct ParticleBuffers {
    pub pos_press: [Buffer; 2],
    pub vel_rho: [Buffer; 2],
    pub force_vol: [Buffer; 2],
    pub tgrm: [Buffer; 2],
    pub vel_verlet: Buffer,
    pub max_particles: u32,
}

#[derive(Resource)]
pub struct GridBuffers {
    pub cells: Buffer,
    pub sort_data: Buffer,
    pub num_cells: u32,
    pub padded_pairs: u32,
}

#[derive(Resource)]
pub struct ColliderBuffers {
    pub spheres: Buffer,
    pub capsules: Buffer,
    pub boxes: Buffer,
}

// Render-world copies (Buffer is a cheap handle clone)
#[derive(Resource, Clone)]
pub struct ExtractedWcsphBuffers {
    pub params: Buffer,
    pub pos_press: [Buffer; 2],
    pub vel_rho: [Buffer; 2],
    pub force_vol: [Buffer; 2],
    pub tgrm: [Buffer; 2],
    pub vel_verlet: Buffer,
    pub cells: Buffer,
    pub sort_data: Buffer,
    pub spheres: Buffer,
    pub capsules: Buffer,
    pub boxes: Buffer,
}

/// Per-frame counts the dispatch node sizes its workgroups from.
#[derive(Resource, Clone, Copy)]
pub struct ExtractedSimState {
    pub num_particles: u32,
    pub num_cells: u32,
    pub padded_pairs: u32,
}

/// One bind group layout and bind group per compute entry point; every entry
/// point sees only the buffers it touches so the per-stage storage-buffer
/// limit is never exceeded.
#[derive(Resource, Clone)]
pub struct WcsphBindGroupLayouts {
    pub clear_cells: BindGroupLayout,
    pub hash_particles: BindGroupLayout,
    pub bin_cells: BindGroupLayout,
    pub scatter: BindGroupLayout,
    pub weighted_volume: BindGroupLayout,
    pub density_pressure: BindGroupLayout,
    pub force: BindGroupLayout,
    pub boundary_force: BindGroupLayout,
    pub integrate: BindGroupLayout,
    pub copy_back: BindGroupLayout,
}

#[derive(Resource)]
pub struct WcsphBindGroups {
    pub clear_cells: BindGroup,
    pub hash_particles: BindGroup,
    pub bin_cells: BindGroup,
    /// One scatter bind group per SoA array (pos_press, vel_rho, force_vol,
    /// tgrm), all sharing the generic scatter layout.
    pub scatter: [BindGroup; 4],
    pub weighted_volume: BindGroup,
    pub density_pressure: BindGroup,
    pub force: BindGroup,
    pub boundary_force: BindGroup,
    pub integrate: BindGroup,
    pub copy_back: BindGroup,
}

// =====================================================================

#[inline]
fn storage_entry(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[inline]
fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn vec4_buffer(rd: &RenderDevice, label: &str, count: usize) -> Buffer {
    rd.create_buffer(&BufferDescriptor {
        label: Some(label),
        size: (count.max(1) * std::mem::size_of::<[f32; 4]>()) as u64,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

// ========================== systems ==================================

// Startup systems (App world, run once)

fn probe_compute_support(mut commands: Commands, render_device: Res<RenderDevice>) {
    let limits = render_device.limits();
    let supported = limits.max_compute_workgroup_size_x >= 512
        && limits.max_compute_invocations_per_workgroup >= 512;
    if !supported {
        error!("compute shaders unavailable or too limited; GPU WCSPH mirror disabled");
    }
    commands.insert_resource(ComputeSupport(supported));
}

fn init_gpu_buffers(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    support: Res<ComputeSupport>,
    config: Res<SimulationConfig>,
) {
    if !support.0 {
        return;
    }
    let n = config.max_particles;
    let num_cells = (config.grid_size.x * config.grid_size.y * config.grid_size.z) as usize;
    let padded = round_up_pow2(n);

    let pair = |label: &str| {
        [
            vec4_buffer(&render_device, &format!("{label}_0"), n),
            vec4_buffer(&render_device, &format!("{label}_1"), n),
        ]
    };

    let params = GpuSimParams::from(&crate::params::SimulationParameters::derive(
        &config,
        0,
        config.fixed_timestep,
    ));
    let params_buf = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("wcsph_sim_params"),
        contents: bytemuck::bytes_of(&params),
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });

    let sort_data = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("wcsph_sort_data"),
        contents: bytemuck::cast_slice(&vec![SortPair::SENTINEL; padded]),
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
    });

    let cells = render_device.create_buffer(&BufferDescriptor {
        label: Some("wcsph_cells"),
        size: (num_cells.max(1) * std::mem::size_of::<GpuCell>()) as u64,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let collider_buf = |label: &str, stride: usize, count: usize| {
        render_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: (count.max(1) * stride) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    };

    commands.insert_resource(SimParamsBuffer { buffer: params_buf });
    commands.insert_resource(ParticleBuffers {
        pos_press: pair("wcsph_pos_press"),
        vel_rho: pair("wcsph_vel_rho"),
        force_vol: pair("wcsph_force_vol"),
        tgrm: pair("wcsph_tgrm"),
        vel_verlet: vec4_buffer(&render_device, "wcsph_vel_verlet", n),
        max_particles: n as u32,
    });
    commands.insert_resource(GridBuffers {
        cells,
        sort_data,
        num_cells: num_cells as u32,
        padded_pairs: padded as u32,
    });
    commands.insert_resource(ColliderBuffers {
        spheres: collider_buf(
            "wcsph_sphere_colliders",
            std::mem::size_of::<GpuSphereCollider>(),
            config.max_sphere_colliders,
        ),
        capsules: collider_buf(
            "wcsph_capsule_colliders",
            std::mem::size_of::<GpuCapsuleCollider>(),
            config.max_capsule_colliders,
        ),
        boxes: collider_buf(
            "wcsph_box_colliders",
            std::mem::size_of::<GpuBoxCollider>(),
            config.max_box_colliders,
        ),
    });
}

// Update systems (App world, per frame)

/// Uploads the reference simulation's current state so the GPU pipeline runs
/// the same sub-step the CPU just produced.
fn queue_wcsph_buffers(
    registry: Res<SimulationRegistry>,
    support: Option<Res<ComputeSupport>>,
    params_buf: Option<Res<SimParamsBuffer>>,
    particles: Option<Res<ParticleBuffers>>,
    colliders: Option<Res<ColliderBuffers>>,
    render_queue: Res<RenderQueue>,
) {
    let (Some(support), Some(params_buf), Some(particles), Some(colliders)) =
        (support, params_buf, particles, colliders)
    else {
        return;
    };
    if !support.0 {
        return;
    }
    let Some(sim) = registry.iter_active().next() else {
        return;
    };

    let params = GpuSimParams::from(sim.params());
    render_queue.write_buffer(&params_buf.buffer, 0, bytemuck::bytes_of(&params));

    let upload = |target: &Buffer, data: &[glam::Vec4]| {
        if data.is_empty() {
            return;
        }
        let raw: Vec<[f32; 4]> = data.iter().map(|v| v.to_array()).collect();
        render_queue.write_buffer(target, 0, bytemuck::cast_slice(&raw));
    };
    upload(&particles.pos_press[0], sim.pos_press());
    upload(&particles.vel_rho[0], sim.vel_rho());
    upload(&particles.force_vol[0], sim.force_vol());
    upload(&particles.tgrm[0], sim.tgrm());

    let spheres: Vec<GpuSphereCollider> =
        sim.colliders().spheres().iter().map(Into::into).collect();
    let capsules: Vec<GpuCapsuleCollider> =
        sim.colliders().capsules().iter().map(Into::into).collect();
    let boxes: Vec<GpuBoxCollider> = sim.colliders().boxes().iter().map(Into::into).collect();
    if !spheres.is_empty() {
        render_queue.write_buffer(&colliders.spheres, 0, bytemuck::cast_slice(&spheres));
    }
    if !capsules.is_empty() {
        render_queue.write_buffer(&colliders.capsules, 0, bytemuck::cast_slice(&capsules));
    }
    if !boxes.is_empty() {
        render_queue.write_buffer(&colliders.boxes, 0, bytemuck::cast_slice(&boxes));
    }
}

// Extract systems (App -> Render)

fn extract_wcsph_buffers(
    mut commands: Commands,
    registry: Extract<Res<SimulationRegistry>>,
    params_buf: Extract<Option<Res<SimParamsBuffer>>>,
    particles: Extract<Option<Res<ParticleBuffers>>>,
    grid: Extract<Option<Res<GridBuffers>>>,
    colliders: Extract<Option<Res<ColliderBuffers>>>,
    support: Extract<Option<Res<ComputeSupport>>>,
) {
    let (Some(params_buf), Some(particles), Some(grid), Some(colliders), Some(support)) = (
        params_buf.as_ref(),
        particles.as_ref(),
        grid.as_ref(),
        colliders.as_ref(),
        support.as_ref(),
    ) else {
        return;
    };
    commands.insert_resource(ComputeSupport(support.0));
    commands.insert_resource(ExtractedWcsphBuffers {
        params: params_buf.buffer.clone(),
        pos_press: particles.pos_press.clone(),
        vel_rho: particles.vel_rho.clone(),
        force_vol: particles.force_vol.clone(),
        tgrm: particles.tgrm.clone(),
        vel_verlet: particles.vel_verlet.clone(),
        cells: grid.cells.clone(),
        sort_data: grid.sort_data.clone(),
        spheres: colliders.spheres.clone(),
        capsules: colliders.capsules.clone(),
        boxes: colliders.boxes.clone(),
    });

    let num_particles = registry
        .iter_active()
        .next()
        .map(|sim| sim.live_particle_count() as u32)
        .unwrap_or(0);
    commands.insert_resource(ExtractedSimState {
        num_particles,
        num_cells: grid.num_cells,
        padded_pairs: grid.padded_pairs,
    });
}

// Render-world systems

/// Creates the layouts once; later frames see the resource and return early
/// (the render sub-app has no startup schedule).
fn prepare_wcsph_bind_group_layouts(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    existing: Option<Res<WcsphBindGroupLayouts>>,
) {
    if existing.is_some() {
        return;
    }
    let bgl = |label: &str, entries: &[BindGroupLayoutEntry]| {
        render_device.create_bind_group_layout(Some(label), entries)
    };

    commands.insert_resource(WcsphBindGroupLayouts {
        // binding 0 is always the params UBO, storage bindings follow
        clear_cells: bgl("wcsph_clear_cells_bgl", &[uniform_entry(0), storage_entry(1, false)]),
        hash_particles: bgl(
            "wcsph_hash_particles_bgl",
            &[uniform_entry(0), storage_entry(1, true), storage_entry(2, false)],
        ),
        bin_cells: bgl(
            "wcsph_bin_cells_bgl",
            &[uniform_entry(0), storage_entry(1, true), storage_entry(2, false)],
        ),
        scatter: bgl(
            "wcsph_scatter_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        ),
        weighted_volume: bgl(
            "wcsph_weighted_volume_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        ),
        density_pressure: bgl(
            "wcsph_density_pressure_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, true),
            ],
        ),
        force: bgl(
            "wcsph_force_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
                storage_entry(6, false),
            ],
        ),
        boundary_force: bgl(
            "wcsph_boundary_force_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
                storage_entry(5, true),
                storage_entry(6, true),
                storage_entry(7, true),
            ],
        ),
        integrate: bgl(
            "wcsph_integrate_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, false),
                storage_entry(7, false),
            ],
        ),
        copy_back: bgl(
            "wcsph_copy_back_bgl",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        ),
    });
}

fn prepare_wcsph_bind_groups(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layouts: Option<Res<WcsphBindGroupLayouts>>,
    extracted: Option<Res<ExtractedWcsphBuffers>>,
) {
    let (Some(layouts), Some(b)) = (layouts, extracted) else {
        return;
    };

    let bg = |label: &str, layout: &BindGroupLayout, buffers: &[&Buffer]| {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        render_device.create_bind_group(Some(label), layout, &entries)
    };

    let scatter = [
        (&b.pos_press, "wcsph_scatter_pos_press_bg"),
        (&b.vel_rho, "wcsph_scatter_vel_rho_bg"),
        (&b.force_vol, "wcsph_scatter_force_vol_bg"),
        (&b.tgrm, "wcsph_scatter_tgrm_bg"),
    ]
    .map(|(pair, label)| {
        bg(label, &layouts.scatter, &[&b.params, &b.sort_data, &pair[0], &pair[1]])
    });

    commands.insert_resource(WcsphBindGroups {
        clear_cells: bg("wcsph_clear_cells_bg", &layouts.clear_cells, &[&b.params, &b.cells]),
        hash_particles: bg(
            "wcsph_hash_particles_bg",
            &layouts.hash_particles,
            &[&b.params, &b.pos_press[0], &b.sort_data],
        ),
        bin_cells: bg(
            "wcsph_bin_cells_bg",
            &layouts.bin_cells,
            &[&b.params, &b.sort_data, &b.cells],
        ),
        scatter,
        weighted_volume: bg(
            "wcsph_weighted_volume_bg",
            &layouts.weighted_volume,
            &[&b.params, &b.cells, &b.pos_press[1], &b.tgrm[1], &b.force_vol[1]],
        ),
        density_pressure: bg(
            "wcsph_density_pressure_bg",
            &layouts.density_pressure,
            &[&b.params, &b.cells, &b.pos_press[1], &b.vel_rho[1], &b.tgrm[1]],
        ),
        force: bg(
            "wcsph_force_bg",
            &layouts.force,
            &[
                &b.params,
                &b.cells,
                &b.pos_press[1],
                &b.vel_rho[1],
                &b.tgrm[1],
                &b.force_vol[1],
                &b.vel_verlet,
            ],
        ),
        boundary_force: bg(
            "wcsph_boundary_force_bg",
            &layouts.boundary_force,
            &[
                &b.params,
                &b.pos_press[1],
                &b.vel_rho[1],
                &b.tgrm[1],
                &b.force_vol[1],
                &b.spheres,
                &b.capsules,
                &b.boxes,
            ],
        ),
        integrate: bg(
            "wcsph_integrate_bg",
            &layouts.integrate,
            &[
                &b.params,
                &b.pos_press[1],
                &b.vel_rho[1],
                &b.force_vol[1],
                &b.tgrm[1],
                &b.vel_verlet,
                &b.pos_press[0],
                &b.vel_rho[0],
            ],
        ),
        copy_back: bg(
            "wcsph_copy_back_bg",
            &layouts.copy_back,
            &[&b.params, &b.force_vol[1], &b.tgrm[1], &b.force_vol[0], &b.tgrm[0]],
        ),
    });
}

// =====================================================================

// Plugin

pub struct GpuWcsphPlugin;

impl Plugin for GpuWcsphPlugin {
    fn build(&self, app: &mut App) {
        // App
        app.init_resource::<SimulationRegistry>();
        if app.world().get_resource::<SimulationConfig>().is_none() {
            app.insert_resource(SimulationConfig::default());
        }
        app.add_systems(
            Startup,
            (probe_compute_support, init_gpu_buffers, init_sort_pass_params).chain(),
        )
        .add_systems(Update, queue_wcsph_buffers);

        // Render
        let render_app = app.sub_app_mut(RenderApp);
        render_app
            .add_systems(
                ExtractSchedule,
                (extract_wcsph_buffers, crate::gpu::sort::extract_sort_pass_params),
            )
            .add_systems(
                Render,
                (
                    prepare_wcsph_bind_group_layouts.in_set(RenderSet::Prepare),
                    prepare_wcsph_bind_groups.in_set(RenderSet::Prepare),
                    prepare_sort_bind_group.in_set(RenderSet::Prepare),
                    prepare_wcsph_pipelines.in_set(RenderSet::Prepare),
                ),
            );

        add_wcsph_node_to_graph(render_app);
    }
}
