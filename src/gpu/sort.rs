// Dispatch plumbing for the bitonic sorter. The sorter itself is a black box
// behind its shader: ascending order by key over a power-of-two pair buffer,
// sentinel keys sink to the end. One uniform slot per compare-exchange pass,
// selected with a dynamic offset so the whole schedule shares one buffer.
use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingResource, BindingType,
    Buffer, BufferBinding, BufferBindingType, BufferInitDescriptor, BufferSize, BufferUsages,
    ShaderStages,
};
use bevy::render::renderer::RenderDevice;

use crate::gpu::buffers::{ComputeSupport, ExtractedWcsphBuffers, GridBuffers};
use crate::gpu::ffi::GpuSortPassParams;

/// Uniform slots are spaced at the conservative dynamic-offset alignment.
pub const SORT_PASS_STRIDE: u64 = 256;

#[derive(Resource, Clone, ExtractResource)]
pub struct SortPassParams {
    pub buffer: Buffer,
    pub pass_count: u32,
}

#[derive(Resource, Clone)]
pub struct SortBindGroupLayout(pub BindGroupLayout);

#[derive(Resource)]
pub struct SortBindGroup(pub BindGroup);

/// Full compare-exchange schedule for a bitonic network over `n` elements.
pub fn bitonic_pass_schedule(n: u32) -> Vec<(u32, u32)> {
    let mut passes = Vec::new();
    let mut k = 2u32;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            passes.push((k, j));
            j /= 2;
        }
        k *= 2;
    }
    passes
}

pub fn init_sort_pass_params(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    support: Res<ComputeSupport>,
    grid: Option<Res<GridBuffers>>,
) {
    let Some(grid) = grid else {
        return;
    };
    if !support.0 {
        return;
    }

    let schedule = bitonic_pass_schedule(grid.padded_pairs);
    let mut contents = vec![0u8; schedule.len().max(1) * SORT_PASS_STRIDE as usize];
    for (i, (k, j)) in schedule.iter().enumerate() {
        let slot = GpuSortPassParams {
            k: *k,
            j: *j,
            count: grid.padded_pairs,
            _pad: 0,
        };
        let offset = i * SORT_PASS_STRIDE as usize;
        contents[offset..offset + std::mem::size_of::<GpuSortPassParams>()]
            .copy_from_slice(bytemuck::bytes_of(&slot));
    }

    let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("wcsph_sort_pass_params"),
        contents: &contents,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });

    commands.insert_resource(SortPassParams {
        buffer,
        pass_count: schedule.len() as u32,
    });
}

pub fn extract_sort_pass_params(
    mut commands: Commands,
    params: bevy::render::Extract<Option<Res<SortPassParams>>>,
) {
    if let Some(params) = params.as_ref() {
        commands.insert_resource(SortPassParams {
            buffer: params.buffer.clone(),
            pass_count: params.pass_count,
        });
    }
}

pub fn prepare_sort_bind_group(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layout: Option<Res<SortBindGroupLayout>>,
    extracted: Option<Res<ExtractedWcsphBuffers>>,
    pass_params: Option<Res<SortPassParams>>,
) {
    let layout = match layout {
        Some(layout) => layout.0.clone(),
        None => {
            let layout = render_device.create_bind_group_layout(
                Some("wcsph_sort_bgl"),
                &[
                    BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStages::COMPUTE,
                        ty: BindingType::Buffer {
                            ty: BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    BindGroupLayoutEntry {
                        binding: 1,
                        visibility: ShaderStages::COMPUTE,
                        ty: BindingType::Buffer {
                            ty: BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            );
            commands.insert_resource(SortBindGroupLayout(layout.clone()));
            layout
        }
    };

    let (Some(extracted), Some(pass_params)) = (extracted, pass_params) else {
        return;
    };

    let bind_group = render_device.create_bind_group(
        Some("wcsph_sort_bg"),
        &layout,
        &[
            BindGroupEntry {
                binding: 0,
                resource: extracted.sort_data.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Buffer(BufferBinding {
                    buffer: &pass_params.buffer,
                    offset: 0,
                    size: BufferSize::new(std::mem::size_of::<GpuSortPassParams>() as u64),
                }),
            },
        ],
    );
    commands.insert_resource(SortBindGroup(bind_group));
}
