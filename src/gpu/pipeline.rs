use std::borrow::Cow;

use bevy::prelude::*;
use bevy::render::graph::CameraDriverLabel;
use bevy::render::render_graph::{
    Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel,
};
use bevy::render::render_resource::{
    CachedComputePipelineId, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    PipelineCache, PushConstantRange, ShaderDefVal,
};
use bevy::render::renderer::RenderContext;

use crate::gpu::buffers::{ComputeSupport, ExtractedSimState, WcsphBindGroupLayouts, WcsphBindGroups};
use crate::gpu::sort::{SORT_PASS_STRIDE, SortBindGroup, SortBindGroupLayout, SortPassParams};

const BLOCK_SIZE: u32 = 512;

#[inline]
fn group_count(n: u32) -> u32 {
    n.max(1).div_ceil(BLOCK_SIZE)
}

/// Compiled compute pipelines for every stage entry point, in dispatch order.
#[derive(Resource)]
pub struct WcsphPipelines {
    pub clear_cells: ComputePipeline,
    pub hash_particles: ComputePipeline,
    pub sort_step: ComputePipeline,
    pub bin_cells: ComputePipeline,
    pub scatter: ComputePipeline,
    pub weighted_volume: ComputePipeline,
    pub density_pressure: ComputePipeline,
    pub force: ComputePipeline,
    pub boundary_force: ComputePipeline,
    pub integrate: ComputePipeline,
    pub copy_back: ComputePipeline,
}

pub fn prepare_wcsph_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    layouts: Option<Res<WcsphBindGroupLayouts>>,
    sort_layout: Option<Res<SortBindGroupLayout>>,
    mut queued: Local<Option<Vec<CachedComputePipelineId>>>,
    assets: Res<AssetServer>,
) {
    let (Some(layouts), Some(sort_layout)) = (layouts, sort_layout) else {
        return;
    };

    if queued.is_none() {
        let grid_shader: Handle<Shader> = assets.load("shaders/hash_grid.wgsl");
        let wcsph_shader: Handle<Shader> = assets.load("shaders/wcsph.wgsl");
        let sort_shader: Handle<Shader> = assets.load("shaders/bitonic_sort.wgsl");

        let descriptors = [
            ("wcsph_clear_cells", &grid_shader, "clear_cells", &layouts.clear_cells),
            ("wcsph_hash_particles", &grid_shader, "hash_particles", &layouts.hash_particles),
            ("wcsph_sort_step", &sort_shader, "sort_step", &sort_layout.0),
            ("wcsph_bin_cells", &grid_shader, "bin_cells", &layouts.bin_cells),
            ("wcsph_scatter", &grid_shader, "scatter_array", &layouts.scatter),
            ("wcsph_weighted_volume", &wcsph_shader, "weighted_volume", &layouts.weighted_volume),
            ("wcsph_density_pressure", &wcsph_shader, "density_pressure", &layouts.density_pressure),
            ("wcsph_force", &wcsph_shader, "force", &layouts.force),
            ("wcsph_boundary_force", &wcsph_shader, "boundary_force", &layouts.boundary_force),
            ("wcsph_integrate", &wcsph_shader, "integrate", &layouts.integrate),
            ("wcsph_copy_back", &wcsph_shader, "copy_back", &layouts.copy_back),
        ];

        let ids = descriptors
            .into_iter()
            .map(|(label, shader, entry, layout)| {
                pipeline_cache.queue_compute_pipeline(ComputePipelineDescriptor {
                    label: Some(label.into()),
                    layout: vec![layout.clone()],
                    push_constant_ranges: Vec::<PushConstantRange>::new(),
                    shader: shader.clone(),
                    shader_defs: Vec::<ShaderDefVal>::new(),
                    entry_point: Cow::from(entry),
                    zero_initialize_workgroup_memory: false,
                })
            })
            .collect();
        *queued = Some(ids);
        return; // waits for compilation
    }

    if let Some(ids) = queued.as_ref() {
        let compiled: Option<Vec<&ComputePipeline>> = ids
            .iter()
            .map(|id| pipeline_cache.get_compute_pipeline(*id))
            .collect();
        if let Some(p) = compiled {
            commands.insert_resource(WcsphPipelines {
                clear_cells: p[0].clone(),
                hash_particles: p[1].clone(),
                sort_step: p[2].clone(),
                bin_cells: p[3].clone(),
                scatter: p[4].clone(),
                weighted_volume: p[5].clone(),
                density_pressure: p[6].clone(),
                force: p[7].clone(),
                boundary_force: p[8].clone(),
                integrate: p[9].clone(),
                copy_back: p[10].clone(),
            });
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct WcsphPassLabel;

/// Runs one full WCSPH sub-step over the uploaded particle state. Stage order
/// matches the reference pipeline; dispatch submission order inside the pass
/// provides the between-stage barriers.
#[derive(Default)]
struct WcsphNode;

impl Node for WcsphNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        if let Some(ComputeSupport(false)) = world.get_resource::<ComputeSupport>() {
            return Ok(());
        }
        let Some(pipelines) = world.get_resource::<WcsphPipelines>() else { return Ok(()); };
        let Some(bind_groups) = world.get_resource::<WcsphBindGroups>() else { return Ok(()); };
        let Some(sort_bg) = world.get_resource::<SortBindGroup>() else { return Ok(()); };
        let Some(sort_params) = world.get_resource::<SortPassParams>() else { return Ok(()); };
        let Some(state) = world.get_resource::<ExtractedSimState>() else { return Ok(()); };

        if state.num_particles == 0 {
            return Ok(());
        }
        let particle_groups = group_count(state.num_particles);
        let cell_groups = group_count(state.num_cells);
        let pair_groups = group_count(state.padded_pairs);

        let mut pass = render_context
            .command_encoder()
            .begin_compute_pass(&ComputePassDescriptor::default());

        // grid build
        pass.set_pipeline(&pipelines.clear_cells);
        pass.set_bind_group(0, &bind_groups.clear_cells, &[]);
        pass.dispatch_workgroups(cell_groups, 1, 1);

        pass.set_pipeline(&pipelines.hash_particles);
        pass.set_bind_group(0, &bind_groups.hash_particles, &[]);
        pass.dispatch_workgroups(pair_groups, 1, 1);

        pass.set_pipeline(&pipelines.sort_step);
        for i in 0..sort_params.pass_count {
            let offset = i * SORT_PASS_STRIDE as u32;
            pass.set_bind_group(0, &sort_bg.0, &[offset]);
            pass.dispatch_workgroups(pair_groups, 1, 1);
        }

        pass.set_pipeline(&pipelines.bin_cells);
        pass.set_bind_group(0, &bind_groups.bin_cells, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        pass.set_pipeline(&pipelines.scatter);
        for bg in &bind_groups.scatter {
            pass.set_bind_group(0, bg, &[]);
            pass.dispatch_workgroups(particle_groups, 1, 1);
        }

        // WCSPH stages over the sorted buffers
        pass.set_pipeline(&pipelines.weighted_volume);
        pass.set_bind_group(0, &bind_groups.weighted_volume, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        pass.set_pipeline(&pipelines.density_pressure);
        pass.set_bind_group(0, &bind_groups.density_pressure, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        pass.set_pipeline(&pipelines.force);
        pass.set_bind_group(0, &bind_groups.force, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        pass.set_pipeline(&pipelines.boundary_force);
        pass.set_bind_group(0, &bind_groups.boundary_force, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        pass.set_pipeline(&pipelines.integrate);
        pass.set_bind_group(0, &bind_groups.integrate, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        pass.set_pipeline(&pipelines.copy_back);
        pass.set_bind_group(0, &bind_groups.copy_back, &[]);
        pass.dispatch_workgroups(particle_groups, 1, 1);

        Ok(())
    }
}

pub fn add_wcsph_node_to_graph(render_app: &mut bevy::app::SubApp) {
    let mut graph = render_app.world_mut().resource_mut::<RenderGraph>();
    graph.add_node(WcsphPassLabel, WcsphNode::default());
    graph.add_node_edge(WcsphPassLabel, CameraDriverLabel);
}
