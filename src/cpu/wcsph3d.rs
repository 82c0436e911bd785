// Weakly-compressible SPH in 3D: the reference pipeline the GPU mirror is
// checked against. One `run_sub_step` walks the fixed stage sequence over
// double-buffered SoA particle state.
use bevy::prelude::{Resource, warn};
use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::colliders::{BoxCollider, CapsuleCollider, ColliderSink, SphereCollider};
use crate::cpu::grid3d::{ParticleArrays, ParticleArraysMut, SpatialGrid, cell_coord, for_each_neighbor_cell};
use crate::kernels::{KernelM4, KernelPoly6, KernelSpiky, KernelViscosity};
use crate::params::{SimulationConfig, SimulationParameters, wcsph_eos};
use crate::sort::HostBitonicSorter;

/// Ping-pong pair with explicit role accessors; roles flip only through
/// `swap()`, never by indexing.
pub struct DoubleBuffer<T> {
    buffers: [T; 2],
    current: usize,
}

impl<T> DoubleBuffer<T> {
    pub fn new(a: T, b: T) -> Self {
        Self { buffers: [a, b], current: 0 }
    }

    #[inline]
    pub fn current(&self) -> &T {
        &self.buffers[self.current]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.buffers[self.current]
    }

    /// Read access to the current half together with write access to the
    /// other half, for hazard-free scatter stages.
    #[inline]
    pub fn split_mut(&mut self) -> (&T, &mut T) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    #[inline]
    pub fn swap(&mut self) {
        self.current ^= 1;
    }
}

/// The four per-particle scalars packed into the fourth SoA array:
/// type, group, radius, mass.
#[derive(Clone, Copy, Debug)]
pub struct ParticleAttributes {
    pub particle_type: f32,
    pub group: f32,
    pub radius: f32,
    pub mass: f32,
}

impl ParticleAttributes {
    pub fn fluid(radius: f32, mass: f32) -> Self {
        Self { particle_type: 0.0, group: -1.0, radius, mass }
    }

    #[inline]
    fn to_vec4(self) -> Vec4 {
        Vec4::new(self.particle_type, self.group, self.radius, self.mass)
    }
}

/// Fixed-capacity collider buffers, overwritten wholesale every sub-step by
/// the aggregation stage and read-only afterwards.
pub struct ColliderSet {
    spheres: Vec<SphereCollider>,
    capsules: Vec<CapsuleCollider>,
    boxes: Vec<BoxCollider>,
    max_spheres: usize,
    max_capsules: usize,
    max_boxes: usize,
}

impl ColliderSet {
    pub fn new(max_spheres: usize, max_capsules: usize, max_boxes: usize) -> Self {
        Self {
            spheres: Vec::with_capacity(max_spheres),
            capsules: Vec::with_capacity(max_capsules),
            boxes: Vec::with_capacity(max_boxes),
            max_spheres,
            max_capsules,
            max_boxes,
        }
    }

    pub fn clear(&mut self) {
        self.spheres.clear();
        self.capsules.clear();
        self.boxes.clear();
    }

    pub fn spheres(&self) -> &[SphereCollider] {
        &self.spheres
    }

    pub fn capsules(&self) -> &[CapsuleCollider] {
        &self.capsules
    }

    pub fn boxes(&self) -> &[BoxCollider] {
        &self.boxes
    }
}

impl ColliderSink for ColliderSet {
    fn add_sphere_collider(&mut self, collider: SphereCollider) {
        if self.spheres.len() < self.max_spheres {
            self.spheres.push(collider);
        }
    }

    fn add_capsule_collider(&mut self, collider: CapsuleCollider) {
        if self.capsules.len() < self.max_capsules {
            self.capsules.push(collider);
        }
    }

    fn add_box_collider(&mut self, collider: BoxCollider) {
        if self.boxes.len() < self.max_boxes {
            self.boxes.push(collider);
        }
    }
}

type EquationOfState = Box<dyn Fn(&SimulationParameters, f32) -> f32 + Send + Sync>;

#[derive(Resource)]
pub struct WcsphSimulation {
    pub config: SimulationConfig,
    params: SimulationParameters,
    num_particles: usize,

    // SoA particle state: position+pressure, velocity+density,
    // force+weighted volume, type/group/radius/mass
    pos_press: DoubleBuffer<Vec<Vec4>>,
    vel_rho: DoubleBuffer<Vec<Vec4>>,
    force_vol: DoubleBuffer<Vec<Vec4>>,
    tgrm: DoubleBuffer<Vec<Vec4>>,
    vel_verlet: Vec<Vec4>,

    // pending-insertion staging, merged once per sub-step
    add_pos_press: Vec<Vec4>,
    add_vel_rho: Vec<Vec4>,
    add_force_vol: Vec<Vec4>,
    add_tgrm: Vec<Vec4>,
    dropped_insertions: usize,

    grid: SpatialGrid,
    sorter: HostBitonicSorter,
    colliders: ColliderSet,
    eos: EquationOfState,
}

impl WcsphSimulation {
    pub fn new(config: SimulationConfig) -> Self {
        let n = config.max_particles;
        let zeroed = || vec![Vec4::ZERO; n];
        let params = SimulationParameters::derive(&config, 0, config.fixed_timestep);
        let colliders = ColliderSet::new(
            config.max_sphere_colliders,
            config.max_capsule_colliders,
            config.max_box_colliders,
        );
        Self {
            grid: SpatialGrid::new(params.num_cells as usize, n),
            params,
            num_particles: 0,
            pos_press: DoubleBuffer::new(zeroed(), zeroed()),
            vel_rho: DoubleBuffer::new(zeroed(), zeroed()),
            force_vol: DoubleBuffer::new(zeroed(), zeroed()),
            tgrm: DoubleBuffer::new(zeroed(), zeroed()),
            vel_verlet: zeroed(),
            add_pos_press: Vec::new(),
            add_vel_rho: Vec::new(),
            add_force_vol: Vec::new(),
            add_tgrm: Vec::new(),
            dropped_insertions: 0,
            sorter: HostBitonicSorter,
            colliders,
            eos: Box::new(wcsph_eos),
            config,
        }
    }

    pub fn live_particle_count(&self) -> usize {
        self.num_particles
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Colliders aggregated during the most recent sub-step.
    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn pos_press(&self) -> &[Vec4] {
        &self.pos_press.current()[..self.num_particles]
    }

    pub fn vel_rho(&self) -> &[Vec4] {
        &self.vel_rho.current()[..self.num_particles]
    }

    pub fn force_vol(&self) -> &[Vec4] {
        &self.force_vol.current()[..self.num_particles]
    }

    pub fn tgrm(&self) -> &[Vec4] {
        &self.tgrm.current()[..self.num_particles]
    }

    pub fn staged_insertion_count(&self) -> usize {
        self.add_pos_press.len()
    }

    /// Replaces the density -> pressure mapping. The default is the
    /// configurable Tait form in [`wcsph_eos`].
    pub fn set_equation_of_state(
        &mut self,
        eos: impl Fn(&SimulationParameters, f32) -> f32 + Send + Sync + 'static,
    ) {
        self.eos = Box::new(eos);
    }

    /// Stages one particle for insertion at the start of the next sub-step.
    /// Returns false (and drops the request) if the staged set would exceed
    /// the configured capacity.
    pub fn insert_particle(
        &mut self,
        pos: Vec3,
        vel: Vec3,
        force: Vec3,
        attrs: ParticleAttributes,
    ) -> bool {
        if self.num_particles + self.add_pos_press.len() >= self.config.max_particles {
            self.dropped_insertions += 1;
            return false;
        }
        self.add_pos_press.push(pos.extend(0.0));
        self.add_vel_rho.push(vel.extend(0.0));
        self.add_force_vol.push(force.extend(0.0));
        self.add_tgrm.push(attrs.to_vec4());
        true
    }

    /// Merges staged insertions into the tail of the live arrays. No-op when
    /// nothing is staged.
    pub fn flush_insertions(&mut self) {
        if self.dropped_insertions > 0 {
            warn!(
                "insertion capacity exceeded: dropped {} particles (max_particles = {})",
                self.dropped_insertions, self.config.max_particles
            );
            self.dropped_insertions = 0;
        }
        let count = self.add_pos_press.len();
        if count == 0 {
            return;
        }
        let base = self.num_particles;
        self.pos_press.current_mut()[base..base + count].copy_from_slice(&self.add_pos_press);
        self.vel_rho.current_mut()[base..base + count].copy_from_slice(&self.add_vel_rho);
        self.force_vol.current_mut()[base..base + count].copy_from_slice(&self.add_force_vol);
        self.tgrm.current_mut()[base..base + count].copy_from_slice(&self.add_tgrm);
        self.num_particles += count;

        self.add_pos_press.clear();
        self.add_vel_rho.clear();
        self.add_force_vol.clear();
        self.add_tgrm.clear();
    }

    /// One fixed-timestep tick: `sub_iterations` sequential sub-steps, each
    /// pulling fresh collider shapes from `collect`.
    pub fn step(&mut self, collect: &mut dyn FnMut(&mut dyn ColliderSink)) {
        let dt = self.config.fixed_timestep / self.config.sub_iterations.max(1) as f32;
        for _ in 0..self.config.sub_iterations.max(1) {
            self.run_sub_step(dt, collect);
        }
    }

    /// The strict per-sub-step stage sequence. Each stage reads only state
    /// fully written by its predecessor.
    pub fn run_sub_step(&mut self, timestep: f32, collect: &mut dyn FnMut(&mut dyn ColliderSink)) {
        // 1. collider aggregation: wholesale overwrite of the fixed buffers
        self.colliders.clear();
        collect(&mut self.colliders);

        // 2. insertion flush
        self.flush_insertions();

        // 3. parameter refresh: everything derived is re-derived here
        self.params = SimulationParameters::derive(&self.config, self.num_particles as u32, timestep);
        self.params.num_sphere_colliders = self.colliders.spheres.len() as u32;
        self.params.num_capsule_colliders = self.colliders.capsules.len() as u32;
        self.params.num_box_colliders = self.colliders.boxes.len() as u32;

        if self.num_particles == 0 {
            return;
        }

        // 4. grid build: reorder into cell-sorted order in the back buffers,
        // then flip so the sorted state is current for the WCSPH stages
        self.build_grid();
        self.pos_press.swap();
        self.vel_rho.swap();
        self.force_vol.swap();
        self.tgrm.swap();

        // 5-8. field evaluation over the sorted buffers
        self.compute_weighted_volume();
        self.compute_density_pressure();
        self.compute_force();
        self.compute_boundary_force();

        // 9. integration writes the other half; one swap at the sub-step
        // boundary makes it current
        self.integrate();
        self.pos_press.swap();
        self.vel_rho.swap();
        self.force_vol.swap();
        self.tgrm.swap();
    }

    fn build_grid(&mut self) {
        let (pp_src, pp_dst) = self.pos_press.split_mut();
        let (vr_src, vr_dst) = self.vel_rho.split_mut();
        let (fv_src, fv_dst) = self.force_vol.split_mut();
        let (tg_src, tg_dst) = self.tgrm.split_mut();
        self.grid.build(
            &self.params,
            &self.sorter,
            ParticleArrays {
                pos_press: pp_src,
                vel_rho: vr_src,
                force_vol: fv_src,
                tgrm: tg_src,
            },
            ParticleArraysMut {
                pos_press: pp_dst,
                vel_rho: vr_dst,
                force_vol: fv_dst,
                tgrm: tg_dst,
            },
        );
    }

    /// Stage 5: coarse M4 sum over the 27-cell neighborhood, inverted into a
    /// per-particle volume estimate (force_vol.w).
    fn compute_weighted_volume(&mut self) {
        let n = self.num_particles;
        let params = self.params;
        let h = params.smoothing_length;
        let pos_press = self.pos_press.current();
        let tgrm = self.tgrm.current();

        let mut volumes = vec![0.0f32; n];
        for (i, volume) in volumes.iter_mut().enumerate() {
            let pos_i = pos_press[i].xyz();
            let mut sum = 0.0;
            self.for_each_neighbor(pos_i, |j| {
                let r = (pos_i - pos_press[j].xyz()).length();
                sum += tgrm[j].w * KernelM4::variable(h, r);
            });
            sum *= params.coeff_weighted_volume;
            *volume = if sum > 0.0 { 1.0 / sum } else { 0.0 };
        }

        let force_vol = self.force_vol.current_mut();
        for (i, volume) in volumes.into_iter().enumerate() {
            force_vol[i].w = volume;
        }
    }

    /// Stage 6: Poly6 density over neighbors within h, then the pluggable
    /// equation of state (vel_rho.w, pos_press.w).
    fn compute_density_pressure(&mut self) {
        let n = self.num_particles;
        let params = self.params;
        let h2 = params.smoothing_length_sq;
        let h = params.smoothing_length;
        let pos_press = self.pos_press.current();
        let tgrm = self.tgrm.current();

        let mut densities = vec![0.0f32; n];
        for (i, density) in densities.iter_mut().enumerate() {
            let pos_i = pos_press[i].xyz();
            let mut rho = 0.0;
            self.for_each_neighbor(pos_i, |j| {
                let r2 = (pos_i - pos_press[j].xyz()).length_squared();
                if r2 <= h2 {
                    rho += tgrm[j].w * KernelPoly6::variable(h, r2.sqrt());
                }
            });
            *density = rho * params.coeff_density;
        }

        for (i, density) in densities.into_iter().enumerate() {
            self.vel_rho.current_mut()[i].w = density;
            self.pos_press.current_mut()[i].w = (self.eos)(&params, density);
        }
    }

    /// Stage 7: pressure-gradient (Spiky, antisymmetric) and viscous
    /// (Viscosity laplacian) forces, both weighted by the volume estimates,
    /// plus gravity. Also writes the velocity-Verlet half-step estimate.
    fn compute_force(&mut self) {
        let n = self.num_particles;
        let params = self.params;
        let h = params.smoothing_length;
        let pos_press = self.pos_press.current();
        let vel_rho = self.vel_rho.current();
        let tgrm = self.tgrm.current();
        let force_vol = self.force_vol.current();

        let mut forces = vec![Vec3::ZERO; n];
        for (i, force) in forces.iter_mut().enumerate() {
            let pos_i = pos_press[i].xyz();
            let press_i = pos_press[i].w;
            let vel_i = vel_rho[i].xyz();
            let vol_i = force_vol[i].w;
            let mass_i = tgrm[i].w;

            let mut f = params.gravity * mass_i;
            self.for_each_neighbor(pos_i, |j| {
                if j == i {
                    return;
                }
                let rij = pos_i - pos_press[j].xyz();
                let r = rij.length();
                if r <= 1e-6 || r > h {
                    return;
                }
                let dir = rij / r;
                let vol_j = force_vol[j].w;

                let grad = params.coeff_pressure * KernelSpiky::gradient_variable(h, r);
                f -= vol_i * vol_j * 0.5 * (press_i + pos_press[j].w) * grad * dir;

                let lap = params.coeff_viscosity * KernelViscosity::laplacian_variable(h, r);
                f += params.artificial_viscosity * vol_i * vol_j * (vel_rho[j].xyz() - vel_i) * lap;
            });
            *force = f;
        }

        for (i, f) in forces.into_iter().enumerate() {
            let mass = self.tgrm.current()[i].w.max(1e-6);
            let half_vel = self.vel_rho.current()[i].xyz() + 0.5 * params.timestep * f / mass;
            self.vel_verlet[i] = half_vel.extend(0.0);
            let vol = self.force_vol.current()[i].w;
            self.force_vol.current_mut()[i] = f.extend(vol);
        }
    }

    /// Stage 8: penetration repulsion from every collider the particle's
    /// inflated surface intersects, accumulated into the force buffer.
    fn compute_boundary_force(&mut self) {
        let n = self.num_particles;
        let params = self.params;
        let pos_press = self.pos_press.current();
        let vel_rho = self.vel_rho.current();
        let tgrm = self.tgrm.current();
        let colliders = &self.colliders;
        let force_vol = self.force_vol.current_mut();

        for i in 0..n {
            let pos = pos_press[i].xyz();
            let vel = vel_rho[i].xyz();
            let radius = tgrm[i].z;
            let mut f = Vec3::ZERO;

            let mut respond = |sd: f32, normal: Vec3| {
                let penetration = radius - sd;
                if penetration > 0.0 {
                    let normal_speed = vel.dot(normal);
                    f += normal
                        * (params.boundary_stiffness * penetration
                            - params.boundary_dampening * normal_speed);
                }
            };

            for c in colliders.spheres() {
                if c.aabb.overlaps_sphere(pos, radius) {
                    let (sd, normal) = c.shape.signed_distance(pos);
                    respond(sd, normal);
                }
            }
            for c in colliders.capsules() {
                if c.aabb.overlaps_sphere(pos, radius) {
                    let (sd, normal) = c.shape.signed_distance(pos);
                    respond(sd, normal);
                }
            }
            for c in colliders.boxes() {
                if c.aabb.overlaps_sphere(pos, radius) {
                    let (sd, normal) = c.shape.signed_distance(pos);
                    respond(sd, normal);
                }
            }

            force_vol[i].x += f.x;
            force_vol[i].y += f.y;
            force_vol[i].z += f.z;
        }
    }

    /// Stage 9: velocity-Verlet completion, speed clamp, position advance,
    /// optional box-container clamp and reflect; results land in the back
    /// buffers.
    fn integrate(&mut self) {
        let n = self.num_particles;
        let params = self.params;
        let dt = params.timestep;
        let vel_verlet = &self.vel_verlet;

        let (pp_src, pp_dst) = self.pos_press.split_mut();
        let (vr_src, vr_dst) = self.vel_rho.split_mut();
        let (fv_src, fv_dst) = self.force_vol.split_mut();
        let (tg_src, tg_dst) = self.tgrm.split_mut();

        for i in 0..n {
            let mass = tg_src[i].w.max(1e-6);
            let force = fv_src[i].xyz();
            let mut vel = vel_verlet[i].xyz() + 0.5 * dt * force / mass;

            let speed = vel.length();
            if speed > params.velocity_limit {
                vel *= params.velocity_limit / speed;
            }

            let mut pos = pp_src[i].xyz() + vel * dt;

            if params.enable_box {
                let min = params.world_origin - params.box_size;
                let max = params.world_origin + params.box_size;
                for axis in 0..3 {
                    if pos[axis] < min[axis] {
                        pos[axis] = min[axis];
                        vel[axis] = -vel[axis];
                    } else if pos[axis] > max[axis] {
                        pos[axis] = max[axis];
                        vel[axis] = -vel[axis];
                    }
                }
            }

            pp_dst[i] = pos.extend(pp_src[i].w);
            vr_dst[i] = vel.extend(vr_src[i].w);
            fv_dst[i] = fv_src[i];
            tg_dst[i] = tg_src[i];
        }
    }

    /// Scans the 3x3x3 cell block around `pos`, invoking `f` with the sorted
    /// slot index of every particle in it. Empty ranges contribute nothing.
    fn for_each_neighbor(&self, pos: Vec3, mut f: impl FnMut(usize)) {
        let params = &self.params;
        let coord = cell_coord(pos, params);
        let cells = self.grid.cells();
        for_each_neighbor_cell(coord, params.grid_size, |hash| {
            let cell = cells[hash as usize];
            for j in cell.begin..cell.end {
                f(j as usize);
            }
        });
    }
}
