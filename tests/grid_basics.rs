use bevy_gpu_wcsph::cpu::grid3d::{
    Cell, ParticleArrays, ParticleArraysMut, SpatialGrid, cell_coord, cell_hash,
    for_each_neighbor_cell,
};
use bevy_gpu_wcsph::params::{SimulationConfig, SimulationParameters};
use bevy_gpu_wcsph::sort::{HostBitonicSorter, KeyValueSorter, SENTINEL_KEY, SortPair};
use glam::{UVec3, Vec3, Vec4};

fn params_for(grid: UVec3, smoothing_length: f32, n: u32) -> SimulationParameters {
    let config = SimulationConfig {
        smoothing_length,
        grid_size: grid,
        world_origin: Vec3::ZERO,
        ..SimulationConfig::default()
    };
    SimulationParameters::derive(&config, n, config.fixed_timestep)
}

// deterministic positions without pulling in a rand dependency
fn lcg_positions(n: usize, extent: f32, seed: u64) -> Vec<Vec4> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as f32 / (1u64 << 31) as f32
    };
    (0..n)
        .map(|_| Vec4::new(next() * extent, next() * extent, next() * extent, 0.0))
        .collect()
}

fn build_grid(params: &SimulationParameters, positions: &[Vec4]) -> (SpatialGrid, Vec<Vec4>) {
    let n = positions.len();
    let tag: Vec<Vec4> = (0..n).map(|i| Vec4::splat(i as f32)).collect();
    let mut dst_pos = vec![Vec4::ZERO; n];
    let mut dst_a = vec![Vec4::ZERO; n];
    let mut dst_b = vec![Vec4::ZERO; n];
    let mut dst_c = vec![Vec4::ZERO; n];
    let mut grid = SpatialGrid::new(params.num_cells as usize, n);
    grid.build(
        params,
        &HostBitonicSorter,
        ParticleArrays { pos_press: positions, vel_rho: &tag, force_vol: &tag, tgrm: &tag },
        ParticleArraysMut {
            pos_press: &mut dst_pos,
            vel_rho: &mut dst_a,
            force_vol: &mut dst_b,
            tgrm: &mut dst_c,
        },
    );
    (grid, dst_pos)
}

#[test]
fn bitonic_sorter_orders_and_permutes() {
    let mut state = 99u64;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as u32 % 1000
    };
    let mut pairs: Vec<SortPair> = (0..256)
        .map(|i| SortPair { key: next(), index: i })
        .collect();
    HostBitonicSorter.sort_pairs(&mut pairs);

    for w in pairs.windows(2) {
        assert!(w[0].key <= w[1].key);
    }
    let mut indices: Vec<u32> = pairs.iter().map(|p| p.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..256).collect::<Vec<u32>>());
}

#[test]
fn coord_clamps_out_of_bounds() {
    let params = params_for(UVec3::new(8, 8, 8), 0.5, 0);
    // cell width is 2h = 1.0
    assert_eq!(cell_coord(Vec3::new(-10.0, 3.5, 100.0), &params), UVec3::new(0, 3, 7));
    assert_eq!(cell_coord(Vec3::new(0.0, 0.0, 0.0), &params), UVec3::new(0, 0, 0));
    assert_eq!(cell_coord(Vec3::new(7.99, 7.99, 7.99), &params), UVec3::new(7, 7, 7));
}

#[test]
fn hash_is_x_major() {
    let grid = UVec3::new(4, 4, 4);
    assert_eq!(cell_hash(UVec3::new(0, 0, 0), grid), 0);
    assert_eq!(cell_hash(UVec3::new(1, 0, 0), grid), 1);
    assert_eq!(cell_hash(UVec3::new(0, 1, 0), grid), 4);
    assert_eq!(cell_hash(UVec3::new(0, 0, 1), grid), 16);
    assert_eq!(cell_hash(UVec3::new(3, 3, 3), grid), 63);
}

#[test]
fn neighbor_scan_clips_at_borders() {
    let grid = UVec3::new(4, 4, 4);
    let mut visited = Vec::new();
    for_each_neighbor_cell(UVec3::new(0, 0, 0), grid, |h| visited.push(h));
    assert_eq!(visited.len(), 8); // 2x2x2 at the corner

    visited.clear();
    for_each_neighbor_cell(UVec3::new(2, 2, 2), grid, |h| visited.push(h));
    assert_eq!(visited.len(), 27);
    let mut dedup = visited.clone();
    dedup.sort_unstable();
    dedup.dedup();
    assert_eq!(dedup.len(), visited.len()); // no duplicates
}

#[test]
fn cell_ranges_partition_the_live_set() {
    let params = params_for(UVec3::new(8, 8, 8), 0.5, 200);
    let positions = lcg_positions(200, 8.0, 42);
    let (grid, sorted_pos) = build_grid(&params, &positions);

    let mut covered = vec![false; 200];
    let mut total = 0;
    for (hash, cell) in grid.cells().iter().enumerate() {
        total += cell.len();
        for slot in cell.begin..cell.end {
            assert!(!covered[slot as usize], "slot {slot} in two cells");
            covered[slot as usize] = true;
            // the particle stored in this slot really belongs to this cell
            let coord = cell_coord(sorted_pos[slot as usize].truncate(), &params);
            assert_eq!(cell_hash(coord, params.grid_size) as usize, hash);
        }
    }
    assert_eq!(total, 200);
    assert!(covered.iter().all(|&c| c));
}

#[test]
fn scatter_preserves_all_arrays_together() {
    let params = params_for(UVec3::new(4, 4, 4), 0.5, 50);
    let positions = lcg_positions(50, 4.0, 7);
    let n = positions.len();
    let tags: Vec<Vec4> = (0..n).map(|i| Vec4::splat(i as f32)).collect();
    let mut dst_pos = vec![Vec4::ZERO; n];
    let mut dst_vel = vec![Vec4::ZERO; n];
    let mut dst_force = vec![Vec4::ZERO; n];
    let mut dst_tgrm = vec![Vec4::ZERO; n];
    let mut grid = SpatialGrid::new(params.num_cells as usize, n);
    grid.build(
        &params,
        &HostBitonicSorter,
        ParticleArrays { pos_press: &positions, vel_rho: &tags, force_vol: &tags, tgrm: &tags },
        ParticleArraysMut {
            pos_press: &mut dst_pos,
            vel_rho: &mut dst_vel,
            force_vol: &mut dst_force,
            tgrm: &mut dst_tgrm,
        },
    );

    for slot in 0..n {
        let original = dst_vel[slot].x as usize;
        assert_eq!(dst_pos[slot], positions[original]);
        assert_eq!(dst_vel[slot], dst_force[slot]);
        assert_eq!(dst_vel[slot], dst_tgrm[slot]);
    }
}

#[test]
fn neighbor_scan_reaches_every_pair_within_range() {
    // cell width 2h, so any two particles closer than h always share a cell
    // or sit in adjacent cells; check that against a brute-force pair list
    let params = params_for(UVec3::new(8, 8, 8), 0.5, 300);
    let positions = lcg_positions(300, 8.0, 17);
    let (grid, sorted_pos) = build_grid(&params, &positions);

    let h = 0.5;
    for i in 0..sorted_pos.len() {
        let pi = sorted_pos[i].truncate();
        let mut reachable = vec![false; sorted_pos.len()];
        for_each_neighbor_cell(cell_coord(pi, &params), params.grid_size, |hash| {
            let cell = grid.cell(hash);
            for slot in cell.begin..cell.end {
                reachable[slot as usize] = true;
            }
        });
        for j in 0..sorted_pos.len() {
            if (sorted_pos[j].truncate() - pi).length() <= h {
                assert!(reachable[j], "slot {j} in range of slot {i} but never scanned");
            }
        }
    }
}

#[test]
fn all_particles_in_one_cell() {
    let params = params_for(UVec3::new(4, 4, 4), 0.5, 30);
    let positions = vec![Vec4::new(1.5, 1.5, 1.5, 0.0); 30];
    let (grid, _) = build_grid(&params, &positions);

    let hash = cell_hash(cell_coord(Vec3::splat(1.5), &params), params.grid_size);
    assert_eq!(grid.cell(hash), Cell { begin: 0, end: 30 });
    let occupied = grid.cells().iter().filter(|c| !c.is_empty()).count();
    assert_eq!(occupied, 1);
}

#[test]
fn one_particle_per_cell() {
    let params = params_for(UVec3::new(4, 4, 4), 0.5, 64);
    let mut positions = Vec::new();
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..4 {
                positions.push(Vec4::new(
                    x as f32 + 0.5,
                    y as f32 + 0.5,
                    z as f32 + 0.5,
                    0.0,
                ));
            }
        }
    }
    let (grid, _) = build_grid(&params, &positions);
    assert!(grid.cells().iter().all(|c| c.len() == 1));
}

#[test]
fn empty_build_leaves_cells_empty() {
    let params = params_for(UVec3::new(4, 4, 4), 0.5, 0);
    let (grid, _) = build_grid(&params, &[]);
    assert!(grid.cells().iter().all(|c| c.is_empty()));
}

#[test]
fn padding_slots_hold_sentinels() {
    let params = params_for(UVec3::new(4, 4, 4), 0.5, 5);
    let positions = lcg_positions(5, 4.0, 3);
    let (grid, _) = build_grid(&params, &positions);

    let pairs = grid.sort_data();
    assert_eq!(pairs.len(), 8); // padded to the next power of two
    for pair in &pairs[5..] {
        assert_eq!(pair.key, SENTINEL_KEY);
    }
    for pair in &pairs[..5] {
        assert_ne!(pair.key, SENTINEL_KEY);
    }
}
