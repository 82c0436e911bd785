// Periodic block emitter: the caller owns time and passes it in; the emitter
// decides synchronously each tick whether to emit.
use glam::Vec3;

use crate::cpu::wcsph3d::{ParticleAttributes, WcsphSimulation};

pub struct BlockEmitter {
    pub position: Vec3,
    pub direction: Vec3,
    pub radius: f32,
    pub mass: f32,
    /// Seconds between emitted blocks.
    pub interval: f32,
    pub spacing: f32,
    accumulated: f32,
    jitter_state: u32,
}

impl BlockEmitter {
    pub fn new(position: Vec3, direction: Vec3, radius: f32, mass: f32, interval: f32) -> Self {
        Self {
            position,
            direction,
            radius,
            mass,
            interval,
            spacing: 0.25,
            accumulated: 0.0,
            jitter_state: 0x9e37_79b9,
        }
    }

    /// Advances the emitter clock and stages one jittered block of particles
    /// per elapsed interval. Returns the number of particles staged.
    pub fn update(&mut self, elapsed: f32, sim: &mut WcsphSimulation) -> usize {
        // a non-positive interval would never drain the accumulator
        if self.interval <= 0.0 {
            return 0;
        }
        self.accumulated += elapsed;
        let mut emitted = 0;
        while self.accumulated >= self.interval {
            self.accumulated -= self.interval;
            emitted += self.emit_block(sim);
        }
        emitted
    }

    fn emit_block(&mut self, sim: &mut WcsphSimulation) -> usize {
        let mut emitted = 0;
        let spacing = self.spacing;
        let mut i = -0.5;
        while i < 0.5 {
            let mut j = 0.0;
            while j < 0.2 {
                let mut k = -0.5;
                while k < 0.5 {
                    let jitter = self.next_jitter() * spacing * 0.1;
                    let pos = self.position + Vec3::new(i, j, k) + jitter;
                    if sim.insert_particle(
                        pos,
                        self.direction,
                        Vec3::ZERO,
                        ParticleAttributes::fluid(self.radius, self.mass),
                    ) {
                        emitted += 1;
                    }
                    k += spacing;
                }
                j += spacing;
            }
            i += spacing;
        }
        emitted
    }

    // xorshift, mapped into [-1, 1] per axis
    fn next_jitter(&mut self) -> Vec3 {
        let mut next = || {
            let mut x = self.jitter_state;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.jitter_state = x;
            (x as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        Vec3::new(next(), next(), next())
    }
}
