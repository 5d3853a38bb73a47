// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The belief-tracking front end that turns sensor observations into a
//! particle set is out of scope (§1). This is the narrow seam `search`
//! needs from it: given a weighted belief, draw a scenario-sized particle
//! set to determinize over.

use rand::RngCore;

use crate::particle::Particle;

/// A weighted distribution over `Model::State` that `search` can draw a
/// sampled, determinized particle set from.
pub trait Belief<S> {
    fn sample(&self, num_scenarios: u32, rng: &mut dyn RngCore) -> Vec<Particle<S>>;
}

/// A belief that already holds an explicit, equally-weighted particle set
/// -- the typical shape between control ticks once a caller's own belief
/// tracker has done its resampling. Sampling draws `num_scenarios`
/// particles uniformly at random, with replacement, reweighted so the
/// total mass is `1`.
pub struct ParticleBelief<S> {
    particles: Vec<S>,
}

impl<S: Clone> ParticleBelief<S> {
    pub fn new(particles: Vec<S>) -> Self {
        assert!(!particles.is_empty(), "belief must hold at least one particle");

        Self { particles }
    }
}

impl<S: Clone> Belief<S> for ParticleBelief<S> {
    fn sample(&self, num_scenarios: u32, rng: &mut dyn RngCore) -> Vec<Particle<S>> {
        let n = num_scenarios.max(1) as usize;
        let weight = 1.0 / n as f64;

        (0..n)
            .map(|i| {
                let index = (rng.next_u32() as usize) % self.particles.len();
                Particle::new(self.particles[index].clone(), weight, i as i32)
            })
            .collect()
    }
}
