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

use crate::random_streams::ScenarioId;

/// A weighted sample of the latent state, tagged with the scenario whose
/// pre-sampled random stream it must replay at every depth it visits.
#[derive(Clone, Debug)]
pub struct Particle<S> {
    pub state: S,
    pub weight: f64,
    pub scenario_id: ScenarioId,
}

impl<S> Particle<S> {
    pub fn new(state: S, weight: f64, scenario_id: ScenarioId) -> Self {
        Self { state, weight, scenario_id }
    }
}

/// Total weight of a particle set. At the root this is 1 (assuming the
/// belief was normalized before sampling); it is conserved by re-partition
/// (§4.4) up to floating-point tolerance.
pub fn mass<S>(particles: &[Particle<S>]) -> f64 {
    particles.iter().map(|p| p.weight).sum()
}
