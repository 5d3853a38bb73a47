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

use rand::Rng;

/// A scenario is an index into the pre-sampled random-stream matrix. Every
/// particle carries one, and replays identical noise whenever it visits the
/// same depth -- this is what determinizes the sparse tree.
pub type ScenarioId = i32;

/// A pre-sampled `N x D` table of uniform `[0, 1)` draws, one row per
/// scenario and one column per depth. Read-only after construction; the only
/// mutable state is the per-traversal depth cursor threaded through `Expand`
/// and the bound modules, never stored here.
pub struct RandomStreams {
    num_scenarios: usize,
    search_depth: usize,
    table: Vec<f64>,
}

impl RandomStreams {
    /// Draws a fresh `N x D` table from `rng`. Construction is the only
    /// place genuine entropy enters the search -- everything downstream
    /// replays these values deterministically.
    pub fn new<R: Rng + ?Sized>(rng: &mut R, num_scenarios: usize, search_depth: usize) -> Self {
        let table = (0..num_scenarios * search_depth)
            .map(|_| rng.gen_range(0.0..1.0))
            .collect();

        Self { num_scenarios, search_depth, table }
    }

    pub fn num_scenarios(&self) -> usize {
        self.num_scenarios
    }

    pub fn search_depth(&self) -> usize {
        self.search_depth
    }

    /// The draw a particle tagged `scenario` makes at `depth`. Idempotent:
    /// calling this twice with the same arguments returns the same value,
    /// which is the entire point of determinization.
    pub fn entry(&self, scenario: ScenarioId, depth: u32) -> f64 {
        let scenario = scenario as usize;
        let depth = depth as usize;

        debug_assert!(scenario < self.num_scenarios, "scenario {} out of range", scenario);
        debug_assert!(depth < self.search_depth, "depth {} out of range", depth);

        self.table[scenario * self.search_depth + depth]
    }
}
