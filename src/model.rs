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

//! The only contract between the tree-search core and the domain being
//! planned over (§6.1). Everything domain-specific -- geometry, reward
//! shaping, action enumeration, the belief-tracking front end -- lives
//! behind this trait and is out of scope for the core (§1).

use crate::history::History;
use crate::particle::Particle;

/// Action set is always `[0, num_actions())`.
pub type ActionId = u32;

/// Any 64-bit value stable for identical observations.
pub type ObsHash = u64;

/// An action paired with its value, as produced by a default policy or
/// returned from optimal-action extraction (§4.8).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValuedAction {
    pub action: ActionId,
    pub value: f64,
}

impl ValuedAction {
    pub fn new(action: ActionId, value: f64) -> Self {
        Self { action, value }
    }
}

/// Outcome of simulating one particle through one action.
pub struct StepResult {
    pub reward: f64,
    pub obs: ObsHash,
    pub terminal: bool,
}

/// The adapter the core talks to. Implementations own everything
/// domain-specific: the latent state representation, how an action
/// advances it, how observations are hashed, and how particle states are
/// pooled.
pub trait Model {
    type State: Clone;

    fn num_actions(&self) -> u32;

    /// Advances `state` in place using `rand01 ∈ [0, 1)` pulled from the
    /// particle's determinized stream at the current depth.
    fn step(&self, state: &mut Self::State, rand01: f64, action: ActionId) -> StepResult;

    /// Same contract as `step`, additionally scaling `state`'s weight (via
    /// the particle, not the state) by an importance-sampling ratio.
    /// Called instead of `step` when `Config::no_importance_sampling` is
    /// `false`. The default forwards to `step` with a ratio of `1.0`,
    /// matching the original's `DSPOMDP::ImportanceSamplingStep` default.
    fn importance_sampling_step(&self, state: &mut Self::State, rand01: f64, action: ActionId) -> (StepResult, f64) {
        (self.step(state, rand01, action), 1.0)
    }

    fn copy(&self, state: &Self::State) -> Self::State {
        state.clone()
    }

    fn free(&self, _state: Self::State) {}

    /// `∈ (0, 1]`.
    fn discount(&self) -> f64;

    fn create_upper_bound(&self, name: &str) -> Box<dyn UpperBound<Self::State> + Send + Sync>;
    fn create_lower_bound(&self, name: &str) -> Box<dyn LowerBound<Self::State> + Send + Sync>;
}

/// `UpperBound::value` must be deterministic given the streams and history.
pub trait UpperBound<S> {
    fn value(
        &self,
        particles: &[Particle<S>],
        streams: &crate::random_streams::RandomStreams,
        history: &History,
    ) -> f64;
}

/// `LowerBound::value` must be deterministic given the streams and history,
/// and additionally names the action the underlying default policy would
/// take -- this becomes a node's `default_move`.
pub trait LowerBound<S> {
    fn value(
        &self,
        particles: &[Particle<S>],
        streams: &crate::random_streams::RandomStreams,
        history: &History,
    ) -> ValuedAction;
}

/// Broadcasts a fixed best-case value across the horizon, discounted by
/// `1/(1 - discount)` so it bounds any achievable return. Mirrors
/// `pomdp.cpp`'s `"TRIVIAL"`/`"DEFAULT"` `ParticleUpperBound`: a safe
/// scaffolding bound, not a tight one.
pub struct TrivialUpperBound {
    pub best_case_reward: f64,
    pub discount: f64,
}

impl<S> UpperBound<S> for TrivialUpperBound {
    fn value(&self, particles: &[Particle<S>], _streams: &crate::random_streams::RandomStreams, _history: &History) -> f64 {
        let mass = crate::particle::mass(particles);
        let horizon_value = if self.discount < 1.0 {
            self.best_case_reward / (1.0 - self.discount)
        } else {
            f64::INFINITY
        };

        mass * horizon_value
    }
}

/// Always recommends a fixed default action, valued at a fixed worst-case
/// reward broadcast across the horizon. Mirrors `"TRIVIAL"` `ParticleLowerBound`.
pub struct TrivialLowerBound {
    pub default_action: ActionId,
    pub worst_case_reward: f64,
    pub discount: f64,
}

impl<S> LowerBound<S> for TrivialLowerBound {
    fn value(&self, particles: &[Particle<S>], _streams: &crate::random_streams::RandomStreams, _history: &History) -> ValuedAction {
        let mass = crate::particle::mass(particles);
        let horizon_value = if self.discount < 1.0 {
            self.worst_case_reward / (1.0 - self.discount)
        } else {
            f64::NEG_INFINITY
        };

        ValuedAction::new(self.default_action, mass * horizon_value)
    }
}
