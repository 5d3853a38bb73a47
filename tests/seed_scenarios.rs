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

//! End-to-end seed scenarios (S1-S6).

use despot_core::{
    ActionId, Belief, Config, History, LowerBound, Model, ObsHash, OptimalActionPolicy,
    ParticleBelief, RandomStreams, StepResult, Tree, UpperBound, ValuedAction,
};
use despot_core::particle::Particle;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Steps taken so far. Action `0` always terminates with reward `1`.
/// Action `1` pays `0` on the first step and `2` on the second, then
/// terminates. Optional symmetric reward noise (driven by `rand01`) is
/// controlled by `noise`.
#[derive(Clone, Copy)]
struct PathModel {
    noise: f64,
}

fn rollout_value_from(state: u32, discount: f64) -> f64 {
    match state {
        0 => 2.0 * discount,
        1 => 2.0,
        _ => 0.0,
    }
}

impl Model for PathModel {
    type State = u32;

    fn num_actions(&self) -> u32 {
        2
    }

    fn step(&self, state: &mut u32, rand01: f64, action: ActionId) -> StepResult {
        let noise = (rand01 - 0.5) * 2.0 * self.noise;

        if action == 0 {
            *state += 1;
            StepResult { reward: 1.0 + noise, obs: 1, terminal: true }
        } else if *state == 0 {
            *state = 1;
            StepResult { reward: 0.0 + noise, obs: 2, terminal: false }
        } else {
            *state = 2;
            StepResult { reward: 2.0 + noise, obs: 3, terminal: true }
        }
    }

    fn discount(&self) -> f64 {
        0.9
    }

    fn create_upper_bound(&self, _name: &str) -> Box<dyn UpperBound<u32> + Send + Sync> {
        Box::new(PathBound { discount: self.discount(), slack: self.noise.abs() * 2.0 })
    }

    fn create_lower_bound(&self, _name: &str) -> Box<dyn LowerBound<u32> + Send + Sync> {
        Box::new(PathBound { discount: self.discount(), slack: self.noise.abs() * 2.0 })
    }
}

/// Rollout bound for [`PathModel`]: the true value of always playing
/// action `1`, loosened by `slack` on either side so noisy rewards still
/// sandwich correctly (property 1, §8).
struct PathBound {
    discount: f64,
    slack: f64,
}

impl LowerBound<u32> for PathBound {
    fn value(&self, particles: &[Particle<u32>], _streams: &RandomStreams, _history: &History) -> ValuedAction {
        let value: f64 = particles.iter().map(|p| p.weight * (rollout_value_from(p.state, self.discount) - self.slack)).sum();
        ValuedAction::new(1, value)
    }
}

impl UpperBound<u32> for PathBound {
    fn value(&self, particles: &[Particle<u32>], _streams: &RandomStreams, _history: &History) -> f64 {
        particles.iter().map(|p| p.weight * (rollout_value_from(p.state, self.discount) + self.slack)).sum()
    }
}

#[test]
fn s1_two_action_toy() {
    let _ = env_logger::try_init();

    let model = PathModel { noise: 0.0 };
    let config = Config { search_depth: 2, num_scenarios: 1, ..Config::default() };
    let belief = ParticleBelief::new(vec![0u32]);

    let astar = despot_core::search::search(
        &model,
        &belief,
        &config,
        "ROLLOUT",
        "ROLLOUT",
        &OptimalActionPolicy::default(),
        &mut SmallRng::seed_from_u64(1),
    ).expect("valid config");

    assert_eq!(astar.action, 1);
    assert!((astar.value - 1.8).abs() < 1e-9, "expected ~1.8, got {}", astar.value);
}

#[test]
fn s2_noise_robustness() {
    let _ = env_logger::try_init();

    let model = PathModel { noise: 0.01 };
    let config = Config { search_depth: 2, num_scenarios: 64, ..Config::default() };
    let belief = ParticleBelief::new(vec![0u32]);

    let astar = despot_core::search::search(
        &model,
        &belief,
        &config,
        "ROLLOUT",
        "ROLLOUT",
        &OptimalActionPolicy::default(),
        &mut SmallRng::seed_from_u64(7),
    ).expect("valid config");

    assert_eq!(astar.action, 1, "noise of +-0.01 must not flip the optimal action");
}

#[test]
fn s3_determinism() {
    let _ = env_logger::try_init();

    let model = PathModel { noise: 0.01 };
    let config = Config { search_depth: 2, num_scenarios: 64, ..Config::default() };
    let belief = ParticleBelief::new(vec![0u32]);

    let run = || {
        despot_core::search::search(
            &model,
            &belief,
            &config,
            "ROLLOUT",
            "ROLLOUT",
            &OptimalActionPolicy::default(),
            &mut SmallRng::seed_from_u64(99),
        ).expect("valid config")
    };

    let first = run();
    let second = run();

    assert_eq!(first.action, second.action);
    assert_eq!(first.value.to_bits(), second.value.to_bits(), "bit-exact reproducibility");
}

/// Three-action variant for S4: action `0` is the default (reward `1.0`),
/// action `1` is marginally better (`1.005`) and action `2` is clearly
/// worse (`0.0`). All three terminate on the first step.
struct ThreeActionModel;

impl Model for ThreeActionModel {
    type State = ();

    fn num_actions(&self) -> u32 {
        3
    }

    fn step(&self, _state: &mut (), _rand01: f64, action: ActionId) -> StepResult {
        let reward = match action {
            0 => 1.0,
            1 => 1.005,
            _ => 0.0,
        };

        StepResult { reward, obs: action as ObsHash, terminal: true }
    }

    fn discount(&self) -> f64 {
        0.9
    }

    fn create_upper_bound(&self, _name: &str) -> Box<dyn UpperBound<()> + Send + Sync> {
        Box::new(DefaultBiasedBound)
    }

    fn create_lower_bound(&self, _name: &str) -> Box<dyn LowerBound<()> + Send + Sync> {
        Box::new(DefaultBiasedBound)
    }
}

/// Names action `0` as the default, valued at exactly its true payoff --
/// untouched by the per-Q-node `pruning_constant` subtraction that
/// `expand` applies uniformly to every action's `step_reward`.
struct DefaultBiasedBound;

impl LowerBound<()> for DefaultBiasedBound {
    fn value(&self, particles: &[Particle<()>], _streams: &RandomStreams, _history: &History) -> ValuedAction {
        ValuedAction::new(0, despot_core::particle::mass(particles) * 1.0)
    }
}

impl UpperBound<()> for DefaultBiasedBound {
    fn value(&self, particles: &[Particle<()>], _streams: &RandomStreams, _history: &History) -> f64 {
        despot_core::particle::mass(particles) * 1.2
    }
}

#[test]
fn s4_pruning_regularization_favors_the_default_move() {
    let _ = env_logger::try_init();

    let model = ThreeActionModel;
    let config = Config {
        search_depth: 2,
        num_scenarios: 1,
        pruning_constant: 0.01,
        ..Config::default()
    };
    let belief = ParticleBelief::new(vec![()]);

    let astar = despot_core::search::search(
        &model,
        &belief,
        &config,
        "DEFAULT",
        "DEFAULT",
        &OptimalActionPolicy::default(),
        &mut SmallRng::seed_from_u64(3),
    ).expect("valid config");

    assert_eq!(astar.action, 0, "a 0.005 edge should not survive a 0.01 pruning cost");
}

#[test]
fn s5_parallel_equals_sequential() {
    let _ = env_logger::try_init();

    let model = PathModel { noise: 0.01 };
    let config = Config { search_depth: 2, num_scenarios: 64, time_per_move: 0.2, ..Config::default() };
    let belief = ParticleBelief::new(vec![0u32]);

    let sequential = despot_core::search::search(
        &model,
        &belief,
        &config,
        "ROLLOUT",
        "ROLLOUT",
        &OptimalActionPolicy::default(),
        &mut SmallRng::seed_from_u64(55),
    ).expect("valid config");

    let parallel = despot_core::parallel::search(
        &model,
        &belief,
        &config,
        "ROLLOUT",
        "ROLLOUT",
        &OptimalActionPolicy::default(),
        &mut SmallRng::seed_from_u64(55),
    ).expect("valid config");

    assert_eq!(sequential.action, parallel.action);
    assert!((sequential.value - parallel.value).abs() < 1e-6);
}

/// A model whose importance-sampling ratio is `2.0` for scenario `0` and
/// `0.0` for scenario `1` under action `0`, to exercise re-partition mass
/// conservation (property 3, §8) under IS.
struct ImportanceSamplingModel;

impl Model for ImportanceSamplingModel {
    type State = i32;

    fn num_actions(&self) -> u32 {
        1
    }

    fn step(&self, _state: &mut i32, _rand01: f64, _action: ActionId) -> StepResult {
        StepResult { reward: 0.0, obs: 1, terminal: false }
    }

    fn importance_sampling_step(&self, state: &mut i32, _rand01: f64, _action: ActionId) -> (StepResult, f64) {
        let ratio = if *state == 0 { 2.0 } else { 0.0 };
        (StepResult { reward: 0.0, obs: 1, terminal: false }, ratio)
    }

    fn discount(&self) -> f64 {
        0.95
    }

    fn create_upper_bound(&self, _name: &str) -> Box<dyn UpperBound<i32> + Send + Sync> {
        Box::new(despot_core::TrivialUpperBound { best_case_reward: 0.0, discount: 0.95 })
    }

    fn create_lower_bound(&self, _name: &str) -> Box<dyn LowerBound<i32> + Send + Sync> {
        Box::new(despot_core::TrivialLowerBound { default_action: 0, worst_case_reward: 0.0, discount: 0.95 })
    }
}

#[test]
fn s6_mass_conservation_under_importance_sampling() {
    let _ = env_logger::try_init();

    let model = ImportanceSamplingModel;
    let config = Config {
        search_depth: 2,
        num_scenarios: 2,
        no_importance_sampling: false,
        ..Config::default()
    };

    let streams = RandomStreams::new(&mut SmallRng::seed_from_u64(11), 2, 2);
    let lower = model.create_lower_bound("TRIVIAL");
    let upper = model.create_upper_bound("TRIVIAL");

    let ctx = despot_core::search::SearchContext {
        model: &model,
        streams: &streams,
        config: &config,
        lower_bound: lower.as_ref(),
        upper_bound: upper.as_ref(),
        parallel: false,
    };

    let particles = vec![Particle::new(0i32, 0.5, 0), Particle::new(1i32, 0.5, 1)];
    let parent_mass = despot_core::particle::mass(&particles);

    let mut tree = Tree::new(particles);
    let mut history = History::new();

    despot_core::search::expand(&mut tree, Tree::<i32>::ROOT, &ctx, &mut history);

    let q0 = tree.v(Tree::<i32>::ROOT).children_q[0];
    let children_mass: f64 = tree.q(q0).children_v.values()
        .map(|&v| tree.v(v).weight())
        .sum();

    assert!((children_mass - parent_mass).abs() < 1e-9, "children mass {} != parent mass {}", children_mass, parent_mass);
}
