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

//! The tree-search engine: `Trial`/`Expand`/`Backup` (§4.3-§4.5),
//! blocker exploitation (§4.6), optimal-action extraction (§4.8), and the
//! offline `Prune` diagnostic (§4.7). `build_tree` and `search` are the
//! sequential anytime driver; `crate::parallel` reuses every function in
//! this module for the multi-worker driver.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::belief::Belief;
use crate::config::Config;
use crate::error::ConfigError;
use crate::history::History;
use crate::model::{ActionId, LowerBound, Model, ObsHash, UpperBound, ValuedAction};
use crate::particle::{mass, Particle};
use crate::tie_break::OptimalActionPolicy;
use crate::tree::{QNodeId, Tree, VNodeId};

/// The epsilon in "stop once the root's bound sandwich has closed to
/// within ε" (§4.2).
const ROOT_GAP_EPSILON: f64 = 1e-6;

/// Everything a trial, expansion or backup needs that does not belong to
/// the tree itself. Bundled the way `ThreadContext` bundles a worker's
/// fixed dependencies, so both the sequential driver and each parallel
/// worker can pass one reference around instead of five.
pub struct SearchContext<'a, M: Model> {
    pub model: &'a M,
    pub streams: &'a crate::random_streams::RandomStreams,
    pub config: &'a Config,
    pub lower_bound: &'a (dyn LowerBound<M::State> + Send + Sync),
    pub upper_bound: &'a (dyn UpperBound<M::State> + Send + Sync),

    /// Selects which driver is calling `trial`. The original only marks a
    /// V-node `done` at the end of a descent in `ParallelTrial`; the
    /// sequential `Trial` never does, so a node the sequential driver
    /// leaves behind can still be reconsidered once the root bounds
    /// tighten further. `false` for `search::search`, `true` for
    /// `parallel::search`.
    pub parallel: bool,
}

pub fn gap<S>(tree: &Tree<S>, id: VNodeId) -> f64 {
    tree.v(id).gap()
}

/// `WEU(v) = gap(v) - ξ · weight(v) · gap(root)` (§4.3).
pub fn weu<S>(tree: &Tree<S>, id: VNodeId, xi: f64) -> f64 {
    gap(tree, id) - xi * tree.v(id).weight() * tree.root_gap()
}

/// Best non-done Q-child of `vnode` by upper bound, ties broken by lowest
/// action id (children are allocated in ascending action order, so a
/// strict `>` naturally keeps the first).
pub fn select_best_upper_bound_node<S>(tree: &Tree<S>, vnode: VNodeId) -> Option<QNodeId> {
    let mut best: Option<(QNodeId, f64)> = None;

    for &q in &tree.v(vnode).children_q {
        let qn = tree.q(q);
        if qn.done {
            continue;
        }

        if best.map_or(true, |(_, best_value)| qn.upper_bound > best_value) {
            best = Some((q, qn.upper_bound));
        }
    }

    best.map(|(q, _)| q)
}

/// Best non-done V-child of `qnode` by WEU. Ties go to the later
/// (greater-`ObsHash`) child, matching the original's `>=` comparison
/// while walking observations in ascending order.
pub fn select_best_weu_node<S>(tree: &Tree<S>, qnode: QNodeId, xi: f64) -> Option<VNodeId> {
    let mut best: Option<(VNodeId, f64)> = None;

    for &v in tree.q(qnode).children_v.values() {
        if tree.v(v).done {
            continue;
        }

        let w = weu(tree, v, xi);
        if best.map_or(true, |(_, best_w)| w >= best_w) {
            best = Some((v, w));
        }
    }

    best.map(|(v, _)| v)
}

/// Seeds a freshly allocated V-node's bounds from the lower/upper bound
/// policies (§4.4). Depth-limited and bound-crossed nodes collapse their
/// upper bound down to the lower bound immediately, since no further
/// search could ever improve them.
pub fn init_bounds<M: Model>(tree: &mut Tree<M::State>, id: VNodeId, ctx: &SearchContext<M>, history: &History) {
    let depth = tree.v(id).depth;
    let discount = ctx.config.discount_at(depth);

    let default_move = ctx.lower_bound.value(&tree.v(id).particles, ctx.streams, history);
    let lower_value = default_move.value * discount;

    let raw_upper = ctx.upper_bound.value(&tree.v(id).particles, ctx.streams, history);
    let utility_upper = raw_upper * discount;
    let mut upper_value = utility_upper - ctx.config.pruning_constant;

    // No V-node beyond `search_depth - 1` may ever be expanded, so its
    // bounds must already be tight -- this also covers `search_depth ==
    // 0`, where the root itself is this node.
    let at_depth_limit = depth + 1 >= ctx.config.search_depth;

    if upper_value < lower_value || at_depth_limit {
        upper_value = lower_value;
    }

    debug_assert!(lower_value.is_finite(), "lower bound must be finite");
    debug_assert!(upper_value.is_finite(), "upper bound must be finite");

    let node = tree.v_mut(id);
    node.default_move = ValuedAction::new(default_move.action, lower_value);
    node.lower_bound = lower_value;
    node.upper_bound = upper_value;
    node.utility_upper_bound = utility_upper;
}

/// Creates one Q-node per action, determinizes every root particle's step
/// under each, re-partitions the results by observation, and seeds every
/// resulting V-child's bounds (§4.4).
pub fn expand<M: Model>(tree: &mut Tree<M::State>, node: VNodeId, ctx: &SearchContext<M>, history: &mut History) {
    let depth = tree.v(node).depth;
    let parent_mass = tree.v(node).weight();
    let num_actions = ctx.model.num_actions();

    for action in 0..num_actions {
        let q_id = tree.alloc_q(node, action);
        tree.v_mut(node).children_q.push(q_id);

        let snapshot: Vec<Particle<M::State>> = tree.v(node).particles.iter()
            .map(|p| Particle::new(ctx.model.copy(&p.state), p.weight, p.scenario_id))
            .collect();

        let mut partitions: BTreeMap<ObsHash, Vec<Particle<M::State>>> = BTreeMap::new();
        let mut step_reward_sum = 0.0_f64;

        for mut particle in snapshot {
            let original_weight = particle.weight;
            let rand01 = ctx.streams.entry(particle.scenario_id, depth);

            let step_result = if ctx.config.no_importance_sampling {
                ctx.model.step(&mut particle.state, rand01, action)
            } else {
                let (result, ratio) = ctx.model.importance_sampling_step(&mut particle.state, rand01, action);
                particle.weight *= ratio;
                result
            };

            step_reward_sum += step_result.reward * original_weight;

            if step_result.terminal {
                ctx.model.free(particle.state);
            } else {
                partitions.entry(step_result.obs).or_default().push(particle);
            }
        }

        let children_mass: f64 = partitions.values().map(|ps| mass(ps)).sum();
        let normalizer = if ctx.config.unnormalized || children_mass == 0.0 {
            1.0
        } else {
            parent_mass / children_mass
        };

        if normalizer != 1.0 {
            for particles in partitions.values_mut() {
                for particle in particles.iter_mut() {
                    particle.weight *= normalizer;
                }
            }
        }

        step_reward_sum = ctx.config.discount_at(depth) * step_reward_sum - ctx.config.pruning_constant;

        let mut lower_sum = step_reward_sum;
        let mut upper_sum = step_reward_sum;

        for (obs, particles) in partitions {
            let v_id = tree.alloc_v(depth + 1, q_id, obs, particles);
            tree.q_mut(q_id).children_v.insert(obs, v_id);

            {
                let guard_history = history.push_scoped(action, obs);
                init_bounds(tree, v_id, ctx, &guard_history);
            }

            lower_sum += tree.v(v_id).lower_bound;
            upper_sum += tree.v(v_id).upper_bound;
        }

        let q = tree.q_mut(q_id);
        q.step_reward = step_reward_sum;
        q.lower_bound = lower_sum;
        q.upper_bound = upper_sum;
        q.utility_upper_bound = upper_sum + ctx.config.pruning_constant;
        q.default_value = lower_sum;
    }
}

fn update_v<S>(tree: &mut Tree<S>, id: VNodeId) {
    if tree.v(id).is_leaf() {
        return;
    }

    let default_value = tree.v(id).default_move.value;
    let mut lower = default_value;
    let mut upper = default_value;
    let mut utility_upper = f64::NEG_INFINITY;

    for &q in &tree.v(id).children_q {
        let qn = tree.q(q);
        lower = lower.max(qn.lower_bound);
        upper = upper.max(qn.upper_bound);
        utility_upper = utility_upper.max(qn.utility_upper_bound);
    }

    let node = tree.v_mut(id);
    if lower > node.lower_bound {
        node.lower_bound = lower;
    }
    if upper < node.upper_bound {
        node.upper_bound = upper;
    }
    if utility_upper < node.utility_upper_bound {
        node.utility_upper_bound = utility_upper;
    }
}

fn update_q<S>(tree: &mut Tree<S>, id: QNodeId, pruning_constant: f64) {
    let step_reward = tree.q(id).step_reward;
    let mut lower = step_reward;
    let mut upper = step_reward;
    let mut utility_upper = step_reward + pruning_constant;

    let children: Vec<VNodeId> = tree.q(id).children_v.values().copied().collect();
    for v in children {
        let vn = tree.v(v);
        lower += vn.lower_bound;
        upper += vn.upper_bound;
        utility_upper += vn.utility_upper_bound;
    }

    let q = tree.q_mut(id);
    if lower > q.lower_bound {
        q.lower_bound = lower;
    }
    if upper < q.upper_bound {
        q.upper_bound = upper;
    }
    if utility_upper < q.utility_upper_bound {
        q.utility_upper_bound = utility_upper;
    }
}

/// Walks from `leaf` back to the root, tightening every ancestor's bounds
/// monotonically (§4.5). Never loosens a bound -- only `min`/`max` moves
/// them toward each other.
pub fn backup<S>(tree: &mut Tree<S>, leaf: VNodeId, pruning_constant: f64) {
    let mut v = leaf;

    loop {
        update_v(tree, v);

        match tree.v(v).parent_q {
            None => break,
            Some(q) => {
                update_q(tree, q, pruning_constant);
                v = tree.q(q).parent_v;
            }
        }
    }
}

/// Walks ancestors of `start`, jumping one full V-Q-V alternation at a
/// time, looking for the first node whose utility upper bound -- derated
/// by how many hops up it took to reach it -- no longer beats its own
/// default move. That node is the "blocker": nothing beyond it can be
/// worth the `pruning_constant` cost of continuing to search (§4.6).
pub fn find_blocker<S>(tree: &Tree<S>, start: VNodeId, pruning_constant: f64) -> Option<VNodeId> {
    let mut cur = Some(start);
    let mut count = 1i64;

    while let Some(id) = cur {
        let node = tree.v(id);
        if node.utility_upper_bound - (count as f64) * pruning_constant <= node.default_move.value {
            return Some(id);
        }

        count += 1;
        cur = tree.parent_v(id);
    }

    None
}

fn collapse_to_default<S>(tree: &mut Tree<S>, id: VNodeId) {
    let value = tree.v(id).default_move.value;
    let node = tree.v_mut(id);
    node.lower_bound = value;
    node.upper_bound = value;
    node.utility_upper_bound = value;
}

/// Repeatedly finds and collapses blockers on the path from `vnode` up to
/// the root, re-backing up after each collapse (§4.6). A no-op when
/// `pruning_constant <= 0`, since then nothing can ever be a blocker.
///
/// When the blocker is the node under examination itself (or the root),
/// only that node collapses. Otherwise every sibling V-node under the
/// blocker's parent Q-node collapses together -- the blocker result
/// applies to the whole observation partition, not just the branch that
/// found it.
pub fn exploit_blockers<S>(tree: &mut Tree<S>, vnode: VNodeId, pruning_constant: f64) {
    if pruning_constant <= 0.0 {
        return;
    }

    let mut cur = Some(vnode);

    while let Some(id) = cur {
        match find_blocker(tree, id, pruning_constant) {
            None => break,
            Some(blocker_id) => {
                if tree.is_root(id) || blocker_id == id {
                    collapse_to_default(tree, id);
                } else {
                    let parent_q = tree.v(id).parent_q.expect("checked is_root above");
                    let siblings: Vec<VNodeId> = tree.q(parent_q).children_v.values().copied().collect();

                    for sibling in siblings {
                        collapse_to_default(tree, sibling);
                    }

                    log::warn!("exploit_blockers: collapsed observation partition at v={}", parent_q);
                }

                backup(tree, id, pruning_constant);

                cur = if tree.is_root(id) { None } else { tree.parent_v(id) };
            }
        }
    }
}

/// One full descent from `root` to a leaf, expanding at most once, and
/// back-propagating nothing itself -- callers run `backup` on the
/// returned leaf. History is restored to its pre-trial length on every
/// exit path, manually, since a guard held across the loop's own
/// `history.push`/`expand` calls would alias `history` under the borrow
/// checker.
pub fn trial<M: Model>(tree: &mut Tree<M::State>, root: VNodeId, ctx: &SearchContext<M>, history: &mut History) -> VNodeId {
    let restore_len = history.len();
    let mut cur = root;

    loop {
        exploit_blockers(tree, cur, ctx.config.pruning_constant);

        if gap(tree, cur) <= ROOT_GAP_EPSILON {
            break;
        }

        if tree.v(cur).is_leaf() {
            expand(tree, cur, ctx, history);
        }

        let qstar = match select_best_upper_bound_node(tree, cur) {
            Some(q) => q,
            None => break,
        };

        let next = match select_best_weu_node(tree, qstar, ctx.config.xi) {
            Some(v) => v,
            None => {
                tree.q_mut(qstar).done = true;
                break;
            }
        };

        history.push(tree.q(qstar).action, tree.v(next).incoming_observation);
        cur = next;

        if weu(tree, cur, ctx.config.xi) <= 0.0 {
            break;
        }
    }

    if ctx.parallel {
        tree.v_mut(cur).done = true;
    }

    history.truncate(restore_len);
    cur
}

/// Grows the tree by repeated trial/backup, stopping once the projected
/// time for one more trial would exceed `time_budget`, or once the root's
/// bound sandwich has closed to within ε (§4.2). At least one trial
/// always runs, even against a budget too small to honor -- §8's "smaller
/// than one trial" boundary is handled by `optimal_action` falling back
/// to the default move, not by skipping the trial.
pub fn build_tree<M: Model>(tree: &mut Tree<M::State>, ctx: &SearchContext<M>, history: &mut History, time_budget: Duration) {
    init_bounds(tree, Tree::<M::State>::ROOT, ctx, history);

    let start = Instant::now();
    let mut trials: u64 = 0;
    let budget_secs = time_budget.as_secs_f64();

    loop {
        let leaf = trial(tree, Tree::<M::State>::ROOT, ctx, history);
        backup(tree, leaf, ctx.config.pruning_constant);
        trials += 1;

        let elapsed = start.elapsed().as_secs_f64();
        let projected = elapsed * (trials as f64 + 1.0) / trials as f64;

        if projected >= budget_secs || tree.root_gap() <= ROOT_GAP_EPSILON {
            break;
        }
    }

    log::debug!(
        "build_tree: {} trials in {:.3}s, root gap {:.6}, {} v-nodes, {} q-nodes",
        trials,
        start.elapsed().as_secs_f64(),
        tree.root_gap(),
        tree.num_v_nodes(),
        tree.num_q_nodes(),
    );
}

/// Extracts the best root action (§4.8): the highest lower-bound Q-child,
/// ties broken by `policy.tie_break`, overridden by the root's own
/// default move if that beats every child, then finally overridden again
/// if `policy.pessimism_clamp` fires.
pub fn optimal_action<S>(tree: &Tree<S>, root: VNodeId, policy: &OptimalActionPolicy) -> ValuedAction {
    let node = tree.v(root);

    let mut astar: Option<ValuedAction> = None;
    for &q in &node.children_q {
        let qn = tree.q(q);
        let candidate = ValuedAction::new(qn.action, qn.lower_bound);

        astar = Some(match astar {
            None => candidate,
            Some(incumbent) => {
                if candidate.value > incumbent.value {
                    candidate
                } else if candidate.value == incumbent.value && policy.tie_break.prefer_on_tie(candidate.action, incumbent.action) {
                    candidate
                } else {
                    incumbent
                }
            }
        });
    }

    let mut astar = astar.unwrap_or(node.default_move);
    if node.default_move.value > astar.value {
        astar = node.default_move;
    }

    if let Some(override_action) = policy.pessimism_clamp.maybe_override(node.lower_bound, node.upper_bound) {
        astar.action = override_action;
    }

    astar
}

/// An offline diagnostic (§4.7): recomputes, for a fully-searched tree,
/// the value of the greedy policy that always follows whichever action
/// has the best pruned value, collapsing to the default move wherever
/// that is no worse. Not on the live search path -- used by tests and
/// tooling that compares search quality against the best policy the tree
/// already contains.
pub enum PolicyNode {
    Default(ValuedAction),
    Action {
        action: ActionId,
        step_reward: f64,
        children: BTreeMap<ObsHash, Box<PolicyNode>>,
    },
}

pub fn prune_v<S>(tree: &Tree<S>, id: VNodeId, pruning_constant: f64) -> (PolicyNode, f64) {
    let node = tree.v(id);

    let mut best: Option<(f64, PolicyNode)> = None;
    for &q in &node.children_q {
        let (child_policy, nu) = prune_q(tree, q, pruning_constant);

        if best.as_ref().map_or(true, |(best_nu, _)| nu > *best_nu) {
            best = Some((nu, child_policy));
        }
    }

    match best {
        Some((nu, policy)) if nu >= node.default_move.value => (policy, nu),
        _ => (PolicyNode::Default(node.default_move), node.default_move.value),
    }
}

pub fn prune_q<S>(tree: &Tree<S>, id: QNodeId, pruning_constant: f64) -> (PolicyNode, f64) {
    let q = tree.q(id);

    // §4.7's formula subtracts `pruning_constant` from `step_reward` a
    // second time here -- `step_reward` already had it subtracted once
    // during `expand`. This matches the original exactly and is
    // intentional, not a transcription error.
    let mut value = q.step_reward - pruning_constant;
    let mut children = BTreeMap::new();

    for (&obs, &v) in &q.children_v {
        let (child_policy, nu) = prune_v(tree, v, pruning_constant);
        value += nu;
        children.insert(obs, Box::new(child_policy));
    }

    (PolicyNode::Action { action: q.action, step_reward: q.step_reward, children }, value)
}

/// Samples a fresh particle set from `belief`, determinizes it, grows a
/// new tree for up to `config.time_per_move` seconds, and returns the
/// best root action. `Config::validate` is the crate's one fallible
/// boundary (§7); everything downstream is an `assert!`/`debug_assert!`-
/// checked invariant.
pub fn search<M: Model>(
    model: &M,
    belief: &dyn Belief<M::State>,
    config: &Config,
    lower_bound_name: &str,
    upper_bound_name: &str,
    policy: &OptimalActionPolicy,
    rng: &mut dyn rand::RngCore,
) -> Result<ValuedAction, ConfigError> {
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
        parallel: false,
    };

    let mut tree = Tree::new(particles);
    let mut history = History::new();

    build_tree(&mut tree, &ctx, &mut history, Duration::from_secs_f64(config.time_per_move));

    let astar = optimal_action(&tree, Tree::<M::State>::ROOT, policy);
    debug_assert!(astar.action < model.num_actions(), "optimal_action must name a valid action");

    tree.free_all_particles(model);

    if !config.silence {
        log::info!("search: chose action {} (value {:.4})", astar.action, astar.value);
    }

    Ok(astar)
}
