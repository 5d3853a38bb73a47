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

//! The AND/OR search tree (§3, C7). V-nodes (belief/OR) and Q-nodes
//! (action/AND) alternate by depth. Nodes are never deleted mid-tick
//! (§3 "Lifecycle"), so the tree is an append-only arena addressed by
//! index rather than an owned pointer graph -- this is the fallback §9
//! calls for when the target language can't cheaply express the
//! original's raw-pointer cycles, and it is also what lets the parallel
//! driver release its lock across expansion and splice children back in
//! by index afterwards (§4.9).

use std::collections::BTreeMap;

use crate::model::{ActionId, Model, ObsHash, ValuedAction};
use crate::particle::{mass, Particle};

pub type VNodeId = usize;
pub type QNodeId = usize;

/// A belief node (OR node). See §3 for the field-by-field contract.
pub struct VNode<S> {
    pub depth: u32,
    pub incoming_observation: ObsHash,
    pub parent_q: Option<QNodeId>,
    pub particles: Vec<Particle<S>>,
    pub children_q: Vec<QNodeId>,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub utility_upper_bound: f64,
    pub default_move: ValuedAction,
    pub done: bool,
}

impl<S> VNode<S> {
    fn leaf(depth: u32, parent_q: Option<QNodeId>, incoming_observation: ObsHash, particles: Vec<Particle<S>>) -> Self {
        Self {
            depth,
            incoming_observation,
            parent_q,
            particles,
            children_q: Vec::new(),
            lower_bound: f64::NEG_INFINITY,
            upper_bound: f64::INFINITY,
            utility_upper_bound: f64::INFINITY,
            default_move: ValuedAction::new(0, f64::NEG_INFINITY),
            done: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children_q.is_empty()
    }

    pub fn weight(&self) -> f64 {
        mass(&self.particles)
    }

    pub fn gap(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }
}

/// An action node (AND node). See §3 for the field-by-field contract.
pub struct QNode {
    pub parent_v: VNodeId,
    pub action: ActionId,
    pub children_v: BTreeMap<ObsHash, VNodeId>,
    pub step_reward: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub utility_upper_bound: f64,
    pub default_value: f64,
    pub done: bool,
}

impl QNode {
    fn new(parent_v: VNodeId, action: ActionId) -> Self {
        Self {
            parent_v,
            action,
            children_v: BTreeMap::new(),
            step_reward: 0.0,
            lower_bound: f64::NEG_INFINITY,
            upper_bound: f64::INFINITY,
            utility_upper_bound: f64::INFINITY,
            default_value: 0.0,
            done: false,
        }
    }
}

/// The append-only node arena for one `search` call. `ROOT` is always
/// index `0`, which is what lets ancestor-walking helpers (§4.6) avoid
/// threading a separate "root id" through every call.
pub struct Tree<S> {
    v_nodes: Vec<VNode<S>>,
    q_nodes: Vec<QNode>,
}

impl<S> Tree<S> {
    pub const ROOT: VNodeId = 0;

    pub fn new(root_particles: Vec<Particle<S>>) -> Self {
        Self {
            v_nodes: vec![VNode::leaf(0, None, 0, root_particles)],
            q_nodes: Vec::new(),
        }
    }

    pub fn v(&self, id: VNodeId) -> &VNode<S> {
        &self.v_nodes[id]
    }

    pub fn v_mut(&mut self, id: VNodeId) -> &mut VNode<S> {
        &mut self.v_nodes[id]
    }

    pub fn q(&self, id: QNodeId) -> &QNode {
        &self.q_nodes[id]
    }

    pub fn q_mut(&mut self, id: QNodeId) -> &mut QNode {
        &mut self.q_nodes[id]
    }

    pub fn num_v_nodes(&self) -> usize {
        self.v_nodes.len()
    }

    pub fn num_q_nodes(&self) -> usize {
        self.q_nodes.len()
    }

    /// Allocates a Q-node as child `action` of `parent`. Caller is
    /// responsible for pushing the returned id onto `parent`'s
    /// `children_q` at the right index.
    pub fn alloc_q(&mut self, parent: VNodeId, action: ActionId) -> QNodeId {
        self.q_nodes.push(QNode::new(parent, action));
        self.q_nodes.len() - 1
    }

    pub fn alloc_v(&mut self, depth: u32, parent_q: QNodeId, obs: ObsHash, particles: Vec<Particle<S>>) -> VNodeId {
        self.v_nodes.push(VNode::leaf(depth, Some(parent_q), obs, particles));
        self.v_nodes.len() - 1
    }

    /// The grandparent V-node, i.e. "the ancestor one level up the AND/OR
    /// alternation" -- `cur->parent()->parent()` in the original. `None`
    /// at the root.
    pub fn parent_v(&self, id: VNodeId) -> Option<VNodeId> {
        let parent_q = self.v(id).parent_q?;
        Some(self.q(parent_q).parent_v)
    }

    pub fn is_root(&self, id: VNodeId) -> bool {
        self.v(id).parent_q.is_none()
    }

    pub fn root_gap(&self) -> f64 {
        self.v(Self::ROOT).gap()
    }

    /// Frees every surviving particle's state back to the model, in node
    /// order. Mirrors `root->Free(model)` at the end of `DESPOT::Search`;
    /// called once per tick, right before the tree itself is dropped.
    pub fn free_all_particles(&mut self, model: &dyn Model<State = S>) {
        for v_node in &mut self.v_nodes {
            for particle in v_node.particles.drain(..) {
                model.free(particle.state);
            }
        }
    }

    /// §B.1 supplemented feature: clamped, temperature-scaled softmax over
    /// the root's Q-node lower bounds, generalized from the original's
    /// hardcoded 3-action `ImprovedPolicy`.
    pub fn improved_policy(&self, tau: f64) -> Vec<f64> {
        let root = self.v(Self::ROOT);
        let clamp = |v: f64| v.clamp(-2.0, 2.0) / tau;

        let scaled: Vec<f64> = root.children_q.iter()
            .map(|&q| clamp(self.q(q).lower_bound))
            .collect();

        let max_scaled = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp_values: Vec<f64> = scaled.iter().map(|&v| (v - max_scaled).exp()).collect();
        let sum: f64 = exp_values.iter().sum();

        if sum <= 0.0 {
            vec![1.0 / scaled.len().max(1) as f64; scaled.len()]
        } else {
            exp_values.into_iter().map(|v| v / sum).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particles(n: usize) -> Vec<Particle<()>> {
        (0..n).map(|i| Particle::new((), 1.0 / n as f64, i as i32)).collect()
    }

    #[test]
    fn root_is_index_zero_and_leaf() {
        let tree = Tree::new(particles(4));

        assert_eq!(Tree::<()>::ROOT, 0);
        assert!(tree.v(Tree::<()>::ROOT).is_leaf());
        assert!(tree.is_root(Tree::<()>::ROOT));
    }

    #[test]
    fn parent_v_walks_grandparent() {
        let mut tree = Tree::new(particles(2));
        let q0 = tree.alloc_q(Tree::<()>::ROOT, 0);
        tree.v_mut(Tree::<()>::ROOT).children_q.push(q0);
        let v1 = tree.alloc_v(1, q0, 42, particles(2));

        assert_eq!(tree.parent_v(v1), Some(Tree::<()>::ROOT));
        assert_eq!(tree.parent_v(Tree::<()>::ROOT), None);
    }

    #[test]
    fn improved_policy_sums_to_one() {
        let mut tree = Tree::new(particles(1));

        for (action, lower) in [(0u32, 0.1), (1, 2.0), (2, -3.0)] {
            let q = tree.alloc_q(Tree::<()>::ROOT, action);
            tree.q_mut(q).lower_bound = lower;
            tree.v_mut(Tree::<()>::ROOT).children_q.push(q);
        }

        let policy = tree.improved_policy(0.1);

        assert_eq!(policy.len(), 3);
        assert!((policy.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(policy[1] > policy[0] && policy[1] > policy[2]);
    }
}
