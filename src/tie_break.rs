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

//! §4.8's open question -- what breaks an exact tie between root actions,
//! and when a deeply pessimistic root should be overridden rather than
//! trusted -- is left to the caller as injectable policy rather than
//! hard-coded into `optimal_action`.

use crate::model::ActionId;

/// Decides which of two equally-valued root actions to prefer.
/// `optimal_action` only calls this on an exact value tie; it never
/// affects a strict improvement.
pub trait TieBreakPolicy {
    fn prefer_on_tie(&self, candidate: ActionId, incumbent: ActionId) -> bool;
}

/// Keeps whichever action was found first. Since `optimal_action` walks
/// root Q-nodes in ascending action id, this is "lowest action id wins".
pub struct LowestActionIdWins;

impl TieBreakPolicy for LowestActionIdWins {
    fn prefer_on_tie(&self, _candidate: ActionId, _incumbent: ActionId) -> bool {
        false
    }
}

/// Always prefers a distinguished action when it is among the tied
/// candidates, e.g. a "do nothing" or "brake" action a domain wants
/// favored whenever the search genuinely can't distinguish outcomes.
pub struct PreferActionOnTie {
    pub preferred: ActionId,
}

impl TieBreakPolicy for PreferActionOnTie {
    fn prefer_on_tie(&self, candidate: ActionId, _incumbent: ActionId) -> bool {
        candidate == self.preferred
    }
}

/// Lets a root whose bounds are both deeply negative fall back to a safe
/// action rather than trust whichever Q-node happened to edge out the
/// rest. `maybe_override` is consulted once, after the ordinary
/// tie-break/default-move comparison, and only takes effect when it
/// returns `Some`.
pub trait PessimismClamp {
    fn maybe_override(&self, root_lower_bound: f64, root_upper_bound: f64) -> Option<ActionId>;
}

pub struct NoPessimismClamp;

impl PessimismClamp for NoPessimismClamp {
    fn maybe_override(&self, _root_lower_bound: f64, _root_upper_bound: f64) -> Option<ActionId> {
        None
    }
}

/// Overrides to `fallback_action` when the root's bound sandwich has
/// converged (gap below `gap_threshold`) on a value no better than
/// `value_threshold` -- i.e. the search is confident the situation is bad,
/// not merely unresolved.
pub struct DeepPessimismClamp {
    pub gap_threshold: f64,
    pub value_threshold: f64,
    pub fallback_action: ActionId,
}

impl PessimismClamp for DeepPessimismClamp {
    fn maybe_override(&self, root_lower_bound: f64, root_upper_bound: f64) -> Option<ActionId> {
        let gap = root_upper_bound - root_lower_bound;

        if gap < self.gap_threshold && root_upper_bound <= self.value_threshold {
            Some(self.fallback_action)
        } else {
            None
        }
    }
}

/// Bundles both injectable policies `optimal_action` consults. Defaults
/// to lowest-action-id tie-breaking and no pessimism override, matching
/// the original's unconditional `astar` walk.
pub struct OptimalActionPolicy {
    pub tie_break: Box<dyn TieBreakPolicy + Send + Sync>,
    pub pessimism_clamp: Box<dyn PessimismClamp + Send + Sync>,
}

impl Default for OptimalActionPolicy {
    fn default() -> Self {
        Self {
            tie_break: Box::new(LowestActionIdWins),
            pessimism_clamp: Box::new(NoPessimismClamp),
        }
    }
}
