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

use crate::error::ConfigError;

/// Tunables for a single `search` call. Mirrors the enumerated options of
/// §6.2; defaults match `Config` in the original source.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Maximum V-node depth.
    pub search_depth: u32,

    /// Particles sampled at root; also the first dimension of `RandomStreams`.
    pub num_scenarios: u32,

    /// Applied per depth step when scaling reward/bounds to the root frame.
    pub discount: f64,

    /// L1 regularization subtracted per Q-node. `0.0` disables blocker
    /// exploitation entirely (§4.6).
    pub pruning_constant: f64,

    /// Target fraction of the root gap a node must exceed to remain
    /// worth expanding (§4.3 WEU).
    pub xi: f64,

    /// Soft wall-clock budget, in seconds, for one `search` call.
    pub time_per_move: f64,

    /// Selects plain `step` (`true`, the default) vs
    /// `importance_sampling_step` (`false`).
    pub no_importance_sampling: bool,

    /// Skip weight renormalization after re-partition.
    pub unnormalized: bool,

    /// Quiet mode for diagnostics/logging.
    pub silence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_depth: 90,
            num_scenarios: 500,
            discount: 0.95,
            pruning_constant: 0.0,
            xi: 0.95,
            time_per_move: 1.0,
            no_importance_sampling: true,
            unnormalized: false,
            silence: false,
        }
    }
}

impl Config {
    /// Rejects the configurations §7 calls out as fatal-at-entry. Everything
    /// else is checked as an invariant during search (`debug_assert!`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_per_move > 0.0) {
            return Err(ConfigError::NonPositiveTimePerMove(self.time_per_move));
        }

        if self.num_scenarios < 1 {
            return Err(ConfigError::TooFewScenarios(self.num_scenarios));
        }

        if !(self.discount > 0.0 && self.discount <= 1.0) {
            return Err(ConfigError::DiscountOutOfRange(self.discount));
        }

        if !(self.xi > 0.0 && self.xi <= 1.0) {
            return Err(ConfigError::XiOutOfRange(self.xi));
        }

        if self.pruning_constant < 0.0 {
            return Err(ConfigError::NegativePruningConstant(self.pruning_constant));
        }

        Ok(())
    }

    /// Discount factor raised to `depth`, as used throughout §4 to scale a
    /// node's reward/bounds back to the root frame.
    pub fn discount_at(&self, depth: u32) -> f64 {
        self.discount.powi(depth as i32)
    }
}
