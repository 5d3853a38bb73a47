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

use thiserror::Error;

/// Configuration is rejected at entry, before a single trial runs.
///
/// Anything past construction is an invariant violation (fatal, see
/// `debug_assert!`/`assert!` call sites throughout `search` and `tree`),
/// not a `ConfigError` -- this is the one fallible boundary of the crate.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("time_per_move must be positive, got {0}")]
    NonPositiveTimePerMove(f64),

    #[error("num_scenarios must be at least 1, got {0}")]
    TooFewScenarios(u32),

    #[error("discount must be in (0, 1], got {0}")]
    DiscountOutOfRange(f64),

    #[error("xi must be in (0, 1], got {0}")]
    XiOutOfRange(f64),

    #[error("pruning_constant must be non-negative, got {0}")]
    NegativePruningConstant(f64),
}
