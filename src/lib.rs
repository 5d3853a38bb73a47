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

//! An anytime, sampling-based search for near-optimal actions over large
//! or continuous partially observable domains. Given a belief and a
//! [`Model`] of the domain's dynamics, [`search::search`] determinizes a
//! sampled set of scenarios into an AND/OR belief tree and grows it,
//! trial by trial, until a wall-clock budget or the root's provable
//! optimality gap runs out.
//!
//! The belief-tracking front end that turns sensor observations into a
//! particle set, and the domain itself (state representation, transition
//! dynamics, reward shaping), are out of scope: everything domain-specific
//! lives behind [`Model`], and everything belief-specific lives behind
//! [`belief::Belief`].

pub mod belief;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod parallel;
pub mod particle;
pub mod pool;
pub mod random_streams;
pub mod search;
pub mod tie_break;
pub mod tree;

pub use belief::{Belief, ParticleBelief};
pub use config::Config;
pub use error::ConfigError;
pub use history::History;
pub use model::{ActionId, LowerBound, Model, ObsHash, StepResult, TrivialLowerBound, TrivialUpperBound, UpperBound, ValuedAction};
pub use particle::Particle;
pub use pool::Pool;
pub use random_streams::{RandomStreams, ScenarioId};
pub use tie_break::{DeepPessimismClamp, LowestActionIdWins, OptimalActionPolicy, PessimismClamp, PreferActionOnTie, TieBreakPolicy};
pub use tree::Tree;
