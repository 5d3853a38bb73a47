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

use crate::model::{ActionId, ObsHash};

/// Append-only action/observation history, with truncation back to a
/// remembered length. Only the tail is ever mutated during a trial.
#[derive(Clone, Debug, Default)]
pub struct History {
    actions: Vec<ActionId>,
    observations: Vec<ObsHash>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: ActionId, obs: ObsHash) {
        self.actions.push(action);
        self.observations.push(obs);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn action(&self, t: usize) -> ActionId {
        self.actions[t]
    }

    pub fn observation(&self, t: usize) -> ObsHash {
        self.observations[t]
    }

    pub fn truncate(&mut self, len: usize) {
        self.actions.truncate(len);
        self.observations.truncate(len);
    }

    /// Pushes `(action, obs)` and returns a guard that truncates back to
    /// the pre-push length when dropped. This is the scope-guard §9 calls
    /// for: manual `truncate` at every return point of `Trial`/`InitBounds`
    /// is a proven bug source in the original, so every exit path --
    /// including early `return`s and panics -- goes through `Drop` instead.
    pub fn push_scoped(&mut self, action: ActionId, obs: ObsHash) -> HistoryGuard<'_> {
        let restore_len = self.len();

        self.push(action, obs);

        HistoryGuard { history: self, restore_len }
    }
}

pub struct HistoryGuard<'a> {
    history: &'a mut History,
    restore_len: usize,
}

impl std::ops::Deref for HistoryGuard<'_> {
    type Target = History;

    fn deref(&self) -> &History {
        self.history
    }
}

impl Drop for HistoryGuard<'_> {
    fn drop(&mut self) {
        self.history.truncate(self.restore_len);
    }
}
