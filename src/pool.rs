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

use std::sync::Mutex;

/// Objects are handed out in chunks of this size so that growth is rare
/// and freelist churn does not thrash the allocator.
const CHUNK_SIZE: usize = 256;

struct PoolInner<T> {
    freelist: Vec<T>,
    num_allocated: usize,
    num_chunks: usize,
}

/// A per-type fixed-chunk allocator with a freelist, guarded by a single
/// mutex. Intended for particle states that are expensive to allocate
/// fresh on every `Expand`: callers `allocate` a recycled (or freshly
/// default-constructed) `T`, fill it in, and later `free` it back.
///
/// This is not reference-counted -- forgetting to `free` an allocated
/// value is a leak, not a safety bug (§7), and every exit path of a trial
/// must pair its allocations with a release.
pub struct Pool<T> {
    inner: Mutex<PoolInner<T>>,
}

impl<T: Default> Pool<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                freelist: Vec::new(),
                num_allocated: 0,
                num_chunks: 0,
            }),
        }
    }

    /// Leases a `T` from the freelist, growing the pool by one chunk of
    /// `CHUNK_SIZE` default-constructed objects first if necessary.
    pub fn allocate(&self) -> T {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");

        if inner.freelist.is_empty() {
            inner.freelist.extend((0..CHUNK_SIZE).map(|_| T::default()));
            inner.num_chunks += 1;

            log::debug!("pool grew to {} chunks ({} objects)", inner.num_chunks, inner.num_chunks * CHUNK_SIZE);
        }

        inner.num_allocated += 1;
        inner.freelist.pop().expect("chunk growth just ran")
    }

    /// Returns a previously allocated `T` to the freelist for reuse.
    pub fn free(&self, value: T) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");

        inner.freelist.push(value);
        inner.num_allocated -= 1;
    }

    pub fn num_allocated(&self) -> usize {
        self.inner.lock().expect("pool mutex poisoned").num_allocated
    }
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_grows_by_chunks() {
        let pool: Pool<i32> = Pool::new();
        let mut leased = Vec::new();

        for _ in 0..(CHUNK_SIZE + 1) {
            leased.push(pool.allocate());
        }

        assert_eq!(pool.num_allocated(), CHUNK_SIZE + 1);
        assert_eq!(pool.inner.lock().unwrap().num_chunks, 2);
    }

    #[test]
    fn free_recycles_into_freelist() {
        let pool: Pool<i32> = Pool::new();
        let a = pool.allocate();

        assert_eq!(pool.num_allocated(), 1);

        pool.free(a);

        assert_eq!(pool.num_allocated(), 0);
        assert_eq!(pool.inner.lock().unwrap().freelist.len(), CHUNK_SIZE);
    }

    #[test]
    fn concurrent_allocate_and_free_is_consistent() {
        use std::thread;

        let pool: Pool<i32> = Pool::new();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        let value = pool.allocate();
                        pool.free(value);
                    }
                });
            }
        });

        assert_eq!(pool.num_allocated(), 0);
    }

    /// A toy [`crate::model::Model`] whose `copy`/`free` are backed by a
    /// `Pool` instead of the trait's default `Clone`/no-op, the way a
    /// downstream `Model` with an expensive-to-allocate state would wire
    /// one in.
    struct PooledModel {
        pool: Pool<i32>,
    }

    impl crate::model::Model for PooledModel {
        type State = i32;

        fn num_actions(&self) -> u32 {
            1
        }

        fn step(&self, state: &mut i32, _rand01: f64, _action: crate::model::ActionId) -> crate::model::StepResult {
            *state += 1;
            crate::model::StepResult { reward: 0.0, obs: 0, terminal: true }
        }

        fn copy(&self, state: &i32) -> i32 {
            let mut leased = self.pool.allocate();
            leased = *state;
            leased
        }

        fn free(&self, state: i32) {
            self.pool.free(state);
        }

        fn discount(&self) -> f64 {
            0.9
        }

        fn create_upper_bound(&self, _name: &str) -> Box<dyn crate::model::UpperBound<i32> + Send + Sync> {
            Box::new(crate::model::TrivialUpperBound { best_case_reward: 1.0, discount: 0.9 })
        }

        fn create_lower_bound(&self, _name: &str) -> Box<dyn crate::model::LowerBound<i32> + Send + Sync> {
            Box::new(crate::model::TrivialLowerBound { default_action: 0, worst_case_reward: 0.0, discount: 0.9 })
        }
    }

    #[test]
    fn model_copy_and_free_round_trip_through_a_pool() {
        use crate::model::Model;

        let model = PooledModel { pool: Pool::new() };

        let original = 7;
        let leased = model.copy(&original);
        assert_eq!(leased, original);
        assert_eq!(model.pool.num_allocated(), 1);

        model.free(leased);
        assert_eq!(model.pool.num_allocated(), 0);
    }
}
