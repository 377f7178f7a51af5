// Copyright 2025 eraflo
//
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

//! The gate between pipeline mutation and frame execution.
//!
//! Any number of threads may hold a [`MutationPermit`] at once. Freezing waits
//! until every permit has been released and then blocks new permits until the
//! freezing thread unfreezes. Mutation and execution therefore never overlap,
//! while mutations may freely interleave with each other outside a frame.

use crate::renderer::binding::lock;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Misuse of a [`StateMutationBarrier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The calling thread froze the barrier and would wait on itself.
    PermitWhileFrozen,
    /// The calling thread already froze the barrier.
    AlreadyFrozen,
    /// The calling thread holds a permit and would wait on itself.
    PermitHeldByFreezer,
    /// The calling thread has not frozen the barrier.
    NotFrozen,
}

impl fmt::Display for BarrierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierError::PermitWhileFrozen => write!(
                f,
                "Can not acquire permit: mutations are frozen from the current thread"
            ),
            BarrierError::AlreadyFrozen => {
                write!(f, "Mutations are already frozen by the current thread")
            }
            BarrierError::PermitHeldByFreezer => write!(
                f,
                "Mutation permits have not been released on the current thread"
            ),
            BarrierError::NotFrozen => {
                write!(f, "Mutations are not currently frozen by this thread")
            }
        }
    }
}

impl std::error::Error for BarrierError {}

#[derive(Debug, Default)]
struct BarrierState {
    frozen_by: Option<ThreadId>,
    permits: HashMap<ThreadId, usize>,
}

impl BarrierState {
    fn active_permits(&self) -> usize {
        self.permits.values().sum()
    }
}

/// Mutual exclusion between structural mutation and frame execution.
#[derive(Debug, Default)]
pub struct StateMutationBarrier {
    state: Mutex<BarrierState>,
    changed: Condvar,
}

impl StateMutationBarrier {
    /// Creates an unfrozen barrier with no permits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until mutations are not frozen, then grants a permit.
    ///
    /// The barrier cannot be frozen until the permit is dropped.
    ///
    /// ## Errors
    /// * [`BarrierError::PermitWhileFrozen`] if the calling thread is the one that froze it.
    pub fn acquire_permit(&self) -> Result<MutationPermit<'_>, BarrierError> {
        let current = thread::current().id();
        let mut state = lock(&self.state);
        if state.frozen_by == Some(current) {
            return Err(BarrierError::PermitWhileFrozen);
        }
        while state.frozen_by.is_some() {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state.permits.entry(current).or_insert(0) += 1;
        Ok(MutationPermit {
            barrier: self,
            owner: current,
        })
    }

    /// Acquires a permit and then locks `mutex`, releasing both together.
    pub fn acquire_permit_with<'a, T>(
        &'a self,
        mutex: &'a Mutex<T>,
    ) -> Result<LockedPermit<'a, T>, BarrierError> {
        let permit = self.acquire_permit()?;
        let guard = lock(mutex);
        Ok(LockedPermit {
            guard,
            _permit: permit,
        })
    }

    /// Waits for every outstanding permit to be released, then blocks new
    /// permits until [`unfreeze_mutations`](Self::unfreeze_mutations) is
    /// called from this thread.
    pub fn freeze_mutations(&self) -> Result<(), BarrierError> {
        let current = thread::current().id();
        let mut state = lock(&self.state);
        if state.frozen_by == Some(current) {
            return Err(BarrierError::AlreadyFrozen);
        }
        if state.permits.get(&current).copied().unwrap_or(0) > 0 {
            return Err(BarrierError::PermitHeldByFreezer);
        }
        while state.frozen_by.is_some() || state.active_permits() > 0 {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.frozen_by = Some(current);
        Ok(())
    }

    /// Lifts a freeze placed by the calling thread and wakes blocked permit requests.
    pub fn unfreeze_mutations(&self) -> Result<(), BarrierError> {
        let current = thread::current().id();
        let mut state = lock(&self.state);
        if state.frozen_by != Some(current) {
            return Err(BarrierError::NotFrozen);
        }
        state.frozen_by = None;
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    /// Freezes mutations until the returned guard is dropped.
    pub fn freeze(&self) -> Result<FrozenMutations<'_>, BarrierError> {
        self.freeze_mutations()?;
        Ok(FrozenMutations { barrier: self })
    }

    /// Whether any thread currently has mutations frozen.
    pub fn is_frozen(&self) -> bool {
        lock(&self.state).frozen_by.is_some()
    }

    /// Number of permits currently held across all threads.
    pub fn active_permits(&self) -> usize {
        lock(&self.state).active_permits()
    }

    fn release_permit(&self, owner: ThreadId) {
        let mut state = lock(&self.state);
        if let Some(count) = state.permits.get_mut(&owner) {
            *count -= 1;
            if *count == 0 {
                state.permits.remove(&owner);
            }
        }
        let idle = state.active_permits() == 0;
        drop(state);
        if idle {
            self.changed.notify_all();
        }
    }
}

/// Permission to mutate pipeline state. Released on drop.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct MutationPermit<'a> {
    barrier: &'a StateMutationBarrier,
    owner: ThreadId,
}

impl Drop for MutationPermit<'_> {
    fn drop(&mut self) {
        self.barrier.release_permit(self.owner);
    }
}

/// A [`MutationPermit`] paired with a held mutex guard.
#[must_use = "the permit and lock are released as soon as they are dropped"]
pub struct LockedPermit<'a, T> {
    // Field order matters: the lock is released before the permit.
    guard: MutexGuard<'a, T>,
    _permit: MutationPermit<'a>,
}

impl<T> Deref for LockedPermit<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LockedPermit<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// A freeze held for the lifetime of the guard.
#[derive(Debug)]
#[must_use = "mutations are unfrozen as soon as the guard is dropped"]
pub struct FrozenMutations<'a> {
    barrier: &'a StateMutationBarrier,
}

impl Drop for FrozenMutations<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.barrier.unfreeze_mutations() {
            log::error!("Failed to unfreeze mutations: {err}");
        }
    }
}
