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

//! # Vesper Pipeline
//!
//! Schedules a frame as an ordered list of render passes. Passes generate
//! render commands into per-thread queues, optionally fanning out across a
//! pool of worker threads, and the queues are flushed to the graphics driver
//! through immediate or deferred contexts.

#![warn(missing_docs)]

pub mod device;
pub mod error;
pub mod parallel;
pub mod pass;
pub mod pipeline;
pub mod queue;
pub mod settings;

pub use device::RenderDevice;
pub use error::PipelineError;
pub use parallel::ParallelizationProvider;
pub use pass::{FrameContext, HookId, PassHook, RenderPass, RenderPassBase};
pub use pipeline::RenderPipeline;
pub use queue::{QueueKind, QueuedItem, RenderCommandQueue};
pub use settings::PipelineConfig;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
