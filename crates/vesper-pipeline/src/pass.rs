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

//! Render passes: the base state every pass carries, the trait the pipeline
//! drives, and the per-frame context handed to [`RenderPass::execute`].

use crate::device::RenderDevice;
use crate::error::PipelineError;
use crate::lock;
use crate::parallel::ParallelizationProvider;
use crate::queue::{self, QueuedItem};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use vesper_core::command::{Instruction, RenderCommand};
use vesper_core::platform::RenderWindow;
use vesper_core::renderer::{Shader, ShaderResourcePackage};
use vesper_core::sync::StateMutationBarrier;

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a hook registered on a [`RenderPassBase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// A callback run immediately before or after a pass executes.
pub type PassHook = Arc<dyn Fn(&FrameContext) -> Result<(), PipelineError> + Send + Sync>;

/// State shared by every render pass.
pub struct RenderPassBase {
    name: String,
    enabled: AtomicBool,
    disposed: AtomicBool,
    barrier: Mutex<Weak<StateMutationBarrier>>,
    pre_pass_hooks: Mutex<Vec<(HookId, PassHook)>>,
    post_pass_hooks: Mutex<Vec<(HookId, PassHook)>>,
}

impl RenderPassBase {
    /// Creates an enabled pass base.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            barrier: Mutex::new(Weak::new()),
            pre_pass_hooks: Mutex::new(Vec::new()),
            post_pass_hooks: Mutex::new(Vec::new()),
        }
    }

    /// The pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the pipeline should run this pass.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables the pass.
    ///
    /// Once the pass belongs to a pipeline the flag only changes under a
    /// mutation permit, so it never flips in the middle of a frame.
    ///
    /// ## Errors
    /// Returns [`PipelineError::Barrier`] when called from inside the frame
    /// that is currently executing.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), PipelineError> {
        let barrier = lock(&self.barrier).upgrade();
        match barrier {
            Some(barrier) => {
                let _permit = barrier.acquire_permit()?;
                self.enabled.store(enabled, Ordering::Release);
            }
            None => self.enabled.store(enabled, Ordering::Release),
        }
        Ok(())
    }

    pub(crate) fn attach(&self, barrier: &Arc<StateMutationBarrier>) {
        *lock(&self.barrier) = Arc::downgrade(barrier);
    }

    pub(crate) fn detach(&self) {
        *lock(&self.barrier) = Weak::new();
    }

    /// Registers a hook run before the pass executes, after any hooks already registered.
    pub fn add_pre_pass_hook(
        &self,
        hook: impl Fn(&FrameContext) -> Result<(), PipelineError> + Send + Sync + 'static,
    ) -> HookId {
        Self::add_hook(&self.pre_pass_hooks, Arc::new(hook))
    }

    /// Registers a hook run after the pass executes, after any hooks already registered.
    pub fn add_post_pass_hook(
        &self,
        hook: impl Fn(&FrameContext) -> Result<(), PipelineError> + Send + Sync + 'static,
    ) -> HookId {
        Self::add_hook(&self.post_pass_hooks, Arc::new(hook))
    }

    /// Removes a pre-pass hook. Returns whether it was registered.
    pub fn remove_pre_pass_hook(&self, id: HookId) -> bool {
        Self::remove_hook(&self.pre_pass_hooks, id)
    }

    /// Removes a post-pass hook. Returns whether it was registered.
    pub fn remove_post_pass_hook(&self, id: HookId) -> bool {
        Self::remove_hook(&self.post_pass_hooks, id)
    }

    /// Runs the pre-pass hooks in registration order, stopping at the first error.
    pub fn run_pre_pass_hooks(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        Self::run_hooks(&self.pre_pass_hooks, frame)
    }

    /// Runs the post-pass hooks in registration order, stopping at the first error.
    pub fn run_post_pass_hooks(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        Self::run_hooks(&self.post_pass_hooks, frame)
    }

    /// Marks the pass disposed. Returns `false` if it already was.
    pub fn dispose(&self) -> bool {
        let disposed = self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if disposed {
            lock(&self.pre_pass_hooks).clear();
            lock(&self.post_pass_hooks).clear();
        }
        disposed
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn add_hook(hooks: &Mutex<Vec<(HookId, PassHook)>>, hook: PassHook) -> HookId {
        let id = HookId(NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed));
        lock(hooks).push((id, hook));
        id
    }

    fn remove_hook(hooks: &Mutex<Vec<(HookId, PassHook)>>, id: HookId) -> bool {
        let mut hooks = lock(hooks);
        let before = hooks.len();
        hooks.retain(|(existing, _)| *existing != id);
        hooks.len() != before
    }

    fn run_hooks(
        hooks: &Mutex<Vec<(HookId, PassHook)>>,
        frame: &FrameContext,
    ) -> Result<(), PipelineError> {
        // Snapshot so hooks may add or remove hooks while running.
        let snapshot: Vec<PassHook> = lock(hooks).iter().map(|(_, hook)| hook.clone()).collect();
        snapshot.iter().try_for_each(|hook| hook(frame))
    }
}

impl fmt::Debug for RenderPassBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPassBase")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("disposed", &self.is_disposed())
            .field("pre_pass_hooks", &lock(&self.pre_pass_hooks).len())
            .field("post_pass_hooks", &lock(&self.post_pass_hooks).len())
            .finish()
    }
}

impl Drop for RenderPassBase {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.is_disposed() {
            log::warn!("Render Pass '{}' was not disposed before being dropped.", self.name);
        }
    }
}

/// A logical phase of frame rendering that generates a batch of commands.
///
/// Implementors embed a [`RenderPassBase`] and return it from [`base`](Self::base).
pub trait RenderPass: Send + Sync + fmt::Debug + 'static {
    /// The pass's shared state.
    fn base(&self) -> &RenderPassBase;

    /// Short type name used in log output.
    fn type_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Whether the pass is configured well enough to run this frame.
    /// Invalid passes are skipped without side effects.
    fn is_valid(&self) -> bool {
        true
    }

    /// Generates this pass's commands for the frame.
    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError>;

    /// Runs before [`execute`](Self::execute). Defaults to the registered pre-pass hooks.
    fn on_pre_pass(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        self.base().run_pre_pass_hooks(frame)
    }

    /// Runs after [`execute`](Self::execute). Defaults to the registered post-pass hooks.
    fn on_post_pass(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        self.base().run_post_pass_hooks(frame)
    }

    /// The pass name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Whether the pipeline should run this pass.
    fn is_enabled(&self) -> bool {
        self.base().is_enabled()
    }

    /// Releases the pass. Returns `false` if it was already disposed.
    fn dispose(&self) -> bool {
        self.base().dispose()
    }

    /// Whether the pass has been disposed.
    fn is_disposed(&self) -> bool {
        self.base().is_disposed()
    }
}

impl fmt::Display for dyn RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Render Pass '{}' ({})", self.name(), self.type_name())
    }
}

/// Everything a pass needs while executing one frame.
///
/// Cheap to clone, and can be moved into work handed to the
/// [`ParallelizationProvider`]. The queue helpers act on the calling
/// thread's queue, so commands generated on a worker go to that worker's
/// deferred context.
#[derive(Clone)]
pub struct FrameContext {
    device: Arc<RenderDevice>,
    provider: Arc<ParallelizationProvider>,
    frame_index: u64,
}

impl fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameContext")
            .field("device", &self.device.id())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl FrameContext {
    /// Creates a context for one frame.
    pub fn new(
        device: Arc<RenderDevice>,
        provider: Arc<ParallelizationProvider>,
        frame_index: u64,
    ) -> Self {
        Self {
            device,
            provider,
            frame_index,
        }
    }

    /// The device commands are flushed to.
    pub fn device(&self) -> &Arc<RenderDevice> {
        &self.device
    }

    /// The worker pool available to the pass.
    pub fn provider(&self) -> &Arc<ParallelizationProvider> {
        &self.provider
    }

    /// Zero-based index of the frame being executed.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Appends a command to the calling thread's queue.
    pub fn queue_command(&self, command: RenderCommand) {
        queue::with_thread_queue(&self.device, |q| q.queue_command(command));
    }

    /// Reserves a slot in the calling thread's queue.
    pub fn reserve_command_slot(&self) -> usize {
        queue::with_thread_queue(&self.device, |q| q.reserve_command_slot())
    }

    /// Fills a slot previously returned by [`reserve_command_slot`](Self::reserve_command_slot).
    pub fn queue_command_at(
        &self,
        slot: usize,
        command: RenderCommand,
    ) -> Result<(), PipelineError> {
        queue::with_thread_queue(&self.device, |q| q.queue_command_at(slot, command))
    }

    /// Queues a closure to run when the calling thread's queue is flushed.
    pub fn queue_action(&self, action: impl FnOnce() -> Result<(), PipelineError> + 'static) {
        queue::with_thread_queue(&self.device, |q| q.queue_action(action));
    }

    /// Flushes the calling thread's queue to the driver.
    pub fn flush(&self) -> Result<(), PipelineError> {
        queue::flush_thread_queue(&self.device)
    }

    /// Queues the commands that make `shader` current.
    pub fn queue_shader_switch(&self, shader: &Shader) -> Result<(), PipelineError> {
        queue::with_thread_queue(&self.device, |q| shader.queue_switch(q))?;
        Ok(())
    }

    /// Queues the commands that upload `shader`'s resources, overridden by
    /// `package` where it has values.
    pub fn queue_shader_resource_update(
        &self,
        shader: &Shader,
        package: Option<&ShaderResourcePackage>,
    ) -> Result<(), PipelineError> {
        queue::with_thread_queue(&self.device, |q| shader.queue_resource_update(q, package))?;
        Ok(())
    }

    /// Queues a present of `window`'s back buffer. Nothing is queued once the
    /// window has closed.
    pub fn queue_present(&self, window: &dyn RenderWindow) -> Result<(), PipelineError> {
        let command = RenderCommand::present_back_buffer(window)?;
        if command.instruction() != Instruction::NoOperation {
            self.queue_command(command);
        }
        Ok(())
    }

    /// The calling thread's pending commands and actions, in flush order.
    pub fn current_queue(&self) -> Vec<QueuedItem> {
        queue::with_thread_queue(&self.device, |q| q.current_queue())
    }

    /// Number of commands pending on the calling thread.
    pub fn num_commands_queued(&self) -> usize {
        queue::with_thread_queue(&self.device, |q| q.num_commands_queued())
    }

    /// Per-instruction counts of the commands pending on the calling thread.
    pub fn command_type_breakdown(&self) -> Vec<(Instruction, usize)> {
        queue::with_thread_queue(&self.device, |q| q.command_type_breakdown())
    }
}
