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

//! Per-thread render command queues.
//!
//! Every thread keeps one queue per device. Commands are appended in the
//! order they are generated and reach the driver in that order when the
//! queue is flushed. Flushing also resets the thread's scratch pool, which
//! invalidates the staged data of every command built on the thread so far.

use crate::device::RenderDevice;
use crate::error::PipelineError;
use ahash::AHashMap;
use std::cell::RefCell;
use std::fmt;
use vesper_core::command::{CommandArgument, CommandSink, Instruction, RenderCommand};
use vesper_core::memory::with_local_pool;

/// Initial command capacity of a queue.
pub const INITIAL_QUEUE_LENGTH: usize = 32;

/// Number of command slots added whenever a full queue grows.
pub const QUEUE_GROWTH: usize = 50;

const RESERVED_SLOT_MARKER: u64 = 12345678;

/// A closure run at flush time, between the commands queued before and after it.
pub type DeferredAction = Box<dyn FnOnce() -> Result<(), PipelineError>>;

/// Which kind of context a queue flushes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// The device's master thread; commands execute on the immediate context.
    Immediate,
    /// Any other thread; commands are recorded into a command list which is
    /// then executed on the immediate context.
    Deferred,
}

/// One entry of [`RenderCommandQueue::current_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedItem {
    /// A queued command.
    Command(RenderCommand),
    /// A queued action.
    Action,
}

/// An ordered list of commands and deferred actions awaiting a flush.
pub struct RenderCommandQueue {
    kind: QueueKind,
    commands: Vec<RenderCommand>,
    actions: Vec<(usize, DeferredAction)>,
}

impl fmt::Debug for RenderCommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCommandQueue")
            .field("kind", &self.kind)
            .field("commands", &self.commands.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl RenderCommandQueue {
    /// Creates an empty queue.
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            commands: Vec::with_capacity(INITIAL_QUEUE_LENGTH),
            actions: Vec::new(),
        }
    }

    /// The kind of context this queue flushes to.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Appends a command.
    pub fn queue_command(&mut self, command: RenderCommand) {
        if self.commands.len() == self.commands.capacity() {
            self.commands.reserve_exact(QUEUE_GROWTH);
        }
        self.commands.push(command);
    }

    /// Appends a placeholder command and returns its slot, to be filled later
    /// with [`queue_command_at`](Self::queue_command_at).
    pub fn reserve_command_slot(&mut self) -> usize {
        let placeholder = if cfg!(debug_assertions) {
            let marker = CommandArgument::from_u64(RESERVED_SLOT_MARKER);
            RenderCommand::with_args(Instruction::NoOperation, marker, marker, marker)
        } else {
            RenderCommand::no_operation()
        };
        self.queue_command(placeholder);
        self.commands.len() - 1
    }

    /// Replaces the command in a reserved slot.
    ///
    /// ## Errors
    /// Returns [`PipelineError::InvalidCommandSlot`] if `slot` is not queued.
    pub fn queue_command_at(
        &mut self,
        slot: usize,
        command: RenderCommand,
    ) -> Result<(), PipelineError> {
        let len = self.commands.len();
        match self.commands.get_mut(slot) {
            Some(entry) => {
                *entry = command;
                Ok(())
            }
            None => Err(PipelineError::InvalidCommandSlot { slot, len }),
        }
    }

    /// Queues a closure to run at flush time, after every command queued so far.
    pub fn queue_action(&mut self, action: impl FnOnce() -> Result<(), PipelineError> + 'static) {
        self.actions.push((self.commands.len(), Box::new(action)));
    }

    /// Number of commands queued, including reserved slots.
    pub fn num_commands_queued(&self) -> usize {
        self.commands.len()
    }

    /// Whether neither commands nor actions are queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.actions.is_empty()
    }

    /// How many commands of each instruction are queued, in first-seen order.
    pub fn command_type_breakdown(&self) -> Vec<(Instruction, usize)> {
        let mut breakdown: Vec<(Instruction, usize)> = Vec::new();
        for command in &self.commands {
            let instruction = command.instruction();
            match breakdown.iter_mut().find(|(seen, _)| *seen == instruction) {
                Some((_, count)) => *count += 1,
                None => breakdown.push((instruction, 1)),
            }
        }
        breakdown
    }

    /// Commands and actions in the order they will be flushed.
    pub fn current_queue(&self) -> Vec<QueuedItem> {
        let mut items = Vec::with_capacity(self.commands.len() + self.actions.len());
        let mut actions = self.actions.iter().map(|(position, _)| *position).peekable();
        for (index, command) in self.commands.iter().enumerate() {
            while actions.next_if(|position| *position == index).is_some() {
                items.push(QueuedItem::Action);
            }
            items.push(QueuedItem::Command(*command));
        }
        items.extend(actions.map(|_| QueuedItem::Action));
        items
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.commands.shrink_to(INITIAL_QUEUE_LENGTH);
        self.actions.clear();
    }

    fn take(&mut self) -> (QueueKind, Vec<RenderCommand>, Vec<(usize, DeferredAction)>) {
        let commands =
            std::mem::replace(&mut self.commands, Vec::with_capacity(INITIAL_QUEUE_LENGTH));
        (self.kind, commands, std::mem::take(&mut self.actions))
    }
}

impl CommandSink for RenderCommandQueue {
    fn push_command(&mut self, command: RenderCommand) {
        self.queue_command(command);
    }
}

thread_local! {
    static QUEUES: RefCell<AHashMap<u64, RenderCommandQueue>> = RefCell::new(AHashMap::new());
}

/// Runs `f` on the calling thread's queue for `device`, creating it on first use.
///
/// `f` must not call back into this module.
pub fn with_thread_queue<R>(
    device: &RenderDevice,
    f: impl FnOnce(&mut RenderCommandQueue) -> R,
) -> R {
    QUEUES.with(|queues| {
        let mut queues = queues.borrow_mut();
        let queue = queues.entry(device.id()).or_insert_with(|| {
            RenderCommandQueue::new(if device.is_master_thread() {
                QueueKind::Immediate
            } else {
                QueueKind::Deferred
            })
        });
        f(queue)
    })
}

/// Sends everything queued on the calling thread for `device` to the driver,
/// then resets the queue and the thread's scratch pool.
///
/// Each action runs after the commands queued before it have been flushed.
/// Deferred queues end with a `FinishCommandList` whose command list is then
/// executed on the immediate context.
///
/// Commands an action queues land in the next flush. Their staged data stays
/// reserved until then, so the scratch pool is only reset once a flush leaves
/// the queue empty.
pub fn flush_thread_queue(device: &RenderDevice) -> Result<(), PipelineError> {
    device.ensure_live()?;
    let (kind, commands, actions) = with_thread_queue(device, RenderCommandQueue::take);
    let result = submit(device, kind, commands, actions);
    if with_thread_queue(device, |queue| queue.is_empty()) {
        with_local_pool(|pool| pool.free_all());
    }
    result
}

/// Drops everything queued on the calling thread for `device` without flushing it.
pub fn discard_thread_queue(device: &RenderDevice) {
    let dropped = QUEUES.with(|queues| queues.borrow_mut().remove(&device.id()));
    if let Some(queue) = dropped {
        if !queue.is_empty() {
            log::debug!(
                "Discarded {} unflushed render command(s).",
                queue.num_commands_queued()
            );
        }
        with_local_pool(|pool| pool.free_all());
    }
}

fn submit(
    device: &RenderDevice,
    kind: QueueKind,
    mut commands: Vec<RenderCommand>,
    actions: Vec<(usize, DeferredAction)>,
) -> Result<(), PipelineError> {
    if commands.is_empty() && actions.is_empty() {
        return Ok(());
    }
    let context = device.context_for_current_thread()?;
    let finish = match kind {
        QueueKind::Deferred => {
            let finish = RenderCommand::finish_command_list()?;
            commands.push(finish);
            Some(finish)
        }
        QueueKind::Immediate => None,
    };

    let flush_segment = |segment: &[RenderCommand]| -> Result<(), PipelineError> {
        if segment.is_empty() {
            return Ok(());
        }
        let _immediate = (kind == QueueKind::Immediate).then(|| device.lock_immediate());
        device.driver().flush_commands(context, segment)?;
        log::trace!("Flushed {} render command(s) to {context}.", segment.len());
        Ok(())
    };

    let mut start = 0;
    for (position, action) in actions {
        flush_segment(&commands[start..position])?;
        action()?;
        start = position;
    }
    flush_segment(&commands[start..])?;

    if let Some(finish) = finish {
        device.execute_command_list(finish.finished_command_list()?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use vesper_core::command::DecodedCommand;
    use vesper_core::renderer::{Buffer, BufferKind, GpuResource, HardwareSelection, ResourceHandle};
    use vesper_infra::HeadlessDriver;

    fn device() -> (Arc<HeadlessDriver>, Arc<RenderDevice>) {
        let driver = Arc::new(HeadlessDriver::new());
        let selection = HardwareSelection {
            gpu_index: 0,
            output_gpu_index: 0,
            output_index: 0,
        };
        let device = RenderDevice::create(driver.clone(), &selection).unwrap();
        (driver, device)
    }

    #[test]
    fn test_reserved_slot_and_breakdown() {
        let mut queue = RenderCommandQueue::new(QueueKind::Immediate);
        queue.queue_command(RenderCommand::draw(0, 3));
        let slot = queue.reserve_command_slot();
        queue.queue_command(RenderCommand::draw(3, 3));
        if cfg!(debug_assertions) {
            assert_eq!(
                queue.current_queue()[1],
                QueuedItem::Command(RenderCommand::with_args(
                    Instruction::NoOperation,
                    CommandArgument::from_u64(12345678),
                    CommandArgument::from_u64(12345678),
                    CommandArgument::from_u64(12345678),
                ))
            );
        }
        queue
            .queue_command_at(slot, RenderCommand::set_primitive_topology(Default::default()))
            .unwrap();
        assert!(matches!(
            queue.queue_command_at(3, RenderCommand::draw(0, 1)),
            Err(PipelineError::InvalidCommandSlot { slot: 3, len: 3 })
        ));
        assert_eq!(
            queue.command_type_breakdown(),
            vec![(Instruction::Draw, 2), (Instruction::SetPrimitiveTopology, 1)]
        );
    }

    #[test]
    fn test_queue_grows_in_fixed_steps() {
        let mut queue = RenderCommandQueue::new(QueueKind::Immediate);
        for _ in 0..INITIAL_QUEUE_LENGTH {
            queue.queue_command(RenderCommand::no_operation());
        }
        queue.queue_command(RenderCommand::no_operation());
        assert!(queue.commands.capacity() >= INITIAL_QUEUE_LENGTH + 1);
        assert_eq!(queue.num_commands_queued(), INITIAL_QUEUE_LENGTH + 1);
    }

    #[test]
    fn test_actions_interleave_with_commands() {
        let (driver, device) = device();
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        with_thread_queue(&device, |queue| {
            queue.queue_command(RenderCommand::draw(0, 1));
            let (driver, observed) = (driver.clone(), observed.clone());
            queue.queue_action(move || {
                observed.lock().unwrap().push(driver.executed_commands().len());
                Ok(())
            });
            queue.queue_command(RenderCommand::draw(1, 1));
            assert_eq!(
                queue.current_queue(),
                vec![
                    QueuedItem::Command(RenderCommand::draw(0, 1)),
                    QueuedItem::Action,
                    QueuedItem::Command(RenderCommand::draw(1, 1)),
                ]
            );
        });

        flush_thread_queue(&device).unwrap();
        assert_eq!(
            *observed.lock().unwrap(),
            vec![1],
            "the action runs after the first segment"
        );
        assert_eq!(driver.executed_commands().len(), 2);
        assert_eq!(with_thread_queue(&device, |queue| queue.num_commands_queued()), 0);
        device.teardown(&[]).unwrap();
    }

    #[test]
    fn test_commands_queued_by_actions_keep_their_staged_data() {
        let (driver, device) = device();
        let buffer = Arc::new(Buffer::new(
            ResourceHandle::from_raw(500),
            BufferKind::Vertex,
            16,
            1,
            "late upload",
        ));
        with_thread_queue(&device, |queue| {
            let (device, buffer) = (device.clone(), buffer.clone());
            queue.queue_action(move || {
                let upload = RenderCommand::buffer_write(&buffer, &[7; 16])?;
                with_thread_queue(&device, |queue| queue.queue_command(upload));
                Ok(())
            });
        });

        flush_thread_queue(&device).unwrap();
        assert_eq!(with_thread_queue(&device, |queue| queue.num_commands_queued()), 1);
        assert_eq!(
            with_local_pool(|pool| pool.reserved_count()),
            1,
            "the upload's staged bytes stay reserved"
        );
        with_local_pool(|pool| pool.reserve_zeroed(16));

        flush_thread_queue(&device).unwrap();
        assert_eq!(
            driver.executed_commands(),
            vec![DecodedCommand::BufferWrite {
                buffer: ResourceHandle::from_raw(500),
                data: vec![7; 16],
            }]
        );
        assert_eq!(with_local_pool(|pool| pool.reserved_count()), 0);
        buffer.dispose();
        device.teardown(&[]).unwrap();
    }

    #[test]
    fn test_deferred_queue_executes_through_command_list() {
        let (driver, device) = device();
        let remote = device.clone();
        thread::spawn(move || {
            with_thread_queue(&remote, |queue| {
                assert_eq!(queue.kind(), QueueKind::Deferred);
                queue.queue_command(RenderCommand::draw(0, 9));
            });
            flush_thread_queue(&remote).unwrap();
        })
        .join()
        .unwrap();

        let flushes = driver.flushes();
        assert_eq!(flushes.len(), 1);
        assert!(matches!(
            flushes[0].commands.last(),
            Some(DecodedCommand::FinishCommandList { .. })
        ));
        assert_eq!(
            driver.executed_commands(),
            vec![DecodedCommand::Draw {
                first_vertex: 0,
                num_vertices: 9
            }]
        );
        device.teardown(&[]).unwrap();
    }
}
