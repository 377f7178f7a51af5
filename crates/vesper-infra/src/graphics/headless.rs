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

//! A [`GraphicsDriver`] that records instead of rendering.

use crate::platform::window::HeadlessWindow;
use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use vesper_core::command::{DecodedCommand, RenderCommand};
use vesper_core::memory::with_local_pool;
use vesper_core::platform::{RenderWindow, WindowDescriptor};
use vesper_core::renderer::{
    CommandListHandle, ContextHandle, DeviceHandle, DeviceInfo, DisplayResolution,
    GraphicsAdapter, GraphicsDriver, HardwareSelection, NativeCallError, NativeResult,
    OutputDisplay, ResourceHandle, SwapChainHandle, WindowHandle,
};

/// Driver entry points that can be made to fail with [`HeadlessDriver::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DriverOperation {
    EnumerateAdapters,
    CreateDevice,
    ReleaseDevice,
    CreateDeferredContext,
    ReleaseContext,
    FlushCommands,
    ExecuteCommandList,
    Present,
    CreateWindow,
    SetMsaaLevel,
    SetVsyncEnabled,
}

/// One call to [`GraphicsDriver::flush_commands`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRecord {
    /// The context the commands were flushed to.
    pub context: ContextHandle,
    /// The thread that flushed them.
    pub thread: ThreadId,
    /// The commands, with their staged data resolved.
    pub commands: Vec<DecodedCommand>,
}

#[derive(Debug)]
struct ContextRecord {
    deferred: bool,
    pending: Vec<DecodedCommand>,
}

#[derive(Debug, Default)]
struct DriverState {
    devices: AHashMap<DeviceHandle, ContextHandle>,
    contexts: AHashMap<ContextHandle, ContextRecord>,
    command_lists: AHashMap<CommandListHandle, Vec<DecodedCommand>>,
    failures: AHashMap<DriverOperation, String>,
    flushes: Vec<FlushRecord>,
    executed: Vec<DecodedCommand>,
    presents: Vec<SwapChainHandle>,
    windows: Vec<Arc<HeadlessWindow>>,
    released_devices: usize,
}

impl DriverState {
    fn check(&mut self, operation: DriverOperation) -> NativeResult<()> {
        match self.failures.remove(&operation) {
            Some(reason) => Err(NativeCallError::new(reason)),
            None => Ok(()),
        }
    }

    /// Applies commands that reached the immediate context.
    fn execute(&mut self, commands: Vec<DecodedCommand>) {
        for command in &commands {
            if let DecodedCommand::Present(swap_chain) = command {
                self.presents.push(*swap_chain);
            }
        }
        self.executed.extend(commands);
    }
}

/// An in-memory graphics driver.
///
/// Commands flushed to the immediate context are "executed" straight away;
/// commands flushed to a deferred context accumulate until a
/// `FinishCommandList` turns them into a command list, which is executed when
/// [`execute_command_list`](GraphicsDriver::execute_command_list) is called.
/// The resulting order is available from [`executed_commands`](Self::executed_commands).
#[derive(Debug)]
pub struct HeadlessDriver {
    adapters: Vec<GraphicsAdapter>,
    supports_mt_rendering: bool,
    next_handle: AtomicU64,
    msaa_level: AtomicU32,
    vsync: AtomicBool,
    state: Mutex<DriverState>,
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDriver {
    /// A driver exposing one adapter with one primary 1920x1080 output and
    /// multi-threaded rendering support.
    pub fn new() -> Self {
        let output = OutputDisplay {
            index: 0,
            name: "Headless Display".to_owned(),
            is_primary: true,
            native_resolutions: vec![
                DisplayResolution {
                    width: 1280,
                    height: 720,
                    refresh_rate_hz: 60,
                },
                DisplayResolution {
                    width: 1920,
                    height: 1080,
                    refresh_rate_hz: 60,
                },
            ],
        };
        Self {
            adapters: vec![GraphicsAdapter {
                index: 0,
                description: "Headless Adapter".to_owned(),
                dedicated_video_memory: 1 << 30,
                dedicated_system_memory: 0,
                shared_system_memory: 1 << 30,
                outputs: vec![output],
            }],
            supports_mt_rendering: true,
            next_handle: AtomicU64::new(1),
            msaa_level: AtomicU32::new(0),
            vsync: AtomicBool::new(false),
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Replaces the adapters reported by `enumerate_adapters`.
    pub fn with_adapters(mut self, adapters: Vec<GraphicsAdapter>) -> Self {
        self.adapters = adapters;
        self
    }

    /// Sets whether created devices report multi-threaded rendering support.
    pub fn with_mt_rendering(mut self, supported: bool) -> Self {
        self.supports_mt_rendering = supported;
        self
    }

    /// Makes the next call to `operation` fail with `reason`.
    pub fn fail_next(&self, operation: DriverOperation, reason: impl Into<String>) {
        self.lock().failures.insert(operation, reason.into());
    }

    /// Every flush so far, in call order.
    pub fn flushes(&self) -> Vec<FlushRecord> {
        self.lock().flushes.clone()
    }

    /// Every command that reached an immediate context, in execution order.
    pub fn executed_commands(&self) -> Vec<DecodedCommand> {
        self.lock().executed.clone()
    }

    /// Every presented swap chain, in order.
    pub fn presents(&self) -> Vec<SwapChainHandle> {
        self.lock().presents.clone()
    }

    /// Windows created through this driver.
    pub fn windows(&self) -> Vec<Arc<HeadlessWindow>> {
        self.lock().windows.clone()
    }

    /// Number of contexts (immediate and deferred) not yet released.
    pub fn live_contexts(&self) -> usize {
        self.lock().contexts.len()
    }

    /// Number of devices not yet released.
    pub fn live_devices(&self) -> usize {
        self.lock().devices.len()
    }

    /// Number of devices released so far.
    pub fn released_devices(&self) -> usize {
        self.lock().released_devices
    }

    /// Forgets recorded flushes, executed commands and presents.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.flushes.clear();
        state.executed.clear();
        state.presents.clear();
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GraphicsDriver for HeadlessDriver {
    fn enumerate_adapters(&self) -> NativeResult<Vec<GraphicsAdapter>> {
        self.lock().check(DriverOperation::EnumerateAdapters)?;
        Ok(self.adapters.clone())
    }

    fn create_device(&self, selection: &HardwareSelection) -> NativeResult<DeviceInfo> {
        let mut state = self.lock();
        state.check(DriverOperation::CreateDevice)?;
        if selection.gpu_index >= self.adapters.len() {
            return Err(NativeCallError::new(format!(
                "No adapter at index {}.",
                selection.gpu_index
            )));
        }
        let device = DeviceHandle::from_raw(self.allocate());
        let immediate = ContextHandle::from_raw(self.allocate());
        state.devices.insert(device, immediate);
        state.contexts.insert(
            immediate,
            ContextRecord {
                deferred: false,
                pending: Vec::new(),
            },
        );
        log::debug!("Headless device {device} created with immediate context {immediate}.");
        Ok(DeviceInfo {
            handle: device,
            supports_mt_rendering: self.supports_mt_rendering,
        })
    }

    fn release_device(&self, device: DeviceHandle) -> NativeResult<()> {
        let mut state = self.lock();
        state.check(DriverOperation::ReleaseDevice)?;
        let immediate = state
            .devices
            .remove(&device)
            .ok_or_else(|| NativeCallError::new(format!("Unknown device {device}.")))?;
        state.contexts.remove(&immediate);
        state.released_devices += 1;
        Ok(())
    }

    fn immediate_context(&self, device: DeviceHandle) -> NativeResult<ContextHandle> {
        self.lock()
            .devices
            .get(&device)
            .copied()
            .ok_or_else(|| NativeCallError::new(format!("Unknown device {device}.")))
    }

    fn create_deferred_context(&self, device: DeviceHandle) -> NativeResult<ContextHandle> {
        let mut state = self.lock();
        state.check(DriverOperation::CreateDeferredContext)?;
        if !state.devices.contains_key(&device) {
            return Err(NativeCallError::new(format!("Unknown device {device}.")));
        }
        let context = ContextHandle::from_raw(self.allocate());
        state.contexts.insert(
            context,
            ContextRecord {
                deferred: true,
                pending: Vec::new(),
            },
        );
        Ok(context)
    }

    fn release_context(&self, context: ContextHandle) -> NativeResult<()> {
        let mut state = self.lock();
        state.check(DriverOperation::ReleaseContext)?;
        match state.contexts.get(&context) {
            Some(record) if record.deferred => {
                state.contexts.remove(&context);
                Ok(())
            }
            // Immediate contexts go away with their device.
            Some(_) => Ok(()),
            None => Err(NativeCallError::new(format!("Unknown context {context}."))),
        }
    }

    fn flush_commands(
        &self,
        context: ContextHandle,
        commands: &[RenderCommand],
    ) -> NativeResult<()> {
        let mut state = self.lock();
        state.check(DriverOperation::FlushCommands)?;
        let deferred = match state.contexts.get(&context) {
            Some(record) => record.deferred,
            None => return Err(NativeCallError::new(format!("Unknown context {context}."))),
        };

        let mut decoded = Vec::with_capacity(commands.len());
        for command in commands {
            let resolved = command
                .decode()
                .map_err(|err| NativeCallError::new(err.to_string()))?;
            if let DecodedCommand::FinishCommandList { out_slot } = resolved {
                if !deferred {
                    return Err(NativeCallError::new(
                        "FinishCommandList is only valid on a deferred context.",
                    ));
                }
                let list = CommandListHandle::from_raw(self.allocate());
                with_local_pool(|pool| pool.write_words(out_slot, &[list.raw()]))
                    .map_err(|err| NativeCallError::new(err.to_string()))?;
                let recorded = state
                    .contexts
                    .get_mut(&context)
                    .map(|record| std::mem::take(&mut record.pending))
                    .unwrap_or_default();
                state.command_lists.insert(list, recorded);
            } else if deferred {
                if let Some(record) = state.contexts.get_mut(&context) {
                    record.pending.push(resolved.clone());
                }
            }
            decoded.push(resolved);
        }

        log::trace!("Flushed {} commands to {context}.", decoded.len());
        if !deferred {
            state.execute(decoded.clone());
        }
        state.flushes.push(FlushRecord {
            context,
            thread: thread::current().id(),
            commands: decoded,
        });
        Ok(())
    }

    fn execute_command_list(
        &self,
        immediate: ContextHandle,
        list: CommandListHandle,
    ) -> NativeResult<()> {
        let mut state = self.lock();
        state.check(DriverOperation::ExecuteCommandList)?;
        match state.contexts.get(&immediate) {
            Some(record) if !record.deferred => {}
            _ => {
                return Err(NativeCallError::new(format!(
                    "{immediate} is not an immediate context."
                )))
            }
        }
        let commands = state
            .command_lists
            .remove(&list)
            .ok_or_else(|| NativeCallError::new(format!("Unknown command list {list}.")))?;
        state.execute(commands);
        Ok(())
    }

    fn present(&self, swap_chain: SwapChainHandle) -> NativeResult<()> {
        let mut state = self.lock();
        state.check(DriverOperation::Present)?;
        state.presents.push(swap_chain);
        Ok(())
    }

    fn create_window(
        &self,
        device: DeviceHandle,
        descriptor: &WindowDescriptor,
    ) -> NativeResult<Arc<dyn RenderWindow>> {
        let mut state = self.lock();
        state.check(DriverOperation::CreateWindow)?;
        if !state.devices.contains_key(&device) {
            return Err(NativeCallError::new(format!("Unknown device {device}.")));
        }
        let window = Arc::new(HeadlessWindow::new(
            WindowHandle::from_raw(self.allocate()),
            SwapChainHandle::from_raw(self.allocate()),
            (
                ResourceHandle::from_raw(self.allocate()),
                ResourceHandle::from_raw(self.allocate()),
            ),
            descriptor,
        ));
        state.windows.push(window.clone());
        Ok(window)
    }

    fn msaa_level(&self) -> NativeResult<u32> {
        Ok(self.msaa_level.load(Ordering::Acquire))
    }

    fn set_msaa_level(&self, samples: u32) -> NativeResult<()> {
        self.lock().check(DriverOperation::SetMsaaLevel)?;
        self.msaa_level.store(samples, Ordering::Release);
        Ok(())
    }

    fn vsync_enabled(&self) -> NativeResult<bool> {
        Ok(self.vsync.load(Ordering::Acquire))
    }

    fn set_vsync_enabled(&self, enabled: bool) -> NativeResult<()> {
        self.lock().check(DriverOperation::SetVsyncEnabled)?;
        self.vsync.store(enabled, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_core::renderer::{recommended_hardware, Buffer, BufferKind, GpuResource};

    fn device(driver: &HeadlessDriver) -> DeviceHandle {
        let selection = recommended_hardware(&driver.enumerate_adapters().unwrap()).unwrap();
        driver.create_device(&selection).unwrap().handle
    }

    #[test]
    fn test_immediate_flush_executes_in_order() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let immediate = driver.immediate_context(device).unwrap();
        let buffer = Buffer::new(ResourceHandle::from_raw(500), BufferKind::Vertex, 4, 1, "buf");

        let commands = [
            RenderCommand::buffer_write(&buffer, &[1, 2, 3, 4]).unwrap(),
            RenderCommand::draw(0, 3),
        ];
        driver.flush_commands(immediate, &commands).unwrap();
        assert_eq!(
            driver.executed_commands(),
            vec![
                DecodedCommand::BufferWrite {
                    buffer: ResourceHandle::from_raw(500),
                    data: vec![1, 2, 3, 4]
                },
                DecodedCommand::Draw {
                    first_vertex: 0,
                    num_vertices: 3
                },
            ]
        );
        assert_eq!(driver.flushes()[0].thread, thread::current().id());
        buffer.dispose();
        with_local_pool(|pool| pool.free_all());
    }

    #[test]
    fn test_deferred_commands_wait_for_command_list() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let immediate = driver.immediate_context(device).unwrap();
        let deferred = driver.create_deferred_context(device).unwrap();

        let finish = RenderCommand::finish_command_list().unwrap();
        driver
            .flush_commands(deferred, &[RenderCommand::draw(0, 6), finish])
            .unwrap();
        assert!(
            driver.executed_commands().is_empty(),
            "deferred work must not run before its list"
        );

        let list = finish.finished_command_list().unwrap();
        assert!(!list.is_null(), "the driver fills the out-slot");
        driver.execute_command_list(immediate, list).unwrap();
        assert_eq!(
            driver.executed_commands(),
            vec![DecodedCommand::Draw {
                first_vertex: 0,
                num_vertices: 6
            }]
        );
        assert!(driver.execute_command_list(immediate, list).is_err(), "lists execute once");
        with_local_pool(|pool| pool.free_all());
    }

    #[test]
    fn test_fail_next_reports_reason_once() {
        let driver = HeadlessDriver::new();
        driver.fail_next(DriverOperation::EnumerateAdapters, "adapter lost");
        let err = driver.enumerate_adapters().unwrap_err();
        assert_eq!(err.reason(), "adapter lost");
        assert!(driver.enumerate_adapters().is_ok(), "failures are one-shot");
    }

    #[test]
    fn test_release_device_drops_its_immediate_context() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let deferred = driver.create_deferred_context(device).unwrap();
        assert_eq!(driver.live_contexts(), 2);
        driver.release_context(deferred).unwrap();
        driver.release_device(device).unwrap();
        assert_eq!(driver.live_contexts(), 0);
        assert_eq!(driver.released_devices(), 1);
        assert!(driver.release_device(device).is_err());
    }
}
