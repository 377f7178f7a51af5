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

//! The native device and the contexts commands are flushed to.

use crate::error::PipelineError;
use crate::lock;
use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use vesper_core::platform::RenderWindow;
use vesper_core::renderer::{
    CommandListHandle, ContextHandle, DeviceHandle, GraphicsDriver, HardwareSelection,
};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// A created graphics device plus its contexts.
///
/// The thread that creates the device is its master thread: commands
/// generated there go straight to the immediate context, while every other
/// thread records into a deferred context of its own.
#[derive(Debug)]
pub struct RenderDevice {
    id: u64,
    driver: Arc<dyn GraphicsDriver>,
    handle: DeviceHandle,
    supports_mt_rendering: bool,
    master_thread: ThreadId,
    immediate: ContextHandle,
    immediate_lock: Mutex<()>,
    deferred: Mutex<AHashMap<ThreadId, ContextHandle>>,
    torn_down: AtomicBool,
}

impl RenderDevice {
    /// Creates the native device on `selection`.
    ///
    /// ## Arguments
    /// * `driver` - The native graphics collaborator.
    /// * `selection` - The adapter and output to create the device on.
    ///
    /// ## Errors
    /// Returns [`PipelineError::Native`] if the driver refuses the device or
    /// its immediate context.
    pub fn create(
        driver: Arc<dyn GraphicsDriver>,
        selection: &HardwareSelection,
    ) -> Result<Arc<Self>, PipelineError> {
        let info = driver.create_device(selection)?;
        let immediate = match driver.immediate_context(info.handle) {
            Ok(context) => context,
            Err(err) => {
                let _ = driver.release_device(info.handle);
                return Err(err.into());
            }
        };
        if !info.supports_mt_rendering {
            log::warn!(
                "Graphics device {} does not support multi-threaded command lists; rendering will be single-threaded.",
                info.handle
            );
        }
        log::debug!("Created graphics device {} (immediate context {immediate}).", info.handle);

        Ok(Arc::new(Self {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            driver,
            handle: info.handle,
            supports_mt_rendering: info.supports_mt_rendering,
            master_thread: thread::current().id(),
            immediate,
            immediate_lock: Mutex::new(()),
            deferred: Mutex::new(AHashMap::new()),
            torn_down: AtomicBool::new(false),
        }))
    }

    /// A process-unique identifier for this device.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The native collaborator.
    pub fn driver(&self) -> &Arc<dyn GraphicsDriver> {
        &self.driver
    }

    /// The native device handle.
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Whether deferred contexts may record concurrently.
    pub fn supports_mt_rendering(&self) -> bool {
        self.supports_mt_rendering
    }

    /// Whether the calling thread created the device.
    pub fn is_master_thread(&self) -> bool {
        thread::current().id() == self.master_thread
    }

    /// The immediate context.
    pub fn immediate_context(&self) -> ContextHandle {
        self.immediate
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// The context the calling thread should flush to: the immediate context
    /// on the master thread, otherwise a deferred context created on first
    /// use and reused by this thread afterwards.
    pub fn context_for_current_thread(&self) -> Result<ContextHandle, PipelineError> {
        self.ensure_live()?;
        if self.is_master_thread() {
            return Ok(self.immediate);
        }
        let mut deferred = lock(&self.deferred);
        let thread = thread::current().id();
        if let Some(context) = deferred.get(&thread) {
            return Ok(*context);
        }
        let context = self.driver.create_deferred_context(self.handle)?;
        log::debug!("Created deferred context {context} for {thread:?}.");
        deferred.insert(thread, context);
        Ok(context)
    }

    /// Executes a finished command list on the immediate context.
    pub fn execute_command_list(&self, list: CommandListHandle) -> Result<(), PipelineError> {
        self.ensure_live()?;
        let _immediate = self.lock_immediate();
        self.driver.execute_command_list(self.immediate, list)?;
        Ok(())
    }

    /// Serialises access to the immediate context.
    pub(crate) fn lock_immediate(&self) -> MutexGuard<'_, ()> {
        lock(&self.immediate_lock)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), PipelineError> {
        if self.is_torn_down() {
            Err(PipelineError::DeviceTornDown)
        } else {
            Ok(())
        }
    }

    /// Closes `windows`, releases every context, then releases the device.
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned. Calling this again does nothing.
    pub fn teardown(&self, windows: &[Arc<dyn RenderWindow>]) -> Result<(), PipelineError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_error: Option<PipelineError> = None;
        let mut record = |result: Result<(), PipelineError>| {
            if let Err(err) = result {
                log::error!("Error while tearing down graphics device {}: {err}", self.handle);
                first_error.get_or_insert(err);
            }
        };

        log::debug!("Closing {} window(s).", windows.len());
        for window in windows {
            record(window.close().map_err(Into::into));
        }

        let deferred: Vec<_> = lock(&self.deferred).drain().map(|(_, context)| context).collect();
        log::debug!("Releasing {} deferred context(s).", deferred.len());
        for context in deferred {
            record(self.driver.release_context(context).map_err(Into::into));
        }
        record(self.driver.release_context(self.immediate).map_err(Into::into));

        log::debug!("Releasing graphics device {}.", self.handle);
        record(self.driver.release_device(self.handle).map_err(Into::into));

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.is_torn_down() {
            log::warn!("Graphics device {} was dropped without being torn down.", self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_infra::{DriverOperation, HeadlessDriver};

    fn selection() -> HardwareSelection {
        HardwareSelection {
            gpu_index: 0,
            output_gpu_index: 0,
            output_index: 0,
        }
    }

    #[test]
    fn test_contexts_per_thread() {
        let driver = Arc::new(HeadlessDriver::new());
        let device = RenderDevice::create(driver.clone(), &selection()).unwrap();
        assert_eq!(device.context_for_current_thread().unwrap(), device.immediate_context());

        let remote = device.clone();
        let (first, second) = thread::spawn(move || {
            (
                remote.context_for_current_thread().unwrap(),
                remote.context_for_current_thread().unwrap(),
            )
        })
        .join()
        .unwrap();
        assert_ne!(first, device.immediate_context());
        assert_eq!(first, second, "deferred contexts are cached per thread");
        assert_eq!(driver.live_contexts(), 2);

        device.teardown(&[]).unwrap();
        assert_eq!(driver.live_contexts(), 0);
        assert_eq!(driver.released_devices(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent_and_final() {
        let driver = Arc::new(HeadlessDriver::new());
        let device = RenderDevice::create(driver.clone(), &selection()).unwrap();
        device.teardown(&[]).unwrap();
        device.teardown(&[]).unwrap();
        assert_eq!(driver.released_devices(), 1, "the device is released once");
        assert!(matches!(
            device.context_for_current_thread(),
            Err(PipelineError::DeviceTornDown)
        ));
    }

    #[test]
    fn test_native_failure_carries_reason() {
        let driver = Arc::new(HeadlessDriver::new());
        driver.fail_next(DriverOperation::CreateDevice, "out of video memory");
        let err = RenderDevice::create(driver, &selection()).unwrap_err();
        assert!(err.to_string().contains("out of video memory"), "got: {err}");
    }
}
