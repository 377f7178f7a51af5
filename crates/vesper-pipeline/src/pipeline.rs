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

//! The render pipeline driver.
//!
//! A [`RenderPipeline`] owns the device, the ordered pass list, the global
//! render settings and the open windows. Each [`tick`](RenderPipeline::tick)
//! pumps the windows, freezes structural mutation, runs every eligible pass
//! in order and flushes the commands they generated.

use crate::device::RenderDevice;
use crate::error::PipelineError;
use crate::lock;
use crate::parallel::ParallelizationProvider;
use crate::pass::{FrameContext, RenderPass};
use crate::queue;
use crate::settings::{PipelineConfig, DEFAULT_FRAME_RATE_HZ};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vesper_core::platform::{RenderWindow, WindowDescriptor};
use vesper_core::renderer::{
    recommended_hardware, validate_selection, GraphicsDriver, HardwareSelection, MsaaLevel,
};
use vesper_core::sync::StateMutationBarrier;

#[derive(Debug, Clone, Copy)]
struct RenderSettings {
    max_frame_rate_hz: Option<i64>,
}

/// Forces single-threaded execution until dropped, then restores the previous mode.
struct SingleThreadedScope<'a> {
    provider: &'a ParallelizationProvider,
    previous: bool,
}

impl<'a> SingleThreadedScope<'a> {
    fn engage(provider: &'a ParallelizationProvider) -> Self {
        let previous = provider.force_single_threaded();
        provider.set_force_single_threaded(true);
        Self { provider, previous }
    }
}

impl Drop for SingleThreadedScope<'_> {
    fn drop(&mut self) {
        self.provider.set_force_single_threaded(self.previous);
    }
}

fn same_pass(a: &Arc<dyn RenderPass>, b: &Arc<dyn RenderPass>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Drives frames over an ordered list of render passes.
pub struct RenderPipeline {
    device: Arc<RenderDevice>,
    provider: Arc<ParallelizationProvider>,
    barrier: Arc<StateMutationBarrier>,
    passes: Mutex<Vec<Arc<dyn RenderPass>>>,
    settings: Mutex<RenderSettings>,
    windows: Mutex<Vec<Arc<dyn RenderWindow>>>,
    frame_index: AtomicU64,
    torn_down: AtomicBool,
}

impl fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("device", &self.device.handle())
            .field("passes", &lock(&self.passes).len())
            .field("windows", &lock(&self.windows).len())
            .field("frame_index", &self.frame_index())
            .finish()
    }
}

impl RenderPipeline {
    /// Builds a pipeline around an existing device.
    ///
    /// Must be called on the device's master thread, which also becomes the
    /// master thread of the pipeline's worker pool.
    ///
    /// ## Arguments
    /// * `device` - The device commands are flushed to.
    /// * `config` - Worker count, threading mode and initial render settings.
    pub fn new(device: Arc<RenderDevice>, config: &PipelineConfig) -> Result<Self, PipelineError> {
        if !device.is_master_thread() {
            return Err(PipelineError::NotOnMasterThread {
                operation: "RenderPipeline::new",
                owner: "render device",
            });
        }
        let provider = ParallelizationProvider::new(config.worker_thread_count())?;
        let pipeline = Self {
            device,
            provider: Arc::new(provider),
            barrier: Arc::new(StateMutationBarrier::new()),
            passes: Mutex::new(Vec::new()),
            settings: Mutex::new(RenderSettings {
                max_frame_rate_hz: Some(DEFAULT_FRAME_RATE_HZ),
            }),
            windows: Mutex::new(Vec::new()),
            frame_index: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        };
        pipeline.apply_config(config)?;
        Ok(pipeline)
    }

    /// Selects hardware, creates a device on the calling thread and builds a
    /// pipeline around it.
    ///
    /// ## Arguments
    /// * `driver` - The native graphics collaborator.
    /// * `selection` - Explicit hardware, or `None` for [`recommended_hardware`].
    /// * `config` - See [`new`](Self::new).
    pub fn create(
        driver: Arc<dyn GraphicsDriver>,
        selection: Option<HardwareSelection>,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let selection = Self::set_hardware(driver.as_ref(), selection)?;
        let device = RenderDevice::create(driver, &selection)?;
        match Self::new(device.clone(), config) {
            Ok(pipeline) => Ok(pipeline),
            Err(err) => {
                let _ = device.teardown(&[]);
                Err(err)
            }
        }
    }

    /// Resolves the hardware to render on.
    ///
    /// An explicit `selection` is checked against the enumerated adapters;
    /// `None` picks the recommended hardware.
    ///
    /// ## Errors
    /// Returns [`PipelineError::Hardware`] when an index does not exist or
    /// nothing suitable is installed.
    pub fn set_hardware(
        driver: &dyn GraphicsDriver,
        selection: Option<HardwareSelection>,
    ) -> Result<HardwareSelection, PipelineError> {
        let adapters = driver.enumerate_adapters()?;
        let selection = match selection {
            Some(selection) => {
                validate_selection(&adapters, &selection)?;
                selection
            }
            None => recommended_hardware(&adapters)?,
        };

        let gpu = adapters.iter().find(|a| a.index == selection.gpu_index);
        let output = adapters
            .iter()
            .find(|a| a.index == selection.output_gpu_index)
            .and_then(|a| a.outputs.iter().find(|o| o.index == selection.output_index));
        log::info!(
            "Selected hardware: GPU '{}', output '{}' on GPU {}.",
            gpu.map_or("<unknown>", |a| a.description.as_str()),
            output.map_or("<unknown>", |o| o.name.as_str()),
            selection.output_gpu_index
        );
        Ok(selection)
    }

    /// The device commands are flushed to.
    pub fn device(&self) -> &Arc<RenderDevice> {
        &self.device
    }

    /// The worker pool passes may fan out across.
    pub fn provider(&self) -> &Arc<ParallelizationProvider> {
        &self.provider
    }

    /// The barrier guarding the pass list and render settings.
    pub fn barrier(&self) -> &Arc<StateMutationBarrier> {
        &self.barrier
    }

    /// Number of frames ticked so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index.load(Ordering::Acquire)
    }

    // --- Pass list ---

    /// Appends `pass`; it runs after every pass already added.
    ///
    /// ## Errors
    /// * [`PipelineError::PassAlreadyAdded`] if `pass` is in the list.
    /// * [`PipelineError::PassDisposed`] if `pass` has been disposed.
    pub fn add_render_pass(&self, pass: Arc<dyn RenderPass>) -> Result<(), PipelineError> {
        Self::ensure_not_disposed(&pass)?;
        let mut passes = self.barrier.acquire_permit_with(&self.passes)?;
        if passes.iter().any(|p| same_pass(p, &pass)) {
            return Err(PipelineError::PassAlreadyAdded {
                pass: pass.to_string(),
            });
        }
        pass.base().attach(&self.barrier);
        log::info!("Added {pass}.");
        passes.push(pass);
        Ok(())
    }

    /// Inserts `pass` immediately before `before`.
    ///
    /// ## Errors
    /// * [`PipelineError::PassAlreadyAdded`] if `pass` is in the list.
    /// * [`PipelineError::InsertionKeyNotAdded`] if `before` is not.
    /// * [`PipelineError::PassDisposed`] if `pass` has been disposed.
    pub fn insert_render_pass(
        &self,
        pass: Arc<dyn RenderPass>,
        before: &Arc<dyn RenderPass>,
    ) -> Result<(), PipelineError> {
        Self::ensure_not_disposed(&pass)?;
        let mut passes = self.barrier.acquire_permit_with(&self.passes)?;
        if passes.iter().any(|p| same_pass(p, &pass)) {
            return Err(PipelineError::PassAlreadyAdded {
                pass: pass.to_string(),
            });
        }
        let index = passes
            .iter()
            .position(|p| same_pass(p, before))
            .ok_or_else(|| PipelineError::InsertionKeyNotAdded {
                pass: pass.to_string(),
                key: before.to_string(),
            })?;
        pass.base().attach(&self.barrier);
        log::info!("Added {pass}.");
        passes.insert(index, pass);
        Ok(())
    }

    /// Removes `pass` from the list.
    ///
    /// ## Errors
    /// Returns [`PipelineError::PassNotAdded`] if `pass` is not in the list.
    pub fn remove_render_pass(&self, pass: &Arc<dyn RenderPass>) -> Result<(), PipelineError> {
        let mut passes = self.barrier.acquire_permit_with(&self.passes)?;
        let index = passes
            .iter()
            .position(|p| same_pass(p, pass))
            .ok_or_else(|| PipelineError::PassNotAdded {
                pass: pass.to_string(),
            })?;
        let removed = passes.remove(index);
        removed.base().detach();
        log::info!("Removed {removed}.");
        Ok(())
    }

    /// Removes every pass.
    pub fn clear_passes(&self) -> Result<(), PipelineError> {
        let mut passes = self.barrier.acquire_permit_with(&self.passes)?;
        for pass in passes.drain(..) {
            pass.base().detach();
        }
        log::info!("Removed all render passes.");
        Ok(())
    }

    /// The passes in execution order.
    pub fn added_passes(&self) -> Vec<Arc<dyn RenderPass>> {
        lock(&self.passes).clone()
    }

    fn ensure_not_disposed(pass: &Arc<dyn RenderPass>) -> Result<(), PipelineError> {
        if pass.is_disposed() {
            Err(PipelineError::PassDisposed {
                pass: pass.to_string(),
            })
        } else {
            Ok(())
        }
    }

    // --- Render settings ---

    /// The frame rate cap, or `None` when uncapped.
    pub fn max_frame_rate_hz(&self) -> Option<i64> {
        lock(&self.settings).max_frame_rate_hz
    }

    /// Sets the frame rate cap. Values of zero or less fall back to 60Hz.
    pub fn set_max_frame_rate_hz(&self, hz: Option<i64>) -> Result<(), PipelineError> {
        let mut settings = self.barrier.acquire_permit_with(&self.settings)?;
        let hz = match hz {
            Some(value) if value <= 0 => {
                log::warn!(
                    "Invalid desired framerate '{value}', setting to default value of {DEFAULT_FRAME_RATE_HZ}fps."
                );
                Some(DEFAULT_FRAME_RATE_HZ)
            }
            other => other,
        };
        settings.max_frame_rate_hz = hz;
        match hz {
            Some(value) => log::info!("Set framerate cap to {value}Hz."),
            None => log::info!("Removed framerate cap."),
        }
        Ok(())
    }

    /// Minimum time between frames; zero when uncapped.
    pub fn tick_interval(&self) -> Duration {
        match self.max_frame_rate_hz() {
            Some(hz) if hz > 0 => Duration::from_millis((1000 / hz) as u64),
            _ => Duration::ZERO,
        }
    }

    /// The anti-aliasing level reported by the driver.
    pub fn antialiasing_level(&self) -> Result<MsaaLevel, PipelineError> {
        let samples = self.device.driver().msaa_level()?;
        MsaaLevel::from_native(samples).ok_or(PipelineError::UnknownMsaaLevel { samples })
    }

    /// Sets the anti-aliasing level and rebuilds every open window's back buffer.
    pub fn set_antialiasing_level(&self, level: MsaaLevel) -> Result<(), PipelineError> {
        let _settings = self.barrier.acquire_permit_with(&self.settings)?;
        self.device.driver().set_msaa_level(level.native_value())?;
        self.refresh_window_resolutions()?;
        log::info!("Set anti-aliasing level to {level}.");
        Ok(())
    }

    /// Whether presentation waits for vertical blank.
    pub fn vsync_enabled(&self) -> Result<bool, PipelineError> {
        Ok(self.device.driver().vsync_enabled()?)
    }

    /// Enables or disables vsync and rebuilds every open window's back buffer.
    pub fn set_vsync_enabled(&self, enabled: bool) -> Result<(), PipelineError> {
        let _settings = self.barrier.acquire_permit_with(&self.settings)?;
        self.device.driver().set_vsync_enabled(enabled)?;
        self.refresh_window_resolutions()?;
        log::info!("Set vsync {}.", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Applies the render settings and threading mode of `config`.
    pub fn apply_config(&self, config: &PipelineConfig) -> Result<(), PipelineError> {
        self.set_max_frame_rate_hz(config.max_frame_rate_hz)?;
        self.set_antialiasing_level(config.antialiasing)?;
        self.set_vsync_enabled(config.vsync)?;
        self.provider.set_force_single_threaded(config.force_single_threaded);
        Ok(())
    }

    fn refresh_window_resolutions(&self) -> Result<(), PipelineError> {
        for window in self.open_windows() {
            if window.is_closed() {
                continue;
            }
            let (width, height) = (window.width()?, window.height()?);
            window.set_resolution(width, height)?;
        }
        Ok(())
    }

    // --- Windows ---

    /// Opens a window on the pipeline's device and tracks it until it closes.
    pub fn open_window(
        &self,
        descriptor: &WindowDescriptor,
    ) -> Result<Arc<dyn RenderWindow>, PipelineError> {
        self.device.ensure_live()?;
        let window = self.device.driver().create_window(self.device.handle(), descriptor)?;
        log::debug!("Opened window '{}' ({}).", descriptor.title, window.handle());
        lock(&self.windows).push(window.clone());
        Ok(window)
    }

    /// The windows that were open at the last tick, plus any opened since.
    pub fn open_windows(&self) -> Vec<Arc<dyn RenderWindow>> {
        lock(&self.windows).clone()
    }

    // --- Frame ---

    /// Runs one frame.
    ///
    /// ## Errors
    /// Returns the first error raised by a window or pass. Passes after the
    /// failing one do not run, commands it left queued are discarded, and the
    /// barrier and threading mode are restored before returning.
    pub fn tick(&self) -> Result<(), PipelineError> {
        if !self.device.is_master_thread() {
            return Err(PipelineError::NotOnMasterThread {
                operation: "tick",
                owner: "render device",
            });
        }
        self.device.ensure_live()?;

        self.pump_windows()?;

        let _frozen = self.barrier.freeze()?;
        let _single_threaded = (!self.device.supports_mt_rendering())
            .then(|| SingleThreadedScope::engage(&self.provider));

        let passes = lock(&self.passes).clone();
        let frame = FrameContext::new(
            self.device.clone(),
            self.provider.clone(),
            self.frame_index(),
        );
        let result = passes.iter().try_for_each(|pass| self.run_pass(pass, &frame));
        if result.is_err() {
            self.discard_queues();
        }
        self.frame_index.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn pump_windows(&self) -> Result<(), PipelineError> {
        // Windows may close while being pumped, so work on a snapshot.
        let windows = self.open_windows();
        for window in &windows {
            if window.is_closed() {
                continue;
            }
            if window.pump_messages()? {
                log::debug!("Window {} was resized.", window.handle());
            }
            if !window.is_closed() {
                let _immediate = self.device.lock_immediate();
                window.clear(self.device.immediate_context())?;
            }
        }
        lock(&self.windows).retain(|window| !window.is_closed());
        Ok(())
    }

    fn run_pass(
        &self,
        pass: &Arc<dyn RenderPass>,
        frame: &FrameContext,
    ) -> Result<(), PipelineError> {
        if !pass.is_enabled() {
            return Ok(());
        }
        if pass.is_disposed() || !pass.is_valid() {
            log::debug!("{pass} will be skipped as it is not in a valid configuration.");
            return Ok(());
        }
        pass.on_pre_pass(frame)?;
        pass.execute(frame)?;
        pass.on_post_pass(frame)?;
        self.flush_queues()
    }

    /// Flushes whatever the master and every worker still have queued.
    fn flush_queues(&self) -> Result<(), PipelineError> {
        queue::flush_thread_queue(&self.device)?;
        let device = self.device.clone();
        self.provider
            .invoke_on_all(move || queue::flush_thread_queue(&device), false)
    }

    fn discard_queues(&self) {
        queue::discard_thread_queue(&self.device);
        let device = self.device.clone();
        let discarded = self.provider.invoke_on_all(
            move || {
                queue::discard_thread_queue(&device);
                Ok(())
            },
            false,
        );
        if let Err(err) = discarded {
            log::warn!("Failed to discard worker command queues: {err}");
        }
    }

    // --- Lifecycle ---

    /// Removes every pass, closes the windows and releases the device.
    ///
    /// Calling this again does nothing.
    pub fn teardown(&self) -> Result<(), PipelineError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let cleared = self.clear_passes();
        if self.provider.is_master_thread() {
            self.discard_queues();
        }
        let windows = std::mem::take(&mut *lock(&self.windows));
        let released = self.device.teardown(&windows);
        log::debug!("Render pipeline torn down after {} frame(s).", self.frame_index());
        cleared.and(released)
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::error!("Error while tearing down the render pipeline: {err}");
        }
    }
}
