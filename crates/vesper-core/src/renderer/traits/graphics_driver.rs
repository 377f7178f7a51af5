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

use crate::command::RenderCommand;
use crate::platform::{RenderWindow, WindowDescriptor};
use crate::renderer::handle::{CommandListHandle, ContextHandle, DeviceHandle, SwapChainHandle};
use crate::renderer::hardware::{GraphicsAdapter, HardwareSelection};
use crate::renderer::native::NativeResult;
use std::fmt::Debug;
use std::sync::Arc;

/// What the driver reports about a freshly created device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// The native device.
    pub handle: DeviceHandle,
    /// Whether deferred contexts can build command lists concurrently.
    pub supports_mt_rendering: bool,
}

/// The native graphics collaborator.
///
/// Every entry point reports failure as a
/// [`NativeCallError`](crate::renderer::native::NativeCallError)
/// carrying the driver's reason string.
pub trait GraphicsDriver: Send + Sync + Debug + 'static {
    /// Enumerates installed adapters and their outputs.
    fn enumerate_adapters(&self) -> NativeResult<Vec<GraphicsAdapter>>;

    /// Creates a device on the selected hardware.
    /// ## Arguments
    /// * `selection` - The adapter and output to use.
    /// ## Returns
    /// The device handle and whether it supports multi-threaded command lists.
    fn create_device(&self, selection: &HardwareSelection) -> NativeResult<DeviceInfo>;

    /// Releases a device created by [`create_device`](Self::create_device).
    fn release_device(&self, device: DeviceHandle) -> NativeResult<()>;

    /// The device's immediate context.
    fn immediate_context(&self, device: DeviceHandle) -> NativeResult<ContextHandle>;

    /// Creates a new deferred context on the device.
    fn create_deferred_context(&self, device: DeviceHandle) -> NativeResult<ContextHandle>;

    /// Releases a context.
    fn release_context(&self, context: ContextHandle) -> NativeResult<()>;

    /// Executes `commands` in order against `context`.
    ///
    /// Called on the thread that built the commands, before that thread's
    /// scratch pool is reset, so staged argument data can be read with
    /// [`RenderCommand::decode`]. A `FinishCommandList` command writes the new
    /// command list handle into the scratch slot its first argument points to.
    fn flush_commands(
        &self,
        context: ContextHandle,
        commands: &[RenderCommand],
    ) -> NativeResult<()>;

    /// Executes a finished command list on the immediate context.
    fn execute_command_list(
        &self,
        immediate: ContextHandle,
        list: CommandListHandle,
    ) -> NativeResult<()>;

    /// Presents a swap chain's back buffer.
    fn present(&self, swap_chain: SwapChainHandle) -> NativeResult<()>;

    /// Opens a window with a swap chain on `device`.
    fn create_window(
        &self,
        device: DeviceHandle,
        descriptor: &WindowDescriptor,
    ) -> NativeResult<Arc<dyn RenderWindow>>;

    /// The configured multisample count.
    fn msaa_level(&self) -> NativeResult<u32>;

    /// Sets the multisample count used by newly created back buffers.
    fn set_msaa_level(&self, samples: u32) -> NativeResult<()>;

    /// Whether presentation waits for vertical blank.
    fn vsync_enabled(&self) -> NativeResult<bool>;

    /// Enables or disables waiting for vertical blank.
    fn set_vsync_enabled(&self, enabled: bool) -> NativeResult<()>;
}
