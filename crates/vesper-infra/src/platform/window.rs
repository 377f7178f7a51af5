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

//! A [`RenderWindow`] that lives entirely in memory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use vesper_core::platform::{FullscreenState, RenderWindow, WindowDescriptor};
use vesper_core::renderer::{
    ContextHandle, NativeCallError, NativeResult, ResourceHandle, SwapChainHandle, WindowHandle,
};

#[derive(Debug)]
struct WindowState {
    title: String,
    width: u32,
    height: u32,
    position: (i32, i32),
    fullscreen: FullscreenState,
    cursor_visible: bool,
    pending_resize: Option<(u32, u32)>,
    close_requested: bool,
}

/// An in-memory window with a simulated swap chain.
///
/// OS events are simulated with [`request_resize`](Self::request_resize) and
/// [`request_close`](Self::request_close); both take effect on the next
/// [`pump_messages`](RenderWindow::pump_messages), the same way a real
/// message queue would deliver them.
#[derive(Debug)]
pub struct HeadlessWindow {
    handle: WindowHandle,
    swap_chain: SwapChainHandle,
    back_buffer: (ResourceHandle, ResourceHandle),
    buffer_count: u32,
    icon_path: Option<PathBuf>,
    state: Mutex<WindowState>,
    closed: AtomicBool,
    resolution_changes: AtomicUsize,
    clears: AtomicUsize,
}

impl HeadlessWindow {
    /// Creates an open window.
    ///
    /// ## Arguments
    /// * `handle` - The window handle.
    /// * `swap_chain` - The handle presented by `SwapChainPresent`.
    /// * `back_buffer` - The back buffer's render target and depth stencil views.
    /// * `descriptor` - Title, size, fullscreen state, buffering and icon.
    pub fn new(
        handle: WindowHandle,
        swap_chain: SwapChainHandle,
        back_buffer: (ResourceHandle, ResourceHandle),
        descriptor: &WindowDescriptor,
    ) -> Self {
        Self {
            handle,
            swap_chain,
            back_buffer,
            buffer_count: descriptor.buffering.buffer_count(),
            icon_path: descriptor.icon_path.clone(),
            state: Mutex::new(WindowState {
                title: descriptor.title.clone(),
                width: descriptor.width,
                height: descriptor.height,
                position: (0, 0),
                fullscreen: descriptor.fullscreen,
                cursor_visible: true,
                pending_resize: None,
                close_requested: false,
            }),
            closed: AtomicBool::new(false),
            resolution_changes: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    /// Queues a user resize, delivered by the next message pump.
    pub fn request_resize(&self, width: u32, height: u32) {
        self.state().pending_resize = Some((width, height));
    }

    /// Queues a user close, delivered by the next message pump.
    pub fn request_close(&self) {
        self.state().close_requested = true;
    }

    /// Number of swap chain buffers, including the front buffer.
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    /// The icon the window was created with.
    pub fn icon_path(&self) -> Option<&Path> {
        self.icon_path.as_deref()
    }

    /// How many times the back buffers have been recreated by `set_resolution`.
    pub fn resolution_change_count(&self) -> usize {
        self.resolution_changes.load(Ordering::Acquire)
    }

    /// How many times the window has been cleared.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Acquire)
    }

    fn state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> NativeResult<()> {
        if self.is_closed() {
            Err(NativeCallError::new(format!("Window {} has been closed.", self.handle)))
        } else {
            Ok(())
        }
    }
}

impl RenderWindow for HeadlessWindow {
    fn handle(&self) -> WindowHandle {
        self.handle
    }

    fn title(&self) -> String {
        self.state().title.clone()
    }

    fn set_title(&self, title: &str) -> NativeResult<()> {
        self.ensure_open()?;
        self.state().title = title.to_owned();
        Ok(())
    }

    fn width(&self) -> NativeResult<u32> {
        Ok(self.state().width)
    }

    fn height(&self) -> NativeResult<u32> {
        Ok(self.state().height)
    }

    fn position(&self) -> NativeResult<(i32, i32)> {
        Ok(self.state().position)
    }

    fn set_resolution(&self, width: u32, height: u32) -> NativeResult<()> {
        self.ensure_open()?;
        if width == 0 || height == 0 {
            return Err(NativeCallError::new(format!(
                "Invalid resolution {width}x{height}."
            )));
        }
        let mut state = self.state();
        state.width = width;
        state.height = height;
        self.resolution_changes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn fullscreen_state(&self) -> NativeResult<FullscreenState> {
        Ok(self.state().fullscreen)
    }

    fn set_fullscreen_state(&self, state: FullscreenState) -> NativeResult<()> {
        self.ensure_open()?;
        self.state().fullscreen = state;
        Ok(())
    }

    fn cursor_visible(&self) -> NativeResult<bool> {
        Ok(self.state().cursor_visible)
    }

    fn set_cursor_visible(&self, visible: bool) -> NativeResult<()> {
        self.ensure_open()?;
        self.state().cursor_visible = visible;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn back_buffer_views(&self) -> NativeResult<Option<(ResourceHandle, ResourceHandle)>> {
        Ok((!self.is_closed()).then_some(self.back_buffer))
    }

    fn swap_chain(&self) -> NativeResult<Option<SwapChainHandle>> {
        Ok((!self.is_closed()).then_some(self.swap_chain))
    }

    fn pump_messages(&self) -> NativeResult<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let mut state = self.state();
        if state.close_requested {
            drop(state);
            self.close()?;
            return Ok(false);
        }
        match state.pending_resize.take() {
            Some((width, height)) => {
                state.width = width;
                state.height = height;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self, _context: ContextHandle) -> NativeResult<()> {
        self.ensure_open()?;
        self.clears.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn close(&self) -> NativeResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::debug!("Closed window '{}' ({}).", self.title(), self.handle);
        }
        Ok(())
    }
}

impl Drop for HeadlessWindow {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.is_closed() {
            log::warn!("Window '{}' was not closed before being dropped.", self.title());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_core::platform::MultibufferLevel;

    fn window() -> HeadlessWindow {
        let mut descriptor = WindowDescriptor::new("Test").with_size(640, 480);
        descriptor.buffering = MultibufferLevel::Double;
        HeadlessWindow::new(
            WindowHandle::from_raw(1),
            SwapChainHandle::from_raw(2),
            (ResourceHandle::from_raw(3), ResourceHandle::from_raw(4)),
            &descriptor,
        )
    }

    #[test]
    fn test_pump_delivers_resize_then_close() {
        let window = window();
        assert_eq!(window.buffer_count(), 3);
        assert!(!window.pump_messages().unwrap(), "nothing pending yet");

        window.request_resize(1024, 768);
        assert!(window.pump_messages().unwrap(), "resize must be reported");
        assert_eq!((window.width().unwrap(), window.height().unwrap()), (1024, 768));

        window.request_close();
        assert!(!window.is_closed(), "close is only delivered by the pump");
        window.pump_messages().unwrap();
        assert!(window.is_closed());
        assert_eq!(window.back_buffer_views().unwrap(), None);
        assert_eq!(window.swap_chain().unwrap(), None);
    }

    #[test]
    fn test_closed_window_rejects_mutation() {
        let window = window();
        window.set_resolution(800, 600).unwrap();
        assert_eq!(window.resolution_change_count(), 1);
        window.close().unwrap();
        window.close().unwrap();
        assert!(window.set_resolution(800, 600).is_err());
        assert!(window.clear(ContextHandle::from_raw(9)).is_err());
        assert_eq!(window.resolution_change_count(), 1);
    }
}
