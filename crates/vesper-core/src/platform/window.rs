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

use crate::renderer::handle::{ContextHandle, ResourceHandle, SwapChainHandle, WindowHandle};
use crate::renderer::native::NativeResult;
use std::fmt;
use std::path::PathBuf;

/// Default client width used by [`WindowDescriptor::new`].
pub const DEFAULT_WINDOW_WIDTH: u32 = 800;
/// Default client height used by [`WindowDescriptor::new`].
pub const DEFAULT_WINDOW_HEIGHT: u32 = 600;

/// How a window occupies its display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FullscreenState {
    /// A regular desktop window.
    #[default]
    NotFullscreen = 0,
    /// Exclusive fullscreen.
    StandardFullscreen = 1,
    /// A borderless window covering the display.
    BorderlessFullscreen = 2,
}

/// Number of back buffers behind the front buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MultibufferLevel {
    /// One back buffer.
    #[default]
    Single,
    /// Two back buffers.
    Double,
    /// Three back buffers.
    Triple,
}

impl MultibufferLevel {
    /// Total number of swap chain buffers, including the front buffer.
    pub fn buffer_count(self) -> u32 {
        match self {
            MultibufferLevel::Single => 2,
            MultibufferLevel::Double => 3,
            MultibufferLevel::Triple => 4,
        }
    }
}

/// Everything needed to open a render window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    /// Title bar text.
    pub title: String,
    /// Initial client width in pixels.
    pub width: u32,
    /// Initial client height in pixels.
    pub height: u32,
    /// Initial fullscreen state.
    pub fullscreen: FullscreenState,
    /// Swap chain depth.
    pub buffering: MultibufferLevel,
    /// Icon file; `None` uses the platform default.
    pub icon_path: Option<PathBuf>,
}

impl WindowDescriptor {
    /// A windowed, single-buffered descriptor with the default size.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            fullscreen: FullscreenState::NotFullscreen,
            buffering: MultibufferLevel::Single,
            icon_path: None,
        }
    }

    /// Sets the initial client size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// A native window with a swap chain that render commands can target.
///
/// A window may be closed by the user at any moment, including while passes
/// are generating commands for it. Methods that hand out back-buffer or
/// swap chain handles return `None` once the window is closed.
pub trait RenderWindow: Send + Sync + fmt::Debug {
    /// The native window handle.
    fn handle(&self) -> WindowHandle;

    /// The current title.
    fn title(&self) -> String;

    /// Changes the title bar text.
    fn set_title(&self, title: &str) -> NativeResult<()>;

    /// Client area width in pixels.
    fn width(&self) -> NativeResult<u32>;

    /// Client area height in pixels.
    fn height(&self) -> NativeResult<u32>;

    /// Client area position on the desktop.
    fn position(&self) -> NativeResult<(i32, i32)>;

    /// Resizes the client area (or the display mode when fullscreen) and
    /// recreates the back buffers.
    fn set_resolution(&self, width: u32, height: u32) -> NativeResult<()>;

    /// The current fullscreen state.
    fn fullscreen_state(&self) -> NativeResult<FullscreenState>;

    /// Changes the fullscreen state.
    fn set_fullscreen_state(&self, state: FullscreenState) -> NativeResult<()>;

    /// Whether the cursor is shown over the window.
    fn cursor_visible(&self) -> NativeResult<bool>;

    /// Shows or hides the cursor over the window.
    fn set_cursor_visible(&self, visible: bool) -> NativeResult<()>;

    /// Whether the window has been closed.
    fn is_closed(&self) -> bool;

    /// The back buffer's render target and depth stencil views, or `None`
    /// if the window is closed.
    fn back_buffer_views(&self) -> NativeResult<Option<(ResourceHandle, ResourceHandle)>>;

    /// The swap chain, or `None` if the window is closed.
    fn swap_chain(&self) -> NativeResult<Option<SwapChainHandle>>;

    /// Processes pending OS messages. Returns whether the window was resized.
    fn pump_messages(&self) -> NativeResult<bool>;

    /// Clears the back buffer and depth stencil through `context`.
    fn clear(&self, context: ContextHandle) -> NativeResult<()>;

    /// Closes the window and releases its native resources. Idempotent.
    fn close(&self) -> NativeResult<()>;
}
