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

//! GPU resource wrappers referenced by render commands.
//!
//! The native driver owns the memory behind every resource; these types only
//! carry the native handle plus an idempotent disposed flag so that command
//! factories can reject stale resources at the call site.

use crate::renderer::error::ResourceError;
use crate::renderer::handle::ResourceHandle;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Common behaviour of every object that can be referenced by a render command.
pub trait GpuResource: Send + Sync + fmt::Debug {
    /// The native handle used as a command argument.
    fn resource_handle(&self) -> ResourceHandle;

    /// Whether the resource (or anything it depends on) has been disposed.
    fn is_disposed(&self) -> bool;

    /// Marks the resource disposed. Returns `true` only for the first call.
    fn dispose(&self) -> bool;

    /// A short human-readable description used in error messages.
    fn describe(&self) -> String;

    /// Returns the handle if the resource can still be referenced by a command.
    fn usable_handle(&self) -> Result<ResourceHandle, ResourceError> {
        if self.is_disposed() {
            return Err(ResourceError::Disposed {
                resource: self.describe(),
            });
        }
        let handle = self.resource_handle();
        if handle.is_null() {
            return Err(ResourceError::NullHandle {
                resource: self.describe(),
            });
        }
        Ok(handle)
    }
}

/// Handle plus disposed flag shared by every resource type.
#[derive(Debug)]
pub struct ResourceCell {
    handle: ResourceHandle,
    label: String,
    disposed: AtomicBool,
}

impl ResourceCell {
    /// Wraps a native handle.
    pub fn new(handle: ResourceHandle, label: impl Into<String>) -> Self {
        Self {
            handle,
            label: label.into(),
            disposed: AtomicBool::new(false),
        }
    }

    /// The native handle.
    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    /// The debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Marks the cell disposed. Returns `true` only for the first call.
    pub fn dispose(&self) -> bool {
        self.disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Drop for ResourceCell {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.is_disposed() && !self.handle.is_null() {
            log::warn!("Resource '{}' was not disposed before being dropped.", self.label);
        }
    }
}

/// What a [`Buffer`] is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex input data.
    Vertex,
    /// Index data.
    Index,
    /// Per-instance input data.
    Instance,
    /// Shader constants.
    Constant,
}

/// A GPU buffer of fixed-size elements.
#[derive(Debug)]
pub struct Buffer {
    cell: ResourceCell,
    kind: BufferKind,
    element_size: u32,
    element_count: u32,
}

impl Buffer {
    /// Wraps a native buffer.
    pub fn new(
        handle: ResourceHandle,
        kind: BufferKind,
        element_size: u32,
        element_count: u32,
        label: impl Into<String>,
    ) -> Self {
        Self {
            cell: ResourceCell::new(handle, label),
            kind,
            element_size,
            element_count,
        }
    }

    /// What the buffer is used for.
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Size of one element in bytes (the vertex stride for vertex buffers).
    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    /// Number of elements.
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Total size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.element_size as u64 * self.element_count as u64
    }
}

impl GpuResource for Buffer {
    fn resource_handle(&self) -> ResourceHandle {
        self.cell.handle()
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }

    fn dispose(&self) -> bool {
        self.cell.dispose()
    }

    fn describe(&self) -> String {
        format!("{:?} buffer '{}'", self.kind, self.cell.label())
    }
}

/// A GPU texture. Views are created over it.
#[derive(Debug)]
pub struct Texture {
    cell: ResourceCell,
    width: u32,
    height: u32,
}

impl Texture {
    /// Wraps a native texture.
    pub fn new(handle: ResourceHandle, width: u32, height: u32, label: impl Into<String>) -> Self {
        Self {
            cell: ResourceCell::new(handle, label),
            width,
            height,
        }
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl GpuResource for Texture {
    fn resource_handle(&self) -> ResourceHandle {
        self.cell.handle()
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }

    fn dispose(&self) -> bool {
        self.cell.dispose()
    }

    fn describe(&self) -> String {
        format!("texture '{}'", self.cell.label())
    }
}

macro_rules! resource_view {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            view: ResourceCell,
            resource: Arc<dyn GpuResource>,
        }

        impl $name {
            /// Wraps a native view over `resource`.
            pub fn new(
                handle: ResourceHandle,
                resource: Arc<dyn GpuResource>,
                label: impl Into<String>,
            ) -> Self {
                Self {
                    view: ResourceCell::new(handle, label),
                    resource,
                }
            }

            /// The resource the view was created over.
            pub fn resource(&self) -> &Arc<dyn GpuResource> {
                &self.resource
            }
        }

        impl GpuResource for $name {
            fn resource_handle(&self) -> ResourceHandle {
                self.view.handle()
            }

            fn is_disposed(&self) -> bool {
                self.view.is_disposed() || self.resource.is_disposed()
            }

            fn dispose(&self) -> bool {
                self.view.dispose()
            }

            fn describe(&self) -> String {
                format!(concat!($what, " '{}'"), self.view.label())
            }
        }
    };
}

resource_view!(
    /// A view binding a resource for shader reads.
    ShaderResourceView,
    "shader resource view"
);
resource_view!(
    /// A view binding a texture as a colour render target.
    RenderTargetView,
    "render target view"
);
resource_view!(
    /// A view binding a texture as the depth/stencil target.
    DepthStencilView,
    "depth stencil view"
);

macro_rules! state_object {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            cell: ResourceCell,
        }

        impl $name {
            /// Wraps a native state object.
            pub fn new(handle: ResourceHandle, label: impl Into<String>) -> Self {
                Self {
                    cell: ResourceCell::new(handle, label),
                }
            }
        }

        impl GpuResource for $name {
            fn resource_handle(&self) -> ResourceHandle {
                self.cell.handle()
            }

            fn is_disposed(&self) -> bool {
                self.cell.is_disposed()
            }

            fn dispose(&self) -> bool {
                self.cell.dispose()
            }

            fn describe(&self) -> String {
                format!(concat!($what, " '{}'"), self.cell.label())
            }
        }
    };
}

state_object!(
    /// Rasterizer configuration (culling, fill mode, depth bias).
    RasterizerState,
    "rasterizer state"
);
state_object!(
    /// Depth and stencil test configuration.
    DepthStencilState,
    "depth stencil state"
);
state_object!(
    /// Output-merger blend configuration.
    BlendState,
    "blend state"
);
state_object!(
    /// Texture filtering and addressing configuration.
    TextureSampler,
    "texture sampler"
);
state_object!(
    /// Mapping from vertex buffer layout to vertex shader inputs.
    InputLayout,
    "input layout"
);
state_object!(
    /// A region of a render target to draw into.
    Viewport,
    "viewport"
);
