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

//! Opaque handles to objects owned by the native graphics driver.

use std::fmt;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The null handle.
            pub const NULL: $name = $name(0);

            /// Wraps a raw native handle value.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw native handle value.
            pub const fn raw(self) -> u64 {
                self.0
            }

            /// Returns `true` if this is the null handle.
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{:x})", stringify!($name), self.0)
            }
        }
    };
}

native_handle!(
    /// A handle to a GPU resource, view or pipeline state object.
    ResourceHandle
);
native_handle!(
    /// A handle to a created graphics device.
    DeviceHandle
);
native_handle!(
    /// A handle to an immediate or deferred device context.
    ContextHandle
);
native_handle!(
    /// A handle to a finished command list recorded on a deferred context.
    CommandListHandle
);
native_handle!(
    /// A handle to a window's swap chain.
    SwapChainHandle
);
native_handle!(
    /// A handle to a native window.
    WindowHandle
);
