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

//! The 8-byte argument slot carried by every [`RenderCommand`](super::RenderCommand).

use crate::renderer::handle::ResourceHandle;
use std::fmt;

/// A single 8-byte argument of a render command.
///
/// Any scalar, handle or staged-memory address fits in one slot without loss.
/// Narrow values occupy the low bytes of the slot: unsigned values are
/// zero-extended, signed values keep their two's complement bit pattern
/// *without* sign extension (an `i8` of `-1` is stored as `0xFF`), and
/// floating point values are stored by raw bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CommandArgument(u64);

impl CommandArgument {
    /// The empty argument (all bits zero).
    pub const BLANK: CommandArgument = CommandArgument(0);

    /// Wraps a raw 64-bit pattern.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit pattern of this argument.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Stores an `i8` in the lowest byte.
    pub const fn from_i8(value: i8) -> Self {
        Self(value as u8 as u64)
    }

    /// Stores an `i16` in the two lowest bytes.
    pub const fn from_i16(value: i16) -> Self {
        Self(value as u16 as u64)
    }

    /// Stores an `i32` in the four lowest bytes.
    pub const fn from_i32(value: i32) -> Self {
        Self(value as u32 as u64)
    }

    /// Stores an `i64` across the whole slot.
    pub const fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    /// Stores a `u8`, zero-extended.
    pub const fn from_u8(value: u8) -> Self {
        Self(value as u64)
    }

    /// Stores a `u16`, zero-extended.
    pub const fn from_u16(value: u16) -> Self {
        Self(value as u64)
    }

    /// Stores a `u32`, zero-extended.
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    /// Stores a `u64`.
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Stores a pointer-sized unsigned value (an address or an element count).
    pub const fn from_usize(value: usize) -> Self {
        Self(value as u64)
    }

    /// Stores the raw bits of an `f32` in the four lowest bytes.
    pub fn from_f32(value: f32) -> Self {
        Self(value.to_bits() as u64)
    }

    /// Stores the raw bits of an `f64`. The value is never narrowed.
    pub fn from_f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Stores a native resource handle.
    pub const fn from_handle(handle: ResourceHandle) -> Self {
        Self(handle.raw())
    }

    /// Reads the lowest byte as an `i8`.
    pub const fn as_i8(self) -> i8 {
        self.0 as u8 as i8
    }

    /// Reads the two lowest bytes as an `i16`.
    pub const fn as_i16(self) -> i16 {
        self.0 as u16 as i16
    }

    /// Reads the four lowest bytes as an `i32`.
    pub const fn as_i32(self) -> i32 {
        self.0 as u32 as i32
    }

    /// Reads the whole slot as an `i64`.
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Reads the lowest byte as a `u8`.
    pub const fn as_u8(self) -> u8 {
        self.0 as u8
    }

    /// Reads the two lowest bytes as a `u16`.
    pub const fn as_u16(self) -> u16 {
        self.0 as u16
    }

    /// Reads the four lowest bytes as a `u32`.
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// Reads the whole slot as a `u64`.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reads the slot as a pointer-sized value.
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Reinterprets the four lowest bytes as an `f32`.
    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    /// Reinterprets the slot as an `f64`.
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Reads the slot as a native resource handle.
    pub const fn as_handle(self) -> ResourceHandle {
        ResourceHandle::from_raw(self.0)
    }

    /// Returns the low and high 32-bit halves of the slot.
    pub const fn split_u32(self) -> (u32, u32) {
        (self.0 as u32, (self.0 >> 32) as u32)
    }

    /// Packs two 32-bit values into one slot, `low` first.
    pub const fn pack_u32(low: u32, high: u32) -> Self {
        Self(low as u64 | ((high as u64) << 32))
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $ctor:ident),* $(,)?) => {
        $(
            impl From<$ty> for CommandArgument {
                fn from(value: $ty) -> Self {
                    CommandArgument::$ctor(value)
                }
            }
        )*
    };
}

impl_from_scalar! {
    i8 => from_i8,
    i16 => from_i16,
    i32 => from_i32,
    i64 => from_i64,
    u8 => from_u8,
    u16 => from_u16,
    u32 => from_u32,
    u64 => from_u64,
    usize => from_usize,
    f32 => from_f32,
    f64 => from_f64,
    ResourceHandle => from_handle,
}

impl fmt::Display for CommandArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
