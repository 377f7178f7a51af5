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

//! Typed, named register slots through which shaders receive their resources.
//!
//! Every binding has a register slot (unique per binding kind within a shader)
//! and an identifier (unique within a shader). Resource view, sampler and
//! vertex input bindings hold a replaceable default resource. Constant buffer
//! bindings are fixed to one buffer at construction and instead own a value
//! buffer that is written with [`ConstantBufferBinding::set_value`].

use crate::renderer::error::BindingError;
use crate::renderer::resource::{Buffer, GpuResource, ShaderResourceView, TextureSampler};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a binding, used as a map key by resource packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    fn next() -> Self {
        Self(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The kind of register a binding occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// A constant buffer register (`cb`).
    ConstantBuffer,
    /// A shader resource view register (`t`).
    ResourceView,
    /// A sampler register (`s`).
    TextureSampler,
    /// A vertex input slot (`v`).
    VertexInput,
}

impl BindingKind {
    /// The register prefix used in diagnostics.
    pub fn register_prefix(self) -> &'static str {
        match self {
            BindingKind::ConstantBuffer => "cb",
            BindingKind::ResourceView => "t",
            BindingKind::TextureSampler => "s",
            BindingKind::VertexInput => "v",
        }
    }

    /// Number of registers of this kind a shader can address.
    pub fn register_limit(self) -> u32 {
        match self {
            BindingKind::ConstantBuffer => 14,
            BindingKind::ResourceView => 128,
            BindingKind::TextureSampler => 16,
            BindingKind::VertexInput => 32,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            BindingKind::ConstantBuffer => "ConstantBufferBinding",
            BindingKind::ResourceView => "ResourceViewBinding",
            BindingKind::TextureSampler => "TextureSamplerBinding",
            BindingKind::VertexInput => "VertexInputBinding",
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validate_identifier(identifier: &str) -> Result<(), BindingError> {
    if identifier.trim().is_empty() {
        Err(BindingError::BlankIdentifier)
    } else {
        Ok(())
    }
}

/// A binding whose default resource can be replaced at any time.
#[derive(Debug)]
pub struct ShaderResourceBinding<T> {
    id: BindingId,
    kind: BindingKind,
    slot: u32,
    identifier: String,
    bound: Mutex<Option<Arc<T>>>,
}

/// Binds a [`ShaderResourceView`] to a `t` register.
pub type ResourceViewBinding = ShaderResourceBinding<ShaderResourceView>;
/// Binds a [`TextureSampler`] to an `s` register.
pub type TextureSamplerBinding = ShaderResourceBinding<TextureSampler>;
/// Binds a vertex [`Buffer`] to an input slot of a vertex shader.
pub type VertexInputBinding = ShaderResourceBinding<Buffer>;

impl<T> ShaderResourceBinding<T> {
    fn with_kind(kind: BindingKind, slot: u32, identifier: &str) -> Result<Self, BindingError> {
        validate_identifier(identifier)?;
        Ok(Self {
            id: BindingId::next(),
            kind,
            slot,
            identifier: identifier.to_owned(),
            bound: Mutex::new(None),
        })
    }

    /// Process-unique identity of this binding.
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// The register kind.
    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// The register slot index.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// The binding's name within its shader.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Replaces the statically bound resource. `None` unbinds.
    pub fn bind(&self, resource: Option<Arc<T>>) {
        *lock(&self.bound) = resource;
    }

    /// The statically bound resource, if any.
    pub fn bound_resource(&self) -> Option<Arc<T>> {
        lock(&self.bound).clone()
    }
}

impl ResourceViewBinding {
    /// Creates a resource view binding on register `t{slot}`.
    pub fn new(slot: u32, identifier: &str) -> Result<Self, BindingError> {
        Self::with_kind(BindingKind::ResourceView, slot, identifier)
    }
}

impl TextureSamplerBinding {
    /// Creates a sampler binding on register `s{slot}`.
    pub fn new(slot: u32, identifier: &str) -> Result<Self, BindingError> {
        Self::with_kind(BindingKind::TextureSampler, slot, identifier)
    }
}

impl VertexInputBinding {
    /// Creates a vertex input binding on input slot `slot`.
    pub fn new(slot: u32, identifier: &str) -> Result<Self, BindingError> {
        Self::with_kind(BindingKind::VertexInput, slot, identifier)
    }
}

impl<T> fmt::Display for ShaderResourceBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}{} : {}'",
            self.kind.type_name(),
            self.kind.register_prefix(),
            self.slot,
            self.identifier
        )
    }
}

/// A constant buffer register together with the value that will be uploaded to it.
///
/// The buffer is fixed at construction. The binding owns a value buffer of
/// exactly the buffer's element size; it is released once by
/// [`dispose`](Self::dispose), or on drop.
#[derive(Debug)]
pub struct ConstantBufferBinding {
    id: BindingId,
    slot: u32,
    identifier: String,
    buffer: Arc<Buffer>,
    size_bytes: usize,
    value: Mutex<Vec<u8>>,
    disposed: AtomicBool,
}

impl ConstantBufferBinding {
    /// Creates a binding on register `cb{slot}` permanently bound to `buffer`.
    pub fn new(slot: u32, identifier: &str, buffer: Arc<Buffer>) -> Result<Self, BindingError> {
        validate_identifier(identifier)?;
        buffer.usable_handle()?;
        let size_bytes = buffer.element_size() as usize;
        Ok(Self {
            id: BindingId::next(),
            slot,
            identifier: identifier.to_owned(),
            buffer,
            size_bytes,
            value: Mutex::new(vec![0u8; size_bytes]),
            disposed: AtomicBool::new(false),
        })
    }

    /// Process-unique identity of this binding.
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Always [`BindingKind::ConstantBuffer`].
    pub fn kind(&self) -> BindingKind {
        BindingKind::ConstantBuffer
    }

    /// The register slot index.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// The binding's name within its shader.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The size of the buffer's element, and therefore of every value.
    pub fn buffer_size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// The constant buffer fixed at construction.
    pub fn bound_resource(&self) -> Arc<Buffer> {
        self.buffer.clone()
    }

    /// Always fails: the buffer of a constant buffer binding can not change.
    pub fn bind(&self, _buffer: Option<Arc<Buffer>>) -> Result<(), BindingError> {
        Err(BindingError::ConstantBufferRebind {
            binding: self.to_string(),
        })
    }

    /// Overwrites the current value. `value` must be exactly the buffer's element size.
    pub fn set_value(&self, value: &[u8]) -> Result<(), BindingError> {
        if self.is_disposed() {
            return Err(BindingError::Disposed {
                binding: self.to_string(),
            });
        }
        if value.len() != self.size_bytes {
            return Err(BindingError::ValueSizeMismatch {
                binding: self.to_string(),
                expected: self.size_bytes,
                actual: value.len(),
            });
        }
        lock(&self.value).copy_from_slice(value);
        Ok(())
    }

    /// Typed convenience over [`set_value`](Self::set_value).
    pub fn set_pod_value<V: bytemuck::Pod>(&self, value: &V) -> Result<(), BindingError> {
        self.set_value(bytemuck::bytes_of(value))
    }

    /// A snapshot of the current value.
    pub fn current_value(&self) -> Result<Vec<u8>, BindingError> {
        if self.is_disposed() {
            return Err(BindingError::Disposed {
                binding: self.to_string(),
            });
        }
        Ok(lock(&self.value).clone())
    }

    /// Whether the binding or its buffer is unusable.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire) || self.buffer.is_disposed()
    }

    /// Releases the value buffer. Only the first call has an effect.
    pub fn dispose(&self) -> bool {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let mut value = lock(&self.value);
            value.clear();
            value.shrink_to_fit();
            true
        } else {
            false
        }
    }
}

impl Drop for ConstantBufferBinding {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.disposed.load(Ordering::Acquire) {
            log::warn!("{self} was not disposed before being dropped.");
        }
    }
}

impl fmt::Display for ConstantBufferBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConstantBufferBinding 'cb{} : {}'",
            self.slot, self.identifier
        )
    }
}
