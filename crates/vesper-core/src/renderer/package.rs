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

//! Per-draw overrides of a shader's bound resources.
//!
//! A [`ShaderResourcePackage`] lets one shader serve many materials: each
//! material keeps a package of values keyed by binding, and lookups fall back
//! to the binding's own resource when the package has no entry.

use crate::renderer::binding::{lock, BindingId, ConstantBufferBinding, ShaderResourceBinding};
use crate::renderer::error::BindingError;
use crate::renderer::resource::{Buffer, ShaderResourceView, TextureSampler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A value stored in a package, tagged by the kind of binding it belongs to.
#[derive(Debug, Clone)]
pub enum PackageValue {
    /// Raw constant buffer contents.
    ConstantBuffer(Arc<[u8]>),
    /// A shader resource view (or an explicit "nothing bound").
    ResourceView(Option<Arc<ShaderResourceView>>),
    /// A texture sampler (or an explicit "nothing bound").
    TextureSampler(Option<Arc<TextureSampler>>),
    /// A vertex buffer (or an explicit "nothing bound").
    VertexInput(Option<Arc<Buffer>>),
}

/// Resource types that can sit behind a [`ShaderResourceBinding`] in a package.
pub trait PackagedResource: Sized {
    /// Tags a value with its variant.
    fn wrap(value: Option<Arc<Self>>) -> PackageValue;

    /// Extracts a value of this type, if the variant matches.
    fn unwrap(value: &PackageValue) -> Option<Option<Arc<Self>>>;
}

impl PackagedResource for ShaderResourceView {
    fn wrap(value: Option<Arc<Self>>) -> PackageValue {
        PackageValue::ResourceView(value)
    }

    fn unwrap(value: &PackageValue) -> Option<Option<Arc<Self>>> {
        match value {
            PackageValue::ResourceView(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl PackagedResource for TextureSampler {
    fn wrap(value: Option<Arc<Self>>) -> PackageValue {
        PackageValue::TextureSampler(value)
    }

    fn unwrap(value: &PackageValue) -> Option<Option<Arc<Self>>> {
        match value {
            PackageValue::TextureSampler(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl PackagedResource for Buffer {
    fn wrap(value: Option<Arc<Self>>) -> PackageValue {
        PackageValue::VertexInput(value)
    }

    fn unwrap(value: &PackageValue) -> Option<Option<Arc<Self>>> {
        match value {
            PackageValue::VertexInput(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// A binding whose value can be overridden by a package.
pub trait PackageBinding {
    /// What the package stores for this binding.
    type Value;

    /// Key of the binding inside a package.
    fn binding_id(&self) -> BindingId;

    /// Validates and tags a value for storage.
    fn to_package_value(&self, value: Self::Value) -> Result<PackageValue, BindingError>;

    /// Reads a stored value back, if it belongs to this kind of binding.
    fn from_package_value(&self, value: &PackageValue) -> Option<Self::Value>;

    /// The value to use when the package has no entry.
    fn default_value(&self) -> Result<Self::Value, BindingError>;
}

impl<T: PackagedResource> PackageBinding for ShaderResourceBinding<T> {
    type Value = Option<Arc<T>>;

    fn binding_id(&self) -> BindingId {
        self.id()
    }

    fn to_package_value(&self, value: Self::Value) -> Result<PackageValue, BindingError> {
        Ok(T::wrap(value))
    }

    fn from_package_value(&self, value: &PackageValue) -> Option<Self::Value> {
        T::unwrap(value)
    }

    fn default_value(&self) -> Result<Self::Value, BindingError> {
        Ok(self.bound_resource())
    }
}

impl PackageBinding for ConstantBufferBinding {
    type Value = Vec<u8>;

    fn binding_id(&self) -> BindingId {
        self.id()
    }

    fn to_package_value(&self, value: Self::Value) -> Result<PackageValue, BindingError> {
        let expected = self.buffer_size_bytes();
        if value.len() != expected {
            return Err(BindingError::ValueSizeMismatch {
                binding: self.to_string(),
                expected,
                actual: value.len(),
            });
        }
        Ok(PackageValue::ConstantBuffer(value.into()))
    }

    fn from_package_value(&self, value: &PackageValue) -> Option<Self::Value> {
        match value {
            PackageValue::ConstantBuffer(bytes) => Some(bytes.to_vec()),
            _ => None,
        }
    }

    fn default_value(&self) -> Result<Self::Value, BindingError> {
        self.current_value()
    }
}

/// A thread-safe map from binding to override value.
#[derive(Debug, Default)]
pub struct ShaderResourcePackage {
    values: Mutex<HashMap<BindingId, PackageValue>>,
}

impl ShaderResourcePackage {
    /// Creates an empty package.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the value for `binding`.
    ///
    /// Constant buffer values must match the buffer's element size.
    pub fn set_value<B: PackageBinding + ?Sized>(
        &self,
        binding: &B,
        value: B::Value,
    ) -> Result<(), BindingError> {
        let value = binding.to_package_value(value)?;
        lock(&self.values).insert(binding.binding_id(), value);
        Ok(())
    }

    /// Returns the override for `binding`, or the binding's own value when
    /// there is none.
    pub fn get_value<B: PackageBinding + ?Sized>(
        &self,
        binding: &B,
    ) -> Result<B::Value, BindingError> {
        let stored = lock(&self.values)
            .get(&binding.binding_id())
            .and_then(|value| binding.from_package_value(value));
        match stored {
            Some(value) => Ok(value),
            None => binding.default_value(),
        }
    }

    /// Whether the package holds an override for `binding`.
    pub fn contains<B: PackageBinding + ?Sized>(&self, binding: &B) -> bool {
        lock(&self.values).contains_key(&binding.binding_id())
    }

    /// Drops the override for `binding`. Returns whether one existed.
    pub fn remove<B: PackageBinding + ?Sized>(&self, binding: &B) -> bool {
        lock(&self.values).remove(&binding.binding_id()).is_some()
    }

    /// Number of overrides held.
    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    /// Whether the package holds no overrides.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every entry of `other` into this package, replacing entries
    /// for the same bindings.
    pub fn copy_from(&self, other: &ShaderResourcePackage) {
        if std::ptr::eq(self, other) {
            return;
        }
        let snapshot = lock(&other.values).clone();
        lock(&self.values).extend(snapshot);
    }
}

impl Clone for ShaderResourcePackage {
    fn clone(&self) -> Self {
        Self {
            values: Mutex::new(lock(&self.values).clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::binding::{ResourceViewBinding, TextureSamplerBinding};
    use crate::renderer::handle::ResourceHandle;
    use crate::renderer::resource::{BufferKind, GpuResource, Texture};

    fn sampler(raw: u64) -> Arc<TextureSampler> {
        Arc::new(TextureSampler::new(ResourceHandle::from_raw(raw), "linear"))
    }

    #[test]
    fn test_get_value_falls_back_to_bound_resource() {
        let binding = TextureSamplerBinding::new(0, "DefaultSampler").unwrap();
        let bound = sampler(5);
        binding.bind(Some(bound.clone()));
        let package = ShaderResourcePackage::new();

        let value = package.get_value(&binding).unwrap().expect("bound sampler");
        assert!(Arc::ptr_eq(&value, &bound), "no override should yield the bound resource");

        let overridden = sampler(6);
        package.set_value(&binding, Some(overridden.clone())).unwrap();
        let value = package.get_value(&binding).unwrap().expect("override");
        assert!(Arc::ptr_eq(&value, &overridden));

        package.set_value(&binding, None).unwrap();
        assert!(
            package.get_value(&binding).unwrap().is_none(),
            "an explicit None override shadows the bound resource"
        );
        bound.dispose();
        overridden.dispose();
    }

    #[test]
    fn test_constant_buffer_values() {
        let buffer = Arc::new(Buffer::new(
            ResourceHandle::from_raw(3),
            BufferKind::Constant,
            8,
            1,
            "material",
        ));
        let binding = ConstantBufferBinding::new(0, "Material", buffer.clone()).unwrap();
        binding.set_value(&[1; 8]).unwrap();
        let package = ShaderResourcePackage::new();

        assert_eq!(package.get_value(&binding).unwrap(), vec![1; 8]);
        package.set_value(&binding, vec![2; 8]).unwrap();
        assert_eq!(package.get_value(&binding).unwrap(), vec![2; 8]);
        assert_eq!(binding.current_value().unwrap(), vec![1; 8], "the binding itself is untouched");

        assert!(matches!(
            package.set_value(&binding, vec![0; 4]),
            Err(BindingError::ValueSizeMismatch { expected: 8, actual: 4, .. })
        ));
        binding.dispose();
        buffer.dispose();
    }

    #[test]
    fn test_copy_from_and_clone_snapshot_entries() {
        let texture: Arc<dyn GpuResource> =
            Arc::new(Texture::new(ResourceHandle::from_raw(1), 4, 4, "tex"));
        let view = Arc::new(ShaderResourceView::new(
            ResourceHandle::from_raw(2),
            texture.clone(),
            "tex srv",
        ));
        let views = ResourceViewBinding::new(0, "Albedo").unwrap();
        let samplers = TextureSamplerBinding::new(0, "Sampler").unwrap();
        let linear = sampler(9);

        let source = ShaderResourcePackage::new();
        source.set_value(&views, Some(view.clone())).unwrap();
        source.set_value(&samplers, Some(linear.clone())).unwrap();

        let target = ShaderResourcePackage::new();
        target.copy_from(&source);
        let cloned = source.clone();
        for package in [&target, &cloned] {
            assert_eq!(package.len(), 2);
            let got = package.get_value(&views).unwrap().expect("copied view");
            assert!(Arc::ptr_eq(&got, &view));
            let got = package.get_value(&samplers).unwrap().expect("copied sampler");
            assert!(Arc::ptr_eq(&got, &linear));
        }

        source.remove(&views);
        assert!(target.contains(&views), "copies are independent of the source");
        view.dispose();
        texture.dispose();
        linear.dispose();
    }
}
