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

//! Loaded shader programs and the bindings they declare.

use crate::command::{CommandSink, Instruction, RenderCommand};
use crate::renderer::binding::{
    BindingId, BindingKind, ConstantBufferBinding, ResourceViewBinding, TextureSamplerBinding,
    VertexInputBinding,
};
use crate::renderer::error::{BindingError, CommandError, ShaderError};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::package::ShaderResourcePackage;
use crate::renderer::resource::{ShaderResourceView, TextureSampler};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The pipeline stage a shader runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Per-vertex stage.
    Vertex,
    /// Per-fragment stage.
    Fragment,
}

impl ShaderStage {
    /// Instruction binding the shader itself.
    pub fn set_shader_instruction(self) -> Instruction {
        match self {
            ShaderStage::Vertex => Instruction::VsSetShader,
            ShaderStage::Fragment => Instruction::FsSetShader,
        }
    }

    /// Instruction binding constant buffers at this stage.
    pub fn set_constant_buffers_instruction(self) -> Instruction {
        match self {
            ShaderStage::Vertex => Instruction::VsSetCBuffers,
            ShaderStage::Fragment => Instruction::FsSetCBuffers,
        }
    }

    /// Instruction binding samplers at this stage.
    pub fn set_samplers_instruction(self) -> Instruction {
        match self {
            ShaderStage::Vertex => Instruction::VsSetSamplers,
            ShaderStage::Fragment => Instruction::FsSetSamplers,
        }
    }

    /// Instruction binding shader resource views at this stage.
    pub fn set_resources_instruction(self) -> Instruction {
        match self {
            ShaderStage::Vertex => Instruction::VsSetResources,
            ShaderStage::Fragment => Instruction::FsSetResources,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "Vertex"),
            ShaderStage::Fragment => write!(f, "Fragment"),
        }
    }
}

/// A shared reference to any kind of binding.
#[derive(Debug, Clone)]
pub enum ShaderBinding {
    /// A `cb` register.
    ConstantBuffer(Arc<ConstantBufferBinding>),
    /// A `t` register.
    ResourceView(Arc<ResourceViewBinding>),
    /// An `s` register.
    TextureSampler(Arc<TextureSamplerBinding>),
    /// A vertex input slot.
    VertexInput(Arc<VertexInputBinding>),
}

impl ShaderBinding {
    /// Process-unique identity of the binding.
    pub fn id(&self) -> BindingId {
        match self {
            ShaderBinding::ConstantBuffer(b) => b.id(),
            ShaderBinding::ResourceView(b) => b.id(),
            ShaderBinding::TextureSampler(b) => b.id(),
            ShaderBinding::VertexInput(b) => b.id(),
        }
    }

    /// The register kind.
    pub fn kind(&self) -> BindingKind {
        match self {
            ShaderBinding::ConstantBuffer(_) => BindingKind::ConstantBuffer,
            ShaderBinding::ResourceView(_) => BindingKind::ResourceView,
            ShaderBinding::TextureSampler(_) => BindingKind::TextureSampler,
            ShaderBinding::VertexInput(_) => BindingKind::VertexInput,
        }
    }

    /// The register slot.
    pub fn slot(&self) -> u32 {
        match self {
            ShaderBinding::ConstantBuffer(b) => b.slot(),
            ShaderBinding::ResourceView(b) => b.slot(),
            ShaderBinding::TextureSampler(b) => b.slot(),
            ShaderBinding::VertexInput(b) => b.slot(),
        }
    }

    /// The binding's name.
    pub fn identifier(&self) -> &str {
        match self {
            ShaderBinding::ConstantBuffer(b) => b.identifier(),
            ShaderBinding::ResourceView(b) => b.identifier(),
            ShaderBinding::TextureSampler(b) => b.identifier(),
            ShaderBinding::VertexInput(b) => b.identifier(),
        }
    }
}

impl fmt::Display for ShaderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderBinding::ConstantBuffer(b) => b.fmt(f),
            ShaderBinding::ResourceView(b) => b.fmt(f),
            ShaderBinding::TextureSampler(b) => b.fmt(f),
            ShaderBinding::VertexInput(b) => b.fmt(f),
        }
    }
}

impl From<Arc<ConstantBufferBinding>> for ShaderBinding {
    fn from(b: Arc<ConstantBufferBinding>) -> Self {
        ShaderBinding::ConstantBuffer(b)
    }
}

impl From<Arc<ResourceViewBinding>> for ShaderBinding {
    fn from(b: Arc<ResourceViewBinding>) -> Self {
        ShaderBinding::ResourceView(b)
    }
}

impl From<Arc<TextureSamplerBinding>> for ShaderBinding {
    fn from(b: Arc<TextureSamplerBinding>) -> Self {
        ShaderBinding::TextureSampler(b)
    }
}

impl From<Arc<VertexInputBinding>> for ShaderBinding {
    fn from(b: Arc<VertexInputBinding>) -> Self {
        ShaderBinding::VertexInput(b)
    }
}

/// A loaded shader program with its validated set of bindings.
#[derive(Debug)]
pub struct Shader {
    name: String,
    stage: ShaderStage,
    handle: ResourceHandle,
    bindings: Vec<ShaderBinding>,
    constant_buffers: Vec<Arc<ConstantBufferBinding>>,
    samplers: Vec<Arc<TextureSamplerBinding>>,
    resource_views: Vec<Arc<ResourceViewBinding>>,
    vertex_inputs: Vec<Arc<VertexInputBinding>>,
    num_constant_buffer_slots: u32,
    num_sampler_slots: u32,
    num_resource_view_slots: u32,
    num_input_slots: u32,
    identifiers: HashMap<String, usize>,
    disposed: AtomicBool,
}

fn slot_count(slots: impl Iterator<Item = u32>) -> u32 {
    slots
        .max()
        .and_then(|max| max.checked_add(1))
        .unwrap_or(0)
}

impl Shader {
    /// Wraps a loaded native shader and validates its bindings.
    ///
    /// ## Errors
    /// * [`ShaderError::SlotOutOfRange`] if a slot is past its kind's register limit.
    /// * [`ShaderError::SlotClash`] if two bindings of the same kind share a slot.
    /// * [`ShaderError::IdentifierClash`] if two identifiers are equal ignoring ASCII case.
    /// * [`ShaderError::VertexInputOnNonVertexStage`] for vertex inputs on a fragment shader.
    pub fn new(
        name: impl Into<String>,
        stage: ShaderStage,
        handle: ResourceHandle,
        bindings: Vec<ShaderBinding>,
    ) -> Result<Self, ShaderError> {
        let name = name.into();
        if handle.is_null() {
            return Err(ShaderError::NullHandle { shader: name });
        }

        let mut constant_buffers = Vec::new();
        let mut samplers = Vec::new();
        let mut resource_views = Vec::new();
        let mut vertex_inputs = Vec::new();
        for binding in &bindings {
            match binding {
                ShaderBinding::ConstantBuffer(b) => constant_buffers.push(b.clone()),
                ShaderBinding::ResourceView(b) => resource_views.push(b.clone()),
                ShaderBinding::TextureSampler(b) => samplers.push(b.clone()),
                ShaderBinding::VertexInput(b) => {
                    if stage != ShaderStage::Vertex {
                        return Err(ShaderError::VertexInputOnNonVertexStage {
                            shader: name,
                            binding: binding.to_string(),
                        });
                    }
                    vertex_inputs.push(b.clone());
                }
            }
        }

        Self::check_clashes(&bindings)?;

        let identifiers = bindings
            .iter()
            .enumerate()
            .map(|(index, b)| (b.identifier().to_owned(), index))
            .collect();

        Ok(Self {
            num_constant_buffer_slots: slot_count(constant_buffers.iter().map(|b| b.slot())),
            num_sampler_slots: slot_count(samplers.iter().map(|b| b.slot())),
            num_resource_view_slots: slot_count(resource_views.iter().map(|b| b.slot())),
            num_input_slots: slot_count(vertex_inputs.iter().map(|b| b.slot())),
            name,
            stage,
            handle,
            bindings,
            constant_buffers,
            samplers,
            resource_views,
            vertex_inputs,
            identifiers,
            disposed: AtomicBool::new(false),
        })
    }

    fn check_clashes(bindings: &[ShaderBinding]) -> Result<(), ShaderError> {
        for binding in bindings {
            let limit = binding.kind().register_limit();
            if binding.slot() >= limit {
                return Err(ShaderError::SlotOutOfRange {
                    binding: binding.to_string(),
                    slot: binding.slot(),
                    limit,
                });
            }
        }
        for (i, a) in bindings.iter().enumerate() {
            for b in &bindings[i + 1..] {
                if a.kind() == b.kind() && a.slot() == b.slot() {
                    return Err(ShaderError::SlotClash {
                        first: a.to_string(),
                        second: b.to_string(),
                        slot: a.slot(),
                    });
                }
            }
        }
        for (i, a) in bindings.iter().enumerate() {
            for b in &bindings[i + 1..] {
                if a.identifier().eq_ignore_ascii_case(b.identifier()) {
                    return Err(ShaderError::IdentifierClash {
                        first: a.to_string(),
                        second: b.to_string(),
                        identifier: a.identifier().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The shader's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stage the shader runs at.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The native shader handle.
    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    /// Every binding in declaration order.
    pub fn bindings(&self) -> &[ShaderBinding] {
        &self.bindings
    }

    /// Constant buffer bindings in declaration order.
    pub fn constant_buffer_bindings(&self) -> &[Arc<ConstantBufferBinding>] {
        &self.constant_buffers
    }

    /// Sampler bindings in declaration order.
    pub fn texture_sampler_bindings(&self) -> &[Arc<TextureSamplerBinding>] {
        &self.samplers
    }

    /// Resource view bindings in declaration order.
    pub fn resource_view_bindings(&self) -> &[Arc<ResourceViewBinding>] {
        &self.resource_views
    }

    /// Vertex input bindings in declaration order (vertex shaders only).
    pub fn vertex_input_bindings(&self) -> &[Arc<VertexInputBinding>] {
        &self.vertex_inputs
    }

    /// Highest constant buffer slot plus one, or 0.
    pub fn num_constant_buffer_slots(&self) -> u32 {
        self.num_constant_buffer_slots
    }

    /// Highest sampler slot plus one, or 0.
    pub fn num_texture_sampler_slots(&self) -> u32 {
        self.num_sampler_slots
    }

    /// Highest resource view slot plus one, or 0.
    pub fn num_resource_view_slots(&self) -> u32 {
        self.num_resource_view_slots
    }

    /// Highest vertex input slot plus one, or 0.
    pub fn num_input_slots(&self) -> u32 {
        self.num_input_slots
    }

    /// Looks a binding up by its exact identifier.
    pub fn binding_by_identifier(&self, identifier: &str) -> Result<&ShaderBinding, ShaderError> {
        self.identifiers
            .get(identifier)
            .map(|&index| &self.bindings[index])
            .ok_or_else(|| ShaderError::UnknownIdentifier {
                shader: self.name.clone(),
                identifier: identifier.to_owned(),
            })
    }

    /// Whether a binding with this exact identifier exists.
    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.identifiers.contains_key(identifier)
    }

    /// Whether this very binding (not merely an equal one) belongs to the shader.
    pub fn contains_binding(&self, binding: &ShaderBinding) -> bool {
        self.bindings.iter().any(|b| b.id() == binding.id())
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Disposes the shader and every constant buffer binding it owns.
    /// Returns `true` only for the first call.
    pub fn dispose(&self) -> bool {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        for binding in &self.constant_buffers {
            binding.dispose();
        }
        true
    }

    /// Returns the native handle if the shader can still be used.
    pub fn usable_handle(&self) -> Result<ResourceHandle, ShaderError> {
        if self.is_disposed() {
            Err(ShaderError::Disposed {
                shader: self.name.clone(),
            })
        } else {
            Ok(self.handle)
        }
    }

    /// Queues the commands that make this shader current: the shader itself,
    /// then its constant buffers when it declares any.
    pub fn queue_switch(&self, sink: &mut impl CommandSink) -> Result<(), CommandError> {
        sink.push_command(RenderCommand::set_shader(self)?);
        if self.num_constant_buffer_slots > 0 {
            sink.push_command(RenderCommand::set_shader_constant_buffers(self)?);
        }
        Ok(())
    }

    /// Queues the commands that upload this shader's resources.
    ///
    /// Values come from `package` when given (falling back to each binding's
    /// own resource), otherwise from the bindings themselves.
    pub fn queue_resource_update(
        &self,
        sink: &mut impl CommandSink,
        package: Option<&ShaderResourcePackage>,
    ) -> Result<(), CommandError> {
        self.usable_handle()?;

        for binding in &self.constant_buffers {
            let value = match package {
                Some(package) => package.get_value(binding.as_ref())?,
                None => binding.current_value()?,
            };
            sink.push_command(RenderCommand::discard_write_shader_constant_buffer(
                binding, &value,
            )?);
        }

        if !self.samplers.is_empty() {
            let values: Vec<(&TextureSamplerBinding, Option<Arc<TextureSampler>>)> = self
                .samplers
                .iter()
                .map(|b| -> Result<_, BindingError> {
                    let value = match package {
                        Some(package) => package.get_value(b.as_ref())?,
                        None => b.bound_resource(),
                    };
                    Ok((b.as_ref(), value))
                })
                .collect::<Result<_, BindingError>>()?;
            sink.push_command(RenderCommand::set_shader_texture_samplers(self, &values)?);
        }

        if !self.resource_views.is_empty() {
            let values: Vec<(&ResourceViewBinding, Option<Arc<ShaderResourceView>>)> = self
                .resource_views
                .iter()
                .map(|b| -> Result<_, BindingError> {
                    let value = match package {
                        Some(package) => package.get_value(b.as_ref())?,
                        None => b.bound_resource(),
                    };
                    Ok((b.as_ref(), value))
                })
                .collect::<Result<_, BindingError>>()?;
            sink.push_command(RenderCommand::set_shader_resource_views(self, &values)?);
        }

        Ok(())
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.is_disposed() {
            log::warn!("{self} was not disposed before being dropped.");
        }
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Shader '{}'", self.stage, self.name)
    }
}
