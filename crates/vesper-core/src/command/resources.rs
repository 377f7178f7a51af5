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

//! Factories that bind buffers and shader resources.
//!
//! Slot tables are staged zero-filled, so slots without a value reach the
//! driver as null handles.

use super::render_command::{stage_bytes, stage_u32s, stage_words};
use super::{CommandArgument, Instruction, RenderCommand};
use crate::renderer::binding::{
    BindingId, ConstantBufferBinding, ResourceViewBinding, TextureSamplerBinding,
    VertexInputBinding,
};
use crate::renderer::error::{BindingError, CommandError, ShaderError};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::resource::{Buffer, GpuResource, ShaderResourceView, TextureSampler};
use crate::renderer::shader::{Shader, ShaderStage};
use std::sync::Arc;

fn check_owned(
    shader: &Shader,
    owned: impl IntoIterator<Item = BindingId>,
    id: BindingId,
    identifier: &str,
) -> Result<(), CommandError> {
    if owned.into_iter().any(|candidate| candidate == id) {
        Ok(())
    } else {
        Err(ShaderError::UnknownIdentifier {
            shader: shader.name().to_owned(),
            identifier: identifier.to_owned(),
        }
        .into())
    }
}

fn slot_table<T: GpuResource>(
    values: impl Iterator<Item = (u32, Option<Arc<T>>)>,
) -> Result<Vec<(usize, ResourceHandle)>, CommandError> {
    values
        .filter_map(|(slot, value)| value.map(|v| (slot, v)))
        .map(|(slot, value)| -> Result<_, CommandError> {
            Ok((slot as usize, value.usable_handle()?))
        })
        .collect()
}

fn staged_table(
    instruction: Instruction,
    num_slots: u32,
    entries: &[(usize, ResourceHandle)],
) -> Result<RenderCommand, CommandError> {
    let staged = stage_words(num_slots as usize, |words| {
        for (slot, handle) in entries {
            words[*slot] = handle.raw();
        }
    })?;
    Ok(RenderCommand::with_args(
        instruction,
        staged,
        CommandArgument::from_u32(num_slots),
        CommandArgument::from_u32(0),
    ))
}

impl RenderCommand {
    /// Binds a per-instance buffer to an input slot.
    pub fn set_instance_buffer(buffer: &Buffer, input_slot: u32) -> Result<Self, CommandError> {
        let handle = buffer.usable_handle()?;
        Ok(Self::with_args(
            Instruction::SetInstanceBuffer,
            CommandArgument::from_handle(handle),
            CommandArgument::from_u32(input_slot),
            CommandArgument::BLANK,
        ))
    }

    /// Binds an index buffer.
    pub fn set_index_buffer(buffer: &Buffer) -> Result<Self, CommandError> {
        let handle = buffer.usable_handle()?;
        Ok(Self::with_args(
            Instruction::SetIndexBuffer,
            CommandArgument::from_handle(handle),
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        ))
    }

    /// Binds every constant buffer declared by `shader` at its slot.
    ///
    /// Arguments: (staged handles, slot count, 0).
    pub fn set_shader_constant_buffers(shader: &Shader) -> Result<Self, CommandError> {
        shader.usable_handle()?;
        let entries = shader
            .constant_buffer_bindings()
            .iter()
            .map(|b| -> Result<_, CommandError> {
                Ok((b.slot() as usize, b.bound_resource().usable_handle()?))
            })
            .collect::<Result<Vec<_>, CommandError>>()?;
        staged_table(
            shader.stage().set_constant_buffers_instruction(),
            shader.num_constant_buffer_slots(),
            &entries,
        )
    }

    /// Binds samplers to `shader`'s sampler slots. A `None` value leaves its slot null.
    pub fn set_shader_texture_samplers(
        shader: &Shader,
        values: &[(&TextureSamplerBinding, Option<Arc<TextureSampler>>)],
    ) -> Result<Self, CommandError> {
        shader.usable_handle()?;
        for (binding, _) in values {
            check_owned(
                shader,
                shader.texture_sampler_bindings().iter().map(|b| b.id()),
                binding.id(),
                binding.identifier(),
            )?;
        }
        let entries = slot_table(values.iter().map(|(b, v)| (b.slot(), v.clone())))?;
        staged_table(
            shader.stage().set_samplers_instruction(),
            shader.num_texture_sampler_slots(),
            &entries,
        )
    }

    /// Binds resource views to `shader`'s resource slots. A `None` value leaves its slot null.
    pub fn set_shader_resource_views(
        shader: &Shader,
        values: &[(&ResourceViewBinding, Option<Arc<ShaderResourceView>>)],
    ) -> Result<Self, CommandError> {
        shader.usable_handle()?;
        for (binding, _) in values {
            check_owned(
                shader,
                shader.resource_view_bindings().iter().map(|b| b.id()),
                binding.id(),
                binding.identifier(),
            )?;
        }
        let entries = slot_table(values.iter().map(|(b, v)| (b.slot(), v.clone())))?;
        staged_table(
            shader.stage().set_resources_instruction(),
            shader.num_resource_view_slots(),
            &entries,
        )
    }

    /// Binds vertex buffers to a vertex shader's input slots.
    ///
    /// Arguments: (staged handles, staged element strides, input slot count).
    pub fn set_shader_vertex_buffers(
        shader: &Shader,
        values: &[(&VertexInputBinding, Option<Arc<Buffer>>)],
    ) -> Result<Self, CommandError> {
        if shader.stage() != ShaderStage::Vertex {
            return Err(CommandError::WrongShaderStage {
                expected: ShaderStage::Vertex,
                actual: shader.stage(),
            });
        }
        shader.usable_handle()?;
        let mut entries = Vec::with_capacity(values.len());
        for (binding, value) in values {
            check_owned(
                shader,
                shader.vertex_input_bindings().iter().map(|b| b.id()),
                binding.id(),
                binding.identifier(),
            )?;
            if let Some(buffer) = value {
                entries.push((
                    binding.slot() as usize,
                    buffer.usable_handle()?,
                    buffer.element_size(),
                ));
            }
        }

        let num_slots = shader.num_input_slots() as usize;
        let handles = stage_words(num_slots, |words| {
            for (slot, handle, _) in &entries {
                words[*slot] = handle.raw();
            }
        })?;
        let strides = stage_u32s(num_slots, |strides| {
            for (slot, _, stride) in &entries {
                strides[*slot] = *stride;
            }
        })?;
        Ok(Self::with_args(
            Instruction::SetVertexBuffers,
            handles,
            strides,
            CommandArgument::from_u32(shader.num_input_slots()),
        ))
    }

    /// Overwrites a constant buffer's contents.
    ///
    /// `value` is copied into staged memory immediately, so the caller may
    /// reuse it as soon as this returns. Arguments: (buffer handle, staged
    /// copy, byte size).
    pub fn discard_write_shader_constant_buffer(
        binding: &ConstantBufferBinding,
        value: &[u8],
    ) -> Result<Self, CommandError> {
        if binding.is_disposed() {
            return Err(BindingError::Disposed {
                binding: binding.to_string(),
            }
            .into());
        }
        let expected = binding.buffer_size_bytes();
        if value.len() != expected {
            return Err(BindingError::ValueSizeMismatch {
                binding: binding.to_string(),
                expected,
                actual: value.len(),
            }
            .into());
        }
        let handle = binding.bound_resource().usable_handle()?;
        let staged = stage_bytes(value)?;
        Ok(Self::with_args(
            Instruction::CbDiscardWrite,
            CommandArgument::from_handle(handle),
            staged,
            CommandArgument::from_usize(value.len()),
        ))
    }

    /// Uploads `data` into `buffer`. The data is copied into staged memory immediately.
    pub fn buffer_write(buffer: &Buffer, data: &[u8]) -> Result<Self, CommandError> {
        let handle = buffer.usable_handle()?;
        let staged = stage_bytes(data)?;
        Ok(Self::with_args(
            Instruction::BufferWrite,
            CommandArgument::from_handle(handle),
            staged,
            CommandArgument::from_usize(data.len()),
        ))
    }

    /// Uploads a slice of plain-old-data elements into `buffer`.
    pub fn buffer_write_pod<T: bytemuck::Pod>(
        buffer: &Buffer,
        data: &[T],
    ) -> Result<Self, CommandError> {
        Self::buffer_write(buffer, bytemuck::cast_slice(data))
    }
}
