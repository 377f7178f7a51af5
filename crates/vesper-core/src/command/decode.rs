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

//! Resolves commands back into typed values, including their staged data.

use super::{Instruction, PrimitiveTopology, RenderCommand};
use crate::memory::{with_local_pool, ScratchPool};
use crate::renderer::error::CommandError;
use crate::renderer::handle::{ResourceHandle, SwapChainHandle};
use crate::renderer::shader::ShaderStage;

/// A [`RenderCommand`] with its arguments interpreted for its instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DecodedCommand {
    NoOperation,
    SetPrimitiveTopology(PrimitiveTopology),
    SetInputLayout(ResourceHandle),
    SetVertexBuffers {
        buffers: Vec<ResourceHandle>,
        strides: Vec<u32>,
    },
    SetInstanceBuffer {
        buffer: ResourceHandle,
        slot: u32,
    },
    SetIndexBuffer(ResourceHandle),
    SetRenderTargets {
        render_targets: Vec<ResourceHandle>,
        depth_stencil: ResourceHandle,
    },
    CbDiscardWrite {
        buffer: ResourceHandle,
        data: Vec<u8>,
    },
    SetConstantBuffers {
        stage: ShaderStage,
        buffers: Vec<ResourceHandle>,
    },
    SetSamplers {
        stage: ShaderStage,
        samplers: Vec<ResourceHandle>,
    },
    SetResources {
        stage: ShaderStage,
        views: Vec<ResourceHandle>,
    },
    SetShader {
        stage: ShaderStage,
        shader: ResourceHandle,
    },
    SetRasterizerState(ResourceHandle),
    SetDepthStencilState(ResourceHandle),
    SetBlendState(ResourceHandle),
    SetViewport(ResourceHandle),
    DrawIndexedInstanced {
        first_vertex: i32,
        first_index: u32,
        num_indices: u32,
        first_instance: u32,
        num_instances: u32,
    },
    Draw {
        first_vertex: i32,
        num_vertices: u32,
    },
    ClearRenderTarget(ResourceHandle),
    ClearDepthStencil(ResourceHandle),
    Present(SwapChainHandle),
    FinishCommandList {
        out_slot: u64,
    },
    BufferWrite {
        buffer: ResourceHandle,
        data: Vec<u8>,
    },
}

fn handles(
    pool: &ScratchPool,
    address: u64,
    count: usize,
) -> Result<Vec<ResourceHandle>, CommandError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    Ok(pool
        .read_words(address, count)?
        .iter()
        .map(|raw| ResourceHandle::from_raw(*raw))
        .collect())
}

impl RenderCommand {
    /// Interprets the command's arguments, reading staged data from the
    /// calling thread's scratch pool.
    ///
    /// Only meaningful on the thread that built the command and before that
    /// thread's queue has been flushed.
    pub fn decode(&self) -> Result<DecodedCommand, CommandError> {
        with_local_pool(|pool| self.decode_with(pool))
    }

    /// Like [`decode`](Self::decode) with an explicit pool.
    pub fn decode_with(&self, pool: &ScratchPool) -> Result<DecodedCommand, CommandError> {
        let (a1, a2, a3) = (self.arg1(), self.arg2(), self.arg3());
        let handle = a1.as_handle();
        let staged_table = |pool: &ScratchPool| handles(pool, a1.as_u64(), a2.as_usize());

        Ok(match self.instruction() {
            Instruction::NoOperation => DecodedCommand::NoOperation,
            Instruction::SetPrimitiveTopology => DecodedCommand::SetPrimitiveTopology(
                PrimitiveTopology::from_native(a1.as_i32()).ok_or_else(|| CommandError::Malformed {
                    instruction: self.instruction(),
                    reason: format!("unknown topology {}", a1.as_i32()),
                })?,
            ),
            Instruction::SetInputLayout => DecodedCommand::SetInputLayout(handle),
            Instruction::SetVertexBuffers => {
                let count = a3.as_usize();
                let strides = if count == 0 {
                    Vec::new()
                } else {
                    pool.read_u32s(a2.as_u64(), count)?.to_vec()
                };
                DecodedCommand::SetVertexBuffers {
                    buffers: handles(pool, a1.as_u64(), count)?,
                    strides,
                }
            }
            Instruction::SetInstanceBuffer => DecodedCommand::SetInstanceBuffer {
                buffer: handle,
                slot: a2.as_u32(),
            },
            Instruction::SetIndexBuffer => DecodedCommand::SetIndexBuffer(handle),
            Instruction::SetRenderTargets => DecodedCommand::SetRenderTargets {
                render_targets: handles(pool, a1.as_u64(), a3.as_usize())?,
                depth_stencil: a2.as_handle(),
            },
            Instruction::CbDiscardWrite => DecodedCommand::CbDiscardWrite {
                buffer: handle,
                data: pool.read(a2.as_u64(), a3.as_usize())?.to_vec(),
            },
            Instruction::VsSetCBuffers | Instruction::FsSetCBuffers => {
                DecodedCommand::SetConstantBuffers {
                    stage: stage_of(self.instruction()),
                    buffers: staged_table(pool)?,
                }
            }
            Instruction::VsSetSamplers | Instruction::FsSetSamplers => DecodedCommand::SetSamplers {
                stage: stage_of(self.instruction()),
                samplers: staged_table(pool)?,
            },
            Instruction::VsSetResources | Instruction::FsSetResources => {
                DecodedCommand::SetResources {
                    stage: stage_of(self.instruction()),
                    views: staged_table(pool)?,
                }
            }
            Instruction::VsSetShader | Instruction::FsSetShader => DecodedCommand::SetShader {
                stage: stage_of(self.instruction()),
                shader: handle,
            },
            Instruction::SetRsState => DecodedCommand::SetRasterizerState(handle),
            Instruction::SetDsState => DecodedCommand::SetDepthStencilState(handle),
            Instruction::SetBlendState => DecodedCommand::SetBlendState(handle),
            Instruction::SetViewport => DecodedCommand::SetViewport(handle),
            Instruction::DrawIndexedInstanced => {
                let (first_index, num_indices) = a2.split_u32();
                let (first_instance, num_instances) = a3.split_u32();
                DecodedCommand::DrawIndexedInstanced {
                    first_vertex: a1.as_i32(),
                    first_index,
                    num_indices,
                    first_instance,
                    num_instances,
                }
            }
            Instruction::Draw => DecodedCommand::Draw {
                first_vertex: a1.as_i32(),
                num_vertices: a2.as_u32(),
            },
            Instruction::ClearRenderTarget => DecodedCommand::ClearRenderTarget(handle),
            Instruction::ClearDepthStencil => DecodedCommand::ClearDepthStencil(handle),
            Instruction::SwapChainPresent => {
                DecodedCommand::Present(SwapChainHandle::from_raw(a1.as_u64()))
            }
            Instruction::FinishCommandList => DecodedCommand::FinishCommandList {
                out_slot: a1.as_u64(),
            },
            Instruction::BufferWrite => DecodedCommand::BufferWrite {
                buffer: handle,
                data: pool.read(a2.as_u64(), a3.as_usize())?.to_vec(),
            },
        })
    }
}

fn stage_of(instruction: Instruction) -> ShaderStage {
    match instruction {
        Instruction::VsSetCBuffers
        | Instruction::VsSetSamplers
        | Instruction::VsSetResources
        | Instruction::VsSetShader => ShaderStage::Vertex,
        _ => ShaderStage::Fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::binding::{
        ConstantBufferBinding, ResourceViewBinding, TextureSamplerBinding, VertexInputBinding,
    };
    use crate::renderer::error::{BindingError, ResourceError};
    use crate::renderer::resource::{
        Buffer, BufferKind, DepthStencilView, GpuResource, RasterizerState, RenderTargetView,
        ShaderResourceView, Texture, TextureSampler, Viewport,
    };
    use crate::renderer::shader::{Shader, ShaderBinding};
    use crate::command::MAX_RENDER_TARGETS;
    use std::sync::Arc;

    fn handle(raw: u64) -> ResourceHandle {
        ResourceHandle::from_raw(raw)
    }

    fn texture(raw: u64) -> Arc<dyn GpuResource> {
        Arc::new(Texture::new(handle(raw), 16, 16, "target"))
    }

    #[test]
    fn test_draw_arguments_round_trip() {
        let command = RenderCommand::draw_indexed_instanced(-4, 10, 36, 2, 128);
        assert_eq!(
            command.decode().unwrap(),
            DecodedCommand::DrawIndexedInstanced {
                first_vertex: -4,
                first_index: 10,
                num_indices: 36,
                first_instance: 2,
                num_instances: 128,
            }
        );
        assert_eq!(
            RenderCommand::draw(3, 6).decode().unwrap(),
            DecodedCommand::Draw {
                first_vertex: 3,
                num_vertices: 6
            }
        );
        assert_eq!(
            RenderCommand::set_primitive_topology(PrimitiveTopology::LineStrip)
                .decode()
                .unwrap(),
            DecodedCommand::SetPrimitiveTopology(PrimitiveTopology::LineStrip)
        );
    }

    #[test]
    fn test_state_factories_reject_disposed() {
        let rs = RasterizerState::new(handle(40), "cull back");
        assert_eq!(
            RenderCommand::set_rasterizer_state(&rs).unwrap().decode().unwrap(),
            DecodedCommand::SetRasterizerState(handle(40))
        );
        rs.dispose();
        assert!(matches!(
            RenderCommand::set_rasterizer_state(&rs),
            Err(CommandError::Resource(ResourceError::Disposed { .. }))
        ));

        let viewport = Viewport::new(ResourceHandle::NULL, "null");
        assert!(matches!(
            RenderCommand::set_viewport(&viewport),
            Err(CommandError::Resource(ResourceError::NullHandle { .. }))
        ));
    }

    #[test]
    fn test_render_targets_are_staged() {
        let tex = texture(1);
        let dsv = DepthStencilView::new(handle(2), tex.clone(), "depth");
        let rtv_a = RenderTargetView::new(handle(3), tex.clone(), "a");
        let rtv_b = RenderTargetView::new(handle(4), tex.clone(), "b");

        let command = RenderCommand::set_render_targets(&dsv, &[&rtv_a, &rtv_b]).unwrap();
        assert_eq!(command.instruction(), Instruction::SetRenderTargets);
        assert_eq!(command.arg3().as_u32(), 2);
        assert_eq!(
            command.decode().unwrap(),
            DecodedCommand::SetRenderTargets {
                render_targets: vec![handle(3), handle(4)],
                depth_stencil: handle(2),
            }
        );

        let too_many = vec![&rtv_a; MAX_RENDER_TARGETS + 1];
        assert_eq!(
            RenderCommand::set_render_targets(&dsv, &too_many),
            Err(CommandError::TooManyRenderTargets { count: 9, max: 8 })
        );

        assert_eq!(
            RenderCommand::set_depth_stencil_target(&dsv).unwrap().decode().unwrap(),
            DecodedCommand::SetRenderTargets {
                render_targets: vec![],
                depth_stencil: handle(2),
            }
        );
        for view in [&rtv_a, &rtv_b] {
            view.dispose();
        }
        dsv.dispose();
        tex.dispose();
    }

    #[test]
    fn test_shader_tables_leave_unset_slots_null() {
        let views = Arc::new(ResourceViewBinding::new(2, "Albedo").unwrap());
        let samplers = Arc::new(TextureSamplerBinding::new(1, "Linear").unwrap());
        let shader = Shader::new(
            "Lit",
            ShaderStage::Fragment,
            handle(50),
            vec![
                ShaderBinding::from(views.clone()),
                ShaderBinding::from(samplers.clone()),
            ],
        )
        .unwrap();

        let tex = texture(60);
        let srv = Arc::new(ShaderResourceView::new(handle(61), tex.clone(), "albedo"));
        let command = RenderCommand::set_shader_resource_views(
            &shader,
            &[(views.as_ref(), Some(srv.clone()))],
        )
        .unwrap();
        assert_eq!(command.instruction(), Instruction::FsSetResources);
        assert_eq!(
            command.decode().unwrap(),
            DecodedCommand::SetResources {
                stage: ShaderStage::Fragment,
                views: vec![ResourceHandle::NULL, ResourceHandle::NULL, handle(61)],
            }
        );

        let command =
            RenderCommand::set_shader_texture_samplers(&shader, &[(samplers.as_ref(), None)])
                .unwrap();
        assert_eq!(
            command.decode().unwrap(),
            DecodedCommand::SetSamplers {
                stage: ShaderStage::Fragment,
                samplers: vec![ResourceHandle::NULL, ResourceHandle::NULL],
            }
        );

        let foreign = TextureSamplerBinding::new(0, "Other").unwrap();
        let sampler = Arc::new(TextureSampler::new(handle(70), "point"));
        assert!(matches!(
            RenderCommand::set_shader_texture_samplers(
                &shader,
                &[(&foreign, Some(sampler.clone()))],
            ),
            Err(CommandError::Shader(_))
        ));

        let set = RenderCommand::set_shader(&shader).unwrap();
        assert_eq!(
            set.decode().unwrap(),
            DecodedCommand::SetShader {
                stage: ShaderStage::Fragment,
                shader: handle(50)
            }
        );
        shader.dispose();
        assert!(RenderCommand::set_shader(&shader).is_err(), "disposed shaders are rejected");
        srv.dispose();
        tex.dispose();
        sampler.dispose();
    }

    #[test]
    fn test_vertex_buffers_stage_handles_and_strides() {
        let position = Arc::new(VertexInputBinding::new(0, "Position").unwrap());
        let normal = Arc::new(VertexInputBinding::new(2, "Normal").unwrap());
        let shader = Shader::new(
            "Lit",
            ShaderStage::Vertex,
            handle(80),
            vec![position.clone().into(), normal.clone().into()],
        )
        .unwrap();
        let positions = Arc::new(Buffer::new(handle(81), BufferKind::Vertex, 12, 3, "positions"));
        let normals = Arc::new(Buffer::new(handle(82), BufferKind::Vertex, 16, 3, "normals"));

        let command = RenderCommand::set_shader_vertex_buffers(
            &shader,
            &[
                (position.as_ref(), Some(positions.clone())),
                (normal.as_ref(), Some(normals.clone())),
            ],
        )
        .unwrap();
        assert_eq!(
            command.decode().unwrap(),
            DecodedCommand::SetVertexBuffers {
                buffers: vec![handle(81), ResourceHandle::NULL, handle(82)],
                strides: vec![12, 0, 16],
            }
        );

        let fragment = Shader::new("Flat", ShaderStage::Fragment, handle(83), vec![]).unwrap();
        assert_eq!(
            RenderCommand::set_shader_vertex_buffers(&fragment, &[]),
            Err(CommandError::WrongShaderStage {
                expected: ShaderStage::Vertex,
                actual: ShaderStage::Fragment
            })
        );
        for s in [&shader, &fragment] {
            s.dispose();
        }
        positions.dispose();
        normals.dispose();
    }

    #[test]
    fn test_constant_buffer_write_copies_value() {
        let buffer = Arc::new(Buffer::new(handle(90), BufferKind::Constant, 4, 1, "tint"));
        let binding = Arc::new(ConstantBufferBinding::new(0, "Tint", buffer.clone()).unwrap());
        let mut value = [1u8, 2, 3, 4];
        let command =
            RenderCommand::discard_write_shader_constant_buffer(&binding, &value).unwrap();
        value[0] = 99;
        assert_eq!(
            command.decode().unwrap(),
            DecodedCommand::CbDiscardWrite {
                buffer: handle(90),
                data: vec![1, 2, 3, 4],
            },
            "the staged copy must not observe later writes"
        );

        assert!(matches!(
            RenderCommand::discard_write_shader_constant_buffer(&binding, &[0; 3]),
            Err(CommandError::Binding(BindingError::ValueSizeMismatch { .. }))
        ));

        let shader = Shader::new(
            "Tinted",
            ShaderStage::Vertex,
            handle(91),
            vec![ShaderBinding::from(binding.clone())],
        )
        .unwrap();
        assert_eq!(
            RenderCommand::set_shader_constant_buffers(&shader).unwrap().decode().unwrap(),
            DecodedCommand::SetConstantBuffers {
                stage: ShaderStage::Vertex,
                buffers: vec![handle(90)],
            }
        );

        shader.dispose();
        assert!(matches!(
            RenderCommand::discard_write_shader_constant_buffer(&binding, &[0; 4]),
            Err(CommandError::Binding(BindingError::Disposed { .. }))
        ));
        buffer.dispose();
    }

    #[test]
    fn test_buffer_write_and_finish_command_list() {
        let buffer = Buffer::new(handle(100), BufferKind::Vertex, 4, 2, "data");
        let command = RenderCommand::buffer_write_pod(&buffer, &[1.0f32, 2.0]).unwrap();
        let DecodedCommand::BufferWrite { buffer: target, data } = command.decode().unwrap() else {
            panic!("expected a buffer write");
        };
        assert_eq!(target, handle(100));
        assert_eq!(bytemuck::cast_slice::<u8, f32>(&data), &[1.0, 2.0]);
        buffer.dispose();

        let finish = RenderCommand::finish_command_list().unwrap();
        let DecodedCommand::FinishCommandList { out_slot } = finish.decode().unwrap() else {
            panic!("expected a finish command");
        };
        with_local_pool(|pool| pool.write_words(out_slot, &[0xC0FFEE]).unwrap());
        assert_eq!(finish.finished_command_list().unwrap().raw(), 0xC0FFEE);
        assert!(RenderCommand::draw(0, 3).finished_command_list().is_err());
    }
}
