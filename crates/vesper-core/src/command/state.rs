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

//! Factories for pipeline state and output-merger commands.

use super::render_command::{stage_words, MAX_RENDER_TARGETS};
use super::{CommandArgument, Instruction, PrimitiveTopology, RenderCommand};
use crate::platform::RenderWindow;
use crate::renderer::error::CommandError;
use crate::renderer::resource::{
    BlendState, DepthStencilState, DepthStencilView, GpuResource, InputLayout, RasterizerState,
    RenderTargetView, Viewport,
};
use crate::renderer::shader::Shader;

fn handle_command(
    instruction: Instruction,
    resource: &dyn GpuResource,
) -> Result<RenderCommand, CommandError> {
    let handle = resource.usable_handle()?;
    Ok(RenderCommand::with_args(
        instruction,
        CommandArgument::from_handle(handle),
        CommandArgument::BLANK,
        CommandArgument::BLANK,
    ))
}

impl RenderCommand {
    /// Sets how vertices are assembled into primitives.
    pub fn set_primitive_topology(topology: PrimitiveTopology) -> Self {
        Self::with_args(
            Instruction::SetPrimitiveTopology,
            CommandArgument::from_i32(topology as i32),
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        )
    }

    /// Binds an input layout.
    pub fn set_input_layout(layout: &InputLayout) -> Result<Self, CommandError> {
        handle_command(Instruction::SetInputLayout, layout)
    }

    /// Binds rasterizer state.
    pub fn set_rasterizer_state(state: &RasterizerState) -> Result<Self, CommandError> {
        handle_command(Instruction::SetRsState, state)
    }

    /// Binds depth stencil state.
    pub fn set_depth_stencil_state(state: &DepthStencilState) -> Result<Self, CommandError> {
        handle_command(Instruction::SetDsState, state)
    }

    /// Binds blend state.
    pub fn set_blend_state(state: &BlendState) -> Result<Self, CommandError> {
        handle_command(Instruction::SetBlendState, state)
    }

    /// Sets the viewport.
    pub fn set_viewport(viewport: &Viewport) -> Result<Self, CommandError> {
        handle_command(Instruction::SetViewport, viewport)
    }

    /// Makes `shader` current at its stage.
    pub fn set_shader(shader: &Shader) -> Result<Self, CommandError> {
        let handle = shader.usable_handle()?;
        Ok(Self::with_args(
            shader.stage().set_shader_instruction(),
            CommandArgument::from_handle(handle),
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        ))
    }

    /// Binds up to [`MAX_RENDER_TARGETS`] colour targets and a depth stencil target.
    ///
    /// Arguments: (staged render target handles, depth stencil handle, count).
    pub fn set_render_targets(
        depth_stencil: &DepthStencilView,
        render_targets: &[&RenderTargetView],
    ) -> Result<Self, CommandError> {
        let dsv = depth_stencil.usable_handle()?;
        if render_targets.len() > MAX_RENDER_TARGETS {
            return Err(CommandError::TooManyRenderTargets {
                count: render_targets.len(),
                max: MAX_RENDER_TARGETS,
            });
        }
        let handles = render_targets
            .iter()
            .map(|rtv| rtv.usable_handle())
            .collect::<Result<Vec<_>, _>>()?;
        let staged = stage_words(handles.len(), |words| {
            for (word, handle) in words.iter_mut().zip(&handles) {
                *word = handle.raw();
            }
        })?;
        Ok(Self::with_args(
            Instruction::SetRenderTargets,
            staged,
            CommandArgument::from_handle(dsv),
            CommandArgument::from_usize(handles.len()),
        ))
    }

    /// Binds only a depth stencil target (for depth-only passes).
    pub fn set_depth_stencil_target(
        depth_stencil: &DepthStencilView,
    ) -> Result<Self, CommandError> {
        let dsv = depth_stencil.usable_handle()?;
        Ok(Self::with_args(
            Instruction::SetRenderTargets,
            CommandArgument::BLANK,
            CommandArgument::from_handle(dsv),
            CommandArgument::from_u32(0),
        ))
    }

    /// Targets a window's back buffer and depth stencil.
    ///
    /// Returns a no-op if the window has closed.
    pub fn set_window_render_target(window: &dyn RenderWindow) -> Result<Self, CommandError> {
        let Some((rtv, dsv)) = window.back_buffer_views()? else {
            return Ok(Self::no_operation());
        };
        let staged = stage_words(1, |words| words[0] = rtv.raw())?;
        Ok(Self::with_args(
            Instruction::SetRenderTargets,
            staged,
            CommandArgument::from_handle(dsv),
            CommandArgument::from_u32(1),
        ))
    }

    /// Targets a window's back buffer first, followed by `extra` colour
    /// targets, with a separate depth stencil view.
    ///
    /// Returns a no-op if the window has closed.
    pub fn set_window_render_targets(
        window: &dyn RenderWindow,
        depth_stencil: &DepthStencilView,
        extra: &[&RenderTargetView],
    ) -> Result<Self, CommandError> {
        if extra.len() + 1 > MAX_RENDER_TARGETS {
            return Err(CommandError::TooManyRenderTargets {
                count: extra.len() + 1,
                max: MAX_RENDER_TARGETS,
            });
        }
        let dsv = depth_stencil.usable_handle()?;
        let handles = extra
            .iter()
            .map(|rtv| rtv.usable_handle())
            .collect::<Result<Vec<_>, _>>()?;
        let Some((back_buffer, _)) = window.back_buffer_views()? else {
            return Ok(Self::no_operation());
        };
        let staged = stage_words(handles.len() + 1, |words| {
            words[0] = back_buffer.raw();
            for (word, handle) in words[1..].iter_mut().zip(&handles) {
                *word = handle.raw();
            }
        })?;
        Ok(Self::with_args(
            Instruction::SetRenderTargets,
            staged,
            CommandArgument::from_handle(dsv),
            CommandArgument::from_usize(handles.len() + 1),
        ))
    }
}
