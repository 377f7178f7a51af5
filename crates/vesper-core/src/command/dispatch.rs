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

//! Draw, clear, present and command-list factories.

use super::render_command::stage_words;
use super::{CommandArgument, Instruction, RenderCommand};
use crate::memory::with_local_pool;
use crate::platform::RenderWindow;
use crate::renderer::error::CommandError;
use crate::renderer::handle::CommandListHandle;
use crate::renderer::resource::{DepthStencilView, GpuResource, RenderTargetView};

impl RenderCommand {
    /// Draws indexed, instanced geometry.
    ///
    /// Arguments: (first vertex, first index | index count << 32,
    /// first instance | instance count << 32).
    pub fn draw_indexed_instanced(
        first_vertex: i32,
        first_index: u32,
        num_indices: u32,
        first_instance: u32,
        num_instances: u32,
    ) -> Self {
        Self::with_args(
            Instruction::DrawIndexedInstanced,
            CommandArgument::from_i32(first_vertex),
            CommandArgument::pack_u32(first_index, num_indices),
            CommandArgument::pack_u32(first_instance, num_instances),
        )
    }

    /// Draws non-indexed geometry.
    pub fn draw(first_vertex: i32, num_vertices: u32) -> Self {
        Self::with_args(
            Instruction::Draw,
            CommandArgument::from_i32(first_vertex),
            CommandArgument::from_u32(num_vertices),
            CommandArgument::BLANK,
        )
    }

    /// Clears a render target view.
    pub fn clear_render_target(target: &RenderTargetView) -> Result<Self, CommandError> {
        let handle = target.usable_handle()?;
        Ok(Self::with_args(
            Instruction::ClearRenderTarget,
            CommandArgument::from_handle(handle),
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        ))
    }

    /// Clears a window's back buffer, or does nothing if the window has closed.
    pub fn clear_window_render_target(window: &dyn RenderWindow) -> Result<Self, CommandError> {
        Ok(match window.back_buffer_views()? {
            Some((rtv, _)) => Self::with_args(
                Instruction::ClearRenderTarget,
                CommandArgument::from_handle(rtv),
                CommandArgument::BLANK,
                CommandArgument::BLANK,
            ),
            None => Self::no_operation(),
        })
    }

    /// Clears a depth stencil view.
    pub fn clear_depth_stencil(target: &DepthStencilView) -> Result<Self, CommandError> {
        let handle = target.usable_handle()?;
        Ok(Self::with_args(
            Instruction::ClearDepthStencil,
            CommandArgument::from_handle(handle),
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        ))
    }

    /// Clears a window's depth stencil buffer, or does nothing if the window has closed.
    pub fn clear_window_depth_stencil(window: &dyn RenderWindow) -> Result<Self, CommandError> {
        Ok(match window.back_buffer_views()? {
            Some((_, dsv)) => Self::with_args(
                Instruction::ClearDepthStencil,
                CommandArgument::from_handle(dsv),
                CommandArgument::BLANK,
                CommandArgument::BLANK,
            ),
            None => Self::no_operation(),
        })
    }

    /// Presents a window's back buffer, or does nothing if the window has closed.
    pub fn present_back_buffer(window: &dyn RenderWindow) -> Result<Self, CommandError> {
        Ok(match window.swap_chain()? {
            Some(swap_chain) => Self::with_args(
                Instruction::SwapChainPresent,
                CommandArgument::from_u64(swap_chain.raw()),
                CommandArgument::BLANK,
                CommandArgument::BLANK,
            ),
            None => Self::no_operation(),
        })
    }

    /// Ends recording on a deferred context.
    ///
    /// The first argument addresses a staged slot that the driver fills with
    /// the resulting command list; read it back with
    /// [`finished_command_list`](Self::finished_command_list) after flushing.
    pub fn finish_command_list() -> Result<Self, CommandError> {
        let out_slot = stage_words(1, |_| {})?;
        Ok(Self::with_args(
            Instruction::FinishCommandList,
            out_slot,
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        ))
    }

    /// Reads the command list written by the driver for a `FinishCommandList` command.
    ///
    /// Must be called on the thread that built the command.
    pub fn finished_command_list(&self) -> Result<CommandListHandle, CommandError> {
        if self.instruction() != Instruction::FinishCommandList {
            return Err(CommandError::Malformed {
                instruction: self.instruction(),
                reason: "not a FinishCommandList command".to_owned(),
            });
        }
        let raw = with_local_pool(|pool| pool.read_words(self.arg1().as_u64(), 1).map(|w| w[0]))?;
        Ok(CommandListHandle::from_raw(raw))
    }
}
