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

//! The instruction set understood by the native command executor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A low-level GPU instruction.
///
/// Discriminants match the native executor's opcode table and must not be
/// reordered. The instruction alone determines how the three arguments of a
/// [`RenderCommand`](super::RenderCommand) are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Instruction {
    /// Does nothing. Also produced when a command targets a closed window.
    NoOperation = 0,
    /// `(topology as i32)`
    SetPrimitiveTopology = 1,
    /// `(input layout handle)`
    SetInputLayout = 2,
    /// `(handles ptr, strides ptr, input slot count)`
    SetVertexBuffers = 3,
    /// `(buffer handle, input slot)`
    SetInstanceBuffer = 4,
    /// `(buffer handle)`
    SetIndexBuffer = 5,
    /// `(render target handles ptr, depth stencil handle, render target count)`
    SetRenderTargets = 6,
    /// `(buffer handle, value ptr, value size)`
    CbDiscardWrite = 7,
    /// `(handles ptr, slot count, 0)`
    VsSetCBuffers = 8,
    /// `(handles ptr, slot count, 0)`
    VsSetSamplers = 9,
    /// `(handles ptr, slot count, 0)`
    VsSetResources = 10,
    /// `(shader handle)`
    VsSetShader = 11,
    /// `(rasterizer state handle)`
    SetRsState = 12,
    /// `(depth stencil state handle)`
    SetDsState = 13,
    /// `(blend state handle)`
    SetBlendState = 14,
    /// `(viewport handle)`
    SetViewport = 15,
    /// `(handles ptr, slot count, 0)`
    FsSetCBuffers = 16,
    /// `(handles ptr, slot count, 0)`
    FsSetSamplers = 17,
    /// `(handles ptr, slot count, 0)`
    FsSetResources = 18,
    /// `(shader handle)`
    FsSetShader = 19,
    /// `(first vertex, first index | index count << 32, first instance | instance count << 32)`
    DrawIndexedInstanced = 20,
    /// `(first vertex, vertex count)`
    Draw = 21,
    /// `(render target view handle)`
    ClearRenderTarget = 22,
    /// `(depth stencil view handle)`
    ClearDepthStencil = 23,
    /// `(swap chain handle)`
    SwapChainPresent = 24,
    /// `(ptr receiving the command list handle)`
    FinishCommandList = 25,
    /// `(buffer handle, data ptr, data size)`
    BufferWrite = 26,
}

impl Instruction {
    /// Every instruction, in opcode order.
    pub const ALL: [Instruction; 27] = [
        Instruction::NoOperation,
        Instruction::SetPrimitiveTopology,
        Instruction::SetInputLayout,
        Instruction::SetVertexBuffers,
        Instruction::SetInstanceBuffer,
        Instruction::SetIndexBuffer,
        Instruction::SetRenderTargets,
        Instruction::CbDiscardWrite,
        Instruction::VsSetCBuffers,
        Instruction::VsSetSamplers,
        Instruction::VsSetResources,
        Instruction::VsSetShader,
        Instruction::SetRsState,
        Instruction::SetDsState,
        Instruction::SetBlendState,
        Instruction::SetViewport,
        Instruction::FsSetCBuffers,
        Instruction::FsSetSamplers,
        Instruction::FsSetResources,
        Instruction::FsSetShader,
        Instruction::DrawIndexedInstanced,
        Instruction::Draw,
        Instruction::ClearRenderTarget,
        Instruction::ClearDepthStencil,
        Instruction::SwapChainPresent,
        Instruction::FinishCommandList,
        Instruction::BufferWrite,
    ];

    /// Returns the native opcode.
    pub const fn opcode(self) -> u32 {
        self as u32
    }

    /// Looks up an instruction by its native opcode.
    pub fn from_opcode(opcode: u32) -> Option<Self> {
        Self::ALL.get(opcode as usize).copied()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the input assembler interprets vertex data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum PrimitiveTopology {
    /// No topology bound.
    Undefined = 0,
    /// Isolated points.
    PointList = 1,
    /// Isolated line segments.
    LineList = 2,
    /// A connected strip of line segments.
    LineStrip = 3,
    /// Isolated triangles.
    #[default]
    TriangleList = 4,
    /// A connected strip of triangles.
    TriangleStrip = 5,
}

impl PrimitiveTopology {
    /// Converts a native topology value back into the enum.
    pub fn from_native(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::PointList),
            2 => Some(Self::LineList),
            3 => Some(Self::LineStrip),
            4 => Some(Self::TriangleList),
            5 => Some(Self::TriangleStrip),
            _ => None,
        }
    }
}
