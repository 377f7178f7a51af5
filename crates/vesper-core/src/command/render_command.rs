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

use super::{CommandArgument, Instruction, PrimitiveTopology};
use crate::memory::with_local_pool;
use crate::renderer::error::CommandError;
use std::fmt;

/// Topology used when none is specified.
pub const DEFAULT_PRIMITIVE_TOPOLOGY: PrimitiveTopology = PrimitiveTopology::TriangleList;

/// Maximum number of simultaneously bound colour render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

/// One GPU instruction and its arguments.
///
/// The instruction alone decides what each argument means. Arguments that
/// point to staged data refer to the scratch pool of the thread that built the
/// command and stay valid until that thread's queue is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderCommand {
    instruction: Instruction,
    arg1: CommandArgument,
    arg2: CommandArgument,
    arg3: CommandArgument,
}

impl RenderCommand {
    /// A command with blank arguments.
    pub const fn new(instruction: Instruction) -> Self {
        Self::with_args(
            instruction,
            CommandArgument::BLANK,
            CommandArgument::BLANK,
            CommandArgument::BLANK,
        )
    }

    /// A command with explicit arguments.
    pub const fn with_args(
        instruction: Instruction,
        arg1: CommandArgument,
        arg2: CommandArgument,
        arg3: CommandArgument,
    ) -> Self {
        Self {
            instruction,
            arg1,
            arg2,
            arg3,
        }
    }

    /// The empty command, also produced when a target window has closed.
    pub const fn no_operation() -> Self {
        Self::new(Instruction::NoOperation)
    }

    /// The instruction.
    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    /// First argument.
    pub fn arg1(&self) -> CommandArgument {
        self.arg1
    }

    /// Second argument.
    pub fn arg2(&self) -> CommandArgument {
        self.arg2
    }

    /// Third argument.
    pub fn arg3(&self) -> CommandArgument {
        self.arg3
    }
}

impl fmt::Display for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}, {})",
            self.instruction, self.arg1, self.arg2, self.arg3
        )
    }
}

/// Stages `count` zeroed handle words in the calling thread's scratch pool and
/// lets `fill` populate them. Returns the staged address as an argument.
pub(super) fn stage_words(
    count: usize,
    fill: impl FnOnce(&mut [u64]),
) -> Result<CommandArgument, CommandError> {
    with_local_pool(|pool| {
        let block = pool.reserve_zeroed(count * std::mem::size_of::<u64>());
        fill(pool.words_mut(&block)?);
        Ok(CommandArgument::from_u64(block.address()))
    })
}

/// Like [`stage_words`] for 32-bit values.
pub(super) fn stage_u32s(
    count: usize,
    fill: impl FnOnce(&mut [u32]),
) -> Result<CommandArgument, CommandError> {
    with_local_pool(|pool| {
        let block = pool.reserve_zeroed(count * std::mem::size_of::<u32>());
        fill(pool.u32s_mut(&block)?);
        Ok(CommandArgument::from_u64(block.address()))
    })
}

/// Copies `bytes` into the calling thread's scratch pool.
pub(super) fn stage_bytes(bytes: &[u8]) -> Result<CommandArgument, CommandError> {
    with_local_pool(|pool| {
        let block = pool.reserve_zeroed(bytes.len());
        pool.bytes_mut(&block)?.copy_from_slice(bytes);
        Ok(CommandArgument::from_u64(block.address()))
    })
}
