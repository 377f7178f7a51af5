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

//! The render-command vocabulary.
//!
//! A [`RenderCommand`] is one GPU instruction plus up to three
//! [`CommandArgument`]s. Commands are built through validating factory
//! functions, queued by render passes, and later flushed to the native driver
//! in the order they were generated.

mod argument;
mod decode;
mod dispatch;
mod instruction;
mod render_command;
mod resources;
mod state;

pub use self::argument::CommandArgument;
pub use self::decode::DecodedCommand;
pub use self::instruction::{Instruction, PrimitiveTopology};
pub use self::render_command::{RenderCommand, DEFAULT_PRIMITIVE_TOPOLOGY, MAX_RENDER_TARGETS};

/// Anything render commands can be appended to.
pub trait CommandSink {
    /// Appends `command` after every command pushed so far.
    fn push_command(&mut self, command: RenderCommand);
}

impl CommandSink for Vec<RenderCommand> {
    fn push_command(&mut self, command: RenderCommand) {
        self.push(command);
    }
}
