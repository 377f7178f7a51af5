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

//! # Vesper Core
//!
//! Foundational crate containing the render-command vocabulary, the per-thread
//! scratch memory used to stage command data, GPU resource and binding types,
//! and the interface contracts through which the pipeline talks to a native
//! graphics driver and its windows.

#![warn(missing_docs)]

pub mod command;
pub mod memory;
pub mod platform;
pub mod renderer;
pub mod sync;

pub use command::{
    CommandArgument, CommandSink, DecodedCommand, Instruction, PrimitiveTopology, RenderCommand,
};
pub use sync::{MutationPermit, StateMutationBarrier};
