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

//! Defines the hierarchy of contract-violation errors for the rendering core.

use crate::command::Instruction;
use crate::memory::ScratchError;
use crate::renderer::native::NativeCallError;
use crate::renderer::shader::ShaderStage;
use std::fmt;

/// A GPU resource could not be used because it is null or already disposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The resource has a null native handle.
    NullHandle {
        /// A description of the offending resource.
        resource: String,
    },
    /// The resource (or the resource underneath a view) has been disposed.
    Disposed {
        /// A description of the offending resource.
        resource: String,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NullHandle { resource } => write!(f, "{resource} has a null handle"),
            ResourceError::Disposed { resource } => write!(f, "{resource} was disposed"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// An invalid operation on a shader resource binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Binding identifiers must contain at least one non-whitespace character.
    BlankIdentifier,
    /// Constant buffer bindings are fixed at construction; values change via `set_value`.
    ConstantBufferRebind {
        /// The binding that was targeted.
        binding: String,
    },
    /// A constant buffer value did not match the buffer's element size.
    ValueSizeMismatch {
        /// The binding that was targeted.
        binding: String,
        /// The buffer element size in bytes.
        expected: usize,
        /// The supplied value size in bytes.
        actual: usize,
    },
    /// The binding was used after being disposed.
    Disposed {
        /// The binding that was targeted.
        binding: String,
    },
    /// The binding's resource is unusable.
    Resource(ResourceError),
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::BlankIdentifier => write!(f, "Invalid binding identifier"),
            BindingError::ConstantBufferRebind { binding } => write!(
                f,
                "Can not change the bound constant buffer of {binding}; use set_value instead"
            ),
            BindingError::ValueSizeMismatch {
                binding,
                expected,
                actual,
            } => write!(
                f,
                "Value of {actual} bytes does not match the {expected}-byte buffer of {binding}"
            ),
            BindingError::Disposed { binding } => write!(f, "{binding} was disposed"),
            BindingError::Resource(err) => write!(f, "Binding resource error: {err}"),
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindingError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for BindingError {
    fn from(err: ResourceError) -> Self {
        BindingError::Resource(err)
    }
}

/// An invalid shader definition or lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    /// Two bindings of the same kind share a register slot.
    SlotClash {
        /// The first binding.
        first: String,
        /// The second binding.
        second: String,
        /// The shared slot.
        slot: u32,
    },
    /// A binding addresses a register past the limit for its kind.
    SlotOutOfRange {
        /// The offending binding.
        binding: String,
        /// The requested slot.
        slot: u32,
        /// Number of registers of that kind.
        limit: u32,
    },
    /// Two bindings share an identifier (compared ignoring ASCII case).
    IdentifierClash {
        /// The first binding.
        first: String,
        /// The second binding.
        second: String,
        /// The shared identifier.
        identifier: String,
    },
    /// Vertex input bindings are only meaningful on vertex shaders.
    VertexInputOnNonVertexStage {
        /// The shader name.
        shader: String,
        /// The offending binding.
        binding: String,
    },
    /// No binding with this identifier exists on the shader.
    UnknownIdentifier {
        /// The shader name.
        shader: String,
        /// The identifier that was looked up.
        identifier: String,
    },
    /// The shader was used after being disposed.
    Disposed {
        /// The shader name.
        shader: String,
    },
    /// The shader has a null native handle.
    NullHandle {
        /// The shader name.
        shader: String,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::SlotClash {
                first,
                second,
                slot,
            } => write!(
                f,
                "Bindings {first} and {second} must not share the same input slot ({slot})"
            ),
            ShaderError::SlotOutOfRange {
                binding,
                slot,
                limit,
            } => write!(
                f,
                "Binding {binding} uses slot {slot}, only {limit} slots are available"
            ),
            ShaderError::IdentifierClash {
                first,
                second,
                identifier,
            } => write!(
                f,
                "Bindings {first} and {second} must not share the same identifier ({identifier})"
            ),
            ShaderError::VertexInputOnNonVertexStage { shader, binding } => write!(
                f,
                "Shader '{shader}' is not a vertex shader and can not declare {binding}"
            ),
            ShaderError::UnknownIdentifier { shader, identifier } => {
                write!(f, "Shader '{shader}' has no binding named '{identifier}'")
            }
            ShaderError::Disposed { shader } => write!(f, "Shader '{shader}' was disposed"),
            ShaderError::NullHandle { shader } => {
                write!(f, "Shader '{shader}' has a null handle")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// A render command could not be built or decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// A resource argument is null or disposed.
    Resource(ResourceError),
    /// A binding argument is invalid.
    Binding(BindingError),
    /// A shader argument is invalid.
    Shader(ShaderError),
    /// More render targets were supplied than the pipeline supports.
    TooManyRenderTargets {
        /// The number supplied.
        count: usize,
        /// The supported maximum.
        max: usize,
    },
    /// A shader of the wrong stage was supplied.
    WrongShaderStage {
        /// The stage required by the command.
        expected: ShaderStage,
        /// The stage of the supplied shader.
        actual: ShaderStage,
    },
    /// Staged argument memory could not be accessed.
    Scratch(ScratchError),
    /// A native query needed to build the command failed.
    Native(NativeCallError),
    /// A command's arguments do not make sense for its instruction.
    Malformed {
        /// The instruction of the command.
        instruction: Instruction,
        /// What is wrong with it.
        reason: String,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Resource(err) => write!(f, "Invalid command resource: {err}"),
            CommandError::Binding(err) => write!(f, "Invalid command binding: {err}"),
            CommandError::Shader(err) => write!(f, "Invalid command shader: {err}"),
            CommandError::TooManyRenderTargets { count, max } => write!(
                f,
                "Maximum of {max} render targets permitted, {count} supplied"
            ),
            CommandError::WrongShaderStage { expected, actual } => {
                write!(f, "Expected a {expected} shader, got a {actual} shader")
            }
            CommandError::Scratch(err) => write!(f, "Staged command data unavailable: {err}"),
            CommandError::Native(err) => write!(f, "{err}"),
            CommandError::Malformed {
                instruction,
                reason,
            } => write!(f, "Malformed {instruction} command: {reason}"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Resource(err) => Some(err),
            CommandError::Binding(err) => Some(err),
            CommandError::Shader(err) => Some(err),
            CommandError::Scratch(err) => Some(err),
            CommandError::Native(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for CommandError {
    fn from(err: ResourceError) -> Self {
        CommandError::Resource(err)
    }
}

impl From<BindingError> for CommandError {
    fn from(err: BindingError) -> Self {
        CommandError::Binding(err)
    }
}

impl From<ShaderError> for CommandError {
    fn from(err: ShaderError) -> Self {
        CommandError::Shader(err)
    }
}

impl From<ScratchError> for CommandError {
    fn from(err: ScratchError) -> Self {
        CommandError::Scratch(err)
    }
}

impl From<NativeCallError> for CommandError {
    fn from(err: NativeCallError) -> Self {
        CommandError::Native(err)
    }
}
