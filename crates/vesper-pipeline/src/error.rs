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

//! Errors raised by the render pipeline.

use thiserror::Error;
use vesper_core::renderer::{
    BindingError, CommandError, HardwareError, NativeCallError, ResourceError, ShaderError,
};
use vesper_core::sync::BarrierError;

/// Everything that can go wrong while building, mutating or ticking a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A render command could not be built or read back.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A shader resource binding was misused.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// A shader was misused.
    #[error(transparent)]
    Shader(#[from] ShaderError),

    /// A GPU resource was null or disposed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The state mutation barrier refused the operation.
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// A native driver call failed.
    #[error(transparent)]
    Native(#[from] NativeCallError),

    /// No usable adapter or output could be selected.
    #[error("Hardware selection failed: {0}")]
    Hardware(#[from] HardwareError),

    /// The pass is already in the pipeline.
    #[error("{pass} has already been added")]
    PassAlreadyAdded {
        /// The offending pass.
        pass: String,
    },

    /// The pass is not in the pipeline.
    #[error("{pass} has not been added")]
    PassNotAdded {
        /// The offending pass.
        pass: String,
    },

    /// The pass named as an insertion point is not in the pipeline.
    #[error("Can not insert {pass} before {key}, which has not been added")]
    InsertionKeyNotAdded {
        /// The pass being inserted.
        pass: String,
        /// The pass it should precede.
        key: String,
    },

    /// The pass was used after being disposed.
    #[error("{pass} has been disposed")]
    PassDisposed {
        /// The offending pass.
        pass: String,
    },

    /// A render pass reported a failure of its own.
    #[error("{pass} failed: {reason}")]
    PassFailed {
        /// The failing pass.
        pass: String,
        /// What went wrong.
        reason: String,
    },

    /// An operation restricted to the master thread was called elsewhere.
    #[error("{operation} must be called from the thread that created the {owner}")]
    NotOnMasterThread {
        /// The operation attempted.
        operation: &'static str,
        /// The object whose creating thread is required.
        owner: &'static str,
    },

    /// A reserved command slot is out of range.
    #[error("Command slot {slot} is out of range (queue holds {len} commands)")]
    InvalidCommandSlot {
        /// The requested slot.
        slot: usize,
        /// The number of commands queued.
        len: usize,
    },

    /// The driver reported a multisample count with no matching level.
    #[error("Unsupported native MSAA level {samples}")]
    UnknownMsaaLevel {
        /// The native sample count.
        samples: u32,
    },

    /// A worker thread could not be started.
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A worker thread stopped responding.
    #[error("A worker thread disconnected")]
    WorkerDisconnected,

    /// A worker thread panicked while running an action.
    #[error("A worker thread panicked while running an action")]
    WorkerPanicked,

    /// The render device has already been torn down.
    #[error("The render device has been torn down")]
    DeviceTornDown,

    /// The configuration file could not be read.
    #[error("Failed to read pipeline configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("Invalid pipeline configuration: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// The configuration could not be written.
    #[error("Failed to serialize pipeline configuration: {0}")]
    ConfigSerialize(#[from] ron::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_core_errors_convert_transparently() {
        let native = NativeCallError::new("device removed");
        let err: PipelineError = native.clone().into();
        assert_eq!(
            err.to_string(),
            native.to_string(),
            "transparent errors keep the native message"
        );
        assert!(matches!(err, PipelineError::Native(_)));

        let err: PipelineError = BarrierError::PermitHeldByFreezer.into();
        assert!(matches!(err, PipelineError::Barrier(BarrierError::PermitHeldByFreezer)));
    }

    #[test]
    fn test_pass_errors_name_the_pass() {
        let err = PipelineError::InsertionKeyNotAdded {
            pass: "Render Pass 'Sky' (SkyPass)".into(),
            key: "Render Pass 'Hud' (HudPass)".into(),
        };
        assert_eq!(
            err.to_string(),
            "Can not insert Render Pass 'Sky' (SkyPass) before Render Pass 'Hud' (HudPass), which has not been added"
        );
        let err: PipelineError = HardwareError::NoOutputs.into();
        assert!(err.source().is_some());
    }
}
