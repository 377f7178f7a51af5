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

//! Success/failure reporting for calls into the native graphics collaborator.

use std::fmt;

/// Reason reported when a native call fails without saying why.
pub const UNKNOWN_FAILURE_REASON: &str = "Unknown internal error.";

/// The raw outcome of a native entry point: a success flag plus the contents
/// of its failure-reason buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCallResult {
    success: bool,
    reason: String,
}

impl NativeCallResult {
    /// A successful call.
    pub fn success() -> Self {
        Self {
            success: true,
            reason: String::new(),
        }
    }

    /// A failed call. An empty reason is reported as [`UNKNOWN_FAILURE_REASON`].
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Turns a failure into a [`NativeCallError`] carrying its reason.
    pub fn into_result(self) -> NativeResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(NativeCallError::new(self.reason))
        }
    }
}

/// A native call reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCallError {
    reason: String,
}

impl NativeCallError {
    /// Creates an error from the native failure reason.
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            UNKNOWN_FAILURE_REASON.to_owned()
        } else {
            reason
        };
        Self { reason }
    }

    /// The reason reported by the native side.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for NativeCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native call failed: {}", self.reason)
    }
}

impl std::error::Error for NativeCallError {}

/// Result of a native call that produces a value.
pub type NativeResult<T> = Result<T, NativeCallError>;
