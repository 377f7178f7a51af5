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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multisample anti-aliasing level applied to window back buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum MsaaLevel {
    /// No multisampling.
    #[default]
    None = 0,
    /// Two samples per pixel.
    TwoTimes = 2,
    /// Four samples per pixel.
    FourTimes = 4,
    /// Eight samples per pixel.
    EightTimes = 8,
    /// Sixteen samples per pixel.
    SixteenTimes = 16,
}

impl MsaaLevel {
    /// The sample count passed to the driver.
    pub fn native_value(self) -> u32 {
        self as u32
    }

    /// Maps a sample count reported by the driver. A count of 1 means `None`.
    pub fn from_native(value: u32) -> Option<Self> {
        match value {
            0 | 1 => Some(MsaaLevel::None),
            2 => Some(MsaaLevel::TwoTimes),
            4 => Some(MsaaLevel::FourTimes),
            8 => Some(MsaaLevel::EightTimes),
            16 => Some(MsaaLevel::SixteenTimes),
            _ => None,
        }
    }
}

impl fmt::Display for MsaaLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsaaLevel::None => write!(f, "None"),
            other => write!(f, "{}x MSAA", other.native_value()),
        }
    }
}
