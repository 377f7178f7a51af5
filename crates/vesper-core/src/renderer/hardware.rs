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

//! Installed graphics adapters, their outputs, and hardware selection.

use std::fmt;

/// One display mode supported by an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayResolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Refresh rate in hertz.
    pub refresh_rate_hz: u32,
}

impl DisplayResolution {
    /// Number of pixels in one frame.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A monitor attached to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDisplay {
    /// Index of the output within its adapter.
    pub index: usize,
    /// Human-readable output name.
    pub name: String,
    /// Whether this is the desktop's primary output.
    pub is_primary: bool,
    /// Supported display modes.
    pub native_resolutions: Vec<DisplayResolution>,
}

impl OutputDisplay {
    /// The supported mode with the most pixels.
    pub fn highest_resolution(&self) -> Option<DisplayResolution> {
        self.native_resolutions
            .iter()
            .copied()
            .max_by_key(DisplayResolution::pixel_count)
    }

    fn highest_pixel_count(&self) -> u64 {
        self.highest_resolution().map_or(0, |r| r.pixel_count())
    }
}

impl fmt::Display for OutputDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.is_primary {
            write!(f, " (primary)")?;
        }
        Ok(())
    }
}

/// A graphics processing unit installed on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsAdapter {
    /// Index of the adapter as enumerated by the driver.
    pub index: usize,
    /// Adapter description string.
    pub description: String,
    /// Dedicated video memory in bytes.
    pub dedicated_video_memory: u64,
    /// Dedicated system memory in bytes.
    pub dedicated_system_memory: u64,
    /// Shared system memory in bytes.
    pub shared_system_memory: u64,
    /// Outputs connected to this adapter.
    pub outputs: Vec<OutputDisplay>,
}

impl fmt::Display for GraphicsAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} MB VRAM)",
            self.description,
            self.dedicated_video_memory / (1024 * 1024)
        )
    }
}

/// Which adapter renders and which output displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareSelection {
    /// The adapter used for rendering.
    pub gpu_index: usize,
    /// The adapter the chosen output is attached to.
    pub output_gpu_index: usize,
    /// The output within `output_gpu_index`.
    pub output_index: usize,
}

/// Hardware could not be selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The driver reported no adapters.
    NoAdapters,
    /// No adapter has any output attached.
    NoOutputs,
    /// An adapter index does not exist.
    InvalidAdapter {
        /// The requested index.
        index: usize,
    },
    /// An output index does not exist on its adapter.
    InvalidOutput {
        /// The adapter index.
        adapter: usize,
        /// The requested output index.
        index: usize,
    },
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::NoAdapters => write!(f, "No graphics adapter detected"),
            HardwareError::NoOutputs => write!(f, "No output detected"),
            HardwareError::InvalidAdapter { index } => {
                write!(f, "No graphics adapter with index {index}")
            }
            HardwareError::InvalidOutput { adapter, index } => {
                write!(f, "Graphics adapter {adapter} has no output with index {index}")
            }
        }
    }
}

impl std::error::Error for HardwareError {}

/// Picks the adapter with the most dedicated video memory, and the output
/// that best suits it.
///
/// The output is the chosen adapter's primary output, else its output with
/// the largest resolution. When the chosen adapter has no outputs, the
/// primary output of any adapter is used, else the largest output overall.
pub fn recommended_hardware(
    adapters: &[GraphicsAdapter],
) -> Result<HardwareSelection, HardwareError> {
    let gpu = adapters
        .iter()
        .rev()
        .max_by_key(|a| a.dedicated_video_memory)
        .ok_or(HardwareError::NoAdapters)?;

    let (output_gpu, output) = if gpu.outputs.is_empty() {
        let all = || adapters.iter().flat_map(|a| a.outputs.iter().map(move |o| (a, o)));
        match all().find(|(_, o)| o.is_primary) {
            Some(found) => found,
            None => all()
                .fold(None, |best: Option<(&GraphicsAdapter, &OutputDisplay)>, candidate| {
                    let candidate_pixels = candidate.1.highest_pixel_count();
                    match best {
                        Some(b) if b.1.highest_pixel_count() >= candidate_pixels => Some(b),
                        _ => Some(candidate),
                    }
                })
                .ok_or(HardwareError::NoOutputs)?,
        }
    } else {
        let output = match gpu.outputs.iter().find(|o| o.is_primary) {
            Some(primary) => primary,
            None => gpu
                .outputs
                .iter()
                .fold(&gpu.outputs[0], |best, o| {
                    if o.highest_pixel_count() > best.highest_pixel_count() {
                        o
                    } else {
                        best
                    }
                }),
        };
        (gpu, output)
    };

    Ok(HardwareSelection {
        gpu_index: gpu.index,
        output_gpu_index: output_gpu.index,
        output_index: output.index,
    })
}

/// Checks that every index of `selection` refers to enumerated hardware.
pub fn validate_selection(
    adapters: &[GraphicsAdapter],
    selection: &HardwareSelection,
) -> Result<(), HardwareError> {
    let find = |index: usize| {
        adapters
            .iter()
            .find(|a| a.index == index)
            .ok_or(HardwareError::InvalidAdapter { index })
    };
    find(selection.gpu_index)?;
    let output_gpu = find(selection.output_gpu_index)?;
    if !output_gpu.outputs.iter().any(|o| o.index == selection.output_index) {
        return Err(HardwareError::InvalidOutput {
            adapter: selection.output_gpu_index,
            index: selection.output_index,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(index: usize, primary: bool, width: u32, height: u32) -> OutputDisplay {
        OutputDisplay {
            index,
            name: format!("Display {index}"),
            is_primary: primary,
            native_resolutions: vec![
                DisplayResolution {
                    width: 640,
                    height: 480,
                    refresh_rate_hz: 60,
                },
                DisplayResolution {
                    width,
                    height,
                    refresh_rate_hz: 60,
                },
            ],
        }
    }

    fn adapter(index: usize, vram_mb: u64, outputs: Vec<OutputDisplay>) -> GraphicsAdapter {
        GraphicsAdapter {
            index,
            description: format!("Adapter {index}"),
            dedicated_video_memory: vram_mb * 1024 * 1024,
            dedicated_system_memory: 0,
            shared_system_memory: 0,
            outputs,
        }
    }

    #[test]
    fn test_prefers_most_video_memory_and_primary_output() {
        let adapters = vec![
            adapter(0, 512, vec![output(0, true, 1920, 1080)]),
            adapter(1, 4096, vec![output(0, false, 3840, 2160), output(1, true, 1280, 720)]),
        ];
        let selection = recommended_hardware(&adapters).unwrap();
        assert_eq!(
            selection,
            HardwareSelection {
                gpu_index: 1,
                output_gpu_index: 1,
                output_index: 1
            }
        );
    }

    #[test]
    fn test_largest_output_when_no_primary() {
        let adapters = vec![adapter(
            0,
            1024,
            vec![output(0, false, 1280, 720), output(1, false, 2560, 1440)],
        )];
        assert_eq!(recommended_hardware(&adapters).unwrap().output_index, 1);
    }

    #[test]
    fn test_falls_back_to_other_adapters_outputs() {
        let adapters = vec![
            adapter(0, 8192, vec![]),
            adapter(1, 256, vec![output(0, false, 1920, 1080)]),
            adapter(2, 128, vec![output(0, true, 1024, 768)]),
        ];
        let selection = recommended_hardware(&adapters).unwrap();
        assert_eq!(selection.gpu_index, 0);
        assert_eq!(selection.output_gpu_index, 2, "a primary output anywhere wins");

        let adapters = vec![adapter(0, 8192, vec![]), adapter(1, 256, vec![])];
        assert_eq!(recommended_hardware(&adapters), Err(HardwareError::NoOutputs));
        assert_eq!(recommended_hardware(&[]), Err(HardwareError::NoAdapters));
    }

    #[test]
    fn test_validate_selection() {
        let adapters = vec![adapter(0, 512, vec![output(0, true, 1920, 1080)])];
        let mut selection = recommended_hardware(&adapters).unwrap();
        assert!(validate_selection(&adapters, &selection).is_ok());
        selection.output_index = 3;
        assert_eq!(
            validate_selection(&adapters, &selection),
            Err(HardwareError::InvalidOutput { adapter: 0, index: 3 })
        );
        selection.gpu_index = 7;
        assert_eq!(
            validate_selection(&adapters, &selection),
            Err(HardwareError::InvalidAdapter { index: 7 })
        );
    }
}
