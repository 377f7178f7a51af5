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

//! Pipeline configuration loaded from RON.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use vesper_core::renderer::MsaaLevel;

/// Frame rate cap applied when none or an invalid one is configured.
pub const DEFAULT_FRAME_RATE_HZ: i64 = 60;

/// Start-up settings for a [`RenderPipeline`](crate::RenderPipeline).
///
/// ```ron
/// (
///     max_frame_rate_hz: Some(144),
///     antialiasing: FourTimes,
///     vsync: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame rate cap; `None` leaves the frame rate uncapped.
    pub max_frame_rate_hz: Option<i64>,
    /// Anti-aliasing level for window back buffers.
    pub antialiasing: MsaaLevel,
    /// Whether presentation waits for vertical blank.
    pub vsync: bool,
    /// Runs every pass on the master thread even when workers exist.
    pub force_single_threaded: bool,
    /// Total threads used for parallel pass work; `None` uses the available parallelism.
    pub worker_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_frame_rate_hz: Some(DEFAULT_FRAME_RATE_HZ),
            antialiasing: MsaaLevel::None,
            vsync: false,
            force_single_threaded: false,
            worker_threads: None,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from RON text. Missing fields take their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self, PipelineError> {
        Ok(ron::from_str(source)?)
    }

    /// Reads and parses a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path.as_ref())?;
        let config = ron::de::from_bytes(&bytes)?;
        log::debug!("Loaded pipeline configuration from {}.", path.as_ref().display());
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, PipelineError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Total threads the parallelization provider should run, never below 1.
    pub fn worker_thread_count(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config =
            PipelineConfig::from_ron_str("(vsync: true, antialiasing: FourTimes)").unwrap();
        assert!(config.vsync);
        assert_eq!(config.antialiasing, MsaaLevel::FourTimes);
        assert_eq!(config.max_frame_rate_hz, Some(60), "frame rate keeps its default");
        assert!(!config.force_single_threaded);
    }

    #[test]
    fn test_uncapped_and_thread_count() {
        let config =
            PipelineConfig::from_ron_str("(max_frame_rate_hz: None, worker_threads: Some(0))")
                .unwrap();
        assert_eq!(config.max_frame_rate_hz, None);
        assert_eq!(config.worker_thread_count(), 1, "zero threads is raised to one");
        assert!(PipelineConfig::default().worker_thread_count() >= 1);
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let config = PipelineConfig {
            max_frame_rate_hz: Some(144),
            antialiasing: MsaaLevel::EightTimes,
            worker_threads: Some(4),
            ..Default::default()
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(PipelineConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let err = PipelineConfig::from_ron_str("(vsync: maybe)").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigParse(_)), "got {err:?}");
        let err = PipelineConfig::load("/nonexistent/vesper.ron").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigIo(_)), "got {err:?}");
    }
}
