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

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use vesper_core::RenderCommand;
use vesper_infra::HeadlessDriver;
use vesper_pipeline::{
    FrameContext, PipelineConfig, PipelineError, RenderPass, RenderPassBase, RenderPipeline,
};

/// Names of passes in the order they executed.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// A pass that logs its name and queues one draw per execution.
#[derive(Debug)]
pub struct RecordingPass {
    base: RenderPassBase,
    log: ExecutionLog,
    fail: AtomicBool,
    valid: AtomicBool,
}

impl RecordingPass {
    pub fn new(name: &str, log: &ExecutionLog) -> Arc<Self> {
        Arc::new(Self {
            base: RenderPassBase::new(name),
            log: log.clone(),
            fail: AtomicBool::new(false),
            valid: AtomicBool::new(true),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl RenderPass for RecordingPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::PassFailed {
                pass: self.name().to_owned(),
                reason: "requested failure".to_owned(),
            });
        }
        self.log.lock().unwrap().push(self.name().to_owned());
        frame.queue_command(RenderCommand::draw(0, 3));
        Ok(())
    }
}

pub fn new_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn logged(log: &ExecutionLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn names(pipeline: &RenderPipeline) -> Vec<String> {
    pipeline
        .added_passes()
        .iter()
        .map(|pass| pass.name().to_owned())
        .collect()
}

pub fn pipeline_with(driver: &Arc<HeadlessDriver>, worker_threads: usize) -> RenderPipeline {
    let config = PipelineConfig {
        worker_threads: Some(worker_threads),
        ..Default::default()
    };
    RenderPipeline::create(driver.clone(), None, &config).expect("headless pipeline")
}
