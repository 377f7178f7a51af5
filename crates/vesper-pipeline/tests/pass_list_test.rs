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

mod common;

use common::{logged, names, new_log, pipeline_with, RecordingPass};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vesper_infra::HeadlessDriver;
use vesper_pipeline::{FrameContext, PipelineError, RenderPass, RenderPassBase};

#[test]
fn test_insert_before_and_execution_order() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let log = new_log();
    let a = RecordingPass::new("A", &log);
    let b = RecordingPass::new("B", &log);
    let c = RecordingPass::new("C", &log);
    let b_key: Arc<dyn RenderPass> = b.clone();

    pipeline.add_render_pass(b.clone()).unwrap();
    pipeline.add_render_pass(c.clone()).unwrap();
    pipeline.insert_render_pass(a.clone(), &b_key).unwrap();
    assert_eq!(names(&pipeline), ["A", "B", "C"]);

    pipeline.tick().unwrap();
    assert_eq!(logged(&log), ["A", "B", "C"], "passes run in list order");
    assert_eq!(driver.executed_commands().len(), 3, "one draw per pass");
    assert_eq!(pipeline.frame_index(), 1);

    for pass in [&a, &b, &c] {
        pass.dispose();
    }
}

#[test]
fn test_add_then_remove_restores_list() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let log = new_log();
    let first = RecordingPass::new("First", &log);
    let extra = RecordingPass::new("Extra", &log);
    let extra_key: Arc<dyn RenderPass> = extra.clone();

    pipeline.add_render_pass(first.clone()).unwrap();
    let before = names(&pipeline);
    pipeline.add_render_pass(extra.clone()).unwrap();
    pipeline.remove_render_pass(&extra_key).unwrap();
    assert_eq!(names(&pipeline), before);

    first.dispose();
    extra.dispose();
}

#[test]
fn test_contract_violations_leave_list_unchanged() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let log = new_log();
    let added = RecordingPass::new("Added", &log);
    let stranger = RecordingPass::new("Stranger", &log);
    let added_key: Arc<dyn RenderPass> = added.clone();
    let stranger_key: Arc<dyn RenderPass> = stranger.clone();

    pipeline.add_render_pass(added.clone()).unwrap();

    let err = pipeline.add_render_pass(added.clone()).unwrap_err();
    assert!(matches!(err, PipelineError::PassAlreadyAdded { .. }), "got {err:?}");
    assert_eq!(err.to_string(), "Render Pass 'Added' (RecordingPass) has already been added");

    let err = pipeline.remove_render_pass(&stranger_key).unwrap_err();
    assert!(matches!(err, PipelineError::PassNotAdded { .. }), "got {err:?}");

    let err = pipeline.insert_render_pass(stranger.clone(), &stranger_key).unwrap_err();
    assert!(matches!(err, PipelineError::InsertionKeyNotAdded { .. }), "got {err:?}");

    let err = pipeline.insert_render_pass(added.clone(), &added_key).unwrap_err();
    assert!(matches!(err, PipelineError::PassAlreadyAdded { .. }), "got {err:?}");

    assert_eq!(names(&pipeline), ["Added"]);

    pipeline.clear_passes().unwrap();
    assert!(pipeline.added_passes().is_empty());
    pipeline.clear_passes().unwrap();

    added.dispose();
    stranger.dispose();
}

#[test]
fn test_disabled_and_invalid_passes_are_skipped() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let log = new_log();
    let disabled = RecordingPass::new("Disabled", &log);
    let invalid = RecordingPass::new("Invalid", &log);
    let normal = RecordingPass::new("Normal", &log);
    for pass in [&disabled, &invalid, &normal] {
        pipeline.add_render_pass(pass.clone()).unwrap();
    }

    disabled.base().set_enabled(false).unwrap();
    invalid.set_valid(false);
    pipeline.tick().unwrap();
    assert_eq!(logged(&log), ["Normal"]);
    assert_eq!(driver.executed_commands().len(), 1, "skipped passes queue nothing");

    for pass in [&disabled, &invalid, &normal] {
        pass.dispose();
    }
}

#[test]
fn test_failing_pass_aborts_remaining_passes() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let log = new_log();
    let before = RecordingPass::new("Before", &log);
    let failing = RecordingPass::new("Failing", &log);
    let after = RecordingPass::new("After", &log);
    for pass in [&before, &failing, &after] {
        pipeline.add_render_pass(pass.clone()).unwrap();
    }

    failing.set_failing(true);
    let err = pipeline.tick().unwrap_err();
    assert!(matches!(err, PipelineError::PassFailed { .. }), "got {err:?}");
    assert_eq!(logged(&log), ["Before"]);
    assert!(!pipeline.barrier().is_frozen(), "the barrier is released after a failure");

    failing.set_failing(false);
    pipeline.tick().unwrap();
    assert_eq!(
        logged(&log),
        ["Before", "Before", "Failing", "After"],
        "the next frame runs normally"
    );

    for pass in [&before, &failing, &after] {
        pass.dispose();
    }
}

#[derive(Debug)]
struct StallingPass {
    base: RenderPassBase,
    started: Arc<AtomicBool>,
    mutation_seen: Arc<AtomicBool>,
}

impl RenderPass for StallingPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn execute(&self, _frame: &FrameContext) -> Result<(), PipelineError> {
        let seen_on_entry = self.mutation_seen.load(Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        if self.mutation_seen.load(Ordering::SeqCst) != seen_on_entry {
            return Err(PipelineError::PassFailed {
                pass: self.name().to_owned(),
                reason: "the pass list changed mid-frame".to_owned(),
            });
        }
        Ok(())
    }
}

#[test]
fn test_mutation_waits_for_frame_to_finish() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = Arc::new(pipeline_with(&driver, 1));
    let started = Arc::new(AtomicBool::new(false));
    let mutation_seen = Arc::new(AtomicBool::new(false));
    let stalling = Arc::new(StallingPass {
        base: RenderPassBase::new("Stalling"),
        started: started.clone(),
        mutation_seen: mutation_seen.clone(),
    });
    pipeline.add_render_pass(stalling.clone()).unwrap();

    let log = new_log();
    let late = RecordingPass::new("Late", &log);
    let mutator = {
        let (pipeline, late, started, mutation_seen) =
            (pipeline.clone(), late.clone(), started.clone(), mutation_seen.clone());
        thread::spawn(move || {
            while !started.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            pipeline.add_render_pass(late).unwrap();
            mutation_seen.store(true, Ordering::SeqCst);
        })
    };

    pipeline.tick().expect("no mutation may land while the frame executes");
    mutator.join().unwrap();
    assert!(mutation_seen.load(Ordering::SeqCst));
    assert_eq!(names(&pipeline), ["Stalling", "Late"]);
    assert!(logged(&log).is_empty(), "the late pass joins from the next frame");

    pipeline.tick().unwrap();
    assert_eq!(logged(&log), ["Late"]);

    pipeline.teardown().unwrap();
    stalling.dispose();
    late.dispose();
}

#[test]
fn test_pass_cannot_mutate_its_own_frame() {
    #[derive(Debug)]
    struct SelfTogglingPass {
        base: RenderPassBase,
    }

    impl RenderPass for SelfTogglingPass {
        fn base(&self) -> &RenderPassBase {
            &self.base
        }

        fn execute(&self, _frame: &FrameContext) -> Result<(), PipelineError> {
            self.base.set_enabled(false)
        }
    }

    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let pass = Arc::new(SelfTogglingPass {
        base: RenderPassBase::new("Toggler"),
    });
    pipeline.add_render_pass(pass.clone()).unwrap();

    let err = pipeline.tick().unwrap_err();
    assert!(matches!(err, PipelineError::Barrier(_)), "got {err:?}");
    assert!(pass.is_enabled());
    pass.dispose();
}
