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

use anyhow::Result;
use common::{logged, new_log, pipeline_with, RecordingPass};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use vesper_core::platform::{RenderWindow, WindowDescriptor};
use vesper_core::renderer::{
    Buffer, BufferKind, ConstantBufferBinding, GpuResource, MsaaLevel, ResourceHandle, Shader,
    ShaderResourcePackage, ShaderStage, TextureSampler, TextureSamplerBinding,
};
use vesper_core::{DecodedCommand, Instruction, RenderCommand};
use vesper_infra::{DriverOperation, HeadlessDriver};
use vesper_pipeline::{
    FrameContext, PipelineConfig, PipelineError, RenderPass, RenderPassBase, RenderPipeline,
};

/// Records the threading mode and the threads its work ran on.
#[derive(Debug)]
struct FanOutPass {
    base: RenderPassBase,
    single_threaded_during_frame: Mutex<Vec<bool>>,
    threads: Arc<Mutex<Vec<ThreadId>>>,
    fail: bool,
}

impl FanOutPass {
    fn new(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            base: RenderPassBase::new(name),
            single_threaded_during_frame: Mutex::new(Vec::new()),
            threads: Arc::new(Mutex::new(Vec::new())),
            fail,
        })
    }
}

impl RenderPass for FanOutPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        self.single_threaded_during_frame
            .lock()
            .unwrap()
            .push(frame.provider().force_single_threaded());
        let (threads, worker_frame) = (self.threads.clone(), frame.clone());
        frame.provider().invoke_on_all(
            move || {
                threads.lock().unwrap().push(thread::current().id());
                worker_frame.queue_command(RenderCommand::draw(0, 3));
                Ok(())
            },
            true,
        )?;
        if self.fail {
            return Err(PipelineError::PassFailed {
                pass: self.name().to_owned(),
                reason: "requested failure".to_owned(),
            });
        }
        Ok(())
    }
}

#[test]
fn test_unsupported_mt_forces_single_threaded_and_restores() {
    let driver = Arc::new(HeadlessDriver::new().with_mt_rendering(false));
    let pipeline = pipeline_with(&driver, 4);
    assert!(!pipeline.provider().force_single_threaded());

    let pass = FanOutPass::new("FanOut", false);
    pipeline.add_render_pass(pass.clone()).unwrap();
    pipeline.tick().unwrap();

    assert_eq!(*pass.single_threaded_during_frame.lock().unwrap(), [true]);
    assert_eq!(
        *pass.threads.lock().unwrap(),
        [thread::current().id()],
        "all work stays on the master thread"
    );
    assert!(!pipeline.provider().force_single_threaded(), "the caller's preference is restored");
    assert!(driver.flushes().iter().all(|f| f.thread == thread::current().id()));
    pass.dispose();
}

#[test]
fn test_single_threaded_preference_restored_after_failure() {
    let driver = Arc::new(HeadlessDriver::new().with_mt_rendering(false));
    let pipeline = pipeline_with(&driver, 2);
    let pass = FanOutPass::new("Failing", true);
    pipeline.add_render_pass(pass.clone()).unwrap();

    assert!(pipeline.tick().is_err());
    assert!(!pipeline.provider().force_single_threaded());
    assert!(!pipeline.barrier().is_frozen());
    assert!(driver.executed_commands().is_empty(), "commands of the failed pass are discarded");
    pass.dispose();
}

#[test]
fn test_worker_commands_arrive_through_command_lists() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 4);
    let pass = FanOutPass::new("FanOut", false);
    pipeline.add_render_pass(pass.clone()).unwrap();
    pipeline.tick().unwrap();

    let threads: HashSet<ThreadId> = pass.threads.lock().unwrap().iter().copied().collect();
    assert_eq!(threads.len(), 4, "the master and three workers each ran once");

    let master = thread::current().id();
    let worker_flushes: Vec<_> = driver
        .flushes()
        .into_iter()
        .filter(|f| f.thread != master)
        .collect();
    assert_eq!(worker_flushes.len(), 3);
    for flush in &worker_flushes {
        assert!(
            matches!(flush.commands.last(), Some(DecodedCommand::FinishCommandList { .. })),
            "deferred flushes end by finishing a command list"
        );
    }
    let draws = driver
        .executed_commands()
        .into_iter()
        .filter(|c| matches!(c, DecodedCommand::Draw { .. }))
        .count();
    assert_eq!(draws, 4, "every thread's draw reaches the immediate context");
    pass.dispose();
}

#[derive(Debug)]
struct PresentPass {
    base: RenderPassBase,
    window: Arc<dyn RenderWindow>,
}

impl RenderPass for PresentPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        frame.queue_command(RenderCommand::clear_window_render_target(self.window.as_ref())?);
        frame.queue_present(self.window.as_ref())
    }
}

#[test]
fn test_closed_window_degrades_to_no_operation() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let window = pipeline.open_window(&WindowDescriptor::new("Main")).unwrap();
    let present = Arc::new(PresentPass {
        base: RenderPassBase::new("Present"),
        window: window.clone(),
    });
    pipeline.add_render_pass(present.clone()).unwrap();

    pipeline.tick().unwrap();
    let headless = driver.windows().remove(0);
    assert_eq!(driver.presents().len(), 1);
    assert_eq!(headless.clear_count(), 1, "open windows are cleared every tick");

    headless.request_close();
    driver.clear_log();
    pipeline.tick().unwrap();
    assert!(window.is_closed());
    assert!(pipeline.open_windows().is_empty(), "closed windows are pruned");
    assert!(driver.presents().is_empty(), "no present for a closed window");
    assert_eq!(driver.executed_commands(), vec![DecodedCommand::NoOperation]);
    assert_eq!(headless.clear_count(), 1);
    present.dispose();
}

#[test]
fn test_settings_reapply_window_resolution() -> Result<()> {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let window = pipeline.open_window(&WindowDescriptor::new("Main").with_size(800, 600))?;
    let headless = driver.windows().remove(0);
    let baseline = headless.resolution_change_count();

    pipeline.set_antialiasing_level(MsaaLevel::FourTimes)?;
    assert_eq!(pipeline.antialiasing_level()?, MsaaLevel::FourTimes);
    assert_eq!(headless.resolution_change_count(), baseline + 1);

    pipeline.set_vsync_enabled(true)?;
    assert!(pipeline.vsync_enabled()?);
    assert_eq!(headless.resolution_change_count(), baseline + 2);
    assert_eq!((window.width()?, window.height()?), (800, 600), "the size is kept");

    pipeline.set_antialiasing_level(MsaaLevel::None)?;
    assert_eq!(pipeline.antialiasing_level()?, MsaaLevel::None);

    driver.fail_next(DriverOperation::SetMsaaLevel, "device removed");
    let err = pipeline.set_antialiasing_level(MsaaLevel::TwoTimes).unwrap_err();
    assert!(err.to_string().contains("device removed"), "got {err}");
    Ok(())
}

#[test]
fn test_config_file_drives_startup() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pipeline.ron");
    std::fs::write(
        &path,
        "(max_frame_rate_hz: Some(-3), antialiasing: EightTimes, vsync: true, worker_threads: Some(2))",
    )?;

    let config = PipelineConfig::load(&path)?;
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = RenderPipeline::create(driver.clone(), None, &config)?;
    assert_eq!(pipeline.max_frame_rate_hz(), Some(60), "invalid caps fall back to 60Hz");
    assert_eq!(pipeline.antialiasing_level()?, MsaaLevel::EightTimes);
    assert!(pipeline.vsync_enabled()?);
    assert_eq!(pipeline.provider().num_threads(), 2);
    Ok(())
}

#[test]
fn test_explicit_hardware_is_validated() {
    let driver = Arc::new(HeadlessDriver::new());
    let selection = vesper_core::renderer::HardwareSelection {
        gpu_index: 3,
        output_gpu_index: 0,
        output_index: 0,
    };
    let err = RenderPipeline::create(driver.clone(), Some(selection), &PipelineConfig::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Hardware(_)), "got {err:?}");
    assert_eq!(driver.live_devices(), 0, "no device is created for invalid hardware");
}

#[derive(Debug)]
struct MaterialPass {
    base: RenderPassBase,
    shader: Arc<Shader>,
    package: ShaderResourcePackage,
}

impl RenderPass for MaterialPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        frame.queue_shader_switch(&self.shader)?;
        frame.queue_shader_resource_update(&self.shader, Some(&self.package))?;
        assert_eq!(
            frame.command_type_breakdown(),
            vec![
                (Instruction::FsSetShader, 1),
                (Instruction::FsSetCBuffers, 1),
                (Instruction::CbDiscardWrite, 1),
                (Instruction::FsSetSamplers, 1),
            ]
        );
        frame.queue_command(RenderCommand::draw(0, 6));
        Ok(())
    }
}

#[test]
fn test_package_overrides_reach_the_driver() {
    let handle = ResourceHandle::from_raw;
    let buffer = Arc::new(Buffer::new(handle(100), BufferKind::Constant, 4, 1, "material"));
    let cb = Arc::new(ConstantBufferBinding::new(0, "Material", buffer.clone()).unwrap());
    cb.set_value(&[1, 1, 1, 1]).unwrap();
    let samplers = Arc::new(TextureSamplerBinding::new(0, "Albedo").unwrap());
    let default_sampler = Arc::new(TextureSampler::new(handle(200), "default"));
    let material_sampler = Arc::new(TextureSampler::new(handle(201), "material"));
    samplers.bind(Some(default_sampler.clone()));

    let shader = Arc::new(
        Shader::new(
            "Textured",
            ShaderStage::Fragment,
            handle(300),
            vec![cb.clone().into(), samplers.clone().into()],
        )
        .unwrap(),
    );
    let package = ShaderResourcePackage::new();
    package.set_value(cb.as_ref(), vec![7, 7, 7, 7]).unwrap();
    package.set_value(samplers.as_ref(), Some(material_sampler.clone())).unwrap();

    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let pass = Arc::new(MaterialPass {
        base: RenderPassBase::new("Material"),
        shader: shader.clone(),
        package,
    });
    pipeline.add_render_pass(pass.clone()).unwrap();
    pipeline.tick().unwrap();

    assert_eq!(
        driver.executed_commands(),
        vec![
            DecodedCommand::SetShader {
                stage: ShaderStage::Fragment,
                shader: handle(300),
            },
            DecodedCommand::SetConstantBuffers {
                stage: ShaderStage::Fragment,
                buffers: vec![handle(100)],
            },
            DecodedCommand::CbDiscardWrite {
                buffer: handle(100),
                data: vec![7, 7, 7, 7],
            },
            DecodedCommand::SetSamplers {
                stage: ShaderStage::Fragment,
                samplers: vec![handle(201)],
            },
            DecodedCommand::Draw {
                first_vertex: 0,
                num_vertices: 6,
            },
        ]
    );
    assert_eq!(cb.current_value().unwrap(), vec![1, 1, 1, 1], "the binding keeps its own value");

    pass.dispose();
    shader.dispose();
    buffer.dispose();
    default_sampler.dispose();
    material_sampler.dispose();
}

#[test]
fn test_recording_pass_counts_frames() {
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = pipeline_with(&driver, 1);
    let log = new_log();
    let pass = RecordingPass::new("Counter", &log);
    pipeline.add_render_pass(pass.clone()).unwrap();
    for _ in 0..3 {
        pipeline.tick().unwrap();
    }
    assert_eq!(logged(&log).len(), 3);
    assert_eq!(pipeline.frame_index(), 3);
    pass.dispose();
}
