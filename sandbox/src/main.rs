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

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use vesper_core::platform::{RenderWindow, WindowDescriptor};
use vesper_core::renderer::{Buffer, BufferKind, GpuResource, ResourceHandle};
use vesper_core::{PrimitiveTopology, RenderCommand};
use vesper_infra::HeadlessDriver;
use vesper_pipeline::{
    FrameContext, PipelineConfig, PipelineError, RenderPass, RenderPassBase, RenderPipeline,
};

const FRAMES: u64 = 240;
const OBJECTS: usize = 128;
const OBJECTS_PER_BLOCK: usize = 16;

/// Clears the window's back buffer and binds it as the render target.
#[derive(Debug)]
struct ClearPass {
    base: RenderPassBase,
    window: Arc<dyn RenderWindow>,
}

impl RenderPass for ClearPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn is_valid(&self) -> bool {
        !self.window.is_closed()
    }

    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        let window = self.window.as_ref();
        frame.queue_command(RenderCommand::set_window_render_target(window)?);
        frame.queue_command(RenderCommand::clear_window_render_target(window)?);
        frame.queue_command(RenderCommand::clear_window_depth_stencil(window)?);
        Ok(())
    }
}

/// Uploads a transform per object and draws it, spread across the worker pool.
#[derive(Debug)]
struct GeometryPass {
    base: RenderPassBase,
    transforms: Arc<Buffer>,
}

impl RenderPass for GeometryPass {
    fn base(&self) -> &RenderPassBase {
        &self.base
    }

    fn is_valid(&self) -> bool {
        !self.transforms.is_disposed()
    }

    fn execute(&self, frame: &FrameContext) -> Result<(), PipelineError> {
        let (worker_frame, transforms) = (frame.clone(), self.transforms.clone());
        let time = frame.frame_index() as f32 / 60.0;
        frame.provider().execute(OBJECTS, OBJECTS_PER_BLOCK, move |object| {
            let offset = object as f32 * 0.01;
            let transform = [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                (time + offset).sin(), (time + offset).cos(), 0.0, 1.0,
            ];
            worker_frame.queue_command(RenderCommand::set_primitive_topology(
                PrimitiveTopology::TriangleList,
            ));
            worker_frame.queue_command(RenderCommand::buffer_write_pod(&transforms, &transform)?);
            worker_frame.queue_command(RenderCommand::draw(0, 36));
            Ok(())
        })
    }
}

/// Presents the window.
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
        frame.queue_present(self.window.as_ref())
    }
}

fn load_config() -> Result<PipelineConfig> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/pipeline.ron").to_owned());
    if Path::new(&path).exists() {
        Ok(PipelineConfig::load(&path)?)
    } else {
        log::warn!("No configuration at '{path}', using defaults.");
        Ok(PipelineConfig::default())
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let driver = Arc::new(HeadlessDriver::new());
    let pipeline = RenderPipeline::create(driver.clone(), None, &config)?;
    let window =
        pipeline.open_window(&WindowDescriptor::new("Vesper Sandbox").with_size(1280, 720))?;

    let transforms = Arc::new(Buffer::new(
        ResourceHandle::from_raw(u64::MAX - 1),
        BufferKind::Constant,
        64,
        1,
        "object transforms",
    ));
    let passes: Vec<Arc<dyn RenderPass>> = vec![
        Arc::new(ClearPass {
            base: RenderPassBase::new("Clear"),
            window: window.clone(),
        }),
        Arc::new(GeometryPass {
            base: RenderPassBase::new("Geometry"),
            transforms: transforms.clone(),
        }),
        Arc::new(PresentPass {
            base: RenderPassBase::new("Present"),
            window: window.clone(),
        }),
    ];
    for pass in &passes {
        pipeline.add_render_pass(pass.clone())?;
    }

    let started = Instant::now();
    while pipeline.frame_index() < FRAMES && !window.is_closed() {
        let frame_start = Instant::now();
        pipeline.tick()?;
        if let Some(remaining) = pipeline.tick_interval().checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }

    let elapsed = started.elapsed();
    log::info!(
        "Rendered {} frame(s) in {:.2?} ({} commands executed, {} presents).",
        pipeline.frame_index(),
        elapsed,
        driver.executed_commands().len(),
        driver.presents().len()
    );

    pipeline.teardown()?;
    for pass in &passes {
        pass.dispose();
    }
    transforms.dispose();
    Ok(())
}
