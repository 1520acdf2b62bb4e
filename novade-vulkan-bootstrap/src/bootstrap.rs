//! Wires the stages together: instance → surface → device → swapchain → (render pass,
//! framebuffers, pipeline, buffers) → recorder and semaphores → frame loop.
//!
//! Every object is a local of [`run`] declared after what it borrows, so teardown on
//! both the success and the error path is the reverse of creation.

use crate::buffer::{create_upload_buffer, Buffer};
use crate::command::{CommandRecorder, DrawPlan, RecordPlan};
use crate::config::BootstrapConfig;
use crate::device::{select_physical_device, Device};
use crate::error::Result;
use crate::frame::{FrameLoop, FrameStats, VulkanFrameDriver};
use crate::instance::Instance;
use crate::pipeline::{GraphicsPipeline, PipelineInputs, TRIANGLE_INDICES, TRIANGLE_VERTICES};
use crate::render_pass::RenderPass;
use crate::shader::ShaderModule;
use crate::surface::{Surface, SurfaceSource};
use crate::swapchain::{Framebuffers, SurfaceDescriptor, Swapchain};
use crate::sync::FrameSyncPair;
use ash::vk;
use std::path::Path;
use tracing::info;

/// Push-constant block for the draw path: the clear color, tinting the triangle.
const PUSH_CONSTANT_SIZE: u32 = 16;

/// Objects of the render-pass path. Field order is drop order.
struct DrawResources<'d> {
    index_buffer: Buffer<'d>,
    vertex_buffer: Buffer<'d>,
    pipeline: GraphicsPipeline<'d>,
}

fn create_draw_resources<'d>(
    device: &'d Device<'d>,
    render_pass: &RenderPass<'_>,
    shaders: (&Path, &Path),
) -> Result<DrawResources<'d>> {
    let vertex_shader = ShaderModule::load(device, shaders.0)?;
    let fragment_shader = ShaderModule::load(device, shaders.1)?;
    let pipeline = GraphicsPipeline::new(
        device,
        render_pass,
        &vertex_shader,
        &fragment_shader,
        PipelineInputs {
            vertex_input: true,
            push_constant_size: PUSH_CONSTANT_SIZE,
        },
    )?;
    let vertex_buffer = create_upload_buffer(device, vk::BufferUsageFlags::VERTEX_BUFFER, &TRIANGLE_VERTICES)?;
    let index_buffer = create_upload_buffer(device, vk::BufferUsageFlags::INDEX_BUFFER, &TRIANGLE_INDICES)?;
    Ok(DrawResources {
        index_buffer,
        vertex_buffer,
        pipeline,
    })
}

/// Brings up the device and swapchain, then presents frames until `stop` returns true
/// or `config.frame_limit` frames have been shown. Waits for idle before teardown.
pub fn run<F>(config: &BootstrapConfig, source: &dyn SurfaceSource, mut stop: F) -> Result<FrameStats>
where
    F: FnMut(&FrameStats) -> bool,
{
    let instance = Instance::new(config, source)?;
    let surface = Surface::new(&instance, source)?;
    let physical = select_physical_device(&instance, &surface, source, &config.device_extension_requests())?;
    let device = Device::new(&instance, physical)?;

    let descriptor = SurfaceDescriptor::query(&surface, &device, &config.swapchain)?;
    let swapchain = Swapchain::new(&device, &surface, descriptor)?;

    let render_pass = match config.shaders.pair() {
        Some(_) => Some(RenderPass::new(&device, swapchain.format())?),
        None => None,
    };
    let framebuffers = match &render_pass {
        Some(render_pass) => Some(Framebuffers::new(&swapchain, render_pass)?),
        None => None,
    };
    let draw_resources = match (&render_pass, config.shaders.pair()) {
        (Some(render_pass), Some(shaders)) => Some(create_draw_resources(&device, render_pass, shaders)?),
        _ => None,
    };

    let plan = match (&render_pass, &framebuffers, &draw_resources) {
        (Some(render_pass), Some(framebuffers), Some(resources)) => {
            info!("Using the render-pass path with an indexed triangle.");
            RecordPlan::Draw(DrawPlan {
                render_pass: render_pass.raw(),
                framebuffers: framebuffers.handles().to_vec(),
                pipeline: resources.pipeline.raw(),
                pipeline_layout: resources.pipeline.layout(),
                extent: swapchain.extent(),
                clear_color: [0.0, 0.0, 0.0, 1.0],
                vertex_buffer: Some(resources.vertex_buffer.raw()),
                index_buffer: Some(resources.index_buffer.raw()),
                element_count: TRIANGLE_INDICES.len() as u32,
                push_constants: bytemuck::cast_slice(&config.clear_color[..]).to_vec(),
            })
        }
        _ => {
            info!("Using the transfer-clear path.");
            RecordPlan::Clear {
                color: config.clear_color,
            }
        }
    };

    let recorder = CommandRecorder::new(&device)?;
    let sync = FrameSyncPair::new(&device)?;
    let driver = VulkanFrameDriver::new(&device, &swapchain, &recorder, &sync, plan);

    let frame_limit = config.frame_limit;
    let mut frame_loop = FrameLoop::new(driver);
    let result = frame_loop.run_until(|stats| frame_limit.map_or(false, |limit| stats.frames >= limit) || stop(stats));

    // Mandatory before any teardown, also when the loop failed.
    let idle = device.wait_idle();
    let stats = result?;
    idle?;
    info!("Presented {} frames, tearing down.", stats.frames);
    Ok(stats)
}
