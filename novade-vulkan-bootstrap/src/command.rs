//! Per-frame command recording.
//!
//! One command buffer is allocated from a pool created with
//! `RESET_COMMAND_BUFFER`, so `vkBeginCommandBuffer` implicitly resets it and the same
//! handle is re-recorded every frame.

use crate::device::Device;
use crate::error::{Result, VulkanError};
use crate::pipeline::PUSH_CONSTANT_STAGES;
use crate::swapchain::color_subresource_range;
use ash::vk;

/// Stage scope used on both sides of every layout barrier.
pub const BARRIER_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::ALL_COMMANDS;

/// An image layout transition with no queue-family ownership transfer.
pub fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .build()
}

/// The two transitions around a transfer clear: into `TRANSFER_DST_OPTIMAL`, then to `PRESENT_SRC_KHR`.
pub fn clear_barriers(image: vk::Image) -> [vk::ImageMemoryBarrier; 2] {
    [
        layout_barrier(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        layout_barrier(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::MEMORY_READ,
        ),
    ]
}

pub fn clear_color_value(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

/// The single draw issued inside the render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    Vertices { count: u32 },
    Indexed { count: u32 },
}

/// Handles and parameters for the render-pass path.
#[derive(Debug, Clone)]
pub struct DrawPlan {
    pub render_pass: vk::RenderPass,
    /// Indexed by swapchain image index.
    pub framebuffers: Vec<vk::Framebuffer>,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub vertex_buffer: Option<vk::Buffer>,
    pub index_buffer: Option<vk::Buffer>,
    /// Vertices, or indices when an index buffer is bound.
    pub element_count: u32,
    pub push_constants: Vec<u8>,
}

impl DrawPlan {
    pub fn draw_call(&self) -> DrawCall {
        match self.index_buffer {
            Some(_) => DrawCall::Indexed {
                count: self.element_count,
            },
            None => DrawCall::Vertices {
                count: self.element_count,
            },
        }
    }

    /// The framebuffer for swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(VulkanError::ImageIndexOutOfRange {
                index: image_index,
                count: self.framebuffers.len(),
                target: "framebuffers",
            })
    }

    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

/// What to record for each frame.
#[derive(Debug, Clone)]
pub enum RecordPlan {
    /// Transfer-clear the acquired image to a color.
    Clear { color: [f32; 4] },
    /// Draw once inside the render pass.
    Draw(DrawPlan),
}

pub struct CommandRecorder<'d> {
    device: &'d Device<'d>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
}

impl<'d> CommandRecorder<'d> {
    /// Creates the pool on the graphics family and allocates the one primary buffer.
    pub fn new(device: &'d Device<'d>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.queue_families().graphics);
        let pool = unsafe { device.raw().create_command_pool(&pool_info, None) }
            .map_err(VulkanError::creation("CommandPool"))?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffer = match unsafe { device.raw().allocate_command_buffers(&alloc_info) } {
            Ok(buffers) if !buffers.is_empty() => buffers[0],
            other => {
                unsafe { device.raw().destroy_command_pool(pool, None) };
                let result = other.err().unwrap_or(vk::Result::ERROR_UNKNOWN);
                return Err(VulkanError::creation("CommandBuffer")(result));
            }
        };

        Ok(Self { device, pool, buffer })
    }

    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Re-records the buffer for the acquired `image` at `image_index`.
    pub fn record(&self, image_index: u32, image: vk::Image, plan: &RecordPlan) -> Result<vk::CommandBuffer> {
        let raw = self.device.raw();
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { raw.begin_command_buffer(self.buffer, &begin_info) }
            .map_err(VulkanError::call("vkBeginCommandBuffer"))?;

        match plan {
            RecordPlan::Clear { color } => self.record_clear(image, *color),
            RecordPlan::Draw(draw) => self.record_draw(image_index, draw)?,
        }

        unsafe { raw.end_command_buffer(self.buffer) }.map_err(VulkanError::call("vkEndCommandBuffer"))?;
        Ok(self.buffer)
    }

    fn record_clear(&self, image: vk::Image, color: [f32; 4]) {
        let raw = self.device.raw();
        let [to_transfer, to_present] = clear_barriers(image);
        let clear_value = vk::ClearColorValue { float32: color };
        let ranges = [color_subresource_range()];
        unsafe {
            raw.cmd_pipeline_barrier(
                self.buffer,
                BARRIER_STAGE,
                BARRIER_STAGE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );
            raw.cmd_clear_color_image(
                self.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_value,
                &ranges,
            );
            raw.cmd_pipeline_barrier(
                self.buffer,
                BARRIER_STAGE,
                BARRIER_STAGE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present],
            );
        }
    }

    fn record_draw(&self, image_index: u32, plan: &DrawPlan) -> Result<()> {
        let raw = self.device.raw();
        let framebuffer = plan.framebuffer(image_index)?;
        let clear_values = [clear_color_value(plan.clear_color)];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(plan.render_pass)
            .framebuffer(framebuffer)
            .render_area(plan.scissor())
            .clear_values(&clear_values);

        unsafe {
            raw.cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE);
            raw.cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, plan.pipeline);
            raw.cmd_set_viewport(self.buffer, 0, &[plan.viewport()]);
            raw.cmd_set_scissor(self.buffer, 0, &[plan.scissor()]);
            if let Some(vertex_buffer) = plan.vertex_buffer {
                raw.cmd_bind_vertex_buffers(self.buffer, 0, &[vertex_buffer], &[0]);
            }
            if let Some(index_buffer) = plan.index_buffer {
                raw.cmd_bind_index_buffer(self.buffer, index_buffer, 0, vk::IndexType::UINT16);
            }
            if !plan.push_constants.is_empty() {
                raw.cmd_push_constants(
                    self.buffer,
                    plan.pipeline_layout,
                    PUSH_CONSTANT_STAGES,
                    0,
                    &plan.push_constants,
                );
            }
            match plan.draw_call() {
                DrawCall::Vertices { count } => raw.cmd_draw(self.buffer, count, 1, 0, 0),
                DrawCall::Indexed { count } => raw.cmd_draw_indexed(self.buffer, count, 1, 0, 0, 0),
            }
            raw.cmd_end_render_pass(self.buffer);
        }
        Ok(())
    }
}

impl Drop for CommandRecorder<'_> {
    fn drop(&mut self) {
        // Freeing the pool frees its buffers.
        unsafe { self.device.raw().destroy_command_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn draw_plan() -> DrawPlan {
        DrawPlan {
            render_pass: vk::RenderPass::null(),
            framebuffers: vec![vk::Framebuffer::null(); 3],
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_buffer: None,
            index_buffer: None,
            element_count: 3,
            push_constants: Vec::new(),
        }
    }

    #[test]
    fn barriers_never_transfer_ownership() {
        let image = vk::Image::from_raw(0x42);
        for barrier in clear_barriers(image) {
            assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
            assert_eq!(barrier.dst_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
            assert_eq!(barrier.image, image);
            assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        }
        assert_eq!(BARRIER_STAGE, vk::PipelineStageFlags::ALL_COMMANDS);
    }

    #[test]
    fn clear_path_transitions_undefined_to_present() {
        let [first, second] = clear_barriers(vk::Image::null());
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(second.old_layout, first.new_layout);
        assert_eq!(second.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(first.dst_access_mask, second.src_access_mask);
    }

    #[test]
    fn draw_call_is_indexed_only_with_an_index_buffer() {
        let mut plan = draw_plan();
        assert_eq!(plan.draw_call(), DrawCall::Vertices { count: 3 });
        plan.index_buffer = Some(vk::Buffer::from_raw(7));
        plan.element_count = 6;
        assert_eq!(plan.draw_call(), DrawCall::Indexed { count: 6 });
    }

    #[test]
    fn framebuffer_lookup_rejects_unknown_index() {
        let mut plan = draw_plan();
        plan.framebuffers[2] = vk::Framebuffer::from_raw(9);
        assert_eq!(plan.framebuffer(2).unwrap(), vk::Framebuffer::from_raw(9));
        assert!(matches!(
            plan.framebuffer(3),
            Err(VulkanError::ImageIndexOutOfRange {
                index: 3,
                count: 3,
                ..
            })
        ));
    }

    #[test]
    fn viewport_and_scissor_cover_the_extent() {
        let plan = draw_plan();
        let viewport = plan.viewport();
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(plan.scissor().extent, plan.extent);
        assert_eq!(plan.scissor().offset, vk::Offset2D { x: 0, y: 0 });
    }

    #[test]
    fn clear_value_carries_float_color() {
        let value = clear_color_value([1.0, 0.0, 1.0, 1.0]);
        assert_eq!(unsafe { value.color.float32 }, [1.0, 0.0, 1.0, 1.0]);
    }
}
