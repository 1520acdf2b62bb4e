//! The acquire → record → submit → present → wait-idle loop.
//!
//! [`FrameLoop`] knows only the order of the phases. The Vulkan calls live behind
//! [`FrameDriver`], implemented for real devices by [`VulkanFrameDriver`]. Exactly one
//! frame is in flight: every iteration ends with a full device idle wait.

use crate::command::{CommandRecorder, RecordPlan};
use crate::device::Device;
use crate::error::{Result, VulkanError};
use crate::swapchain::Swapchain;
use crate::sync::FrameSyncPair;
use ash::vk;
use std::fmt;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Acquire,
    Record,
    Submit,
    Present,
    WaitIdle,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Acquire => "acquire",
            FramePhase::Record => "record",
            FramePhase::Submit => "submit",
            FramePhase::Present => "present",
            FramePhase::WaitIdle => "wait-idle",
        };
        f.write_str(name)
    }
}

/// One implementation of each frame phase. Any error aborts the loop.
pub trait FrameDriver {
    /// Acquires a presentable image, signaling the image-available semaphore.
    fn acquire(&mut self) -> Result<u32>;

    /// Records the frame's commands for `image_index`.
    fn record(&mut self, image_index: u32) -> Result<()>;

    /// Submits the recorded commands to the graphics queue.
    fn submit(&mut self) -> Result<()>;

    /// Presents `image_index` once rendering has finished.
    fn present(&mut self, image_index: u32) -> Result<()>;

    /// Blocks until the device is idle.
    fn wait_idle(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that completed all five phases.
    pub frames: u64,
    pub last_image_index: Option<u32>,
}

pub struct FrameLoop<D> {
    driver: D,
    stats: FrameStats,
}

impl<D: FrameDriver> FrameLoop<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            stats: FrameStats::default(),
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Runs all five phases once and returns the image index that was presented.
    pub fn run_frame(&mut self) -> Result<u32> {
        trace!("Frame {}: {}", self.stats.frames, FramePhase::Acquire);
        let image_index = self.driver.acquire()?;
        trace!("Frame {}: {} image {}", self.stats.frames, FramePhase::Record, image_index);
        self.driver.record(image_index)?;
        trace!("Frame {}: {}", self.stats.frames, FramePhase::Submit);
        self.driver.submit()?;
        trace!("Frame {}: {}", self.stats.frames, FramePhase::Present);
        self.driver.present(image_index)?;
        trace!("Frame {}: {}", self.stats.frames, FramePhase::WaitIdle);
        self.driver.wait_idle()?;

        self.stats.frames += 1;
        self.stats.last_image_index = Some(image_index);
        Ok(image_index)
    }

    /// Runs frames until `stop` returns true. `stop` is polled before every frame,
    /// never while one is in progress.
    pub fn run_until<F>(&mut self, mut stop: F) -> Result<FrameStats>
    where
        F: FnMut(&FrameStats) -> bool,
    {
        info!("Entering frame loop.");
        while !stop(&self.stats) {
            self.run_frame()?;
        }
        info!("Frame loop stopped after {} frames.", self.stats.frames);
        Ok(self.stats)
    }
}

/// [`FrameDriver`] backed by a real swapchain.
pub struct VulkanFrameDriver<'a> {
    device: &'a Device<'a>,
    swapchain: &'a Swapchain<'a>,
    recorder: &'a CommandRecorder<'a>,
    sync: &'a FrameSyncPair<'a>,
    plan: RecordPlan,
    recorded: Option<vk::CommandBuffer>,
}

impl<'a> VulkanFrameDriver<'a> {
    pub fn new(
        device: &'a Device<'a>,
        swapchain: &'a Swapchain<'a>,
        recorder: &'a CommandRecorder<'a>,
        sync: &'a FrameSyncPair<'a>,
        plan: RecordPlan,
    ) -> Self {
        Self {
            device,
            swapchain,
            recorder,
            sync,
            plan,
            recorded: None,
        }
    }
}

/// Consumes the buffer recorded for this frame. Each recording is submitted at most once.
fn take_recorded(recorded: &mut Option<vk::CommandBuffer>) -> Result<vk::CommandBuffer> {
    recorded.take().ok_or(VulkanError::FrameOutOfOrder {
        phase: "submit",
        message: "no command buffer recorded for this frame",
    })
}

impl FrameDriver for VulkanFrameDriver<'_> {
    fn acquire(&mut self) -> Result<u32> {
        self.swapchain.acquire_next_image(self.sync.image_available())
    }

    fn record(&mut self, image_index: u32) -> Result<()> {
        let images = self.swapchain.images();
        let image = images
            .get(image_index as usize)
            .copied()
            .ok_or(VulkanError::ImageIndexOutOfRange {
                index: image_index,
                count: images.len(),
                target: "swapchain images",
            })?;
        self.recorded = Some(self.recorder.record(image_index, image, &self.plan)?);
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        let command_buffer = take_recorded(&mut self.recorded)?;
        let wait_semaphores = [self.sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let signal_semaphores = [self.sync.render_finished()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            self.device
                .raw()
                .queue_submit(self.device.graphics_queue(), &[submit_info], vk::Fence::null())
        }
        .map_err(VulkanError::call("vkQueueSubmit"))
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        self.swapchain
            .present(self.device.present_queue(), image_index, self.sync.render_finished())
    }

    fn wait_idle(&mut self) -> Result<()> {
        debug!("Waiting for device idle.");
        self.device.wait_idle()
    }
}
