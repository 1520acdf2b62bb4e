//! Semaphores for the single frame in flight.

use crate::device::Device;
use crate::error::{Result, VulkanError};
use ash::vk;
use tracing::debug;

/// The two binary semaphores that order one frame on the GPU.
///
/// - `image_available` is signaled by acquire and waited on by the submit.
/// - `render_finished` is signaled by the submit and waited on by present.
///
/// No fence is needed: the frame loop waits for device idle at the end of each iteration.
pub struct FrameSyncPair<'d> {
    device: &'d Device<'d>,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
}

impl<'d> FrameSyncPair<'d> {
    pub fn new(device: &'d Device<'d>) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let image_available = unsafe { device.raw().create_semaphore(&create_info, None) }
            .map_err(VulkanError::creation("ImageAvailableSemaphore"))?;
        let render_finished = match unsafe { device.raw().create_semaphore(&create_info, None) } {
            Ok(semaphore) => semaphore,
            Err(result) => {
                unsafe { device.raw().destroy_semaphore(image_available, None) };
                return Err(VulkanError::creation("RenderFinishedSemaphore")(result));
            }
        };
        debug!("Frame semaphores created.");
        Ok(Self {
            device,
            image_available,
            render_finished,
        })
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }
}

impl Drop for FrameSyncPair<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_semaphore(self.render_finished, None);
            self.device.raw().destroy_semaphore(self.image_available, None);
        }
    }
}
