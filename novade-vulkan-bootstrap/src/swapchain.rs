//! Surface negotiation, the swapchain with its image views, and per-image framebuffers.
//!
//! Negotiation is pure: [`SurfaceDescriptor::negotiate`] only looks at what the surface
//! reported, so every derived value can be checked against the reported ranges without
//! a driver.
//!
//! Each wrapper borrows the object it was created from. A [`Framebuffers`] cannot
//! outlive its [`Swapchain`], and a swapchain cannot outlive its [`Surface`] or
//! [`Device`]:
//!
//! ```compile_fail
//! use novade_vulkan_bootstrap::{Device, Surface, SurfaceDescriptor, Swapchain};
//!
//! fn teardown<'a>(device: &'a Device<'a>, surface: Surface<'a>, descriptor: SurfaceDescriptor) {
//!     let swapchain = Swapchain::new(device, &surface, descriptor).unwrap();
//!     drop(surface); // surface is still borrowed by the swapchain
//!     drop(swapchain);
//! }
//! ```

use crate::config::SwapchainConfig;
use crate::device::{Device, SharingMode};
use crate::error::{Result, VulkanError};
use crate::render_pass::RenderPass;
use crate::surface::Surface;
use ash::extensions::khr;
use ash::vk;
use tracing::{debug, info, warn};

/// Usage every swapchain image must support: render-pass output and transfer clears.
pub const REQUIRED_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Clamps `desired` componentwise into the reported extent range.
pub fn negotiate_extent(desired: vk::Extent2D, capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: desired.width.clamp(min.width, max.width.max(min.width)),
        height: desired.height.clamp(min.height, max.height.max(min.height)),
    }
}

/// Clamps `desired` into the reported image-count range. A maximum of 0 means unbounded.
pub fn negotiate_image_count(desired: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = match capabilities.max_image_count {
        0 => u32::MAX,
        max => max.max(min),
    };
    desired.clamp(min, max)
}

/// Picks a surface format. The first reported entry is the fallback; every entry
/// with the preferred format replaces the current choice, so the last match wins.
/// The matched entry's color space is taken as reported.
pub fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::Format,
) -> Result<vk::SurfaceFormatKHR> {
    let mut chosen = *formats
        .first()
        .ok_or_else(|| VulkanError::SurfaceUnsupported("surface reports no formats".to_string()))?;
    for format in formats {
        if format.format == preferred {
            chosen = *format;
        }
    }
    Ok(chosen)
}

/// The preferred present mode if supported, FIFO otherwise.
pub fn select_present_mode(modes: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        if preferred != vk::PresentModeKHR::FIFO {
            debug!("Present mode {:?} unsupported, falling back to FIFO.", preferred);
        }
        vk::PresentModeKHR::FIFO
    }
}

/// First supported composite-alpha mode, opaque preferred.
pub fn select_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Fails unless the surface supports [`REQUIRED_IMAGE_USAGE`].
pub fn check_usage(supported: vk::ImageUsageFlags) -> Result<vk::ImageUsageFlags> {
    if supported.contains(REQUIRED_IMAGE_USAGE) {
        Ok(REQUIRED_IMAGE_USAGE)
    } else {
        Err(VulkanError::SurfaceUnsupported(format!(
            "image usage {:?} lacks {:?}",
            supported, REQUIRED_IMAGE_USAGE
        )))
    }
}

/// Swapchain parameters negotiated against what the surface reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SurfaceDescriptor {
    pub fn negotiate(
        config: &SwapchainConfig,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
    ) -> Result<Self> {
        let usage = check_usage(capabilities.supported_usage_flags)?;
        let surface_format = select_surface_format(formats, config.format.as_vk())?;
        let descriptor = Self {
            extent: negotiate_extent(config.desired_extent(), capabilities),
            image_count: negotiate_image_count(config.image_count, capabilities),
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: select_present_mode(present_modes, config.present_mode.as_vk()),
            usage,
            pre_transform: capabilities.current_transform,
            composite_alpha: select_composite_alpha(capabilities.supported_composite_alpha),
        };
        debug!("Negotiated surface descriptor: {:?}", descriptor);
        Ok(descriptor)
    }

    /// Queries the surface for the device and negotiates against `config`.
    pub fn query(surface: &Surface<'_>, device: &Device<'_>, config: &SwapchainConfig) -> Result<Self> {
        let physical_device = device.physical().physical_device;
        let capabilities = surface.capabilities(physical_device)?;
        let formats = surface.formats(physical_device)?;
        let present_modes = surface.present_modes(physical_device)?;
        Self::negotiate(config, &capabilities, &formats, &present_modes)
    }
}

/// The swapchain, its presentable images, and one color view per image.
pub struct Swapchain<'a> {
    device: &'a Device<'a>,
    surface: &'a Surface<'a>,
    loader: khr::Swapchain,
    raw: vk::SwapchainKHR,
    descriptor: SurfaceDescriptor,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl<'a> Swapchain<'a> {
    pub fn new(device: &'a Device<'a>, surface: &'a Surface<'a>, descriptor: SurfaceDescriptor) -> Result<Self> {
        let loader = khr::Swapchain::new(device.instance().raw(), device.raw());
        let SharingMode {
            mode,
            queue_family_indices,
        } = device.queue_families().sharing();

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.raw())
            .min_image_count(descriptor.image_count)
            .image_format(descriptor.format)
            .image_color_space(descriptor.color_space)
            .image_extent(descriptor.extent)
            .image_array_layers(1)
            .image_usage(descriptor.usage)
            .image_sharing_mode(mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(descriptor.pre_transform)
            .composite_alpha(descriptor.composite_alpha)
            .present_mode(descriptor.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let raw = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(VulkanError::creation("Swapchain"))?;

        let mut swapchain = Self {
            device,
            surface,
            loader,
            raw,
            descriptor,
            images: Vec::new(),
            views: Vec::new(),
        };
        // From here on, Drop releases whatever was created if a later call fails.
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(raw) }
            .map_err(VulkanError::call("vkGetSwapchainImagesKHR"))?;
        for &image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(descriptor.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(color_subresource_range());
            let view = unsafe { device.raw().create_image_view(&view_info, None) }
                .map_err(VulkanError::creation("ImageView"))?;
            swapchain.views.push(view);
        }

        info!(
            "Swapchain created: {} images, {}x{}, {:?}, {:?}",
            swapchain.images.len(),
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.format,
            descriptor.present_mode
        );
        Ok(swapchain)
    }

    pub fn device(&self) -> &'a Device<'a> {
        self.device
    }

    pub fn surface(&self) -> &'a Surface<'a> {
        self.surface
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn descriptor(&self) -> &SurfaceDescriptor {
        &self.descriptor
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.descriptor.extent
    }

    pub fn format(&self) -> vk::Format {
        self.descriptor.format
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Acquires the next image with no timeout, signaling `image_available`.
    /// A suboptimal swapchain is logged and the index is still returned.
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.raw, u64::MAX, image_available, vk::Fence::null())
        }
        .map_err(VulkanError::call("vkAcquireNextImageKHR"))?;
        if suboptimal {
            warn!("Swapchain is suboptimal for the surface (acquire), continuing.");
        }
        Ok(index)
    }

    /// Queues image `index` for presentation once `wait` is signaled.
    pub fn present(&self, queue: vk::Queue, index: u32, wait: vk::Semaphore) -> Result<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.raw];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let suboptimal = unsafe { self.loader.queue_present(queue, &present_info) }
            .map_err(VulkanError::call("vkQueuePresentKHR"))?;
        if suboptimal {
            warn!("Swapchain is suboptimal for the surface (present), continuing.");
        }
        Ok(())
    }
}

impl Drop for Swapchain<'_> {
    fn drop(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.device.raw().destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
        info!("Swapchain destroyed.");
    }
}

pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// One framebuffer per swapchain view, for the render-pass path.
pub struct Framebuffers<'s> {
    swapchain: &'s Swapchain<'s>,
    handles: Vec<vk::Framebuffer>,
}

impl<'s> Framebuffers<'s> {
    pub fn new(swapchain: &'s Swapchain<'s>, render_pass: &RenderPass<'_>) -> Result<Self> {
        let extent = swapchain.extent();
        let mut framebuffers = Self {
            swapchain,
            handles: Vec::with_capacity(swapchain.len()),
        };
        for &view in swapchain.views() {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.raw())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let handle = unsafe { swapchain.device().raw().create_framebuffer(&create_info, None) }
                .map_err(VulkanError::creation("Framebuffer"))?;
            framebuffers.handles.push(handle);
        }
        debug!("Created {} framebuffers.", framebuffers.handles.len());
        Ok(framebuffers)
    }

    pub fn handles(&self) -> &[vk::Framebuffer] {
        &self.handles
    }

    pub fn get(&self, index: u32) -> Option<vk::Framebuffer> {
        self.handles.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for Framebuffers<'_> {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            unsafe { self.swapchain.device().raw().destroy_framebuffer(handle, None) };
        }
    }
}
