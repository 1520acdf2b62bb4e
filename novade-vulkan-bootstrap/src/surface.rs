//! Presentation surfaces.
//!
//! The window system is an external collaborator. It is represented by the
//! [`SurfaceSource`] trait: it names the instance extensions it needs, creates an
//! opaque `vk::SurfaceKHR` from an instance, and answers the platform half of the
//! "can family F of device D present here" question.

use crate::error::{Result, VulkanError};
use crate::instance::Instance;
use ash::extensions::khr;
use ash::vk;
#[cfg(feature = "wayland")]
use std::ffi::c_void;
use std::mem;
use std::ptr;
use tracing::info;

/// Window-system hook used by the bootstrap to obtain a surface.
pub trait SurfaceSource {
    /// Instance extensions (besides `VK_KHR_surface`) that must be enabled.
    fn instance_extensions(&self) -> Vec<&'static str>;

    /// Creates the surface. Called once, after instance creation.
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR>;

    /// Platform presentation support for a queue family. The API-level surface support
    /// query is made separately by the device selector.
    fn presentation_support(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> bool;
}

/// Offscreen surface through `VK_EXT_headless_surface`.
///
/// Has no platform-level presentation query, so every family passes the platform half
/// and only the surface-support query decides.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurfaceSource;

impl HeadlessSurfaceSource {
    pub const EXTENSION: &'static str = "VK_EXT_headless_surface";
}

impl SurfaceSource for HeadlessSurfaceSource {
    fn instance_extensions(&self) -> Vec<&'static str> {
        vec![Self::EXTENSION]
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let fp = vk::ExtHeadlessSurfaceFn::load(|name| unsafe {
            mem::transmute(entry.get_instance_proc_addr(instance.handle(), name.as_ptr()))
        });
        let create_info = vk::HeadlessSurfaceCreateInfoEXT::builder();
        let mut surface = vk::SurfaceKHR::null();
        unsafe {
            (fp.create_headless_surface_ext)(instance.handle(), &*create_info, ptr::null(), &mut surface)
        }
        .result()
        .map_err(VulkanError::creation("HeadlessSurface"))?;
        Ok(surface)
    }

    fn presentation_support(
        &self,
        _entry: &ash::Entry,
        _instance: &ash::Instance,
        _physical_device: vk::PhysicalDevice,
        _queue_family_index: u32,
    ) -> bool {
        true
    }
}

/// Wayland surface from raw `wl_display` / `wl_surface` pointers owned by the compositor.
#[cfg(feature = "wayland")]
#[derive(Debug, Clone, Copy)]
pub struct WaylandSurfaceSource {
    display: *mut c_void,
    surface: *mut c_void,
}

#[cfg(feature = "wayland")]
impl WaylandSurfaceSource {
    /// # Safety
    ///
    /// Both pointers must stay valid for as long as the created `Surface` lives.
    pub unsafe fn new(display: *mut c_void, surface: *mut c_void) -> Result<Self> {
        if display.is_null() || surface.is_null() {
            return Err(VulkanError::SurfaceUnsupported(
                "Wayland display or surface pointer is null".to_string(),
            ));
        }
        Ok(Self { display, surface })
    }
}

#[cfg(feature = "wayland")]
impl SurfaceSource for WaylandSurfaceSource {
    fn instance_extensions(&self) -> Vec<&'static str> {
        vec!["VK_KHR_wayland_surface"]
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let loader = khr::WaylandSurface::new(entry, instance);
        let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
            .display(self.display)
            .surface(self.surface);
        unsafe { loader.create_wayland_surface(&create_info, None) }
            .map_err(VulkanError::creation("WaylandSurface"))
    }

    fn presentation_support(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> bool {
        let loader = khr::WaylandSurface::new(entry, instance);
        let display = unsafe { &mut *self.display };
        unsafe {
            loader.get_physical_device_wayland_presentation_support(physical_device, queue_family_index, display)
        }
    }
}

/// Owns a `vk::SurfaceKHR` and borrows the instance it was created from.
pub struct Surface<'i> {
    instance: &'i Instance,
    loader: khr::Surface,
    raw: vk::SurfaceKHR,
}

impl<'i> Surface<'i> {
    pub fn new(instance: &'i Instance, source: &dyn SurfaceSource) -> Result<Self> {
        let raw = source.create_surface(instance.entry(), instance.raw())?;
        let loader = khr::Surface::new(instance.entry(), instance.raw());
        info!("Vulkan surface created successfully.");
        Ok(Self { instance, loader, raw })
    }

    pub fn instance(&self) -> &'i Instance {
        self.instance
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }

    pub fn loader(&self) -> &khr::Surface {
        &self.loader
    }

    pub fn supports_family(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.raw)
        }
        .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceSupportKHR"))
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.raw)
        }
        .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.loader.get_physical_device_surface_formats(physical_device, self.raw) }
            .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceFormatsKHR"))
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.raw)
        }
        .map_err(VulkanError::call("vkGetPhysicalDeviceSurfacePresentModesKHR"))
    }
}

impl Drop for Surface<'_> {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
        info!("Vulkan surface destroyed.");
    }
}
