//! Physical device selection and logical device creation.
//!
//! Selection is a pure scan over [`DeviceCandidate`]s so it can be reasoned about
//! (and tested) without a driver: the first candidate in enumeration order that has
//! both a graphics and a present family and reports `VK_KHR_swapchain` wins. Device
//! kind (discrete, integrated, ...) is deliberately not scored.

use crate::capabilities::{CapabilityRegistry, CapabilityRequests, EnabledCapabilities};
use crate::config::SWAPCHAIN_EXTENSION;
use crate::error::{Result, VulkanError};
use crate::instance::Instance;
use crate::surface::{Surface, SurfaceSource};
use ash::vk;
use std::ffi::CStr;
use tracing::{debug, info, warn};

/// Queue family indices found while scanning a device. Either may be unresolved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scans every family. A later family that qualifies replaces an earlier one,
    /// for graphics and present independently.
    pub fn scan<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = QueueFamilyIndices::default();
        for (i, family) in families.iter().enumerate() {
            let index = i as u32;
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics_family = Some(index);
            }
            if supports_present(index)? {
                indices.present_family = Some(index);
            }
        }
        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilyPair> {
        Some(QueueFamilyPair {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

/// A resolved pair of family indices. The two may alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyPair {
    pub graphics: u32,
    pub present: u32,
}

/// How a resource shared by the graphics and present queues must be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingMode {
    pub mode: vk::SharingMode,
    /// Empty for exclusive sharing; exactly the two distinct families otherwise.
    pub queue_family_indices: Vec<u32>,
}

impl QueueFamilyPair {
    pub fn is_exclusive(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct families, graphics first. One queue is created per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_exclusive() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn sharing(&self) -> SharingMode {
        if self.is_exclusive() {
            SharingMode {
                mode: vk::SharingMode::EXCLUSIVE,
                queue_family_indices: Vec::new(),
            }
        } else {
            SharingMode {
                mode: vk::SharingMode::CONCURRENT,
                queue_family_indices: vec![self.graphics, self.present],
            }
        }
    }
}

/// What the selector knows about one enumerated device.
#[derive(Debug, Clone)]
pub struct DeviceCandidate<H> {
    pub handle: H,
    pub name: String,
    pub queue_families: QueueFamilyIndices,
    pub extensions: CapabilityRegistry,
}

impl<H> DeviceCandidate<H> {
    pub fn is_eligible(&self) -> bool {
        self.queue_families.is_complete() && self.extensions.available(SWAPCHAIN_EXTENSION)
    }
}

/// First eligible candidate in enumeration order.
pub fn choose_first_eligible<H, I>(candidates: I) -> Option<DeviceCandidate<H>>
where
    I: IntoIterator<Item = DeviceCandidate<H>>,
{
    candidates.into_iter().find(|candidate| {
        let eligible = candidate.is_eligible();
        if !eligible {
            debug!(
                "Device {} not eligible. Graphics: {:?}, Present: {:?}, swapchain: {}",
                candidate.name,
                candidate.queue_families.graphics_family,
                candidate.queue_families.present_family,
                candidate.extensions.available(SWAPCHAIN_EXTENSION)
            );
        }
        eligible
    })
}

/// The selected physical device with its resolved families and frozen extension set.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyPair,
    pub extensions: EnabledCapabilities,
}

fn inspect_device(
    instance: &Instance,
    surface: &Surface<'_>,
    source: &dyn SurfaceSource,
    physical_device: vk::PhysicalDevice,
) -> Result<DeviceCandidate<vk::PhysicalDevice>> {
    let raw = instance.raw();
    let properties = unsafe { raw.get_physical_device_properties(physical_device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    info!("Evaluating device: {}", name);

    let families = unsafe { raw.get_physical_device_queue_family_properties(physical_device) };
    let queue_families = QueueFamilyIndices::scan(&families, |index| {
        let platform = source.presentation_support(instance.entry(), raw, physical_device, index);
        // Both halves must agree; skip the API query when the platform already says no.
        Ok(platform && surface.supports_family(physical_device, index)?)
    })?;
    let extensions = CapabilityRegistry::device_extensions(raw, physical_device)?;

    Ok(DeviceCandidate {
        handle: physical_device,
        name,
        queue_families,
        extensions,
    })
}

/// Picks the first eligible physical device and resolves its device extensions.
pub fn select_physical_device(
    instance: &Instance,
    surface: &Surface<'_>,
    source: &dyn SurfaceSource,
    requests: &CapabilityRequests,
) -> Result<PhysicalDeviceInfo> {
    let physical_devices = unsafe { instance.raw().enumerate_physical_devices() }
        .map_err(VulkanError::call("vkEnumeratePhysicalDevices"))?;
    info!("Found {} physical devices.", physical_devices.len());

    let candidates = physical_devices
        .into_iter()
        .map(|pd| inspect_device(instance, surface, source, pd))
        .collect::<Result<Vec<_>>>()?;

    let chosen = choose_first_eligible(candidates).ok_or(VulkanError::NoSuitableDevice)?;
    let queue_families = chosen.queue_families.resolve().ok_or(VulkanError::NoSuitableDevice)?;

    let mut extensions = chosen.extensions;
    extensions.resolve(requests)?;
    let extensions = extensions.freeze()?;

    let properties = unsafe { instance.raw().get_physical_device_properties(chosen.handle) };
    let memory_properties = unsafe { instance.raw().get_physical_device_memory_properties(chosen.handle) };
    info!(
        "Selected physical device: {} with queue families: Graphics: {}, Present: {}",
        chosen.name, queue_families.graphics, queue_families.present
    );

    Ok(PhysicalDeviceInfo {
        physical_device: chosen.handle,
        name: chosen.name,
        properties,
        memory_properties,
        queue_families,
        extensions,
    })
}

/// The logical device plus its graphics and present queues.
pub struct Device<'i> {
    instance: &'i Instance,
    raw: ash::Device,
    physical: PhysicalDeviceInfo,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl<'i> Device<'i> {
    pub fn new(instance: &'i Instance, physical: PhysicalDeviceInfo) -> Result<Self> {
        let families = physical.queue_families;
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let physical_device_features = vk::PhysicalDeviceFeatures::builder();
        let extension_ptrs = physical.extensions.as_ptrs();

        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_features(&physical_device_features)
            .enabled_extension_names(&extension_ptrs);

        let raw = unsafe {
            instance
                .raw()
                .create_device(physical.physical_device, &device_create_info, None)
        }
        .map_err(|result| VulkanError::DeviceCreation {
            object: "logical device",
            result,
        })?;
        info!("Logical device created successfully.");

        let graphics_queue = unsafe { raw.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { raw.get_device_queue(families.present, 0) };
        info!("Graphics and Present queues obtained.");

        Ok(Self {
            instance,
            raw,
            physical,
            graphics_queue,
            present_queue,
        })
    }

    pub fn instance(&self) -> &'i Instance {
        self.instance
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    pub fn queue_families(&self) -> QueueFamilyPair {
        self.physical.queue_families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical.memory_properties
    }

    /// Blocks until every queue on the device is idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(VulkanError::call("vkDeviceWaitIdle"))
    }
}

impl Drop for Device<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            warn!("Waiting for device idle before destruction failed: {}", e);
        }
        unsafe { self.raw.destroy_device(None) };
        info!("Vulkan logical device destroyed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityKind;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn candidate(
        name: &'static str,
        graphics: Option<u32>,
        present: Option<u32>,
        swapchain: bool,
    ) -> DeviceCandidate<&'static str> {
        let extensions: Vec<&str> = if swapchain { vec![SWAPCHAIN_EXTENSION] } else { vec![] };
        DeviceCandidate {
            handle: name,
            name: name.to_string(),
            queue_families: QueueFamilyIndices {
                graphics_family: graphics,
                present_family: present,
            },
            extensions: CapabilityRegistry::new(CapabilityKind::DeviceExtension, extensions),
        }
    }

    #[test]
    fn scan_finds_shared_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::scan(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.resolve(), Some(QueueFamilyPair { graphics: 0, present: 0 }));
    }

    #[test]
    fn scan_finds_split_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::scan(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert!(!indices.resolve().unwrap().is_exclusive());
    }

    #[test]
    fn scan_keeps_the_last_qualifying_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::scan(&families, |i| Ok(i < 2)).unwrap();
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn scan_leaves_missing_roles_unresolved() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::scan(&families, |_| Ok(false)).unwrap();
        assert!(!indices.is_complete());
        assert_eq!(indices.resolve(), None);
    }

    #[test]
    fn scan_propagates_query_errors() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::scan(&families, |_| {
            Err(VulkanError::call("vkGetPhysicalDeviceSurfaceSupportKHR")(
                vk::Result::ERROR_SURFACE_LOST_KHR,
            ))
        });
        assert!(matches!(result, Err(VulkanError::Call { .. })));
    }

    #[test]
    fn sharing_is_concurrent_iff_families_differ() {
        for graphics in 0..4u32 {
            for present in 0..4u32 {
                let pair = QueueFamilyPair { graphics, present };
                let sharing = pair.sharing();
                if graphics == present {
                    assert_eq!(sharing.mode, vk::SharingMode::EXCLUSIVE);
                    assert!(sharing.queue_family_indices.is_empty());
                    assert_eq!(pair.unique(), vec![graphics]);
                } else {
                    assert_eq!(sharing.mode, vk::SharingMode::CONCURRENT);
                    assert_eq!(sharing.queue_family_indices, vec![graphics, present]);
                    assert_eq!(pair.unique().len(), 2);
                }
            }
        }
    }

    #[test]
    fn first_eligible_device_wins_regardless_of_order_of_quality() {
        let chosen = choose_first_eligible(vec![
            candidate("no-present", Some(0), None, true),
            candidate("no-swapchain", Some(0), Some(0), false),
            candidate("integrated", Some(0), Some(1), true),
            candidate("discrete", Some(0), Some(0), true),
        ])
        .unwrap();
        assert_eq!(chosen.name, "integrated");
    }

    #[test]
    fn no_eligible_device_yields_none() {
        let chosen = choose_first_eligible(vec![
            candidate("a", None, Some(0), true),
            candidate("b", Some(0), Some(0), false),
        ]);
        assert!(chosen.is_none());
        assert!(choose_first_eligible(Vec::<DeviceCandidate<u32>>::new()).is_none());
    }

    #[test]
    fn selected_device_always_has_valid_families_and_swapchain() {
        let graphics_options = [None, Some(0), Some(2)];
        let present_options = [None, Some(1), Some(2)];
        for &g in &graphics_options {
            for &p in &present_options {
                for swapchain in [false, true] {
                    let chosen = choose_first_eligible(vec![candidate("dev", g, p, swapchain)]);
                    if let Some(dev) = chosen {
                        let pair = dev.queue_families.resolve().unwrap();
                        assert_eq!(Some(pair.graphics), g);
                        assert_eq!(Some(pair.present), p);
                        assert!(dev.extensions.available(SWAPCHAIN_EXTENSION));
                    } else {
                        assert!(g.is_none() || p.is_none() || !swapchain);
                    }
                }
            }
        }
    }
}
