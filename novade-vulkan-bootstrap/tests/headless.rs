//! Tests against a real driver through `VK_EXT_headless_surface`.
//!
//! Each test logs a warning and returns early when no loader, ICD or headless surface
//! support is present.

use ash::vk;
use novade_vulkan_bootstrap::buffer::UPLOAD_MEMORY;
use novade_vulkan_bootstrap::logging::init_test_logging;
use novade_vulkan_bootstrap::{
    bootstrap, create_upload_buffer, select_physical_device, BootstrapConfig, Device, Framebuffers,
    HeadlessSurfaceSource, Instance, RenderPass, Surface, SurfaceDescriptor, Swapchain, VulkanError,
};

fn test_config() -> BootstrapConfig {
    let mut config = BootstrapConfig {
        validation: false,
        ..BootstrapConfig::default()
    };
    config.swapchain.image_count = 2;
    config
}

fn environment_unavailable(e: &VulkanError) -> bool {
    matches!(
        e,
        VulkanError::Loading(_) | VulkanError::CapabilityMissing { .. } | VulkanError::NoSuitableDevice
    )
}

/// Runs `f` with a headless surface and a logical device, or skips.
fn with_device<F>(f: F)
where
    F: for<'a> FnOnce(&'a Device<'a>, &'a Surface<'a>),
{
    init_test_logging();
    let config = test_config();
    let source = HeadlessSurfaceSource;

    let instance = match Instance::new(&config, &source) {
        Ok(instance) => instance,
        Err(e) => {
            tracing::warn!("Skipping: no headless-capable Vulkan instance ({})", e);
            return;
        }
    };
    let surface = match Surface::new(&instance, &source) {
        Ok(surface) => surface,
        Err(e) => {
            tracing::warn!("Skipping: headless surface creation failed ({})", e);
            return;
        }
    };
    let physical = match select_physical_device(&instance, &surface, &source, &config.device_extension_requests()) {
        Ok(physical) => physical,
        Err(e) => {
            tracing::warn!("Skipping: no suitable device ({})", e);
            return;
        }
    };
    let device = Device::new(&instance, physical).expect("logical device creation");
    f(&device, &surface);
}

#[test]
fn upload_buffers_round_trip() {
    with_device(|device, _surface| {
        for n in [1usize, 64, 4096] {
            let data: Vec<u32> = (0..n as u32).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();
            let mut buffer =
                create_upload_buffer(device, vk::BufferUsageFlags::TRANSFER_SRC, &data).expect("upload buffer");

            assert_eq!(buffer.size(), (n * 4) as u64);
            assert!(buffer.memory().size() >= buffer.size());
            let type_index = buffer.memory().type_index() as usize;
            let flags = device.memory_properties().memory_types[type_index].property_flags;
            assert!(flags.contains(UPLOAD_MEMORY));

            let mapping = buffer.map().expect("map");
            assert_eq!(mapping.as_bytes(), bytemuck::cast_slice::<u32, u8>(&data));
        }
    });
}

#[test]
fn oversized_write_leaves_buffer_untouched() {
    with_device(|device, _surface| {
        let mut buffer =
            create_upload_buffer(device, vk::BufferUsageFlags::TRANSFER_SRC, &[7u8; 4]).expect("upload buffer");
        let err = buffer.write(&[1u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::BufferOverflow {
                capacity: 4,
                requested: 8
            }
        ));
        assert_eq!(buffer.map().expect("map").as_bytes(), &[7u8; 4]);
    });
}

#[test]
fn swapchain_arrays_have_equal_sizes() {
    with_device(|device, surface| {
        let config = test_config();
        let descriptor = SurfaceDescriptor::query(surface, device, &config.swapchain).expect("negotiation");
        let capabilities = surface
            .capabilities(device.physical().physical_device)
            .expect("capabilities");
        assert!(descriptor.image_count >= capabilities.min_image_count);
        if capabilities.max_image_count != 0 {
            assert!(descriptor.image_count <= capabilities.max_image_count);
        }

        let swapchain = Swapchain::new(device, surface, descriptor).expect("swapchain");
        let render_pass = RenderPass::new(device, swapchain.format()).expect("render pass");
        let framebuffers = Framebuffers::new(&swapchain, &render_pass).expect("framebuffers");

        assert!(!swapchain.is_empty());
        assert_eq!(swapchain.images().len(), swapchain.views().len());
        assert_eq!(swapchain.views().len(), framebuffers.len());
    });
}

#[test]
fn teardown_in_reverse_dependency_order() {
    with_device(|device, surface| {
        let config = test_config();
        let descriptor = SurfaceDescriptor::query(surface, device, &config.swapchain).expect("negotiation");
        let swapchain = Swapchain::new(device, surface, descriptor).expect("swapchain");
        let render_pass = RenderPass::new(device, swapchain.format()).expect("render pass");
        let framebuffers = Framebuffers::new(&swapchain, &render_pass).expect("framebuffers");

        device.wait_idle().expect("idle");
        drop(framebuffers);
        drop(render_pass);
        drop(swapchain);
        device.wait_idle().expect("idle after teardown");
    });
}

#[test]
fn presents_ten_frames_then_tears_down() {
    init_test_logging();
    let config = BootstrapConfig {
        frame_limit: Some(10),
        ..test_config()
    };
    match bootstrap::run(&config, &HeadlessSurfaceSource, |_| false) {
        Ok(stats) => {
            assert_eq!(stats.frames, 10);
            assert!(stats.last_image_index.is_some());
        }
        Err(e) if environment_unavailable(&e) => {
            tracing::warn!("Skipping end-to-end run: {}", e);
        }
        Err(e) => panic!("present loop failed: {e}"),
    }
}

#[test]
fn stop_signal_ends_the_loop() {
    init_test_logging();
    let config = test_config();
    match bootstrap::run(&config, &HeadlessSurfaceSource, |stats| stats.frames >= 3) {
        Ok(stats) => assert_eq!(stats.frames, 3),
        Err(e) if environment_unavailable(&e) => {
            tracing::warn!("Skipping stop-signal run: {}", e);
        }
        Err(e) => panic!("present loop failed: {e}"),
    }
}
