//! Vulkan bootstrap for NovaDE: capability negotiation, device selection, swapchain and
//! buffer creation, and a present loop with a single frame in flight.
//!
//! [`bootstrap::run`] drives the whole sequence. The individual stages are public so
//! they can be composed differently, e.g. with a compositor-provided surface.
//!
//! Frames are a transfer clear unless `[shaders]` names compiled SPIR-V files. The
//! sources in `shaders/` are not compiled by the build; run `glslc` on them first, as
//! shown in `novade-present.toml`.

pub mod bootstrap;
pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod logging;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::{create_upload_buffer, Buffer, UnboundBuffer};
pub use capabilities::{CapabilityRegistry, CapabilityRequests, EnabledCapabilities, Requirement};
pub use command::{CommandRecorder, DrawPlan, RecordPlan};
pub use config::BootstrapConfig;
pub use device::{select_physical_device, Device, PhysicalDeviceInfo, QueueFamilyIndices, QueueFamilyPair};
pub use error::{ConfigError, Result, VulkanError};
pub use frame::{FrameDriver, FrameLoop, FramePhase, FrameStats, VulkanFrameDriver};
pub use instance::Instance;
pub use memory::{select_memory_type, MemoryBlock};
pub use pipeline::{GraphicsPipeline, Vertex};
pub use render_pass::RenderPass;
#[cfg(feature = "wayland")]
pub use surface::WaylandSurfaceSource;
pub use surface::{HeadlessSurfaceSource, Surface, SurfaceSource};
pub use swapchain::{Framebuffers, SurfaceDescriptor, Swapchain};
pub use sync::FrameSyncPair;
