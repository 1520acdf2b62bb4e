//! Error type and `Result` alias for the Vulkan bootstrap.
//!
//! Every variant here is fatal for the bootstrap: nothing is retried or downgraded
//! to a warning. Callers propagate with `?` and the binary turns the error into a
//! diagnostic plus a non-zero exit code.

use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The kind of driver capability a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    InstanceExtension,
    Layer,
    DeviceExtension,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::InstanceExtension => write!(f, "instance extension"),
            CapabilityKind::Layer => write!(f, "instance layer"),
            CapabilityKind::DeviceExtension => write!(f, "device extension"),
        }
    }
}

/// Errors raised while bootstrapping the device, creating resources or driving frames.
#[derive(Debug, Error)]
pub enum VulkanError {
    /// The Vulkan loader library could not be found or opened.
    #[error("Failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// A capability marked as required is not reported by the driver.
    #[error("Missing required {kind}: {name}")]
    CapabilityMissing { kind: CapabilityKind, name: String },

    /// No physical device has graphics + present families and the swapchain extension.
    #[error("No suitable physical device found")]
    NoSuitableDevice,

    /// `vkCreateInstance` or `vkCreateDevice` reported a non-success status.
    #[error("Failed to create {object}: {result}")]
    DeviceCreation {
        object: &'static str,
        #[source]
        result: vk::Result,
    },

    /// A resource creation call (swapchain, view, buffer, semaphore, ...) failed.
    #[error("Failed to create resource '{resource}': {result}")]
    ResourceCreation {
        resource: &'static str,
        #[source]
        result: vk::Result,
    },

    /// The surface lacks an image usage the swapchain needs, or reports no formats.
    #[error("Surface unsupported: {0}")]
    SurfaceUnsupported(String),

    /// No memory type satisfies both the requested properties and the resource's type bits.
    #[error("No memory type with properties {required:?} in type bits {type_bits:#b}")]
    MemoryTypeNotFound {
        required: vk::MemoryPropertyFlags,
        type_bits: u32,
    },

    /// Any other Vulkan call (queries, acquire/submit/present, waits) failed.
    #[error("Vulkan call {call} failed: {result}")]
    Call {
        call: &'static str,
        #[source]
        result: vk::Result,
    },

    /// A host write larger than the buffer it targets.
    #[error("Write of {requested} bytes exceeds buffer size {capacity}")]
    BufferOverflow {
        capacity: vk::DeviceSize,
        requested: vk::DeviceSize,
    },

    /// An image index with no matching swapchain image or framebuffer.
    #[error("Image index {index} out of range for {count} {target}")]
    ImageIndexOutOfRange {
        index: u32,
        count: usize,
        target: &'static str,
    },

    /// A frame phase was driven without the phase it depends on.
    #[error("Frame phase '{phase}' called out of order: {message}")]
    FrameOutOfOrder {
        phase: &'static str,
        message: &'static str,
    },

    /// Shader bytecode is not a word-aligned SPIR-V blob.
    #[error("Invalid shader bytecode in {path:?}: {message}")]
    InvalidBytecode { path: PathBuf, message: String },

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// A name passed to the driver contained an interior NUL byte.
    #[error("Invalid name: {0}")]
    InvalidName(#[from] std::ffi::NulError),

    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
}

impl VulkanError {
    pub(crate) fn creation(resource: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| VulkanError::ResourceCreation { resource, result }
    }

    pub(crate) fn call(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| VulkanError::Call { call, result }
    }
}

/// Errors from loading or validating a [`crate::config::BootstrapConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

pub type Result<T, E = VulkanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_missing_names_kind_and_capability() {
        let err = VulkanError::CapabilityMissing {
            kind: CapabilityKind::DeviceExtension,
            name: "VK_KHR_swapchain".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required device extension: VK_KHR_swapchain");
    }

    #[test]
    fn creation_helper_keeps_vk_result_as_source() {
        let err = VulkanError::creation("Swapchain")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        match err {
            VulkanError::ResourceCreation { resource, result } => {
                assert_eq!(resource, "Swapchain");
                assert_eq!(result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn range_errors_report_index_and_count() {
        let err = VulkanError::ImageIndexOutOfRange {
            index: 3,
            count: 2,
            target: "framebuffers",
        };
        assert_eq!(err.to_string(), "Image index 3 out of range for 2 framebuffers");

        let err = VulkanError::BufferOverflow {
            capacity: 4,
            requested: 8,
        };
        assert_eq!(err.to_string(), "Write of 8 bytes exceeds buffer size 4");
    }

    #[test]
    fn config_errors_wrap_into_vulkan_error() {
        let err: VulkanError = ConfigError::Invalid {
            field: "swapchain.width",
            message: "must be non-zero".to_string(),
        }
        .into();
        assert!(err.to_string().contains("swapchain.width"));
    }
}
