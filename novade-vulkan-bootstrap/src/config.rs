//! Bootstrap configuration.
//!
//! [`BootstrapConfig`] is deserialized from TOML. Every field has a default, so an
//! empty document is a valid configuration. Unknown fields are rejected.
//!
//! ```
//! use novade_vulkan_bootstrap::config::BootstrapConfig;
//!
//! let config = BootstrapConfig::from_toml_str(r#"
//! validation = false
//! frame_limit = 10
//!
//! [swapchain]
//! width = 640
//! height = 480
//! present_mode = "mailbox"
//!
//! [device_extensions]
//! VK_EXT_memory_budget = "optional"
//! "#).unwrap();
//! assert_eq!(config.swapchain.width, 640);
//! assert_eq!(config.frame_limit, Some(10));
//! ```

use crate::capabilities::{CapabilityRequests, Requirement};
use crate::error::ConfigError;
use ash::vk;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
pub const SURFACE_EXTENSION: &str = "VK_KHR_surface";
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";
pub const PORTABILITY_SUBSET_EXTENSION: &str = "VK_KHR_portability_subset";

mod defaults {
    pub fn application_name() -> String {
        "NovaDE Present".to_string()
    }

    pub fn engine_name() -> String {
        "NovaDE Vulkan Bootstrap".to_string()
    }

    pub fn validation() -> bool {
        cfg!(debug_assertions)
    }

    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn clear_color() -> [f32; 4] {
        [1.0, 0.0, 1.0, 1.0]
    }

    pub fn extent() -> u32 {
        800
    }

    pub fn image_count() -> u32 {
        2
    }
}

/// Preferred swapchain color format. The surface's first format is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum FormatPreference {
    #[default]
    #[serde(rename = "B8G8R8A8_SRGB")]
    Bgra8Srgb,
    #[serde(rename = "R8G8B8A8_SRGB")]
    Rgba8Srgb,
    #[serde(rename = "B8G8R8A8_UNORM")]
    Bgra8Unorm,
    #[serde(rename = "R8G8B8A8_UNORM")]
    Rgba8Unorm,
}

impl FormatPreference {
    pub fn as_vk(self) -> vk::Format {
        match self {
            FormatPreference::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            FormatPreference::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            FormatPreference::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            FormatPreference::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

/// Preferred present mode. FIFO is always supported and is used when the preference is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentModePreference {
    pub fn as_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// Desired swapchain parameters, negotiated against the surface's reported limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwapchainConfig {
    #[serde(default = "defaults::extent")]
    pub width: u32,
    #[serde(default = "defaults::extent")]
    pub height: u32,
    #[serde(default = "defaults::image_count")]
    pub image_count: u32,
    #[serde(default)]
    pub format: FormatPreference,
    #[serde(default)]
    pub present_mode: PresentModePreference,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            width: defaults::extent(),
            height: defaults::extent(),
            image_count: defaults::image_count(),
            format: FormatPreference::default(),
            present_mode: PresentModePreference::default(),
        }
    }
}

impl SwapchainConfig {
    pub fn desired_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// SPIR-V inputs for the render-pass path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ShaderConfig {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

impl ShaderConfig {
    /// Both stages, if both are configured.
    pub fn pair(&self) -> Option<(&Path, &Path)> {
        match (&self.vertex, &self.fragment) {
            (Some(v), Some(f)) => Some((v.as_path(), f.as_path())),
            _ => None,
        }
    }
}

/// Root configuration of the bootstrap and present loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapConfig {
    #[serde(default = "defaults::application_name")]
    pub application_name: String,
    #[serde(default = "defaults::engine_name")]
    pub engine_name: String,
    /// Requests the Khronos validation layer and debug messenger as optional capabilities.
    #[serde(default = "defaults::validation")]
    pub validation: bool,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub instance_extensions: BTreeMap<String, Requirement>,
    #[serde(default)]
    pub layers: BTreeMap<String, Requirement>,
    #[serde(default)]
    pub device_extensions: BTreeMap<String, Requirement>,
    #[serde(default)]
    pub swapchain: SwapchainConfig,
    #[serde(default = "defaults::clear_color")]
    pub clear_color: [f32; 4],
    /// Stop after this many frames. `None` runs until the stop signal fires.
    #[serde(default)]
    pub frame_limit: Option<u64>,
    #[serde(default)]
    pub shaders: ShaderConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            application_name: defaults::application_name(),
            engine_name: defaults::engine_name(),
            validation: defaults::validation(),
            log_level: defaults::log_level(),
            instance_extensions: BTreeMap::new(),
            layers: BTreeMap::new(),
            device_extensions: BTreeMap::new(),
            swapchain: SwapchainConfig::default(),
            clear_color: defaults::clear_color(),
            frame_limit: None,
            shaders: ShaderConfig::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BootstrapConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.swapchain.width == 0 || self.swapchain.height == 0 {
            return Err(ConfigError::Invalid {
                field: "swapchain.width/height",
                message: format!(
                    "extent must be non-zero, got {}x{}",
                    self.swapchain.width, self.swapchain.height
                ),
            });
        }
        if self.swapchain.image_count == 0 {
            return Err(ConfigError::Invalid {
                field: "swapchain.image_count",
                message: "must be at least 1".to_string(),
            });
        }
        if self.shaders.vertex.is_some() != self.shaders.fragment.is_some() {
            return Err(ConfigError::Invalid {
                field: "shaders",
                message: "vertex and fragment must be given together".to_string(),
            });
        }
        Ok(())
    }

    /// Instance extensions: `VK_KHR_surface` plus whatever the surface source needs are
    /// required; debug utils is optional when validation is on. Configured entries merge on top.
    pub fn instance_extension_requests(&self, surface_extensions: &[&str]) -> CapabilityRequests {
        let mut requests = CapabilityRequests::new().require(SURFACE_EXTENSION);
        for name in surface_extensions {
            requests.insert(*name, Requirement::Required);
        }
        if self.validation {
            requests.insert(DEBUG_UTILS_EXTENSION, Requirement::Optional);
        }
        requests.merge(&self.instance_extensions.clone().into());
        requests
    }

    pub fn layer_requests(&self) -> CapabilityRequests {
        let mut requests = CapabilityRequests::new();
        if self.validation {
            requests.insert(VALIDATION_LAYER, Requirement::Optional);
        }
        requests.merge(&self.layers.clone().into());
        requests
    }

    pub fn device_extension_requests(&self) -> CapabilityRequests {
        let mut requests = CapabilityRequests::new()
            .require(SWAPCHAIN_EXTENSION)
            .optional(PORTABILITY_SUBSET_EXTENSION);
        requests.merge(&self.device_extensions.clone().into());
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = BootstrapConfig::from_toml_str("").unwrap();
        assert_eq!(config, BootstrapConfig::default());
        assert_eq!(config.swapchain.width, 800);
        assert_eq!(config.swapchain.image_count, 2);
        assert_eq!(config.clear_color, [1.0, 0.0, 1.0, 1.0]);
        assert_eq!(config.swapchain.format.as_vk(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.swapchain.present_mode.as_vk(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn capability_tables_parse() {
        let config = BootstrapConfig::from_toml_str(
            r#"
            [layers]
            VK_LAYER_LUNARG_api_dump = "optional"

            [instance_extensions]
            VK_KHR_get_surface_capabilities2 = "required"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.layers.get("VK_LAYER_LUNARG_api_dump"),
            Some(&Requirement::Optional)
        );
        let requests = config.instance_extension_requests(&["VK_EXT_headless_surface"]);
        let names: Vec<_> = requests.iter().filter(|(_, r)| r.is_required()).map(|(n, _)| n).collect();
        assert!(names.contains(&"VK_KHR_surface"));
        assert!(names.contains(&"VK_EXT_headless_surface"));
        assert!(names.contains(&"VK_KHR_get_surface_capabilities2"));
    }

    #[test]
    fn configured_entry_cannot_downgrade_swapchain() {
        let config = BootstrapConfig::from_toml_str(
            r#"
            [device_extensions]
            VK_KHR_swapchain = "optional"
            "#,
        )
        .unwrap();
        let requests = config.device_extension_requests();
        assert!(requests
            .iter()
            .any(|(n, r)| n == SWAPCHAIN_EXTENSION && r == Requirement::Required));
    }

    #[test]
    fn validation_toggles_layer_and_debug_utils() {
        let config = BootstrapConfig {
            validation: true,
            ..BootstrapConfig::default()
        };
        assert!(config.layer_requests().iter().any(|(n, _)| n == VALIDATION_LAYER));
        assert!(config
            .instance_extension_requests(&[])
            .iter()
            .any(|(n, r)| n == DEBUG_UTILS_EXTENSION && r == Requirement::Optional));

        let config = BootstrapConfig {
            validation: false,
            ..BootstrapConfig::default()
        };
        assert!(config.layer_requests().is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            BootstrapConfig::from_toml_str("frames_in_flight = 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_zero_extent_and_half_shader_pair() {
        assert!(matches!(
            BootstrapConfig::from_toml_str("[swapchain]\nwidth = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            BootstrapConfig::from_toml_str("[swapchain]\nimage_count = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            BootstrapConfig::from_toml_str("[shaders]\nvertex = \"tri.vert.spv\""),
            Err(ConfigError::Invalid { field: "shaders", .. })
        ));
    }

    #[test]
    fn full_shader_pair_selects_the_draw_path() {
        let config = BootstrapConfig::from_toml_str(
            "[shaders]\nvertex = \"tri.vert.spv\"\nfragment = \"tri.frag.spv\"",
        )
        .unwrap();
        let (vertex, fragment) = config.shaders.pair().unwrap();
        assert_eq!(vertex, Path::new("tri.vert.spv"));
        assert_eq!(fragment, Path::new("tri.frag.spv"));
    }

    #[test]
    fn format_preference_uses_vulkan_names() {
        let config = BootstrapConfig::from_toml_str("[swapchain]\nformat = \"R8G8B8A8_UNORM\"").unwrap();
        assert_eq!(config.swapchain.format.as_vk(), vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn sample_configuration_parses() {
        let config = BootstrapConfig::from_toml_str(include_str!("../novade-present.toml")).unwrap();
        assert_eq!(config.frame_limit, Some(600));
        assert!(config.shaders.pair().is_none());
        assert_eq!(
            config.device_extensions.get("VK_EXT_memory_budget"),
            Some(&Requirement::Optional)
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BootstrapConfig::load("/nonexistent/novade-present.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
