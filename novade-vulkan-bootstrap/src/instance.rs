use crate::capabilities::{CapabilityRegistry, EnabledCapabilities};
use crate::config::{BootstrapConfig, DEBUG_UTILS_EXTENSION};
use crate::error::{Result, VulkanError};
use crate::surface::SurfaceSource;
use ash::extensions::ext::DebugUtils;
use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use tracing::{info, Level};

/// Tracing level for a messenger severity. The most severe bit wins.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
    if severity.contains(Severity::ERROR) {
        Level::ERROR
    } else if severity.contains(Severity::WARNING) {
        Level::WARN
    } else if severity.contains(Severity::INFO) {
        Level::INFO
    } else if severity.contains(Severity::VERBOSE) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

/// # Safety
/// `ptr` is null or points to a NUL-terminated string that outlives `'a`.
unsafe fn lossy<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let Some(data) = data.as_ref() else {
        return vk::FALSE;
    };
    let id = lossy(data.p_message_id_name);
    let message = lossy(data.p_message);
    let number = data.message_id_number;

    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(target: "vulkan", $level, ?kind, %id, number, "{}", message)
        };
    }
    match severity_level(severity) {
        Level::ERROR => emit!(Level::ERROR),
        Level::WARN => emit!(Level::WARN),
        Level::INFO => emit!(Level::INFO),
        Level::DEBUG => emit!(Level::DEBUG),
        _ => emit!(Level::TRACE),
    }
    vk::FALSE
}

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// The Vulkan instance, created from the frozen instance-extension and layer sets.
///
/// Everything else in the bootstrap borrows the instance, so it is the last object
/// destroyed.
pub struct Instance {
    entry: ash::Entry,
    raw: ash::Instance,
    extensions: EnabledCapabilities,
    layers: EnabledCapabilities,
    debug: Option<DebugMessenger>,
}

impl Instance {
    /// Loads the Vulkan library and creates an instance.
    pub fn new(config: &BootstrapConfig, source: &dyn SurfaceSource) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };
        Self::with_entry(entry, config, source)
    }

    pub fn with_entry(entry: ash::Entry, config: &BootstrapConfig, source: &dyn SurfaceSource) -> Result<Self> {
        let mut extension_registry = CapabilityRegistry::instance_extensions(&entry)?;
        extension_registry.resolve(&config.instance_extension_requests(&source.instance_extensions()))?;
        let extensions = extension_registry.freeze()?;

        let mut layer_registry = CapabilityRegistry::instance_layers(&entry)?;
        layer_registry.resolve(&config.layer_requests())?;
        let layers = layer_registry.freeze()?;

        let app_name = CString::new(config.application_name.as_str())?;
        let eng_name = CString::new(config.engine_name.as_str())?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&eng_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs = extensions.as_ptrs();
        let layer_ptrs = layers.as_ptrs();
        let debug_enabled = extensions.contains(DEBUG_UTILS_EXTENSION);

        let mut instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let mut debug_messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        if debug_enabled {
            instance_create_info = instance_create_info.push_next(&mut debug_messenger_create_info);
        }

        let raw = unsafe { entry.create_instance(&instance_create_info, None) }.map_err(|result| {
            VulkanError::DeviceCreation {
                object: "instance",
                result,
            }
        })?;
        info!(
            "Vulkan instance created ({} extensions, {} layers).",
            extensions.len(),
            layers.len()
        );

        let debug = if debug_enabled {
            let loader = DebugUtils::new(&entry, &raw);
            match unsafe { loader.create_debug_utils_messenger(&debug_messenger_create_info, None) } {
                Ok(messenger) => {
                    info!("Vulkan debug messenger created successfully.");
                    Some(DebugMessenger { loader, messenger })
                }
                Err(result) => {
                    unsafe { raw.destroy_instance(None) };
                    return Err(VulkanError::creation("DebugUtilsMessenger")(result));
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            raw,
            extensions,
            layers,
            debug,
        })
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn extensions(&self) -> &EnabledCapabilities {
        &self.extensions
    }

    pub fn layers(&self) -> &EnabledCapabilities {
        &self.layers
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
                info!("Vulkan debug messenger destroyed.");
            }
            self.raw.destroy_instance(None);
        }
        info!("Vulkan instance destroyed.");
    }
}
