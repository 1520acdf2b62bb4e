//! Capability registry for instance extensions, layers and device extensions.
//!
//! A [`CapabilityRegistry`] is filled once from a driver query. Requests are then
//! added to its accepted set, and [`CapabilityRegistry::freeze`] turns the accepted
//! set into an immutable [`EnabledCapabilities`] that is handed to instance or device
//! creation. The registry never talks to the driver after construction.

use crate::error::{CapabilityKind, Result, VulkanError};
use ash::vk;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use tracing::{debug, warn};

/// Whether a capability request aborts the bootstrap when unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    Required,
    Optional,
}

impl Requirement {
    pub fn is_required(self) -> bool {
        self == Requirement::Required
    }
}

/// Capability requests keyed by name. A name listed twice keeps the stricter requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRequests {
    entries: BTreeMap<String, Requirement>,
}

impl CapabilityRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.insert(name, Requirement::Required);
        self
    }

    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.insert(name, Requirement::Optional);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, requirement: Requirement) {
        let slot = self.entries.entry(name.into()).or_insert(requirement);
        if requirement.is_required() {
            *slot = Requirement::Required;
        }
    }

    /// Merges `other` into `self`; required wins over optional.
    pub fn merge(&mut self, other: &CapabilityRequests) {
        for (name, requirement) in &other.entries {
            self.insert(name.clone(), *requirement);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Requirement)> {
        self.entries.iter().map(|(name, req)| (name.as_str(), *req))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, Requirement>> for CapabilityRequests {
    fn from(entries: BTreeMap<String, Requirement>) -> Self {
        Self { entries }
    }
}

/// Tracks which capabilities the driver reports and which have been accepted.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    kind: CapabilityKind,
    available: BTreeSet<String>,
    // Insertion order is kept so the enabled list handed to the driver is stable.
    enabled: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new<I, S>(kind: CapabilityKind, available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            available: available.into_iter().map(Into::into).collect(),
            enabled: Vec::new(),
        }
    }

    /// Queries the loader for instance extensions.
    pub fn instance_extensions(entry: &ash::Entry) -> Result<Self> {
        let properties = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::call("vkEnumerateInstanceExtensionProperties"))?;
        let names = properties.iter().map(|p| name_from_raw(&p.extension_name));
        Ok(Self::new(CapabilityKind::InstanceExtension, names))
    }

    /// Queries the loader for instance layers.
    pub fn instance_layers(entry: &ash::Entry) -> Result<Self> {
        let properties = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::call("vkEnumerateInstanceLayerProperties"))?;
        let names = properties.iter().map(|p| name_from_raw(&p.layer_name));
        Ok(Self::new(CapabilityKind::Layer, names))
    }

    /// Queries a physical device for its extensions.
    pub fn device_extensions(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let properties = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(VulkanError::call("vkEnumerateDeviceExtensionProperties"))?;
        let names = properties.iter().map(|p| name_from_raw(&p.extension_name));
        Ok(Self::new(CapabilityKind::DeviceExtension, names))
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Whether the driver reports support for `name`.
    pub fn available(&self, name: &str) -> bool {
        self.available.contains(name)
    }

    /// Whether `name` has been accepted.
    pub fn enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|n| n == name)
    }

    /// Accepts `name` if available. Returns `Ok(false)` for an unavailable optional
    /// capability and `CapabilityMissing` for an unavailable required one.
    pub fn add(&mut self, name: &str, required: bool) -> Result<bool> {
        if !self.available(name) {
            if required {
                return Err(VulkanError::CapabilityMissing {
                    kind: self.kind,
                    name: name.to_string(),
                });
            }
            warn!("Optional {} {} is not available, skipping.", self.kind, name);
            return Ok(false);
        }
        if !self.enabled(name) {
            debug!("Enabling {} {}", self.kind, name);
            self.enabled.push(name.to_string());
        }
        Ok(true)
    }

    /// Applies every request; stops at the first missing required capability.
    pub fn resolve(&mut self, requests: &CapabilityRequests) -> Result<()> {
        for (name, requirement) in requests.iter() {
            self.add(name, requirement.is_required())?;
        }
        Ok(())
    }

    /// Freezes the accepted set.
    pub fn freeze(self) -> Result<EnabledCapabilities> {
        EnabledCapabilities::new(self.kind, self.enabled)
    }
}

/// The frozen, accepted capability set, ready to be passed to a create-info struct.
#[derive(Debug, Clone)]
pub struct EnabledCapabilities {
    kind: CapabilityKind,
    names: Vec<CString>,
}

impl EnabledCapabilities {
    fn new(kind: CapabilityKind, names: Vec<String>) -> Result<Self> {
        let names = names.into_iter().map(CString::new).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { kind, names })
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.as_bytes() == name.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &CStr> {
        self.names.iter().map(CString::as_c_str)
    }

    /// Raw pointers into this set. The pointers live as long as `self`.
    pub fn as_ptrs(&self) -> Vec<*const c_char> {
        self.names.iter().map(|n| n.as_ptr()).collect()
    }
}

fn name_from_raw(raw: &[c_char]) -> String {
    // Driver-reported names are NUL-terminated inside a fixed-size array.
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy().into_owned()
}
