//! Device memory type selection and raw allocations.

use crate::device::Device;
use crate::error::{Result, VulkanError};
use ash::vk;
use tracing::debug;

/// Returns the highest memory type index whose bit is set in `type_bits` and whose
/// property flags contain all of `required`.
///
/// Every type is scanned and a later qualifying index replaces an earlier one. There
/// is no fallback to a type with weaker properties.
pub fn select_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    let mut selected = None;
    for (index, memory_type) in memory_properties.memory_types[..count].iter().enumerate() {
        let allowed = type_bits & (1 << index) != 0;
        if allowed && memory_type.property_flags.contains(required) {
            selected = Some(index as u32);
        }
    }
    selected.ok_or(VulkanError::MemoryTypeNotFound { required, type_bits })
}

/// A single `vkAllocateMemory` allocation, freed on drop.
pub struct MemoryBlock<'d> {
    device: &'d Device<'d>,
    raw: vk::DeviceMemory,
    size: vk::DeviceSize,
    type_index: u32,
}

impl<'d> MemoryBlock<'d> {
    /// Allocates exactly `requirements.size` bytes from a type satisfying `properties`.
    pub fn allocate(
        device: &'d Device<'d>,
        requirements: &vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let type_index = select_memory_type(device.memory_properties(), requirements.memory_type_bits, properties)?;
        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);
        let raw = unsafe { device.raw().allocate_memory(&allocate_info, None) }
            .map_err(VulkanError::creation("DeviceMemory"))?;
        debug!(
            "Allocated {} bytes from memory type {} ({:?}).",
            requirements.size, type_index, properties
        );
        Ok(Self {
            device,
            raw,
            size: requirements.size,
            type_index,
        })
    }

    pub fn raw(&self) -> vk::DeviceMemory {
        self.raw
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    pub(crate) fn device(&self) -> &'d Device<'d> {
        self.device
    }
}

impl Drop for MemoryBlock<'_> {
    fn drop(&mut self) {
        unsafe { self.device.raw().free_memory(self.raw, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
            slot.heap_index = 0;
        }
        props
    }

    #[test]
    fn picks_the_last_qualifying_type() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(select_memory_type(&props, 0b1111, HOST).unwrap(), 2);
        assert_eq!(select_memory_type(&props, 0b0011, HOST).unwrap(), 1);
    }

    #[test]
    fn respects_type_bits() {
        let props = properties(&[HOST, HOST, HOST]);
        assert_eq!(select_memory_type(&props, 0b001, HOST).unwrap(), 0);
        assert_eq!(select_memory_type(&props, 0b101, HOST).unwrap(), 2);
    }

    #[test]
    fn requires_a_superset_of_flags() {
        let props = properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE, vk::MemoryPropertyFlags::HOST_COHERENT]);
        let err = select_memory_type(&props, 0b11, HOST).unwrap_err();
        match err {
            VulkanError::MemoryTypeNotFound { required, type_bits } => {
                assert_eq!(required, HOST);
                assert_eq!(type_bits, 0b11);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_qualifying_types_fail() {
        let props = properties(&[HOST, HOST]);
        assert!(matches!(
            select_memory_type(&props, 0, HOST),
            Err(VulkanError::MemoryTypeNotFound { .. })
        ));
        assert!(matches!(
            select_memory_type(&properties(&[]), u32::MAX, vk::MemoryPropertyFlags::empty()),
            Err(VulkanError::MemoryTypeNotFound { .. })
        ));
    }

    #[test]
    fn selection_always_satisfies_both_constraints() {
        let flag_set = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            HOST,
            HOST | vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ];
        let props = properties(&flag_set);
        for type_bits in 0..32u32 {
            for required in flag_set {
                match select_memory_type(&props, type_bits, required) {
                    Ok(index) => {
                        assert!(type_bits & (1 << index) != 0);
                        assert!(props.memory_types[index as usize].property_flags.contains(required));
                        let later = (index as usize + 1..flag_set.len())
                            .any(|i| type_bits & (1 << i) != 0 && flag_set[i].contains(required));
                        assert!(!later);
                    }
                    Err(_) => {
                        let any = (0..flag_set.len()).any(|i| type_bits & (1 << i) != 0 && flag_set[i].contains(required));
                        assert!(!any);
                    }
                }
            }
        }
    }
}
