//! Host-visible buffers filled through a map/copy/unmap upload.
//!
//! A buffer starts life as an [`UnboundBuffer`]. Only [`UnboundBuffer::bind`] produces a
//! [`Buffer`], and only a `Buffer` can be mapped, so writing through unbound memory does
//! not type-check.

use crate::device::{Device, SharingMode};
use crate::error::{Result, VulkanError};
use crate::memory::MemoryBlock;
use ash::vk;
use bytemuck::Pod;
use std::ffi::c_void;
use std::slice;
use tracing::debug;

/// Memory properties used for upload buffers.
pub const UPLOAD_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

struct BufferHandle<'d> {
    device: &'d Device<'d>,
    raw: vk::Buffer,
}

impl Drop for BufferHandle<'_> {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_buffer(self.raw, None) };
    }
}

/// A created buffer with no memory bound yet.
pub struct UnboundBuffer<'d> {
    handle: BufferHandle<'d>,
    size: vk::DeviceSize,
    requirements: vk::MemoryRequirements,
}

impl<'d> UnboundBuffer<'d> {
    pub fn new(device: &'d Device<'d>, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Result<Self> {
        let SharingMode {
            mode,
            queue_family_indices,
        } = device.queue_families().sharing();
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(mode)
            .queue_family_indices(&queue_family_indices);
        let raw = unsafe { device.raw().create_buffer(&create_info, None) }
            .map_err(VulkanError::creation("Buffer"))?;
        let handle = BufferHandle { device, raw };
        let requirements = unsafe { device.raw().get_buffer_memory_requirements(raw) };
        Ok(Self {
            handle,
            size,
            requirements,
        })
    }

    pub fn raw(&self) -> vk::Buffer {
        self.handle.raw
    }

    pub fn requirements(&self) -> &vk::MemoryRequirements {
        &self.requirements
    }

    /// Allocates the reported requirement size from a type with `properties` and binds it at offset 0.
    pub fn bind(self, properties: vk::MemoryPropertyFlags) -> Result<Buffer<'d>> {
        let device = self.handle.device;
        let memory = MemoryBlock::allocate(device, &self.requirements, properties)?;
        unsafe { device.raw().bind_buffer_memory(self.handle.raw, memory.raw(), 0) }
            .map_err(VulkanError::call("vkBindBufferMemory"))?;
        Ok(Buffer {
            handle: self.handle,
            memory,
            size: self.size,
        })
    }
}

/// A buffer bound 1:1 to its own memory block.
pub struct Buffer<'d> {
    // Declared before `memory` so the buffer is destroyed before its memory is freed.
    handle: BufferHandle<'d>,
    memory: MemoryBlock<'d>,
    size: vk::DeviceSize,
}

impl<'d> Buffer<'d> {
    pub fn raw(&self) -> vk::Buffer {
        self.handle.raw
    }

    pub fn memory(&self) -> &MemoryBlock<'d> {
        &self.memory
    }

    /// Size requested at creation. The backing allocation may be larger.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Maps the whole requested range. The mapping is released when the guard drops.
    pub fn map(&mut self) -> Result<Mapping<'_, 'd>> {
        let raw = self.memory.raw();
        let ptr = unsafe {
            self.memory
                .device()
                .raw()
                .map_memory(raw, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .map_err(VulkanError::call("vkMapMemory"))?;
        Ok(Mapping {
            memory: &self.memory,
            ptr,
            len: self.size as usize,
        })
    }

    /// Copies `data` to the start of the buffer through a temporary mapping. Fails
    /// with [`VulkanError::BufferOverflow`] before mapping if `data` does not fit.
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        check_fits(self.size, bytes.len())?;
        let mut mapping = self.map()?;
        mapping.as_bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

fn check_fits(capacity: vk::DeviceSize, len: usize) -> Result<()> {
    let requested = len as vk::DeviceSize;
    if requested > capacity {
        return Err(VulkanError::BufferOverflow { capacity, requested });
    }
    Ok(())
}

/// A live host mapping of a [`Buffer`]'s memory.
pub struct Mapping<'b, 'd> {
    memory: &'b MemoryBlock<'d>,
    ptr: *mut c_void,
    len: usize,
}

impl Mapping<'_, '_> {
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr as *mut u8, self.len) }
    }
}

impl Drop for Mapping<'_, '_> {
    fn drop(&mut self) {
        unsafe { self.memory.device().raw().unmap_memory(self.memory.raw()) };
    }
}

/// Creates a host-visible, host-coherent buffer of `usage` holding a copy of `data`.
pub fn create_upload_buffer<'d, T: Pod>(
    device: &'d Device<'d>,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<Buffer<'d>> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;
    if size == 0 {
        return Err(VulkanError::ResourceCreation {
            resource: "UploadBuffer",
            result: vk::Result::ERROR_INITIALIZATION_FAILED,
        });
    }
    let mut buffer = UnboundBuffer::new(device, size, usage)?.bind(UPLOAD_MEMORY)?;
    buffer.write(data)?;
    debug!("Upload buffer of {} bytes created for {:?}.", size, usage);
    Ok(buffer)
}
