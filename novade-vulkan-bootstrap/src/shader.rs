use crate::device::Device;
use crate::error::{Result, VulkanError};
use ash::util::read_spv;
use ash::vk;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decodes a SPIR-V blob into words. Only length, alignment and the magic number are checked.
pub fn parse_bytecode(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    let invalid = |message: String| VulkanError::InvalidBytecode {
        path: path.to_path_buf(),
        message,
    };
    let words = read_spv(&mut Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(word) => Err(invalid(format!("bad magic number {:#010x}", word))),
        None => Err(invalid("empty bytecode".to_string())),
    }
}

/// Reads a whole SPIR-V file.
pub fn read_bytecode(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    parse_bytecode(path, &bytes)
}

pub struct ShaderModule<'d> {
    device: &'d Device<'d>,
    raw: vk::ShaderModule,
}

impl<'d> ShaderModule<'d> {
    pub fn from_words(device: &'d Device<'d>, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let raw = unsafe { device.raw().create_shader_module(&create_info, None) }
            .map_err(VulkanError::creation("ShaderModule"))?;
        Ok(Self { device, raw })
    }

    pub fn load(device: &'d Device<'d>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let code = read_bytecode(path)?;
        debug!("Loaded {} SPIR-V words from {:?}.", code.len(), path);
        Self::from_words(device, &code)
    }

    pub fn raw(&self) -> vk::ShaderModule {
        self.raw
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_shader_module(self.raw, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_word_aligned_blob_with_magic() {
        let bytes = blob(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_bytecode(Path::new("tri.vert.spv"), &bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_misaligned_length() {
        let mut bytes = blob(&[SPIRV_MAGIC, 0]);
        bytes.push(0);
        let err = parse_bytecode(Path::new("odd.spv"), &bytes).unwrap_err();
        match err {
            VulkanError::InvalidBytecode { path, .. } => assert_eq!(path, Path::new("odd.spv")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_magic_and_empty_input() {
        assert!(matches!(
            parse_bytecode(Path::new("x.spv"), &blob(&[0xdead_beef, 0])),
            Err(VulkanError::InvalidBytecode { .. })
        ));
        assert!(matches!(
            parse_bytecode(Path::new("x.spv"), &[]),
            Err(VulkanError::InvalidBytecode { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            read_bytecode("/nonexistent/shader.spv"),
            Err(VulkanError::Io(_))
        ));
    }
}
