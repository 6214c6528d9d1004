/// Shader bytecode loading

use std::path::{Path, PathBuf};
use crate::error::{Error, Result};

/// Resolves a compiled shader path to SPIR-V bytes
pub trait ShaderLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Loads shaders from the filesystem, relative to a root directory
#[derive(Debug, Clone, Default)]
pub struct FileShaderLoader {
    root: PathBuf,
}

impl FileShaderLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderLoader for FileShaderLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let full_path = self.root.join(path);
        let bytes = std::fs::read(&full_path).map_err(|e| {
            crate::engine_error!("pixelate::ShaderLoader", "Failed to read '{}': {}", full_path.display(), e);
            Error::ShaderLoadFailed(format!("{}: {}", full_path.display(), e))
        })?;

        // SPIR-V is a stream of 32-bit words
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            crate::engine_error!("pixelate::ShaderLoader",
                "'{}' is not SPIR-V ({} bytes)", full_path.display(), bytes.len());
            return Err(Error::ShaderLoadFailed(format!(
                "{}: size {} is not a multiple of 4",
                full_path.display(),
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "shader_loader_tests.rs"]
mod tests;
