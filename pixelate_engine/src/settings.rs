//! Renderer configuration

use std::path::PathBuf;
use crate::device::Format;
use crate::error::{Error, Result};

/// Default number of frames whose GPU work may overlap
pub const MAX_FRAMES_IN_FLIGHT: u32 = 2;

/// Tunables shared by the caches, the render graph and the frame driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Frames that may be in flight at once (>= 1)
    pub max_frames_in_flight: u32,
    /// Size of the first command buffer batch allocated for a pool key
    pub command_buffer_initial_batch: u32,
    /// Multiplier applied to the batch size after each allocation
    pub command_buffer_growth_factor: u32,
    /// Directory prepended to pipeline shader paths
    pub shader_directory: PathBuf,
    /// Timeout used when the frame driver waits on a frame slot
    pub fence_wait_timeout_ns: u64,
    /// Surface format requested from the bootstrap layer
    pub preferred_surface_format: Format,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            command_buffer_initial_batch: 8,
            command_buffer_growth_factor: 2,
            shader_directory: PathBuf::from("shaders"),
            fence_wait_timeout_ns: u64::MAX,
            preferred_surface_format: Format::R8G8B8A8_SRGB,
        }
    }
}

impl RenderSettings {
    /// Reject settings the caches cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 {
            return Err(Error::InitializationFailed("max_frames_in_flight must be at least 1".to_string()));
        }
        if self.command_buffer_initial_batch == 0 {
            return Err(Error::InitializationFailed("command_buffer_initial_batch must be at least 1".to_string()));
        }
        if self.command_buffer_growth_factor == 0 {
            return Err(Error::InitializationFailed("command_buffer_growth_factor must be at least 1".to_string()));
        }
        Ok(())
    }
}
