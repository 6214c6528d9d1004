/// Device module - the GPU seam and every type crossing it

pub mod handles;
pub mod types;
pub mod pipeline_state;
pub mod graphics_device;
pub mod presenter;
pub mod shader_loader;

pub use handles::*;
pub use types::*;
pub use pipeline_state::*;
pub use graphics_device::*;
pub use presenter::*;
pub use shader_loader::*;

// Mock device, shader loader and presenter for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
