//! Error types for the Pixelate engine
//!
//! This module defines the error types shared by the resource caches,
//! the render graph and the backend implementations.

use std::fmt;

/// Result type for Pixelate engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pixelate engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (GPU object creation, submission, recording)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource or precondition violation (bad index, missing queue family, ...)
    InvalidResource(String),

    /// Initialization failed (context, presenter, subsystems)
    InitializationFailed(String),

    /// A blocking wait elapsed before the GPU signaled
    Timeout(String),

    /// Shader bytecode could not be loaded
    ShaderLoadFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::ShaderLoadFailed(msg) => write!(f, "Shader load failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an error and build an `Error::BackendError` from the same message
///
/// # Example
///
/// ```no_run
/// # use pixelate_engine::engine_err;
/// let err = engine_err!("pixelate::vulkan", "Failed to create fence: {}", -4);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::pixelate::Error::BackendError(message)
    }};
}

/// Log a warning and build an `Error::BackendError` from the same message
#[macro_export]
macro_rules! engine_warn_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_warn!($source, "{}", message);
        $crate::pixelate::Error::BackendError(message)
    }};
}

/// Log an error and return early with `Error::BackendError`
///
/// # Example
///
/// ```no_run
/// # use pixelate_engine::engine_bail;
/// fn check(count: u32) -> pixelate_engine::pixelate::Result<()> {
///     if count == 0 {
///         engine_bail!("pixelate::Example", "count must be non-zero");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log an error and return early with `Error::InvalidResource`
///
/// Used for precondition violations (out-of-range index, missing queue family).
#[macro_export]
macro_rules! engine_bail_invalid {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        return Err($crate::pixelate::Error::InvalidResource(message));
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
