//! Error types for device runtime operations

use crate::buffer::BufferId;
use crate::kernel::KernelId;
use thiserror::Error;

/// Errors raised by the device runtime.
///
/// Device-side failures (`NoPlatform` through `ApiCallFailed`) are fatal for a
/// simulation run and are meant to be handed to
/// [`ResourceManager::fail`](crate::ResourceManager::fail) when the `opencl`
/// feature is enabled. Lookup failures are ordinary values the caller may
/// recover from.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no OpenCL platform found")]
    NoPlatform,

    #[error("no matching OpenCL device found")]
    NoDevice,

    #[error("device initialization failed: {0}")]
    DeviceInitFailed(String),

    #[error("unknown buffer id {0}")]
    NoBuffer(BufferId),

    #[error("unknown kernel id {0}")]
    NoKernel(KernelId),

    /// Program ordinal outside `1..=count`.
    #[error("program {ordinal} does not exist ({count} programs created)")]
    NoProgram { ordinal: usize, count: usize },

    #[error("no active program")]
    NoActiveProgram,

    /// Compilation or link failure, carrying the driver's build log.
    #[error("program build failed:\n{log}")]
    CompileFailed { log: String },

    #[error("OpenCL call failed: {0}")]
    ApiCallFailed(String),

    #[error("kernel '{kernel}' takes {arity} arguments, cannot bind position {index}")]
    ArgumentOverflow {
        kernel: String,
        index: u32,
        arity: u32,
    },

    #[error("kernel '{kernel}' has {bound} of {arity} arguments bound")]
    ArgumentsIncomplete {
        kernel: String,
        bound: u32,
        arity: u32,
    },

    #[error("buffer {0} is not mapped")]
    NotMapped(BufferId),

    #[error("buffer {0} has no device storage")]
    BufferReleased(BufferId),

    #[error("buffer {id} holds {actual} bytes, requested view needs {expected}")]
    TypeMismatch {
        id: BufferId,
        expected: usize,
        actual: usize,
    },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("timer slot {0} out of range")]
    InvalidTimer(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit status used by the fail-fast driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoPlatform => 2,
            Error::NoDevice => 3,
            Error::DeviceInitFailed(_) => 4,
            Error::CompileFailed { .. } => 5,
            Error::ApiCallFailed(_) => 6,
            Error::Io(_) => 7,
            _ => 1,
        }
    }

    /// True for failures that invalidate the whole run.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Error::NoPlatform
                | Error::NoDevice
                | Error::DeviceInitFailed(_)
                | Error::CompileFailed { .. }
                | Error::ApiCallFailed(_)
        )
    }
}

#[cfg(feature = "opencl")]
impl From<ocl::Error> for Error {
    fn from(e: ocl::Error) -> Self {
        Self::ApiCallFailed(e.to_string())
    }
}

#[cfg(feature = "opencl")]
impl From<ocl::core::Error> for Error {
    fn from(e: ocl::core::Error) -> Self {
        Self::ApiCallFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_failures_are_classified() {
        assert!(Error::NoDevice.is_device_failure());
        assert!(Error::CompileFailed { log: String::new() }.is_device_failure());
        assert!(!Error::NoBuffer(BufferId::new(3)).is_device_failure());
        assert!(
            !Error::NoProgram {
                ordinal: 4,
                count: 2
            }
            .is_device_failure()
        );
    }

    #[test]
    fn test_exit_codes_are_nonzero() {
        let errors = [
            Error::NoPlatform,
            Error::NoDevice,
            Error::DeviceInitFailed("x".into()),
            Error::ApiCallFailed("CL_OUT_OF_RESOURCES".into()),
            Error::NoActiveProgram,
        ];
        for e in &errors {
            assert_ne!(e.exit_code(), 0, "{e}");
        }
    }

    #[test]
    fn test_display_includes_build_log() {
        let e = Error::CompileFailed {
            log: "error: use of undeclared identifier 'x'".into(),
        };
        assert!(e.to_string().contains("undeclared identifier"));
    }
}
