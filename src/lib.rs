//! latticecl: OpenCL device runtime for lattice gauge simulations
//!
//! One [`ResourceManager`] drives one device: it selects the device, turns
//! kernel source into programs through a cache that persists compiled
//! binaries across runs, creates kernels and typed buffers, and times every
//! device command.
//!
//! # Architecture
//!
//! - **cache**: compile-or-load program cache with a dense on-disk slot index
//! - **catalog** / **device** / **vendor**: platform enumeration, selection,
//!   capability query and vendor classification
//! - **kernel** / **buffer**: arena tables addressed by 1-based typed ids
//! - **timer**: host stopwatches and device event statistics
//! - **params** / **config**: `KEY=VALUE` files and explicit manager settings
//!
//! # Feature Flags
//!
//! - `opencl`: link against OpenCL and enable the manager, the device tables
//!   and the `latticecl-info` binary. Everything else builds without it.

// ============================================================================
// Core Modules
// ============================================================================

pub mod bitcast;
pub mod buffer;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod hash;
pub mod kernel;
pub mod params;
pub mod source;
pub mod timer;
pub mod vendor;

mod handle;

// ============================================================================
// OpenCL Modules
// ============================================================================

#[cfg(feature = "opencl")]
pub mod compiler;
#[cfg(feature = "opencl")]
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use buffer::{BufferId, BufferKind};
pub use cache::{BuildStatus, ProgramCache, ProgramCompiler, ProgramId};
pub use config::{DebugFlags, ManagerConfig};
pub use device::DeviceIdentity;
pub use error::{Error, Result};
pub use kernel::{ArgPosition, KernelId, ScalarArg};
pub use timer::{TimingAccumulator, TimingStat};
pub use vendor::Vendor;

#[cfg(feature = "opencl")]
pub use manager::ResourceManager;

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::buffer::{BufferId, BufferKind};
    pub use crate::cache::ProgramId;
    pub use crate::config::ManagerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::kernel::{KernelId, ScalarArg};
    pub use crate::vendor::Vendor;

    #[cfg(feature = "opencl")]
    pub use crate::manager::ResourceManager;
}
