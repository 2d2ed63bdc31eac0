//! Manager configuration
//!
//! Everything that used to be process-wide state (debug switches, the
//! working path for cache files) is an explicit value owned by each manager.

use crate::error::{Error, Result};
use crate::params::ParamFile;
use crate::vendor::Vendor;
use std::path::PathBuf;

/// Overrides the cache directory.
pub const ENV_CACHE_DIR: &str = "LATTICECL_CACHE_DIR";
/// Disables the on-disk program cache when set.
pub const ENV_NO_CACHE: &str = "LATTICECL_NO_CACHE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Log every build log at info level, not only on failure.
    pub build_log: bool,
    /// Write each compiled source next to the cache files.
    pub dump_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory holding `program<N>.inf` / `program<N>.bin`.
    pub cache_dir: PathBuf,
    pub use_cache: bool,
    /// Create the queue with profiling and time every command.
    pub profiling: bool,
    pub platform_vendor: Vendor,
    pub device_vendor: Vendor,
    /// Explicit platform index; when set together with `device_index`,
    /// vendor filters are ignored.
    pub platform_index: Option<usize>,
    pub device_index: Option<usize>,
    /// Upper bound applied to every derived local size.
    pub max_local_size: Option<usize>,
    /// Where the fail-fast driver writes its dump files.
    pub diagnostics_dir: PathBuf,
    pub debug: DebugFlags,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("."),
            use_cache: true,
            profiling: true,
            platform_vendor: Vendor::Any,
            device_vendor: Vendor::Any,
            platform_index: None,
            device_index: None,
            max_local_size: None,
            diagnostics_dir: PathBuf::from("."),
            debug: DebugFlags::default(),
        }
    }
}

impl ManagerConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn with_vendors(mut self, platform: Vendor, device: Vendor) -> Self {
        self.platform_vendor = platform;
        self.device_vendor = device;
        self
    }

    pub fn with_device(mut self, platform_index: usize, device_index: usize) -> Self {
        self.platform_index = Some(platform_index);
        self.device_index = Some(device_index);
        self
    }

    pub fn with_max_local_size(mut self, size: usize) -> Self {
        self.max_local_size = Some(size);
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }

    /// Build from a run-parameter file. Absent keys keep their defaults.
    pub fn from_params(params: &ParamFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(dir) = params.get("CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(dir);
        }
        if let Some(v) = params.get_flag("USE_CACHE")? {
            cfg.use_cache = v;
        }
        if let Some(v) = params.get_flag("PROFILING")? {
            cfg.profiling = v;
        }
        if let Some(v) = params.get_parsed::<Vendor>("PLATFORM_VENDOR")? {
            cfg.platform_vendor = v;
        }
        if let Some(v) = params.get_parsed::<Vendor>("DEVICE_VENDOR")? {
            cfg.device_vendor = v;
        }
        cfg.platform_index = params.get_parsed("PLATFORM")?;
        cfg.device_index = params.get_parsed("DEVICE")?;
        cfg.max_local_size = params.get_parsed("MAX_LOCAL_SIZE")?;
        if let Some(dir) = params.get("DIAGNOSTICS_DIR") {
            cfg.diagnostics_dir = PathBuf::from(dir);
        }
        if let Some(v) = params.get_flag("DEBUG_BUILD_LOG")? {
            cfg.debug.build_log = v;
        }
        if let Some(v) = params.get_flag("DEBUG_DUMP_SOURCE")? {
            cfg.debug.dump_source = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `LATTICECL_CACHE_DIR` and `LATTICECL_NO_CACHE`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir);
        }
        if std::env::var(ENV_NO_CACHE).is_ok() {
            self.use_cache = false;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.platform_index.is_some() != self.device_index.is_some() {
            return Err(Error::InvalidConfig(
                "PLATFORM and DEVICE must be given together".to_string(),
            ));
        }
        if self.max_local_size == Some(0) {
            return Err(Error::InvalidConfig(
                "MAX_LOCAL_SIZE must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
