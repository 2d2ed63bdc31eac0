//! Selected device: identity, capabilities and the OpenCL context/queue

use crate::vendor::Vendor;
use std::fmt;

/// Capabilities and names of the selected device. Immutable after selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub platform_name: String,
    pub device_name: String,
    pub platform_vendor: Vendor,
    pub device_vendor: Vendor,
    pub local_mem_size: u64,
    pub max_constant_size: u64,
    pub max_alloc_size: u64,
    pub max_image_width: usize,
    pub max_workgroup_size: usize,
    /// Base address alignment in bits.
    pub mem_align_bits: u32,
    pub compute_units: u32,
    pub driver_version: String,
    pub fp64: bool,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Platform:        {} [{}]", self.platform_name, self.platform_vendor)?;
        writeln!(f, "Device:          {} [{}]", self.device_name, self.device_vendor)?;
        writeln!(f, "Driver:          {}", self.driver_version)?;
        writeln!(f, "Compute units:   {}", self.compute_units)?;
        writeln!(f, "Local memory:    {} bytes", self.local_mem_size)?;
        writeln!(f, "Max constant:    {} bytes", self.max_constant_size)?;
        writeln!(f, "Max allocation:  {} bytes", self.max_alloc_size)?;
        writeln!(f, "Max image width: {}", self.max_image_width)?;
        writeln!(f, "Max workgroup:   {}", self.max_workgroup_size)?;
        writeln!(f, "Mem alignment:   {} bits", self.mem_align_bits)?;
        write!(f, "Double precision: {}", if self.fp64 { "yes" } else { "no" })
    }
}

#[cfg(feature = "opencl")]
pub use native::OpenCLDevice;

#[cfg(feature = "opencl")]
mod native {
    use super::DeviceIdentity;
    use crate::catalog::{OclCatalog, Selection};
    use crate::error::{Error, Result};
    use ocl::core::{DeviceInfo, DeviceInfoResult};
    use ocl::flags::CommandQueueProperties;
    use ocl::{Context, Device, Platform, Queue};

    /// The one device a manager drives, with its context and in-order queue.
    pub struct OpenCLDevice {
        // queue before context: fields drop in declaration order
        queue: Queue,
        context: Context,
        device: Device,
        platform: Platform,
        identity: DeviceIdentity,
        profiling: bool,
    }

    fn unexpected(what: &str, result: &DeviceInfoResult) -> Error {
        Error::DeviceInitFailed(format!("unexpected {what} query result: {result:?}"))
    }

    fn query_identity(catalog: &OclCatalog, selection: Selection) -> Result<DeviceIdentity> {
        let (platform, entry) = catalog.entry(selection).ok_or(Error::NoDevice)?;
        let device = entry.handle;

        let local_mem_size = match device.info(DeviceInfo::LocalMemSize)? {
            DeviceInfoResult::LocalMemSize(n) => n,
            other => return Err(unexpected("local memory", &other)),
        };
        let max_constant_size = match device.info(DeviceInfo::MaxConstantBufferSize)? {
            DeviceInfoResult::MaxConstantBufferSize(n) => n,
            other => return Err(unexpected("constant buffer", &other)),
        };
        let max_alloc_size = match device.info(DeviceInfo::MaxMemAllocSize)? {
            DeviceInfoResult::MaxMemAllocSize(n) => n,
            other => return Err(unexpected("allocation size", &other)),
        };
        let max_image_width = match device.info(DeviceInfo::Image2dMaxWidth)? {
            DeviceInfoResult::Image2dMaxWidth(n) => n,
            other => return Err(unexpected("image width", &other)),
        };
        let mem_align_bits = match device.info(DeviceInfo::MemBaseAddrAlign)? {
            DeviceInfoResult::MemBaseAddrAlign(n) => n,
            other => return Err(unexpected("alignment", &other)),
        };
        let compute_units = match device.info(DeviceInfo::MaxComputeUnits)? {
            DeviceInfoResult::MaxComputeUnits(n) => n,
            other => return Err(unexpected("compute units", &other)),
        };
        let extensions = match device.info(DeviceInfo::Extensions) {
            Ok(DeviceInfoResult::Extensions(s)) => s,
            _ => String::new(),
        };
        let driver_version = match device.info(DeviceInfo::DriverVersion) {
            Ok(DeviceInfoResult::DriverVersion(s)) => s,
            _ => String::new(),
        };

        Ok(DeviceIdentity {
            // some runtimes pad names with spaces
            platform_name: platform.name.trim().to_string(),
            device_name: entry.name.trim().to_string(),
            platform_vendor: selection.platform_vendor,
            device_vendor: selection.device_vendor,
            local_mem_size,
            max_constant_size,
            max_alloc_size,
            max_image_width,
            max_workgroup_size: device.max_wg_size()?,
            mem_align_bits,
            compute_units,
            driver_version,
            fp64: extensions.contains("cl_khr_fp64"),
        })
    }

    impl OpenCLDevice {
        /// Open the selected device: query its capabilities, then create a
        /// context and an in-order queue (with profiling when requested).
        pub fn open(catalog: &OclCatalog, selection: Selection, profiling: bool) -> Result<Self> {
            let (platform_entry, device_entry) =
                catalog.entry(selection).ok_or(Error::NoDevice)?;
            let platform = platform_entry.handle;
            let device = device_entry.handle;
            let identity = query_identity(catalog, selection)?;

            let context = Context::builder()
                .platform(platform)
                .devices(device)
                .build()
                .map_err(|e| Error::DeviceInitFailed(e.to_string()))?;

            let properties = profiling.then_some(CommandQueueProperties::PROFILING_ENABLE);
            let queue = Queue::new(&context, device, properties)
                .map_err(|e| Error::DeviceInitFailed(e.to_string()))?;

            log::info!(
                "selected device {} on platform {}",
                identity.device_name,
                identity.platform_name
            );

            Ok(Self {
                queue,
                context,
                device,
                platform,
                identity,
                profiling,
            })
        }

        pub fn identity(&self) -> &DeviceIdentity {
            &self.identity
        }

        pub fn context(&self) -> &Context {
            &self.context
        }

        pub fn queue(&self) -> &Queue {
            &self.queue
        }

        pub fn device(&self) -> Device {
            self.device
        }

        pub fn platform(&self) -> Platform {
            self.platform
        }

        pub fn profiling(&self) -> bool {
            self.profiling
        }

        /// Block until every enqueued command has completed.
        pub fn finish(&self) -> Result<()> {
            self.queue.finish()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_report() {
        let id = DeviceIdentity {
            platform_name: "NVIDIA CUDA".to_string(),
            device_name: "GeForce GTX 980".to_string(),
            platform_vendor: Vendor::Nvidia,
            device_vendor: Vendor::Nvidia,
            local_mem_size: 49152,
            max_constant_size: 65536,
            max_alloc_size: 1 << 30,
            max_image_width: 16384,
            max_workgroup_size: 1024,
            mem_align_bits: 4096,
            compute_units: 16,
            driver_version: "367.57".to_string(),
            fp64: true,
        };
        let text = id.to_string();
        assert!(text.contains("GeForce GTX 980 [NVIDIA]"));
        assert!(text.contains("Local memory:    49152 bytes"));
        assert!(text.ends_with("Double precision: yes"));
    }
}

#[cfg(all(test, feature = "opencl"))]
mod opencl_tests {
    use crate::catalog::OclCatalog;
    use crate::device::OpenCLDevice;
    use crate::vendor::Vendor;

    #[test]
    fn test_open_first_device() {
        let Ok(catalog) = OclCatalog::enumerate() else {
            println!("OpenCL not available, skipping test");
            return;
        };
        let Ok(selection) = catalog.auto_select(Vendor::Any, Vendor::Any) else {
            println!("No OpenCL device available, skipping test");
            return;
        };
        let device = OpenCLDevice::open(&catalog, selection, true).unwrap();
        let id = device.identity();
        assert!(!id.device_name.is_empty());
        assert!(id.max_workgroup_size >= 1);
        println!("{id}");
    }
}
