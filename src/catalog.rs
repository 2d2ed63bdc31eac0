//! Platform and device enumeration and selection
//!
//! The catalog holds what enumeration found: names, vendor strings and
//! (with the `opencl` feature) the driver handles. Selection only looks at
//! the strings, so catalogs can also be assembled by hand.

use crate::error::{Error, Result};
use crate::vendor::Vendor;
use std::fmt;

#[derive(Debug, Clone)]
pub struct DeviceEntry<D> {
    pub name: String,
    pub vendor: String,
    /// Driver-reported device type, e.g. `GPU` or `CPU`.
    pub kind: String,
    pub handle: D,
}

#[derive(Debug, Clone)]
pub struct PlatformEntry<P, D> {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub handle: P,
    pub devices: Vec<DeviceEntry<D>>,
}

/// Result of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub platform: usize,
    pub device: usize,
    pub platform_vendor: Vendor,
    pub device_vendor: Vendor,
}

#[derive(Debug, Clone)]
pub struct DeviceCatalog<P, D> {
    platforms: Vec<PlatformEntry<P, D>>,
}

impl<P, D> DeviceCatalog<P, D> {
    pub fn from_platforms(platforms: Vec<PlatformEntry<P, D>>) -> Self {
        Self { platforms }
    }

    pub fn platforms(&self) -> &[PlatformEntry<P, D>] {
        &self.platforms
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }

    pub fn device_count(&self, platform: usize) -> usize {
        self.platforms.get(platform).map_or(0, |p| p.devices.len())
    }

    /// First platform/device pair whose vendor strings match both filters.
    pub fn auto_select(&self, platform_vendor: Vendor, device_vendor: Vendor) -> Result<Selection> {
        if self.platforms.is_empty() {
            return Err(Error::NoPlatform);
        }
        for (pi, platform) in self.platforms.iter().enumerate() {
            if !platform_vendor.matches(&platform.vendor) && !platform_vendor.matches(&platform.name) {
                continue;
            }
            if let Some(di) = platform
                .devices
                .iter()
                .position(|d| device_vendor.matches(&d.vendor))
            {
                return self.select(pi, di);
            }
        }
        Err(Error::NoDevice)
    }

    /// Select by index, validating both indices against what was enumerated.
    pub fn select(&self, platform: usize, device: usize) -> Result<Selection> {
        if self.platforms.is_empty() {
            return Err(Error::NoPlatform);
        }
        let p = self.platforms.get(platform).ok_or_else(|| {
            Error::DeviceInitFailed(format!(
                "platform index {platform} out of range ({} platforms)",
                self.platforms.len()
            ))
        })?;
        let d = p.devices.get(device).ok_or(Error::NoDevice)?;
        Ok(Selection {
            platform,
            device,
            platform_vendor: Vendor::classify(&p.vendor),
            device_vendor: Vendor::classify(&d.vendor),
        })
    }

    pub fn entry(&self, selection: Selection) -> Option<(&PlatformEntry<P, D>, &DeviceEntry<D>)> {
        let p = self.platforms.get(selection.platform)?;
        Some((p, p.devices.get(selection.device)?))
    }
}

impl<P, D> fmt::Display for DeviceCatalog<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.platforms.is_empty() {
            return writeln!(f, "No OpenCL platforms found");
        }
        for (pi, p) in self.platforms.iter().enumerate() {
            writeln!(
                f,
                "Platform {pi}: {} [{}] ({}, {})",
                p.name,
                Vendor::classify(&p.vendor),
                p.vendor,
                p.version
            )?;
            if p.devices.is_empty() {
                writeln!(f, "  (no devices)")?;
            }
            for (di, d) in p.devices.iter().enumerate() {
                writeln!(
                    f,
                    "  Device {di}: {} [{}] {} ({})",
                    d.name,
                    Vendor::classify(&d.vendor),
                    d.kind,
                    d.vendor
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "opencl")]
pub type OclCatalog = DeviceCatalog<ocl::Platform, ocl::Device>;

#[cfg(feature = "opencl")]
impl DeviceCatalog<ocl::Platform, ocl::Device> {
    /// Enumerate every platform and all devices on each.
    pub fn enumerate() -> Result<Self> {
        use ocl::core::{DeviceInfo, DeviceInfoResult};
        use ocl::{Device, Platform};

        let mut platforms = Vec::new();
        for platform in Platform::list() {
            let mut devices = Vec::new();
            for device in Device::list_all(platform)? {
                let kind = match device.info(DeviceInfo::Type) {
                    Ok(DeviceInfoResult::Type(t)) => format!("{t:?}"),
                    _ => "unknown".to_string(),
                };
                devices.push(DeviceEntry {
                    name: device.name()?,
                    vendor: device.vendor()?,
                    kind,
                    handle: device,
                });
            }
            platforms.push(PlatformEntry {
                name: platform.name()?,
                vendor: platform.vendor()?,
                version: platform.version()?,
                handle: platform,
                devices,
            });
        }
        log::debug!("enumerated {} OpenCL platforms", platforms.len());
        Ok(Self { platforms })
    }
}
