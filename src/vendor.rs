//! Vendor classification for platforms and devices

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// Hardware vendor, used both as a classification and as a selection filter.
///
/// As a filter, `Any` accepts every vendor string. As a classification,
/// vendor strings that match none of the known names become `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Vendor {
    Amd,
    Apple,
    Nvidia,
    Intel,
    #[default]
    Any,
    Other,
}

impl Vendor {
    const KNOWN: [Vendor; 4] = [Vendor::Amd, Vendor::Apple, Vendor::Nvidia, Vendor::Intel];

    fn patterns(self) -> &'static [&'static str] {
        match self {
            Vendor::Amd => &["advanced micro devices", "amd"],
            Vendor::Apple => &["apple"],
            Vendor::Nvidia => &["nvidia"],
            Vendor::Intel => &["intel"],
            Vendor::Any | Vendor::Other => &[],
        }
    }

    /// Substring match of a platform/device vendor string against this filter.
    pub fn matches(self, vendor: &str) -> bool {
        if self == Vendor::Any {
            return true;
        }
        let lower = vendor.to_ascii_lowercase();
        self.patterns().iter().any(|p| lower.contains(p))
    }

    pub fn classify(vendor: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|v| v.matches(vendor))
            .unwrap_or(Vendor::Other)
    }

    /// Hard workgroup cap imposed for this vendor, if any.
    pub fn local_size_cap(self) -> Option<usize> {
        match self {
            Vendor::Amd => Some(64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Vendor::Amd => "AMD",
            Vendor::Apple => "Apple",
            Vendor::Nvidia => "NVIDIA",
            Vendor::Intel => "Intel",
            Vendor::Any => "Any",
            Vendor::Other => "Other",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Vendor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amd" | "ati" => Ok(Vendor::Amd),
            "apple" => Ok(Vendor::Apple),
            "nvidia" => Ok(Vendor::Nvidia),
            "intel" => Ok(Vendor::Intel),
            "any" | "" => Ok(Vendor::Any),
            other => Err(Error::InvalidConfig(format!("unknown vendor '{other}'"))),
        }
    }
}
