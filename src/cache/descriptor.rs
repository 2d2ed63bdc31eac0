//! Program descriptor files (`program<N>.inf`)

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::params::ParamFile;
use std::fmt;

pub const KEY_NUMBER: &str = "NUMBER";
pub const KEY_MD5: &str = "MD5";
pub const KEY_OPTIONS: &str = "OPTIONS";
pub const KEY_DEVICE: &str = "DEVICE";
pub const KEY_PLATFORM: &str = "PLATFORM";
pub const KEY_DATE: &str = "DATE";

/// Timestamp format of the `DATE` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identity of one cached program build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Program ordinal this build was created for.
    pub number: usize,
    pub hash: ContentHash,
    pub options: Option<String>,
    pub device: String,
    pub platform: String,
    pub date: String,
}

/// Normalize build options: surrounding whitespace is dropped and an empty
/// string means no options.
pub fn normalize_options(options: Option<&str>) -> Option<String> {
    options
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
}

pub fn timestamp_now() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

impl Descriptor {
    /// True when a cached binary built for `self` may serve `other`.
    pub fn same_content(&self, other: &Descriptor) -> bool {
        self.hash == other.hash
            && self.device == other.device
            && self.platform == other.platform
            && self.options == other.options
    }

    pub fn from_params(params: &ParamFile) -> Result<Self> {
        let require = |key: &str| {
            params.get(key).ok_or_else(|| Error::Parse {
                line: 0,
                message: format!("descriptor is missing {key}"),
            })
        };
        let number = require(KEY_NUMBER)?
            .parse::<usize>()
            .map_err(|e| Error::Parse {
                line: 0,
                message: format!("bad {KEY_NUMBER}: {e}"),
            })?;
        let hash = require(KEY_MD5)?
            .parse::<ContentHash>()
            .map_err(|e| Error::Parse {
                line: 0,
                message: e.to_string(),
            })?;
        Ok(Self {
            number,
            hash,
            options: normalize_options(params.get(KEY_OPTIONS)),
            device: require(KEY_DEVICE)?.to_string(),
            platform: require(KEY_PLATFORM)?.to_string(),
            date: params.get(KEY_DATE).unwrap_or_default().to_string(),
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_params(&ParamFile::parse(text)?)
    }

    pub fn to_params(&self) -> ParamFile {
        let mut p = ParamFile::new();
        p.set(KEY_NUMBER, self.number.to_string());
        p.set(KEY_MD5, self.hash.to_string());
        if let Some(options) = &self.options {
            p.set(KEY_OPTIONS, options.clone());
        }
        p.set(KEY_DEVICE, self.device.clone());
        p.set(KEY_PLATFORM, self.platform.clone());
        p.set(KEY_DATE, self.date.clone());
        p
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_params())
    }
}
