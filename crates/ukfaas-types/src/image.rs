//! Metadata describing a pulled unikernel image.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Virtual-machine monitor a target is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kvm,
    Firecracker,
}

impl Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Kvm => write!(f, "kvm"),
            Platform::Firecracker => write!(f, "fc"),
        }
    }
}

/// Unknown platform name.
#[derive(Debug, Error)]
#[error("platform {0} not supported")]
pub struct PlatformParseError(String);

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kvm" | "qemu" => Ok(Platform::Kvm),
            "fc" | "firecracker" => Ok(Platform::Firecracker),
            other => Err(PlatformParseError(other.to_string())),
        }
    }
}

/// Build-time configuration baked into a unikernel image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KConfig(BTreeMap<String, String>);

impl KConfig {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True when any of the given options is set to `y`.
    pub fn any_yes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.get(k) == Some("y"))
    }
}

impl FromIterator<(String, String)> for KConfig {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What a successful image pull resolves to: everything the machine service
/// needs to boot the unikernel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageTarget {
    /// Image reference the target was resolved from.
    pub image: String,

    /// Path of the unpacked kernel image.
    pub kernel: PathBuf,

    /// Optional initial ramdisk.
    pub initrd: Option<PathBuf>,

    /// CPU architecture, e.g. `x86_64`.
    pub architecture: String,

    /// Platform the image was built for.
    pub platform: Option<Platform>,

    /// Application arguments baked into the image.
    pub command: Vec<String>,

    /// Unikernel build configuration.
    pub kconfig: KConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("kvm", Platform::Kvm)]
    #[test_case("qemu", Platform::Kvm)]
    #[test_case("fc", Platform::Firecracker)]
    #[test_case("firecracker", Platform::Firecracker)]
    fn test_platform_from_str(name: &str, expected: Platform) {
        assert_eq!(name.parse::<Platform>().unwrap(), expected);
    }

    #[test]
    fn test_platform_unknown_rejected() {
        assert!("xen".parse::<Platform>().is_err());
    }

    #[test]
    fn test_kconfig_any_yes() {
        let mut kconfig = KConfig::new();
        kconfig.set("CONFIG_LIBVFSCORE_AUTOMOUNT_UP", "y");
        kconfig.set("CONFIG_DEBUG", "n");

        assert!(kconfig.any_yes(&["CONFIG_LIBVFSCORE_AUTOMOUNT_UP"]));
        assert!(!kconfig.any_yes(&["CONFIG_DEBUG", "CONFIG_MISSING"]));
    }
}
