//! Target machines (operating system + architecture) a library variant is built for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating system of a target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Windows,
    #[serde(rename = "macos")]
    MacOs,
    Android,
}

/// CPU architecture of a target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    Arm,
    Aarch64,
}

/// A target machine: operating system + architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetMachine {
    pub os: OperatingSystem,
    pub arch: Architecture,
}

impl OperatingSystem {
    /// Operating system of the running process.
    pub fn host() -> Option<Self> {
        std::env::consts::OS.parse().ok()
    }

    /// Lowercase name used in manifests and variant names.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Windows => "windows",
            OperatingSystem::MacOs => "macos",
            OperatingSystem::Android => "android",
        }
    }

    /// Value for `CMAKE_SYSTEM_NAME`.
    pub fn cmake_system_name(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "Linux",
            OperatingSystem::Windows => "Windows",
            OperatingSystem::MacOs => "Darwin",
            OperatingSystem::Android => "Android",
        }
    }

    /// Whether shared libraries come with a separate import library.
    pub fn uses_import_libraries(&self) -> bool {
        matches!(self, OperatingSystem::Windows)
    }
}

impl FromStr for OperatingSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(OperatingSystem::Linux),
            "windows" | "win32" | "win" => Ok(OperatingSystem::Windows),
            "macos" | "darwin" | "osx" | "mac" => Ok(OperatingSystem::MacOs),
            "android" => Ok(OperatingSystem::Android),
            other => Err(format!("unknown operating system `{}`", other)),
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Architecture {
    /// Architecture of the running process.
    pub fn host() -> Option<Self> {
        std::env::consts::ARCH.parse().ok()
    }

    /// Lowercase name used in manifests and variant names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
            Architecture::Arm => "arm",
            Architecture::Aarch64 => "aarch64",
        }
    }

    /// Value for the Visual Studio generator platform (`-A`).
    pub fn visual_studio_platform(&self) -> &'static str {
        match self {
            Architecture::X86 => "Win32",
            Architecture::X86_64 => "x64",
            Architecture::Arm => "ARM",
            Architecture::Aarch64 => "ARM64",
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i586" | "i686" => Ok(Architecture::X86),
            "x86_64" | "x86-64" | "amd64" | "x64" => Ok(Architecture::X86_64),
            "arm" | "armv7" | "arm-v7" => Ok(Architecture::Arm),
            "aarch64" | "arm64" | "arm-v8" | "armv8" => Ok(Architecture::Aarch64),
            other => Err(format!("unknown architecture `{}`", other)),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TargetMachine {
    pub fn new(os: OperatingSystem, arch: Architecture) -> Self {
        TargetMachine { os, arch }
    }

    /// The machine this process runs on, if it is one cmlink knows.
    pub fn host() -> Option<Self> {
        Some(TargetMachine {
            os: OperatingSystem::host()?,
            arch: Architecture::host()?,
        })
    }

    /// Whether building for this machine is a cross build.
    pub fn is_cross(&self) -> bool {
        TargetMachine::host().map_or(true, |host| host != *self)
    }
}

/// Parses `<os>-<arch>`, e.g. `linux-x86_64` or `windows-arm64`.
impl FromStr for TargetMachine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, arch) = s
            .split_once('-')
            .ok_or_else(|| format!("expected `<os>-<arch>`, found `{}`", s))?;
        Ok(TargetMachine {
            os: os.parse()?,
            arch: arch.parse()?,
        })
    }
}

impl fmt::Display for TargetMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_machine() {
        let m: TargetMachine = "linux-x86_64".parse().unwrap();
        assert_eq!(m, TargetMachine::new(OperatingSystem::Linux, Architecture::X86_64));

        // Architecture names may themselves contain a dash.
        let m: TargetMachine = "windows-arm-v8".parse().unwrap();
        assert_eq!(m.arch, Architecture::Aarch64);
        assert_eq!(m.to_string(), "windows-aarch64");

        assert!("linux".parse::<TargetMachine>().is_err());
        assert!("beos-x86".parse::<TargetMachine>().is_err());
    }

    #[test]
    fn test_cmake_system_names() {
        assert_eq!(OperatingSystem::MacOs.cmake_system_name(), "Darwin");
        assert_eq!(OperatingSystem::Android.cmake_system_name(), "Android");
        assert_eq!(OperatingSystem::Windows.cmake_system_name(), "Windows");
    }

    #[test]
    fn test_visual_studio_platforms() {
        assert_eq!(Architecture::X86_64.visual_studio_platform(), "x64");
        assert_eq!(Architecture::X86.visual_studio_platform(), "Win32");
        assert_eq!(Architecture::Arm.visual_studio_platform(), "ARM");
        assert_eq!(Architecture::Aarch64.visual_studio_platform(), "ARM64");
    }

    #[test]
    fn test_host_is_not_cross() {
        if let Some(host) = TargetMachine::host() {
            assert!(!host.is_cross());
        }
    }
}
