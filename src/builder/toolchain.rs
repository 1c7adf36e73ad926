//! Host tool detection for CMake builds.
//!
//! Locates the `cmake` executable, the C/C++ compilers and archiver handed to
//! CMake, and picks a generator when a library doesn't name one.

use std::path::{Path, PathBuf};

use crate::core::TargetMachine;
use crate::util::config::Config;
use crate::util::process::{self, ProcessBuilder};

/// Tool settings resolved from configuration and the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSettings {
    /// Explicit CMake executable (path or bare name).
    pub cmake: Option<PathBuf>,
    /// make executable used to detect the makefile flavor.
    pub make: Option<PathBuf>,
    /// Generator used when a library doesn't choose one.
    pub generator: Option<String>,
}

impl ToolSettings {
    pub fn from_config(config: &Config) -> Self {
        ToolSettings {
            cmake: config.build.cmake.clone(),
            make: config.build.make.clone(),
            generator: config.build.generator.clone(),
        }
    }
}

/// Compilers and archiver passed to CMake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchain {
    pub cc: Option<PathBuf>,
    pub cxx: Option<PathBuf>,
    pub ar: Option<PathBuf>,
}

impl Toolchain {
    /// Detect from `CC`/`CXX`/`AR`, then well-known names in PATH.
    pub fn detect() -> Self {
        let toolchain = Toolchain {
            cc: process::find_c_compiler(),
            cxx: process::find_cxx_compiler(),
            ar: process::find_ar(),
        };
        tracing::debug!(
            "toolchain: cc={:?} cxx={:?} ar={:?}",
            toolchain.cc,
            toolchain.cxx,
            toolchain.ar
        );
        toolchain
    }

    /// `-D` arguments selecting these tools.
    pub fn cmake_defines(&self) -> Vec<String> {
        let mut defines = Vec::new();
        if let Some(cc) = &self.cc {
            defines.push(format!("-DCMAKE_C_COMPILER={}", cc.display()));
        }
        if let Some(cxx) = &self.cxx {
            defines.push(format!("-DCMAKE_CXX_COMPILER={}", cxx.display()));
        }
        if let Some(ar) = &self.ar {
            defines.push(format!("-DCMAKE_AR={}", ar.display()));
        }
        defines
    }
}

/// Find the CMake executable: the configured one when set, otherwise PATH.
pub fn locate_cmake(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(tool) => process::resolve_tool(tool),
        None => process::find_executable("cmake"),
    }
}

/// Get platform-specific CMake install hint.
pub fn cmake_install_hint() -> String {
    #[cfg(target_os = "linux")]
    {
        "Install CMake: apt install cmake, dnf install cmake, or https://cmake.org/download/ \
         (or set CMAKE_EXECUTABLE)"
            .to_string()
    }
    #[cfg(target_os = "macos")]
    {
        "Install CMake: brew install cmake or https://cmake.org/download/ (or set CMAKE_EXECUTABLE)"
            .to_string()
    }
    #[cfg(target_os = "windows")]
    {
        "Install CMake: winget install cmake or https://cmake.org/download/ (or set CMAKE_EXECUTABLE)"
            .to_string()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        "Install CMake from https://cmake.org/download/ (or set CMAKE_EXECUTABLE)".to_string()
    }
}

/// Pick the makefile generator from `make -v` output.
///
/// The platform is named on the second line ("Built for x86_64-pc-linux-gnu").
pub fn makefile_generator_from_version(output: &str) -> Option<&'static str> {
    let platform = output.lines().nth(1)?.to_ascii_lowercase();
    if platform.contains("mingw") {
        Some("MinGW Makefiles")
    } else if platform.contains("msys") {
        Some("MSYS Makefiles")
    } else if platform.contains("nux") || platform.contains("nix") {
        Some("Unix Makefiles")
    } else {
        None
    }
}

/// Run `make -v` and pick the matching makefile generator.
pub fn detect_makefile_generator(make: &Path) -> Option<&'static str> {
    let program = process::resolve_tool(make)?;
    let output = ProcessBuilder::new(&program).arg("-v").exec().ok()?;
    if !output.status.success() {
        return None;
    }
    makefile_generator_from_version(&String::from_utf8_lossy(&output.stdout))
}

/// Visual Studio generator name for an MSVC installation version.
pub fn visual_studio_generator(major: u64, minor: u64) -> Option<&'static str> {
    let name = match major {
        17 => "Visual Studio 17 2022",
        16 => "Visual Studio 16 2019",
        15 => "Visual Studio 15 2017",
        14 => "Visual Studio 14 2015",
        12 => "Visual Studio 12 2013",
        11 => "Visual Studio 11 2012",
        10 => "Visual Studio 10 2010",
        9 => "Visual Studio 9 2008",
        8 => "Visual Studio 8 2005",
        7 if minor == 1 => "Visual Studio 7 .NET 2003",
        7 => "Visual Studio 7",
        6 => "Visual Studio 6",
        _ => return None,
    };
    Some(name)
}

pub fn is_visual_studio(generator: &str) -> bool {
    generator.starts_with("Visual Studio")
}

/// Generators that take the build type at build time (`--config`).
pub fn is_multi_config(generator: &str) -> bool {
    is_visual_studio(generator) || generator == "Xcode" || generator == "Ninja Multi-Config"
}

/// Version of the newest Visual Studio installation, from vswhere.
#[cfg(target_os = "windows")]
pub fn detect_visual_studio() -> Option<semver::Version> {
    let program_files_x86 = std::env::var("ProgramFiles(x86)")
        .unwrap_or_else(|_| "C:\\Program Files (x86)".to_string());
    let standard_path = PathBuf::from(&program_files_x86)
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");

    let vswhere = if standard_path.exists() {
        standard_path
    } else {
        process::find_executable("vswhere")?
    };
    tracing::debug!("Found vswhere at: {}", vswhere.display());

    let output = ProcessBuilder::new(&vswhere)
        .args([
            "-latest",
            "-requires",
            "Microsoft.VisualStudio.Component.VC.Tools.x86.x64",
            "-property",
            "installationVersion",
            "-format",
            "value",
        ])
        .exec()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    crate::builder::util::parse_version_flexible(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(target_os = "windows"))]
pub fn detect_visual_studio() -> Option<semver::Version> {
    None
}

/// Choose a generator.
///
/// Precedence: the library's option, configuration, an installed Visual
/// Studio (Windows), Ninja on PATH, the detected makefile flavor. `None`
/// leaves the choice to CMake.
pub fn select_generator(option: Option<&str>, settings: &ToolSettings) -> Option<String> {
    if let Some(generator) = option.or(settings.generator.as_deref()) {
        return Some(generator.to_string());
    }

    if let Some(version) = detect_visual_studio() {
        if let Some(generator) = visual_studio_generator(version.major, version.minor) {
            return Some(generator.to_string());
        }
    }

    if process::find_executable("ninja").is_some() {
        return Some("Ninja".to_string());
    }

    let make = settings
        .make
        .clone()
        .unwrap_or_else(|| PathBuf::from("make"));
    detect_makefile_generator(&make).map(str::to_string)
}

/// `-A` platform for Visual Studio generators.
pub fn visual_studio_platform(generator: &str, target: Option<&TargetMachine>) -> Option<String> {
    if !is_visual_studio(generator) {
        return None;
    }
    target.map(|t| t.arch.visual_studio_platform().to_string())
}
