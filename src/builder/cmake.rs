//! CMake invocation: configure, build and install one library.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::builder::context::BuildContext;
use crate::builder::file_api::{self, InstallableTarget};
use crate::builder::toolchain::{self, ToolSettings, Toolchain};
use crate::builder::util::{detect_tool_version, parse_cmake_version};
use crate::core::errors::log_tail;
use crate::core::{BuildError, BuildPhase, LibraryDescriptor};
use crate::util::process::{ProcessBuilder, ProcessError};

/// Oldest CMake with `--install` and `-S`/`-B` that we rely on.
pub const MIN_CMAKE_VERSION: semver::Version = semver::Version::new(3, 16, 0);

/// What a successful tool run produced.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    /// Captured output of every invocation, oldest first.
    pub log: Vec<String>,
    /// Installable library targets, when the tool could report them.
    pub targets: Option<Vec<InstallableTarget>>,
}

/// An external build system driving one library from source to install prefix.
pub trait BuildTool: Send + Sync {
    fn name(&self) -> &str;

    /// Configure, build and install `desc` using the directories in `ctx`.
    fn run(&self, ctx: &BuildContext, desc: &LibraryDescriptor) -> Result<ToolOutcome, BuildError>;
}

/// The default [`BuildTool`]: the `cmake` command line.
pub struct CMakeTool {
    settings: ToolSettings,
    program: OnceLock<Result<PathBuf, BuildError>>,
    toolchain: OnceLock<Toolchain>,
}

impl CMakeTool {
    pub fn new(settings: ToolSettings) -> Self {
        CMakeTool {
            settings,
            program: OnceLock::new(),
            toolchain: OnceLock::new(),
        }
    }

    /// The CMake executable, located and version-checked once.
    pub fn program(&self) -> Result<PathBuf, BuildError> {
        self.program.get_or_init(|| self.locate()).clone()
    }

    fn locate(&self) -> Result<PathBuf, BuildError> {
        let tool_name = self
            .settings
            .cmake
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "cmake".to_string());

        let program = toolchain::locate_cmake(self.settings.cmake.as_deref()).ok_or_else(|| {
            BuildError::ToolNotFound {
                tool: tool_name.clone(),
                hint: toolchain::cmake_install_hint(),
            }
        })?;

        let version = detect_tool_version(&program, parse_cmake_version).map_err(|e| {
            BuildError::Spawn {
                command: format!("{} --version", program.display()),
                message: format!("{:#}", e),
            }
        })?;
        if version < MIN_CMAKE_VERSION {
            return Err(BuildError::ToolTooOld {
                tool: tool_name,
                found: version.to_string(),
                required: MIN_CMAKE_VERSION.to_string(),
            });
        }

        tracing::debug!("using cmake {} at {}", version, program.display());
        Ok(program)
    }

    fn toolchain(&self) -> &Toolchain {
        self.toolchain.get_or_init(Toolchain::detect)
    }

    fn command(&self, program: &Path, ctx: &BuildContext, desc: &LibraryDescriptor) -> ProcessBuilder {
        ProcessBuilder::new(program)
            .cwd(&ctx.build_dir)
            .envs(&desc.options.env)
    }

    fn run_phase(
        phase: BuildPhase,
        cmd: ProcessBuilder,
        ctx: &BuildContext,
        log: &mut Vec<String>,
    ) -> Result<(), BuildError> {
        if ctx.cancel.is_cancelled() {
            return Err(BuildError::Cancelled { phase });
        }

        let command = cmd.display_command();
        tracing::debug!("{}: {}", phase, command);
        log.push(format!("$ {}", command));

        match cmd.exec_streaming(ctx.timeout, &ctx.cancel) {
            Ok(output) => {
                log.extend(output.log.iter().cloned());
                if output.status.success() {
                    Ok(())
                } else {
                    Err(BuildError::Failed {
                        phase,
                        command,
                        code: output.status.code(),
                        log_tail: log_tail(&output.log),
                    })
                }
            }
            Err(ProcessError::NotFound { program }) => Err(BuildError::ToolNotFound {
                tool: program,
                hint: toolchain::cmake_install_hint(),
            }),
            Err(ProcessError::Spawn { command, message })
            | Err(ProcessError::Io { command, message }) => {
                Err(BuildError::Spawn { command, message })
            }
            Err(ProcessError::TimedOut {
                command,
                timeout,
                log: output,
            }) => {
                log.extend(output.iter().cloned());
                Err(BuildError::TimedOut {
                    phase,
                    command,
                    timeout_secs: timeout.as_secs(),
                    log_tail: log_tail(&output),
                })
            }
            Err(ProcessError::Cancelled { log: output, .. }) => {
                log.extend(output);
                Err(BuildError::Cancelled { phase })
            }
        }
    }
}

/// Arguments of the configure step.
pub fn configure_args(
    ctx: &BuildContext,
    desc: &LibraryDescriptor,
    generator: Option<&str>,
    tools: &Toolchain,
) -> Vec<String> {
    let options = &desc.options;
    let mut args = vec![
        "-S".to_string(),
        ctx.source_dir.display().to_string(),
        "-B".to_string(),
        ctx.build_dir.display().to_string(),
    ];

    if let Some(generator) = generator {
        args.push("-G".to_string());
        args.push(generator.to_string());
        if let Some(platform) = toolchain::visual_studio_platform(generator, desc.target.as_ref()) {
            args.push("-A".to_string());
            args.push(platform);
        }
    }

    args.push(format!(
        "-DCMAKE_BUILD_TYPE={}",
        options.build_type.cmake_name()
    ));
    args.push(format!(
        "-DCMAKE_INSTALL_PREFIX={}",
        ctx.install_dir.display()
    ));
    args.push(format!(
        "-DCMAKE_POSITION_INDEPENDENT_CODE={}",
        if options.pic { "ON" } else { "OFF" }
    ));
    if let Some(shared) = options.shared {
        args.push(format!(
            "-DBUILD_SHARED_LIBS={}",
            if shared { "ON" } else { "OFF" }
        ));
    }
    if let Some(prefix_path) = ctx.prefix_path_value() {
        args.push(format!("-DCMAKE_PREFIX_PATH={}", prefix_path));
    }

    // Visual Studio picks its own compilers.
    if !generator.is_some_and(toolchain::is_visual_studio) {
        args.extend(tools.cmake_defines());
    }

    if let Some(target) = desc.target.filter(|t| t.is_cross()) {
        args.push(format!(
            "-DCMAKE_SYSTEM_NAME={}",
            target.os.cmake_system_name()
        ));
    }

    for (name, value) in &options.defines {
        args.push(format!("-D{}={}", name, value.to_cmake()));
    }
    args.extend(options.args.iter().cloned());
    args.push("--no-warn-unused-cli".to_string());
    args
}

impl BuildTool for CMakeTool {
    fn name(&self) -> &str {
        "cmake"
    }

    fn run(&self, ctx: &BuildContext, desc: &LibraryDescriptor) -> Result<ToolOutcome, BuildError> {
        if ctx.cancel.is_cancelled() {
            return Err(BuildError::Cancelled {
                phase: BuildPhase::Configure,
            });
        }
        let program = self.program()?;

        std::fs::create_dir_all(&ctx.build_dir).map_err(|e| BuildError::io(&ctx.build_dir, e))?;
        std::fs::create_dir_all(&ctx.install_dir)
            .map_err(|e| BuildError::io(&ctx.install_dir, e))?;

        let cache = ctx.cmake_cache();
        crate::util::fs::remove_file_if_exists(&cache)
            .map_err(|e| BuildError::io(&cache, format!("{:#}", e)))?;
        if let Err(e) = file_api::write_codemodel_query(&ctx.build_dir) {
            tracing::debug!("file API query not written: {:#}", e);
        }

        let generator = toolchain::select_generator(
            desc.options.generator.as_deref(),
            &self.settings,
        );
        let build_type = desc.options.build_type.cmake_name();
        let mut log = Vec::new();

        tracing::info!("Configuring {}", desc.id());
        let configure = self
            .command(&program, ctx, desc)
            .args(configure_args(ctx, desc, generator.as_deref(), self.toolchain()));
        Self::run_phase(BuildPhase::Configure, configure, ctx, &mut log)?;

        let targets = match file_api::read_installable_targets(&ctx.build_dir, desc.options.build_type)
        {
            Ok(targets) => targets,
            Err(e) => {
                tracing::debug!("ignoring unreadable file API reply: {:#}", e);
                None
            }
        };

        tracing::info!("Building {}", desc.id());
        let mut build = self
            .command(&program, ctx, desc)
            .arg("--build")
            .arg(&ctx.build_dir)
            .args(["--config", build_type]);
        if let Some(jobs) = ctx.jobs {
            build = build.arg("--parallel").arg(jobs.to_string());
        }
        Self::run_phase(BuildPhase::Build, build, ctx, &mut log)?;

        tracing::info!("Installing {}", desc.id());
        let install = self
            .command(&program, ctx, desc)
            .arg("--install")
            .arg(&ctx.build_dir)
            .args(["--config", build_type])
            .arg("--prefix")
            .arg(&ctx.install_dir);
        Self::run_phase(BuildPhase::Install, install, ctx, &mut log)?;

        Ok(ToolOutcome { log, targets })
    }
}
