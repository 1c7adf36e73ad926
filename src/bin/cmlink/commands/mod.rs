//! Command implementations

pub mod build;
pub mod cache;
pub mod completions;
pub mod fingerprint;
pub mod flags;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::cli::GlobalArgs;
use cmlink::ops::Session;
use cmlink::util::config::Config;
use cmlink::util::GlobalContext;

/// Build the global context from the global flags.
pub fn context(global: &GlobalArgs) -> Result<GlobalContext> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(global.verbose);
    ctx.set_color(!global.no_color && std::io::stderr().is_terminal());
    if let Some(dir) = &global.cache_dir {
        ctx.set_cache_dir(dir.clone());
    }
    Ok(ctx)
}

/// The manifest named by `--manifest-path`, or the nearest `CMakeLibs.toml`.
pub fn manifest_path(ctx: &GlobalContext, global: &GlobalArgs) -> Result<PathBuf> {
    match &global.manifest_path {
        Some(path) => {
            let path = ctx.cwd().join(path);
            if !path.is_file() {
                bail!("manifest path `{}` does not exist", path.display());
            }
            Ok(path)
        }
        None => Ok(ctx.find_manifest()?),
    }
}

/// Directory holding the manifest; project config lives beneath it.
pub fn project_root(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration for commands that work with or without a manifest.
pub fn load_config(ctx: &GlobalContext, global: &GlobalArgs) -> Config {
    let root = manifest_path(ctx, global)
        .map(|p| project_root(&p))
        .unwrap_or_else(|_| ctx.cwd().to_path_buf());
    ctx.load_config(&root)
}

/// A build session whose running tools are stopped on Ctrl-C.
pub fn session(ctx: &GlobalContext, config: &Config) -> Session {
    let session = Session::from_config(config, ctx.cache_dir(config));
    if let Err(e) = session.cancel_token().cancel_on_interrupt() {
        tracing::warn!("could not install interrupt handler: {}", e);
    }
    session
}
