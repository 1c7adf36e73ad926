//! `cmlink build` command

use anyhow::{bail, Result};

use crate::cli::{BuildArgs, GlobalArgs};
use cmlink::builder::BuildReporter;
use cmlink::ops::{build_manifest, load_plan, BuildOptions};

pub fn execute(args: BuildArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = super::context(global)?;
    let manifest_path = super::manifest_path(&ctx, global)?;
    let mut config = ctx.load_config(&super::project_root(&manifest_path));

    // CLI overrides config
    if args.jobs.is_some() {
        config.build.jobs = args.jobs;
    }
    if args.timeout.is_some() {
        config.build.timeout_secs = args.timeout;
    }
    if args.generator.is_some() {
        config.build.generator = args.generator;
    }
    if args.offline {
        config.net.offline = true;
    }

    let opts = BuildOptions {
        libraries: args.libraries,
        rebuild: args.rebuild,
        concurrency: args.concurrency,
    };

    let plan = load_plan(&manifest_path, &opts.libraries)?;
    if plan.is_empty() {
        bail!("no libraries declared in {}", manifest_path.display());
    }

    let session = super::session(&ctx, &config);
    let reporter = BuildReporter::new(args.message_format, ctx.is_verbose(), ctx.color(), plan.len());
    let build = build_manifest(&session, &plan, &opts, &reporter)?;

    if !build.is_success() {
        let failed: Vec<&str> = build.failures.iter().map(|(id, _)| id.as_str()).collect();
        if build.skipped.is_empty() {
            bail!("failed to build {}", failed.join(", "));
        }
        bail!(
            "failed to build {} ({} dependent librar{} skipped)",
            failed.join(", "),
            build.skipped.len(),
            if build.skipped.len() == 1 { "y" } else { "ies" }
        );
    }

    Ok(())
}
