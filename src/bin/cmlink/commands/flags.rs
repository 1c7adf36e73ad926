//! `cmlink flags` command
//!
//! Prints `-I`, `-L` and `-l` flags for one library variant, building the
//! library (and its dependencies) first when the cache has no result.

use anyhow::{bail, Context, Result};

use crate::cli::{FlagsArgs, GlobalArgs};
use cmlink::builder::{BuildReporter, MessageFormat};
use cmlink::ops::{build_manifest, load_plan, BuildOptions, LibraryPlan};

pub fn execute(args: FlagsArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = super::context(global)?;
    let manifest_path = super::manifest_path(&ctx, global)?;
    let mut config = ctx.load_config(&super::project_root(&manifest_path));
    if args.offline {
        config.net.offline = true;
    }

    let opts = BuildOptions {
        libraries: vec![args.library.clone()],
        ..Default::default()
    };
    let plan = load_plan(&manifest_path, &opts.libraries)?;
    let id = variant_id(&plan, &args.library, args.variant.as_deref())?;

    let session = super::session(&ctx, &config);
    let reporter = BuildReporter::new(MessageFormat::Human, ctx.is_verbose(), ctx.color(), plan.len());
    let build = build_manifest(&session, &plan, &opts, &reporter)?;
    if !build.is_success() {
        bail!("failed to build `{}`", args.library);
    }

    let library = build
        .get(&id)
        .with_context(|| format!("`{}` was not built", id))?;
    let exports = library.exports();

    let mut flags = Vec::new();
    if !args.libs {
        flags.extend(exports.compile_flags());
    }
    if !args.cflags {
        flags.extend(exports.link_flags());
    }
    println!("{}", flags.join(" "));

    Ok(())
}

/// `name/variant` of the variant to print.
fn variant_id(plan: &LibraryPlan, library: &str, variant: Option<&str>) -> Result<String> {
    let variants: Vec<&str> = plan
        .descriptors()
        .filter(|d| d.name == library)
        .map(|d| d.variant.as_str())
        .collect();

    let chosen = match (variant, variants.as_slice()) {
        (Some(v), _) => v,
        (None, [only]) => *only,
        (None, _) => "release",
    };
    if !variants.contains(&chosen) {
        bail!(
            "library `{}` has no variant `{}`\n\
             available variants: {}",
            library,
            chosen,
            variants.join(", ")
        );
    }
    Ok(format!("{}/{}", library, chosen))
}
