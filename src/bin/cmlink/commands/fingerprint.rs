//! `cmlink fingerprint` command

use anyhow::Result;

use crate::cli::{FingerprintArgs, GlobalArgs};
use cmlink::builder::fingerprint::{fingerprint, short};
use cmlink::ops::load_plan;

pub fn execute(args: FingerprintArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = super::context(global)?;
    let manifest_path = super::manifest_path(&ctx, global)?;
    let plan = load_plan(&manifest_path, &args.libraries)?;

    for desc in plan.descriptors() {
        let fp = fingerprint(desc);
        let shown = if args.short { short(&fp) } else { fp.as_str() };
        println!("{}  {}", shown, desc.id());
    }

    Ok(())
}
