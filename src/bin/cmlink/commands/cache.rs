//! `cmlink cache` command
//!
//! Manage the build cache: one directory per descriptor fingerprint.

use anyhow::{bail, Result};

use crate::cli::{CacheArgs, CacheCleanArgs, CacheCommands, GlobalArgs};
use cmlink::builder::fingerprint::short;
use cmlink::cache::{BuildCache, EntryInfo, EntryState};
use cmlink::util::fs::format_size;

pub fn execute(args: CacheArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = super::context(global)?;
    let config = super::load_config(&ctx, global);
    let cache = BuildCache::new(ctx.cache_dir(&config));

    match args.command {
        CacheCommands::List => list_cache(&cache),
        CacheCommands::Clean(clean_args) => clean_cache(&cache, clean_args),
        CacheCommands::Path => show_path(&cache),
        CacheCommands::Size => show_size(&cache),
    }
}

/// List cache entries.
fn list_cache(cache: &BuildCache) -> Result<()> {
    println!("Cache directory: {}", cache.root().display());
    println!();

    let entries = cache.entries()?;
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "  {}  {:<10}  {:<24}  {}",
            short(&entry.fingerprint),
            entry.state.to_string(),
            describe(entry),
            format_size(entry.size)
        );
    }

    Ok(())
}

fn describe(entry: &EntryInfo) -> String {
    match &entry.descriptor {
        Some(desc) => match &desc.version {
            Some(version) => format!("{} {}", desc.id(), version),
            None => desc.id(),
        },
        None => "-".to_string(),
    }
}

/// Clean cache entries.
fn clean_cache(cache: &BuildCache, args: CacheCleanArgs) -> Result<()> {
    if args.fingerprints.is_empty() && !args.invalid {
        let removed = cache.clear()?;
        if removed == 0 {
            eprintln!("     Nothing to clean");
        } else {
            eprintln!(
                "     Removed {} entr{} from {}",
                removed,
                if removed == 1 { "y" } else { "ies" },
                cache.root().display()
            );
        }
        return Ok(());
    }

    let entries = cache.entries()?;
    let targets: Vec<&EntryInfo> = if args.invalid {
        entries
            .iter()
            .filter(|e| e.state != EntryState::Ready)
            .collect()
    } else {
        let mut targets = Vec::new();
        for prefix in &args.fingerprints {
            targets.push(find_entry(&entries, prefix)?);
        }
        targets
    };

    if targets.is_empty() {
        eprintln!("     Nothing to clean");
        return Ok(());
    }
    for entry in targets {
        cache.remove(&entry.fingerprint)?;
        eprintln!("     Removed {} ({})", short(&entry.fingerprint), describe(entry));
    }

    Ok(())
}

/// The single entry whose fingerprint starts with `prefix`.
fn find_entry<'a>(entries: &'a [EntryInfo], prefix: &str) -> Result<&'a EntryInfo> {
    let prefix = prefix.to_ascii_lowercase();
    let matches: Vec<&EntryInfo> = entries
        .iter()
        .filter(|e| e.fingerprint.starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [only] => Ok(only),
        [] => bail!("no cache entry matches `{}`", prefix),
        _ => bail!(
            "`{}` matches {} cache entries; use a longer prefix",
            prefix,
            matches.len()
        ),
    }
}

/// Show cache directory path.
fn show_path(cache: &BuildCache) -> Result<()> {
    println!("{}", cache.root().display());
    Ok(())
}

/// Show cache disk usage.
fn show_size(cache: &BuildCache) -> Result<()> {
    let entries = cache.entries()?;
    let ready = entries
        .iter()
        .filter(|e| e.state == EntryState::Ready)
        .count();

    println!("Cache disk usage:");
    println!();
    println!("  Entries:           {} ({} ready)", entries.len(), ready);
    println!("  Total:             {}", format_size(cache.size()));

    Ok(())
}
