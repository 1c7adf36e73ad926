//! Descriptor fingerprinting.
//!
//! A fingerprint captures every input that can change what a library build
//! produces. Two descriptors with the same fingerprint share one cache entry.

use crate::core::{GitReference, LibraryDescriptor, SourceLocator};
use crate::util::hash::Fingerprint;

/// Bumped whenever the hashed layout changes, orphaning old cache entries.
const FINGERPRINT_VERSION: &str = "cmlink-v1";

/// Stable hex fingerprint of a descriptor.
///
/// The variant label is not hashed: it names a descriptor, it doesn't
/// change the build. Collections are hashed in sorted order.
pub fn fingerprint(desc: &LibraryDescriptor) -> String {
    let mut fp = Fingerprint::new();
    fp.update_str(FINGERPRINT_VERSION)
        .update_str(&desc.name)
        .update_opt(desc.version.as_deref());

    match &desc.locator {
        SourceLocator::Path { path } => {
            fp.update_str("path")
                .update_str(&path.to_string_lossy().replace('\\', "/"));
        }
        SourceLocator::Git { url, reference } => {
            fp.update_str("git").update_str(url);
            match reference {
                GitReference::DefaultBranch => fp.update_str("default"),
                GitReference::Branch(b) => fp.update_str("branch").update_str(b),
                GitReference::Tag(t) => fp.update_str("tag").update_str(t),
                GitReference::Rev(r) => fp.update_str("rev").update_str(r),
            };
        }
        SourceLocator::Archive {
            url,
            sha256,
            strip_prefix,
        } => {
            fp.update_str("archive")
                .update_str(url)
                .update_str(&sha256.to_ascii_lowercase())
                .update_opt(strip_prefix.as_deref());
        }
    }

    let options = &desc.options;
    fp.update_str(options.build_type.cmake_name())
        .update_opt(options.shared.map(|s| if s { "ON" } else { "OFF" }))
        .update_bool(options.pic)
        .update_opt(options.generator.as_deref());

    fp.update_u64(options.defines.len() as u64);
    for (name, value) in &options.defines {
        fp.update_str(name)
            .update_str(value.type_name())
            .update_str(&value.to_cmake());
    }
    fp.update_strs(options.args.iter().map(String::as_str));
    fp.update_u64(options.env.len() as u64);
    for (key, value) in &options.env {
        fp.update_str(key).update_str(value);
    }

    let mut targets: Vec<&str> = desc.targets.iter().map(String::as_str).collect();
    targets.sort_unstable();
    targets.dedup();
    fp.update_strs(targets);

    let machine = desc.target.map(|t| t.to_string());
    fp.update_opt(machine.as_deref());

    let mut depends: Vec<&str> = desc.depends.iter().map(String::as_str).collect();
    depends.sort_unstable();
    fp.update_strs(depends);
    fp.update_u64(desc.dependency_fingerprints.len() as u64);
    for (name, dep_fp) in &desc.dependency_fingerprints {
        fp.update_str(name).update_str(dep_fp);
    }

    fp.finish()
}

/// Abbreviated fingerprint for display.
pub fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildOptions, BuildType, OptionValue, TargetMachine};

    fn zlib() -> LibraryDescriptor {
        LibraryDescriptor::new(
            "zlib",
            SourceLocator::Archive {
                url: "https://zlib.net/zlib-1.3.tar.gz".to_string(),
                sha256: "ff0ba4c292013dbc27530b3a81e1f9a813cd39de01ca5e0f8bf355702efa593e"
                    .to_string(),
                strip_prefix: Some("zlib-1.3".to_string()),
            },
        )
        .with_version("1.3")
        .with_targets(["z"])
    }

    #[test]
    fn test_identical_descriptors_identical_fingerprints() {
        let a = fingerprint(&zlib());
        let b = fingerprint(&zlib());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(short(&a).len(), 12);
    }

    #[test]
    fn test_every_option_changes_fingerprint() {
        let base = fingerprint(&zlib());
        let with = |f: &dyn Fn(&mut BuildOptions)| {
            let mut options = BuildOptions::default();
            f(&mut options);
            fingerprint(&zlib().with_options(options))
        };

        let variants = [
            with(&|o| o.build_type = BuildType::Debug),
            with(&|o| o.shared = Some(true)),
            with(&|o| o.shared = Some(false)),
            with(&|o| o.pic = false),
            with(&|o| o.generator = Some("Ninja".to_string())),
            with(&|o| {
                o.defines
                    .insert("ZLIB_COMPAT".to_string(), OptionValue::Bool(true));
            }),
            with(&|o| o.args.push("-Wno-dev".to_string())),
            with(&|o| {
                o.env.insert("CFLAGS".to_string(), "-O3".to_string());
            }),
        ];
        for (i, fp) in variants.iter().enumerate() {
            assert_ne!(&base, fp, "option change #{i} kept the fingerprint");
        }
    }

    #[test]
    fn test_define_types_are_distinct() {
        let as_int = {
            let mut o = BuildOptions::default();
            o.defines.insert("LEVEL".to_string(), OptionValue::Int(1));
            fingerprint(&zlib().with_options(o))
        };
        let as_string = {
            let mut o = BuildOptions::default();
            o.defines
                .insert("LEVEL".to_string(), OptionValue::String("1".to_string()));
            fingerprint(&zlib().with_options(o))
        };
        assert_ne!(as_int, as_string);
    }

    #[test]
    fn test_source_and_target_changes() {
        let base = fingerprint(&zlib());

        let mut other = zlib();
        other.locator = SourceLocator::Git {
            url: "https://github.com/madler/zlib.git".to_string(),
            reference: GitReference::Tag("v1.3".to_string()),
        };
        assert_ne!(base, fingerprint(&other));

        let machine: TargetMachine = "windows-x86_64".parse().unwrap();
        assert_ne!(base, fingerprint(&zlib().with_target(machine)));
        assert_ne!(base, fingerprint(&zlib().with_version("1.3.1")));
        assert_ne!(
            base,
            fingerprint(&zlib().with_dependency_fingerprint("dep", "abc"))
        );
    }

    #[test]
    fn test_order_and_label_insensitive() {
        let a = zlib().with_targets(["z", "zstatic"]);
        let b = zlib().with_targets(["zstatic", "z"]);
        assert_eq!(fingerprint(&a), fingerprint(&b));

        assert_eq!(
            fingerprint(&zlib()),
            fingerprint(&zlib().with_variant("custom"))
        );
    }
}
