//! Archive source - libraries downloaded as `.tar.gz` archives.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::core::{AcquisitionError, SourceLocator};
use crate::sources::source::{
    check_cancelled, read_stamp, write_stamp, AcquiredSource, SourceAcquirer,
};
use crate::util::cancel::CancellationToken;
use crate::util::hash::HashingWriter;

const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Downloads, verifies and extracts source archives.
#[derive(Debug, Default)]
pub struct ArchiveAcquirer {
    offline: bool,
    http_timeout: Option<Duration>,
}

impl ArchiveAcquirer {
    pub fn new(offline: bool, http_timeout: Option<Duration>) -> Self {
        ArchiveAcquirer {
            offline,
            http_timeout,
        }
    }

    /// Open a reader over the archive at a `file://` URL or over HTTP(S).
    fn open(&self, url: &str) -> Result<Box<dyn Read>, AcquisitionError> {
        let parsed = url::Url::parse(url).map_err(|e| AcquisitionError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| AcquisitionError::Network {
                    url: url.to_string(),
                    message: "not a local file path".to_string(),
                })?;
            let file = File::open(&path).map_err(|e| AcquisitionError::io(path, e))?;
            return Ok(Box::new(file));
        }

        if self.offline {
            return Err(AcquisitionError::Offline {
                url: url.to_string(),
            });
        }

        tracing::info!("Downloading {}", url);
        let network = |e: reqwest::Error| AcquisitionError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("cmlink/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.http_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(network)?;

        let response = client.get(url).send().map_err(network)?;
        if !response.status().is_success() {
            return Err(AcquisitionError::Network {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        Ok(Box::new(response))
    }
}

/// Copy `reader` into `out` chunk by chunk, checking `cancel` between
/// chunks. Returns the SHA256 of the copied bytes.
fn download(
    url: &str,
    mut reader: impl Read,
    out: impl Write,
    cancel: &CancellationToken,
) -> Result<String, AcquisitionError> {
    let network = |e: std::io::Error| AcquisitionError::Network {
        url: url.to_string(),
        message: e.to_string(),
    };

    let mut out = HashingWriter::new(out);
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    loop {
        check_cancelled(cancel)?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(network(e)),
        };
        out.write_all(&buf[..n]).map_err(network)?;
    }
    out.flush().map_err(network)?;

    let (_, digest) = out.finish();
    Ok(digest)
}

fn stamp_key(sha256: &str, strip_prefix: Option<&str>) -> String {
    format!("archive:{}:{}", sha256, strip_prefix.unwrap_or(""))
}

/// Map an archive entry path to its destination-relative path.
///
/// Returns `Ok(None)` for entries that vanish after stripping the prefix
/// and an error for entries that would escape the destination.
fn entry_target(entry_path: &Path, strip_prefix: Option<&str>) -> Result<Option<PathBuf>, String> {
    let mut relative = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "archive entry escapes destination directory: {}",
                    entry_path.display()
                ));
            }
        }
    }

    if let Some(prefix) = strip_prefix {
        let prefix = Path::new(prefix.trim_end_matches('/'));
        // Entries outside the prefix are kept as-is.
        if let Ok(stripped) = relative.strip_prefix(prefix).map(Path::to_path_buf) {
            relative = stripped;
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

/// Extract a gzipped tarball into `dest`, optionally stripping a leading
/// directory. Symlinks and hard links are skipped.
pub fn extract_tarball(
    data: impl Read,
    dest: &Path,
    strip_prefix: Option<&str>,
) -> Result<(), String> {
    let mut archive = Archive::new(GzDecoder::new(data));
    std::fs::create_dir_all(dest)
        .map_err(|e| format!("failed to create {}: {}", dest.display(), e))?;

    let entries = archive
        .entries()
        .map_err(|e| format!("failed to read archive entries: {}", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| format!("failed to read archive entry: {}", e))?;
        let entry_path = entry
            .path()
            .map_err(|e| format!("invalid entry path: {}", e))?
            .into_owned();

        let Some(relative) = entry_target(&entry_path, strip_prefix)? else {
            continue;
        };
        let output_path = dest.join(relative);

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&output_path)
                .map_err(|e| format!("failed to create {}: {}", output_path.display(), e))?;
        } else if kind.is_file() {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
            }
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| format!("failed to read {}: {}", entry_path.display(), e))?;
            std::fs::write(&output_path, contents)
                .map_err(|e| format!("failed to write {}: {}", output_path.display(), e))?;

            #[cfg(unix)]
            if let Ok(mode) = entry.header().mode() {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(
                    &output_path,
                    std::fs::Permissions::from_mode(mode & 0o777),
                );
            }
        } else {
            tracing::debug!("skipping archive entry {}", entry_path.display());
        }
    }

    Ok(())
}

impl SourceAcquirer for ArchiveAcquirer {
    fn name(&self) -> &str {
        "archive"
    }

    fn supports(&self, locator: &SourceLocator) -> bool {
        matches!(locator, SourceLocator::Archive { .. })
    }

    /// The archive hash pins the content, so it is the digest.
    fn digest(&self, locator: &SourceLocator) -> Result<String, AcquisitionError> {
        match locator {
            SourceLocator::Archive { sha256, .. } => Ok(sha256.to_ascii_lowercase()),
            _ => Err(AcquisitionError::Unsupported {
                locator: locator.to_string(),
            }),
        }
    }

    fn acquire(
        &self,
        locator: &SourceLocator,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<AcquiredSource, AcquisitionError> {
        let SourceLocator::Archive {
            url,
            sha256,
            strip_prefix,
        } = locator
        else {
            return Err(AcquisitionError::Unsupported {
                locator: locator.to_string(),
            });
        };
        check_cancelled(cancel)?;

        let expected = sha256.to_ascii_lowercase();
        let key = stamp_key(&expected, strip_prefix.as_deref());
        if dest.is_dir() && read_stamp(dest).as_deref() == Some(key.as_str()) {
            tracing::debug!("{} already extracted", url);
            return Ok(AcquiredSource {
                dir: dest.to_path_buf(),
                revision: Some(expected),
                fetched: false,
            });
        }

        // Download next to the destination, then extract and move into
        // place in one step.
        let parent = dest.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| AcquisitionError::io(parent, e))?;
        let mut archive = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(parent)
            .map_err(|e| AcquisitionError::io(parent, e))?;

        let reader = self.open(url)?;
        let actual = download(url, reader, archive.as_file_mut(), cancel)?;
        if actual != expected {
            return Err(AcquisitionError::ChecksumMismatch {
                url: url.clone(),
                expected,
                actual,
            });
        }

        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(parent)
            .map_err(|e| AcquisitionError::io(parent, e))?;

        archive
            .as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(|e| AcquisitionError::io(archive.path(), e))?;
        let data = BufReader::new(archive.as_file());
        extract_tarball(data, staging.path(), strip_prefix.as_deref()).map_err(|message| {
            AcquisitionError::Archive {
                url: url.clone(),
                message,
            }
        })?;
        check_cancelled(cancel)?;

        if !staging.path().join("CMakeLists.txt").is_file() {
            return Err(AcquisitionError::NotCMakeProject {
                path: dest.to_path_buf(),
            });
        }

        crate::util::fs::remove_dir_all_if_exists(dest)
            .map_err(|e| AcquisitionError::io(dest, format!("{:#}", e)))?;
        std::fs::rename(staging.path(), dest).map_err(|e| AcquisitionError::io(dest, e))?;
        write_stamp(dest, &key)?;

        Ok(AcquiredSource {
            dir: dest.to_path_buf(),
            revision: Some(expected),
            fetched: true,
        })
    }
}
