use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::layout::{SinkLayout, ERROR_SIDECAR_SUFFIX};
use crate::error::MoveError;
use crate::models::ImportOutcome;

/// Where a file ended up after [`OutcomeMover::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedFile {
    pub destination: PathBuf,
    pub sidecar: Option<PathBuf>,
}

/// Sole owner of moves out of the intake tree.
#[derive(Debug, Clone)]
pub struct OutcomeMover {
    layout: SinkLayout,
}

impl OutcomeMover {
    pub fn new(layout: SinkLayout) -> Self {
        Self { layout }
    }

    /// Moves `source` to `processed/{username}/` or `error/{username}/`
    /// depending on `outcome`. Failures also get a `<name>.error` sidecar.
    ///
    /// If the move itself fails the file is left where it was.
    pub fn apply(
        &self,
        source: &Path,
        username: Option<&str>,
        outcome: &ImportOutcome,
    ) -> Result<MovedFile, MoveError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| MoveError::InvalidSource(source.to_path_buf()))?;
        let now = Utc::now();

        match outcome {
            ImportOutcome::Imported { .. } => {
                let dir = self.layout.processed_dir_for(username);
                let destination = relocate(source, &dir, file_name, now)?;
                Ok(MovedFile {
                    destination,
                    sidecar: None,
                })
            }
            ImportOutcome::Failed(failure) => {
                let dir = self.layout.error_dir_for(username);
                let relative = source
                    .strip_prefix(self.layout.root())
                    .unwrap_or(source)
                    .display()
                    .to_string();
                let destination = relocate(source, &dir, file_name, now)?;

                let sidecar = sidecar_path(&dir, file_name, now);
                let body = failure.render_sidecar(&relative, now);

                // The file has already left the intake tree; a missing
                // sidecar is reported but does not undo the move.
                match write_atomically(&sidecar, body.as_bytes()) {
                    Ok(()) => Ok(MovedFile {
                        destination,
                        sidecar: Some(sidecar),
                    }),
                    Err(source) => {
                        let err = MoveError::Sidecar {
                            path: sidecar,
                            source,
                        };
                        warn!("{}", err);
                        Ok(MovedFile {
                            destination,
                            sidecar: None,
                        })
                    }
                }
            }
        }
    }
}

fn relocate(
    source: &Path,
    dir: &Path,
    file_name: &OsStr,
    now: DateTime<Utc>,
) -> Result<PathBuf, MoveError> {
    fs::create_dir_all(dir).map_err(|source| MoveError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let destination = unique_destination(dir, file_name, now);
    move_file(source, &destination)?;
    debug!("Moved {} to {}", source.display(), destination.display());
    Ok(destination)
}

/// `<name>.error` next to the failed file. An earlier sidecar for the same
/// name is replaced; any other file already using that name is kept and the
/// sidecar gets a timestamped name instead.
fn sidecar_path(dir: &Path, file_name: &OsStr, now: DateTime<Utc>) -> PathBuf {
    let mut sidecar_name = file_name.to_os_string();
    sidecar_name.push(ERROR_SIDECAR_SUFFIX);
    let candidate = dir.join(&sidecar_name);
    if !exists(&candidate) || is_sidecar(&candidate) {
        return candidate;
    }
    debug!(
        "{} is not a sidecar, writing the diagnostic under another name",
        candidate.display()
    );
    unique_destination(dir, &sidecar_name, now)
}

fn is_sidecar(path: &Path) -> bool {
    fs::read_to_string(path)
        .is_ok_and(|body| body.starts_with("Timestamp: ") && body.contains("\nKind: "))
}

/// `name.ext`, then `name_<stamp>.ext`, then `name_<stamp>_<n>.ext`; the
/// first one that does not exist yet.
pub fn unique_destination(dir: &Path, file_name: &OsStr, now: DateTime<Utc>) -> PathBuf {
    let candidate = dir.join(file_name);
    if !exists(&candidate) {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = as_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned());
    let stamp = now.format("%Y%m%d_%H%M%S");

    let mut attempt = 0u32;
    loop {
        let base = if attempt == 0 {
            format!("{}_{}", stem, stamp)
        } else {
            format!("{}_{}_{}", stem, stamp, attempt)
        };
        let name = match &extension {
            Some(ext) => format!("{}.{}", base, ext),
            None => base,
        };
        let candidate = dir.join(name);
        if !exists(&candidate) {
            return candidate;
        }
        attempt += 1;
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn move_file(source: &Path, destination: &Path) -> Result<(), MoveError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => copy_across_volumes(source, destination),
        Err(err) => Err(MoveError::Rename {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            source: err,
        }),
    }
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(windows)]
fn is_cross_device(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

/// Copy into a hidden staging name next to the destination, verify, rename
/// into place, then remove the source.
fn copy_across_volumes(source: &Path, destination: &Path) -> Result<(), MoveError> {
    let staging = staging_path(destination);
    let copy_err = |err: io::Error| MoveError::Copy {
        from: source.to_path_buf(),
        to: staging.clone(),
        source: err,
    };

    let expected = fs::metadata(source).map_err(copy_err)?.len();
    let copied = fs::copy(source, &staging).map_err(copy_err)?;
    let synced = File::open(&staging).and_then(|f| f.sync_all());
    if let Err(err) = synced {
        let _ = fs::remove_file(&staging);
        return Err(copy_err(err));
    }
    if copied != expected {
        let _ = fs::remove_file(&staging);
        return Err(MoveError::Verify {
            path: staging.clone(),
            reason: format!("copied {} bytes, expected {}", copied, expected),
        });
    }

    if let Err(err) = fs::rename(&staging, destination) {
        let _ = fs::remove_file(&staging);
        return Err(MoveError::Rename {
            from: staging.clone(),
            to: destination.to_path_buf(),
            source: err,
        });
    }

    if let Err(err) = fs::remove_file(source) {
        if err.kind() != io::ErrorKind::NotFound {
            // Keep a single copy: the intake file is still authoritative.
            let _ = fs::remove_file(destination);
            return Err(MoveError::Rename {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: err,
            });
        }
    }
    if exists(source) {
        return Err(MoveError::Verify {
            path: source.to_path_buf(),
            reason: "source still present after cross-volume move".to_string(),
        });
    }
    Ok(())
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.partial", name))
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", name));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}
