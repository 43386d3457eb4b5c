//! Pairing of archives with the directories they are extracted to
//!
//! An archive `foo.narc` is extracted to its sibling directory `foo`, and that directory is packed
//! back into `foo.narc`. [`process`] picks the direction from whether the archive exists.
//!
//! Whenever a destination already exists the caller is asked through a confirmation callback before
//! anything is touched. Declining leaves the filesystem exactly as it was.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::{
    error::{Error, Result},
    read::{NarcArchive, DEFAULT_BASE_NAME},
    tree::ArchiveTree,
    write::{NarcWriter, NarcWriterOptions},
};

/// Extension of archive files
pub const ARCHIVE_EXTENSION: &str = "narc";

/// Which way [`process`] goes for a given archive path
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArchiveMode {
    /// The archive exists and is unpacked into its sibling directory
    Extract,
    /// The archive is built from its sibling directory
    Create,
}

/// Something that changed on disk, for callers that keep a view of the filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ArchiveCreated { source_dir: PathBuf, archive: PathBuf },
    ArchiveExtracted { archive: PathBuf, directory: PathBuf },
    FileDeleted { path: PathBuf },
}

/// Result of a create or extract request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `archive` was written from the content of `source_dir`
    Created {
        source_dir: PathBuf,
        archive: PathBuf,
        /// Whether a previous archive was replaced
        replaced: bool,
    },

    /// `archive` was unpacked into `directory`
    Extracted {
        archive: PathBuf,
        directory: PathBuf,
        /// Number of files written
        files: usize,
        /// Whether a previous directory was removed first
        replaced: bool,
    },

    /// `path` already existed and the caller chose to keep it
    Declined { path: PathBuf },
}

impl Outcome {
    /// Filesystem changes caused by this outcome, in the order they happened
    pub fn notifications(&self) -> Vec<Notification> {
        match self {
            Outcome::Created {
                source_dir,
                archive,
                replaced,
            } => {
                let mut notifications = Vec::with_capacity(2);
                if *replaced {
                    notifications.push(Notification::FileDeleted {
                        path: archive.clone(),
                    });
                }
                notifications.push(Notification::ArchiveCreated {
                    source_dir: source_dir.clone(),
                    archive: archive.clone(),
                });
                notifications
            }
            Outcome::Extracted {
                archive,
                directory,
                replaced,
                ..
            } => {
                let mut notifications = Vec::with_capacity(2);
                if *replaced {
                    notifications.push(Notification::FileDeleted {
                        path: directory.clone(),
                    });
                }
                notifications.push(Notification::ArchiveExtracted {
                    archive: archive.clone(),
                    directory: directory.clone(),
                });
                notifications
            }
            Outcome::Declined { .. } => Vec::new(),
        }
    }
}

/// The directory an archive is extracted to: its path without the final extension
pub fn extraction_directory(archive: impl AsRef<Path>) -> Result<PathBuf> {
    let archive = archive.as_ref();
    if archive.extension().is_none() {
        return Err(Error::InvalidArchivePath(archive.to_path_buf()));
    }
    Ok(archive.with_extension(""))
}

/// The archive a directory is packed into: its path with `.narc` appended
pub fn archive_path_for(directory: impl AsRef<Path>) -> PathBuf {
    let mut path = directory.as_ref().components().as_path().as_os_str().to_owned();
    path.push(".");
    path.push(ARCHIVE_EXTENSION);
    PathBuf::from(path)
}

/// Extract when the archive exists, create it otherwise
pub fn detect_mode(archive: impl AsRef<Path>) -> ArchiveMode {
    if archive.as_ref().exists() {
        ArchiveMode::Extract
    } else {
        ArchiveMode::Create
    }
}

/// Extract `archive` next to itself, or build it from its sibling directory if it does not exist
#[instrument(skip(archive, confirm), fields(archive = %archive.as_ref().display()), err)]
pub fn process(
    archive: impl AsRef<Path>,
    options: NarcWriterOptions,
    confirm: impl FnOnce(&Path) -> bool,
) -> Result<Outcome> {
    let archive = archive.as_ref();
    let directory = extraction_directory(archive)?;
    match detect_mode(archive) {
        ArchiveMode::Extract => extract_archive(archive, &directory, confirm),
        ArchiveMode::Create => create_archive(&directory, archive, options, confirm),
    }
}

/// Pack `source_dir` into `archive`
///
/// An existing archive is only replaced once `confirm` accepts it. The new archive is written to a
/// temporary file next to the destination first, so a failure leaves the previous one intact.
#[instrument(skip(source_dir, archive, confirm), fields(source_dir = %source_dir.as_ref().display(), archive = %archive.as_ref().display()), err)]
pub fn create_archive(
    source_dir: impl AsRef<Path>,
    archive: impl AsRef<Path>,
    options: NarcWriterOptions,
    confirm: impl FnOnce(&Path) -> bool,
) -> Result<Outcome> {
    let (source_dir, archive) = (source_dir.as_ref(), archive.as_ref());

    let replaced = archive.exists();
    if replaced && !confirm(archive) {
        info!("keeping existing archive");
        return Ok(Outcome::Declined {
            path: archive.to_path_buf(),
        });
    }

    // the temporary file may live inside `source_dir`, so the tree is read first
    let tree = ArchiveTree::discover(source_dir, options.sort_entries)?;

    let destination = match archive.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temporary = NamedTempFile::new_in(destination)?;

    let writer = NarcWriter::from_tree(BufWriter::new(temporary), tree, options);
    let temporary = writer
        .finish()?
        .into_inner()
        .map_err(io::IntoInnerError::into_error)?;
    temporary.persist(archive)?;

    info!(replaced, "created archive");
    Ok(Outcome::Created {
        source_dir: source_dir.to_path_buf(),
        archive: archive.to_path_buf(),
        replaced,
    })
}

/// Unpack `archive` into `directory`
///
/// The archive metadata is checked before anything is written. An existing directory is only
/// removed once `confirm` accepts it, and a failed extraction removes what it had written.
#[instrument(skip(archive, directory, confirm), fields(archive = %archive.as_ref().display(), directory = %directory.as_ref().display()), err)]
pub fn extract_archive(
    archive: impl AsRef<Path>,
    directory: impl AsRef<Path>,
    confirm: impl FnOnce(&Path) -> bool,
) -> Result<Outcome> {
    let (archive, directory) = (archive.as_ref(), directory.as_ref());

    let base_name = archive
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(DEFAULT_BASE_NAME);
    let mut narc = NarcArchive::with_base_name(BufReader::new(File::open(archive)?), base_name)?;

    let replaced = directory.exists();
    if replaced {
        if !confirm(directory) {
            info!("keeping existing directory");
            return Ok(Outcome::Declined {
                path: directory.to_path_buf(),
            });
        }
        fs::remove_dir_all(directory)?;
    }

    let files = match narc.extract(directory) {
        Ok(files) => files,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(directory) {
                warn!(%cleanup, "unable to remove partially extracted directory");
            }
            return Err(e);
        }
    };

    info!(files = files.len(), replaced, "extracted archive");
    Ok(Outcome::Extracted {
        archive: archive.to_path_buf(),
        directory: directory.to_path_buf(),
        files: files.len(),
        replaced,
    })
}
