//! Error types that can be emitted from this library

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::types::Section;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent warpper for [`walkdir::Error`]
    #[error(transparent)]
    WalkDirError(#[from] walkdir::Error),

    /// Transparent warpper for [`tempfile::PersistError`]
    #[error(transparent)]
    PersistError(#[from] tempfile::PersistError),

    /// A section could not be decoded or encoded
    #[error("in {section} section")]
    Section {
        /// The section being processed
        section: Section,
        /// What went wrong
        #[source]
        source: Box<Error>,
    },

    /// A single archived file could not be processed
    #[error("while processing file {index}")]
    File {
        /// Global index of the file in allocation table order
        index: usize,
        /// What went wrong
        #[source]
        source: Box<Error>,
    },

    /// expected magic {expected:?}, found {found:?}
    #[error("expected magic {expected:?}, found {found:?}")]
    InvalidMagic {
        /// The magic this section must start with
        expected: String,
        /// The bytes that were actually found
        found: String,
    },

    /// structural inconsistency inside the archive
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// entry name cannot be stored in a name table
    #[error("invalid entry name {0:?}")]
    InvalidName(String),

    /// path has no name usable as an entry name
    #[error("{} has no valid utf-8 file name", .0.display())]
    NonUtf8Name(PathBuf),

    /// directory links back to one of its ancestors
    #[error("{} links back to {}", .path.display(), .ancestor.display())]
    FilesystemLoop {
        /// The directory entry that was followed
        path: PathBuf,
        /// The ancestor it resolves to
        ancestor: PathBuf,
    },

    /// archive path does not follow the `<name>.<extension>` convention
    #[error("{} has no extension to derive a directory from", .0.display())]
    InvalidArchivePath(PathBuf),

    /// too many files for a single archive
    #[error("{0} files do not fit in one archive (maximum is 65535)")]
    TooManyFiles(usize),

    /// too many directories for a single archive
    #[error("{0} directories do not fit in one archive (maximum is 4096)")]
    TooManyDirectories(usize),

    /// archive would exceed the 32 bit offsets of the format
    #[error("archive exceeds the 4 GiB addressable by the format")]
    ArchiveTooLarge,

    /// source file changed size between discovery and encoding
    #[error("{} changed size: expected {expected} bytes, read {actual}", .path.display())]
    SourceChanged {
        /// The file that changed
        path: PathBuf,
        /// Length recorded at discovery
        expected: u64,
        /// Length actually read
        actual: u64,
    },

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

impl Error {
    /// Attach the section being processed to this error
    pub(crate) fn in_section(self, section: Section) -> Self {
        Error::Section {
            section,
            source: Box::new(self),
        }
    }

    /// Attach the index of the file being processed to this error
    pub(crate) fn for_file(self, index: usize) -> Self {
        Error::File {
            index,
            source: Box::new(self),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::Malformed(reason.into())
    }
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),

    /// directory at index {0}
    #[error("directory at index {0}")]
    Directory(usize),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
