//! Types for writing NARC archives
//!

use std::{
    io::{Seek, Write},
    path::{Path, PathBuf},
};

use binrw::BinWrite;
use bon::Builder;
use tracing::{info, instrument};

use crate::{
    dat,
    error::{Error, Result},
    fat::FileAllocationTable,
    nmt::NameTable,
    tree::{ArchiveTree, FileEntry, FileSource},
    types::{ByteOrder, NarcHeader, Section, HEADER_SIZE},
};

/// Options for how the NARC file should be written
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct NarcWriterOptions {
    /// Store the name of every file and directory
    ///
    /// Without names, extraction falls back to `<base>_<index>` file names.
    #[builder(default)]
    pub sub_tables: bool,

    /// Byte order of every multi-byte field
    #[builder(default)]
    pub byte_order: ByteOrder,

    /// Sort directory listings by name when reading a tree from disk
    #[builder(default)]
    pub sort_entries: bool,
}

/// NARC archive generator
///
/// ```
/// # fn doit() -> nds_narc::error::Result<()>
/// # {
/// use nds_narc::{ArchiveTree, NarcWriter, NarcWriterOptions};
///
/// // We use a buffer here, though you'd normally use a `File`
/// let mut narc = NarcWriter::new(
///     std::io::Cursor::new(Vec::new()),
///     NarcWriterOptions::builder().sub_tables(true).build(),
/// );
///
/// let palettes = narc.add_directory(ArchiveTree::ROOT, "palettes")?;
/// narc.add_file(palettes, "hello.nclr", b"RLCN".to_vec())?;
///
/// // Write the archive and get the buffer back.
/// let bytes = narc.finish()?.into_inner();
/// assert_eq!(&bytes[..4], b"NARC");
///
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct NarcWriter<W: Write + Seek> {
    inner: W,
    options: NarcWriterOptions,
    tree: ArchiveTree,
}

impl<W: Write + Seek> NarcWriter<W> {
    /// Initializes an empty archive.
    ///
    /// Nothing is written to `inner` until [`NarcWriter::finish`] is called.
    pub fn new(inner: W, options: NarcWriterOptions) -> NarcWriter<W> {
        NarcWriter {
            inner,
            options,
            tree: ArchiveTree::new(),
        }
    }

    /// Initializes an archive holding everything below `directory`
    #[instrument(skip(inner, directory), fields(directory = %directory.as_ref().display()), err)]
    pub fn from_directory(
        inner: W,
        directory: impl AsRef<Path>,
        options: NarcWriterOptions,
    ) -> Result<NarcWriter<W>> {
        let tree = ArchiveTree::discover(directory, options.sort_entries)?;
        Ok(NarcWriter::from_tree(inner, tree, options))
    }

    /// Initializes an archive holding an already built tree
    pub fn from_tree(inner: W, tree: ArchiveTree, options: NarcWriterOptions) -> NarcWriter<W> {
        NarcWriter {
            inner,
            options,
            tree,
        }
    }

    /// Add an empty directory under `parent`, returning the index to add entries to it
    pub fn add_directory(&mut self, parent: usize, name: impl Into<String>) -> Result<usize> {
        self.tree.add_directory(parent, name)
    }

    /// Add a file held in memory
    pub fn add_file(
        &mut self,
        directory: usize,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.tree
            .add_file(directory, name, FileSource::Memory(data.into()))
    }

    /// Add a file whose content is read from disk when the archive is written
    pub fn add_file_from_path(
        &mut self,
        directory: usize,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<()> {
        let source = FileSource::from_path(path)?;
        self.tree.add_file(directory, name, source)
    }

    /// The tree that will be written
    pub fn tree(&self) -> &ArchiveTree {
        &self.tree
    }

    /// Write the whole archive and return the inner writer
    #[instrument(skip(self), fields(files = self.tree.file_count()), err)]
    pub fn finish(mut self) -> Result<W> {
        let endian = self.options.byte_order.endian();

        let names = NameTable::build(&self.tree, self.options.sub_tables)
            .map_err(|e| e.in_section(Section::NameTable))?;
        let fat = FileAllocationTable::from_lengths(self.tree.files().map(FileEntry::len))
            .map_err(|e| e.in_section(Section::FileAllocationTable))?;
        let data_size = dat::section_size(&fat)?;

        let total = HEADER_SIZE as u64 + fat.size() as u64 + names.size() as u64 + data_size as u64;
        let total = u32::try_from(total).map_err(|_| Error::ArchiveTooLarge)?;

        NarcHeader::new(self.options.byte_order, total)
            .write(&mut self.inner)
            .map_err(|e| Error::from(e).in_section(Section::Header))?;
        fat.write(&mut self.inner, endian)
            .map_err(|e| e.in_section(Section::FileAllocationTable))?;
        names
            .write(&mut self.inner, endian)
            .map_err(|e| e.in_section(Section::NameTable))?;
        dat::write(&mut self.inner, endian, &fat, self.tree.files())
            .map_err(|e| e.in_section(Section::Data))?;
        self.inner.flush()?;

        info!(
            size = total,
            files = fat.len(),
            directories = names.directory_count(),
            byte_order = %self.options.byte_order,
            "wrote archive"
        );

        Ok(self.inner)
    }
}
