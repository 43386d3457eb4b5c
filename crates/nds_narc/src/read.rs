//! Types for reading NARC archives
//!

use std::{
    fmt::{self, Debug},
    fs::{self, File},
    io::{self, BufWriter, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};

use binrw::{BinRead, Endian};
use indexmap::{map::Entry, IndexMap};
use tracing::{debug, info, instrument, warn};

use crate::{
    dat::DataReader,
    error::{Error, FileNotFoundError, Result},
    fat::FileAllocationTable,
    format::FileFormat,
    nmt::{DirectoryInfo, NameTable},
    types::{
        ByteOrder, FatEntry, NarcHeader, Section, SectionHeader, HEADER_SIZE, NARC_MAGIC,
        SECTION_HEADER_SIZE,
    },
};

/// Base of the names given to files of archives that store none
pub const DEFAULT_BASE_NAME: &str = "file";

/// A struct for reading an entry from a NARC file
pub struct NarcFile<'a, R: Read + Seek> {
    data: &'a NarcFileData,
    reader: io::Take<&'a mut R>,
}

impl<'a, R: Read + Seek> Debug for NarcFile<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NarcFile({:#?})", self.data)
    }
}

/// Methods for retrieving information on NARC file entries
impl<'a, R: Read + Seek> NarcFile<'a, R> {
    /// Get the path of the file inside the archive, components separated by `/`
    ///
    /// For archives without stored names this is a synthetic `<base>_<index>` name, without the
    /// extension extraction adds after sniffing the content.
    pub fn name(&self) -> &str {
        &self.data.path
    }

    /// Get the index of the file in the allocation table
    pub fn index(&self) -> usize {
        self.data.index
    }

    /// Get the size of the file, in bytes
    pub fn size(&self) -> u64 {
        self.data.entry.len() as u64
    }

    /// Get the offset of the file relative to the data section payload
    pub fn start(&self) -> u32 {
        self.data.entry.start
    }

    /// Get the absolute offset of the first byte of the file in the stream
    pub fn data_start(&self) -> u64 {
        self.data.data_start
    }

    /// Whether the name was generated instead of read from the archive
    pub fn is_synthetic(&self) -> bool {
        self.data.synthetic
    }
}

impl<R: Read + Seek> Read for NarcFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Structure representing a NARC file entry.
#[derive(Debug, Clone)]
pub struct NarcFileData {
    /// Index in the allocation table
    pub index: usize,
    /// Path inside the archive
    pub path: Box<str>,
    /// Discovery position of the directory holding the file
    pub directory: usize,
    /// Whether the name was generated
    pub synthetic: bool,
    /// Location relative to the data section payload
    pub entry: FatEntry,
    /// Absolute offset of the first byte in the stream
    pub data_start: u64,
}

#[derive(Debug)]
pub(crate) struct Shared {
    header: NarcHeader,
    fat: FileAllocationTable,
    names: NameTable,
    directories: Vec<DirectoryInfo>,
    files: IndexMap<Box<str>, NarcFileData>,
    data_start: u64,
    data_size: u64,
}

/// NARC archive reader
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_narc_contents(reader: impl Read + Seek) -> nds_narc::error::Result<()> {
///     let mut narc = nds_narc::NarcArchive::new(reader)?;
///
///     for i in 0..narc.len() {
///         let mut file = narc.by_index(i)?;
///         println!("Filename: {}", file.name());
///         std::io::copy(&mut file, &mut std::io::stdout())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct NarcArchive<R> {
    reader: R,
    shared: Arc<Shared>,
}

impl<R> NarcArchive<R> {
    /// Total size of the files in the archive
    pub fn files_size(&self) -> u64 {
        self.shared
            .fat
            .entries()
            .iter()
            .map(|entry| entry.len() as u64)
            .sum()
    }
}

impl<R: Read + Seek> NarcArchive<R> {
    /// Read a NARC archive collecting the files it contains.
    ///
    /// The archive may start anywhere in the stream: its header is expected at the current
    /// position.
    pub fn new(reader: R) -> Result<NarcArchive<R>> {
        Self::with_base_name(reader, DEFAULT_BASE_NAME)
    }

    /// Read a NARC archive, naming files `<base_name>_<index>` if the archive stores no names
    #[instrument(skip(reader), err)]
    pub fn with_base_name(mut reader: R, base_name: &str) -> Result<NarcArchive<R>> {
        let shared = Self::get_metadata(&mut reader, base_name)?;
        Ok(NarcArchive {
            reader,
            shared: shared.into(),
        })
    }

    /// Number of files contained in this archive.
    pub fn len(&self) -> usize {
        self.shared.files.len()
    }

    /// Whether this archive contains no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the file names in this archive, in allocation table order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.shared.files.keys().map(|s| s.as_ref())
    }

    /// Every directory of the archive, in discovery order
    pub fn directories(&self) -> &[DirectoryInfo] {
        &self.shared.directories
    }

    /// Whether the archive stores the names of its entries
    pub fn has_sub_tables(&self) -> bool {
        self.shared.names.has_sub_tables()
    }

    /// Byte order of the archive
    pub fn byte_order(&self) -> ByteOrder {
        self.shared.header.byte_order
    }

    /// The generic header of the archive
    pub fn header(&self) -> &NarcHeader {
        &self.shared.header
    }

    /// The allocation table of the archive
    pub fn allocation_table(&self) -> &FileAllocationTable {
        &self.shared.fat
    }

    /// The name table of the archive
    pub fn name_table(&self) -> &NameTable {
        &self.shared.names
    }

    /// Size of the data section payload
    pub fn data_size(&self) -> u64 {
        self.shared.data_size
    }

    /// Get the index of a file entry by name, if it's present.
    #[inline(always)]
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.shared.files.get_index_of(name)
    }

    /// Get the name of a file entry, if it's present.
    #[inline(always)]
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.shared
            .files
            .get_index(index)
            .map(|(name, _)| name.as_ref())
    }

    /// Search for a file entry by name
    pub fn by_name(&mut self, name: &str) -> Result<NarcFile<'_, R>> {
        let Some(index) = self.shared.files.get_index_of(name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.by_index(index)
    }

    /// Get a contained file by index
    pub fn by_index(&mut self, file_number: usize) -> Result<NarcFile<'_, R>> {
        let (_, data) = self
            .shared
            .files
            .get_index(file_number)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(file_number)))?;

        self.reader.seek(SeekFrom::Start(data.data_start))?;
        Ok(NarcFile {
            data,
            reader: (&mut self.reader).take(data.entry.len() as u64),
        })
    }

    /// Detect the format of a contained file from its first four bytes
    pub fn format_of(&mut self, file_number: usize) -> Result<FileFormat> {
        let mut file = self.by_index(file_number)?;
        if file.size() < 4 {
            return Ok(FileFormat::Unknown);
        }
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        Ok(FileFormat::from_magic(&magic))
    }

    /// Extract every file below `directory`, returning the paths that were written
    ///
    /// Stored names are used verbatim. Files of archives without names are written flat into
    /// `directory` as `<base>_<index>.<extension>`, the extension coming from their content.
    /// Entries may overlap or be listed out of offset order.
    #[instrument(skip(self, directory), fields(directory = %directory.as_ref().display()), err)]
    pub fn extract(&mut self, directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        for info in &self.shared.directories {
            if !info.path.is_empty() {
                fs::create_dir_all(join_archive_path(directory, &info.path))?;
            }
        }

        let (data_start, data_size) = (self.shared.data_start, self.shared.data_size);
        self.reader.seek(SeekFrom::Start(data_start))?;
        let mut data = DataReader::new((&mut self.reader).take(data_size));

        let mut extracted = Vec::with_capacity(self.shared.files.len());
        for file in self.shared.files.values() {
            let start = file.entry.start as u64;
            if !file.entry.is_empty() && start < data.position() {
                debug!(index = file.index, start, "entry starts behind the previous one");
                let reader = data.into_inner().into_inner();
                reader.seek(SeekFrom::Start(data_start + start))?;
                data = DataReader::at(reader.take(data_size - start), start);
            }

            data.extract(&file.entry, |format| {
                let path = if file.synthetic {
                    directory.join(format!("{}.{}", file.path, format.extension()))
                } else {
                    join_archive_path(directory, &file.path)
                };
                let output = BufWriter::new(File::create(&path)?);
                extracted.push(path);
                Ok(output)
            })
            .map_err(|e| e.for_file(file.index))?;
        }

        info!(files = extracted.len(), "extracted archive");
        Ok(extracted)
    }

    /// Unwrap and return the inner reader object
    ///
    /// The position of the reader is undefined.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the size a section declares without consuming it
    fn peek_section(reader: &mut R, position: u64, endian: Endian, section: Section) -> Result<u32> {
        reader.seek(SeekFrom::Start(position))?;
        let header = SectionHeader::read_options(reader, endian, ())
            .map_err(Error::from)
            .and_then(|header| header.expect(section))
            .map_err(|e| e.in_section(section))?;
        reader.seek(SeekFrom::Start(position))?;
        Ok(header.size)
    }

    fn get_metadata(reader: &mut R, base_name: &str) -> Result<Shared> {
        let origin = reader.stream_position()?;
        let header = Self::read_header(reader).map_err(|e| e.in_section(Section::Header))?;
        let endian = header.byte_order.endian();

        let fat_start = origin + header.header_size as u64;
        let fat_size = Self::peek_section(reader, fat_start, endian, Section::FileAllocationTable)?;
        let fat = FileAllocationTable::read(reader, endian)
            .map_err(|e| e.in_section(Section::FileAllocationTable))?;

        let names_start = fat_start + fat_size as u64;
        let names_size = Self::peek_section(reader, names_start, endian, Section::NameTable)?;
        let names =
            NameTable::read(reader, endian).map_err(|e| e.in_section(Section::NameTable))?;

        let data_header_start = names_start + names_size as u64;
        let data_section_size =
            Self::peek_section(reader, data_header_start, endian, Section::Data)?;
        let data_start = data_header_start + SECTION_HEADER_SIZE as u64;
        let data_size = (data_section_size - SECTION_HEADER_SIZE) as u64;

        if let Some((index, entry)) = fat
            .entries()
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.end as u64 > data_size)
        {
            return Err(Error::malformed(format!(
                "file {index} ends at {:#x} past the {data_size:#x} bytes of data",
                entry.end
            ))
            .in_section(Section::Data));
        }

        let archive_size = data_header_start + data_section_size as u64 - origin;
        if header.file_size as u64 != archive_size {
            warn!(
                declared = header.file_size,
                actual = archive_size,
                "header size disagrees with the sections"
            );
        }

        let resolved = names
            .resolve(base_name, fat.len())
            .map_err(|e| e.in_section(Section::NameTable))?;

        let mut files = IndexMap::with_capacity(fat.len());
        for (index, (entry, name)) in fat.entries().iter().zip(resolved.files).enumerate() {
            let path: Box<str> = name.path.into();
            match files.entry(path.clone()) {
                Entry::Occupied(_) => {
                    return Err(Error::malformed(format!("{path:?} is stored more than once"))
                        .in_section(Section::NameTable))
                }
                Entry::Vacant(slot) => {
                    slot.insert(NarcFileData {
                        index,
                        path,
                        directory: name.directory,
                        synthetic: name.synthetic,
                        entry: *entry,
                        data_start: data_start + entry.start as u64,
                    });
                }
            }
        }

        debug!(
            byte_order = %header.byte_order,
            files = files.len(),
            directories = resolved.directories.len(),
            sub_tables = names.has_sub_tables(),
            "read archive metadata"
        );

        Ok(Shared {
            header,
            fat,
            names,
            directories: resolved.directories,
            files,
            data_start,
            data_size,
        })
    }

    fn read_header(reader: &mut R) -> Result<NarcHeader> {
        let header = NarcHeader::read(reader)?;
        if !header.has_valid_magic() {
            return Err(Error::InvalidMagic {
                expected: String::from_utf8_lossy(&NARC_MAGIC).into_owned(),
                found: String::from_utf8_lossy(&header.magic).into_owned(),
            });
        }
        if header.header_size < HEADER_SIZE {
            return Err(Error::malformed(format!(
                "header declares a size of {} bytes",
                header.header_size
            )));
        }
        if header.section_count != 3 {
            return Err(Error::malformed(format!(
                "header declares {} sections",
                header.section_count
            )));
        }
        Ok(header)
    }
}

/// Turn a `/` separated archive path into a path below `root`
fn join_archive_path(root: &Path, path: &str) -> PathBuf {
    path.split('/').fold(root.to_path_buf(), |full, component| full.join(component))
}
