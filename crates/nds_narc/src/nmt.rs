//! `BTNF` name table
//!
//! The table starts with one fixed record per directory, in discovery order:
//!
//! | offset | type  | field                                                       |
//! |--------|-------|-------------------------------------------------------------|
//! | 0x00   | `u32` | sub-table offset, relative to the first record               |
//! | 0x04   | `u16` | global index of the directory's first file                  |
//! | 0x06   | `u16` | parent id, or the directory count for the root              |
//!
//! When names are stored, every directory then gets a sub-table listing its child directories
//! (`0x80 | len`, name, `u16` id) followed by its files (`len`, name), closed by a `0x00` byte.
//! Without sub-tables, files get synthetic names built from their global index.

use std::io::{self, Read, Seek, Write};

use binrw::{BinRead, BinWrite, Endian};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, instrument, trace, warn};

use crate::{
    error::{Error, Result},
    fat::MAX_FILES,
    io::{align4, pad, skip},
    tree::{ArchiveTree, DirectoryNode},
    types::{MainTableRecord, Section, SectionHeader, ROOT_DIRECTORY_ID, SECTION_HEADER_SIZE},
};

/// Largest number of directories whose ids fit in `0xF000..=0xFFFF`
pub const MAX_DIRECTORIES: usize = 0x1000;

/// Longest name a sub-table entry can hold
pub const MAX_NAME_LEN: usize = 0x7F;

const RECORD_SIZE: u32 = 8;
const DIRECTORY_FLAG: u8 = 0x80;
const END_OF_TABLE: u8 = 0x00;

/// Root sub-table offset written when no sub-tables are stored
const BARE_ROOT_OFFSET: u32 = 4;

/// One entry of a directory's sub-table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameEntry {
    /// A file stored in the directory
    File { name: String },

    /// A child directory and the id its main table record answers to
    Directory { name: String, id: u16 },
}

impl NameEntry {
    pub fn name(&self) -> &str {
        match self {
            NameEntry::File { name } | NameEntry::Directory { name, .. } => name,
        }
    }

    fn encoded_len(&self) -> u32 {
        match self {
            NameEntry::File { name } => 1 + name.len() as u32,
            NameEntry::Directory { name, .. } => 3 + name.len() as u32,
        }
    }
}

/// A directory as described by a decoded name table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInfo {
    /// Identifier, `0xF000` for the root
    pub id: u16,

    /// Name inside its parent, `None` for the root or when no sub-tables are stored
    pub name: Option<String>,

    /// Identifier of the parent directory, `None` for the root
    pub parent_id: Option<u16>,

    /// Path relative to the archive root, components separated by `/`
    pub path: String,

    /// Global index of the first file stored in this directory
    pub first_file: usize,

    /// Number of files stored directly in this directory
    pub file_count: usize,
}

/// A file name as described by a decoded name table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Discovery position of the directory holding the file
    pub directory: usize,

    /// Name of the file inside its directory
    pub name: String,

    /// Path relative to the archive root, components separated by `/`
    pub path: String,

    /// Whether the name was generated because the archive stores none
    pub synthetic: bool,
}

/// Every directory and file name of an archive, files in allocation table order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNames {
    pub directories: Vec<DirectoryInfo>,
    pub files: Vec<ResolvedFile>,
}

/// The name table of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable {
    records: Vec<MainTableRecord>,
    sub_tables: Option<Vec<Vec<NameEntry>>>,
}

impl NameTable {
    /// Build the table describing `tree`, optionally storing the names of every entry
    #[instrument(skip(tree), err)]
    pub fn build(tree: &ArchiveTree, with_sub_tables: bool) -> Result<Self> {
        let directories = tree.directories();
        if directories.len() > MAX_DIRECTORIES {
            return Err(Error::TooManyDirectories(directories.len()));
        }
        if tree.file_count() > MAX_FILES {
            return Err(Error::TooManyFiles(tree.file_count()));
        }

        let parents = frontier_parents(&directories);
        let mut first_file = 0usize;
        let mut records = directories
            .iter()
            .zip(parents)
            .enumerate()
            .map(|(position, (directory, parent_id))| {
                let record = MainTableRecord {
                    sub_table_offset: 0,
                    first_file_id: first_file as u16,
                    parent_id: if position == 0 {
                        directories.len() as u16
                    } else {
                        parent_id
                    },
                };
                first_file += directory.files.len();
                record
            })
            .collect::<Vec<_>>();

        let sub_tables = if with_sub_tables {
            let tables = build_sub_tables(tree, &directories)?;
            let mut offset = RECORD_SIZE * records.len() as u32;
            for (record, table) in records.iter_mut().zip(&tables) {
                record.sub_table_offset = offset;
                offset += sub_table_len(table);
            }
            Some(tables)
        } else {
            records[0].sub_table_offset = BARE_ROOT_OFFSET;
            None
        };

        debug!(
            directories = records.len(),
            sub_tables = sub_tables.is_some(),
            "built name table"
        );

        Ok(Self {
            records,
            sub_tables,
        })
    }

    /// Decode the table, the reader being positioned on its section header
    #[instrument(skip_all, err)]
    pub fn read<R: Read + Seek>(reader: &mut R, endian: Endian) -> Result<Self> {
        let header = SectionHeader::read_options(reader, endian, ())?.expect(Section::NameTable)?;
        let payload = header.payload_size() as u64;
        if payload < RECORD_SIZE as u64 {
            return Err(Error::malformed("section cannot hold the root record"));
        }

        let root = MainTableRecord::read_options(reader, endian, ())?;
        let count = root.parent_id as usize;
        if count == 0 || count > MAX_DIRECTORIES {
            return Err(Error::malformed(format!(
                "root record declares {count} directories"
            )));
        }

        let records_size = RECORD_SIZE as u64 * count as u64;
        if payload < records_size {
            return Err(Error::malformed(format!(
                "section holds {payload} bytes but {count} records need {records_size}"
            )));
        }

        let mut records = Vec::with_capacity(count);
        records.push(root);
        for _ in 1..count {
            records.push(MainTableRecord::read_options(reader, endian, ())?);
        }

        let sub_tables = if payload > records_size {
            let mut remaining = reader.by_ref().take(payload - records_size);
            let tables = read_sub_tables(&mut remaining, &records, records_size, endian)?;
            io::copy(&mut remaining, &mut io::sink())?;
            Some(tables)
        } else {
            None
        };

        debug!(
            directories = count,
            sub_tables = sub_tables.is_some(),
            "read name table"
        );

        Ok(Self {
            records,
            sub_tables,
        })
    }

    /// Encode the table, section header and trailing padding included
    pub fn write<W: Write + Seek>(&self, writer: &mut W, endian: Endian) -> Result<()> {
        let size = self.size();
        SectionHeader::new(Section::NameTable, size).write_options(writer, endian, ())?;
        for record in &self.records {
            record.write_options(writer, endian, ())?;
        }

        let mut written = SECTION_HEADER_SIZE + RECORD_SIZE * self.records.len() as u32;
        for table in self.sub_tables.iter().flatten() {
            for entry in table {
                match entry {
                    NameEntry::File { name } => {
                        writer.write_u8(name.len() as u8)?;
                        writer.write_all(name.as_bytes())?;
                    }
                    NameEntry::Directory { name, id } => {
                        writer.write_u8(DIRECTORY_FLAG | name.len() as u8)?;
                        writer.write_all(name.as_bytes())?;
                        id.write_options(writer, endian, ())?;
                    }
                }
            }
            writer.write_u8(END_OF_TABLE)?;
            written += sub_table_len(table);
        }

        pad(writer, (size - written) as u64)
    }

    /// Size of the encoded section, header and padding included
    pub fn size(&self) -> u32 {
        let records = SECTION_HEADER_SIZE + RECORD_SIZE * self.records.len() as u32;
        match &self.sub_tables {
            None => records,
            Some(tables) => {
                let total = records + tables.iter().map(|table| sub_table_len(table)).sum::<u32>();
                align4(total as u64) as u32
            }
        }
    }

    pub fn records(&self) -> &[MainTableRecord] {
        &self.records
    }

    pub fn sub_tables(&self) -> Option<&[Vec<NameEntry>]> {
        self.sub_tables.as_deref()
    }

    pub fn has_sub_tables(&self) -> bool {
        self.sub_tables.is_some()
    }

    pub fn directory_count(&self) -> usize {
        self.records.len()
    }

    /// Identifiers of every directory, in discovery order
    pub fn directory_ids(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.records.len()).map(|position| ROOT_DIRECTORY_ID + position as u16)
    }

    /// Work out the path of every directory and file
    ///
    /// Without sub-tables every file is named `<base_name>_<index>` and placed at the root.
    #[instrument(skip(self), err)]
    pub fn resolve(&self, base_name: &str, file_count: usize) -> Result<ResolvedNames> {
        match &self.sub_tables {
            Some(tables) => self.resolve_stored(tables, file_count),
            None => self.resolve_synthetic(base_name, file_count),
        }
    }

    fn resolve_stored(&self, tables: &[Vec<NameEntry>], file_count: usize) -> Result<ResolvedNames> {
        let count = self.records.len();
        let mut parents: Vec<Option<usize>> = vec![None; count];
        let mut names: Vec<Option<&str>> = vec![None; count];

        for (position, table) in tables.iter().enumerate() {
            for entry in table {
                let NameEntry::Directory { name, id } = entry else {
                    continue;
                };
                let child = (*id as usize)
                    .checked_sub(ROOT_DIRECTORY_ID as usize)
                    .filter(|child| (1..count).contains(child))
                    .ok_or_else(|| {
                        Error::malformed(format!(
                            "directory {name:?} has id {id:#06x}, outside of the {count} directories"
                        ))
                    })?;
                if parents[child].replace(position).is_some() {
                    return Err(Error::malformed(format!(
                        "directory {id:#06x} is listed more than once"
                    )));
                }
                names[child] = Some(name.as_str());
            }
        }

        let mut directories = Vec::with_capacity(count);
        for (position, (record, table)) in self.records.iter().zip(tables).enumerate() {
            let id = ROOT_DIRECTORY_ID + position as u16;
            let path = directory_path(position, &parents, &names)?;
            let parent_id = parents[position].map(|parent| ROOT_DIRECTORY_ID + parent as u16);

            if let Some(parent_id) = parent_id {
                if record.parent_id != parent_id {
                    warn!(
                        id,
                        recorded = record.parent_id,
                        listed = parent_id,
                        "parent id disagrees with the directory listing"
                    );
                }
            }

            directories.push(DirectoryInfo {
                id,
                name: names[position].map(str::to_owned),
                parent_id,
                path,
                first_file: record.first_file_id as usize,
                file_count: table
                    .iter()
                    .filter(|entry| matches!(entry, NameEntry::File { .. }))
                    .count(),
            });
        }

        let mut files: Vec<Option<ResolvedFile>> = vec![None; file_count];
        for (position, table) in tables.iter().enumerate() {
            let directory = &directories[position];
            let names = table.iter().filter_map(|entry| match entry {
                NameEntry::File { name } => Some(name),
                NameEntry::Directory { .. } => None,
            });

            for (offset, name) in names.enumerate() {
                let index = directory.first_file + offset;
                let slot = files.get_mut(index).ok_or_else(|| {
                    Error::malformed(format!(
                        "file {name:?} has index {index} but only {file_count} files are allocated"
                    ))
                })?;
                if slot.is_some() {
                    return Err(Error::malformed(format!(
                        "file index {index} is named more than once"
                    )));
                }
                *slot = Some(ResolvedFile {
                    directory: position,
                    name: name.clone(),
                    path: join_path(&directory.path, name),
                    synthetic: false,
                });
            }
        }

        let files = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                file.ok_or_else(|| Error::malformed(format!("file {index} is not named")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedNames { directories, files })
    }

    fn resolve_synthetic(&self, base_name: &str, file_count: usize) -> Result<ResolvedNames> {
        let mut directories = Vec::with_capacity(self.records.len());
        for (position, record) in self.records.iter().enumerate() {
            let first_file = record.first_file_id as usize;
            let next = self
                .records
                .get(position + 1)
                .map_or(file_count, |next| next.first_file_id as usize);
            let count = next.checked_sub(first_file).ok_or_else(|| {
                Error::malformed(format!(
                    "directory {position} starts at file {first_file} but the next one starts at {next}"
                ))
            })?;

            directories.push(DirectoryInfo {
                id: ROOT_DIRECTORY_ID + position as u16,
                name: None,
                parent_id: (position > 0).then_some(record.parent_id),
                path: String::new(),
                first_file,
                file_count: count,
            });
        }

        let mut owners = vec![0usize; file_count];
        for (position, directory) in directories.iter().enumerate() {
            owners
                .iter_mut()
                .skip(directory.first_file)
                .take(directory.file_count)
                .for_each(|owner| *owner = position);
        }

        let files = owners
            .into_iter()
            .enumerate()
            .map(|(index, directory)| {
                let name = format!("{base_name}_{index}");
                ResolvedFile {
                    directory,
                    path: name.clone(),
                    name,
                    synthetic: true,
                }
            })
            .collect();

        Ok(ResolvedNames { directories, files })
    }
}

/// Whether `name` can be stored in a sub-table and safely used as a path component
pub fn is_valid_name(name: &[u8]) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name != b"."
        && name != b".."
        && !name.iter().any(|byte| matches!(byte, b'/' | b'\\'))
}

fn checked_name(name: &str) -> Result<String> {
    if is_valid_name(name.as_bytes()) {
        Ok(name.to_owned())
    } else {
        Err(Error::InvalidName(name.to_owned()))
    }
}

/// Parent ids assigned the way the Nitro SDK tools walk the directory list
///
/// The parent advances to the next directory each time the current one runs out of children,
/// which matches the real parent for every breadth-first ordering.
fn frontier_parents(directories: &[&DirectoryNode]) -> Vec<u16> {
    let count = directories.len();
    let mut parents = vec![ROOT_DIRECTORY_ID; count];
    let mut parent = ROOT_DIRECTORY_ID;
    let mut current = 0usize;
    let mut remaining = directories[0].children.len() as isize;

    for position in 1..count {
        parents[position] = parent;
        remaining -= 1;
        while position < count - 1 && current < position && remaining == 0 {
            parent += 1;
            current += 1;
            remaining = directories[current].children.len() as isize;
        }
    }

    parents
}

fn build_sub_tables(
    tree: &ArchiveTree,
    directories: &[&DirectoryNode],
) -> Result<Vec<Vec<NameEntry>>> {
    let mut next_id = ROOT_DIRECTORY_ID;
    directories
        .iter()
        .map(|directory| {
            let mut entries = Vec::with_capacity(directory.children.len() + directory.files.len());
            for &child in &directory.children {
                let name = tree
                    .directory(child)
                    .and_then(|child| child.name.as_deref())
                    .ok_or_else(|| Error::InvalidName(String::new()))?;
                next_id += 1;
                entries.push(NameEntry::Directory {
                    name: checked_name(name)?,
                    id: next_id,
                });
            }
            for file in &directory.files {
                entries.push(NameEntry::File {
                    name: checked_name(&file.name)?,
                });
            }
            Ok(entries)
        })
        .collect()
}

fn read_sub_tables<R: Read>(
    reader: &mut R,
    records: &[MainTableRecord],
    start: u64,
    endian: Endian,
) -> Result<Vec<Vec<NameEntry>>> {
    let mut position = start;
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let offset = record.sub_table_offset as u64;
            if offset < position {
                return Err(Error::malformed(format!(
                    "sub-table of directory {index} at {offset:#x} overlaps data ending at {position:#x}"
                )));
            }
            skip(reader, offset - position)?;
            position = offset;

            let mut entries = Vec::new();
            loop {
                let kind = reader.read_u8()?;
                position += 1;
                match kind {
                    END_OF_TABLE => break,
                    DIRECTORY_FLAG => {
                        return Err(Error::malformed(format!(
                            "directory {index} lists a directory with an empty name"
                        )))
                    }
                    _ => {
                        let mut raw = vec![0u8; (kind & !DIRECTORY_FLAG) as usize];
                        reader.read_exact(&mut raw)?;
                        position += raw.len() as u64;

                        if !is_valid_name(&raw) {
                            return Err(Error::InvalidName(
                                String::from_utf8_lossy(&raw).into_owned(),
                            ));
                        }
                        let name = String::from_utf8(raw).map_err(|e| {
                            Error::InvalidName(String::from_utf8_lossy(e.as_bytes()).into_owned())
                        })?;

                        if kind & DIRECTORY_FLAG == 0 {
                            entries.push(NameEntry::File { name });
                        } else {
                            let id = match endian {
                                Endian::Little => reader.read_u16::<LittleEndian>()?,
                                Endian::Big => reader.read_u16::<BigEndian>()?,
                            };
                            position += 2;
                            entries.push(NameEntry::Directory { name, id });
                        }
                    }
                }
            }

            trace!(index, offset, entries = entries.len(), "sub-table");
            Ok(entries)
        })
        .collect()
}

fn sub_table_len(table: &[NameEntry]) -> u32 {
    table.iter().map(NameEntry::encoded_len).sum::<u32>() + 1
}

fn directory_path(
    position: usize,
    parents: &[Option<usize>],
    names: &[Option<&str>],
) -> Result<String> {
    let mut components = Vec::new();
    let mut current = position;
    while current != 0 {
        if components.len() >= parents.len() {
            return Err(Error::malformed(format!(
                "directory {:#06x} is its own ancestor",
                ROOT_DIRECTORY_ID + position as u16
            )));
        }
        let (Some(parent), Some(name)) = (parents[current], names[current]) else {
            return Err(Error::malformed(format!(
                "directory {:#06x} is not listed by any directory",
                ROOT_DIRECTORY_ID + current as u16
            )));
        };
        components.push(name);
        current = parent;
    }
    components.reverse();
    Ok(components.join("/"))
}

fn join_path(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        name.to_owned()
    } else {
        format!("{directory}/{name}")
    }
}
