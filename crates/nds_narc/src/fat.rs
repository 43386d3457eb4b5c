//! `BTAF` file allocation table
//!
//! | offset | type        | field                        |
//! |--------|-------------|------------------------------|
//! | 0x00   | `[u8; 4]`   | `BTAF`                       |
//! | 0x04   | `u32`       | section size                 |
//! | 0x08   | `u16`       | file count                   |
//! | 0x0A   | `u16`       | reserved                     |
//! | 0x0C   | `u64` * n   | `start` low, `end` high      |

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinWrite, Endian};
use tracing::{instrument, trace};

use crate::{
    error::{Error, Result},
    io::align4,
    types::{FatEntry, Section, SectionHeader, SECTION_HEADER_SIZE},
};

/// Size of the section header plus the count and reserved fields
const FAT_HEADER_SIZE: u32 = SECTION_HEADER_SIZE + 4;

/// Largest number of files a single archive can describe
pub const MAX_FILES: usize = u16::MAX as usize;

/// The file allocation table of an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAllocationTable {
    entries: Vec<FatEntry>,
}

impl FileAllocationTable {
    /// Lay out files of the given lengths back to back, each starting on a 4 byte boundary
    pub fn from_lengths(lengths: impl IntoIterator<Item = u64>) -> Result<Self> {
        let mut entries = Vec::new();
        let mut current = 0u64;

        for len in lengths {
            let end = current + len;
            entries.push(FatEntry {
                start: u32::try_from(current).map_err(|_| Error::ArchiveTooLarge)?,
                end: u32::try_from(end).map_err(|_| Error::ArchiveTooLarge)?,
            });
            current = align4(end);
        }

        if entries.len() > MAX_FILES {
            return Err(Error::TooManyFiles(entries.len()));
        }

        Ok(Self { entries })
    }

    /// Decode the table, the reader being positioned on its section header
    #[instrument(skip_all, err)]
    pub fn read<R: Read + Seek>(reader: &mut R, endian: Endian) -> Result<Self> {
        let header =
            SectionHeader::read_options(reader, endian, ())?.expect(Section::FileAllocationTable)?;
        let count = u16::read_options(reader, endian, ())?;
        let _reserved = u16::read_options(reader, endian, ())?;

        let required = FAT_HEADER_SIZE as u64 + 8 * count as u64;
        if (header.size as u64) < required {
            return Err(Error::malformed(format!(
                "section declares {} bytes but {count} entries need {required}",
                header.size
            )));
        }

        let entries = (0..count as usize)
            .map(|index| {
                let entry = FatEntry::unpack(u64::read_options(reader, endian, ())?);
                if entry.start > entry.end {
                    return Err(Error::malformed(format!(
                        "entry {index} starts at {:#x} after its end {:#x}",
                        entry.start, entry.end
                    )));
                }
                trace!(index, start = entry.start, end = entry.end, "allocation entry");
                Ok(entry)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    /// Encode the table, section header included
    pub fn write<W: Write + Seek>(&self, writer: &mut W, endian: Endian) -> Result<()> {
        SectionHeader::new(Section::FileAllocationTable, self.size())
            .write_options(writer, endian, ())?;
        (self.entries.len() as u16).write_options(writer, endian, ())?;
        0u16.write_options(writer, endian, ())?;
        for entry in &self.entries {
            entry.pack().write_options(writer, endian, ())?;
        }
        Ok(())
    }

    /// Size of the encoded section, header included
    pub fn size(&self) -> u32 {
        FAT_HEADER_SIZE + 8 * self.entries.len() as u32
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FatEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[FatEntry] {
        &self.entries
    }

    /// Size of the data payload these entries describe, trailing alignment included
    pub fn data_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| align4(entry.end as u64))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::Endian;
    use pretty_assertions::assert_eq;

    use crate::{error::Result, fat::FileAllocationTable, types::FatEntry};

    #[test]
    fn lay_out_two_files() -> Result<()> {
        let fat = FileAllocationTable::from_lengths([10, 3])?;

        assert_eq!(
            fat.entries(),
            &[
                FatEntry { start: 0, end: 10 },
                FatEntry { start: 12, end: 15 }
            ]
        );
        assert_eq!(fat.size(), 28);
        assert_eq!(fat.data_size(), 16);

        Ok(())
    }

    #[test]
    fn every_start_is_aligned() -> Result<()> {
        let lengths = [1u64, 0, 7, 4, 5, 0, 0, 9];
        let fat = FileAllocationTable::from_lengths(lengths)?;

        let mut previous_end = 0u32;
        for (entry, len) in fat.entries().iter().zip(lengths) {
            assert_eq!(entry.start % 4, 0);
            assert_eq!(entry.len() as u64, len);
            assert!(entry.start >= previous_end);
            assert!(entry.start - previous_end < 4);
            previous_end = entry.end;
        }

        Ok(())
    }

    #[test]
    fn empty_table() -> Result<()> {
        let fat = FileAllocationTable::from_lengths([])?;
        assert!(fat.is_empty());
        assert_eq!(fat.size(), 12);
        assert_eq!(fat.data_size(), 0);

        let mut actual = Vec::new();
        fat.write(&mut Cursor::new(&mut actual), Endian::Little)?;
        assert_eq!(
            actual,
            vec![0x42, 0x54, 0x41, 0x46, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );

        Ok(())
    }

    #[test]
    fn write_table() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x42, 0x54, 0x41, 0x46,
            0x1C, 0x00, 0x00, 0x00,
            0x02, 0x00,
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00,
            0x0C, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00,
        ];

        let mut actual = Vec::new();
        FileAllocationTable::from_lengths([10, 3])?
            .write(&mut Cursor::new(&mut actual), Endian::Little)?;

        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn read_big_endian_table() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x42, 0x54, 0x41, 0x46,
            0x00, 0x00, 0x00, 0x1C,
            0x00, 0x02,
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x0C,
        ]);

        let fat = FileAllocationTable::read(&mut input, Endian::Big)?;
        assert_eq!(fat, FileAllocationTable::from_lengths([10, 3])?);

        Ok(())
    }

    #[test]
    fn truncated_table() {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x42, 0x54, 0x41, 0x46,
            0x1C, 0x00, 0x00, 0x00,
            0x02, 0x00,
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00,
        ]);

        assert!(FileAllocationTable::read(&mut input, Endian::Little).is_err());
    }

    #[test]
    fn declared_size_too_small() {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x42, 0x54, 0x41, 0x46,
            0x14, 0x00, 0x00, 0x00,
            0x02, 0x00,
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00,
            0x0C, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00,
        ]);

        assert!(FileAllocationTable::read(&mut input, Endian::Little).is_err());
    }

    #[test]
    fn inverted_entry() {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x42, 0x54, 0x41, 0x46,
            0x14, 0x00, 0x00, 0x00,
            0x01, 0x00,
            0x00, 0x00,
            0x08, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00,
        ]);

        assert!(FileAllocationTable::read(&mut input, Endian::Little).is_err());
    }
}
