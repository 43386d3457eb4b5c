//! Base types for structure of NARC file.

use std::fmt;

use binrw::{BinRead, BinWrite, Endian};

use crate::error::{Error, Result};

/// Magic found at the start of every archive
pub const NARC_MAGIC: [u8; 4] = *b"NARC";

/// Byte-swapped variant of [`NARC_MAGIC`]
pub const NARC_MAGIC_SWAPPED: [u8; 4] = *b"CRAN";

/// Version written into new archives
pub const NARC_VERSION: u16 = 0x0100;

/// Size of the generic archive header
pub const HEADER_SIZE: u16 = 16;

/// Size of the `{magic, size}` header starting every section
pub const SECTION_HEADER_SIZE: u32 = 8;

/// Identifier of the root directory
pub const ROOT_DIRECTORY_ID: u16 = 0xF000;

/// Byte order declared by the archive header
///
/// The mark is always read as little endian: `0xFFFE` means every following field is little endian,
/// `0xFEFF` means it is big endian.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[brw(repr = u16)]
pub enum ByteOrder {
    /// Little endian, as written by the Nitro SDK tools
    #[default]
    Little = 0xFFFE,

    /// Big endian
    Big = 0xFEFF,
}

impl ByteOrder {
    pub fn is_little(&self) -> bool {
        *self == ByteOrder::Little
    }

    /// The [`binrw::Endian`] used for every field after the byte order mark
    pub fn endian(&self) -> Endian {
        match self {
            ByteOrder::Little => Endian::Little,
            ByteOrder::Big => Endian::Big,
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little endian"),
            ByteOrder::Big => write!(f, "big endian"),
        }
    }
}

/// The parts an archive is made of, used to give errors context
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Section {
    /// The generic `NARC` header
    Header,
    /// The `BTAF` file allocation table
    FileAllocationTable,
    /// The `BTNF` name table
    NameTable,
    /// The `GMIF` file data
    Data,
}

impl Section {
    /// Magic this section starts with
    pub const fn magic(&self) -> [u8; 4] {
        match self {
            Section::Header => NARC_MAGIC,
            Section::FileAllocationTable => *b"BTAF",
            Section::NameTable => *b"BTNF",
            Section::Data => *b"GMIF",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.magic()))
    }
}

/// NARC file header
///
/// Defines the header of the NARC file which always starts with "NARC" and then a byte order mark.
/// All fields after the mark use the byte order it declares.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct NarcHeader {
    /// Either [`NARC_MAGIC`] or [`NARC_MAGIC_SWAPPED`]
    pub magic: [u8; 4],

    /// The byte order of every following field
    pub byte_order: ByteOrder,

    /// Format version
    #[brw(is_little = byte_order.is_little())]
    pub version: u16,

    /// The size of the whole archive, header included
    #[brw(is_little = byte_order.is_little())]
    pub file_size: u32,

    /// The size of this header, sections start right after it
    #[brw(is_little = byte_order.is_little())]
    pub header_size: u16,

    /// The number of sections following the header
    #[brw(is_little = byte_order.is_little())]
    pub section_count: u16,
}

impl NarcHeader {
    pub fn new(byte_order: ByteOrder, file_size: u32) -> Self {
        Self {
            byte_order,
            file_size,
            ..Default::default()
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == NARC_MAGIC || self.magic == NARC_MAGIC_SWAPPED
    }
}

impl Default for NarcHeader {
    fn default() -> Self {
        Self {
            magic: NARC_MAGIC,
            byte_order: Default::default(),
            version: NARC_VERSION,
            file_size: HEADER_SIZE as u32,
            header_size: HEADER_SIZE,
            section_count: 3,
        }
    }
}

/// Common header of the three sections
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section magic, see [`Section::magic`]
    pub magic: [u8; 4],

    /// Size of the section, this header included
    pub size: u32,
}

impl SectionHeader {
    pub fn new(section: Section, size: u32) -> Self {
        Self {
            magic: section.magic(),
            size,
        }
    }

    /// Ensure this header starts the requested section
    pub fn expect(self, section: Section) -> Result<Self> {
        if self.magic != section.magic() {
            return Err(Error::InvalidMagic {
                expected: section.to_string(),
                found: String::from_utf8_lossy(&self.magic).into_owned(),
            });
        }

        if self.size < SECTION_HEADER_SIZE {
            return Err(Error::malformed(format!(
                "declared size {} is smaller than the section header",
                self.size
            )));
        }

        Ok(self)
    }

    /// Size of the data following this header
    pub fn payload_size(&self) -> u32 {
        self.size.saturating_sub(SECTION_HEADER_SIZE)
    }
}

/// Fixed-size name table record, one per directory
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MainTableRecord {
    /// Offset of the directory's sub-table from the start of the name table data
    pub sub_table_offset: u32,

    /// Global index of the first file stored in this directory
    pub first_file_id: u16,

    /// Identifier of the parent directory
    ///
    /// For the root directory this holds the total directory count instead.
    pub parent_id: u16,
}

/// Location of a file inside the data section
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FatEntry {
    /// Offset of the first byte, relative to the data section payload
    pub start: u32,

    /// Offset one past the last byte
    pub end: u32,
}

impl FatEntry {
    /// Split a packed entry: low 32 bits are the start, high 32 bits the end
    pub fn unpack(packed: u64) -> Self {
        Self {
            start: (packed & 0xFFFF_FFFF) as u32,
            end: (packed >> 32) as u32,
        }
    }

    pub fn pack(&self) -> u64 {
        ((self.end as u64) << 32) | self.start as u64
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite, Endian};
    use pretty_assertions::assert_eq;

    use crate::error::Result;
    use crate::types::{
        ByteOrder, FatEntry, MainTableRecord, NarcHeader, Section, SectionHeader,
    };

    #[test]
    fn read_little_endian_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x4E, 0x41, 0x52, 0x43,
            0xFE, 0xFF,
            0x00, 0x01,
            0x5C, 0x00, 0x00, 0x00,
            0x10, 0x00,
            0x03, 0x00,
        ]);

        let expected = NarcHeader {
            file_size: 0x5C,
            ..Default::default()
        };

        assert_eq!(NarcHeader::read(&mut input)?, expected);

        Ok(())
    }

    #[test]
    fn read_big_endian_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x4E, 0x41, 0x52, 0x43,
            0xFF, 0xFE,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x5C,
            0x00, 0x10,
            0x00, 0x03,
        ]);

        let header = NarcHeader::read(&mut input)?;
        assert_eq!(header.byte_order, ByteOrder::Big);
        assert_eq!(header.version, 0x0100);
        assert_eq!(header.file_size, 0x5C);
        assert_eq!(header.header_size, 16);
        assert_eq!(header.section_count, 3);

        Ok(())
    }

    #[test]
    fn write_header() -> Result<()> {
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x4E, 0x41, 0x52, 0x43,
            0xFE, 0xFF,
            0x00, 0x01,
            0x70, 0x00, 0x00, 0x00,
            0x10, 0x00,
            0x03, 0x00,
        ];

        let mut actual = Vec::new();
        NarcHeader::new(ByteOrder::Little, 0x70).write(&mut Cursor::new(&mut actual))?;

        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn write_big_endian_header() -> Result<()> {
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x4E, 0x41, 0x52, 0x43,
            0xFF, 0xFE,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x70,
            0x00, 0x10,
            0x00, 0x03,
        ];

        let mut actual = Vec::new();
        NarcHeader::new(ByteOrder::Big, 0x70).write(&mut Cursor::new(&mut actual))?;

        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn swapped_magic_is_valid() {
        let header = NarcHeader {
            magic: *b"CRAN",
            ..Default::default()
        };
        assert!(header.has_valid_magic());

        let header = NarcHeader {
            magic: *b"SARC",
            ..Default::default()
        };
        assert!(!header.has_valid_magic());
    }

    #[test]
    fn read_section_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x42, 0x54, 0x41, 0x46,
            0x1C, 0x00, 0x00, 0x00,
        ]);

        let header = SectionHeader::read_options(&mut input, Endian::Little, ())?
            .expect(Section::FileAllocationTable)?;
        assert_eq!(header.size, 28);
        assert_eq!(header.payload_size(), 20);

        Ok(())
    }

    #[test]
    fn section_header_with_wrong_magic() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x42, 0x54, 0x4E, 0x46,
            0x1C, 0x00, 0x00, 0x00,
        ]);

        let header = SectionHeader::read_options(&mut input, Endian::Little, ())?;
        assert!(header.expect(Section::FileAllocationTable).is_err());

        Ok(())
    }

    #[test]
    fn read_main_table_record() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x1D, 0x00, 0x00, 0x00,
            0x01, 0x00,
            0x00, 0xF0,
        ]);

        let expected = MainTableRecord {
            sub_table_offset: 29,
            first_file_id: 1,
            parent_id: 0xF000,
        };

        assert_eq!(
            MainTableRecord::read_options(&mut input, Endian::Little, ())?,
            expected
        );

        Ok(())
    }

    #[test]
    fn write_big_endian_main_table_record() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x00, 0x00, 0x00, 0x10,
            0x00, 0x00,
            0x00, 0x02,
        ];

        let record = MainTableRecord {
            sub_table_offset: 16,
            first_file_id: 0,
            parent_id: 2,
        };

        let mut actual = Vec::new();
        record.write_options(&mut Cursor::new(&mut actual), Endian::Big, ())?;

        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn fat_entry_packing() {
        let entry = FatEntry { start: 12, end: 15 };
        assert_eq!(entry.pack(), 0x0000_000F_0000_000C);
        assert_eq!(FatEntry::unpack(0x0000_000F_0000_000C), entry);
        assert_eq!(entry.len(), 3);
        assert!(!entry.is_empty());
        assert!(FatEntry { start: 4, end: 4 }.is_empty());
    }
}
