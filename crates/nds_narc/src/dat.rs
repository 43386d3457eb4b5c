//! `GMIF` data section
//!
//! The payload holds every file back to back in allocation table order. Each file starts on a 4
//! byte boundary, gaps and the end of the section are filled with `0xFF`.

use std::io::{self, Read, Seek, Write};

use binrw::{BinWrite, Endian};
use tracing::{instrument, trace};

use crate::{
    error::{Error, Result},
    fat::FileAllocationTable,
    format::FileFormat,
    io::{pad, skip},
    tree::FileEntry,
    types::{FatEntry, Section, SectionHeader, SECTION_HEADER_SIZE},
};

/// Size of the data section described by `fat`, header included
pub fn section_size(fat: &FileAllocationTable) -> Result<u32> {
    u32::try_from(SECTION_HEADER_SIZE as u64 + fat.data_size()).map_err(|_| Error::ArchiveTooLarge)
}

/// Write the data section, copying every file at the offset `fat` assigns to it
#[instrument(skip_all, fields(files = fat.len()), err)]
pub fn write<'a, W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    fat: &FileAllocationTable,
    files: impl IntoIterator<Item = &'a FileEntry>,
) -> Result<()> {
    SectionHeader::new(Section::Data, section_size(fat)?).write_options(writer, endian, ())?;

    let mut current = 0u64;
    let mut written = 0usize;
    for (index, (entry, file)) in fat.entries().iter().zip(files).enumerate() {
        write_entry(writer, entry, file, current).map_err(|e| e.for_file(index))?;
        current = entry.end as u64;
        written += 1;
    }

    if written != fat.len() {
        return Err(Error::CustomError(format!(
            "allocation table describes {} files but {written} were provided",
            fat.len()
        )));
    }

    pad(writer, fat.data_size() - current)
}

fn write_entry<W: Write>(
    writer: &mut W,
    entry: &FatEntry,
    file: &FileEntry,
    current: u64,
) -> Result<()> {
    pad(writer, entry.start as u64 - current)?;

    let expected = entry.len() as u64;
    let mut source = file.source.open()?;
    let actual = io::copy(&mut source.by_ref().take(expected + 1), writer)?;
    if actual != expected {
        return Err(Error::SourceChanged {
            path: file.source.display_path(),
            expected,
            actual,
        });
    }

    trace!(name = %file.name, start = entry.start, end = entry.end, "copied file");
    Ok(())
}

/// Sequential reader over the payload of a data section
///
/// Non-empty entries must be visited in increasing offset order, which is the order the
/// allocation table lists them in for every archive this crate writes.
pub struct DataReader<R> {
    reader: R,
    position: u64,
}

impl<R: Read> DataReader<R> {
    /// Wrap a reader positioned on the first byte of the payload
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
        }
    }

    /// Wrap a reader positioned on the byte at `position` of the payload
    pub fn at(reader: R, position: u64) -> Self {
        Self { reader, position }
    }

    /// Offset of the next byte to be read, relative to the payload
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Discard bytes up to `start`
    pub fn skip_to(&mut self, start: u64) -> Result<()> {
        if start < self.position {
            return Err(Error::malformed(format!(
                "entry starts at {start:#x}, before the current position {:#x}",
                self.position
            )));
        }
        skip(&mut self.reader, start - self.position)?;
        self.position = start;
        Ok(())
    }

    /// Copy one entry out of the payload
    ///
    /// The first four bytes are read before `open` is called so the output can be named after the
    /// detected format. Empty entries and entries shorter than a magic are reported as
    /// [`FileFormat::Unknown`]. Empty entries are never read, wherever they point.
    pub fn extract<W: Write>(
        &mut self,
        entry: &FatEntry,
        open: impl FnOnce(FileFormat) -> Result<W>,
    ) -> Result<FileFormat> {
        if entry.is_empty() {
            open(FileFormat::Unknown)?.flush()?;
            return Ok(FileFormat::Unknown);
        }

        self.skip_to(entry.start as u64)?;

        let len = entry.len() as u64;
        let mut magic = [0u8; 4];
        let head = len.min(magic.len() as u64) as usize;
        self.reader.read_exact(&mut magic[..head])?;

        let format = if head < magic.len() {
            FileFormat::Unknown
        } else {
            FileFormat::from_magic(&magic)
        };

        let mut output = open(format)?;
        output.write_all(&magic[..head])?;

        let rest = len - head as u64;
        let copied = io::copy(&mut self.reader.by_ref().take(rest), &mut output)?;
        if copied != rest {
            return Err(Error::IOError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("entry ends at {:#x} but the data section stops short", entry.end),
            )));
        }
        output.flush()?;

        self.position = entry.end as u64;
        Ok(format)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::Endian;
    use pretty_assertions::assert_eq;

    use crate::{
        dat::{section_size, write, DataReader},
        error::{Error, Result},
        fat::FileAllocationTable,
        format::FileFormat,
        tree::{FileEntry, FileSource},
        types::FatEntry,
    };

    fn memory_file(name: &str, data: &[u8]) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            source: FileSource::Memory(data.to_vec()),
        }
    }

    #[test]
    fn write_padded_section() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x47, 0x4D, 0x49, 0x46,
            0x18, 0x00, 0x00, 0x00,
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09,
            0xFF, 0xFF,
            0x61, 0x62, 0x63,
            0xFF,
        ];

        let files = vec![
            memory_file("a.bin", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]),
            memory_file("b.bin", b"abc"),
        ];
        let fat = FileAllocationTable::from_lengths(files.iter().map(FileEntry::len))?;
        assert_eq!(section_size(&fat)?, 0x18);

        let mut actual = Vec::new();
        write(&mut Cursor::new(&mut actual), Endian::Little, &fat, &files)?;
        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn empty_files_take_no_space() -> Result<()> {
        let files = vec![
            memory_file("a", b""),
            memory_file("b", b"x"),
            memory_file("c", b""),
        ];
        let fat = FileAllocationTable::from_lengths(files.iter().map(FileEntry::len))?;
        assert_eq!(
            fat.entries(),
            &[
                FatEntry { start: 0, end: 0 },
                FatEntry { start: 0, end: 1 },
                FatEntry { start: 4, end: 4 },
            ]
        );

        let mut actual = Vec::new();
        write(&mut Cursor::new(&mut actual), Endian::Little, &fat, &files)?;
        assert_eq!(&actual[8..], &[0x78, 0xFF, 0xFF, 0xFF][..]);

        Ok(())
    }

    #[test]
    fn source_changed_size() -> Result<()> {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("grown.bin");
        std::fs::write(&path, [0u8; 8])?;

        let files = vec![FileEntry {
            name: "grown.bin".to_string(),
            source: FileSource::Path {
                path: path.clone(),
                len: 4,
            },
        }];
        let fat = FileAllocationTable::from_lengths(files.iter().map(FileEntry::len))?;

        match write(&mut Cursor::new(Vec::new()), Endian::Little, &fat, &files) {
            Err(Error::File { index, source }) => {
                assert_eq!(index, 0);
                assert!(matches!(
                    *source,
                    Error::SourceChanged {
                        expected: 4,
                        actual: 5,
                        ..
                    }
                ));
            }
            other => panic!("expected a file error, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn extract_sniffed_entries() -> Result<()> {
        #[rustfmt::skip]
        let payload = vec![
            0x52, 0x4C, 0x43, 0x4E, 0x01, 0x02,
            0xFF, 0xFF,
            0x61, 0x62,
            0xFF, 0xFF,
            0x53, 0x44, 0x41, 0x54,
        ];
        let entries = [
            FatEntry { start: 0, end: 6 },
            FatEntry { start: 8, end: 10 },
            FatEntry { start: 12, end: 12 },
            FatEntry { start: 12, end: 16 },
        ];

        let mut reader = DataReader::new(Cursor::new(payload));
        let mut outputs = Vec::new();
        let mut formats = Vec::new();
        for entry in &entries {
            let mut output = Vec::new();
            formats.push(reader.extract(entry, |_| Ok(&mut output))?);
            outputs.push(output);
        }

        assert_eq!(
            formats,
            vec![
                FileFormat::Palette,
                FileFormat::Unknown,
                FileFormat::Unknown,
                FileFormat::Unknown
            ]
        );
        assert_eq!(outputs[0], vec![0x52, 0x4C, 0x43, 0x4E, 0x01, 0x02]);
        assert_eq!(outputs[1], b"ab".to_vec());
        assert!(outputs[2].is_empty());
        assert_eq!(outputs[3], b"SDAT".to_vec());
        assert_eq!(reader.position(), 16);

        Ok(())
    }

    #[test]
    fn extract_out_of_order() -> Result<()> {
        let mut reader = DataReader::new(Cursor::new(vec![0u8; 16]));
        reader.extract(&FatEntry { start: 8, end: 12 }, |_| Ok(Vec::new()))?;

        let result = reader.extract(&FatEntry { start: 0, end: 4 }, |_| Ok(Vec::new()));
        assert!(result.is_err());

        Ok(())
    }

    #[test]
    fn extract_empty_entry_behind_position() -> Result<()> {
        let mut reader = DataReader::new(Cursor::new(b"abcdefgh".to_vec()));

        let mut first = Vec::new();
        reader.extract(&FatEntry { start: 0, end: 4 }, |_| Ok(&mut first))?;

        // cleared once the output is opened
        let mut empty = vec![0x2A];
        let sink = &mut empty;
        let format = reader.extract(&FatEntry { start: 0, end: 0 }, move |_| {
            sink.clear();
            Ok(sink)
        })?;
        assert_eq!(format, FileFormat::Unknown);
        assert!(empty.is_empty());
        assert_eq!(reader.position(), 4);

        let mut last = Vec::new();
        reader.extract(&FatEntry { start: 4, end: 8 }, |_| Ok(&mut last))?;
        assert_eq!(first, b"abcd".to_vec());
        assert_eq!(last, b"efgh".to_vec());

        Ok(())
    }

    #[test]
    fn extract_after_restarting() -> Result<()> {
        let mut payload = Cursor::new(b"abcdefgh".to_vec());
        payload.set_position(2);

        let mut reader = DataReader::at(payload, 2);
        let mut output = Vec::new();
        reader.extract(&FatEntry { start: 4, end: 6 }, |_| Ok(&mut output))?;
        assert_eq!(output, b"ef".to_vec());
        assert_eq!(reader.position(), 6);

        Ok(())
    }

    #[test]
    fn extract_truncated_entry() {
        let mut reader = DataReader::new(Cursor::new(vec![0x4E, 0x41, 0x52, 0x43, 0x00]));
        let result = reader.extract(&FatEntry { start: 0, end: 12 }, |_| Ok(Vec::new()));
        assert!(result.is_err());
    }
}
