//! This library handles reading from and creating **NARC** files used by *Nintendo DS* games.
//!
//! # NARC Archive Format Documentation
//!
//! NARC (Nitro ARChive) files bundle the resources of a game (palettes, tiles, screens, nested
//! archives...) into a single file, typically with the `.narc` extension. An archive holds a tree
//! of directories and files, although many archives drop every name and only keep the file
//! contents.
//!
//! ## File Structure
//!
//! A NARC file consists of a header followed by exactly three sections, in this order.
//!
//! | Offset (bytes) | Field           | Description                                                  |
//! |----------------|-----------------|--------------------------------------------------------------|
//! | 0x0000         | Magic number    | 4 bytes: `NARC`, or the byte-swapped `CRAN`                  |
//! | 0x0004         | Byte order mark | 2 bytes: `FE FF` for little endian, `FF FE` for big endian   |
//! | 0x0006         | Version         | 2 bytes: `0x0100`                                            |
//! | 0x0008         | File size       | 4 bytes: Size of the whole archive                           |
//! | 0x000C         | Header size     | 2 bytes: Always 16                                           |
//! | 0x000E         | Section count   | 2 bytes: Always 3                                            |
//!
//! Every field after the byte order mark, including those of the sections, uses the byte order
//! the mark declares.
//!
//! ### Sections
//!
//! Each section starts with a 4 byte magic and a 4 byte size that includes this 8 byte header.
//!
//! | Magic  | Section                | Content                                                    |
//! |--------|------------------------|------------------------------------------------------------|
//! | `BTAF` | File allocation table  | `(start, end)` offset pair of every file                   |
//! | `BTNF` | Name table             | One record per directory, optionally followed by names     |
//! | `GMIF` | File data              | Contents of every file, each aligned on 4 bytes            |
//!
//! ### File Allocation Table
//!
//! A `u16` file count and two reserved bytes, then one `u64` per file: the low 32 bits hold the
//! offset of the first byte, the high 32 bits the offset one past the last byte. Offsets are
//! relative to the start of the data section payload. Files are listed in the order directories
//! are discovered breadth-first from the root, directory by directory.
//!
//! ### Name Table
//!
//! One 8 byte record per directory, in discovery order: the offset of the directory's sub-table,
//! the index of its first file and the id of its parent (`0xF000` for the root, then increasing
//! in discovery order). The root record holds the number of directories instead of a parent.
//!
//! When names are stored, each directory has a sub-table listing its child directories
//! (`0x80 | name length`, name, `u16` id), then its files (name length, name), closed by `0x00`.
//! Archives without sub-tables are extracted with names built from the archive name and the file
//! index, e.g. `pokegra_12.nclr`.
//!
//! ### File Data
//!
//! File contents back to back, padded with `0xFF` so that every file starts on a 4 byte boundary
//! and the section ends on one.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.narc`
//! - **Contained formats**: detected from their first 4 bytes, see [`FileFormat`]
//! - **Limits**: 65535 files and 4096 directories per archive
//!

pub mod archive;
pub mod dat;
pub mod error;
pub mod fat;
pub mod format;
mod io;
pub mod nmt;
pub mod read;
pub mod tree;
pub mod types;
pub mod write;

pub use archive::{Notification, Outcome};
pub use format::FileFormat;
pub use read::NarcArchive;
pub use tree::ArchiveTree;
pub use types::ByteOrder;
pub use write::{NarcWriter, NarcWriterOptions};
