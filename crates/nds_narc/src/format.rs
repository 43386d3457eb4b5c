//! Detection of the sibling formats stored inside archives.

use std::fmt;

/// Extension given to files whose format is not recognised
pub const GENERIC_EXTENSION: &str = "bin";

/// Formats recognised from the first four bytes of an archived file
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// `NCLR` color palette
    Palette,
    /// `NCGR` character graphics (tiles)
    Tile,
    /// `NSCR` screen map
    Screen,
    /// Nested `NARC` archive
    Archive,
    /// Anything else
    Unknown,
}

/// Both byte orders of every known magic
const MAGICS: [(&[u8; 4], FileFormat); 8] = [
    (b"NCLR", FileFormat::Palette),
    (b"RLCN", FileFormat::Palette),
    (b"NCGR", FileFormat::Tile),
    (b"RGCN", FileFormat::Tile),
    (b"NSCR", FileFormat::Screen),
    (b"RCSN", FileFormat::Screen),
    (b"NARC", FileFormat::Archive),
    (b"CRAN", FileFormat::Archive),
];

impl FileFormat {
    /// Match a magic against the known formats, ignoring ASCII case
    pub fn from_magic(magic: &[u8]) -> Self {
        MAGICS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(magic))
            .map_or(FileFormat::Unknown, |(_, format)| *format)
    }

    /// Extension used when extracting a file of this format
    pub const fn extension(&self) -> &'static str {
        match self {
            FileFormat::Palette => "nclr",
            FileFormat::Tile => "ncgr",
            FileFormat::Screen => "nscr",
            FileFormat::Archive => "narc",
            FileFormat::Unknown => GENERIC_EXTENSION,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Palette => write!(f, "palette"),
            FileFormat::Tile => write!(f, "tile"),
            FileFormat::Screen => write!(f, "screen"),
            FileFormat::Archive => write!(f, "archive"),
            FileFormat::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::format::FileFormat;

    #[test]
    fn known_magics() {
        assert_eq!(FileFormat::from_magic(b"RLCN"), FileFormat::Palette);
        assert_eq!(FileFormat::from_magic(b"NCGR"), FileFormat::Tile);
        assert_eq!(FileFormat::from_magic(b"RCSN"), FileFormat::Screen);
        assert_eq!(FileFormat::from_magic(b"NARC"), FileFormat::Archive);
        assert_eq!(FileFormat::from_magic(b"CRAN").extension(), "narc");
    }

    #[test]
    fn magic_case_is_ignored() {
        assert_eq!(FileFormat::from_magic(b"rlcn"), FileFormat::Palette);
        assert_eq!(FileFormat::from_magic(b"nScR"), FileFormat::Screen);
    }

    #[test]
    fn unknown_magic_falls_back_to_bin() {
        assert_eq!(FileFormat::from_magic(b"SDAT"), FileFormat::Unknown);
        assert_eq!(FileFormat::from_magic(&[0xFF, 0x00, 0x12, 0x34]).extension(), "bin");
        assert_eq!(FileFormat::from_magic(b"NCL"), FileFormat::Unknown);
    }
}
