//! Stream helpers shared by the section codecs.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Byte used to fill alignment gaps
pub(crate) const PADDING_BYTE: u8 = 0xFF;

/// Round `value` up to the next multiple of 4
pub(crate) const fn align4(value: u64) -> u64 {
    (value + 3) & !3
}

/// Discard exactly `count` bytes from `reader`
pub(crate) fn skip<R: Read>(reader: &mut R, count: u64) -> Result<()> {
    let skipped = io::copy(&mut reader.take(count), &mut io::sink())?;
    if skipped != count {
        return Err(Error::IOError(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected to skip {count} bytes, stream ended after {skipped}"),
        )));
    }
    Ok(())
}

/// Write `count` padding bytes
pub(crate) fn pad<W: Write>(writer: &mut W, count: u64) -> Result<()> {
    io::copy(&mut io::repeat(PADDING_BYTE).take(count), writer)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use crate::io::{align4, pad, skip};

    #[test]
    fn align_to_four() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(10), 12);
        assert_eq!(align4(12), 12);
        assert_eq!(align4(15), 16);
    }

    #[test]
    fn skip_past_end() {
        let mut input = Cursor::new(vec![0u8; 3]);
        assert!(skip(&mut input, 2).is_ok());
        assert!(skip(&mut input, 2).is_err());
    }

    #[test]
    fn pad_with_ff() {
        let mut output = Vec::new();
        pad(&mut output, 3).unwrap();
        assert_eq!(output, vec![0xFF, 0xFF, 0xFF]);
    }
}
