//! Seams for reading and writing the little-endian ELF32 wire format.
//!
//! The teacher library this crate grew from parameterized these traits over ELF class and data
//! encoding with const generics, since it had to read any ELF file. `luxld` only ever speaks
//! ELF32 LSB, so the traits are monomorphized to that one wire format.

use crate::error::Result;
use std::io::{Read, Write};

/// Decode an owned instance of a type from a little-endian reader.
pub trait FromReader: Sized {
    /// Decode one instance, advancing `reader` past it.
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self>;
}

/// Encode an instance of a type to a little-endian writer.
pub trait ToWriter {
    /// Encode this value, advancing `writer` past it.
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()>;
}

/// A type whose on-disk size is known without writing it.
pub trait HasWrittenSize {
    /// Size in bytes when written with [`ToWriter::to_writer`].
    const SIZE: usize;
}

macro_rules! impl_le_primitive {
    ($($t:ty),+ $(,)?) => {
        $(
            impl FromReader for $t {
                fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    reader.read_exact(&mut buf)?;
                    Ok(<$t>::from_le_bytes(buf))
                }
            }

            impl ToWriter for $t {
                fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
                    writer.write_all(&self.to_le_bytes())?;
                    Ok(())
                }
            }

            impl HasWrittenSize for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
            }
        )+
    };
}

impl_le_primitive!(u8, i8, u16, i16, u32, i32, u64, i64);

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_u32() {
        let mut buf = Vec::new();
        0xdead_beefu32.to_writer(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(u32::from_reader(&mut cursor).unwrap(), 0xdead_beef);
    }

    #[test]
    fn round_trips_u16_le() {
        let mut buf = Vec::new();
        0x1234u16.to_writer(&mut buf).unwrap();
        assert_eq!(buf, vec![0x34, 0x12]);
    }
}
