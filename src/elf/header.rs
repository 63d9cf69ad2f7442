//! The ELF file header (gABI figure "ELF Header").

use crate::error::{Error, Result};
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};
use std::path::Path;

/// Size of `e_ident`.
pub const EI_NIDENT: usize = 16;
/// Magic bytes at the start of every ELF file.
pub const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];

pub const ELFCLASS32: u8 = 1;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;

pub const ET_NONE: u16 = 0;
pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

/// The only machine this linker ever produces or consumes.
pub const EM_386: u16 = 3;

#[derive(Debug, Clone)]
/// The 52-byte ELF32 file header.
pub struct ElfHeader {
    pub e_ident: [u8; EI_NIDENT],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl HasWrittenSize for ElfHeader {
    const SIZE: usize = 52;
}

impl ElfHeader {
    /// A zeroed executable header ready to be filled in once layout is known; rewritten in place
    /// by the writer once offsets and the entry point are final.
    pub fn new_exec_template() -> Self {
        let mut e_ident = [0u8; EI_NIDENT];
        e_ident[0..4].copy_from_slice(&ELFMAG);
        e_ident[4] = ELFCLASS32;
        e_ident[5] = ELFDATA2LSB;
        e_ident[6] = EV_CURRENT;
        ElfHeader {
            e_ident,
            e_type: ET_EXEC,
            e_machine: EM_386,
            e_version: EV_CURRENT as u32,
            e_entry: 0,
            e_phoff: 0,
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: Self::SIZE as u16,
            e_phentsize: crate::elf::program::ProgramHeader::SIZE as u16,
            e_phnum: 0,
            e_shentsize: crate::elf::section::SectionHeader::SIZE as u16,
            e_shnum: 0,
            e_shstrndx: 1,
        }
    }

    /// Classify a buffer's leading bytes, without validating the rest of the header.
    pub fn probe_is_elf(buf: &[u8]) -> bool {
        buf.len() >= 4 && buf[0..4] == ELFMAG
    }

    pub fn read(reader: &mut impl Read, path: &Path) -> Result<Self> {
        Self::from_reader(reader).map_err(|_| Error::CorruptElf(path.to_path_buf()))
    }
}

impl FromReader for ElfHeader {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut e_ident = [0u8; EI_NIDENT];
        reader.read_exact(&mut e_ident)?;
        Ok(ElfHeader {
            e_ident,
            e_type: u16::from_reader(reader)?,
            e_machine: u16::from_reader(reader)?,
            e_version: u32::from_reader(reader)?,
            e_entry: u32::from_reader(reader)?,
            e_phoff: u32::from_reader(reader)?,
            e_shoff: u32::from_reader(reader)?,
            e_flags: u32::from_reader(reader)?,
            e_ehsize: u16::from_reader(reader)?,
            e_phentsize: u16::from_reader(reader)?,
            e_phnum: u16::from_reader(reader)?,
            e_shentsize: u16::from_reader(reader)?,
            e_shnum: u16::from_reader(reader)?,
            e_shstrndx: u16::from_reader(reader)?,
        })
    }
}

impl ToWriter for ElfHeader {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.e_ident)?;
        self.e_type.to_writer(writer)?;
        self.e_machine.to_writer(writer)?;
        self.e_version.to_writer(writer)?;
        self.e_entry.to_writer(writer)?;
        self.e_phoff.to_writer(writer)?;
        self.e_shoff.to_writer(writer)?;
        self.e_flags.to_writer(writer)?;
        self.e_ehsize.to_writer(writer)?;
        self.e_phentsize.to_writer(writer)?;
        self.e_phnum.to_writer(writer)?;
        self.e_shentsize.to_writer(writer)?;
        self.e_shnum.to_writer(writer)?;
        self.e_shstrndx.to_writer(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips() {
        let mut header = ElfHeader::new_exec_template();
        header.e_entry = 0x0804_8094;
        header.e_phnum = 2;
        let mut buf = Vec::new();
        header.to_writer(&mut buf).unwrap();
        assert_eq!(buf.len(), ElfHeader::SIZE);
        let mut cursor = Cursor::new(buf);
        let back = ElfHeader::from_reader(&mut cursor).unwrap();
        assert_eq!(back.e_entry, 0x0804_8094);
        assert_eq!(back.e_machine, EM_386);
    }
}
