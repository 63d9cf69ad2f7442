//! Section headers (gABI "Section Header").

use crate::error::Result;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use bitflags::bitflags;
use std::io::{Read, Write};

pub const SHN_UNDEF: u16 = 0;
pub const SHN_ABS: u16 = 0xfff1;
pub const SHN_COMMON: u16 = 0xfff2;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_HASH: u32 = 5;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOTE: u32 = 7;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;
pub const SHT_DYNSYM: u32 = 11;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// `sh_flags` bits this linker understands.
    pub struct ShFlags: u32 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
    }
}

#[derive(Debug, Clone)]
/// The 40-byte ELF32 section header.
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,
}

impl HasWrittenSize for SectionHeader {
    const SIZE: usize = 40;
}

impl SectionHeader {
    pub fn zeroed() -> Self {
        SectionHeader {
            sh_name: 0,
            sh_type: SHT_NULL,
            sh_flags: 0,
            sh_addr: 0,
            sh_offset: 0,
            sh_size: 0,
            sh_link: 0,
            sh_info: 0,
            sh_addralign: 0,
            sh_entsize: 0,
        }
    }

    pub fn is_alloc(&self) -> bool {
        self.sh_flags & ShFlags::ALLOC.bits() != 0
    }

    pub fn is_write(&self) -> bool {
        self.sh_flags & ShFlags::WRITE.bits() != 0
    }
}

impl FromReader for SectionHeader {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(SectionHeader {
            sh_name: u32::from_reader(reader)?,
            sh_type: u32::from_reader(reader)?,
            sh_flags: u32::from_reader(reader)?,
            sh_addr: u32::from_reader(reader)?,
            sh_offset: u32::from_reader(reader)?,
            sh_size: u32::from_reader(reader)?,
            sh_link: u32::from_reader(reader)?,
            sh_info: u32::from_reader(reader)?,
            sh_addralign: u32::from_reader(reader)?,
            sh_entsize: u32::from_reader(reader)?,
        })
    }
}

impl ToWriter for SectionHeader {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.sh_name.to_writer(writer)?;
        self.sh_type.to_writer(writer)?;
        self.sh_flags.to_writer(writer)?;
        self.sh_addr.to_writer(writer)?;
        self.sh_offset.to_writer(writer)?;
        self.sh_size.to_writer(writer)?;
        self.sh_link.to_writer(writer)?;
        self.sh_info.to_writer(writer)?;
        self.sh_addralign.to_writer(writer)?;
        self.sh_entsize.to_writer(writer)?;
        Ok(())
    }
}
