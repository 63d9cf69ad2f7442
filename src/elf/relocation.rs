//! Relocation entries and the i386 relocation type codes (processor supplement table 9-1).

use crate::error::Result;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

pub const R_386_NONE: u8 = 0;
pub const R_386_32: u8 = 1;
pub const R_386_PC32: u8 = 2;
pub const R_386_GOT32: u8 = 3;
pub const R_386_PLT32: u8 = 4;
pub const R_386_COPY: u8 = 5;
pub const R_386_GLOB_DAT: u8 = 6;
pub const R_386_JMP_SLOT: u8 = 7;
pub const R_386_RELATIVE: u8 = 8;
pub const R_386_GOTOFF: u8 = 9;
pub const R_386_GOTPC: u8 = 10;
pub const R_386_8: u8 = 22;
pub const R_386_PC8: u8 = 23;
pub const R_386_16: u8 = 20;
pub const R_386_PC16: u8 = 21;

pub const fn r_sym(info: u32) -> u32 {
    info >> 8
}

pub const fn r_type(info: u32) -> u8 {
    (info & 0xff) as u8
}

pub const fn r_info(sym: u32, kind: u8) -> u32 {
    (sym << 8) | kind as u32
}

#[derive(Debug, Clone)]
/// The 8-byte ELF32 `Elf32_Rel` entry (this linker never emits `Elf32_Rela`).
pub struct Rel {
    pub r_offset: u32,
    pub r_info: u32,
}

impl HasWrittenSize for Rel {
    const SIZE: usize = 8;
}

impl Rel {
    pub fn new(offset: u32, sym: u32, kind: u8) -> Self {
        Rel {
            r_offset: offset,
            r_info: r_info(sym, kind),
        }
    }

    pub fn sym(&self) -> u32 {
        r_sym(self.r_info)
    }

    pub fn kind(&self) -> u8 {
        r_type(self.r_info)
    }
}

impl FromReader for Rel {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Rel {
            r_offset: u32::from_reader(reader)?,
            r_info: u32::from_reader(reader)?,
        })
    }
}

impl ToWriter for Rel {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.r_offset.to_writer(writer)?;
        self.r_info.to_writer(writer)?;
        Ok(())
    }
}
