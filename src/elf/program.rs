//! Program headers (gABI "Program Header").

use crate::error::Result;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use bitflags::bitflags;
use std::io::{Read, Write};

pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_INTERP: u32 = 3;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// `p_flags` permission bits.
    pub struct PFlags: u32 {
        const X = 0x1;
        const W = 0x2;
        const R = 0x4;
    }
}

#[derive(Debug, Clone)]
/// The 32-byte ELF32 program header.
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
}

impl HasWrittenSize for ProgramHeader {
    const SIZE: usize = 32;
}

impl FromReader for ProgramHeader {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(ProgramHeader {
            p_type: u32::from_reader(reader)?,
            p_offset: u32::from_reader(reader)?,
            p_vaddr: u32::from_reader(reader)?,
            p_paddr: u32::from_reader(reader)?,
            p_filesz: u32::from_reader(reader)?,
            p_memsz: u32::from_reader(reader)?,
            p_flags: u32::from_reader(reader)?,
            p_align: u32::from_reader(reader)?,
        })
    }
}

impl ToWriter for ProgramHeader {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.p_type.to_writer(writer)?;
        self.p_offset.to_writer(writer)?;
        self.p_vaddr.to_writer(writer)?;
        self.p_paddr.to_writer(writer)?;
        self.p_filesz.to_writer(writer)?;
        self.p_memsz.to_writer(writer)?;
        self.p_flags.to_writer(writer)?;
        self.p_align.to_writer(writer)?;
        Ok(())
    }
}
