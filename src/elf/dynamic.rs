//! `.dynamic` section entries (gABI "Dynamic Section").

use crate::error::Result;
use crate::traits::{FromReader, HasWrittenSize, ToWriter};
use std::io::{Read, Write};

pub const DT_NULL: i32 = 0;
pub const DT_NEEDED: i32 = 1;
pub const DT_PLTRELSZ: i32 = 2;
pub const DT_PLTGOT: i32 = 3;
pub const DT_HASH: i32 = 4;
pub const DT_STRTAB: i32 = 5;
pub const DT_SYMTAB: i32 = 6;
pub const DT_RELA: i32 = 7;
pub const DT_STRSZ: i32 = 10;
pub const DT_SYMENT: i32 = 11;
pub const DT_SONAME: i32 = 14;
pub const DT_REL: i32 = 17;
pub const DT_RELSZ: i32 = 18;
pub const DT_RELENT: i32 = 19;
pub const DT_PLTREL: i32 = 20;
pub const DT_JMPREL: i32 = 23;

#[derive(Debug, Clone)]
/// One `Elf32_Dyn` entry. `d_un` is always treated as a plain `u32` (value or pointer); this
/// linker never needs the signed interpretation.
pub struct Dyn {
    pub d_tag: i32,
    pub d_un: u32,
}

impl HasWrittenSize for Dyn {
    const SIZE: usize = 8;
}

impl Dyn {
    pub fn new(tag: i32, val: u32) -> Self {
        Dyn { d_tag: tag, d_un: val }
    }
}

impl FromReader for Dyn {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Dyn {
            d_tag: i32::from_reader(reader)?,
            d_un: u32::from_reader(reader)?,
        })
    }
}

impl ToWriter for Dyn {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.d_tag.to_writer(writer)?;
        self.d_un.to_writer(writer)?;
        Ok(())
    }
}
