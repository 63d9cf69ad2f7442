//! Loading and classifying input files: relocatable objects, shared objects, and archives.

use crate::elf::header::{ElfHeader, EM_386, ET_DYN, ET_REL};
use crate::elf::section::{SectionHeader, SHT_DYNAMIC, SHT_DYNSYM, SHT_SYMTAB};
use crate::error::{Error, Result};
use crate::session::LinkSession;
use crate::traits::{FromReader, HasWrittenSize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// A parsed relocatable object: header plus slices into its (session-lifetime) buffer for the
/// section header table, symbol table, and the two string tables it references.
pub struct InputObject {
    pub path: PathBuf,
    pub buf: &'static [u8],
    pub header: ElfHeader,
    pub sections: Vec<SectionHeader>,
    pub shstrtab_idx: Option<usize>,
    pub symtab_idx: Option<usize>,
    pub strtab_idx: Option<usize>,
    /// Final load address assigned to each section during layout (parallel to `sections`).
    pub section_addrs: Vec<u32>,
}

impl InputObject {
    pub fn section_name(&self, idx: usize) -> &str {
        let Some(shstrtab) = self.shstrtab_idx else {
            return "";
        };
        let tab = &self.buf[self.sections[shstrtab].sh_offset as usize
            ..(self.sections[shstrtab].sh_offset + self.sections[shstrtab].sh_size) as usize];
        crate::strtab::StringTable::get(tab, self.sections[idx].sh_name)
    }

    pub fn strtab_bytes(&self) -> &[u8] {
        match self.strtab_idx {
            Some(i) => {
                &self.buf[self.sections[i].sh_offset as usize
                    ..(self.sections[i].sh_offset + self.sections[i].sh_size) as usize]
            }
            None => &[],
        }
    }

    pub fn symbol_name(&self, st_name: u32) -> &str {
        crate::strtab::StringTable::get(self.strtab_bytes(), st_name)
    }

    pub fn num_symbols(&self) -> usize {
        match self.symtab_idx {
            Some(i) => self.sections[i].sh_size as usize / crate::elf::symbol::Sym::SIZE,
            None => 0,
        }
    }

    pub fn symbol(&self, i: usize) -> Result<crate::elf::symbol::Sym> {
        use crate::traits::{FromReader, HasWrittenSize};
        let sec = &self.sections[self.symtab_idx.expect("symbol() requires a symtab")];
        let off = sec.sh_offset as usize + i * crate::elf::symbol::Sym::SIZE;
        let mut cursor = Cursor::new(&self.buf[off..off + crate::elf::symbol::Sym::SIZE]);
        crate::elf::symbol::Sym::from_reader(&mut cursor)
    }

    pub fn section_data(&self, idx: usize) -> &[u8] {
        let sec = &self.sections[idx];
        if sec.sh_type == crate::elf::section::SHT_NOBITS {
            return &[];
        }
        &self.buf[sec.sh_offset as usize..(sec.sh_offset + sec.sh_size) as usize]
    }
}

/// A shared object contributes symbols for resolution and a `DT_NEEDED` entry; its bytes are
/// never copied into the output.
pub struct SharedObject {
    pub path: PathBuf,
    pub soname: String,
    pub dynsyms: Vec<crate::elf::symbol::Sym>,
    pub dynstr: Vec<u8>,
}

impl SharedObject {
    pub fn find(&self, name: &str) -> Option<&crate::elf::symbol::Sym> {
        self.dynsyms
            .iter()
            .find(|s| crate::strtab::StringTable::get(&self.dynstr, s.st_name) == name)
    }
}

fn read_sections(buf: &[u8], header: &ElfHeader) -> Result<Vec<SectionHeader>> {
    let mut sections = Vec::with_capacity(header.e_shnum as usize);
    for i in 0..header.e_shnum as usize {
        let off = header.e_shoff as usize + i * header.e_shentsize as usize;
        let mut cursor = Cursor::new(&buf[off..off + header.e_shentsize as usize]);
        sections.push(SectionHeader::from_reader(&mut cursor)?);
    }
    Ok(sections)
}

/// Load `path`, classify it by magic bytes, and feed it into `session`. Dispatches to object,
/// shared-object, or archive handling; anything else is a hard error.
pub fn process_file(session: &mut LinkSession, path: &Path) -> Result<()> {
    if session.objects.len() + session.shared_objects.len() >= LinkSession::MAX_INPUTS {
        return Err(Error::TooManyInputs(LinkSession::MAX_INPUTS));
    }
    let data = std::fs::read(path).map_err(|e| Error::Open(path.to_path_buf(), e))?;
    let buf: &'static [u8] = Box::leak(data.into_boxed_slice());

    if buf.len() >= 8 && &buf[0..8] == b"!<arch>\n" {
        log::debug!("{}: classified as archive", path.display());
        return crate::archive::process_archive(session, buf, path);
    }
    if ElfHeader::probe_is_elf(buf) {
        let header = ElfHeader::read(&mut Cursor::new(buf), path)?;
        if header.e_machine != EM_386 {
            return Err(Error::UnsupportedElfType(path.to_path_buf(), header.e_type));
        }
        return match header.e_type {
            ET_REL => {
                log::debug!("{}: classified as relocatable object", path.display());
                process_object_bytes(session, buf, path)
            }
            ET_DYN => {
                log::debug!("{}: classified as shared object", path.display());
                process_shared_object(session, buf, path)
            }
            other => Err(Error::UnsupportedElfType(path.to_path_buf(), other)),
        };
    }
    Err(Error::UnknownFormat(path.to_path_buf()))
}

/// Parse an `ET_REL` object whose bytes already live in a buffer owned by the session (either
/// the whole file, for a direct positional argument, or a slice of an archive's buffer).
pub fn process_object_bytes(session: &mut LinkSession, buf: &'static [u8], path: &Path) -> Result<()> {
    let header = ElfHeader::read(&mut Cursor::new(buf), path)?;
    let sections = read_sections(buf, &header)?;

    let symtab_idx = sections.iter().position(|s| s.sh_type == SHT_SYMTAB);
    // .strtab is whatever .symtab's sh_link points at; objects with no symtab (e.g. some crt
    // stubs) simply have neither.
    let strtab_idx = symtab_idx.map(|i| sections[i].sh_link as usize);
    let shstrtab_idx = if header.e_shstrndx != 0 {
        Some(header.e_shstrndx as usize)
    } else {
        None
    };

    let nsections = sections.len();
    let object = InputObject {
        path: path.to_path_buf(),
        buf,
        header,
        sections,
        shstrtab_idx,
        symtab_idx,
        strtab_idx,
        section_addrs: vec![0; nsections],
    };

    session.add_object(object)
}

fn process_shared_object(session: &mut LinkSession, buf: &'static [u8], path: &Path) -> Result<()> {
    let header = ElfHeader::read(&mut Cursor::new(buf), path)?;
    let sections = read_sections(buf, &header)?;

    let dynsym_idx = sections
        .iter()
        .position(|s| s.sh_type == SHT_DYNSYM)
        .ok_or_else(|| Error::MissingDynamicSection(path.to_path_buf(), ".dynsym"))?;
    let dynamic_idx = sections
        .iter()
        .position(|s| s.sh_type == SHT_DYNAMIC)
        .ok_or_else(|| Error::MissingDynamicSection(path.to_path_buf(), ".dynamic"))?;
    let dynstr_idx = sections[dynsym_idx].sh_link as usize;
    let dynstr_sec = &sections[dynstr_idx];
    let dynstr = buf[dynstr_sec.sh_offset as usize
        ..(dynstr_sec.sh_offset + dynstr_sec.sh_size) as usize]
        .to_vec();

    let dynsym_sec = &sections[dynsym_idx];
    let count = dynsym_sec.sh_size as usize / crate::elf::symbol::Sym::SIZE;
    let mut dynsyms = Vec::with_capacity(count);
    for i in 0..count {
        let off = dynsym_sec.sh_offset as usize + i * crate::elf::symbol::Sym::SIZE;
        let mut cursor = Cursor::new(&buf[off..off + crate::elf::symbol::Sym::SIZE]);
        dynsyms.push(crate::elf::symbol::Sym::from_reader(&mut cursor)?);
    }

    let soname = read_soname(buf, &sections[dynamic_idx], &dynstr)?
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_default();

    session.add_shared_object(SharedObject {
        path: path.to_path_buf(),
        soname,
        dynsyms,
        dynstr,
    })
}

/// Walk `.dynamic` for a `DT_SONAME` tag and resolve it against `.dynstr`, stopping at
/// `DT_NULL`. Returns `None` if the shared object declares no SONAME of its own.
fn read_soname(buf: &[u8], dynamic_sec: &SectionHeader, dynstr: &[u8]) -> Result<Option<String>> {
    use crate::elf::dynamic::{Dyn, DT_NULL, DT_SONAME};
    let count = dynamic_sec.sh_size as usize / Dyn::SIZE;
    for i in 0..count {
        let off = dynamic_sec.sh_offset as usize + i * Dyn::SIZE;
        let mut cursor = Cursor::new(&buf[off..off + Dyn::SIZE]);
        let entry = Dyn::from_reader(&mut cursor)?;
        if entry.d_tag == DT_NULL {
            break;
        }
        if entry.d_tag == DT_SONAME {
            return Ok(Some(
                crate::strtab::StringTable::get(dynstr, entry.d_un).to_string(),
            ));
        }
    }
    Ok(None)
}
