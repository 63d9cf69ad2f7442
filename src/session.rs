//! `LinkSession` bundles every piece of mutable state a link needs — the input objects, the
//! symbol tables, the merged sections, the arena, and the running counters — so that a link is a
//! self-contained value rather than a set of process globals.

use crate::arena::ByteArena;
use crate::elf::section::SHN_UNDEF;
use crate::elf::symbol::{st_bind, st_type, STB_LOCAL, STT_FILE, STT_SECTION};
use crate::error::{Error, Result};
use crate::input::{InputObject, SharedObject};
use crate::options::Options;
use crate::section::CompoundSection;
use crate::symtab::{LocalSymbol, SymbolTable};
use std::collections::HashMap;
use std::path::PathBuf;

/// A PLT entry allocated for one external function symbol, deduplicated by name.
#[derive(Clone)]
pub struct PltEntry {
    pub name: String,
    pub plt_addr: u32,
    pub got_slot_addr: u32,
}

/// A COPY relocation + `.bss` slot allocated for one external data symbol.
#[derive(Clone)]
pub struct CopySlot {
    pub name: String,
    pub addr: u32,
    pub size: u32,
}

#[derive(Default)]
/// Everything one invocation of the linker needs, start to finish.
pub struct LinkSession {
    /// Every relocatable object loaded so far, in the order they became known to the link
    /// (positional arguments first, then archive members as they're pulled in).
    pub objects: Vec<InputObject>,
    /// Every shared object named by a resolved `-l`, in link order.
    pub shared_objects: Vec<SharedObject>,
    /// Directories added by `-L` so far; only affects `-l`s that come after it.
    pub search_dirs: Vec<PathBuf>,
    /// The global and local symbol tables being built up across every input.
    pub symtab: SymbolTable,
    /// Same-named sections from every input, merged into one compound output section each.
    pub sections: Vec<CompoundSection>,
    /// Compound section name to its index in `sections`.
    pub section_index: HashMap<String, usize>,
    /// Running count of relocations applied, for diagnostics.
    pub reloc_count: u32,
    /// Backing storage for anything synthesized during the link (PLT/GOT bytes, etc.).
    pub arena: ByteArena,
    /// PLT stubs allocated so far, one per external function symbol.
    pub plt_entries: Vec<PltEntry>,
    /// External function symbol name to its index in `plt_entries`.
    pub plt_index: HashMap<String, usize>,
    /// COPY-relocated `.bss` slots allocated so far, one per external data symbol.
    pub copy_slots: Vec<CopySlot>,
    /// External data symbol name to its index in `copy_slots`.
    pub copy_index: HashMap<String, usize>,
    /// File names seen so far, used to synthesize `STT_FILE` symbols in the output symtab.
    pub file_symbols: Vec<String>,
    /// The read-only `PT_LOAD` segment, once layout has run.
    pub ro_segment: Option<crate::layout::Segment>,
    /// The read-write `PT_LOAD` segment, once layout has run.
    pub rw_segment: Option<crate::layout::Segment>,
    /// `.interp`'s file offset, once the dynamic-link sections have been built.
    pub interp_offset: Option<u32>,
    /// `.dynamic`'s file offset, once the dynamic-link sections have been built.
    pub dynamic_offset: Option<u32>,
    /// `.dynstr` offsets of every `DT_NEEDED` entry's soname.
    pub dynstr_needed_offsets: Vec<u32>,
    /// Next free address for a COPY-relocation slot, inside `.bss`. Valid only once layout has
    /// run; advances as `get_or_create_copy` hands out slots.
    pub bss_cursor: u32,
    /// `.bss`'s end address immediately after layout, before any COPY slots were carved out of
    /// it; `bss_cursor - bss_layout_end` is how much `.bss`'s `sh_size`/the RW segment's
    /// `p_memsz` must grow by once relocation is done.
    pub bss_layout_end: u32,
    /// Where each input's `(object_index, section_index)` ended up: `(compound_index,
    /// contribution_index)`. Populated by `section::merge_sections`; relocation uses it to find
    /// the owned output buffer a `Rel`'s target section was copied into.
    pub contribution_location: HashMap<(usize, usize), (usize, usize)>,
}

impl LinkSession {
    pub const MAX_INPUTS: usize = 64;
    pub const MAX_SEARCH_DIRS: usize = 32;
    pub const MAX_SEGMENT_SECTIONS: usize = 32;

    pub fn new() -> Self {
        LinkSession::default()
    }

    pub fn is_dynamic(&self) -> bool {
        !self.shared_objects.is_empty()
    }

    pub fn add_search_dir(&mut self, dir: PathBuf) -> Result<()> {
        if self.search_dirs.len() >= Self::MAX_SEARCH_DIRS {
            return Err(Error::TooManySearchDirs(Self::MAX_SEARCH_DIRS));
        }
        self.search_dirs.push(dir);
        Ok(())
    }

    /// Resolve a `-lNAME` namespec against the directories added by `-L` so far, preferring a
    /// shared object over a static archive, matching the original linker's own search order.
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.search_dirs {
            let so = dir.join(format!("lib{name}.so"));
            if so.is_file() {
                return Some(so);
            }
        }
        for dir in &self.search_dirs {
            let archive = dir.join(format!("lib{name}.a"));
            if archive.is_file() {
                return Some(archive);
            }
        }
        None
    }

    pub fn add_object(&mut self, object: InputObject) -> Result<()> {
        let obj_idx = self.objects.len();
        self.objects.push(object);
        self.register_symbols(obj_idx)?;
        Ok(())
    }

    pub fn add_shared_object(&mut self, so: SharedObject) -> Result<()> {
        log::info!("{}: needed as {}", so.path.display(), so.soname);
        self.shared_objects.push(so);
        Ok(())
    }

    /// First pass over one object's symbol table: record every global reference/definition (for
    /// closure tracking and archive extraction) and stash every other local in output order.
    /// Values are raw `st_value`s; `finalize_symbol_values` adds in section addresses once
    /// layout has assigned them.
    fn register_symbols(&mut self, obj_idx: usize) -> Result<()> {
        let nsyms = self.objects[obj_idx].num_symbols();
        if let Some(file_name) = self
            .objects
            .get(obj_idx)
            .and_then(|o| o.path.file_name())
            .map(|n| n.to_string_lossy().to_string())
        {
            self.file_symbols.push(file_name);
        }
        for i in 0..nsyms {
            let sym = self.objects[obj_idx].symbol(i)?;
            let bind = st_bind(sym.st_info);
            let kind = st_type(sym.st_info);
            if kind == STT_FILE || kind == STT_SECTION || sym.st_name == 0 {
                continue;
            }
            let name = self.objects[obj_idx].symbol_name(sym.st_name).to_string();
            if bind == STB_LOCAL {
                let (def_obj, def_sec) = if sym.st_shndx == SHN_UNDEF
                    || sym.st_shndx == crate::elf::section::SHN_ABS
                {
                    (None, None)
                } else {
                    (Some(obj_idx), Some(sym.st_shndx as usize))
                };
                self.symtab.add_local(LocalSymbol {
                    name,
                    value: sym.st_value,
                    size: sym.st_size,
                    info: sym.st_info,
                    shndx: sym.st_shndx,
                    def_obj,
                    def_sec,
                });
                continue;
            }
            if sym.st_shndx == SHN_UNDEF {
                self.symtab.reference(&name, sym.st_info);
            } else {
                let (def_obj, def_sec) = if sym.st_shndx == crate::elf::section::SHN_ABS {
                    (None, None)
                } else {
                    (Some(obj_idx), Some(sym.st_shndx as usize))
                };
                self.symtab.define(
                    &name,
                    sym.st_value,
                    sym.st_size,
                    sym.st_info,
                    sym.st_shndx,
                    def_obj,
                    def_sec,
                )?;
            }
        }
        Ok(())
    }

    /// Add a section's final address to every symbol value that still holds a raw `st_value`.
    /// Must run after `crate::layout::layout_segments`.
    pub fn finalize_symbol_values(&mut self) {
        self.symtab.finalize_weak_undefined();
        let section_addrs: Vec<Vec<u32>> = self
            .objects
            .iter()
            .map(|o| o.section_addrs.clone())
            .collect();

        for sym in self.symtab.globals.values_mut() {
            if let (Some(obj), Some(sec)) = (sym.def_obj, sym.def_sec) {
                sym.value = section_addrs[obj][sec] + sym.value;
            }
        }
        for sym in self.symtab.locals.iter_mut() {
            if let (Some(obj), Some(sec)) = (sym.def_obj, sym.def_sec) {
                sym.value = section_addrs[obj][sec] + sym.value;
            }
        }
    }

    /// Allocate (or return the existing) `.bss` slot and `.rel.dyn` COPY relocation for an
    /// external data symbol. Must run after layout has assigned `.bss` its address (`bss_cursor`
    /// set up by `link`).
    pub fn get_or_create_copy(&mut self, name: &str, size: u32, dynsym_index: u32) -> u32 {
        if let Some(&i) = self.copy_index.get(name) {
            return self.copy_slots[i].addr;
        }
        let slot_size = crate::elf::round_up(size.max(4), 4);
        let addr = self.bss_cursor;
        self.bss_cursor += slot_size;

        let ordinal = self.copy_slots.len();
        self.copy_slots.push(CopySlot {
            name: name.to_string(),
            addr,
            size: slot_size,
        });
        self.copy_index.insert(name.to_string(), ordinal);

        let rel = crate::elf::relocation::Rel::new(addr, dynsym_index, crate::elf::relocation::R_386_COPY);
        let rel_dyn_idx = self.section_index[".rel.dyn"];
        let off = ordinal * crate::elf::relocation::Rel::SIZE;
        let mut buf = Vec::new();
        use crate::traits::ToWriter;
        let _ = rel.to_writer(&mut buf);
        self.sections[rel_dyn_idx].contributions[0].data[off..off + buf.len()].copy_from_slice(&buf);

        addr
    }

    /// Run the whole pipeline: merge sections, build dynamic-link sections if needed, lay out
    /// segments, resolve symbol values, apply relocations, and write the executable.
    pub fn link(&mut self, options: &Options) -> Result<()> {
        crate::section::merge_sections(self)?;

        if self.is_dynamic() {
            crate::dynsec::build(self, options)?;
        }

        crate::layout::layout_segments(self, self.is_dynamic())?;

        if self.is_dynamic() {
            let idx = self.section_index[".bss"];
            let end = self.sections[idx].sh_addr + self.sections[idx].sh_size;
            self.bss_cursor = end;
            self.bss_layout_end = end;
        }

        self.finalize_symbol_values();

        crate::relocate::apply_relocations(self)?;

        if self.is_dynamic() {
            let idx = self.section_index[".bss"];
            let added = self.bss_cursor - self.bss_layout_end;
            self.sections[idx].sh_size += added;
            if let Some(seg) = self.rw_segment.as_mut() {
                seg.p_memsz += added;
            }
            crate::dynsec::finalize(self, options)?;
        }

        if self.symtab.undefined_count() > 0 {
            let first = self
                .symtab
                .globals
                .values()
                .find(|s| !s.defined)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            return Err(Error::UndefinedReference(first));
        }

        let entry = self
            .symtab
            .get(&options.entry)
            .filter(|s| s.defined)
            .map(|s| s.value)
            .ok_or_else(|| Error::UndefinedEntry(options.entry.clone()))?;

        crate::writer::write_executable(self, options, entry)
    }
}
