//! Synthesis of the nine dynamic-linking sections, per SPEC_FULL.md §4.3. Sizes that depend only
//! on input-independent counts (`.dynsym`, `.dynstr`, `.hash`, `.interp`) are computed exactly in
//! [`build`]; `.plt`/`.got.plt`/`.rel.plt`/`.rel.dyn`/`.dynamic` are reserved at an upper bound in
//! `build` and shrunk to their real size in [`finalize`] once relocation has run.

use crate::elf::dynamic::{
    Dyn, DT_HASH, DT_JMPREL, DT_NEEDED, DT_NULL, DT_PLTGOT, DT_PLTREL, DT_PLTRELSZ, DT_REL,
    DT_RELENT, DT_RELSZ, DT_STRSZ, DT_STRTAB, DT_SYMENT, DT_SYMTAB,
};
use crate::elf::relocation::Rel;
use crate::elf::section::ShFlags;
use crate::elf::symbol::{st_info, Sym, STB_GLOBAL, STT_NOTYPE};
use crate::error::Result;
use crate::hash::HashTable;
use crate::options::Options;
use crate::section::add_synthetic;
use crate::session::LinkSession;
use crate::strtab::StringTable;
use crate::traits::{HasWrittenSize, ToWriter};

const RO: u32 = ShFlags::ALLOC.bits();
const RW: u32 = ShFlags::ALLOC.bits() | ShFlags::WRITE.bits();
const RX: u32 = ShFlags::ALLOC.bits() | ShFlags::EXECINSTR.bits();

/// Reserve and (where possible) fully populate every dynamic-link section.
pub fn build(session: &mut LinkSession, options: &Options) -> Result<()> {
    let nreloc = session.reloc_count.max(1);

    // .interp
    let mut interp = options.interp.as_bytes().to_vec();
    interp.push(0);
    add_synthetic(session, ".interp", crate::elf::section::SHT_PROGBITS, RO, 1, interp);

    // .dynstr: SONAMEs first (for DT_NEEDED), then every global symbol name in a stable order.
    let mut dynstr = StringTable::new();
    let mut needed_offsets = Vec::with_capacity(session.shared_objects.len());
    for so in &session.shared_objects {
        needed_offsets.push(dynstr.add(&so.soname));
    }
    let mut names: Vec<String> = session.symtab.globals.keys().cloned().collect();
    names.sort();
    let mut name_offsets = std::collections::HashMap::with_capacity(names.len());
    for name in &names {
        name_offsets.insert(name.clone(), dynstr.add(name));
    }

    // .dynsym: index 0 is the mandatory null entry; one entry per global thereafter, in the same
    // order used to build .dynstr and .hash so indices line up everywhere.
    let mut dynsym_bytes = Vec::with_capacity(Sym::SIZE * (1 + names.len()));
    Sym {
        st_name: 0,
        st_value: 0,
        st_size: 0,
        st_info: 0,
        st_other: 0,
        st_shndx: 0,
    }
    .to_writer(&mut dynsym_bytes)?;

    let mut hash = HashTable::new(names.len() as u32 + 1);
    for (i, name) in names.iter().enumerate() {
        let index = (i + 1) as u32;
        session
            .symtab
            .globals
            .get_mut(name)
            .expect("name came from globals")
            .dynsym_index = Some(index);
        hash.insert(name, index);
        let sym = session.symtab.globals.get(name).expect("present");
        Sym {
            st_name: name_offsets[name],
            st_value: 0,
            st_size: sym.size,
            st_info: st_info(STB_GLOBAL, sym.kind_hint()),
            st_other: 0,
            st_shndx: 0,
        }
        .to_writer(&mut dynsym_bytes)?;
    }

    add_synthetic(session, ".dynstr", crate::elf::section::SHT_STRTAB, RO, 1, dynstr.as_bytes().to_vec());
    add_synthetic(session, ".dynsym", crate::elf::section::SHT_DYNSYM, RO, 4, dynsym_bytes);
    add_synthetic(session, ".hash", crate::elf::section::SHT_HASH, RO, 4, hash.to_bytes());

    // Upper-bound sections: every relocation could in the worst case need a distinct PLT slot or
    // COPY relocation. Shrunk to their real size in `finalize`.
    add_synthetic(
        session,
        ".plt",
        crate::elf::section::SHT_PROGBITS,
        RX,
        16,
        vec![0u8; 16 * (1 + nreloc as usize)],
    );
    add_synthetic(
        session,
        ".got.plt",
        crate::elf::section::SHT_PROGBITS,
        RW,
        4,
        vec![0u8; 4 * (3 + nreloc as usize)],
    );
    add_synthetic(
        session,
        ".rel.plt",
        crate::elf::section::SHT_REL,
        RO,
        4,
        vec![0u8; Rel::SIZE * nreloc as usize],
    );
    add_synthetic(
        session,
        ".rel.dyn",
        crate::elf::section::SHT_REL,
        RO,
        4,
        vec![0u8; Rel::SIZE * nreloc as usize],
    );

    let ndyn_max = session.shared_objects.len() + 6 + 7;
    add_synthetic(
        session,
        ".dynamic",
        crate::elf::section::SHT_DYNAMIC,
        RW,
        4,
        vec![0u8; Dyn::SIZE * ndyn_max],
    );

    // COPY-relocated data symbols need somewhere to live; guarantee `.bss` exists even if no
    // input contributed one, so it gets a real address and can grow after relocation.
    crate::section::get_or_create(
        &mut session.sections,
        &mut session.section_index,
        ".bss",
        &crate::elf::section::SectionHeader {
            sh_name: 0,
            sh_type: crate::elf::section::SHT_NOBITS,
            sh_flags: RW,
            sh_addr: 0,
            sh_offset: 0,
            sh_size: 0,
            sh_link: 0,
            sh_info: 0,
            sh_addralign: 4,
            sh_entsize: 0,
        },
    );

    session.dynstr_needed_offsets = needed_offsets;

    log::info!(
        "dynamic link: {} needed lib(s), {} global symbol(s), hash buckets = {}",
        session.shared_objects.len(),
        names.len(),
        hash.nbucket
    );
    Ok(())
}

/// Patch final symbol values into `.dynsym`, shrink the upper-bound sections to their real size,
/// and write `.dynamic`'s real contents. Must run after relocation.
pub fn finalize(session: &mut LinkSession, options: &Options) -> Result<()> {
    let dynsym_idx = session.section_index[".dynsym"];
    let dynstr_idx = session.section_index[".dynstr"];
    let hash_idx = session.section_index[".hash"];
    let plt_idx = session.section_index[".plt"];
    let got_plt_idx = session.section_index[".got.plt"];
    let rel_plt_idx = session.section_index[".rel.plt"];
    let rel_dyn_idx = session.section_index[".rel.dyn"];
    let dynamic_idx = session.section_index[".dynamic"];
    let interp_idx = session.section_index[".interp"];

    // Patch every global's dynsym entry with its final value/section.
    let mut names: Vec<String> = session.symtab.globals.keys().cloned().collect();
    names.sort();
    for name in &names {
        let sym = session.symtab.globals.get(name).expect("present");
        let Some(dynsym_index) = sym.dynsym_index else {
            continue;
        };
        let value = sym.plt_addr.unwrap_or(sym.value);
        let shndx = if sym.plt_addr.is_some() { 0 } else { sym.shndx };
        let off = dynsym_index as usize * Sym::SIZE;
        let data = &mut session.sections[dynsym_idx].contributions[0].data;
        // Elf32_Sym layout: st_name(4) st_value(4) st_size(4) st_info(1) st_other(1) st_shndx(2).
        data[off + 4..off + 8].copy_from_slice(&value.to_le_bytes());
        data[off + 14..off + 16].copy_from_slice(&shndx.to_le_bytes());
    }

    let actual_plt = session.plt_entries.len() as u32;
    let actual_copy = session.copy_slots.len() as u32;

    session.sections[plt_idx].sh_size = 16 * (1 + actual_plt);
    session.sections[got_plt_idx].sh_size = 4 * (3 + actual_plt);
    session.sections[rel_plt_idx].sh_size = Rel::SIZE as u32 * actual_plt;
    session.sections[rel_dyn_idx].sh_size = Rel::SIZE as u32 * actual_copy;

    let dynamic_addr = session.sections[dynamic_idx].sh_addr;
    let hash_addr = session.sections[hash_idx].sh_addr;
    let dynstr_addr = session.sections[dynstr_idx].sh_addr;
    let dynsym_addr = session.sections[dynsym_idx].sh_addr;
    let got_plt_addr = session.sections[got_plt_idx].sh_addr;
    let rel_plt_addr = session.sections[rel_plt_idx].sh_addr;
    let rel_dyn_addr = session.sections[rel_dyn_idx].sh_addr;
    let dynstr_size = session.sections[dynstr_idx].sh_size;

    let mut entries = Vec::new();
    for (i, so) in session.shared_objects.iter().enumerate() {
        entries.push(Dyn::new(DT_NEEDED, session.dynstr_needed_offsets[i]));
        log::debug!("DT_NEEDED: {}", so.soname);
    }
    entries.push(Dyn::new(DT_HASH, hash_addr));
    entries.push(Dyn::new(DT_STRTAB, dynstr_addr));
    entries.push(Dyn::new(DT_SYMTAB, dynsym_addr));
    entries.push(Dyn::new(DT_STRSZ, dynstr_size));
    entries.push(Dyn::new(DT_SYMENT, Sym::SIZE as u32));
    if actual_plt > 0 {
        entries.push(Dyn::new(DT_PLTGOT, got_plt_addr));
        entries.push(Dyn::new(DT_PLTRELSZ, Rel::SIZE as u32 * actual_plt));
        entries.push(Dyn::new(DT_PLTREL, DT_REL));
        entries.push(Dyn::new(DT_JMPREL, rel_plt_addr));
    }
    if actual_copy > 0 {
        entries.push(Dyn::new(DT_REL, rel_dyn_addr));
        entries.push(Dyn::new(DT_RELSZ, Rel::SIZE as u32 * actual_copy));
        entries.push(Dyn::new(DT_RELENT, Rel::SIZE as u32));
    }
    entries.push(Dyn::new(DT_NULL, 0));

    let mut dynamic_bytes = Vec::with_capacity(Dyn::SIZE * entries.len());
    for e in &entries {
        e.to_writer(&mut dynamic_bytes)?;
    }
    session.sections[dynamic_idx].sh_size = dynamic_bytes.len() as u32;
    session.sections[dynamic_idx].contributions[0].data = dynamic_bytes;

    session.dynamic_offset = Some(session.sections[dynamic_idx].sh_offset);
    session.interp_offset = Some(session.sections[interp_idx].sh_offset);

    log::info!(
        "dynamic link finalized: {} plt entries, {} copy relocations, .dynamic at {:#x}",
        actual_plt,
        actual_copy,
        dynamic_addr
    );
    let _ = options;
    Ok(())
}
