//! Final executable emission, per SPEC_FULL.md §4.7: write every `PT_LOAD` segment's bytes, the
//! link-time-only `.symtab`/`.strtab`/`.shstrtab`, the section header table, and rewind to fill
//! in the ELF header once every offset is known.

use crate::elf::header::ElfHeader;
use crate::elf::program::{ProgramHeader, PFlags, PT_DYNAMIC, PT_INTERP, PT_LOAD};
use crate::elf::section::{SectionHeader, SHN_ABS, SHT_STRTAB, SHT_SYMTAB};
use crate::elf::symbol::{st_info, Sym, STB_GLOBAL, STB_LOCAL, STT_FILE, STT_SECTION};
use crate::error::Result;
use crate::options::Options;
use crate::session::LinkSession;
use crate::strtab::StringTable;
use crate::traits::ToWriter;

/// Map a local or global symbol's defining section to its final output section-header index,
/// falling back to the symbol's own raw `shndx` for absolute/undefined symbols.
fn out_shndx(session: &LinkSession, def_obj: Option<usize>, def_sec: Option<usize>, raw_shndx: u16) -> u16 {
    match (def_obj, def_sec) {
        (Some(obj), Some(sec)) => {
            let (compound_idx, _) = session.contribution_location[&(obj, sec)];
            session.sections[compound_idx].out_index
        }
        _ => raw_shndx,
    }
}

/// Order `names` the way `HashTable::insert` would thread them into `.hash`'s buckets: bucketed
/// by `elf_hash(name) % nbucket`, insertion order preserved within a bucket. `.symtab`'s globals
/// are emitted in this order regardless of whether `.hash` itself exists for this link.
fn hash_bucket_order(names: &[String]) -> Vec<&String> {
    let nbucket = crate::hash::bucket_count(names.len() as u32 + 1);
    let mut buckets: Vec<Vec<&String>> = vec![Vec::new(); nbucket as usize];
    for name in names {
        let bucket = (crate::hash::elf_hash(name) % nbucket) as usize;
        buckets[bucket].push(name);
    }
    buckets.into_iter().flatten().collect()
}

/// Write the finished link to `options.output`, setting the executable bit on success.
pub fn write_executable(session: &LinkSession, options: &Options, entry: u32) -> Result<()> {
    let dynamic = session.is_dynamic();
    let phnum = session.ro_segment.is_some() as u16
        + session.rw_segment.is_some() as u16
        + if dynamic { 2 } else { 0 };
    let header_region = ElfHeader::SIZE as u32 + phnum as u32 * ProgramHeader::SIZE as u32;

    let mut buf = vec![0u8; header_region as usize];

    let mut section_order: Vec<usize> = Vec::new();
    if let Some(seg) = &session.ro_segment {
        section_order.extend(&seg.section_indices);
    }
    if let Some(seg) = &session.rw_segment {
        section_order.extend(&seg.section_indices);
    }

    for &idx in &section_order {
        let sec = &session.sections[idx];
        if sec.is_nobits() {
            continue;
        }
        for contrib in &sec.contributions {
            buf.extend_from_slice(&contrib.data);
        }
    }

    // .shstrtab / .symtab / .strtab: present for every link, allocated nowhere (link-time only).
    let mut shstrtab = StringTable::new();
    let shstrtab_name = shstrtab.add(".shstrtab");
    let symtab_name = shstrtab.add(".symtab");
    let strtab_name = shstrtab.add(".strtab");
    let section_name_offsets: Vec<u32> = section_order
        .iter()
        .map(|&idx| shstrtab.add(&session.sections[idx].name))
        .collect();

    let mut strtab = StringTable::new();
    let mut symtab_bytes = Vec::new();
    Sym {
        st_name: 0,
        st_value: 0,
        st_size: 0,
        st_info: 0,
        st_other: 0,
        st_shndx: 0,
    }
    .to_writer(&mut symtab_bytes)?;

    for file_name in &session.file_symbols {
        let name_off = strtab.add(file_name);
        Sym {
            st_name: name_off,
            st_value: 0,
            st_size: 0,
            st_info: st_info(STB_LOCAL, STT_FILE),
            st_other: 0,
            st_shndx: SHN_ABS,
        }
        .to_writer(&mut symtab_bytes)?;
    }

    for &idx in &section_order {
        Sym {
            st_name: 0,
            st_value: 0,
            st_size: 0,
            st_info: st_info(STB_LOCAL, STT_SECTION),
            st_other: 0,
            st_shndx: session.sections[idx].out_index,
        }
        .to_writer(&mut symtab_bytes)?;
    }

    for local in &session.symtab.locals {
        let name_off = strtab.add(&local.name);
        let shndx = out_shndx(session, local.def_obj, local.def_sec, local.shndx);
        Sym {
            st_name: name_off,
            st_value: local.value,
            st_size: local.size,
            st_info: local.info,
            st_other: 0,
            st_shndx: shndx,
        }
        .to_writer(&mut symtab_bytes)?;
    }
    let nlocal =
        1 + session.file_symbols.len() + section_order.len() + session.symtab.locals.len();

    let mut global_names: Vec<String> = session.symtab.globals.keys().cloned().collect();
    global_names.sort();
    let global_order = hash_bucket_order(&global_names);
    for name in &global_order {
        let g = &session.symtab.globals[*name];
        let name_off = strtab.add(&g.name);
        let shndx = if g.shndx == SHN_ABS {
            SHN_ABS
        } else {
            out_shndx(session, g.def_obj, g.def_sec, g.shndx)
        };
        let bind = if g.weak {
            crate::elf::symbol::STB_WEAK
        } else {
            STB_GLOBAL
        };
        Sym {
            st_name: name_off,
            st_value: g.value,
            st_size: g.size,
            st_info: st_info(bind, st_type_or_hint(g)),
            st_other: 0,
            st_shndx: shndx,
        }
        .to_writer(&mut symtab_bytes)?;
    }

    let shstrtab_off = buf.len() as u32;
    buf.extend_from_slice(shstrtab.as_bytes());
    let symtab_off = buf.len() as u32;
    buf.extend_from_slice(&symtab_bytes);
    let strtab_off = buf.len() as u32;
    buf.extend_from_slice(strtab.as_bytes());

    // Pad the section header table onto a 4-byte boundary.
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    let shoff = buf.len() as u32;

    let nsections = section_order.len();
    let shnum = crate::layout::FIRST_SECTION_INDEX as usize + nsections;

    SectionHeader::zeroed().to_writer(&mut buf)?;
    SectionHeader {
        sh_name: shstrtab_name,
        sh_type: SHT_STRTAB,
        sh_flags: 0,
        sh_addr: 0,
        sh_offset: shstrtab_off,
        sh_size: shstrtab.len() as u32,
        sh_link: 0,
        sh_info: 0,
        sh_addralign: 1,
        sh_entsize: 0,
    }
    .to_writer(&mut buf)?;
    SectionHeader {
        sh_name: symtab_name,
        sh_type: SHT_SYMTAB,
        sh_flags: 0,
        sh_addr: 0,
        sh_offset: symtab_off,
        sh_size: symtab_bytes.len() as u32,
        sh_link: 3,
        sh_info: nlocal as u32,
        sh_addralign: 4,
        sh_entsize: Sym::SIZE as u32,
    }
    .to_writer(&mut buf)?;
    SectionHeader {
        sh_name: strtab_name,
        sh_type: SHT_STRTAB,
        sh_flags: 0,
        sh_addr: 0,
        sh_offset: strtab_off,
        sh_size: strtab.len() as u32,
        sh_link: 0,
        sh_info: 0,
        sh_addralign: 1,
        sh_entsize: 0,
    }
    .to_writer(&mut buf)?;

    let dynsym_out = session.section_index.get(".dynsym").map(|&i| session.sections[i].out_index);
    let dynstr_out = session.section_index.get(".dynstr").map(|&i| session.sections[i].out_index);
    for (i, &idx) in section_order.iter().enumerate() {
        let sec = &session.sections[idx];
        let (sh_link, sh_info) = section_link_info(&sec.name, dynsym_out, dynstr_out);
        let entsize = section_entsize(sec.sh_type);
        SectionHeader {
            sh_name: section_name_offsets[i],
            sh_type: sec.sh_type,
            sh_flags: sec.sh_flags,
            sh_addr: sec.sh_addr,
            sh_offset: sec.sh_offset,
            sh_size: sec.sh_size,
            sh_link,
            sh_info,
            sh_addralign: sec.sh_addralign,
            sh_entsize: entsize,
        }
        .to_writer(&mut buf)?;
    }

    // Now that every offset is known, rewind and write the real header and program headers.
    let mut header = ElfHeader::new_exec_template();
    header.e_entry = entry;
    header.e_phoff = ElfHeader::SIZE as u32;
    header.e_shoff = shoff;
    header.e_phnum = phnum;
    header.e_shnum = shnum as u16;
    header.e_shstrndx = 1;

    let mut front = Vec::with_capacity(header_region as usize);
    header.to_writer(&mut front)?;

    if let Some(seg) = &session.ro_segment {
        ProgramHeader {
            p_type: PT_LOAD,
            p_offset: seg.p_offset,
            p_vaddr: seg.p_vaddr,
            p_paddr: seg.p_vaddr,
            p_filesz: seg.p_filesz,
            p_memsz: seg.p_memsz,
            p_flags: seg.p_flags,
            p_align: crate::elf::PAGE_SIZE,
        }
        .to_writer(&mut front)?;
    }
    if let Some(seg) = &session.rw_segment {
        ProgramHeader {
            p_type: PT_LOAD,
            p_offset: seg.p_offset,
            p_vaddr: seg.p_vaddr,
            p_paddr: seg.p_vaddr,
            p_filesz: seg.p_filesz,
            p_memsz: seg.p_memsz,
            p_flags: seg.p_flags,
            p_align: crate::elf::PAGE_SIZE,
        }
        .to_writer(&mut front)?;
    }
    if dynamic {
        let interp_idx = session.section_index[".interp"];
        let interp = &session.sections[interp_idx];
        ProgramHeader {
            p_type: PT_INTERP,
            p_offset: interp.sh_offset,
            p_vaddr: interp.sh_addr,
            p_paddr: interp.sh_addr,
            p_filesz: interp.sh_size,
            p_memsz: interp.sh_size,
            p_flags: PFlags::R.bits(),
            p_align: 1,
        }
        .to_writer(&mut front)?;

        let dynamic_idx = session.section_index[".dynamic"];
        let dyn_sec = &session.sections[dynamic_idx];
        ProgramHeader {
            p_type: PT_DYNAMIC,
            p_offset: dyn_sec.sh_offset,
            p_vaddr: dyn_sec.sh_addr,
            p_paddr: dyn_sec.sh_addr,
            p_filesz: dyn_sec.sh_size,
            p_memsz: dyn_sec.sh_size,
            p_flags: PFlags::R.bits() | PFlags::W.bits(),
            p_align: 4,
        }
        .to_writer(&mut front)?;
    }

    buf[0..front.len()].copy_from_slice(&front);

    std::fs::write(&options.output, &buf)?;
    set_executable(&options.output)?;

    log::info!(
        "wrote {} ({} bytes, entry {:#x})",
        options.output.display(),
        buf.len(),
        entry
    );
    Ok(())
}

fn st_type_or_hint(g: &crate::symtab::GlobalSymbol) -> u8 {
    let kind = crate::elf::symbol::st_type(g.info);
    if kind != 0 {
        kind
    } else {
        g.kind_hint()
    }
}

/// `sh_link`/`sh_info` for the handful of section types that carry cross-references.
fn section_link_info(name: &str, dynsym_out: Option<u16>, dynstr_out: Option<u16>) -> (u32, u32) {
    match name {
        ".dynsym" => (dynstr_out.unwrap_or(0) as u32, 1),
        ".hash" | ".rel.plt" | ".rel.dyn" | ".dynamic" => (dynsym_out.unwrap_or(0) as u32, 0),
        ".dynstr" => (0, 0),
        _ => (0, 0),
    }
}

fn section_entsize(sh_type: u32) -> u32 {
    use crate::elf::dynamic::Dyn;
    use crate::elf::relocation::Rel;
    use crate::elf::section::{SHT_DYNAMIC, SHT_DYNSYM, SHT_REL};
    match sh_type {
        SHT_DYNSYM => Sym::SIZE as u32,
        SHT_REL => Rel::SIZE as u32,
        SHT_DYNAMIC => Dyn::SIZE as u32,
        _ => 0,
    }
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::elf::section::ShFlags;
    use crate::section::{add_synthetic, get_or_create};

    fn minimal_session() -> LinkSession {
        let mut session = LinkSession::new();
        add_synthetic(
            &mut session,
            ".text",
            crate::elf::section::SHT_PROGBITS,
            (ShFlags::ALLOC | ShFlags::EXECINSTR).bits(),
            4,
            vec![0x90, 0x90, 0x90, 0x90],
        );
        add_synthetic(
            &mut session,
            ".data",
            crate::elf::section::SHT_PROGBITS,
            (ShFlags::ALLOC | ShFlags::WRITE).bits(),
            4,
            vec![1, 2, 3, 4],
        );
        get_or_create(
            &mut session.sections,
            &mut session.section_index,
            ".bss",
            &crate::elf::section::SectionHeader {
                sh_name: 0,
                sh_type: crate::elf::section::SHT_NOBITS,
                sh_flags: (ShFlags::ALLOC | ShFlags::WRITE).bits(),
                sh_addr: 0,
                sh_offset: 0,
                sh_size: 0,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 4,
                sh_entsize: 0,
            },
        );
        session.sections[2].sh_size = 16;
        crate::layout::layout_segments(&mut session, false).expect("layout");
        session
    }

    #[test]
    fn write_executable_produces_valid_elf_header() {
        let session = minimal_session();
        let dir = tempfile::tempdir().expect("tempdir");
        let options = Options::builder()
            .output(dir.path().join("luxld-writer-test"))
            .build();
        write_executable(&session, &options, 0x0804_8000).expect("write");

        let bytes = std::fs::read(&options.output).expect("read back");
        assert_eq!(&bytes[0..4], b"\x7fELF");
        let header = {
            use crate::traits::FromReader;
            let mut cursor = std::io::Cursor::new(&bytes[..]);
            ElfHeader::from_reader(&mut cursor).expect("parse header")
        };
        assert_eq!(header.e_entry, 0x0804_8000);
        assert_eq!(header.e_phnum, 2);
        assert!(header.e_shoff > 0);
        assert_eq!(header.e_shstrndx, 1);
    }

    #[test]
    fn section_entsize_matches_known_types() {
        use crate::elf::section::{SHT_DYNAMIC, SHT_DYNSYM, SHT_REL};
        assert_eq!(section_entsize(SHT_DYNSYM), Sym::SIZE as u32);
        assert_eq!(section_entsize(SHT_REL), crate::elf::relocation::Rel::SIZE as u32);
        assert_eq!(section_entsize(SHT_DYNAMIC), crate::elf::dynamic::Dyn::SIZE as u32);
        assert_eq!(section_entsize(crate::elf::section::SHT_PROGBITS), 0);
    }

    #[test]
    fn section_link_info_points_dynsym_at_dynstr() {
        let (link, info) = section_link_info(".dynsym", Some(7), Some(9));
        assert_eq!(link, 9);
        assert_eq!(info, 1);
        let (link, _) = section_link_info(".rel.plt", Some(7), Some(9));
        assert_eq!(link, 7);
    }
}
