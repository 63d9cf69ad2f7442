//! Partitioning allocatable sections into load segments and assigning final file offsets and
//! virtual addresses, per SPEC_FULL.md §4.4.

use crate::elf::header::ElfHeader;
use crate::elf::program::ProgramHeader;
use crate::elf::section::SHT_NOBITS;
use crate::elf::{round_up, BASE_VADDR, PAGE_SIZE};
use crate::error::{Error, Result};
use crate::session::LinkSession;

/// Output section-header-table indices 0..3 are reserved for `UND`, `.shstrtab`, `.symtab`, and
/// `.strtab`; every compound section gets an index starting here. Named rather than left as a
/// bare literal because the writer relies on this exact reservation too.
pub const FIRST_SECTION_INDEX: u16 = 4;

/// One `PT_LOAD` segment: its program header plus the compound sections it owns, in final file
/// order.
#[derive(Clone)]
pub struct Segment {
    pub p_vaddr: u32,
    pub p_offset: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub section_indices: Vec<usize>,
}

fn place_segment(
    session: &mut LinkSession,
    indices: &[usize],
    start_vaddr: u32,
    start_offset: u32,
    writable: bool,
) -> Segment {
    let mut vaddr = start_vaddr;
    let mut offset = start_offset;
    let mut filesz = 0u32;

    for &idx in indices {
        session.sections[idx].sh_addr = vaddr;
        session.sections[idx].sh_offset = offset;

        let mut running = 0u32;
        let contributions_len = session.sections[idx].contributions.len();
        for c in 0..contributions_len {
            let (obj_idx, data_len) = {
                let contrib = &session.sections[idx].contributions[c];
                (contrib.object_index, contrib.data.len() as u32)
            };
            if let Some(obj_idx) = obj_idx {
                let sec_idx = session.sections[idx].contributions[c].section_index;
                session.objects[obj_idx].section_addrs[sec_idx] = vaddr + running;
            }
            running += data_len;
        }

        let size = session.sections[idx].sh_size;
        vaddr += size;
        if session.sections[idx].sh_type != SHT_NOBITS {
            offset += size;
            filesz += size;
        }
    }

    Segment {
        p_vaddr: start_vaddr,
        p_offset: start_offset,
        p_filesz: filesz,
        p_memsz: vaddr - start_vaddr,
        p_flags: if writable {
            crate::elf::program::PFlags::R.bits() | crate::elf::program::PFlags::W.bits()
        } else {
            crate::elf::program::PFlags::R.bits() | crate::elf::program::PFlags::X.bits()
        },
        section_indices: indices.to_vec(),
    }
}

/// Lay out every allocatable merged section into a read-only and a read-write `PT_LOAD` segment,
/// reserving `PT_INTERP`/`PT_DYNAMIC` headers when `dynamic` is set. Non-allocatable merged
/// sections (stray debug/comment sections from input objects) are dropped; this linker only ever
/// emits the executable's load image plus `.symtab`/`.strtab`/`.shstrtab`.
pub fn layout_segments(session: &mut LinkSession, dynamic: bool) -> Result<()> {
    let before = session.sections.len();
    let old_names: Vec<String> = session.sections.iter().map(|s| s.name.clone()).collect();
    session.sections.retain(|s| s.is_alloc());
    session.section_index = session
        .sections
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.clone(), i))
        .collect();
    if session.sections.len() != before {
        log::debug!(
            "dropped {} non-allocatable merged section(s)",
            before - session.sections.len()
        );
    }
    // `contribution_location` was built against pre-retain indices; remap it now that sections
    // may have shifted. Every contribution we'll ever look up again belongs to an alloc section
    // (relocation targets are always ALLOC), so the name is guaranteed to still be present.
    for loc in session.contribution_location.values_mut() {
        loc.0 = session.section_index[&old_names[loc.0]];
    }

    let mut ro_indices = Vec::new();
    let mut rw_progbits = Vec::new();
    let mut rw_nobits = Vec::new();
    for (i, sec) in session.sections.iter().enumerate() {
        if sec.is_write() {
            if sec.sh_type == SHT_NOBITS {
                rw_nobits.push(i);
            } else {
                rw_progbits.push(i);
            }
        } else {
            ro_indices.push(i);
        }
    }
    let mut rw_indices = rw_progbits;
    rw_indices.extend(rw_nobits);

    if ro_indices.len() > LinkSession::MAX_SEGMENT_SECTIONS
        || rw_indices.len() > LinkSession::MAX_SEGMENT_SECTIONS
    {
        return Err(Error::TooManySections(LinkSession::MAX_SEGMENT_SECTIONS));
    }
    if ro_indices.is_empty() && rw_indices.is_empty() {
        return Err(Error::NothingToLink);
    }

    let mut phnum = 0u16;
    if !ro_indices.is_empty() {
        phnum += 1;
    }
    if !rw_indices.is_empty() {
        phnum += 1;
    }
    if dynamic {
        phnum += 2; // PT_INTERP + PT_DYNAMIC
    }

    let header_region = ElfHeader::SIZE as u32 + phnum as u32 * ProgramHeader::SIZE as u32;
    let start_offset = header_region;
    let start_vaddr = BASE_VADDR + header_region;

    // Assign output section-header-table indices before placement so relocation/dynsym code can
    // refer to them; order is RO then RW, matching file order.
    let mut next_index = FIRST_SECTION_INDEX;
    for &i in ro_indices.iter().chain(rw_indices.iter()) {
        session.sections[i].out_index = next_index;
        next_index += 1;
    }

    let ro = if !ro_indices.is_empty() {
        Some(place_segment(session, &ro_indices, start_vaddr, start_offset, false))
    } else {
        None
    };

    let (rw_start_vaddr, rw_start_offset) = match &ro {
        Some(seg) => (
            round_up(seg.p_vaddr + seg.p_memsz, PAGE_SIZE) + (seg.p_offset + seg.p_filesz) % PAGE_SIZE,
            seg.p_offset + seg.p_filesz,
        ),
        None => (start_vaddr, start_offset),
    };
    let rw = if !rw_indices.is_empty() {
        Some(place_segment(
            session,
            &rw_indices,
            rw_start_vaddr,
            rw_start_offset,
            true,
        ))
    } else {
        None
    };

    log::info!(
        "layout: ro segment = {:?}..+{:?}, rw segment = {:?}..+{:?}",
        ro.as_ref().map(|s| s.p_vaddr),
        ro.as_ref().map(|s| s.p_memsz),
        rw.as_ref().map(|s| s.p_vaddr),
        rw.as_ref().map(|s| s.p_memsz),
    );

    session.ro_segment = ro;
    session.rw_segment = rw;
    Ok(())
}
