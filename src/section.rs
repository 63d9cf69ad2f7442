//! Merging same-named sections from every input into one compound output section, per
//! SPEC_FULL.md §4.2.

use crate::elf::relocation::Rel;
use crate::elf::section::{SHT_NOBITS, SHT_NULL, SHT_REL, SHT_STRTAB, SHT_SYMTAB};
use crate::elf::{round_up, section::SectionHeader};
use crate::error::Result;
use crate::session::LinkSession;
use crate::traits::{FromReader, HasWrittenSize};
use std::io::Cursor;

/// One input's contribution to a compound section. `object_index` is `None` for
/// linker-synthesized sections (PLT, GOT, dynamic sections, etc.).
pub struct SimpleSection {
    pub object_index: Option<usize>,
    pub section_index: usize,
    /// Owned copy of the bytes, rounded up to a 4-byte boundary with zero padding.
    pub data: Vec<u8>,
    pub orig_size: u32,
}

/// All contributions with the same section name, merged into one output section.
pub struct CompoundSection {
    pub name: String,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addralign: u32,
    pub sh_size: u32,
    /// Assigned during layout.
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub out_index: u16,
    pub contributions: Vec<SimpleSection>,
}

impl CompoundSection {
    fn new(name: &str, first: &SectionHeader) -> Self {
        CompoundSection {
            name: name.to_string(),
            sh_type: first.sh_type,
            sh_flags: first.sh_flags,
            sh_addralign: first.sh_addralign.max(1),
            sh_size: 0,
            sh_addr: 0,
            sh_offset: 0,
            out_index: 0,
            contributions: Vec::new(),
        }
    }

    pub fn is_alloc(&self) -> bool {
        self.sh_flags & crate::elf::section::ShFlags::ALLOC.bits() != 0
    }

    pub fn is_write(&self) -> bool {
        self.sh_flags & crate::elf::section::ShFlags::WRITE.bits() != 0
    }

    pub fn is_nobits(&self) -> bool {
        self.sh_type == SHT_NOBITS
    }
}

/// Find or create a session's compound section by name, keeping insertion order.
pub fn get_or_create<'a>(
    sections: &'a mut Vec<CompoundSection>,
    index: &mut std::collections::HashMap<String, usize>,
    name: &str,
    header_template: &SectionHeader,
) -> &'a mut CompoundSection {
    if let Some(&i) = index.get(name) {
        return &mut sections[i];
    }
    sections.push(CompoundSection::new(name, header_template));
    index.insert(name.to_string(), sections.len() - 1);
    sections.last_mut().expect("just pushed")
}

/// Append a synthetic (linker-generated) section contribution, creating the compound section if
/// this is its first content.
pub fn add_synthetic(
    session: &mut LinkSession,
    name: &str,
    sh_type: u32,
    sh_flags: u32,
    sh_addralign: u32,
    data: Vec<u8>,
) {
    let header = SectionHeader {
        sh_name: 0,
        sh_type,
        sh_flags,
        sh_addr: 0,
        sh_offset: 0,
        sh_size: 0,
        sh_link: 0,
        sh_info: 0,
        sh_addralign,
        sh_entsize: 0,
    };
    let compound = get_or_create(
        &mut session.sections,
        &mut session.section_index,
        name,
        &header,
    );
    let orig_size = data.len() as u32;
    let padded_len = round_up(orig_size, 4) as usize;
    let mut padded = data;
    padded.resize(padded_len, 0);
    compound.sh_size += padded_len as u32;
    compound.sh_addralign = compound.sh_addralign.max(sh_addralign);
    compound.contributions.push(SimpleSection {
        object_index: None,
        section_index: 0,
        data: padded,
        orig_size,
    });
}

/// Walk every object linked so far and merge their sections into `session.sections`. Called once,
/// after all inputs (objects, archives, shared objects) have been processed.
pub fn merge_sections(session: &mut LinkSession) -> Result<()> {
    for obj_idx in 0..session.objects.len() {
        let nsections = session.objects[obj_idx].sections.len();
        for sec_idx in 0..nsections {
            let (name, header, data, is_rel) = {
                let obj = &session.objects[obj_idx];
                let header = obj.sections[sec_idx].clone();
                if header.sh_type == SHT_NULL
                    || header.sh_type == SHT_SYMTAB
                    || header.sh_type == SHT_STRTAB
                {
                    continue;
                }
                let name = obj.section_name(sec_idx).to_string();
                if name.is_empty() {
                    continue;
                }
                let data = obj.section_data(sec_idx).to_vec();
                (name, header, data, header.sh_type == SHT_REL)
            };

            let orig_size = header.sh_size;
            let padded_len = round_up(orig_size, 4) as usize;
            let mut padded = data;
            padded.resize(padded_len, 0);

            let compound = get_or_create(
                &mut session.sections,
                &mut session.section_index,
                &name,
                &header,
            );
            compound.sh_flags |= header.sh_flags;
            compound.sh_addralign = compound.sh_addralign.max(header.sh_addralign.max(1));
            compound.sh_size += padded_len as u32;
            let compound_idx = session.section_index[&name];
            let contrib_idx = session.sections[compound_idx].contributions.len();
            session.sections[compound_idx].contributions.push(SimpleSection {
                object_index: Some(obj_idx),
                section_index: sec_idx,
                data: padded,
                orig_size,
            });
            session
                .contribution_location
                .insert((obj_idx, sec_idx), (compound_idx, contrib_idx));

            if is_rel {
                session.reloc_count += orig_size / Rel::SIZE as u32;
            }
        }
    }
    log::info!(
        "merged {} input object(s) into {} output section(s), {} relocation(s) total",
        session.objects.len(),
        session.sections.len(),
        session.reloc_count
    );
    Ok(())
}

/// Read back a `Rel` at byte offset `off` within a contribution's (padded) data.
pub fn read_rel(data: &[u8], off: usize) -> Result<Rel> {
    let mut cursor = Cursor::new(&data[off..off + Rel::SIZE]);
    Rel::from_reader(&mut cursor)
}
