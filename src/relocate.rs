//! Relocation application, per SPEC_FULL.md §4.6. Walks every input's `SHT_REL` sections and
//! patches the merged output bytes in place; external references are resolved against shared
//! objects on the fly, allocating a PLT stub or a `.bss` COPY slot as needed.

use crate::elf::relocation::{
    R_386_16, R_386_32, R_386_8, R_386_GOT32, R_386_GOTPC, R_386_PC16, R_386_PC32, R_386_PC8,
    R_386_PLT32, Rel,
};
use crate::elf::section::{SHN_ABS, SHT_REL};
use crate::elf::symbol::{st_bind, st_type, STB_LOCAL};
use crate::error::{Error, Result};
use crate::session::LinkSession;

/// Resolve one relocation's symbol to its final value. Returns `None` only for a global/weak
/// reference that is genuinely unresolved (caught later by the closure check in `LinkSession::link`).
fn resolve_symbol(
    session: &mut LinkSession,
    obj_idx: usize,
    sym: &crate::elf::symbol::Sym,
    name: &str,
) -> Option<u32> {
    if st_bind(sym.st_info) == STB_LOCAL {
        return Some(if sym.st_shndx == SHN_ABS {
            sym.st_value
        } else {
            session.objects[obj_idx].section_addrs[sym.st_shndx as usize] + sym.st_value
        });
    }

    if let Some(g) = session.symtab.get(name) {
        if g.defined {
            return Some(g.value);
        }
    }

    // Not defined by any regular object: resolve against a shared object, allocating whatever
    // the dynamic linker needs to bind it at load/call time.
    let so_sym = session
        .shared_objects
        .iter()
        .find_map(|so| so.find(name).cloned())?;
    let dynsym_index = session.symtab.get(name)?.dynsym_index?;

    let is_function = st_type(so_sym.st_info) == crate::elf::symbol::STT_FUNC
        || (st_type(so_sym.st_info) == 0 && so_sym.st_size == 0);

    let addr = if is_function {
        crate::plt::get_or_create(session, name, dynsym_index)
    } else {
        session.get_or_create_copy(name, so_sym.st_size, dynsym_index)
    };
    session.symtab.resolve_externally(name, addr);
    if let Some(g) = session.symtab.get_mut(name) {
        if is_function {
            g.plt_addr = Some(addr);
        } else {
            g.copy_addr = Some(addr);
        }
    }
    Some(addr)
}

fn patch(data: &mut [u8], off: usize, kind: u8, value: i64) -> Result<()> {
    match kind {
        R_386_32 | R_386_PC32 => {
            data[off..off + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
        R_386_16 | R_386_PC16 => {
            data[off..off + 2].copy_from_slice(&(value as u16).to_le_bytes());
        }
        R_386_8 | R_386_PC8 => {
            data[off] = value as u8;
        }
        other => return Err(Error::UnsupportedRelocation(other)),
    }
    Ok(())
}

fn read_addend(data: &[u8], off: usize, kind: u8) -> i64 {
    match kind {
        R_386_32 | R_386_PC32 => {
            i32::from_le_bytes(data[off..off + 4].try_into().expect("4 bytes")) as i64
        }
        R_386_16 | R_386_PC16 => {
            i16::from_le_bytes(data[off..off + 2].try_into().expect("2 bytes")) as i64
        }
        R_386_8 | R_386_PC8 => data[off] as i8 as i64,
        _ => 0,
    }
}

/// Apply every input object's relocations against the merged, laid-out output. Must run after
/// `LinkSession::finalize_symbol_values`.
pub fn apply_relocations(session: &mut LinkSession) -> Result<()> {
    let mut applied = 0u32;
    for obj_idx in 0..session.objects.len() {
        let rel_sections: Vec<(usize, Vec<u8>)> = session.objects[obj_idx]
            .sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.sh_type == SHT_REL)
            .map(|(i, s)| (s.sh_info as usize, session.objects[obj_idx].section_data(i).to_vec()))
            .collect();

        for (target_sec_idx, data) in rel_sections {
            let n = data.len() / Rel::SIZE;
            for i in 0..n {
                let rel = crate::section::read_rel(&data, i * Rel::SIZE)?;
                let kind = rel.kind();
                if kind == R_386_GOT32 || kind == R_386_PLT32 || kind == R_386_GOTPC {
                    continue;
                }

                let sym_index = rel.sym() as usize;
                let sym = session.objects[obj_idx].symbol(sym_index)?;
                let name = if st_bind(sym.st_info) == STB_LOCAL {
                    String::new()
                } else {
                    session.objects[obj_idx].symbol_name(sym.st_name).to_string()
                };

                let Some(s_value) = resolve_symbol(session, obj_idx, &sym, &name) else {
                    return Err(Error::UndefinedReference(name));
                };

                let (compound_idx, contrib_idx) =
                    session.contribution_location[&(obj_idx, target_sec_idx)];
                let p_addr = session.objects[obj_idx].section_addrs[target_sec_idx] + rel.r_offset;
                let dest = &mut session.sections[compound_idx].contributions[contrib_idx].data;
                let dest_off = rel.r_offset as usize;

                let addend = read_addend(dest, dest_off, kind);
                let value: i64 = match kind {
                    R_386_32 | R_386_16 | R_386_8 => s_value as i64 + addend,
                    R_386_PC32 | R_386_PC16 | R_386_PC8 => {
                        s_value as i64 + addend - p_addr as i64
                    }
                    other => return Err(Error::UnsupportedRelocation(other)),
                };
                patch(dest, dest_off, kind, value)?;
                applied += 1;
            }
        }
    }
    log::info!("relocation: {applied} entries applied");
    Ok(())
}
