//! PLT0/PLTn byte templates and GOT slot wiring (i386 processor supplement, figure 5-20/5-21).

use crate::elf::relocation::{Rel, R_386_JMP_SLOT};
use crate::session::LinkSession;

const PLT_ENTRY_SIZE: u32 = 16;
const GOT_RESERVED_SLOTS: u32 = 3;

fn synthetic_data<'a>(session: &'a mut LinkSession, name: &str) -> &'a mut Vec<u8> {
    let idx = session.section_index[name];
    &mut session.sections[idx].contributions[0].data
}

fn section_addr(session: &LinkSession, name: &str) -> u32 {
    session.sections[session.section_index[name]].sh_addr
}

/// Write PLT0's fixed prologue now that `.got.plt`'s final address is known.
pub fn write_plt0(session: &mut LinkSession) {
    let got_addr = section_addr(session, ".got.plt");
    let mut bytes = [0u8; 16];
    bytes[0..2].copy_from_slice(&[0xff, 0x35]);
    bytes[2..6].copy_from_slice(&(got_addr + 4).to_le_bytes());
    bytes[6..8].copy_from_slice(&[0xff, 0x25]);
    bytes[8..12].copy_from_slice(&(got_addr + 8).to_le_bytes());
    let data = synthetic_data(session, ".plt");
    data[0..16].copy_from_slice(&bytes);
}

/// Allocate (or return the existing) PLT entry for an external function `name`, writing the
/// PLTn stub, its GOT slot, and the `.rel.plt` entry that tells the dynamic linker how to patch
/// it at load/call time. Must run after layout has assigned `.plt`/`.got.plt`/`.rel.plt` their
/// final addresses.
pub fn get_or_create(session: &mut LinkSession, name: &str, dynsym_index: u32) -> u32 {
    if let Some(&i) = session.plt_index.get(name) {
        return session.plt_entries[i].plt_addr;
    }

    let plt_base = section_addr(session, ".plt");
    let got_base = section_addr(session, ".got.plt");

    let ordinal = session.plt_entries.len() as u32;
    let rel_plt_base_written = ordinal * Rel::SIZE as u32;
    let plt_addr = plt_base + PLT_ENTRY_SIZE * (ordinal + 1);
    let got_slot_addr = got_base + 4 * (GOT_RESERVED_SLOTS + ordinal);

    let mut bytes = [0u8; 16];
    bytes[0..2].copy_from_slice(&[0xff, 0x25]);
    bytes[2..6].copy_from_slice(&got_slot_addr.to_le_bytes());
    bytes[6] = 0x68;
    bytes[7..11].copy_from_slice(&rel_plt_base_written.to_le_bytes());
    bytes[11] = 0xe9;
    let next_insn_addr = plt_addr + 11 + 5;
    let rel32 = plt_base.wrapping_sub(next_insn_addr);
    bytes[12..16].copy_from_slice(&rel32.to_le_bytes());

    {
        let plt_data = synthetic_data(session, ".plt");
        let off = (PLT_ENTRY_SIZE * (ordinal + 1)) as usize;
        plt_data[off..off + 16].copy_from_slice(&bytes);
    }
    {
        let got_data = synthetic_data(session, ".got.plt");
        let off = (4 * (GOT_RESERVED_SLOTS + ordinal)) as usize;
        // Before the first call, the GOT slot points back at PLTn's own push instruction.
        got_data[off..off + 4].copy_from_slice(&(plt_addr + 6).to_le_bytes());
    }
    {
        let rel = Rel::new(got_slot_addr, dynsym_index, R_386_JMP_SLOT);
        let data = synthetic_data(session, ".rel.plt");
        let off = (ordinal as usize) * Rel::SIZE;
        let mut buf = Vec::new();
        use crate::traits::ToWriter;
        rel.to_writer(&mut buf).expect("writing to a Vec cannot fail");
        data[off..off + Rel::SIZE].copy_from_slice(&buf);
    }

    let idx = session.plt_entries.len();
    session.plt_entries.push(crate::session::PltEntry {
        name: name.to_string(),
        plt_addr,
        got_slot_addr,
    });
    session.plt_index.insert(name.to_string(), idx);

    if idx == 0 {
        write_plt0(session);
    }
    plt_addr
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pltn_jump_target_lands_on_plt0() {
        let plt_base = 0x1000u32;
        let ordinal = 2u32;
        let plt_addr = plt_base + PLT_ENTRY_SIZE * (ordinal + 1);
        let next_insn_addr = plt_addr + 11 + 5;
        let rel32 = plt_base.wrapping_sub(next_insn_addr);
        assert_eq!(next_insn_addr.wrapping_add(rel32), plt_base);
    }
}
