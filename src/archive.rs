//! System V (`ar`) archive parsing and the fixed-point symbol-index extraction loop.

use crate::error::Result;
use crate::session::LinkSession;
use std::path::Path;

const ARMAG: &[u8; 8] = b"!<arch>\n";
const AR_HDR_SIZE: usize = 60;

/// One entry from an archive's symbol index: a global name and the byte offset (from just past
/// `ARMAG`) of the member header that defines it.
struct ArchiveSymbol<'a> {
    name: &'a str,
    member_offset: u32,
}

/// Parse the leading symbol-index member (`/ ` in BSD/SysV archives, written by `ar` unless `-S`
/// was used). Returns `None` if the archive has no index, which is not an error: such an archive
/// is silently skipped, matching historical `ld` behavior.
fn parse_symbol_index(buf: &[u8]) -> Option<Vec<ArchiveSymbol<'_>>> {
    if buf.len() < ARMAG.len() || &buf[0..ARMAG.len()] != ARMAG {
        return None;
    }
    let hdr_start = ARMAG.len();
    if buf.len() < hdr_start + AR_HDR_SIZE {
        return None;
    }
    let hdr = &buf[hdr_start..hdr_start + AR_HDR_SIZE];
    let name = &hdr[0..16];
    if name[0] != b'/' || name[1] != b' ' {
        return None;
    }
    let size_field = std::str::from_utf8(&hdr[48..58]).ok()?;
    let size: usize = size_field.trim().parse().ok()?;
    let data_start = hdr_start + AR_HDR_SIZE;
    let data = buf.get(data_start..data_start + size)?;
    if data.len() < 4 {
        return None;
    }
    let count = u32::from_be_bytes(data[0..4].try_into().ok()?) as usize;
    let offsets_start = 4;
    let offsets_end = offsets_start + count * 4;
    let offsets = data.get(offsets_start..offsets_end)?;
    let names_blob = data.get(offsets_end..)?;
    let mut symbols = Vec::with_capacity(count);
    let mut cursor = 0usize;
    for i in 0..count {
        let off = u32::from_be_bytes(offsets[i * 4..i * 4 + 4].try_into().ok()?);
        let nul = names_blob[cursor..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| cursor + p)?;
        let name = std::str::from_utf8(&names_blob[cursor..nul]).ok()?;
        symbols.push(ArchiveSymbol {
            name,
            member_offset: off,
        });
        cursor = nul + 1;
    }
    Some(symbols)
}

/// Run the archive's member header + body through `process_object_file`.
fn process_member(
    session: &mut LinkSession,
    buf: &'static [u8],
    member_offset: u32,
    path: &Path,
) -> Result<()> {
    let hdr_start = member_offset as usize;
    let size_field = std::str::from_utf8(&buf[hdr_start + 48..hdr_start + 58])
        .unwrap_or("0")
        .trim()
        .to_string();
    let size: usize = size_field.parse().unwrap_or(0);
    let data_start = hdr_start + AR_HDR_SIZE;
    let data = &buf[data_start..data_start + size];
    crate::input::process_object_bytes(session, data, path)
}

/// Pull members out of `buf` (an `ar` archive) until every symbol they can resolve has been
/// resolved, looping to a fixed point because archive members aren't guaranteed to be ordered by
/// dependency.
pub fn process_archive(session: &mut LinkSession, buf: &'static [u8], path: &Path) -> Result<()> {
    let Some(symbols) = parse_symbol_index(buf) else {
        log::warn!("{}: archive has no symbol index, skipping", path.display());
        return Ok(());
    };
    log::debug!(
        "{}: archive symbol index has {} entries",
        path.display(),
        symbols.len()
    );

    let mut extracted = vec![false; symbols.len()];
    loop {
        let mut added = false;
        for (i, sym) in symbols.iter().enumerate() {
            if extracted[i] {
                continue;
            }
            if !session.symtab.is_undefined(sym.name) {
                continue;
            }
            extracted[i] = true;
            log::debug!(
                "{}: extracting member at offset {} for undefined '{}'",
                path.display(),
                sym.member_offset,
                sym.name
            );
            process_member(session, buf, sym.member_offset, path)?;
            added = true;
            if session.symtab.undefined_count() == 0 {
                return Ok(());
            }
        }
        if !added {
            break;
        }
    }
    Ok(())
}
