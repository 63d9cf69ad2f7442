//! `luxld`: a static linker for ELF32/i386 relocatable objects, archives, and shared objects.
//!
//! Merges sections from every input, resolves symbols across objects/archives/shared objects,
//! lays out `PT_LOAD` segments, synthesizes the dynamic-linking auxiliary sections when a shared
//! object is involved, applies relocations, and emits a runnable ELF executable.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

pub mod archive;
pub mod arena;
pub mod cli;
pub mod dynsec;
pub mod elf;
pub mod error;
pub mod hash;
pub mod input;
pub mod layout;
pub mod options;
pub mod plt;
pub mod relocate;
pub mod section;
pub mod session;
pub mod strtab;
pub mod symtab;
pub mod traits;
pub mod writer;

pub use error::{Error, Result};
pub use options::Options;
pub use session::LinkSession;
