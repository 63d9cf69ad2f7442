//! Error type for the link-edit pipeline.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
/// Everything that can make a link fail, reported as a single line by the CLI.
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}: {1}")]
    Open(PathBuf, #[source] std::io::Error),

    #[error("{0}: not an ELF object, ELF shared object, or ar archive")]
    UnknownFormat(PathBuf),

    #[error("{0}: unsupported ELF type {1:#x}")]
    UnsupportedElfType(PathBuf, u16),

    #[error("{0}: corrupt or truncated ELF file")]
    CorruptElf(PathBuf),

    #[error("{0}: corrupt or truncated archive")]
    CorruptArchive(PathBuf),

    #[error("{0}: shared object is missing its {1} section")]
    MissingDynamicSection(PathBuf, &'static str),

    #[error("multiple definition of '{0}'")]
    MultipleDefinition(String),

    #[error("undefined reference to '{0}'")]
    UndefinedReference(String),

    #[error("undefined reference to entry symbol '{0}'")]
    UndefinedEntry(String),

    #[error("cannot find library '{0}'")]
    LibraryNotFound(String),

    #[error("nothing to link: no allocatable sections in any input")]
    NothingToLink,

    #[error("relocation type {0:#x} is not supported")]
    UnsupportedRelocation(u8),

    #[error("too many input files (limit {0})")]
    TooManyInputs(usize),

    #[error("too many -L search directories (limit {0})")]
    TooManySearchDirs(usize),

    #[error("too many sections in one segment (limit {0})")]
    TooManySections(usize),

    #[error("no input files")]
    NoInputFiles,

    #[error("unknown option `{0}'")]
    UnknownOption(char),
}

/// Crate-wide result alias; every fallible pipeline stage returns this.
pub type Result<T> = std::result::Result<T, Error>;
