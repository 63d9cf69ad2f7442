//! Link options gathered from the command line, per SPEC_FULL.md §6.

use std::path::PathBuf;
use typed_builder::TypedBuilder;

/// Default name ld.so looks for when nothing overrides `-I`.
pub const DEFAULT_INTERP: &str = "/lib/ld-linux.so.2";

/// Default entry point symbol when nothing overrides `-e`.
pub const DEFAULT_ENTRY: &str = "_start";

#[derive(Debug, Clone, TypedBuilder)]
/// Everything a link needs besides the input files themselves.
pub struct Options {
    #[builder(default = PathBuf::from("a.out"))]
    /// Output file path (`-o`).
    pub output: PathBuf,

    #[builder(default = DEFAULT_ENTRY.to_string(), setter(into))]
    /// Entry point symbol name (`-e`).
    pub entry: String,

    #[builder(default = DEFAULT_INTERP.to_string(), setter(into))]
    /// Dynamic linker path embedded in `.interp` (`-I`).
    pub interp: String,

    #[builder(default)]
    /// Verbose progress logging (`-v`), on top of whatever `RUST_LOG` already requests.
    pub verbose: bool,
}
