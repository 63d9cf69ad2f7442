//! Order-sensitive command-line argument grammar, per SPEC_FULL.md §6. Unlike a declarative
//! parser, every flag and positional file is acted on immediately and in order: a `-l` only sees
//! the `-L` directories that preceded it, and a positional object is linked in the position it
//! appears relative to surrounding `-l`s.

use crate::error::{Error, Result};
use crate::options::{Options, DEFAULT_ENTRY, DEFAULT_INTERP};
use crate::session::LinkSession;
use std::path::PathBuf;

const USAGE: &str = "\
usage: luxld [ options ] <objfile> ...

  The available options are
    -o<file>    write output to <file>
    -e<sym>     set <sym> as the entry point symbol
    -l<name>    link against object file/library <name>
    -L<dir>     add <dir> to the list of directories searched for the -l options
    -I<interp>  set <interp> as the name of the dynamic linker
    -h          print this help
    -v          verbose progress logging
";

/// The inline value of a one-letter flag (`-ofoo`) or, if absent, the next argument (`-o foo`),
/// consuming it either way.
fn take_value(argv: &[String], i: &mut usize) -> Option<String> {
    let arg = &argv[*i];
    if arg.len() > 2 {
        Some(arg[2..].to_string())
    } else if *i + 1 < argv.len() {
        *i += 1;
        Some(argv[*i].clone())
    } else {
        None
    }
}

/// Resolve one `-l` namespec: `:NAME` searches every `-L` directory for `NAME` verbatim; anything
/// else searches for `libNAME.so` first, then `libNAME.a`.
fn resolve_library(session: &LinkSession, namespec: &str) -> Result<PathBuf> {
    if let Some(literal) = namespec.strip_prefix(':') {
        return session
            .search_dirs
            .iter()
            .map(|dir| dir.join(literal))
            .find(|p| p.is_file())
            .ok_or_else(|| Error::LibraryNotFound(literal.to_string()));
    }
    session
        .find_library(namespec)
        .ok_or_else(|| Error::LibraryNotFound(namespec.to_string()))
}

/// Parse `argv` (excluding the program name) and run the whole link. Prints usage and returns
/// without linking if `-h` is seen.
pub fn run<I: IntoIterator<Item = String>>(args: I) -> Result<()> {
    let argv: Vec<String> = args.into_iter().collect();
    if argv.is_empty() {
        return Err(Error::NoInputFiles);
    }

    let mut session = LinkSession::new();
    let mut output = PathBuf::from("a.out");
    let mut entry = DEFAULT_ENTRY.to_string();
    let mut interp = DEFAULT_INTERP.to_string();
    let mut verbose = false;

    let mut i = 0;
    while i < argv.len() {
        let arg = argv[i].clone();
        let bytes = arg.as_bytes();

        if bytes.first() != Some(&b'-') {
            crate::input::process_file(&mut session, std::path::Path::new(&arg))?;
            i += 1;
            continue;
        }
        if bytes.len() == 1 {
            // A lone "-" is ignored, matching the original's skip-and-continue.
            i += 1;
            continue;
        }

        match bytes[1] as char {
            'o' => {
                if let Some(v) = take_value(&argv, &mut i) {
                    output = PathBuf::from(v);
                }
            }
            'e' => {
                if let Some(v) = take_value(&argv, &mut i) {
                    entry = v;
                }
            }
            'I' => {
                if let Some(v) = take_value(&argv, &mut i) {
                    interp = v;
                }
            }
            'L' => {
                if let Some(v) = take_value(&argv, &mut i) {
                    session.add_search_dir(PathBuf::from(v))?;
                }
            }
            'l' => {
                if let Some(namespec) = take_value(&argv, &mut i) {
                    let path = resolve_library(&session, &namespec)?;
                    crate::input::process_file(&mut session, &path)?;
                }
            }
            'v' => verbose = true,
            'h' => {
                print!("{USAGE}");
                if verbose {
                    println!(
                        "\ndefault output name: {}\ndefault entry symbol: {}\ndefault dynamic linker: {}",
                        "a.out", DEFAULT_ENTRY, DEFAULT_INTERP
                    );
                } else {
                    println!("\ntype `luxld -v -h' to see some default values used for linking");
                }
                return Ok(());
            }
            other => return Err(Error::UnknownOption(other)),
        }
        i += 1;
    }

    let options = Options::builder()
        .output(output)
        .entry(entry)
        .interp(interp)
        .verbose(verbose)
        .build();

    session.link(&options)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn take_value_reads_inline_suffix() {
        let argv = vec!["-ofoo".to_string()];
        let mut i = 0;
        assert_eq!(take_value(&argv, &mut i), Some("foo".to_string()));
        assert_eq!(i, 0);
    }

    #[test]
    fn take_value_reads_next_argument() {
        let argv = vec!["-o".to_string(), "foo".to_string()];
        let mut i = 0;
        assert_eq!(take_value(&argv, &mut i), Some("foo".to_string()));
        assert_eq!(i, 1);
    }

    #[test]
    fn take_value_returns_none_when_argument_missing() {
        let argv = vec!["-o".to_string()];
        let mut i = 0;
        assert_eq!(take_value(&argv, &mut i), None);
        assert_eq!(i, 0);
    }

    #[test]
    fn empty_argv_is_no_input_files() {
        assert!(matches!(run(Vec::<String>::new()), Err(Error::NoInputFiles)));
    }

    #[test]
    fn unknown_option_is_reported() {
        match run(vec!["-z".to_string()]) {
            Err(Error::UnknownOption('z')) => {}
            other => panic!("expected UnknownOption('z'), got {other:?}"),
        }
    }

    #[test]
    fn help_flag_short_circuits_before_any_linking() {
        assert!(run(vec!["-h".to_string()]).is_ok());
    }

    #[test]
    fn library_not_found_reports_namespec() {
        match run(vec!["-lnope".to_string(), "-ononexistent.o".to_string()]) {
            Err(Error::LibraryNotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("expected LibraryNotFound, got {other:?}"),
        }
    }
}
