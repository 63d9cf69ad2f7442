//! The global symbol table (one entry per unique global name, across every input) and the
//! insertion-ordered list of locals.

use crate::elf::section::SHN_UNDEF;
use crate::elf::symbol::{st_bind, STB_WEAK};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A resolved (or still-unresolved) global symbol.
#[derive(Debug, Clone)]
pub struct GlobalSymbol {
    pub name: String,
    pub value: u32,
    pub size: u32,
    pub info: u8,
    /// `SHN_UNDEF` until some input defines it.
    pub shndx: u16,
    /// True once some input has given it a value (weak or strong).
    pub defined: bool,
    /// True if the current definition (or lack of one) came from a weak symbol.
    pub weak: bool,
    /// Index into the output `.dynsym`, once it has been copied there.
    pub dynsym_index: Option<u32>,
    /// Address of its PLT stub, once one has been allocated for it.
    pub plt_addr: Option<u32>,
    /// Address of its COPY-relocated `.bss` slot, once one has been allocated for it.
    pub copy_addr: Option<u32>,
    /// The object and section that defined it, so `value` can be finalized once layout has
    /// assigned that section its address. `None` for absolute (`SHN_ABS`) symbols, whose value
    /// is already final at definition time.
    pub def_obj: Option<usize>,
    pub def_sec: Option<usize>,
}

impl GlobalSymbol {
    /// Best-effort `st_type` to publish in `.dynsym`: an object with a nonzero recorded size
    /// reads as data, anything else as a function, matching what relocation resolution actually
    /// needs the distinction for (PLT vs. COPY relocations).
    pub fn kind_hint(&self) -> u8 {
        use crate::elf::symbol::{st_type, STT_OBJECT};
        let kind = st_type(self.info);
        if kind != 0 {
            kind
        } else if self.size > 0 {
            STT_OBJECT
        } else {
            crate::elf::symbol::STT_FUNC
        }
    }

    fn undefined(name: &str) -> Self {
        GlobalSymbol {
            name: name.to_string(),
            value: 0,
            size: 0,
            info: 0,
            shndx: SHN_UNDEF,
            defined: false,
            weak: false,
            dynsym_index: None,
            plt_addr: None,
            copy_addr: None,
            def_obj: None,
            def_sec: None,
        }
    }
}

/// A local (`STB_LOCAL`) symbol, kept in input order; locals never participate in resolution.
#[derive(Debug, Clone)]
pub struct LocalSymbol {
    pub name: String,
    /// Raw `st_value` until `LinkSession::finalize_symbol_values` adds the defining section's
    /// final address; already final for absolute symbols (`def_sec` is `None`).
    pub value: u32,
    pub size: u32,
    pub info: u8,
    pub shndx: u16,
    pub def_obj: Option<usize>,
    pub def_sec: Option<usize>,
}

#[derive(Default)]
pub struct SymbolTable {
    pub globals: HashMap<String, GlobalSymbol>,
    pub locals: Vec<LocalSymbol>,
    undefined: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn undefined_count(&self) -> u32 {
        self.undefined
    }

    /// True if `name` is a known global that is still unresolved. A name nobody has referenced
    /// yet is not "undefined" in the sense that matters to archive extraction: there is no
    /// reason to pull in a member defining a symbol nothing needs.
    pub fn is_undefined(&self, name: &str) -> bool {
        self.globals.get(name).is_some_and(|g| !g.defined)
    }

    fn entry(&mut self, name: &str) -> &mut GlobalSymbol {
        if !self.globals.contains_key(name) {
            self.globals.insert(name.to_string(), GlobalSymbol::undefined(name));
            self.undefined += 1;
        }
        self.globals.get_mut(name).expect("just inserted")
    }

    /// Record a reference to `name` without defining it (an undefined entry in some object's
    /// symbol table). A no-op if `name` is already known.
    pub fn reference(&mut self, name: &str, info: u8) {
        let weak = st_bind(info) == STB_WEAK;
        let sym = self.entry(name);
        if weak && !sym.defined {
            // An undefined weak reference never counts against closure: resolve it to 0 now.
            if !sym.weak {
                sym.weak = true;
            }
        }
    }

    /// Define (or redefine) `name`. Implements the resolution rules from SPEC_FULL.md §4.5:
    /// a strong definition always wins and conflicts with any other strong definition; a weak
    /// definition only takes effect if nothing stronger has defined the symbol yet.
    #[allow(clippy::too_many_arguments)]
    pub fn define(
        &mut self,
        name: &str,
        value: u32,
        size: u32,
        info: u8,
        shndx: u16,
        def_obj: Option<usize>,
        def_sec: Option<usize>,
    ) -> Result<()> {
        let incoming_weak = st_bind(info) == STB_WEAK;
        let was_defined = self.globals.get(name).map(|g| g.defined).unwrap_or(false);
        let was_weak = self.globals.get(name).map(|g| g.weak).unwrap_or(false);

        if was_defined && !was_weak && !incoming_weak {
            return Err(Error::MultipleDefinition(name.to_string()));
        }
        if was_defined && !was_weak && incoming_weak {
            // Strong definition already present; a later weak definition is ignored.
            return Ok(());
        }

        let was_undefined = !was_defined;
        let sym = self.entry(name);
        sym.value = value;
        sym.size = size;
        sym.info = info;
        sym.shndx = shndx;
        sym.defined = true;
        sym.weak = incoming_weak;
        sym.def_obj = def_obj;
        sym.def_sec = def_sec;
        if was_undefined {
            self.undefined = self.undefined.saturating_sub(1);
        }
        Ok(())
    }

    /// Called once resolution against every input (including shared objects) is complete: any
    /// global that is still an undefined weak reference resolves to value 0 without being
    /// counted as a closure failure.
    pub fn finalize_weak_undefined(&mut self) {
        for sym in self.globals.values_mut() {
            if !sym.defined && sym.weak {
                sym.defined = true;
                sym.value = 0;
                sym.shndx = SHN_UNDEF;
                self.undefined = self.undefined.saturating_sub(1);
            }
        }
    }

    /// Mark a still-undefined global as resolved against a shared object: it now has a concrete
    /// address (a PLT stub or a COPY-relocated `.bss` slot) even though no regular object ever
    /// defined it. Does nothing if `name` was already defined.
    pub fn resolve_externally(&mut self, name: &str, value: u32) {
        let sym = self.entry(name);
        if sym.defined {
            return;
        }
        sym.defined = true;
        sym.value = value;
        sym.shndx = SHN_UNDEF;
        self.undefined = self.undefined.saturating_sub(1);
    }

    pub fn get(&self, name: &str) -> Option<&GlobalSymbol> {
        self.globals.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut GlobalSymbol> {
        self.globals.get_mut(name)
    }

    pub fn add_local(&mut self, sym: LocalSymbol) {
        self.locals.push(sym);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::elf::symbol::{st_info, STB_GLOBAL, STT_FUNC};

    #[test]
    fn weak_undefined_does_not_block_closure() {
        let mut table = SymbolTable::new();
        table.reference("foo", st_info(STB_WEAK, STT_FUNC));
        assert_eq!(table.undefined_count(), 1);
        table.finalize_weak_undefined();
        assert_eq!(table.undefined_count(), 0);
        assert_eq!(table.get("foo").unwrap().value, 0);
    }

    #[test]
    fn strong_definition_after_weak_wins_silently() {
        let mut table = SymbolTable::new();
        table
            .define("foo", 1, 0, st_info(STB_WEAK, STT_FUNC), 1, None, None)
            .unwrap();
        table
            .define("foo", 2, 0, st_info(STB_GLOBAL, STT_FUNC), 1, None, None)
            .unwrap();
        assert_eq!(table.get("foo").unwrap().value, 2);
        assert!(!table.get("foo").unwrap().weak);
    }

    #[test]
    fn two_strong_definitions_conflict() {
        let mut table = SymbolTable::new();
        table
            .define("main", 1, 0, st_info(STB_GLOBAL, STT_FUNC), 1, None, None)
            .unwrap();
        let err = table.define("main", 2, 0, st_info(STB_GLOBAL, STT_FUNC), 1, None, None);
        assert!(matches!(err, Err(Error::MultipleDefinition(_))));
    }

    #[test]
    fn unreferenced_name_is_not_undefined() {
        let table = SymbolTable::new();
        assert!(!table.is_undefined("nobody_asked_for_this"));
    }
}
