//! Bump allocator backing every buffer whose lifetime is the whole link session: merged section
//! contents, linker-synthesized section data, and strings copied out of input buffers so they
//! outlive the `InputObject` that originally owned them.

use typed_arena::Arena;

/// A byte-slab arena. Individual allocations are never freed; the whole thing drops at once when
/// the owning `LinkSession` does.
#[derive(Default)]
pub struct ByteArena {
    arena: Arena<u8>,
}

impl ByteArena {
    pub fn new() -> Self {
        ByteArena {
            arena: Arena::new(),
        }
    }

    /// Allocate `len` zeroed bytes.
    pub fn alloc_zeroed(&self, len: usize) -> &mut [u8] {
        self.arena.alloc_extend(std::iter::repeat(0u8).take(len))
    }

    /// Copy `data` into the arena and return a slice with the arena's lifetime.
    pub fn alloc_copy(&self, data: &[u8]) -> &[u8] {
        self.arena.alloc_extend(data.iter().copied())
    }

}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copies_survive_arena() {
        let arena = ByteArena::new();
        let a = arena.alloc_copy(b"hello");
        let b = arena.alloc_copy(b"world");
        assert_eq!(a, b"hello");
        assert_eq!(b, b"world");
    }

    #[test]
    fn zeroed_is_zero() {
        let arena = ByteArena::new();
        let z = arena.alloc_zeroed(8);
        assert_eq!(z, &[0u8; 8]);
    }
}
