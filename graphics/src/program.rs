//! Compute program identities and their compilation state.

use std::collections::HashSet;
use std::fmt;

use parking_lot::RwLock;

/// A compute program permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId {
    /// Program family name.
    pub name: &'static str,
    /// Permutation index within the family.
    pub permutation: u32,
}

impl ProgramId {
    /// Create a program id.
    pub const fn new(name: &'static str, permutation: u32) -> Self {
        Self { name, permutation }
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.permutation)
    }
}

/// Tracks which compute programs are compiled and ready to bind.
///
/// Programs are ready unless explicitly marked as compiling. Shader
/// compilation is asynchronous in a real engine; callers must check
/// [`is_ready`](Self::is_ready) before recording a dispatch and skip the
/// work for this frame otherwise.
#[derive(Debug, Default)]
pub struct ProgramLibrary {
    compiling: RwLock<HashSet<ProgramId>>,
}

impl ProgramLibrary {
    /// Create a library where every program is ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `program` can be bound now.
    pub fn is_ready(&self, program: &ProgramId) -> bool {
        !self.compiling.read().contains(program)
    }

    /// Mark `program` as still compiling.
    pub fn mark_compiling(&self, program: ProgramId) {
        log::debug!("ProgramLibrary: {program} is compiling");
        self.compiling.write().insert(program);
    }

    /// Mark `program` as compiled.
    pub fn mark_ready(&self, program: ProgramId) {
        if self.compiling.write().remove(&program) {
            log::debug!("ProgramLibrary: {program} is ready");
        }
    }

    /// Number of programs still compiling.
    pub fn compiling_count(&self) -> usize {
        self.compiling.read().len()
    }
}

static_assertions::assert_impl_all!(ProgramLibrary: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_by_default() {
        let library = ProgramLibrary::new();
        assert!(library.is_ready(&ProgramId::new("skin", 0)));
    }

    #[test]
    fn test_compiling_then_ready() {
        let library = ProgramLibrary::new();
        let program = ProgramId::new("skin", 5);
        library.mark_compiling(program);
        assert!(!library.is_ready(&program));
        assert_eq!(library.compiling_count(), 1);

        library.mark_ready(program);
        assert!(library.is_ready(&program));
    }

    #[test]
    fn test_display() {
        assert_eq!(ProgramId::new("skin", 12).to_string(), "skin[12]");
    }
}
