// This module provides arena-based codegen session management using the bumpalo crate.
// CodegenSession owns the arena allocator and tracks state shared by every stage of a
// backend run with a unified lifetime: interned symbol names (referenced by operands
// without copies), the function currently being compiled, and SessionStats counting
// functions selected, instructions emitted and runtime-library calls. All read-only
// target tables are immutable after initialization and each
// function's mutable state is exclusively owned by that function's run, so the session
// needs no synchronization beyond interior mutability for its counters.

//! Arena-based codegen session management.
//!
//! All names and long-lived allocations produced during a backend run are tied
//! to the session lifetime, eliminating complex lifetime propagation between
//! the lowering, selection and printing stages.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based codegen session.
///
/// Owns the arena used for interned symbol names and tracks statistics for
/// the whole run. One representation is in flight per function at a time;
/// the session itself is never shared across threads.
pub struct CodegenSession<'arena> {
    /// Arena allocator for backend objects.
    arena: &'arena Bump,

    /// String interning for symbol names referenced by operands.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Session statistics for debugging and reporting.
    stats: RefCell<SessionStats>,

    /// Current function being compiled.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CodegenSession<'arena> {
    /// Create a new codegen session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            interned_strings: RefCell::new(HashMap::new()),
            stats: RefCell::new(SessionStats::default()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T>(&self, slice: &[T]) -> &'arena [T]
    where
        T: Clone,
    {
        self.arena.alloc_slice_clone(slice)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set current function being compiled.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    /// Record that a function finished instruction selection.
    pub fn record_function_selected(&self, name: &str) {
        log::debug!("function selected: {}", name);
        self.stats.borrow_mut().functions_selected += 1;
    }

    /// Record a selected machine instruction.
    pub fn record_instruction_selected(&self) {
        self.stats.borrow_mut().instructions_selected += 1;
    }

    /// Record a call emitted against the runtime library.
    pub fn record_libcall(&self, symbol: &str) {
        log::debug!("runtime-library call emitted: {}", symbol);
        self.stats.borrow_mut().libcalls_emitted += 1;
    }

    /// Get codegen statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Codegen session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions that completed instruction selection.
    pub functions_selected: usize,

    /// Number of machine instructions emitted by the selector.
    pub instructions_selected: usize,

    /// Multiply/divide operations lowered to runtime-library calls.
    pub libcalls_emitted: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Codegen Session Statistics:")?;
        writeln!(f, "  Functions selected: {}", self.functions_selected)?;
        writeln!(f, "  Instructions selected: {}", self.instructions_selected)?;
        writeln!(f, "  Runtime-library calls: {}", self.libcalls_emitted)?;
        Ok(())
    }
}
