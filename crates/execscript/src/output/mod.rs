//! Script text synthesis.
//!
//! Everything here only produces text; nothing is executed.

pub mod declare;
pub mod linearize;
pub mod sync;
pub mod thread;

pub use declare::{Declarer, declare_variable, real_literal, value_literal};
pub use linearize::{
    EMPTY_LABEL, LINEARIZE_FN, MANIFEST_PREFIX, TYPE_PREFIX, escape_label, helper_functions,
    linearize_into, unescape_label,
};
pub use sync::{Structure, SyncWriter, TypeExpr};
pub use thread::{DetachedTask, ThreadWrapper, ThreadWriter};

/// Prefix of every identifier the synthesizer invents.
pub const GENERATED_PREFIX: &str = "__exec_script_";

/// Hands out collision-free helper identifiers for one assembly pass.
#[derive(Debug, Default)]
pub struct NameAllocator {
    next: usize,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `__exec_script_<base>_<n>`, unique within this allocator.
    pub fn fresh(&mut self, base: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{GENERATED_PREFIX}{base}_{n}")
    }
}
