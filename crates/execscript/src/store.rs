//! In-memory store and host, plus helpers for the global store.

use crate::error::{Error, HostFailure, Result};
use crate::tags::{Tag, TagGroup};
use crate::traits::{ScriptHost, TagStore};

/// A [`TagStore`] backed by a single in-memory root group.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    root: TagGroup,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &TagGroup {
        &self.root
    }

    /// Number of top-level labels.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl TagStore for MemoryStore {
    fn get_tag(&self, path: &str) -> Option<Tag> {
        self.root.get_path(path).cloned()
    }

    fn set_tag(&mut self, path: &str, tag: Tag) {
        if !self.root.set_path(path, tag) {
            tracing::debug!(path, "store path not writable");
        }
    }

    fn delete_label(&mut self, label: &str) -> bool {
        self.root.remove(label)
    }

    fn exists(&self, path: &str) -> bool {
        self.root.get_path(path).is_some()
    }
}

/// Stands in for script execution in a [`MemoryHost`].
pub type ExecuteHandler =
    Box<dyn FnMut(&str, &mut MemoryStore) -> std::result::Result<(), HostFailure> + Send>;

/// A [`ScriptHost`] whose execution is a caller-supplied handler.
///
/// The handler sees the script text and the store, so tests can play the
/// part of the host: check the generated code and write what the script
/// would have written.
pub struct MemoryHost {
    store: MemoryStore,
    handler: ExecuteHandler,
    executed: Vec<String>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(|_, _| Ok(()))
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("store", &self.store)
            .field("executed", &self.executed.len())
            .finish()
    }
}

impl MemoryHost {
    pub fn new(
        handler: impl FnMut(&str, &mut MemoryStore) -> std::result::Result<(), HostFailure>
        + Send
        + 'static,
    ) -> Self {
        Self {
            store: MemoryStore::new(),
            handler: Box::new(handler),
            executed: Vec::new(),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MemoryStore {
        &mut self.store
    }

    /// Every script passed to `execute`, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl TagStore for MemoryHost {
    fn get_tag(&self, path: &str) -> Option<Tag> {
        self.store.get_tag(path)
    }

    fn set_tag(&mut self, path: &str, tag: Tag) {
        self.store.set_tag(path, tag);
    }

    fn delete_label(&mut self, label: &str) -> bool {
        self.store.delete_label(label)
    }

    fn exists(&self, path: &str) -> bool {
        self.store.exists(path)
    }
}

impl ScriptHost for MemoryHost {
    fn execute(&mut self, script: &str) -> std::result::Result<(), HostFailure> {
        self.executed.push(script.to_string());
        (self.handler)(script, &mut self.store)
    }
}

/// Fetch any entry of the global store by path.
pub fn get_global_tag(store: &(impl TagStore + ?Sized), path: &str) -> Result<Tag> {
    store
        .get_tag(path)
        .ok_or_else(|| Error::MissingResult(path.to_string()))
}

/// Delete a top-level entry of the global store.
pub fn delete_global_tags(store: &mut (impl TagStore + ?Sized), label: &str) -> bool {
    let deleted = store.delete_label(label);
    tracing::debug!(label, deleted, "deleted global tags");
    deleted
}
