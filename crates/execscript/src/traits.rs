//! Collaborator interfaces: the host's persisted store and its execute primitive.

use crate::error::HostFailure;
use crate::tags::{Tag, TagGroup, TagValue};

/// The host's process-wide persisted key/value store.
///
/// Paths are `:`-separated labels. Implementations only need the four
/// required methods; the typed accessors mirror the host's
/// `GetTagAs<type>`/`SetTagAs<type>` family.
pub trait TagStore {
    /// Read the tag at `path`.
    fn get_tag(&self, path: &str) -> Option<Tag>;

    /// Write `tag` at `path`, creating intermediate groups.
    fn set_tag(&mut self, path: &str, tag: Tag);

    /// Delete the top-level entry `label`. Returns whether it existed.
    fn delete_label(&mut self, label: &str) -> bool;

    fn exists(&self, path: &str) -> bool {
        self.get_tag(path).is_some()
    }

    fn get_as_long(&self, path: &str) -> Option<i64> {
        self.get_tag(path)?.as_value()?.as_long()
    }

    fn get_as_float(&self, path: &str) -> Option<f64> {
        self.get_tag(path)?.as_value()?.as_float()
    }

    fn get_as_boolean(&self, path: &str) -> Option<bool> {
        self.get_tag(path)?.as_value()?.as_boolean()
    }

    fn get_as_string(&self, path: &str) -> Option<String> {
        self.get_tag(path)?.as_value()?.as_string().map(str::to_string)
    }

    fn set_as_long(&mut self, path: &str, value: i64) {
        self.set_tag(path, Tag::Value(TagValue::Long(value)));
    }

    fn set_as_float(&mut self, path: &str, value: f64) {
        self.set_tag(path, Tag::Value(TagValue::Float(value)));
    }

    fn set_as_boolean(&mut self, path: &str, value: bool) {
        self.set_tag(path, Tag::Value(TagValue::Boolean(value)));
    }

    fn set_as_string(&mut self, path: &str, value: &str) {
        self.set_tag(path, Tag::Value(TagValue::String(value.to_string())));
    }

    fn set_as_group(&mut self, path: &str, group: TagGroup) {
        self.set_tag(path, Tag::Group(group));
    }
}

/// The host's script execution primitive.
///
/// `execute` blocks until the script finishes. Failures carry the host's
/// free-text message; the only structure relied on is a leading
/// `Error in line N` line.
pub trait ScriptHost: TagStore {
    fn execute(&mut self, script: &str) -> Result<(), HostFailure>;
}
