//! Rebuild nested values from a path manifest and per-path type tags.

use crate::escape::NonPrintableCodec;
use crate::output::{MANIFEST_PREFIX, TYPE_PREFIX, unescape_label};
use crate::registry;
use crate::traits::TagStore;
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;

/// One label of a linearized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Label with doubled slashes collapsed, still token-escaped.
    pub label: String,
    /// Byte offset in the raw path where this label ends.
    pub raw_end: usize,
}

/// Split a linearized path on single `/`.
///
/// A run of `n` slashes holds `n / 2` literal slashes; an odd run also ends
/// the label. The literal slashes stay with the label before the separator:
/// labels never start with `/` because a leading slash is written as a
/// token. Empty labels are skipped.
pub fn split_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut label = String::new();
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'/' {
            let c = path[i..].chars().next().unwrap_or_default();
            label.push(c);
            i += c.len_utf8().max(1);
            continue;
        }
        let run = bytes[i..].iter().take_while(|&&b| b == b'/').count();
        label.extend(std::iter::repeat_n('/', run / 2));
        if run % 2 == 1 && !label.is_empty() {
            segments.push(PathSegment {
                label: std::mem::take(&mut label),
                raw_end: i + run - 1,
            });
        }
        i += run;
    }
    if !label.is_empty() {
        segments.push(PathSegment {
            label,
            raw_end: path.len(),
        });
    }
    segments
}

/// Read one scalar of `kind` from `path`; strings are unescaped.
///
/// Container kinds are never read as values and give `None`.
pub fn read_scalar(
    store: &(impl TagStore + ?Sized),
    path: &str,
    kind: ValueKind,
    codec: &NonPrintableCodec,
) -> Option<Value> {
    match registry::resolve(kind).ok()?.kind {
        ValueKind::Integer => store.get_as_long(path).map(Value::Int),
        ValueKind::Real => store.get_as_float(path).map(Value::Real),
        ValueKind::Boolean => store.get_as_boolean(path).map(Value::Bool),
        ValueKind::Text => store.get_as_string(path).map(|s| Value::Text(codec.unescape(&s))),
        ValueKind::Sequence | ValueKind::Mapping | ValueKind::Null => None,
    }
}

fn empty_container(kind: ValueKind) -> Option<Value> {
    match kind {
        ValueKind::Sequence => Some(Value::List(Vec::new())),
        ValueKind::Mapping => Some(Value::Map(IndexMap::new())),
        _ => None,
    }
}

/// Rebuild the container variable `var` stored linearized under `namespace`.
///
/// Returns `None` when the manifest is missing or any listed path cannot be
/// followed: a missing or unknown type tag, a list label that is not an
/// index, or an unreadable scalar.
pub fn reconstruct(
    store: &(impl TagStore + ?Sized),
    namespace: &str,
    var: &str,
    kind: ValueKind,
    codec: &NonPrintableCodec,
) -> Option<Value> {
    let manifest = store.get_as_string(&format!("{namespace}:{MANIFEST_PREFIX}{var}"))?;
    let mut root = empty_container(kind)?;
    let entries: Vec<&str> = manifest.split(';').filter(|e| !e.is_empty()).collect();
    // Every list element has its own manifest entry, so no valid index
    // reaches the entry count.
    let max_index = entries.len();
    for entry in entries {
        if insert_entry(store, namespace, &mut root, entry, max_index, codec).is_none() {
            tracing::debug!(namespace, var, entry, "path could not be reconstructed");
            return None;
        }
    }
    Some(root)
}

fn insert_entry(
    store: &(impl TagStore + ?Sized),
    namespace: &str,
    root: &mut Value,
    entry: &str,
    max_index: usize,
    codec: &NonPrintableCodec,
) -> Option<()> {
    let segments = split_path(entry);
    // The first label is the variable itself.
    let (_, rest) = segments.split_first()?;
    let mut current = root;
    for segment in rest {
        let prefix = &entry[..segment.raw_end];
        let type_name = store.get_as_string(&format!("{namespace}:{TYPE_PREFIX}{prefix}"))?;
        let slot = child_slot(current, &segment.label, max_index, codec)?;
        match type_name.as_str() {
            "TagList" => {
                if !matches!(slot, Value::List(_)) {
                    *slot = Value::List(Vec::new());
                }
                current = slot;
            }
            "TagGroup" => {
                if !matches!(slot, Value::Map(_)) {
                    *slot = Value::Map(IndexMap::new());
                }
                current = slot;
            }
            scalar => {
                let kind = registry::to_native_type(scalar).ok()?;
                *slot = read_scalar(store, &format!("{namespace}:{prefix}"), kind, codec)?;
                return Some(());
            }
        }
    }
    Some(())
}

/// The slot for `label` inside `parent`, created as `Null` if missing.
///
/// List indices at or above `max_index` are rejected.
fn child_slot<'v>(
    parent: &'v mut Value,
    label: &str,
    max_index: usize,
    codec: &NonPrintableCodec,
) -> Option<&'v mut Value> {
    match parent {
        Value::List(items) => {
            let index: usize = label.parse().ok()?;
            if index >= max_index {
                return None;
            }
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        Value::Map(map) => Some(map.entry(unescape_label(label, codec)).or_insert(Value::Null)),
        _ => None,
    }
}
