//! Store-native values: scalar tags and (possibly nested) tag groups.
//!
//! Paths address nested entries with `:` between labels; a segment of the
//! form `[n]` addresses the n-th entry of a group regardless of its label.

use crate::error::{Error, Result};
use crate::escape::KeyPolicy;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A scalar stored in a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    Long(i64),
    Float(f64),
    Double(f64),
    Boolean(bool),
    String(String),
}

impl TagValue {
    /// Storage type name, as used in type tags and typed accessors.
    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::Long(_) => "Long",
            TagValue::Float(_) => "Float",
            TagValue::Double(_) => "Double",
            TagValue::Boolean(_) => "Boolean",
            TagValue::String(_) => "String",
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            TagValue::Long(i) => Some(*i),
            TagValue::Float(f) | TagValue::Double(f) => Some(*f as i64),
            TagValue::Boolean(b) => Some(i64::from(*b)),
            TagValue::String(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TagValue::Long(i) => Some(*i as f64),
            TagValue::Float(f) | TagValue::Double(f) => Some(*f),
            TagValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            TagValue::String(_) => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            TagValue::Boolean(b) => Some(*b),
            TagValue::Long(i) => Some(*i != 0),
            TagValue::Float(f) | TagValue::Double(f) => Some(*f != 0.0),
            TagValue::String(_) => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A tag: a scalar or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tag {
    Value(TagValue),
    Group(TagGroup),
}

impl Tag {
    pub fn as_value(&self) -> Option<&TagValue> {
        match self {
            Tag::Value(v) => Some(v),
            Tag::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&TagGroup> {
        match self {
            Tag::Group(g) => Some(g),
            Tag::Value(_) => None,
        }
    }

    /// Storage type name; groups report `TagList` or `TagGroup`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Tag::Value(v) => v.type_name(),
            Tag::Group(g) if g.is_list() => "TagList",
            Tag::Group(_) => "TagGroup",
        }
    }
}

impl From<TagValue> for Tag {
    fn from(v: TagValue) -> Self {
        Tag::Value(v)
    }
}

impl From<TagGroup> for Tag {
    fn from(g: TagGroup) -> Self {
        Tag::Group(g)
    }
}

/// One entry of a group. List entries have empty labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub label: String,
    pub tag: Tag,
}

/// An ordered group of tags, either labeled or a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagGroup {
    list: bool,
    entries: Vec<TagEntry>,
}

enum Segment<'a> {
    Index(usize),
    Label(&'a str),
}

fn parse_segment(segment: &str) -> Segment<'_> {
    segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse().ok())
        .map_or(Segment::Label(segment), Segment::Index)
}

impl TagGroup {
    pub fn new_group() -> Self {
        Self::default()
    }

    pub fn new_list() -> Self {
        Self {
            list: true,
            entries: Vec::new(),
        }
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<&Tag> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| &e.tag)
    }

    pub fn get_index(&self, index: usize) -> Option<&Tag> {
        self.entries.get(index).map(|e| &e.tag)
    }

    /// Append an unlabeled entry.
    pub fn push(&mut self, tag: impl Into<Tag>) {
        self.entries.push(TagEntry {
            label: String::new(),
            tag: tag.into(),
        });
    }

    /// Set the entry with `label`, creating it at the end if missing.
    pub fn insert(&mut self, label: &str, tag: impl Into<Tag>) {
        let tag = tag.into();
        match self.entries.iter_mut().find(|e| e.label == label) {
            Some(entry) => entry.tag = tag,
            None => self.entries.push(TagEntry {
                label: label.to_string(),
                tag,
            }),
        }
    }

    /// Remove the first entry with `label`.
    pub fn remove(&mut self, label: &str) -> bool {
        match self.entries.iter().position(|e| e.label == label) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    fn child(&self, segment: &str) -> Option<&Tag> {
        match parse_segment(segment) {
            Segment::Index(i) => self.get_index(i),
            Segment::Label(l) => self.get(l),
        }
    }

    fn child_mut(&mut self, segment: &str) -> Option<&mut Tag> {
        match parse_segment(segment) {
            Segment::Index(i) => self.entries.get_mut(i).map(|e| &mut e.tag),
            Segment::Label(l) => self
                .entries
                .iter_mut()
                .find(|e| e.label == l)
                .map(|e| &mut e.tag),
        }
    }

    /// Look up a `:`-separated path.
    pub fn get_path(&self, path: &str) -> Option<&Tag> {
        let mut segments = path.split(':');
        let mut current = self.child(segments.next()?)?;
        for segment in segments {
            current = current.as_group()?.child(segment)?;
        }
        Some(current)
    }

    /// Set a `:`-separated path, creating intermediate labeled groups.
    ///
    /// Returns false when the path runs through a scalar or names a missing
    /// list index.
    pub fn set_path(&mut self, path: &str, tag: Tag) -> bool {
        match path.split_once(':') {
            None => match parse_segment(path) {
                Segment::Index(i) if i < self.entries.len() => {
                    self.entries[i].tag = tag;
                    true
                }
                Segment::Index(i) if i == self.entries.len() => {
                    self.push(tag);
                    true
                }
                Segment::Index(_) => false,
                Segment::Label(l) => {
                    self.insert(l, tag);
                    true
                }
            },
            Some((head, rest)) => {
                if self.child(head).is_none() {
                    if let Segment::Index(_) = parse_segment(head) {
                        return false;
                    }
                    self.insert(head, TagGroup::new_group());
                }
                match self.child_mut(head) {
                    Some(Tag::Group(g)) => g.set_path(rest, tag),
                    _ => false,
                }
            }
        }
    }

    /// Remove the entry at a `:`-separated path.
    pub fn remove_path(&mut self, path: &str) -> bool {
        match path.rsplit_once(':') {
            None => match parse_segment(path) {
                Segment::Index(i) if i < self.entries.len() => {
                    self.entries.remove(i);
                    true
                }
                Segment::Index(_) => false,
                Segment::Label(l) => self.remove(l),
            },
            Some((parent, last)) => match self.get_path_mut(parent) {
                Some(Tag::Group(g)) => g.remove_path(last),
                _ => false,
            },
        }
    }

    fn get_path_mut(&mut self, path: &str) -> Option<&mut Tag> {
        let mut segments = path.split(':');
        let mut current = self.child_mut(segments.next()?)?;
        for segment in segments {
            current = match current {
                Tag::Group(g) => g.child_mut(segment)?,
                Tag::Value(_) => return None,
            };
        }
        Some(current)
    }
}

/// Convert a value into a tag. `Null` becomes a zero number.
pub fn to_tag(value: &Value, keys: &KeyPolicy) -> Result<Tag> {
    Ok(match value {
        Value::Null => Tag::Value(TagValue::Double(0.0)),
        Value::Bool(b) => Tag::Value(TagValue::Boolean(*b)),
        Value::Int(i) => Tag::Value(TagValue::Long(*i)),
        Value::Real(r) => Tag::Value(TagValue::Float(*r)),
        Value::Text(s) => Tag::Value(TagValue::String(s.clone())),
        Value::List(_) | Value::Map(_) => Tag::Group(to_tag_group(value, keys)?),
    })
}

/// Convert a list or map into a store-native group.
pub fn to_tag_group(value: &Value, keys: &KeyPolicy) -> Result<TagGroup> {
    match value {
        Value::List(items) => {
            let mut group = TagGroup::new_list();
            for item in items {
                group.push(to_tag(item, keys)?);
            }
            Ok(group)
        }
        Value::Map(map) => {
            let mut group = TagGroup::new_group();
            let labels = keys.apply_all(map.keys().map(String::as_str))?;
            for (label, item) in labels.iter().zip(map.values()) {
                group.insert(label, to_tag(item, keys)?);
            }
            Ok(group)
        }
        other => Err(Error::UnsupportedValueKind(format!(
            "{} is not a group",
            other.kind()
        ))),
    }
}

/// Convert a tag back into a value.
pub fn from_tag(tag: &Tag) -> Value {
    match tag {
        Tag::Value(TagValue::Long(i)) => Value::Int(*i),
        Tag::Value(TagValue::Float(f) | TagValue::Double(f)) => Value::Real(*f),
        Tag::Value(TagValue::Boolean(b)) => Value::Bool(*b),
        Tag::Value(TagValue::String(s)) => Value::Text(s.clone()),
        Tag::Group(g) => from_tag_group(g),
    }
}

/// Convert a group back into a list or map.
pub fn from_tag_group(group: &TagGroup) -> Value {
    if group.is_list() {
        Value::List(group.entries().iter().map(|e| from_tag(&e.tag)).collect())
    } else {
        Value::Map(
            group
                .entries()
                .iter()
                .map(|e| (e.label.clone(), from_tag(&e.tag)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::try_from(serde_json::json!({
            "name": "probe",
            "sizes": [1, 2, [3, {"deep": true}]],
            "ratio": 0.5
        }))
        .unwrap()
    }

    #[test]
    fn test_group_round_trip() {
        let value = sample();
        let group = to_tag_group(&value, &KeyPolicy::Reject).unwrap();
        assert!(!group.is_list());
        assert_eq!(from_tag_group(&group), value);
    }

    #[test]
    fn test_null_becomes_zero() {
        let group = to_tag_group(&Value::List(vec![Value::Null]), &KeyPolicy::Reject).unwrap();
        assert_eq!(from_tag_group(&group), Value::List(vec![Value::Real(0.0)]));
    }

    #[test]
    fn test_scalar_is_not_a_group() {
        let err = to_tag_group(&Value::Int(1), &KeyPolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));
    }

    #[test]
    fn test_paths() {
        let mut root = TagGroup::new_group();
        assert!(root.set_path("ns:a:b", Tag::Value(TagValue::Long(3))));
        assert_eq!(
            root.get_path("ns:a:b"),
            Some(&Tag::Value(TagValue::Long(3)))
        );
        assert!(!root.set_path("ns:a:b:c", Tag::Value(TagValue::Long(1))));

        root.set_path("ns:list", Tag::Group(TagGroup::new_list()));
        assert!(root.set_path("ns:list:[0]", Tag::Value(TagValue::Boolean(true))));
        assert!(!root.set_path("ns:list:[5]", Tag::Value(TagValue::Boolean(true))));
        assert_eq!(
            root.get_path("ns:list:[0]").and_then(Tag::as_value),
            Some(&TagValue::Boolean(true))
        );

        assert!(root.remove_path("ns:a:b"));
        assert!(root.get_path("ns:a:b").is_none());
        assert!(root.remove_path("ns"));
        assert!(root.is_empty());
    }

    #[test]
    fn test_key_policy_applies() {
        let value: Value = [("a:b", 1)].into_iter().collect();
        assert!(to_tag_group(&value, &KeyPolicy::Reject).is_err());
        let group = to_tag_group(&value, &KeyPolicy::Substitute("_".into())).unwrap();
        assert!(group.get("a_b").is_some());

        let colliding: Value = [("a:b", 1), ("a_b", 2)].into_iter().collect();
        assert!(matches!(
            to_tag_group(&colliding, &KeyPolicy::Substitute("_".into())),
            Err(Error::KeyCollision { .. })
        ));
    }
}
