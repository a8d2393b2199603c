//! Read-back code: copies script variables into the session namespace.
//!
//! Scalars are copied to `<namespace>:<var>`. Containers are linearized,
//! either by calling the dynamic routine or, when the caller knows the
//! structure, by code generated per leaf that writes the same entries.

use super::NameAllocator;
use super::linearize::{
    ESCAPE_FN, LINEARIZE_FN, LINEARIZE_PATHS_FN, MANIFEST_PREFIX, TYPE_PREFIX, escape_label,
};
use crate::error::Result;
use crate::escape::{KeyPolicy, NonPrintableCodec, escape_identifier, escape_string_literal};
use crate::registry;
use crate::value::ValueKind;
use indexmap::IndexMap;

/// A statically known container layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    List(Vec<TypeExpr>),
    Map(Vec<(String, TypeExpr)>),
}

/// The type a caller expects back for a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Kind(ValueKind),
    /// Any alias the registry accepts, e.g. `"long"` or `"TagList"`.
    Name(String),
    Structure(Structure),
}

impl TypeExpr {
    pub fn list<T: Into<TypeExpr>>(items: impl IntoIterator<Item = T>) -> Self {
        TypeExpr::Structure(Structure::List(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<K: Into<String>, T: Into<TypeExpr>>(entries: impl IntoIterator<Item = (K, T)>) -> Self {
        TypeExpr::Structure(Structure::Map(
            entries
                .into_iter()
                .map(|(k, t)| (k.into(), t.into()))
                .collect(),
        ))
    }

    /// The caller-side kind this expression reads back as.
    pub fn kind(&self) -> Result<ValueKind> {
        match self {
            TypeExpr::Kind(kind) => Ok(*kind),
            TypeExpr::Name(name) => registry::to_native_type(name),
            TypeExpr::Structure(Structure::List(_)) => Ok(ValueKind::Sequence),
            TypeExpr::Structure(Structure::Map(_)) => Ok(ValueKind::Mapping),
        }
    }
}

impl From<ValueKind> for TypeExpr {
    fn from(kind: ValueKind) -> Self {
        TypeExpr::Kind(kind)
    }
}

impl From<&str> for TypeExpr {
    fn from(name: &str) -> Self {
        TypeExpr::Name(name.to_string())
    }
}

impl From<String> for TypeExpr {
    fn from(name: String) -> Self {
        TypeExpr::Name(name)
    }
}

impl From<Structure> for TypeExpr {
    fn from(structure: Structure) -> Self {
        TypeExpr::Structure(structure)
    }
}

fn container_type_name(kind: ValueKind) -> &'static str {
    if kind == ValueKind::Sequence {
        "TagList"
    } else {
        "TagGroup"
    }
}

/// Expression copying `ident` for storage; strings are tokenized.
fn stored_expr(kind: ValueKind, ident: &str) -> String {
    if kind == ValueKind::Text {
        format!("{ESCAPE_FN}({ident})")
    } else {
        ident.to_string()
    }
}

/// Emits the synchronization block for one assembly pass.
pub struct SyncWriter<'a> {
    namespace: &'a str,
    keys: &'a KeyPolicy,
    codec: &'a NonPrintableCodec,
    names: &'a mut NameAllocator,
    group: String,
    index: String,
}

impl<'a> SyncWriter<'a> {
    pub fn new(
        namespace: &'a str,
        keys: &'a KeyPolicy,
        codec: &'a NonPrintableCodec,
        names: &'a mut NameAllocator,
    ) -> Self {
        let group = names.fresh("sync");
        let index = format!("{group}_index");
        Self {
            namespace,
            keys,
            codec,
            names,
            group,
            index,
        }
    }

    pub fn write(&mut self, readvars: &IndexMap<String, TypeExpr>) -> Result<String> {
        let (group, index, ns) = (&self.group, &self.index, self.namespace);
        let mut lines = vec![
            "// Synchronizing results through the persistent store".to_string(),
            format!("TagGroup {group};"),
            format!("number {index};"),
            format!("if(!GetPersistentTagGroup().TagGroupGetTagAsTagGroup(\"{ns}\", {group})){{"),
            format!("    {group} = NewTagGroup();"),
            format!("    GetPersistentTagGroup().TagGroupSetTagAsTagGroup(\"{ns}\", {group});"),
            "}".to_string(),
        ];

        for (name, expr) in readvars {
            let var = escape_identifier(name)?;
            lines.push(String::new());
            lines.push(format!("// Synchronizing {var}"));
            if let TypeExpr::Structure(structure) = expr {
                self.structure(&var, structure, &mut lines)?;
                continue;
            }
            let kind = expr.kind()?;
            if kind.is_container() {
                lines.push(format!("{LINEARIZE_FN}({}, {var}, \"{var}\");", self.group));
            } else {
                let storage = registry::resolve(kind)?.storage_type;
                lines.push(format!(
                    "{} = {}.TagGroupCreateNewLabeledTag(\"{var}\");",
                    self.index, self.group
                ));
                lines.push(format!(
                    "{}.TagGroupSetIndexedTagAs{storage}({}, {});",
                    self.group,
                    self.index,
                    stored_expr(kind, &var)
                ));
            }
        }
        Ok(lines.join("\n"))
    }

    fn structure(&mut self, var: &str, structure: &Structure, lines: &mut Vec<String>) -> Result<()> {
        let paths = self.names.fresh(&format!("{var}_paths"));
        lines.push(format!("string {paths} = \"\";"));
        self.entries(var, &paths, structure, &[], var, lines)?;
        lines.push(format!(
            "{}.TagGroupSetTagAsString(\"{MANIFEST_PREFIX}{var}\", {paths});",
            self.group
        ));
        Ok(())
    }

    /// Code for every entry of `structure`, which lives at `source` inside
    /// the script variable and at `dest` in the namespace.
    fn entries(
        &mut self,
        var: &str,
        paths: &str,
        structure: &Structure,
        source: &[String],
        dest: &str,
        lines: &mut Vec<String>,
    ) -> Result<()> {
        let entries: Vec<(String, String, &TypeExpr)> = match structure {
            Structure::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, t)| (format!("[{i}]"), i.to_string(), t))
                .collect(),
            Structure::Map(items) => {
                let keys = self.keys.apply_all(items.iter().map(|(key, _)| key.as_str()))?;
                keys.into_iter()
                    .zip(items)
                    .map(|(key, (_, t))| {
                        let label = escape_label(&key, self.codec);
                        (key, label, t)
                    })
                    .collect()
            }
        };

        for (segment, label, expr) in entries {
            let mut src = source.to_vec();
            src.push(segment);
            let p = format!("{dest}/{label}");
            let dest_lit = escape_string_literal(&p);

            let type_name = match expr {
                TypeExpr::Structure(inner) => {
                    self.entries(var, paths, inner, &src, &p, lines)?;
                    container_type_name(expr.kind()?)
                }
                other => self.leaf(var, paths, other.kind()?, &src.join(":"), &dest_lit, lines)?,
            };

            lines.push(format!(
                "{} = {}.TagGroupCreateNewLabeledTag(\"{TYPE_PREFIX}{dest_lit}\");",
                self.index, self.group
            ));
            lines.push(format!(
                "{}.TagGroupSetIndexedTagAsString({}, \"{type_name}\");",
                self.group, self.index
            ));
            lines.push(format!("{paths} += \"{dest_lit};\";"));
        }
        Ok(())
    }

    /// Copy one leaf; returns the type tag to record for it.
    fn leaf(
        &mut self,
        var: &str,
        paths: &str,
        kind: ValueKind,
        source: &str,
        dest_lit: &str,
        lines: &mut Vec<String>,
    ) -> Result<&'static str> {
        let desc = registry::resolve(kind)?;
        let tmp = self.names.fresh(&format!("{var}_value"));
        let source = escape_string_literal(source);

        if kind.is_container() {
            // Layout unknown below this point; fall back to the dynamic routine.
            lines.push(format!("TagGroup {tmp};"));
            lines.push(format!("{var}.TagGroupGetTagAsTagGroup(\"{source}\", {tmp});"));
            lines.push(format!(
                "{paths} += {LINEARIZE_PATHS_FN}({}, {tmp}, \"{dest_lit}\");",
                self.group
            ));
            return Ok(container_type_name(kind));
        }

        lines.push(format!("{} {tmp};", desc.declaration));
        lines.push(format!(
            "{var}.TagGroupGetTagAs{}(\"{source}\", {tmp});",
            desc.storage_type
        ));
        lines.push(format!(
            "{} = {}.TagGroupCreateNewLabeledTag(\"{dest_lit}\");",
            self.index, self.group
        ));
        lines.push(format!(
            "{}.TagGroupSetIndexedTagAs{}({}, {});",
            self.group,
            desc.storage_type,
            self.index,
            stored_expr(kind, &tmp)
        ));
        Ok(desc.storage_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::output::linearize::linearize_into;
    use crate::store::MemoryStore;
    use crate::tags::to_tag_group;
    use crate::value::Value;
    use regex::Regex;

    fn write(readvars: &IndexMap<String, TypeExpr>) -> Result<String> {
        let keys = KeyPolicy::Reject;
        let codec = NonPrintableCodec::default();
        let mut names = NameAllocator::new();
        SyncWriter::new("ns-1", &keys, &codec, &mut names).write(readvars)
    }

    #[test]
    fn test_scalar_and_dynamic_readvars() {
        let readvars = IndexMap::from([
            ("a".to_string(), TypeExpr::from("int")),
            ("s".to_string(), TypeExpr::Kind(ValueKind::Text)),
            ("xs".to_string(), TypeExpr::Kind(ValueKind::Sequence)),
        ]);
        let code = write(&readvars).unwrap();
        let expected = [
            "// Synchronizing results through the persistent store",
            "TagGroup __exec_script_sync_0;",
            "number __exec_script_sync_0_index;",
            "if(!GetPersistentTagGroup().TagGroupGetTagAsTagGroup(\"ns-1\", __exec_script_sync_0)){",
            "    __exec_script_sync_0 = NewTagGroup();",
            "    GetPersistentTagGroup().TagGroupSetTagAsTagGroup(\"ns-1\", __exec_script_sync_0);",
            "}",
            "",
            "// Synchronizing a",
            "__exec_script_sync_0_index = __exec_script_sync_0.TagGroupCreateNewLabeledTag(\"a\");",
            "__exec_script_sync_0.TagGroupSetIndexedTagAsLong(__exec_script_sync_0_index, a);",
            "",
            "// Synchronizing s",
            "__exec_script_sync_0_index = __exec_script_sync_0.TagGroupCreateNewLabeledTag(\"s\");",
            "__exec_script_sync_0.TagGroupSetIndexedTagAsString(__exec_script_sync_0_index, __exec_script_escape_nonprintable(s));",
            "",
            "// Synchronizing xs",
            "__exec_script_linearize_tags(__exec_script_sync_0, xs, \"xs\");",
        ]
        .join("\n");
        assert_eq!(code, expected);
    }

    #[test]
    fn test_structure_writes_same_manifest_as_dynamic() {
        let expr = TypeExpr::map([
            ("a", TypeExpr::list([ValueKind::Integer, ValueKind::Text])),
            ("b/c", TypeExpr::from("bool")),
        ]);
        let code = write(&IndexMap::from([("x".to_string(), expr)])).unwrap();

        let append = Regex::new(r#"(?m)^__exec_script_x_paths_\d+ \+= "(.*)";$"#).unwrap();
        let static_manifest: String = append.captures_iter(&code).map(|c| c[1].to_string()).collect();

        let value = Value::try_from(serde_json::json!({"a": [1, "µ"], "b/c": true})).unwrap();
        let group = to_tag_group(&value, &KeyPolicy::Reject).unwrap();
        let dynamic_manifest = linearize_into(
            &mut MemoryStore::new(),
            "ns-1",
            "x",
            &group,
            &NonPrintableCodec::default(),
        );
        assert_eq!(static_manifest, dynamic_manifest);

        assert!(code.contains("x.TagGroupGetTagAsLong(\"a:[0]\", "));
        assert!(code.contains("x.TagGroupGetTagAsBoolean(\"b/c\", "));
        assert!(code.contains("\"{{type}}x/a\");"));
        assert!(code.contains("TagGroupSetTagAsString(\"{{available-paths}}x\", __exec_script_x_paths_"));
    }

    #[test]
    fn test_structure_with_dynamic_leaf() {
        let expr = TypeExpr::map([("rows", ValueKind::Sequence)]);
        let code = write(&IndexMap::from([("t".to_string(), expr)])).unwrap();
        assert!(code.contains("t.TagGroupGetTagAsTagGroup(\"rows\", "));
        assert!(code.contains("+= __exec_script_linearize_paths(__exec_script_sync_0, "));
        assert!(code.contains("\"TagList\");"));
    }

    #[test]
    fn test_unknown_type_name() {
        let readvars = IndexMap::from([("a".to_string(), TypeExpr::from("complex"))]);
        assert!(matches!(write(&readvars), Err(Error::UnknownType(_))));
    }

    #[test]
    fn test_structure_key_policy() {
        let expr = TypeExpr::map([("a:b", ValueKind::Integer)]);
        let readvars = IndexMap::from([("m".to_string(), expr)]);
        assert!(matches!(
            write(&readvars),
            Err(Error::InvalidKeyCharacter { .. })
        ));
    }

    #[test]
    fn test_structure_key_collision() {
        let expr = TypeExpr::map([("a:b", ValueKind::Integer), ("a_b", ValueKind::Integer)]);
        let readvars = IndexMap::from([("m".to_string(), expr)]);
        let keys = KeyPolicy::Substitute("_".into());
        let codec = NonPrintableCodec::default();
        let mut names = NameAllocator::new();
        assert!(matches!(
            SyncWriter::new("ns", &keys, &codec, &mut names).write(&readvars),
            Err(Error::KeyCollision { .. })
        ));
    }
}
