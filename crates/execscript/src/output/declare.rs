//! Declaration code for caller values.
//!
//! Scalars become one statement. Containers become a creation statement
//! followed by one insertion per element; nested containers are declared
//! first under a generated name and then inserted by that name.

use super::NameAllocator;
use crate::error::{Error, Result};
use crate::escape::{KeyPolicy, escape_identifier, escape_string_literal};
use crate::registry;
use crate::value::Value;

/// Script literal for a finite or non-finite real.
pub fn real_literal(r: f64) -> String {
    if r.is_nan() {
        "nan()".to_string()
    } else if r.is_infinite() {
        if r > 0.0 {
            "infinity()".to_string()
        } else {
            "-infinity()".to_string()
        }
    } else {
        format!("{r:?}")
    }
}

/// Script literal for a scalar value. Booleans are numbers, `Null` is `0`.
pub fn value_literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "0".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => real_literal(*r),
        Value::Text(s) => format!("\"{}\"", escape_string_literal(s)),
        Value::List(_) | Value::Map(_) => {
            return Err(Error::UnsupportedValueKind(format!(
                "{} has no literal form",
                value.kind()
            )));
        }
    })
}

/// Emits declaration code; shares a [`NameAllocator`] with the rest of an
/// assembly pass so generated names never collide.
pub struct Declarer<'a> {
    keys: &'a KeyPolicy,
    names: &'a mut NameAllocator,
}

impl<'a> Declarer<'a> {
    pub fn new(keys: &'a KeyPolicy, names: &'a mut NameAllocator) -> Self {
        Self { keys, names }
    }

    /// Code declaring `name` (or only assigning it, if `declare_type` is
    /// false) and populating it with `value`.
    pub fn declare(&mut self, name: &str, value: &Value, declare_type: bool) -> Result<String> {
        let ident = escape_identifier(name)?;
        let mut lines = Vec::new();
        match value {
            Value::List(_) | Value::Map(_) => {
                self.container(&ident, &ident, value, declare_type, 0, &mut lines)?;
            }
            scalar => {
                let literal = value_literal(scalar)?;
                if declare_type {
                    let keyword = registry::resolve(scalar.kind())?.declaration;
                    lines.push(format!("{keyword} {ident} = {literal};"));
                } else {
                    lines.push(format!("{ident} = {literal};"));
                }
            }
        }
        Ok(lines.join("\n"))
    }

    fn container(
        &mut self,
        ident: &str,
        base: &str,
        value: &Value,
        declare_type: bool,
        depth: usize,
        lines: &mut Vec<String>,
    ) -> Result<()> {
        let keyword = if declare_type { "TagGroup " } else { "" };
        match value {
            Value::List(items) => {
                lines.push(format!("{keyword}{ident} = NewTagList();"));
                for (i, item) in items.iter().enumerate() {
                    let (ty, literal) = self.element(base, i, depth, item, lines)?;
                    lines.push(format!(
                        "{ident}.TagGroupInsertTagAs{ty}(infinity(), {literal});"
                    ));
                }
            }
            Value::Map(map) => {
                lines.push(format!("{keyword}{ident} = NewTagGroup();"));
                let index = self.names.fresh(&format!("{base}_index"));
                lines.push(format!("number {index};"));
                let keys = self.keys.apply_all(map.keys().map(String::as_str))?;
                for (i, (key, item)) in keys.iter().zip(map.values()).enumerate() {
                    let (ty, literal) = self.element(base, i, depth, item, lines)?;
                    lines.push(format!(
                        "{index} = {ident}.TagGroupCreateNewLabeledTag(\"{}\");",
                        escape_string_literal(key)
                    ));
                    lines.push(format!(
                        "{ident}.TagGroupSetIndexedTagAs{ty}({index}, {literal});"
                    ));
                }
            }
            other => {
                return Err(Error::UnsupportedValueKind(format!(
                    "{} is not a container",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    /// Storage type and literal (or generated identifier) for one element.
    fn element(
        &mut self,
        base: &str,
        index: usize,
        depth: usize,
        item: &Value,
        lines: &mut Vec<String>,
    ) -> Result<(&'static str, String)> {
        match item {
            // Absent leaves are stored as a zero number.
            Value::Null => Ok(("Number", "0".to_string())),
            Value::List(_) | Value::Map(_) => {
                let child_base = format!("{base}_tg_{index}_{}", depth + 1);
                let child = self.names.fresh(&child_base);
                lines.push(String::new());
                self.container(&child, &child_base, item, true, depth + 1, lines)?;
                Ok(("TagGroup", child))
            }
            scalar => Ok((
                registry::resolve(scalar.kind())?.storage_type,
                value_literal(scalar)?,
            )),
        }
    }
}

/// Declaration code for one variable, rejecting forbidden mapping keys.
pub fn declare_variable(name: &str, value: &Value, declare_type: bool) -> Result<String> {
    let keys = KeyPolicy::Reject;
    let mut names = NameAllocator::new();
    Declarer::new(&keys, &mut names).declare(name, value, declare_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(
            declare_variable("a", &Value::Int(10), true).unwrap(),
            "number a = 10;"
        );
        assert_eq!(
            declare_variable("a b", &Value::Int(10), false).unwrap(),
            "a_b = 10;"
        );
        assert_eq!(
            declare_variable("flag", &Value::Bool(true), true).unwrap(),
            "number flag = 1;"
        );
        assert_eq!(
            declare_variable("r", &Value::Real(2.5), true).unwrap(),
            "number r = 2.5;"
        );
        assert_eq!(
            declare_variable("s", &Value::from("say \"hi\"\n"), true).unwrap(),
            r#"string s = "say \"hi\"\n";"#
        );
        assert_eq!(
            declare_variable("nothing", &Value::Null, true).unwrap(),
            "number nothing = 0;"
        );
    }

    #[test]
    fn test_real_literals() {
        assert_eq!(real_literal(1.0), "1.0");
        assert_eq!(real_literal(f64::INFINITY), "infinity()");
        assert_eq!(real_literal(f64::NEG_INFINITY), "-infinity()");
        assert_eq!(real_literal(f64::NAN), "nan()");
    }

    #[test]
    fn test_flat_list() {
        let code = declare_variable("xs", &Value::from(vec![1, 2]), true).unwrap();
        insta::assert_snapshot!(code, @r"
        TagGroup xs = NewTagList();
        xs.TagGroupInsertTagAsLong(infinity(), 1);
        xs.TagGroupInsertTagAsLong(infinity(), 2);
        ");
    }

    #[test]
    fn test_nested_map() {
        let value: Value = [
            ("a", Value::Int(1)),
            ("b", Value::List(vec![Value::Bool(true), Value::Null])),
            ("c", Value::from("x\"y")),
        ]
        .into_iter()
        .collect();
        let code = declare_variable("cfg", &value, true).unwrap();
        let expected = [
            "TagGroup cfg = NewTagGroup();",
            "number __exec_script_cfg_index_0;",
            "__exec_script_cfg_index_0 = cfg.TagGroupCreateNewLabeledTag(\"a\");",
            "cfg.TagGroupSetIndexedTagAsLong(__exec_script_cfg_index_0, 1);",
            "",
            "TagGroup __exec_script_cfg_tg_1_1_1 = NewTagList();",
            "__exec_script_cfg_tg_1_1_1.TagGroupInsertTagAsBoolean(infinity(), 1);",
            "__exec_script_cfg_tg_1_1_1.TagGroupInsertTagAsNumber(infinity(), 0);",
            "__exec_script_cfg_index_0 = cfg.TagGroupCreateNewLabeledTag(\"b\");",
            "cfg.TagGroupSetIndexedTagAsTagGroup(__exec_script_cfg_index_0, __exec_script_cfg_tg_1_1_1);",
            "__exec_script_cfg_index_0 = cfg.TagGroupCreateNewLabeledTag(\"c\");",
            "cfg.TagGroupSetIndexedTagAsString(__exec_script_cfg_index_0, \"x\\\"y\");",
        ]
        .join("\n");
        assert_eq!(code, expected);
    }

    #[test]
    fn test_sibling_containers_get_distinct_names() {
        let value = Value::List(vec![
            Value::List(vec![Value::Int(1)]),
            Value::List(vec![Value::Int(2)]),
        ]);
        let code = declare_variable("xs", &value, true).unwrap();
        assert!(code.contains("TagGroup __exec_script_xs_tg_0_1_0 = NewTagList();"));
        assert!(code.contains("TagGroup __exec_script_xs_tg_1_1_1 = NewTagList();"));
    }

    #[test]
    fn test_forbidden_key_rejected() {
        let value: Value = [("a:b", 1)].into_iter().collect();
        let err = declare_variable("m", &value, true).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyCharacter { .. }));
    }

    #[test]
    fn test_forbidden_key_substituted() {
        let value: Value = [("a:b", 1)].into_iter().collect();
        let keys = KeyPolicy::Substitute("_".into());
        let mut names = NameAllocator::new();
        let code = Declarer::new(&keys, &mut names)
            .declare("m", &value, true)
            .unwrap();
        assert!(code.contains("TagGroupCreateNewLabeledTag(\"a_b\")"));
    }

    #[test]
    fn test_substituted_keys_may_not_collide() {
        let value: Value = [("a:b", 1), ("a_b", 2)].into_iter().collect();
        let keys = KeyPolicy::Substitute("_".into());
        let mut names = NameAllocator::new();
        let err = Declarer::new(&keys, &mut names)
            .declare("m", &value, true)
            .unwrap_err();
        assert!(matches!(err, Error::KeyCollision { ref corrected, .. } if corrected == "a_b"));
    }

    #[test]
    fn test_empty_name() {
        assert!(matches!(
            declare_variable("", &Value::Int(1), true),
            Err(Error::InvalidIdentifier(_))
        ));
    }
}
