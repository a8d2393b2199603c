//! Type mapping between caller kinds, storage types and declaration keywords.
//!
//! Every accepted type expression resolves to exactly one [`TypeDescriptor`].
//! String aliases are matched case-insensitively. The two container kinds
//! share a storage type and a declaration keyword; whether a group is a list
//! or a labeled group is decided by the value, not by the type name.

use crate::error::{Error, Result};
use crate::value::ValueKind;

/// One row of the type table.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub kind: ValueKind,
    /// Lowercase aliases accepted by [`resolve`].
    pub aliases: &'static [&'static str],
    /// Name used by the store's typed accessors (`TagGroupSetTagAs<name>`).
    pub storage_type: &'static str,
    /// Keyword used to declare a variable of this type in a script.
    pub declaration: &'static str,
}

static TYPES: &[TypeDescriptor] = &[
    TypeDescriptor {
        kind: ValueKind::Integer,
        aliases: &["long", "integer", "int", "short", "uint16", "uint32"],
        storage_type: "Long",
        declaration: "number",
    },
    TypeDescriptor {
        kind: ValueKind::Real,
        aliases: &["float", "double", "decimal", "realnumber", "number", "real"],
        storage_type: "Float",
        declaration: "number",
    },
    TypeDescriptor {
        kind: ValueKind::Boolean,
        aliases: &["bool", "boolean"],
        storage_type: "Boolean",
        declaration: "number",
    },
    TypeDescriptor {
        kind: ValueKind::Text,
        aliases: &["string", "text", "str"],
        storage_type: "String",
        declaration: "string",
    },
    TypeDescriptor {
        kind: ValueKind::Mapping,
        aliases: &["taggroup", "dict", "map", "mapping"],
        storage_type: "TagGroup",
        declaration: "TagGroup",
    },
    TypeDescriptor {
        kind: ValueKind::Sequence,
        aliases: &["taglist", "list", "tuple", "sequence", "array"],
        storage_type: "TagGroup",
        declaration: "TagGroup",
    },
];

/// Something that names a type: a caller kind or a free-form alias.
#[derive(Debug, Clone, Copy)]
pub enum TypeName<'a> {
    Kind(ValueKind),
    Alias(&'a str),
}

impl From<ValueKind> for TypeName<'_> {
    fn from(kind: ValueKind) -> Self {
        TypeName::Kind(kind)
    }
}

impl<'a> From<&'a str> for TypeName<'a> {
    fn from(alias: &'a str) -> Self {
        TypeName::Alias(alias)
    }
}

impl<'a> From<&'a String> for TypeName<'a> {
    fn from(alias: &'a String) -> Self {
        TypeName::Alias(alias)
    }
}

/// Resolve a type expression to its descriptor.
///
/// `ValueKind::Null` resolves to the real-number row: absent values are
/// declared as a zero-valued number.
pub fn resolve<'a>(name: impl Into<TypeName<'a>>) -> Result<&'static TypeDescriptor> {
    match name.into() {
        TypeName::Kind(kind) => {
            let kind = if kind == ValueKind::Null {
                ValueKind::Real
            } else {
                kind
            };
            TYPES
                .iter()
                .find(|t| t.kind == kind)
                .ok_or_else(|| Error::UnknownType(kind.to_string()))
        }
        TypeName::Alias(alias) => {
            let lower = alias.trim().to_ascii_lowercase();
            TYPES
                .iter()
                .find(|t| t.aliases.contains(&lower.as_str()))
                .ok_or_else(|| Error::UnknownType(alias.to_string()))
        }
    }
}

pub fn declaration_keyword(desc: &TypeDescriptor) -> &'static str {
    desc.declaration
}

pub fn storage_type_name(desc: &TypeDescriptor) -> &'static str {
    desc.storage_type
}

/// Script-side name for a type: the declaration keyword, or the storage
/// type name when `for_storage` is set.
pub fn to_script_type<'a>(name: impl Into<TypeName<'a>>, for_storage: bool) -> Result<&'static str> {
    let desc = resolve(name)?;
    Ok(if for_storage {
        desc.storage_type
    } else {
        desc.declaration
    })
}

/// Caller-side kind for a type expression.
pub fn to_native_type<'a>(name: impl Into<TypeName<'a>>) -> Result<ValueKind> {
    resolve(name).map(|d| d.kind)
}

/// All registered descriptors.
pub fn descriptors() -> &'static [TypeDescriptor] {
    TYPES
}
