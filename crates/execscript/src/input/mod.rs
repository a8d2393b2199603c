//! Reading script results back out of the store.

pub mod reconstruct;

pub use reconstruct::{PathSegment, read_scalar, reconstruct, split_path};

use crate::escape::NonPrintableCodec;
use crate::traits::TagStore;
use crate::value::{Value, ValueKind};

/// Read variable `var` of `kind` from `namespace`.
///
/// Containers are reconstructed from their manifest, scalars read directly.
pub fn read_variable(
    store: &(impl TagStore + ?Sized),
    namespace: &str,
    var: &str,
    kind: ValueKind,
    codec: &NonPrintableCodec,
) -> Option<Value> {
    if kind.is_container() {
        reconstruct(store, namespace, var, kind, codec)
    } else {
        read_scalar(store, &format!("{namespace}:{var}"), kind, codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_read_variable_dispatches_on_kind() {
        let mut store = MemoryStore::new();
        store.set_as_long("ns:a", 10);
        store.set_as_string("ns:{{available-paths}}xs", "");
        let codec = NonPrintableCodec::default();
        assert_eq!(
            read_variable(&store, "ns", "a", ValueKind::Integer, &codec),
            Some(Value::Int(10))
        );
        assert_eq!(
            read_variable(&store, "ns", "a", ValueKind::Null, &codec),
            Some(Value::Real(10.0))
        );
        assert_eq!(
            read_variable(&store, "ns", "xs", ValueKind::Sequence, &codec),
            Some(Value::List(vec![]))
        );
        assert_eq!(read_variable(&store, "ns", "b", ValueKind::Integer, &codec), None);
    }
}
