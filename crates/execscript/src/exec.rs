//! Running an assembled script: debug dump or execution, then read-back.

use crate::assemble::AssembledScript;
use crate::diagnostics::diagnose;
use crate::error::{Error, Result};
use crate::escape::{NonPrintableCodec, escape_identifier};
use crate::input::read_variable;
use crate::output::TypeExpr;
use crate::traits::{ScriptHost, TagStore};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File written by debug runs when no other target is given.
pub const DEFAULT_DEBUG_FILE: &str = "execscript-debug.s";

/// Where a debug run writes the assembled script.
#[derive(Default)]
pub enum DebugTarget {
    /// The configured debug file, or [`DEFAULT_DEBUG_FILE`] in the current
    /// directory.
    #[default]
    Default,
    File(PathBuf),
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for DebugTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugTarget::Default => f.write_str("Default"),
            DebugTarget::File(path) => f.debug_tuple("File").field(path).finish(),
            DebugTarget::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl From<PathBuf> for DebugTarget {
    fn from(path: PathBuf) -> Self {
        DebugTarget::File(path)
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    Assembled,
    Executed,
    DebugWritten,
    ResultsLoaded,
}

/// Write the script text verbatim. Returns the file written, if any.
pub fn write_debug(
    script: &AssembledScript,
    target: DebugTarget,
    default_file: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let path = match target {
        DebugTarget::Writer(mut writer) => {
            writer
                .write_all(script.text.as_bytes())
                .and_then(|()| writer.flush())
                .map_err(|e| Error::io("<debug writer>", e))?;
            tracing::info!(lines = script.line_count(), "wrote debug script to writer");
            return Ok(None);
        }
        DebugTarget::File(path) => path,
        DebugTarget::Default => default_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEBUG_FILE)),
    };
    std::fs::write(&path, &script.text).map_err(|e| Error::io(&path, e))?;
    tracing::info!(path = %path.display(), "wrote debug script");
    Ok(Some(path))
}

/// Execute on the host, mapping failures to their fragment.
pub fn execute(host: &mut (impl ScriptHost + ?Sized), script: &AssembledScript) -> Result<()> {
    tracing::info!(lines = script.line_count(), "executing script");
    host.execute(&script.text)
        .map_err(|failure| diagnose(failure, &script.spans))
}

/// Read every requested variable from `namespace`; unreadable ones are left
/// out.
pub fn read_back(
    store: &(impl TagStore + ?Sized),
    namespace: &str,
    readvars: &IndexMap<String, TypeExpr>,
    codec: &NonPrintableCodec,
) -> IndexMap<String, Value> {
    let mut values = IndexMap::with_capacity(readvars.len());
    for (name, expr) in readvars {
        let var = match escape_identifier(name) {
            Ok(var) => var,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "readvar dropped");
                continue;
            }
        };
        let kind = match expr.kind() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "readvar dropped");
                continue;
            }
        };
        match read_variable(store, namespace, &var, kind, codec) {
            Some(value) => {
                values.insert(name.clone(), value);
            }
            None => tracing::warn!(name = %name, %kind, "readvar not found in store"),
        }
    }
    tracing::debug!(namespace, read = values.len(), requested = readvars.len(), "read back");
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::ScriptAssembler;
    use crate::error::HostFailure;
    use crate::store::{MemoryHost, MemoryStore};
    use crate::value::ValueKind;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn script(code: &str) -> AssembledScript {
        ScriptAssembler::new("ns")
            .assemble(
                &[crate::assemble::ScriptSource::labeled("main", code)],
                &IndexMap::new(),
                &IndexMap::new(),
                &[],
            )
            .unwrap()
    }

    #[test]
    fn test_debug_to_writer() {
        let script = script("1;");
        let buf = SharedBuf::default();
        let written = write_debug(&script, DebugTarget::Writer(Box::new(buf.clone())), None).unwrap();
        assert_eq!(written, None);
        assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), script.text);
    }

    #[test]
    fn test_debug_to_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.s");
        let script = script("1;");
        let written = write_debug(&script, DebugTarget::Default, Some(path.as_path())).unwrap();
        assert_eq!(written.as_deref(), Some(path.as_path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), script.text);
    }

    #[test]
    fn test_execute_maps_failure() {
        let script = script("a;\nb;\nc;");
        let main = script.spans.iter().find(|s| s.origin == "script").unwrap().clone();
        let failing = main.start_line + 2;
        let mut host = MemoryHost::new(move |_, _| {
            Err(HostFailure::new(format!("Error in line {failing}\nunknown c")))
        });
        match execute(&mut host, &script).unwrap_err() {
            Error::ScriptExecution {
                detail,
                fragment_line,
                message,
                ..
            } => {
                assert_eq!(detail, "main");
                assert_eq!(fragment_line, 3);
                assert_eq!(message, "unknown c");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_read_back_skips_missing() {
        let mut store = MemoryStore::new();
        store.set_as_long("ns:a", 1);
        let readvars = IndexMap::from([
            ("a".to_string(), TypeExpr::Kind(ValueKind::Integer)),
            ("b".to_string(), TypeExpr::Kind(ValueKind::Integer)),
            ("c".to_string(), TypeExpr::from("nonsense")),
        ]);
        let values = read_back(&store, "ns", &readvars, &NonPrintableCodec::default());
        assert_eq!(values.len(), 1);
        assert_eq!(values["a"], Value::Int(1));
    }
}
