//! Assembling one executable script from fragments, values and read-back
//! requests, recording which lines came from where.
//!
//! Block order: header, setvars, every fragment (each preceded by a short
//! marker block), concurrent bodies with their wrappers, helper routines,
//! synchronization. Every line of the text belongs to exactly one
//! [`FragmentSpan`].

use crate::error::{Error, Result};
use crate::escape::{KeyPolicy, NonPrintableCodec, escape_string_literal};
use crate::output::{
    Declarer, DetachedTask, NameAllocator, SyncWriter, ThreadWriter, TypeExpr, helper_functions,
};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Variable assigned the label of the fragment currently running.
pub const CURRENT_SOURCE_VAR: &str = "__exec_script_current_source";

/// Where a fragment's text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptSource {
    Inline { code: String, label: String },
    /// Read at assembly time, every time.
    File(PathBuf),
}

impl ScriptSource {
    pub fn inline(code: impl Into<String>) -> Self {
        Self::labeled("script", code)
    }

    pub fn labeled(label: impl Into<String>, code: impl Into<String>) -> Self {
        ScriptSource::Inline {
            code: code.into(),
            label: label.into(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ScriptSource::File(path.into())
    }

    /// A file if `text` names an existing file, inline code otherwise.
    pub fn guess(text: &str) -> Self {
        let path = Path::new(text);
        if !text.contains('\n') && path.is_file() {
            Self::file(path)
        } else {
            Self::inline(text)
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            ScriptSource::Inline { .. } => "script",
            ScriptSource::File(_) => "file",
        }
    }

    /// The label of inline code or the path of a file.
    pub fn detail(&self) -> String {
        match self {
            ScriptSource::Inline { label, .. } => label.clone(),
            ScriptSource::File(path) => path.display().to_string(),
        }
    }

    pub fn read(&self) -> Result<String> {
        match self {
            ScriptSource::Inline { code, .. } => Ok(code.clone()),
            ScriptSource::File(path) => {
                std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
            }
        }
    }
}

impl From<&str> for ScriptSource {
    fn from(code: &str) -> Self {
        Self::inline(code)
    }
}

impl From<String> for ScriptSource {
    fn from(code: String) -> Self {
        Self::inline(code)
    }
}

impl From<PathBuf> for ScriptSource {
    fn from(path: PathBuf) -> Self {
        ScriptSource::File(path)
    }
}

impl From<&Path> for ScriptSource {
    fn from(path: &Path) -> Self {
        ScriptSource::File(path.to_path_buf())
    }
}

/// A 1-based, inclusive line range of the assembled text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentSpan {
    pub start_line: usize,
    pub end_line: usize,
    /// `header`, `setvars`, `marker`, `script`, `file`, `thread`, `helpers`
    /// or `sync`.
    pub origin: String,
    pub detail: String,
}

impl FragmentSpan {
    pub fn contains(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    /// Line number relative to this span.
    pub fn relative_line(&self, line: usize) -> usize {
        line + 1 - self.start_line
    }
}

/// Lines between these markers are commented out before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreMarkers {
    pub start: String,
    pub end: String,
}

impl Default for IgnoreMarkers {
    fn default() -> Self {
        Self {
            start: "// execscript: ignore start".to_string(),
            end: "// execscript: ignore end".to_string(),
        }
    }
}

/// Prefix every line from a start marker through its end marker with `// `.
///
/// Markers match case-insensitively on trimmed lines. An unterminated start
/// runs to the end of `code`. Line count is unchanged.
pub fn comment_out_ignored(code: &str, markers: &IgnoreMarkers) -> String {
    let start = markers.start.trim().to_lowercase();
    let end = markers.end.trim().to_lowercase();
    let mut inside = false;
    code.lines()
        .map(|line| {
            let trimmed = line.trim().to_lowercase();
            if !inside && trimmed == start {
                inside = true;
            } else if inside && trimmed == end {
                inside = false;
                return format!("// {line}");
            }
            if inside {
                format!("// {line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The assembled script and its bookkeeping.
#[derive(Debug, Clone)]
pub struct AssembledScript {
    pub text: String,
    pub spans: Vec<FragmentSpan>,
    pub tasks: Vec<DetachedTask>,
    /// Explicit read-back requests plus one per setvar not already listed.
    pub readvars: IndexMap<String, TypeExpr>,
}

impl AssembledScript {
    pub fn span_for_line(&self, line: usize) -> Option<&FragmentSpan> {
        self.spans.iter().find(|s| s.contains(line))
    }

    pub fn line_count(&self) -> usize {
        self.spans.last().map_or(0, |s| s.end_line)
    }
}

#[derive(Default)]
struct TextBuilder {
    blocks: Vec<String>,
    lines: usize,
    spans: Vec<FragmentSpan>,
}

impl TextBuilder {
    fn push(&mut self, origin: &str, detail: &str, block: &str) {
        if block.is_empty() {
            return;
        }
        let count = block.split('\n').count();
        self.spans.push(FragmentSpan {
            start_line: self.lines + 1,
            end_line: self.lines + count,
            origin: origin.to_string(),
            detail: detail.to_string(),
        });
        self.lines += count;
        self.blocks.push(block.to_string());
    }

    fn finish(self) -> (String, Vec<FragmentSpan>) {
        (self.blocks.join("\n"), self.spans)
    }
}

/// Builds [`AssembledScript`]s for one session namespace.
#[derive(Debug, Clone)]
pub struct ScriptAssembler {
    namespace: String,
    keys: KeyPolicy,
    codec: NonPrintableCodec,
    markers: IgnoreMarkers,
}

impl ScriptAssembler {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            keys: KeyPolicy::default(),
            codec: NonPrintableCodec::default(),
            markers: IgnoreMarkers::default(),
        }
    }

    pub fn key_policy(mut self, keys: KeyPolicy) -> Self {
        self.keys = keys;
        self
    }

    pub fn codec(mut self, codec: NonPrintableCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn ignore_markers(mut self, markers: IgnoreMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn assemble(
        &self,
        sources: &[ScriptSource],
        setvars: &IndexMap<String, Value>,
        readvars: &IndexMap<String, TypeExpr>,
        threads: &[ScriptSource],
    ) -> Result<AssembledScript> {
        let mut names = NameAllocator::new();
        let mut out = TextBuilder::default();

        out.push(
            "header",
            "",
            &format!(
                "// Assembled by execscript {}\n// Session namespace: {}",
                env!("CARGO_PKG_VERSION"),
                self.namespace
            ),
        );

        if !setvars.is_empty() {
            let mut block = vec!["// Setting variables from caller values".to_string()];
            for (name, value) in setvars {
                block.push(Declarer::new(&self.keys, &mut names).declare(name, value, true)?);
            }
            out.push("setvars", "", &block.join("\n"));
        }

        for (i, source) in sources.iter().enumerate() {
            let detail = source.detail();
            let marker = if i == 0 {
                format!(
                    "string {CURRENT_SOURCE_VAR} = \"{}\";",
                    escape_string_literal(&detail)
                )
            } else {
                format!("{CURRENT_SOURCE_VAR} = \"{}\";", escape_string_literal(&detail))
            };
            let comment = match source {
                ScriptSource::File(path) => format!("// File {}", path.display()),
                ScriptSource::Inline { .. } => "// Directly given script".to_string(),
            };
            out.push("marker", &detail, &format!("{marker}\n{comment}"));
            let code = comment_out_ignored(&source.read()?, &self.markers);
            out.push(source.origin(), &detail, &code);
        }

        let mut tasks = Vec::with_capacity(threads.len());
        for (i, body) in threads.iter().enumerate() {
            let wrapper = ThreadWriter::new(&self.namespace, &mut names).wrap(i);
            out.push("thread", &format!("thread {i} start"), &wrapper.start);
            let code = comment_out_ignored(&body.read()?, &self.markers);
            out.push("thread", &body.detail(), &code);
            out.push("thread", &format!("thread {i} end"), &wrapper.end);
            tasks.push(wrapper.task);
        }

        out.push("helpers", "", helper_functions());

        let mut readvars = readvars.clone();
        for (name, value) in setvars {
            if !readvars.contains_key(name) {
                readvars.insert(name.clone(), TypeExpr::Kind(value.kind()));
            }
        }
        if !readvars.is_empty() {
            let sync = SyncWriter::new(&self.namespace, &self.keys, &self.codec, &mut names)
                .write(&readvars)?;
            out.push("sync", "", &sync);
        }

        let (text, spans) = out.finish();
        tracing::debug!(
            namespace = %self.namespace,
            lines = spans.last().map_or(0, |s| s.end_line),
            spans = spans.len(),
            "assembled script"
        );
        Ok(AssembledScript {
            text,
            spans,
            tasks,
            readvars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn assemble(sources: &[ScriptSource], setvars: &IndexMap<String, Value>) -> AssembledScript {
        ScriptAssembler::new("ns")
            .assemble(sources, setvars, &IndexMap::new(), &[])
            .unwrap()
    }

    #[test]
    fn test_spans_tile_the_text() {
        let setvars = IndexMap::from([("a".to_string(), Value::Int(10))]);
        let script = assemble(
            &[
                ScriptSource::labeled("A", "number x = a;\nx += 1;"),
                ScriptSource::labeled("B", "x += 2;"),
            ],
            &setvars,
        );
        let total = script.text.split('\n').count();
        assert_eq!(script.line_count(), total);
        let mut next = 1;
        for span in &script.spans {
            assert_eq!(span.start_line, next, "{span:?}");
            assert!(span.end_line >= span.start_line);
            next = span.end_line + 1;
        }
        assert_eq!(next, total + 1);

        let a = script
            .spans
            .iter()
            .find(|s| s.origin == "script" && s.detail == "A")
            .unwrap();
        let lines: Vec<&str> = script.text.split('\n').collect();
        assert_eq!(lines[a.start_line - 1], "number x = a;");
        assert_eq!(lines[a.end_line - 1], "x += 1;");
    }

    #[test]
    fn test_block_order() {
        let setvars = IndexMap::from([("a".to_string(), Value::Int(10))]);
        let script = ScriptAssembler::new("ns")
            .assemble(
                &[ScriptSource::inline("a += 1;")],
                &setvars,
                &IndexMap::new(),
                &[ScriptSource::labeled("worker", "sleep(1);")],
            )
            .unwrap();
        let origins: Vec<&str> = script.spans.iter().map(|s| s.origin.as_str()).collect();
        assert_eq!(
            origins,
            [
                "header", "setvars", "marker", "script", "thread", "thread", "thread", "helpers",
                "sync"
            ]
        );
        assert_eq!(script.tasks.len(), 1);
        assert!(script.text.contains("number a = 10;"));
    }

    #[test]
    fn test_current_source_marker() {
        let script = assemble(
            &[
                ScriptSource::labeled("first", "1;"),
                ScriptSource::labeled("second", "2;"),
            ],
            &IndexMap::new(),
        );
        assert!(script.text.contains("string __exec_script_current_source = \"first\";\n// Directly given script"));
        assert!(script.text.contains("\n__exec_script_current_source = \"second\";"));
        assert_eq!(script.text.matches("string __exec_script_current_source").count(), 1);
    }

    #[test]
    fn test_setvars_are_read_back() {
        let setvars = IndexMap::from([
            ("a".to_string(), Value::Int(10)),
            ("b".to_string(), Value::from("x")),
        ]);
        let readvars = IndexMap::from([("b".to_string(), TypeExpr::from("int"))]);
        let script = ScriptAssembler::new("ns")
            .assemble(&[], &setvars, &readvars, &[])
            .unwrap();
        assert_eq!(script.readvars["a"], TypeExpr::Kind(ValueKind::Integer));
        assert_eq!(script.readvars["b"], TypeExpr::from("int"));
        assert!(script.text.contains("TagGroupCreateNewLabeledTag(\"a\");"));
    }

    #[test]
    fn test_no_readvars_no_sync() {
        let script = assemble(&[ScriptSource::inline("1;")], &IndexMap::new());
        assert!(script.spans.iter().all(|s| s.origin != "sync"));
        assert!(script.spans.iter().any(|s| s.origin == "helpers"));
    }

    #[test]
    fn test_ignore_markers() {
        let code = "a;\n  // EXECSCRIPT: Ignore Start\nimport x\n// execscript: ignore end\nb;";
        let out = comment_out_ignored(code, &IgnoreMarkers::default());
        assert_eq!(
            out,
            "a;\n//   // EXECSCRIPT: Ignore Start\n// import x\n// // execscript: ignore end\nb;"
        );
        assert_eq!(out.lines().count(), code.lines().count());
    }

    #[test]
    fn test_unterminated_ignore_runs_to_end() {
        let code = "a;\n// execscript: ignore start\nb;\nc;";
        let out = comment_out_ignored(code, &IgnoreMarkers::default());
        assert_eq!(out, "a;\n// // execscript: ignore start\n// b;\n// c;");
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frag.s");
        std::fs::write(&path, "number y = 1;\ny += 1;\n").unwrap();

        let script = assemble(&[ScriptSource::guess(path.to_str().unwrap())], &IndexMap::new());
        let span = script.spans.iter().find(|s| s.origin == "file").unwrap();
        assert_eq!(span.detail, path.display().to_string());
        assert_eq!(span.end_line - span.start_line, 1);
        assert!(script.text.contains(&format!("// File {}", path.display())));
    }

    #[test]
    fn test_missing_file() {
        let err = ScriptAssembler::new("ns")
            .assemble(
                &[ScriptSource::file("/no/such/fragment.s")],
                &IndexMap::new(),
                &IndexMap::new(),
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_guess_treats_code_as_inline() {
        assert!(matches!(
            ScriptSource::guess("number a = 1;"),
            ScriptSource::Inline { .. }
        ));
    }
}
