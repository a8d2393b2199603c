//! One run against a host: inject, execute, read back, clean up.

use crate::assemble::{AssembledScript, FragmentSpan, ScriptAssembler, ScriptSource};
use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::escape::{KeyPolicy, NonPrintableCodec};
use crate::exec::{self, DebugTarget, ExecState};
use crate::output::{DetachedTask, TypeExpr};
use crate::store::delete_global_tags;
use crate::traits::ScriptHost;
use crate::value::Value;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Prefix of every session namespace label.
pub const NAMESPACE_PREFIX: &str = "execscript-";

/// A fresh namespace label, unique across live sessions.
pub fn new_namespace() -> String {
    format!("{NAMESPACE_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

/// Start describing a session; the host is supplied to
/// [`SessionBuilder::build`].
pub fn builder() -> SessionBuilder {
    SessionBuilder::new()
}

/// Collects everything a [`Session`] needs before it is bound to a host.
#[derive(Debug, Default)]
pub struct SessionBuilder {
    sources: Vec<ScriptSource>,
    setvars: IndexMap<String, Value>,
    readvars: IndexMap<String, TypeExpr>,
    threads: Vec<ScriptSource>,
    debug: Option<DebugTarget>,
    config: ExecConfig,
    keys: Option<KeyPolicy>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; strings are inline code, paths are files.
    pub fn script(mut self, source: impl Into<ScriptSource>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn scripts<S: Into<ScriptSource>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Declare `name` with `value` before the first fragment.
    pub fn setvar(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.setvars.insert(name.into(), value.into());
        self
    }

    /// Read `name` back after execution.
    pub fn readvar(mut self, name: impl Into<String>, ty: impl Into<TypeExpr>) -> Self {
        self.readvars.insert(name.into(), ty.into());
        self
    }

    /// Start `body` on a host thread after the fragments.
    pub fn thread(mut self, body: impl Into<ScriptSource>) -> Self {
        self.threads.push(body.into());
        self
    }

    /// Write the script to the default debug file instead of executing it.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled.then(DebugTarget::default);
        self
    }

    /// Write the script to `target` instead of executing it.
    pub fn debug_target(mut self, target: DebugTarget) -> Self {
        self.debug = Some(target);
        self
    }

    pub fn config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    /// Key policy to use instead of the configured one.
    pub fn key_policy(mut self, keys: KeyPolicy) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn build<H: ScriptHost + ?Sized>(self, host: &mut H) -> Result<Session<'_, H>> {
        let codec = self.config.codec()?;
        let keys = match self.keys {
            Some(keys) => keys,
            None => self.config.key_policy()?,
        };
        let namespace = new_namespace();
        let assembler = ScriptAssembler::new(namespace.clone())
            .key_policy(keys)
            .codec(codec)
            .ignore_markers(self.config.ignore_markers());
        Ok(Session {
            host,
            namespace,
            assembler,
            codec,
            sources: self.sources,
            setvars: self.setvars,
            readvars: self.readvars,
            threads: self.threads,
            debug: self.debug,
            debug_file: self.config.debug.file,
            written: None,
            state: ExecState::Idle,
            ran: false,
            released: false,
            script: None,
            synchronized: IndexMap::new(),
        })
    }
}

/// One script run against a host, owning the namespace it writes to.
///
/// The namespace is deleted by [`release`](Session::release), which also
/// runs on drop.
pub struct Session<'h, H: ScriptHost + ?Sized> {
    host: &'h mut H,
    namespace: String,
    assembler: ScriptAssembler,
    codec: NonPrintableCodec,
    sources: Vec<ScriptSource>,
    setvars: IndexMap<String, Value>,
    readvars: IndexMap<String, TypeExpr>,
    threads: Vec<ScriptSource>,
    debug: Option<DebugTarget>,
    debug_file: Option<PathBuf>,
    written: Option<PathBuf>,
    state: ExecState,
    ran: bool,
    released: bool,
    script: Option<AssembledScript>,
    synchronized: IndexMap<String, Value>,
}

impl<'h, H: ScriptHost + ?Sized> Session<'h, H> {
    /// Assemble, then execute (or write the debug file), then read back.
    ///
    /// A failed execution releases the namespace before returning.
    pub fn run(&mut self) -> Result<()> {
        if self.ran {
            return Err(Error::AlreadyRun);
        }
        self.ran = true;

        let script = self.assembler.assemble(
            &self.sources,
            &self.setvars,
            &self.readvars,
            &self.threads,
        )?;
        self.state = ExecState::Assembled;
        let script = self.script.insert(script);

        if let Some(target) = self.debug.take() {
            self.written = exec::write_debug(script, target, self.debug_file.as_deref())?;
            self.state = ExecState::DebugWritten;
            return Ok(());
        }

        if let Err(e) = exec::execute(&mut *self.host, script) {
            self.release();
            return Err(e);
        }
        self.state = ExecState::Executed;

        self.synchronized = exec::read_back(&*self.host, &self.namespace, &script.readvars, &self.codec);
        self.state = ExecState::ResultsLoaded;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.synchronized.get(name)
    }

    /// Like [`get`](Self::get), failing with [`Error::MissingResult`].
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| Error::MissingResult(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.synchronized.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.synchronized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synchronized.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.synchronized.iter()
    }

    pub fn synchronized(&self) -> &IndexMap<String, Value> {
        &self.synchronized
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// The assembled text, once `run` got that far.
    pub fn script(&self) -> Option<&str> {
        self.script.as_ref().map(|s| s.text.as_str())
    }

    pub fn spans(&self) -> &[FragmentSpan] {
        self.script.as_ref().map_or(&[], |s| s.spans.as_slice())
    }

    pub fn tasks(&self) -> &[DetachedTask] {
        self.script.as_ref().map_or(&[], |s| s.tasks.as_slice())
    }

    /// File the debug run wrote, if it wrote to a file.
    pub fn debug_file(&self) -> Option<&Path> {
        self.written.as_deref()
    }

    pub fn host(&self) -> &H {
        self.host
    }

    pub fn task_done(&self, task: &DetachedTask) -> bool {
        self.host.get_as_boolean(task.done_path()).unwrap_or(false)
    }

    /// Ask the body to stop; it sees this through `self.cancelled()`.
    pub fn cancel_task(&mut self, task: &DetachedTask) {
        if self.host.exists(&self.namespace) {
            self.host.set_as_boolean(task.cancel_path(), true);
        }
    }

    /// Poll until `task` is done or `timeout` passes. Returns whether it
    /// finished.
    pub fn wait_task(&self, task: &DetachedTask, timeout: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.task_done(task) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(poll);
        }
    }

    /// Cancel unfinished tasks and delete the namespace. Safe to repeat.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if matches!(self.state, ExecState::Idle | ExecState::DebugWritten) {
            return;
        }

        let tasks: Vec<DetachedTask> = self.tasks().to_vec();
        for task in &tasks {
            if !self.task_done(task) {
                tracing::debug!(task = task.index(), "cancelling unfinished task");
                self.cancel_task(task);
            }
        }
        if !delete_global_tags(&mut *self.host, &self.namespace) {
            tracing::debug!(namespace = %self.namespace, "namespace was never created");
        }
    }
}

impl<H: ScriptHost + ?Sized> Drop for Session<'_, H> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build and run a session in one call.
///
/// Failures release the namespace before returning.
pub fn exec_script<'h, H, S, R, V>(
    host: &'h mut H,
    sources: impl IntoIterator<Item = S>,
    readvars: impl IntoIterator<Item = (R, TypeExpr)>,
    setvars: impl IntoIterator<Item = (V, Value)>,
) -> Result<Session<'h, H>>
where
    H: ScriptHost + ?Sized,
    S: Into<ScriptSource>,
    R: Into<String>,
    V: Into<String>,
{
    let mut builder = SessionBuilder::new().scripts(sources);
    for (name, ty) in readvars {
        builder = builder.readvar(name, ty);
    }
    for (name, value) in setvars {
        builder = builder.setvar(name, value);
    }
    let mut session = builder.build(host)?;
    session.run()?;
    Ok(session)
}
