//! Wrappers running extra script bodies on host threads.

use super::NameAllocator;
use serde::{Deserialize, Serialize};

/// Label prefix of a task's completion flag.
pub const TASK_DONE_PREFIX: &str = "{{task-done}}";

/// Label prefix of a task's cancellation flag.
pub const TASK_CANCEL_PREFIX: &str = "{{task-cancel}}";

/// Handle to a body started on a host thread.
///
/// The body keeps running after the primary script returns. Its state is
/// only visible through two flags in the session namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedTask {
    index: usize,
    done_path: String,
    cancel_path: String,
}

impl DetachedTask {
    pub fn new(namespace: &str, index: usize) -> Self {
        Self {
            index,
            done_path: format!("{namespace}:{TASK_DONE_PREFIX}{index}"),
            cancel_path: format!("{namespace}:{TASK_CANCEL_PREFIX}{index}"),
        }
    }

    /// Position among the session's concurrent bodies.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Store path set to true when the body has finished.
    pub fn done_path(&self) -> &str {
        &self.done_path
    }

    /// Store path the body polls through `self.cancelled()`.
    pub fn cancel_path(&self) -> &str {
        &self.cancel_path
    }
}

/// Opening and closing code around one concurrent body.
#[derive(Debug, Clone)]
pub struct ThreadWrapper {
    pub start: String,
    pub end: String,
    pub task: DetachedTask,
}

pub struct ThreadWriter<'a> {
    namespace: &'a str,
    names: &'a mut NameAllocator,
}

impl<'a> ThreadWriter<'a> {
    pub fn new(namespace: &'a str, names: &'a mut NameAllocator) -> Self {
        Self { namespace, names }
    }

    /// Wrapper for the body at `index`.
    ///
    /// The body becomes the `RunThread` method of a `Thread` subclass, so it
    /// can use `cancel_signal`, `done_signal` and `self.cancelled()`. The
    /// namespace group is created before the thread starts so the completion
    /// flag has somewhere to go. Once the session is released the namespace
    /// is gone: `cancelled()` reports true and the flag is no longer written.
    pub fn wrap(&mut self, index: usize) -> ThreadWrapper {
        let class = self.names.fresh(&format!("thread_{index}"));
        let task = DetachedTask::new(self.namespace, index);
        let ns = self.namespace;

        let start = [
            format!("// Concurrent body {index}"),
            format!("if(!GetPersistentTagGroup().TagGroupDoesTagExist(\"{ns}\")){{"),
            format!("    GetPersistentTagGroup().TagGroupSetTagAsTagGroup(\"{ns}\", NewTagGroup());"),
            "}".to_string(),
            format!("object {class}_cancel = NewCancelSignal();"),
            format!("object {class}_done = NewSignal(0);"),
            format!("class {class} : Thread{{"),
            "    object cancel_signal;".to_string(),
            "    object done_signal;".to_string(),
            String::new(),
            "    object init(object self, object cancel, object done){".to_string(),
            "        cancel_signal = cancel;".to_string(),
            "        done_signal = done;".to_string(),
            "        return self;".to_string(),
            "    }".to_string(),
            String::new(),
            "    number cancelled(object self){".to_string(),
            format!("        if(!GetPersistentTagGroup().TagGroupDoesTagExist(\"{ns}\")){{"),
            "            return 1;".to_string(),
            "        }".to_string(),
            "        number flag = 0;".to_string(),
            format!(
                "        GetPersistentTagGroup().TagGroupGetTagAsBoolean(\"{}\", flag);",
                task.cancel_path
            ),
            "        return flag;".to_string(),
            "    }".to_string(),
            String::new(),
            "    void RunThread(object self){".to_string(),
        ]
        .join("\n");

        let end = [
            format!("        if(GetPersistentTagGroup().TagGroupDoesTagExist(\"{ns}\")){{"),
            format!(
                "            GetPersistentTagGroup().TagGroupSetTagAsBoolean(\"{}\", 1);",
                task.done_path
            ),
            "        }".to_string(),
            "        done_signal.SetSignal();".to_string(),
            "    }".to_string(),
            "}".to_string(),
            format!("alloc({class}).init({class}_cancel, {class}_done).StartThread();"),
        ]
        .join("\n");

        ThreadWrapper { start, end, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_paths() {
        let task = DetachedTask::new("ns", 2);
        assert_eq!(task.index(), 2);
        assert_eq!(task.done_path(), "ns:{{task-done}}2");
        assert_eq!(task.cancel_path(), "ns:{{task-cancel}}2");
    }

    #[test]
    fn test_wrapper_encloses_body() {
        let mut names = NameAllocator::new();
        let wrapper = ThreadWriter::new("ns", &mut names).wrap(0);
        assert!(wrapper.start.contains("class __exec_script_thread_0_0 : Thread{"));
        assert!(wrapper.start.ends_with("void RunThread(object self){"));
        assert!(wrapper.start.contains("TagGroupGetTagAsBoolean(\"ns:{{task-cancel}}0\", flag);"));
        assert!(wrapper.start.contains("if(!GetPersistentTagGroup().TagGroupDoesTagExist(\"ns\")){\n            return 1;"));
        assert!(wrapper.end.contains("TagGroupSetTagAsBoolean(\"ns:{{task-done}}0\", 1);"));
        assert!(
            wrapper
                .end
                .ends_with("alloc(__exec_script_thread_0_0).init(__exec_script_thread_0_0_cancel, __exec_script_thread_0_0_done).StartThread();")
        );
    }

    #[test]
    fn test_two_bodies_get_distinct_classes() {
        let mut names = NameAllocator::new();
        let mut writer = ThreadWriter::new("ns", &mut names);
        let a = writer.wrap(0);
        let b = writer.wrap(1);
        assert!(b.start.contains("class __exec_script_thread_1_1 : Thread{"));
        assert_ne!(a.task, b.task);
    }
}
