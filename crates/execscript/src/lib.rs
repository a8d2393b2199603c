//! Run dm-script code from Rust with typed values going in and out.
//!
//! `execscript` prepends variable declarations to a script, executes it on a
//! [`ScriptHost`], and reads requested variables back out of the host's
//! persistent tag store.
//!
//! # Architecture
//!
//! ```text
//! Rust values        Script synthesis          Host            Read-back
//! ───────────     ──────────────────────     ────────     ───────────────────
//! setvars   ──┐   declare.rs  (setvars)
//! fragments ──┼─> assemble.rs ──────────────> execute ──> store ─> reconstruct.rs
//! readvars  ──┘   linearize.rs + sync.rs        │                  (input/)
//!                 thread.rs   (bodies)          └─> diagnostics.rs on failure
//! ```
//!
//! Containers cross the boundary as tag groups. Inside the host they are
//! flattened into per-leaf labels plus a manifest of paths; the Rust side
//! rebuilds the nested value from that manifest.
//!
//! # Example
//!
//! ```
//! use execscript::{MemoryHost, SessionBuilder, TagStore, Value, ValueKind};
//!
//! let mut host = MemoryHost::new(|script, store| {
//!     let ns = script
//!         .lines()
//!         .find_map(|l| l.strip_prefix("// Session namespace: "))
//!         .unwrap();
//!     store.set_as_long(&format!("{ns}:a"), 11);
//!     Ok(())
//! });
//! let mut session = SessionBuilder::new()
//!     .setvar("a", 10)
//!     .script("a += 1;")
//!     .readvar("a", ValueKind::Integer)
//!     .build(&mut host)
//!     .unwrap();
//! session.run().unwrap();
//! assert_eq!(session.get("a"), Some(&Value::Int(11)));
//! ```

pub mod assemble;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod escape;
pub mod exec;
pub mod input;
pub mod output;
pub mod registry;
pub mod session;
pub mod store;
pub mod tags;
pub mod traits;
pub mod value;

pub use assemble::{AssembledScript, FragmentSpan, IgnoreMarkers, ScriptAssembler, ScriptSource};
pub use config::ExecConfig;
pub use error::{Error, HostFailure, Result};
pub use escape::{
    KeyPolicy, NonPrintableCodec, escape_identifier, escape_non_printable, escape_string_literal,
    unescape_non_printable,
};
pub use exec::{DebugTarget, ExecState};
pub use output::{DetachedTask, Structure, TypeExpr};
pub use registry::{to_native_type, to_script_type};
pub use session::{Session, SessionBuilder, exec_script};
pub use store::{MemoryHost, MemoryStore, delete_global_tags, get_global_tag};
pub use tags::{Tag, TagGroup, TagValue, from_tag_group, to_tag_group};
pub use traits::{ScriptHost, TagStore};
pub use value::{Value, ValueKind};
