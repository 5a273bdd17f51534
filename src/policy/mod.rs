//! Per-module authorization policies.
//!
//! A module declares in its `module.xml` which files it may install, which
//! scripts, commands and services it may drive, and which objects it may
//! read. [`PolicyStore`] loads and caches those documents; [`PolicyEngine`]
//! answers individual authorization questions against them.

mod document;
mod engine;
mod glob;
mod store;

pub use document::{parse_perms, FileAttributes, FileRule, ModulePolicy, ScriptPolicy};
pub use engine::{compose_destination_path, PolicyDenial, PolicyEngine};
pub use glob::PathGlob;
pub use store::PolicyStore;
