//! On-disk compilation cache for the Kiln bitcode compiler.
//!
//! A cached program is a *pair* of sibling files in the cache directory:
//! `<name>.o` holding the raw compiled-program image and `<name>.info`
//! holding the structured metadata (header, string pool, dependency
//! fingerprints, export tables, object slots, relocations) needed to trust
//! and re-bind that image in a later process.
//!
//! Reads and writes are coordinated across processes with advisory file
//! locks on both files. Every read runs a staged validation pipeline before
//! any cached data is used; a corrupt, stale, or foreign-architecture cache
//! is rejected and the caller falls back to a fresh compile. No cache
//! failure is ever fatal to the build that hits it.

#![warn(missing_docs)]

pub mod dependency;
pub mod error;
pub mod format;
pub mod lock;
pub mod program;
pub mod reader;
pub mod relocate;
pub mod script;
pub mod writer;

pub use dependency::{DependencySet, RuntimeFingerprints, SourceDependency};
pub use error::{CacheError, InvalidReason, ScriptError};
pub use program::{FunctionInfo, ImageRelocation, ProgramArtifact, ProgramImage};
pub use reader::CacheReader;
pub use relocate::{RelocationEngine, SymbolResolver};
pub use script::{CompileOptions, Compiler, Script};
pub use writer::CacheWriter;
