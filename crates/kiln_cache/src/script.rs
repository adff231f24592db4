//! The cache-or-compile orchestrator.
//!
//! A [`Script`] owns exactly one backing representation at a time: nothing
//! yet, a freshly compiled program, or a validated cache load. The export
//! query surface is uniform over the latter two; callers cannot tell which
//! path produced the program. Every cache failure, from a contended lock to
//! a corrupt info file, is recovered by falling back to fresh compilation.
//! The only hard failures a caller sees are API misuse and the compile
//! itself failing.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use kiln_common::Fingerprint;

use crate::dependency::{DependencySet, RuntimeFingerprints, SourceDependency};
use crate::error::{CacheError, InvalidReason, ScriptError};
use crate::lock::FileLock;
use crate::program::{FunctionInfo, ProgramArtifact, ProgramImage};
use crate::reader::CacheReader;
use crate::relocate::{self, NoSymbols, SymbolResolver};
use crate::writer::CacheWriter;

/// Environment variable that force-disables caching when set to any value.
/// Checked before any lock is taken.
pub const NOCACHE_ENV: &str = "KILN_NOCACHE";

/// Knobs forwarded to the external compiler collaborator.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Backend optimization level.
    pub optimization_level: u8,
    /// Emit full-precision floating point code.
    pub full_precision: bool,
}

/// The external bitcode-to-native compiler collaborator.
///
/// Opaque to the cache subsystem: it receives the options and the symbol
/// resolver and yields an in-memory artifact or an error message.
pub trait Compiler {
    /// Compiles the current program, resolving external references through
    /// `resolver`.
    fn compile(
        &self,
        options: &CompileOptions,
        resolver: &dyn SymbolResolver,
    ) -> Result<ProgramArtifact, String>;
}

impl<F> Compiler for F
where
    F: Fn(&CompileOptions, &dyn SymbolResolver) -> Result<ProgramArtifact, String>,
{
    fn compile(
        &self,
        options: &CompileOptions,
        resolver: &dyn SymbolResolver,
    ) -> Result<ProgramArtifact, String> {
        self(options, resolver)
    }
}

enum ScriptState {
    Unknown,
    Compiled(ProgramImage),
    Cached(ProgramImage),
}

/// The top-level entity: one program, one backing representation.
pub struct Script {
    state: ScriptState,
    runtime: RuntimeFingerprints,
    sources: Vec<SourceDependency>,
    resolver: Box<dyn SymbolResolver>,
    context_unavailable: bool,
}

impl Script {
    /// Creates a script in the `Unknown` state.
    ///
    /// The two runtime-library fingerprints are always part of the expected
    /// dependency set; source modules are added with
    /// [`Script::add_dependency`].
    pub fn new(runtime: RuntimeFingerprints) -> Self {
        Self {
            state: ScriptState::Unknown,
            runtime,
            sources: Vec::new(),
            resolver: Box::new(NoSymbols),
            context_unavailable: false,
        }
    }

    /// Wires in the symbol resolver used for relocation and the runtime
    /// capability queries.
    ///
    /// Permitted only while still `Unknown`: both the compile and the
    /// cache-load path need the resolver before they start.
    pub fn register_resolver(
        &mut self,
        resolver: impl SymbolResolver + 'static,
    ) -> Result<(), ScriptError> {
        if !matches!(self.state, ScriptState::Unknown) {
            return Err(ScriptError::InvalidOperation("register_resolver"));
        }
        self.resolver = Box::new(resolver);
        Ok(())
    }

    /// Registers a source-module fingerprint for cache matching.
    /// Re-registering a module replaces its earlier fingerprint.
    pub fn add_dependency(&mut self, name: impl Into<String>, fingerprint: Fingerprint) {
        let name = name.into();
        if let Some(dep) = self.sources.iter_mut().find(|d| d.name == name) {
            dep.fingerprint = fingerprint;
        } else {
            self.sources.push(SourceDependency { name, fingerprint });
        }
    }

    /// The registered source-module dependencies, in registration order.
    pub fn dependencies(&self) -> &[SourceDependency] {
        &self.sources
    }

    /// Discards the backing representation and all recorded source-module
    /// dependencies, returning to `Unknown`.
    pub fn reset(&mut self) {
        self.state = ScriptState::Unknown;
        self.sources.clear();
        self.context_unavailable = false;
    }

    /// Whether the last failed cache load was rejected specifically because
    /// the runtime-context slot could not be supplied in this process.
    pub fn context_unavailable(&self) -> bool {
        self.context_unavailable
    }

    /// Whether the current program came from the cache.
    pub fn is_cached(&self) -> bool {
        matches!(self.state, ScriptState::Cached(_))
    }

    /// Whether the current program came from a fresh compile.
    pub fn is_compiled(&self) -> bool {
        matches!(self.state, ScriptState::Compiled(_))
    }

    /// Attempts to load a validated program from the cache pair
    /// `<dir>/<name>.o` + `<dir>/<name>.info`.
    ///
    /// Holds a shared lock on both files for the whole read. Returns `false`
    /// on any failure, leaving the script `Unknown`; the specific
    /// context-slot reason is kept queryable via
    /// [`Script::context_unavailable`].
    pub fn try_load_from_cache(&mut self, dir: &Path, name: &str) -> bool {
        self.context_unavailable = false;
        if !matches!(self.state, ScriptState::Unknown) {
            warn!("cache load requested but a program is already loaded");
            return false;
        }
        if !caching_enabled() {
            debug!("caching disabled by {NOCACHE_ENV}");
            return false;
        }

        let (obj_path, info_path) = cache_pair(dir, name);
        let _info_lock = match FileLock::shared(&info_path) {
            Ok(lock) => lock,
            Err(e) => {
                debug!("no usable cache at {}: {e}", info_path.display());
                return false;
            }
        };
        let _obj_lock = match FileLock::shared(&obj_path) {
            Ok(lock) => lock,
            Err(e) => {
                debug!("no usable cache at {}: {e}", obj_path.display());
                return false;
            }
        };

        let expected = self.expected_deps();
        let reader = CacheReader::new(&expected, &*self.resolver);
        match reader.read(&obj_path, &info_path) {
            Ok(program) => {
                debug!("cache hit for {name}");
                self.state = ScriptState::Cached(program);
                self.forward_threadability();
                true
            }
            Err(e) => {
                self.context_unavailable =
                    matches!(e, CacheError::Invalid(InvalidReason::ContextUnavailable));
                warn!("cache for {name} rejected: {e}");
                false
            }
        }
    }

    /// Compiles fresh through the external compiler.
    ///
    /// Only valid from `Unknown`; success transitions to `Compiled`.
    pub fn compile(
        &mut self,
        compiler: &dyn Compiler,
        options: &CompileOptions,
    ) -> Result<(), ScriptError> {
        if !matches!(self.state, ScriptState::Unknown) {
            return Err(ScriptError::InvalidOperation("compile"));
        }
        let artifact = compiler
            .compile(options, &*self.resolver)
            .map_err(ScriptError::Compile)?;
        self.state = ScriptState::Compiled(ProgramImage::from_artifact(artifact));
        self.forward_threadability();
        Ok(())
    }

    /// Persists the freshly compiled program as the cache pair for `name`.
    ///
    /// Only meaningful from `Compiled`. Holds an exclusive lock on both
    /// files for the whole write. Lock contention abandons the attempt and
    /// leaves whatever pair is on disk untouched; only a failed write
    /// deletes the now-partial pair. The in-memory program stays usable
    /// either way.
    pub fn persist_to_cache(&mut self, dir: &Path, name: &str) -> bool {
        let ScriptState::Compiled(program) = &self.state else {
            return false;
        };
        if !caching_enabled() {
            debug!("caching disabled by {NOCACHE_ENV}");
            return false;
        }

        let (obj_path, info_path) = cache_pair(dir, name);
        let info_existed = info_path.exists();
        let _info_lock = match FileLock::exclusive(&info_path) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("cannot lock {} for write: {e}", info_path.display());
                return false;
            }
        };
        let _obj_lock = match FileLock::exclusive(&obj_path) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("cannot lock {} for write: {e}", obj_path.display());
                // Another process owns the pair right now; leave it alone.
                // Only the empty info file this attempt created is dropped.
                if !info_existed {
                    let _ = fs::remove_file(&info_path);
                }
                return false;
            }
        };

        let threadable = relocate::runtime_is_threadable(&*self.resolver) as u32;
        let deps = self.expected_deps();
        match CacheWriter::write(&obj_path, &info_path, program, &deps, threadable) {
            Ok(()) => {
                debug!("cached {name} in {}", dir.display());
                true
            }
            Err(e) => {
                warn!("cache write for {name} failed: {e}");
                remove_pair(&obj_path, &info_path);
                false
            }
        }
    }

    /// Produces a usable program: cache load when possible, fresh compile
    /// otherwise, with a best-effort persist of the fresh result.
    ///
    /// Caching is attempted only when both a directory and a name were
    /// supplied and the environment override has not disabled it.
    pub fn prepare_executable(
        &mut self,
        cache_dir: Option<&Path>,
        cache_name: Option<&str>,
        compiler: &dyn Compiler,
        options: &CompileOptions,
    ) -> Result<(), ScriptError> {
        let cache = match (cache_dir, cache_name) {
            (Some(dir), Some(name)) if caching_enabled() => Some((dir, name)),
            _ => None,
        };

        if let Some((dir, name)) = cache {
            if self.try_load_from_cache(dir, name) {
                return Ok(());
            }
        }

        self.compile(compiler, options)?;
        if let Some((dir, name)) = cache {
            self.persist_to_cache(dir, name);
        }
        Ok(())
    }

    fn program(&self, op: &'static str) -> Result<&ProgramImage, ScriptError> {
        match &self.state {
            ScriptState::Compiled(p) | ScriptState::Cached(p) => Ok(p),
            ScriptState::Unknown => Err(ScriptError::InvalidOperation(op)),
        }
    }

    /// Raw program-image bytes.
    pub fn image(&self) -> Result<&[u8], ScriptError> {
        Ok(self.program("image")?.image())
    }

    /// Size of the program image in bytes.
    pub fn image_size(&self) -> Result<usize, ScriptError> {
        Ok(self.program("image_size")?.image_size())
    }

    /// Number of exported variables.
    pub fn export_var_count(&self) -> Result<usize, ScriptError> {
        Ok(self.program("export_var_count")?.export_var_count())
    }

    /// Exported variable names, in slot order.
    pub fn export_var_names(&self) -> Result<&[String], ScriptError> {
        Ok(self.program("export_var_names")?.export_var_names())
    }

    /// Number of exported functions.
    pub fn export_func_count(&self) -> Result<usize, ScriptError> {
        Ok(self.program("export_func_count")?.export_func_count())
    }

    /// Exported functions with per-function metadata.
    pub fn export_funcs(&self) -> Result<&[FunctionInfo], ScriptError> {
        Ok(self.program("export_funcs")?.export_funcs())
    }

    /// Number of exported for-each kernels.
    pub fn export_kernel_count(&self) -> Result<usize, ScriptError> {
        Ok(self.program("export_kernel_count")?.export_kernel_count())
    }

    /// Exported for-each kernel names.
    pub fn export_kernel_names(&self) -> Result<&[String], ScriptError> {
        Ok(self.program("export_kernel_names")?.export_kernel_names())
    }

    /// Pragma key/value pairs.
    pub fn pragmas(&self) -> Result<&[(String, String)], ScriptError> {
        Ok(self.program("pragmas")?.pragmas())
    }

    /// Exported global slot values, valid in this process.
    pub fn object_slots(&self) -> Result<&[u64], ScriptError> {
        Ok(self.program("object_slots")?.object_slots())
    }

    /// Looks up the address of an exported symbol.
    pub fn lookup(&self, name: &str) -> Result<Option<u64>, ScriptError> {
        Ok(self.program("lookup")?.lookup(name))
    }

    // The threadability answer reflects this process's runtime build, so it
    // is read live after both the cache-load and the compile path and
    // forwarded, never trusted from the cache header.
    fn forward_threadability(&self) {
        if !relocate::runtime_is_threadable(&*self.resolver) {
            relocate::clear_runtime_threadable(&*self.resolver);
        }
    }

    /// The full expected set: the two runtime libraries plus every
    /// registered source module.
    fn expected_deps(&self) -> DependencySet {
        let mut deps = DependencySet::new();
        deps.add(
            self.runtime.compiler_runtime.0.clone(),
            self.runtime.compiler_runtime.1,
        );
        deps.add(
            self.runtime.support_runtime.0.clone(),
            self.runtime.support_runtime.1,
        );
        for dep in &self.sources {
            deps.add(dep.name.clone(), dep.fingerprint);
        }
        deps
    }
}

fn caching_enabled() -> bool {
    std::env::var_os(NOCACHE_ENV).is_none()
}

/// Deterministic sibling paths for one cached program.
fn cache_pair(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (dir.join(format!("{name}.o")), dir.join(format!("{name}.info")))
}

fn remove_pair(obj_path: &Path, info_path: &Path) {
    for path in [obj_path, info_path] {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("cannot remove partial cache file {}: {e}", path.display());
            }
        }
    }
}
