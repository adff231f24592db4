//! Error types for the cache subsystem.

use std::path::PathBuf;

/// The validation stage at which a cache was rejected.
///
/// The validity pipeline is ordered and short-circuiting; the first failing
/// stage is the one reported. `ContextUnavailable` is tracked separately
/// from the other reasons because the orchestrator surfaces it as a distinct
/// signal to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReason {
    /// The info file is smaller than a header, or the object file is empty.
    #[error("cache file too small")]
    FileSize,

    /// The magic tag or format version does not match.
    #[error("bad magic or format version")]
    Header,

    /// The recorded endianness or word size differs from this process.
    #[error("machine integer type mismatch")]
    MachineIntType,

    /// A section's declared offset and size do not fit the info file, or the
    /// sections overlap or are out of declared order.
    #[error("section offset/size out of bounds")]
    SectionBounds,

    /// A string reference does not resolve inside the string pool or does
    /// not terminate properly.
    #[error("string pool reference out of bounds")]
    StringPool,

    /// The recorded dependency fingerprints do not match the expected set.
    #[error("dependency fingerprint mismatch")]
    Dependency,

    /// The recorded runtime-context slot cannot be re-bound in this process.
    #[error("context slot not available")]
    ContextUnavailable,

    /// The symbol resolver could not supply an address for a referenced
    /// symbol during relocation.
    #[error("unresolved symbol during relocation: {0}")]
    Relocation(String),
}

/// Errors raised on the cache path.
///
/// These are always recovered locally: any `CacheError` during a load
/// attempt means "fall back to fresh compilation", and any `CacheError`
/// during a store attempt means "delete the partial pair and keep the
/// in-memory program". They never propagate to the orchestrator's caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error while opening, reading, or writing a cache file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The file that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The advisory lock on a cache file could not be acquired immediately.
    #[error("cache lock unavailable for {path}")]
    Lock {
        /// The file whose lock was contended.
        path: PathBuf,
    },

    /// The cache failed validation at the given stage.
    #[error("cache invalid: {0}")]
    Invalid(InvalidReason),
}

/// Hard failures visible to the orchestrator's caller.
///
/// Everything cache-related is recovered internally; only API misuse and
/// failure of the fresh compile itself surface as errors.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// An operation was invoked in a state that does not permit it.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The external compiler reported a failure, with its message.
    #[error("compilation failed: {0}")]
    Compile(String),
}
