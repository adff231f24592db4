//! Dependency registration and matching.
//!
//! The cache records a (name, fingerprint) pair for every input that went
//! into a compiled program: the two fixed runtime libraries plus every
//! source module. At read time the recorded set must equal the expected set
//! in content, independent of ordering; any addition, removal, or byte
//! mismatch invalidates the cache.

use std::collections::BTreeMap;

use kiln_common::Fingerprint;

/// One source-module input to a compile, owned by the orchestrator.
///
/// Lifetime spans one compile/cache-check cycle; the orchestrator clears
/// its recorded dependencies on state reset.
#[derive(Debug, Clone)]
pub struct SourceDependency {
    /// Resource name as registered by the caller (typically a module path).
    pub name: String,
    /// Content digest of the module at registration time.
    pub fingerprint: Fingerprint,
}

/// Fingerprints of the two runtime libraries every cache depends on.
///
/// These are process-wide facts supplied once at orchestrator construction
/// (not compiled-in globals) so tests can substitute fixtures.
#[derive(Debug, Clone)]
pub struct RuntimeFingerprints {
    /// Name and digest of the compiler runtime library.
    pub compiler_runtime: (String, Fingerprint),
    /// Name and digest of the support runtime library.
    pub support_runtime: (String, Fingerprint),
}

/// An ordered set of named dependency fingerprints.
///
/// Insertion order is preserved for serialization; matching is
/// order-independent. Registering a name twice replaces the earlier entry.
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    entries: Vec<(String, Fingerprint)>,
}

impl DependencySet {
    /// Creates an empty dependency set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dependency, replacing any earlier entry with the same name.
    pub fn add(&mut self, name: impl Into<String>, fingerprint: Fingerprint) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = fingerprint;
        } else {
            self.entries.push((name, fingerprint));
        }
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, Fingerprint)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compares a recorded dependency list against this expected set.
    ///
    /// Equality is by content, independent of ordering: every expected name
    /// must be recorded with an identical fingerprint, and nothing else may
    /// be recorded.
    pub fn matches(&self, recorded: &[(String, Fingerprint)]) -> bool {
        let expected: BTreeMap<&str, &Fingerprint> = self
            .entries
            .iter()
            .map(|(n, f)| (n.as_str(), f))
            .collect();
        let found: BTreeMap<&str, &Fingerprint> =
            recorded.iter().map(|(n, f)| (n.as_str(), f)).collect();
        expected == found
    }
}
