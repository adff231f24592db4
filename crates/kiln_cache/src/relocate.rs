//! Re-binding of cached addresses to the current process.
//!
//! Slot values and patch sites captured at cache-write time are writer
//! process addresses and must never be dereferenced as-is. The relocation
//! engine re-binds them through a caller-supplied symbol resolver.
//! Relocation is all-or-nothing per load attempt: the first unresolved
//! symbol aborts the load and no partially relocated program is ever
//! exposed.

use std::collections::HashMap;

use crate::error::{CacheError, InvalidReason};
use crate::program::{FunctionInfo, ImageRelocation};

/// Sentinel symbol asking whether the support runtime may run
/// multi-threaded. A resolver answers with a nonzero value for yes.
pub const IS_THREADABLE: &str = "__isThreadable";

/// Sentinel symbol telling the runtime to drop into single-threaded mode.
pub const CLEAR_THREADABLE: &str = "__clearThreadable";

/// Sentinel symbol for the current process's runtime-context address.
pub const RUNTIME_CONTEXT: &str = "__runtimeContext";

/// Name-to-address lookup supplied by the embedding host.
///
/// Used for relocation and for the threadability queries. Any closure of
/// the right shape is a resolver.
pub trait SymbolResolver {
    /// Returns the address (or integer answer) for `name`, or `None` when
    /// the symbol cannot be supplied in this process.
    fn resolve(&self, name: &str) -> Option<u64>;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Option<u64>,
{
    fn resolve(&self, name: &str) -> Option<u64> {
        self(name)
    }
}

/// A resolver that supplies nothing. Used when the host registered no
/// callback; any cache requiring relocation is then rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _name: &str) -> Option<u64> {
        None
    }
}

/// The relocated result of a successful cache load.
#[derive(Debug)]
pub struct Relocated {
    /// Image bytes with every patch site rewritten.
    pub image: Vec<u8>,
    /// Slot values re-bound to current-process addresses.
    pub object_slots: Vec<u64>,
    /// Current-process addresses of every exported symbol.
    pub symbols: HashMap<String, u64>,
}

/// Re-binds cached addresses through a symbol resolver.
pub struct RelocationEngine<'a> {
    resolver: &'a dyn SymbolResolver,
}

impl<'a> RelocationEngine<'a> {
    /// Creates an engine over the given resolver.
    pub fn new(resolver: &'a dyn SymbolResolver) -> Self {
        Self { resolver }
    }

    /// Runs full relocation over a cached program.
    ///
    /// Every exported variable, function, and kernel is resolved to its
    /// current address; slot `i` is re-bound through exported variable `i`;
    /// every patch site in `relocations` is rewritten in the image. The
    /// first unresolved symbol fails the whole attempt.
    pub fn run(
        &self,
        mut image: Vec<u8>,
        export_vars: &[String],
        export_funcs: &[FunctionInfo],
        export_kernels: &[String],
        object_slots: &[u64],
        relocations: &[ImageRelocation],
    ) -> Result<Relocated, CacheError> {
        let mut symbols = HashMap::new();

        for name in export_vars {
            let addr = self.require(name)?;
            symbols.insert(name.clone(), addr);
        }
        for func in export_funcs {
            let addr = self.require(&func.name)?;
            symbols.insert(func.name.clone(), addr);
        }
        for name in export_kernels {
            let addr = self.require(name)?;
            symbols.insert(name.clone(), addr);
        }

        // Slots correlate by index with the exported variables; a slot
        // without a matching variable cannot be re-bound.
        let mut slots = Vec::with_capacity(object_slots.len());
        for (i, _) in object_slots.iter().enumerate() {
            let name = export_vars
                .get(i)
                .ok_or_else(|| unresolved(format!("slot {i}")))?;
            slots.push(symbols[name]);
        }

        let word = std::mem::size_of::<usize>();
        for reloc in relocations {
            let addr = self.require(&reloc.symbol)?;
            let start = usize::try_from(reloc.offset)
                .map_err(|_| unresolved(reloc.symbol.clone()))?;
            let end = start
                .checked_add(word)
                .filter(|&end| end <= image.len())
                .ok_or_else(|| unresolved(reloc.symbol.clone()))?;
            image[start..end].copy_from_slice(&(addr as usize).to_ne_bytes());
        }

        Ok(Relocated {
            image,
            object_slots: slots,
            symbols,
        })
    }

    fn require(&self, name: &str) -> Result<u64, CacheError> {
        self.resolver
            .resolve(name)
            .ok_or_else(|| unresolved(name.to_string()))
    }
}

fn unresolved(name: String) -> CacheError {
    CacheError::Invalid(InvalidReason::Relocation(name))
}

/// Asks the resolver whether the support runtime is threadable right now.
///
/// Read immediately after a successful cache load or a fresh compile and
/// forwarded to the runtime; the answer reflects the current process's
/// runtime build and is never trusted from the cache header.
pub fn runtime_is_threadable(resolver: &dyn SymbolResolver) -> bool {
    resolver
        .resolve(IS_THREADABLE)
        .map(|v| v != 0)
        .unwrap_or(false)
}

/// Tells the runtime to fall back to single-threaded operation.
pub fn clear_runtime_threadable(resolver: &dyn SymbolResolver) {
    let _ = resolver.resolve(CLEAR_THREADABLE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(pairs: &[(&str, u64)]) -> impl SymbolResolver {
        let table: HashMap<String, u64> = pairs
            .iter()
            .map(|(n, a)| (n.to_string(), *a))
            .collect();
        move |name: &str| table.get(name).copied()
    }

    #[test]
    fn rebinds_slots_through_variable_names() {
        let r = resolver(&[("g_count", 0xBBBB)]);
        let engine = RelocationEngine::new(&r);
        let out = engine
            .run(vec![], &["g_count".to_string()], &[], &[], &[0xAAAA], &[])
            .unwrap();
        assert_eq!(out.object_slots, [0xBBBB]);
        assert_eq!(out.symbols["g_count"], 0xBBBB);
    }

    #[test]
    fn unresolved_variable_fails_whole_attempt() {
        let r = resolver(&[("g_count", 0xBBBB)]);
        let engine = RelocationEngine::new(&r);
        let err = engine
            .run(
                vec![],
                &["g_count".to_string(), "g_missing".to_string()],
                &[],
                &[],
                &[],
                &[],
            )
            .unwrap_err();
        match err {
            CacheError::Invalid(InvalidReason::Relocation(name)) => {
                assert_eq!(name, "g_missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn slot_without_variable_fails() {
        let r = resolver(&[]);
        let engine = RelocationEngine::new(&r);
        let err = engine.run(vec![], &[], &[], &[], &[0x1], &[]).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Invalid(InvalidReason::Relocation(_))
        ));
    }

    #[test]
    fn patches_image_at_reloc_sites() {
        let word = std::mem::size_of::<usize>();
        let r = resolver(&[("puts", 0x1234)]);
        let engine = RelocationEngine::new(&r);
        let image = vec![0u8; word * 2];
        let relocs = vec![ImageRelocation {
            symbol: "puts".to_string(),
            offset: word as u64,
        }];
        let out = engine.run(image, &[], &[], &[], &[], &relocs).unwrap();
        assert_eq!(&out.image[..word], vec![0u8; word].as_slice());
        assert_eq!(&out.image[word..], 0x1234usize.to_ne_bytes().as_slice());
    }

    #[test]
    fn reloc_site_past_image_end_fails() {
        let r = resolver(&[("puts", 0x1234)]);
        let engine = RelocationEngine::new(&r);
        let relocs = vec![ImageRelocation {
            symbol: "puts".to_string(),
            offset: 1,
        }];
        let err = engine
            .run(vec![0u8; 4], &[], &[], &[], &[], &relocs)
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Invalid(InvalidReason::Relocation(_))
        ));
    }

    #[test]
    fn functions_and_kernels_enter_symbol_map() {
        let r = resolver(&[("root", 0x1000), ("process", 0x2000)]);
        let engine = RelocationEngine::new(&r);
        let funcs = vec![FunctionInfo {
            name: "root".to_string(),
            signature: 0,
        }];
        let out = engine
            .run(vec![], &[], &funcs, &["process".to_string()], &[], &[])
            .unwrap();
        assert_eq!(out.symbols["root"], 0x1000);
        assert_eq!(out.symbols["process"], 0x2000);
    }

    #[test]
    fn threadable_queries() {
        let yes = resolver(&[(IS_THREADABLE, 1)]);
        assert!(runtime_is_threadable(&yes));
        let no = resolver(&[(IS_THREADABLE, 0)]);
        assert!(!runtime_is_threadable(&no));
        let absent = resolver(&[]);
        assert!(!runtime_is_threadable(&absent));
        // clear is fire-and-forget
        clear_runtime_threadable(&absent);
    }

    #[test]
    fn no_symbols_resolver_resolves_nothing() {
        assert_eq!(NoSymbols.resolve("anything"), None);
    }
}
