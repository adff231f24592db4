//! Cache deserialization and the staged validity check.
//!
//! The validator is an ordered, short-circuiting pipeline over the parsed
//! info file; the first failing stage is the reported reason and nothing
//! after it runs. Only a cache that passes every stage is materialized, and
//! materialization itself can still fail during relocation. The reader
//! never trusts a byte it has not bounds-checked.

use std::fs;
use std::path::Path;

use crate::dependency::DependencySet;
use crate::error::{CacheError, InvalidReason};
use crate::format::{
    self, Header, SectionId, StringPool, FORMAT_VERSION, HEADER_SIZE, MAGIC, NO_CONTEXT_SLOT,
};
use crate::program::{FunctionInfo, ImageRelocation, ProgramImage};
use crate::relocate::{RelocationEngine, SymbolResolver, RUNTIME_CONTEXT};

/// The fully parsed info file, produced only after every validation stage
/// has passed.
struct ParsedInfo {
    context_slot: Option<u32>,
    export_vars: Vec<String>,
    export_funcs: Vec<FunctionInfo>,
    export_kernels: Vec<String>,
    pragmas: Vec<(String, String)>,
    object_slots: Vec<u64>,
    relocations: Vec<ImageRelocation>,
}

/// Reads and validates a cache pair.
pub struct CacheReader<'a> {
    expected: &'a DependencySet,
    resolver: &'a dyn SymbolResolver,
}

impl<'a> CacheReader<'a> {
    /// Creates a reader that validates against the given expected
    /// dependency set and re-binds addresses through `resolver`.
    pub fn new(expected: &'a DependencySet, resolver: &'a dyn SymbolResolver) -> Self {
        Self { expected, resolver }
    }

    /// Validates the pair and materializes a relocated, queryable program.
    pub fn read(&self, obj_path: &Path, info_path: &Path) -> Result<ProgramImage, CacheError> {
        let parsed = self.validate(obj_path, info_path)?;

        let image = fs::read(obj_path).map_err(|e| CacheError::Io {
            path: obj_path.to_path_buf(),
            source: e,
        })?;

        let relocated = RelocationEngine::new(self.resolver).run(
            image,
            &parsed.export_vars,
            &parsed.export_funcs,
            &parsed.export_kernels,
            &parsed.object_slots,
            &parsed.relocations,
        )?;

        Ok(ProgramImage::from_cache(
            relocated.image,
            parsed.export_vars,
            parsed.export_funcs,
            parsed.export_kernels,
            parsed.pragmas,
            relocated.object_slots,
            relocated.symbols,
            parsed.context_slot,
            parsed.relocations,
        ))
    }

    /// Runs the validity pipeline without materializing a usable program.
    ///
    /// Returns the same verdict as [`CacheReader::read`] for every
    /// validation stage; used to decide whether a compile-then-write can
    /// be skipped.
    pub fn check(&self, obj_path: &Path, info_path: &Path) -> Result<(), CacheError> {
        self.validate(obj_path, info_path).map(|_| ())
    }

    fn validate(&self, obj_path: &Path, info_path: &Path) -> Result<ParsedInfo, CacheError> {
        // Stage 1: file sizes.
        let info_len = file_len(info_path)?;
        let obj_len = file_len(obj_path)?;
        if info_len < HEADER_SIZE as u64 || obj_len == 0 {
            return invalid(InvalidReason::FileSize);
        }

        let info = fs::read(info_path).map_err(|e| CacheError::Io {
            path: info_path.to_path_buf(),
            source: e,
        })?;
        let Some(header) = Header::decode(&info) else {
            // The file shrank between the metadata call and the read.
            return invalid(InvalidReason::FileSize);
        };

        // Stage 2: magic and version, exact match only.
        if header.magic != MAGIC || header.version != FORMAT_VERSION {
            return invalid(InvalidReason::Header);
        }

        // Stage 3: machine integer types.
        if header.endianness != format::host_endianness()
            || header.word_size != format::host_word_size()
        {
            return invalid(InvalidReason::MachineIntType);
        }

        // Stage 4: section offsets, sizes, ordering, and record counts.
        let mut prev_end = HEADER_SIZE;
        for id in SectionId::ALL {
            let section = header.section(id);
            let offset = section.offset as usize;
            let size = section.size as usize;
            let Some(end) = offset.checked_add(size) else {
                return invalid(InvalidReason::SectionBounds);
            };
            if offset % format::SECTION_ALIGN != 0 || offset < prev_end || end > info.len() {
                return invalid(InvalidReason::SectionBounds);
            }
            if !format::section_shape_ok(id, &info[offset..end]) {
                return invalid(InvalidReason::SectionBounds);
            }
            prev_end = end;
        }

        // Stage 5: the string pool itself, then every reference into it.
        let pool = StringPool::decode(section_bytes(&header, &info, SectionId::StringPool))
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;

        let dep_records =
            format::decode_dependency_table(section_bytes(&header, &info, SectionId::DependencyTable))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;
        let pragma_records =
            format::decode_pragma_list(section_bytes(&header, &info, SectionId::PragmaList))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;
        let object_slots =
            format::decode_object_slots(section_bytes(&header, &info, SectionId::ObjectSlotList))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;
        let var_records =
            format::decode_name_list(section_bytes(&header, &info, SectionId::ExportVarNames))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;
        let func_records =
            format::decode_func_table(section_bytes(&header, &info, SectionId::ExportFuncTable))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;
        let kernel_records =
            format::decode_name_list(section_bytes(&header, &info, SectionId::ExportKernelNames))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;
        let reloc_records =
            format::decode_reloc_table(section_bytes(&header, &info, SectionId::RelocationTable))
                .ok_or(CacheError::Invalid(InvalidReason::SectionBounds))?;

        let recorded_deps = format::resolve_dependency_table(&dep_records, &pool)
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;
        let pragmas = resolve_pragmas(&pragma_records, &pool)
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;
        let export_vars = resolve_names(&var_records, &pool)
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;
        let export_funcs = format::resolve_func_table(&func_records, &pool)
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;
        let export_kernels = resolve_names(&kernel_records, &pool)
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;
        let relocations = format::resolve_reloc_table(&reloc_records, &pool)
            .ok_or(CacheError::Invalid(InvalidReason::StringPool))?;

        // Stage 6: dependency fingerprints, order-independent exact match.
        if !self.expected.matches(&recorded_deps) {
            return invalid(InvalidReason::Dependency);
        }

        // Stage 7: the runtime-context slot must be re-bindable here.
        let context_slot = if header.context_slot == NO_CONTEXT_SLOT {
            None
        } else {
            let index = header.context_slot;
            if index as usize >= object_slots.len()
                || self.resolver.resolve(RUNTIME_CONTEXT).is_none()
            {
                return invalid(InvalidReason::ContextUnavailable);
            }
            Some(index)
        };

        Ok(ParsedInfo {
            context_slot,
            export_vars,
            export_funcs,
            export_kernels,
            pragmas,
            object_slots,
            relocations,
        })
    }
}

fn invalid<T>(reason: InvalidReason) -> Result<T, CacheError> {
    Err(CacheError::Invalid(reason))
}

// Bounds already verified by the section stage.
fn section_bytes<'a>(header: &Header, info: &'a [u8], id: SectionId) -> &'a [u8] {
    let s = header.section(id);
    &info[s.offset as usize..(s.offset as usize + s.size as usize)]
}

fn file_len(path: &Path) -> Result<u64, CacheError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

fn resolve_names(records: &[u32], pool: &StringPool) -> Option<Vec<String>> {
    records
        .iter()
        .map(|&idx| Some(pool.get(idx)?.to_string()))
        .collect()
}

fn resolve_pragmas(
    records: &[format::PragmaRecord],
    pool: &StringPool,
) -> Option<Vec<(String, String)>> {
    records
        .iter()
        .map(|rec| {
            Some((
                pool.get(rec.key)?.to_string(),
                pool.get(rec.value)?.to_string(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramArtifact;
    use crate::relocate::NoSymbols;
    use crate::writer::CacheWriter;
    use kiln_common::Fingerprint;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn fp(data: &[u8]) -> Fingerprint {
        Fingerprint::of_bytes(data)
    }

    fn sample_program() -> ProgramImage {
        ProgramImage::from_artifact(ProgramArtifact {
            image: b"\x7fELF sample image bytes".to_vec(),
            export_vars: vec!["g_count".to_string()],
            export_funcs: vec![FunctionInfo {
                name: "root".to_string(),
                signature: 2,
            }],
            export_kernels: vec!["process".to_string()],
            pragmas: vec![
                ("version".to_string(), "1".to_string()),
                ("pack".to_string(), "tight".to_string()),
            ],
            object_slots: vec![0xAAAA],
            context_slot: None,
            relocations: vec![],
            symbols: HashMap::new(),
        })
    }

    fn sample_deps() -> DependencySet {
        let mut deps = DependencySet::new();
        deps.add("mod.bc", fp(b"module body"));
        deps
    }

    fn resolver_for_sample() -> impl SymbolResolver {
        |name: &str| match name {
            "g_count" => Some(0xBBBB),
            "root" => Some(0x1000),
            "process" => Some(0x2000),
            _ => None,
        }
    }

    /// Writes the sample pair and returns its paths plus the tempdir guard.
    fn written_pair() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("prog.o");
        let info = dir.path().join("prog.info");
        CacheWriter::write(&obj, &info, &sample_program(), &sample_deps(), 0).unwrap();
        (dir, obj, info)
    }

    fn reason(result: Result<ProgramImage, CacheError>) -> InvalidReason {
        match result {
            Err(CacheError::Invalid(reason)) => reason,
            other => panic!("expected invalid cache, got {other:?}"),
        }
    }

    #[test]
    fn roundtrip_preserves_exports() {
        let (_dir, obj, info) = written_pair();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let program = CacheReader::new(&deps, &resolver).read(&obj, &info).unwrap();

        assert_eq!(program.export_var_count(), 1);
        assert_eq!(program.export_var_names(), ["g_count"]);
        assert_eq!(program.export_func_count(), 1);
        assert_eq!(program.export_funcs()[0].name, "root");
        assert_eq!(program.export_funcs()[0].signature, 2);
        assert_eq!(program.export_kernel_names(), ["process"]);
        assert_eq!(program.pragmas().len(), 2);
        assert_eq!(program.pragmas()[0], ("version".to_string(), "1".to_string()));
        assert_eq!(program.image(), b"\x7fELF sample image bytes");
    }

    #[test]
    fn slots_are_rebound_not_replayed() {
        let (_dir, obj, info) = written_pair();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let program = CacheReader::new(&deps, &resolver).read(&obj, &info).unwrap();

        // The writer-process value 0xAAAA must not survive relocation.
        assert_eq!(program.object_slots(), [0xBBBB]);
        assert_eq!(program.lookup("g_count"), Some(0xBBBB));
    }

    #[test]
    fn changed_fingerprint_fails_dependency_stage() {
        let (_dir, obj, info) = written_pair();
        let mut deps = DependencySet::new();
        deps.add("mod.bc", fp(b"different module body"));
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::Dependency);
    }

    #[test]
    fn added_dependency_fails_dependency_stage() {
        let (_dir, obj, info) = written_pair();
        let mut deps = sample_deps();
        deps.add("extra.bc", fp(b"new module"));
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::Dependency);
    }

    #[test]
    fn removed_dependency_fails_dependency_stage() {
        let (_dir, obj, info) = written_pair();
        let deps = DependencySet::new();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::Dependency);
    }

    #[test]
    fn truncated_info_fails_size_stage() {
        let (_dir, obj, info) = written_pair();
        let bytes = fs::read(&info).unwrap();
        fs::write(&info, &bytes[..HEADER_SIZE - 1]).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::FileSize);
    }

    #[test]
    fn empty_object_file_fails_size_stage() {
        let (_dir, obj, info) = written_pair();
        fs::write(&obj, b"").unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::FileSize);
    }

    #[test]
    fn bad_magic_fails_header_stage() {
        let (_dir, obj, info) = written_pair();
        let mut bytes = fs::read(&info).unwrap();
        bytes[0..4].copy_from_slice(b"NOPE");
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::Header);
    }

    #[test]
    fn version_skew_fails_header_stage() {
        let (_dir, obj, info) = written_pair();
        let mut bytes = fs::read(&info).unwrap();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::Header);
    }

    #[test]
    fn foreign_word_size_fails_machine_stage() {
        let (_dir, obj, info) = written_pair();
        let mut bytes = fs::read(&info).unwrap();
        bytes[9] = if bytes[9] == 8 { 4 } else { 8 };
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::MachineIntType);
    }

    #[test]
    fn foreign_endianness_fails_machine_stage() {
        let (_dir, obj, info) = written_pair();
        let mut bytes = fs::read(&info).unwrap();
        bytes[8] = if bytes[8] == b'e' { b'E' } else { b'e' };
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::MachineIntType);
    }

    #[test]
    fn section_past_eof_fails_bounds_stage() {
        let (_dir, obj, info) = written_pair();
        let mut bytes = fs::read(&info).unwrap();
        // Inflate the string pool's declared size far past the file end.
        bytes[24..28].copy_from_slice(&0x0100_0000u32.to_le_bytes());
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::SectionBounds);
    }

    #[test]
    fn out_of_order_sections_fail_bounds_stage() {
        let (_dir, obj, info) = written_pair();
        let mut bytes = fs::read(&info).unwrap();
        // Move the dependency table's offset before the string pool's.
        bytes[28..32].copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::SectionBounds);
    }

    #[test]
    fn corrupt_string_reference_fails_pool_stage() {
        let (_dir, obj, info) = written_pair();
        let bytes = fs::read(&info).unwrap();
        let header = Header::decode(&bytes).unwrap();
        // Point the first dependency's name index past the pool.
        let dep_sec = header.section(SectionId::DependencyTable);
        let name_at = dep_sec.offset as usize + 4;
        let mut bytes = bytes;
        bytes[name_at..name_at + 4].copy_from_slice(&0xFFFFu32.to_le_bytes());
        fs::write(&info, &bytes).unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::StringPool);
    }

    #[test]
    fn unresolved_symbol_rejects_whole_load() {
        let (_dir, obj, info) = written_pair();
        let deps = sample_deps();
        // Resolver knows the variable but not the functions.
        let partial = |name: &str| (name == "g_count").then_some(0xBBBBu64);
        let result = CacheReader::new(&deps, &partial).read(&obj, &info);
        assert!(matches!(
            reason(result),
            InvalidReason::Relocation(name) if name == "root"
        ));
    }

    #[test]
    fn context_slot_unavailable_is_distinct_reason() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("prog.o");
        let info = dir.path().join("prog.info");
        let mut program = sample_program();
        program.context_slot = Some(0);
        CacheWriter::write(&obj, &info, &program, &sample_deps(), 0).unwrap();

        // Resolver satisfies every export but not the runtime context.
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver).read(&obj, &info);
        assert_eq!(reason(result), InvalidReason::ContextUnavailable);
    }

    #[test]
    fn context_slot_resolvable_passes() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("prog.o");
        let info = dir.path().join("prog.info");
        let mut program = sample_program();
        program.context_slot = Some(0);
        CacheWriter::write(&obj, &info, &program, &sample_deps(), 0).unwrap();

        let deps = sample_deps();
        let resolver = |name: &str| match name {
            "g_count" => Some(0xBBBBu64),
            "root" => Some(0x1000),
            "process" => Some(0x2000),
            RUNTIME_CONTEXT => Some(0x7000),
            _ => None,
        };
        let program = CacheReader::new(&deps, &resolver).read(&obj, &info).unwrap();
        assert_eq!(program.object_slots(), [0xBBBB]);
    }

    #[test]
    fn check_matches_read_verdicts() {
        let (_dir, obj, info) = written_pair();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let reader = CacheReader::new(&deps, &resolver);
        assert!(reader.check(&obj, &info).is_ok());

        // Corrupt the magic: both modes must now reject at the same stage.
        let mut bytes = fs::read(&info).unwrap();
        bytes[0..4].copy_from_slice(b"NOPE");
        fs::write(&info, &bytes).unwrap();
        let check_err = reader.check(&obj, &info).unwrap_err();
        let read_err = reader.read(&obj, &info).unwrap_err();
        assert!(matches!(check_err, CacheError::Invalid(InvalidReason::Header)));
        assert!(matches!(read_err, CacheError::Invalid(InvalidReason::Header)));
    }

    #[test]
    fn check_does_not_require_relocation() {
        // checkOnly decides skippability without re-binding anything, so a
        // resolver that cannot relocate must not affect the verdict.
        let (_dir, obj, info) = written_pair();
        let deps = sample_deps();
        let reader = CacheReader::new(&deps, &NoSymbols);
        assert!(reader.check(&obj, &info).is_ok());
        assert!(reader.read(&obj, &info).is_err());
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let deps = sample_deps();
        let resolver = resolver_for_sample();
        let result = CacheReader::new(&deps, &resolver)
            .read(&dir.path().join("no.o"), &dir.path().join("no.info"));
        assert!(matches!(result, Err(CacheError::Io { .. })));
    }
}
