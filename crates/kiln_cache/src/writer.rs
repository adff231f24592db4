//! Serialization of a compiled program into a cache pair.
//!
//! The object file receives the raw image verbatim; the info file is
//! assembled section by section with the header encoded last, once every
//! section size is known, so the recorded offsets are exact. A failed write
//! is reported, never propagated as a panic: the compile that produced the
//! program must not be aborted by a cache problem, and the orchestrator
//! deletes both files of the pair on any failure.

use std::fs;
use std::path::Path;

use crate::dependency::DependencySet;
use crate::error::CacheError;
use crate::format::{
    self, DependencyRecord, FuncRecord, Header, PragmaRecord, RelocRecord, Section,
    StringPoolBuilder, HEADER_SIZE, NO_CONTEXT_SLOT,
};
use crate::program::ProgramImage;

/// Serializes a compiled program image and its metadata to a cache pair.
pub struct CacheWriter;

impl CacheWriter {
    /// Writes the object and info files for `program`.
    ///
    /// `dependencies` is every input the caller knows about; an empty table
    /// is valid but trivially invalidated once any dependency appears.
    /// `runtime_threadable` is the threadability answer observed at write
    /// time, recorded in the header for diagnostics.
    pub fn write(
        obj_path: &Path,
        info_path: &Path,
        program: &ProgramImage,
        dependencies: &DependencySet,
        runtime_threadable: u32,
    ) -> Result<(), CacheError> {
        let info = Self::encode_info(program, dependencies, runtime_threadable);

        fs::write(info_path, &info).map_err(|e| CacheError::Io {
            path: info_path.to_path_buf(),
            source: e,
        })?;
        fs::write(obj_path, program.image()).map_err(|e| CacheError::Io {
            path: obj_path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Encodes the complete info file in memory.
    fn encode_info(
        program: &ProgramImage,
        dependencies: &DependencySet,
        runtime_threadable: u32,
    ) -> Vec<u8> {
        let mut pool = StringPoolBuilder::new();

        let dep_records: Vec<DependencyRecord> = dependencies
            .iter()
            .map(|(name, fp)| DependencyRecord {
                name: pool.intern(name),
                fingerprint: *fp.as_bytes(),
            })
            .collect();

        let pragma_records: Vec<PragmaRecord> = program
            .pragmas()
            .iter()
            .map(|(key, value)| PragmaRecord {
                key: pool.intern(key),
                value: pool.intern(value),
            })
            .collect();

        let var_records: Vec<u32> = program
            .export_var_names()
            .iter()
            .map(|name| pool.intern(name))
            .collect();

        let func_records: Vec<FuncRecord> = program
            .export_funcs()
            .iter()
            .map(|func| FuncRecord {
                name: pool.intern(&func.name),
                signature: func.signature,
            })
            .collect();

        let kernel_records: Vec<u32> = program
            .export_kernel_names()
            .iter()
            .map(|name| pool.intern(name))
            .collect();

        let reloc_records: Vec<RelocRecord> = program
            .relocations
            .iter()
            .map(|reloc| RelocRecord {
                symbol: pool.intern(&reloc.symbol),
                offset: reloc.offset,
            })
            .collect();

        // The pool is encoded only after every table has interned its
        // strings.
        let sections: [Vec<u8>; format::SECTION_COUNT] = [
            pool.encode(),
            format::encode_dependency_table(&dep_records),
            format::encode_pragma_list(&pragma_records),
            format::encode_object_slots(program.object_slots()),
            format::encode_name_list(&var_records),
            format::encode_func_table(&func_records),
            format::encode_name_list(&kernel_records),
            format::encode_reloc_table(&reloc_records),
        ];

        let mut header = Header::for_host();
        header.runtime_threadable = runtime_threadable;
        header.context_slot = program.context_slot.unwrap_or(NO_CONTEXT_SLOT);

        let mut offset = HEADER_SIZE;
        for (i, bytes) in sections.iter().enumerate() {
            offset = format::align_up(offset);
            header.sections[i] = Section {
                offset: offset as u32,
                size: bytes.len() as u32,
            };
            offset += bytes.len();
        }

        let total = format::align_up(offset);
        let mut out = vec![0u8; total];
        out[..HEADER_SIZE].copy_from_slice(&header.encode());
        for (i, bytes) in sections.iter().enumerate() {
            let at = header.sections[i].offset as usize;
            out[at..at + bytes.len()].copy_from_slice(bytes);
        }
        out
    }
}
