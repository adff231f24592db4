//! Compiled-program representations.
//!
//! [`ProgramArtifact`] is what the external compiler hands back: the raw
//! object image plus the export metadata the cache must persist.
//! [`ProgramImage`] is the read-only query surface the orchestrator exposes
//! once a program is ready, whether it came from a fresh compile or from a
//! validated cache load.

use std::collections::HashMap;

/// Per-function export metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Exported function name.
    pub name: String,
    /// ABI signature class assigned by the compiler.
    pub signature: u32,
}

/// One patch site inside the object payload.
///
/// The word at `offset` must be overwritten with the resolved address of
/// `symbol` before the payload is used in a new process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRelocation {
    /// Symbol whose address belongs at the patch site.
    pub symbol: String,
    /// Byte offset of the patch site inside the image.
    pub offset: u64,
}

/// Output of the external compiler collaborator.
///
/// The image bytes are opaque to the cache; everything else is export
/// metadata that the writer persists and the reader validates.
#[derive(Debug, Clone, Default)]
pub struct ProgramArtifact {
    /// Raw compiled-program image.
    pub image: Vec<u8>,
    /// Exported global variable names, in slot order.
    pub export_vars: Vec<String>,
    /// Exported functions with per-function metadata.
    pub export_funcs: Vec<FunctionInfo>,
    /// Exported for-each kernel names.
    pub export_kernels: Vec<String>,
    /// Pragma key/value pairs embedded in the source.
    pub pragmas: Vec<(String, String)>,
    /// Exported global slot values as addresses in this process.
    pub object_slots: Vec<u64>,
    /// Index of the runtime-context slot in `object_slots`, if any.
    pub context_slot: Option<u32>,
    /// Patch sites inside the image.
    pub relocations: Vec<ImageRelocation>,
    /// Addresses of exported symbols in this process.
    pub symbols: HashMap<String, u64>,
}

/// A ready program: validated cache load or fresh compile.
///
/// Read-only; both backing paths expose exactly this capability set.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    image: Vec<u8>,
    export_vars: Vec<String>,
    export_funcs: Vec<FunctionInfo>,
    export_kernels: Vec<String>,
    pragmas: Vec<(String, String)>,
    object_slots: Vec<u64>,
    symbols: HashMap<String, u64>,
    pub(crate) context_slot: Option<u32>,
    pub(crate) relocations: Vec<ImageRelocation>,
}

impl ProgramImage {
    /// Wraps a freshly compiled artifact. Slot values and symbol addresses
    /// are already valid in this process.
    pub fn from_artifact(artifact: ProgramArtifact) -> Self {
        Self {
            image: artifact.image,
            export_vars: artifact.export_vars,
            export_funcs: artifact.export_funcs,
            export_kernels: artifact.export_kernels,
            pragmas: artifact.pragmas,
            object_slots: artifact.object_slots,
            symbols: artifact.symbols,
            context_slot: artifact.context_slot,
            relocations: artifact.relocations,
        }
    }

    /// Assembles a program from a validated, relocated cache load.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_cache(
        image: Vec<u8>,
        export_vars: Vec<String>,
        export_funcs: Vec<FunctionInfo>,
        export_kernels: Vec<String>,
        pragmas: Vec<(String, String)>,
        object_slots: Vec<u64>,
        symbols: HashMap<String, u64>,
        context_slot: Option<u32>,
        relocations: Vec<ImageRelocation>,
    ) -> Self {
        Self {
            image,
            export_vars,
            export_funcs,
            export_kernels,
            pragmas,
            object_slots,
            symbols,
            context_slot,
            relocations,
        }
    }

    /// Raw program-image bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Size of the program image in bytes.
    pub fn image_size(&self) -> usize {
        self.image.len()
    }

    /// Number of exported variables.
    pub fn export_var_count(&self) -> usize {
        self.export_vars.len()
    }

    /// Exported variable names, in slot order.
    pub fn export_var_names(&self) -> &[String] {
        &self.export_vars
    }

    /// Number of exported functions.
    pub fn export_func_count(&self) -> usize {
        self.export_funcs.len()
    }

    /// Exported functions with metadata.
    pub fn export_funcs(&self) -> &[FunctionInfo] {
        &self.export_funcs
    }

    /// Number of exported for-each kernels.
    pub fn export_kernel_count(&self) -> usize {
        self.export_kernels.len()
    }

    /// Exported for-each kernel names.
    pub fn export_kernel_names(&self) -> &[String] {
        &self.export_kernels
    }

    /// Pragma key/value pairs.
    pub fn pragmas(&self) -> &[(String, String)] {
        &self.pragmas
    }

    /// Exported global slot values, valid in this process.
    pub fn object_slots(&self) -> &[u64] {
        &self.object_slots
    }

    /// Looks up the address of an exported symbol.
    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }
}
