//! Binary layout of the cache info file.
//!
//! The info file is a fixed-size header followed by eight sections in a
//! declared order. The header records the writer's endianness and word size
//! so a reader on a foreign architecture can reject the file before
//! interpreting anything, and an (offset, size) pair per section so every
//! table can be bounds-checked before any reference is chased. All
//! multi-byte fields are little-endian on disk; the endianness marker is
//! checked, not assumed.
//!
//! Every variable-length table is a `u32` count followed by fixed-size
//! records. Name-bearing records reference the string pool by entry index.

use std::collections::HashMap;

use kiln_common::Fingerprint;

use crate::program::{FunctionInfo, ImageRelocation};

/// Magic tag identifying a Kiln cache info file.
pub const MAGIC: [u8; 4] = *b"KLNC";

/// Current info-file format version. Increment on any layout change.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 96;

/// Number of sections in the info file.
pub const SECTION_COUNT: usize = 8;

/// Section start alignment within the info file.
pub const SECTION_ALIGN: usize = 8;

/// Sentinel for "no runtime-context slot recorded".
pub const NO_CONTEXT_SLOT: u32 = u32::MAX;

/// Endianness marker for a little-endian writer.
pub const LITTLE_ENDIAN: u8 = b'e';

/// Endianness marker for a big-endian writer.
pub const BIG_ENDIAN: u8 = b'E';

const DEPENDENCY_RECORD: usize = 4 + 20;
const PRAGMA_RECORD: usize = 8;
const SLOT_RECORD: usize = 8;
const NAME_RECORD: usize = 4;
const FUNC_RECORD: usize = 8;
const RELOC_RECORD: usize = 12;
const STRING_ENTRY: usize = 8;

/// Returns the endianness marker for the current process.
pub fn host_endianness() -> u8 {
    if cfg!(target_endian = "little") {
        LITTLE_ENDIAN
    } else {
        BIG_ENDIAN
    }
}

/// Returns the pointer width of the current process in bytes.
pub fn host_word_size() -> u8 {
    std::mem::size_of::<usize>() as u8
}

/// Identifies a section of the info file, in declared on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SectionId {
    /// NUL-terminated string data referenced by all name tables.
    StringPool = 0,
    /// (name, fingerprint) pairs captured at write time.
    DependencyTable = 1,
    /// (key, value) compiler directives from the source.
    PragmaList = 2,
    /// Raw writer-process address values of exported global slots.
    ObjectSlotList = 3,
    /// Exported variable names.
    ExportVarNames = 4,
    /// Exported function names with per-function metadata.
    ExportFuncTable = 5,
    /// Exported for-each kernel names.
    ExportKernelNames = 6,
    /// (symbol, image offset) pairs to patch inside the object payload.
    RelocationTable = 7,
}

impl SectionId {
    /// Every section in declared on-disk order.
    pub const ALL: [SectionId; SECTION_COUNT] = [
        SectionId::StringPool,
        SectionId::DependencyTable,
        SectionId::PragmaList,
        SectionId::ObjectSlotList,
        SectionId::ExportVarNames,
        SectionId::ExportFuncTable,
        SectionId::ExportKernelNames,
        SectionId::RelocationTable,
    ];
}

/// Offset and size of one section within the info file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section {
    /// Byte offset of the section from the start of the file.
    pub offset: u32,
    /// Byte size of the section, excluding alignment padding.
    pub size: u32,
}

/// The fixed info-file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Magic tag, expected to be [`MAGIC`].
    pub magic: [u8; 4],
    /// Format version, expected to be [`FORMAT_VERSION`].
    pub version: u32,
    /// Endianness marker of the writing process.
    pub endianness: u8,
    /// Pointer width of the writing process in bytes.
    pub word_size: u8,
    /// Threadability of the support runtime as observed at write time.
    /// Recorded for diagnostics; the live process is authoritative.
    pub runtime_threadable: u32,
    /// Index into the object-slot list of the runtime-context slot, or
    /// [`NO_CONTEXT_SLOT`].
    pub context_slot: u32,
    /// Per-section layout, indexed by [`SectionId`].
    pub sections: [Section; SECTION_COUNT],
}

impl Header {
    /// Creates a header for the current process with empty sections.
    pub fn for_host() -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            endianness: host_endianness(),
            word_size: host_word_size(),
            runtime_threadable: 0,
            context_slot: NO_CONTEXT_SLOT,
            sections: [Section::default(); SECTION_COUNT],
        }
    }

    /// Returns the layout of the given section.
    pub fn section(&self, id: SectionId) -> Section {
        self.sections[id as usize]
    }

    /// Encodes the header into its fixed on-disk form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8] = self.endianness;
        buf[9] = self.word_size;
        // bytes 10..12 reserved
        buf[12..16].copy_from_slice(&self.runtime_threadable.to_le_bytes());
        buf[16..20].copy_from_slice(&self.context_slot.to_le_bytes());
        for (i, section) in self.sections.iter().enumerate() {
            let at = 20 + i * 8;
            buf[at..at + 4].copy_from_slice(&section.offset.to_le_bytes());
            buf[at + 4..at + 8].copy_from_slice(&section.size.to_le_bytes());
        }
        // bytes 84..96 reserved
        buf
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of an info
    /// file. Returns `None` if fewer bytes are available; field values are
    /// not judged here, that is the validator's job.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let mut sections = [Section::default(); SECTION_COUNT];
        for (i, section) in sections.iter_mut().enumerate() {
            let at = 20 + i * 8;
            section.offset = u32::from_le_bytes(bytes[at..at + 4].try_into().ok()?);
            section.size = u32::from_le_bytes(bytes[at + 4..at + 8].try_into().ok()?);
        }
        Some(Self {
            magic: bytes[0..4].try_into().ok()?,
            version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            endianness: bytes[8],
            word_size: bytes[9],
            runtime_threadable: u32::from_le_bytes(bytes[12..16].try_into().ok()?),
            context_slot: u32::from_le_bytes(bytes[16..20].try_into().ok()?),
            sections,
        })
    }
}

/// Checks that a section's declared size is consistent with its own record
/// count, so the reader can bounds-check before chasing any reference.
///
/// Fixed-record sections must be exactly `4 + count * record_size` bytes.
/// The string pool must at least hold its entry records; the trailing
/// string data is validated by [`StringPool::decode`].
pub fn section_shape_ok(id: SectionId, section_bytes: &[u8]) -> bool {
    let record = match id {
        SectionId::StringPool => return string_pool_shape_ok(section_bytes),
        SectionId::DependencyTable => DEPENDENCY_RECORD,
        SectionId::PragmaList => PRAGMA_RECORD,
        SectionId::ObjectSlotList => SLOT_RECORD,
        SectionId::ExportVarNames | SectionId::ExportKernelNames => NAME_RECORD,
        SectionId::ExportFuncTable => FUNC_RECORD,
        SectionId::RelocationTable => RELOC_RECORD,
    };
    let Some(count) = read_count(section_bytes) else {
        return false;
    };
    (count as usize)
        .checked_mul(record)
        .and_then(|n| n.checked_add(4))
        .is_some_and(|expected| section_bytes.len() == expected)
}

fn string_pool_shape_ok(section_bytes: &[u8]) -> bool {
    let Some(count) = read_count(section_bytes) else {
        return false;
    };
    (count as usize)
        .checked_mul(STRING_ENTRY)
        .and_then(|n| n.checked_add(4))
        .is_some_and(|entries_end| section_bytes.len() >= entries_end)
}

fn read_count(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?))
}

/// A sequential little-endian record reader over a section.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        let bytes = self.buf.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytes)
    }
}

/// Builds the string pool section, deduplicating repeated names.
#[derive(Debug, Default)]
pub struct StringPoolBuilder {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringPoolBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its pool entry index.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    /// Encodes the pool: count, (offset, len) entries relative to the
    /// section start, then the NUL-terminated string bytes.
    pub fn encode(&self) -> Vec<u8> {
        let entries_end = 4 + self.strings.len() * STRING_ENTRY;
        let mut out = Vec::with_capacity(entries_end);
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());

        let mut offset = entries_end as u32;
        for s in &self.strings {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            offset += s.len() as u32 + 1;
        }
        for s in &self.strings {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out
    }
}

/// A decoded, internally validated string pool.
#[derive(Debug, Clone)]
pub struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    /// Decodes a string pool section, verifying that every entry lies
    /// inside the section, terminates with a NUL, and is valid UTF-8.
    pub fn decode(section: &[u8]) -> Option<Self> {
        let mut cur = Cursor::new(section);
        let count = cur.u32()? as usize;
        let mut strings = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = cur.u32()? as usize;
            let len = cur.u32()? as usize;
            let end = offset.checked_add(len)?;
            let bytes = section.get(offset..end)?;
            if *section.get(end)? != 0 {
                return None;
            }
            strings.push(std::str::from_utf8(bytes).ok()?.to_string());
        }
        Some(Self { strings })
    }

    /// Looks up a string by pool entry index.
    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Number of pool entries.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if the pool holds no strings.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// A dependency record: string pool index of the name plus its fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyRecord {
    /// Pool index of the resource name.
    pub name: u32,
    /// The 20-byte fingerprint recorded at write time.
    pub fingerprint: [u8; 20],
}

/// A pragma record: pool indices of the key and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PragmaRecord {
    /// Pool index of the pragma key.
    pub key: u32,
    /// Pool index of the pragma value.
    pub value: u32,
}

/// An export-function record: pool index of the name plus its signature
/// class as assigned by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncRecord {
    /// Pool index of the function name.
    pub name: u32,
    /// ABI signature class of the function.
    pub signature: u32,
}

/// A relocation record: pool index of the symbol plus the byte offset in
/// the object payload to patch with its resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocRecord {
    /// Pool index of the symbol name.
    pub symbol: u32,
    /// Byte offset inside the object payload.
    pub offset: u64,
}

/// Encodes the dependency table section.
pub fn encode_dependency_table(records: &[DependencyRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * DEPENDENCY_RECORD);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for rec in records {
        out.extend_from_slice(&rec.name.to_le_bytes());
        out.extend_from_slice(&rec.fingerprint);
    }
    out
}

/// Decodes the dependency table section.
pub fn decode_dependency_table(section: &[u8]) -> Option<Vec<DependencyRecord>> {
    let mut cur = Cursor::new(section);
    let count = cur.u32()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let name = cur.u32()?;
        let fingerprint: [u8; 20] = cur.bytes(20)?.try_into().ok()?;
        records.push(DependencyRecord { name, fingerprint });
    }
    Some(records)
}

/// Encodes the pragma list section.
pub fn encode_pragma_list(records: &[PragmaRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * PRAGMA_RECORD);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for rec in records {
        out.extend_from_slice(&rec.key.to_le_bytes());
        out.extend_from_slice(&rec.value.to_le_bytes());
    }
    out
}

/// Decodes the pragma list section.
pub fn decode_pragma_list(section: &[u8]) -> Option<Vec<PragmaRecord>> {
    let mut cur = Cursor::new(section);
    let count = cur.u32()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(PragmaRecord {
            key: cur.u32()?,
            value: cur.u32()?,
        });
    }
    Some(records)
}

/// Encodes the object slot list section.
pub fn encode_object_slots(slots: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + slots.len() * SLOT_RECORD);
    out.extend_from_slice(&(slots.len() as u32).to_le_bytes());
    for slot in slots {
        out.extend_from_slice(&slot.to_le_bytes());
    }
    out
}

/// Decodes the object slot list section.
pub fn decode_object_slots(section: &[u8]) -> Option<Vec<u64>> {
    let mut cur = Cursor::new(section);
    let count = cur.u32()? as usize;
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        slots.push(cur.u64()?);
    }
    Some(slots)
}

/// Encodes a name list section (export variables or kernels).
pub fn encode_name_list(names: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + names.len() * NAME_RECORD);
    out.extend_from_slice(&(names.len() as u32).to_le_bytes());
    for name in names {
        out.extend_from_slice(&name.to_le_bytes());
    }
    out
}

/// Decodes a name list section.
pub fn decode_name_list(section: &[u8]) -> Option<Vec<u32>> {
    let mut cur = Cursor::new(section);
    let count = cur.u32()? as usize;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(cur.u32()?);
    }
    Some(names)
}

/// Encodes the export-function table section.
pub fn encode_func_table(records: &[FuncRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * FUNC_RECORD);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for rec in records {
        out.extend_from_slice(&rec.name.to_le_bytes());
        out.extend_from_slice(&rec.signature.to_le_bytes());
    }
    out
}

/// Decodes the export-function table section.
pub fn decode_func_table(section: &[u8]) -> Option<Vec<FuncRecord>> {
    let mut cur = Cursor::new(section);
    let count = cur.u32()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(FuncRecord {
            name: cur.u32()?,
            signature: cur.u32()?,
        });
    }
    Some(records)
}

/// Encodes the relocation table section.
pub fn encode_reloc_table(records: &[RelocRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * RELOC_RECORD);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for rec in records {
        out.extend_from_slice(&rec.symbol.to_le_bytes());
        out.extend_from_slice(&rec.offset.to_le_bytes());
    }
    out
}

/// Decodes the relocation table section.
pub fn decode_reloc_table(section: &[u8]) -> Option<Vec<RelocRecord>> {
    let mut cur = Cursor::new(section);
    let count = cur.u32()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(RelocRecord {
            symbol: cur.u32()?,
            offset: cur.u64()?,
        });
    }
    Some(records)
}

/// Resolves [`FuncRecord`]s against a pool into [`FunctionInfo`]s.
pub fn resolve_func_table(records: &[FuncRecord], pool: &StringPool) -> Option<Vec<FunctionInfo>> {
    records
        .iter()
        .map(|rec| {
            Some(FunctionInfo {
                name: pool.get(rec.name)?.to_string(),
                signature: rec.signature,
            })
        })
        .collect()
}

/// Resolves [`RelocRecord`]s against a pool into [`ImageRelocation`]s.
pub fn resolve_reloc_table(
    records: &[RelocRecord],
    pool: &StringPool,
) -> Option<Vec<ImageRelocation>> {
    records
        .iter()
        .map(|rec| {
            Some(ImageRelocation {
                symbol: pool.get(rec.symbol)?.to_string(),
                offset: rec.offset,
            })
        })
        .collect()
}

/// Resolves recorded dependency records against a pool.
pub fn resolve_dependency_table(
    records: &[DependencyRecord],
    pool: &StringPool,
) -> Option<Vec<(String, Fingerprint)>> {
    records
        .iter()
        .map(|rec| {
            Some((
                pool.get(rec.name)?.to_string(),
                Fingerprint::from_raw(rec.fingerprint),
            ))
        })
        .collect()
}

/// Rounds an offset up to the next section alignment boundary.
pub fn align_up(offset: usize) -> usize {
    let rem = offset % SECTION_ALIGN;
    if rem == 0 {
        offset
    } else {
        offset + (SECTION_ALIGN - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = Header::for_host();
        header.runtime_threadable = 1;
        header.context_slot = 2;
        header.sections[0] = Section {
            offset: 96,
            size: 40,
        };
        header.sections[7] = Section {
            offset: 144,
            size: 4,
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let back = Header::decode(&bytes).unwrap();
        assert_eq!(back, header);
    }

    #[test]
    fn header_decode_short_buffer() {
        assert!(Header::decode(&[0u8; HEADER_SIZE - 1]).is_none());
    }

    #[test]
    fn host_word_size_matches_pointer_width() {
        assert_eq!(host_word_size() as usize, std::mem::size_of::<usize>());
    }

    #[test]
    fn string_pool_roundtrip() {
        let mut builder = StringPoolBuilder::new();
        let a = builder.intern("g_count");
        let b = builder.intern("root");
        let a2 = builder.intern("g_count");
        assert_eq!(a, a2, "interning should deduplicate");

        let bytes = builder.encode();
        let pool = StringPool::decode(&bytes).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(a), Some("g_count"));
        assert_eq!(pool.get(b), Some("root"));
        assert_eq!(pool.get(99), None);
    }

    #[test]
    fn string_pool_empty() {
        let builder = StringPoolBuilder::new();
        let pool = StringPool::decode(&builder.encode()).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn string_pool_rejects_missing_terminator() {
        let mut bytes = StringPoolBuilder::new().encode();
        // Claim one entry pointing at bytes that do not exist.
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(b"abcd"); // no NUL
        assert!(StringPool::decode(&bytes).is_none());
    }

    #[test]
    fn string_pool_rejects_out_of_bounds_entry() {
        let mut builder = StringPoolBuilder::new();
        builder.intern("x");
        let mut bytes = builder.encode();
        // Corrupt the entry offset to point past the section.
        bytes[4..8].copy_from_slice(&1000u32.to_le_bytes());
        assert!(StringPool::decode(&bytes).is_none());
    }

    #[test]
    fn dependency_table_roundtrip() {
        let records = vec![
            DependencyRecord {
                name: 0,
                fingerprint: [0xab; 20],
            },
            DependencyRecord {
                name: 3,
                fingerprint: [0x01; 20],
            },
        ];
        let bytes = encode_dependency_table(&records);
        assert!(section_shape_ok(SectionId::DependencyTable, &bytes));
        assert_eq!(decode_dependency_table(&bytes).unwrap(), records);
    }

    #[test]
    fn pragma_list_roundtrip() {
        let records = vec![PragmaRecord { key: 1, value: 2 }];
        let bytes = encode_pragma_list(&records);
        assert_eq!(decode_pragma_list(&bytes).unwrap(), records);
    }

    #[test]
    fn object_slots_roundtrip() {
        let slots = vec![0xAAAA, 0xDEAD_BEEF_0000_0001];
        let bytes = encode_object_slots(&slots);
        assert!(section_shape_ok(SectionId::ObjectSlotList, &bytes));
        assert_eq!(decode_object_slots(&bytes).unwrap(), slots);
    }

    #[test]
    fn name_list_roundtrip() {
        let names = vec![0, 5, 2];
        let bytes = encode_name_list(&names);
        assert_eq!(decode_name_list(&bytes).unwrap(), names);
    }

    #[test]
    fn func_table_roundtrip() {
        let records = vec![
            FuncRecord {
                name: 0,
                signature: 2,
            },
            FuncRecord {
                name: 1,
                signature: 0,
            },
        ];
        let bytes = encode_func_table(&records);
        assert_eq!(decode_func_table(&bytes).unwrap(), records);
    }

    #[test]
    fn reloc_table_roundtrip() {
        let records = vec![RelocRecord {
            symbol: 4,
            offset: 0x40,
        }];
        let bytes = encode_reloc_table(&records);
        assert!(section_shape_ok(SectionId::RelocationTable, &bytes));
        assert_eq!(decode_reloc_table(&bytes).unwrap(), records);
    }

    #[test]
    fn table_size_rejects_truncated_section() {
        let records = vec![DependencyRecord {
            name: 0,
            fingerprint: [0; 20],
        }];
        let mut bytes = encode_dependency_table(&records);
        bytes.pop();
        assert!(!section_shape_ok(SectionId::DependencyTable, &bytes));
    }

    #[test]
    fn table_size_rejects_inflated_count() {
        let mut bytes = encode_object_slots(&[1, 2]);
        bytes[0..4].copy_from_slice(&100u32.to_le_bytes());
        assert!(!section_shape_ok(SectionId::ObjectSlotList, &bytes));
        assert!(decode_object_slots(&bytes).is_none());
    }

    #[test]
    fn align_up_boundaries() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(97), 104);
    }
}
