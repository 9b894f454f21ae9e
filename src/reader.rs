//! Public reader surface: open, navigate, and typed-read a hive (spec
//! §4.C/§4.D/§4.E), backed by the cell index and record decoders.

use crate::cell_big_data::DATA_BLOCK_PAYLOAD_SIZE;
use crate::cell_index::CellIndex;
use crate::cell_key_node::CellKeyNode;
use crate::cell_key_security::{self, CellKeySecurity};
use crate::cell_key_value::{CellKeyValue, RegType};
use crate::cell_value::CellValue;
use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::err::Error;
use crate::filter;
use crate::hive_bin_cell;
use crate::reg_header::{RegHeader, RegHeaderBase, HEADER_SIZE};
use crate::state::State;
use crate::sub_key_list_li::SubKeyListLi;
use crate::sub_key_list_lf::SubKeyListLf;
use crate::sub_key_list_ri::SubKeyListRi;
use crate::util;
use nom::Finish;
use serde::Serialize;

#[derive(Clone, Copy, Debug)]
pub struct ReaderOptions {
    pub zero_copy: bool,
    pub tolerant: bool,
    pub max_cell_size: u32,
    pub collect_diagnostics: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            zero_copy: true,
            tolerant: false,
            max_cell_size: 64 * 1024 * 1024,
            collect_diagnostics: false,
        }
    }
}

/// Content digests for a value's raw bytes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ValueDigest {
    #[serde(serialize_with = "util::data_as_hex")]
    pub md5: Vec<u8>,
    #[serde(serialize_with = "util::data_as_hex")]
    pub blake3: Vec<u8>,
}

pub struct Reader<'a> {
    file_buffer: &'a [u8],
    header: RegHeader,
    index: CellIndex,
    options: ReaderOptions,
    diagnostics: Option<DiagnosticCollector>,
}

impl<'a> Reader<'a> {
    /// Parses the REGF header and validates every HBIN (spec §4.C open
    /// algorithm). No other decoding happens here.
    pub fn open(file_buffer: &'a [u8], options: ReaderOptions) -> Result<Self, Error> {
        if file_buffer.len() < HEADER_SIZE {
            return Err(Error::truncated("file is shorter than the 4096-byte REGF header"));
        }
        let (_, header) = RegHeader::from_bytes(&file_buffer[..HEADER_SIZE])
            .finish()
            .map_err(|e| Error::Format { detail: format!("{:?}", e) })?;

        let expected_len = HEADER_SIZE as u64 + header.base.hive_bins_data_size as u64;
        if file_buffer.len() as u64 != expected_len {
            return Err(Error::corrupt(format!(
                "file size {} does not equal 4096 + hive_bins_data_size ({})",
                file_buffer.len(),
                expected_len
            )));
        }

        let index = CellIndex::build(file_buffer, header.base.hive_bins_data_size)?;
        let diagnostics = if options.collect_diagnostics {
            Some(DiagnosticCollector::new())
        } else {
            None
        };

        Ok(Reader { file_buffer, header, index, options, diagnostics })
    }

    pub fn info(&self) -> &RegHeaderBase {
        &self.header.base
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn file_buffer(&self) -> &'a [u8] {
        self.file_buffer
    }

    pub fn index(&self) -> &CellIndex {
        &self.index
    }

    pub fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .as_ref()
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }

    fn record(&self, diagnostic: Diagnostic) {
        if let Some(collector) = &self.diagnostics {
            collector.record(diagnostic);
        }
    }

    pub fn state(&self) -> State<'a> {
        State::new(self.file_buffer, util::HBIN_START_OFFSET)
    }

    fn key_node_at(&self, offset: u32, path: String, is_root: bool) -> Result<CellKeyNode, Error> {
        let resolved = self.index.resolve(self.file_buffer, offset, self.options.max_cell_size)?;
        let (_, mut node) = CellKeyNode::from_bytes(resolved.as_slice())
            .finish()
            .map_err(|e| Error::corrupt(format!("nk at hive-relative {:#x}: {:?}", offset, e)))?;
        node.path = path;
        node.offset = offset;
        node.is_key_root = is_root;
        node.sub_values = self.values_uncached(&node)?;
        Ok(node)
    }

    pub fn root(&self) -> Result<CellKeyNode, Error> {
        let offset = self.header.base.root_cell_offset_relative;
        if offset < 0 {
            return Err(Error::corrupt("root cell offset is negative"));
        }
        let node = self.key_node_at(offset as u32, String::new(), true)?;
        Ok(CellKeyNode { path: node.key_name.clone(), ..node })
    }

    /// Expands a key's subkey list (LI / LF / LH, or RI indirection) into
    /// its concrete NK offsets.
    fn subkey_offsets(&self, list_offset: u32) -> Result<Vec<u32>, Error> {
        let resolved = self.index.resolve(self.file_buffer, list_offset, self.options.max_cell_size)?;
        let bytes = resolved.as_slice();
        let tag = bytes.get(4..6).ok_or_else(|| Error::truncated("subkey list cell too short for a signature"))?;
        match tag {
            b"li" => {
                let (_, li) = SubKeyListLi::from_bytes(bytes)
                    .finish()
                    .map_err(|e| Error::corrupt(format!("li list: {:?}", e)))?;
                Ok(li.offsets)
            }
            b"lf" | b"lh" => {
                let (_, lf) = SubKeyListLf::from_bytes(bytes)
                    .finish()
                    .map_err(|e| Error::corrupt(format!("lf/lh list: {:?}", e)))?;
                Ok(lf.items.iter().map(|i| i.named_key_offset).collect())
            }
            b"ri" => {
                let (_, ri) = SubKeyListRi::from_bytes(bytes)
                    .finish()
                    .map_err(|e| Error::corrupt(format!("ri list: {:?}", e)))?;
                let mut all = Vec::new();
                for child_offset in &ri.list_offsets {
                    all.extend(self.subkey_offsets(*child_offset)?);
                }
                Ok(all)
            }
            other => Err(Error::Unsupported {
                detail: format!("unrecognized subkey list signature {:?}", String::from_utf8_lossy(other)),
            }),
        }
    }

    /// Subkey enumeration (spec §4.C navigation).
    pub fn subkeys(&self, node: &CellKeyNode) -> Result<Vec<CellKeyNode>, Error> {
        if !node.has_sub_keys() {
            return Ok(Vec::new());
        }
        let offsets = self.subkey_offsets(node.detail.sub_keys_list_offset)?;
        offsets
            .into_iter()
            .map(|off| self.key_node_at(off, format!("{}\\{{name}}", node.path), false))
            .collect::<Result<Vec<_>, _>>()
            .map(|mut children| {
                // Fill in each child's own name now that it's decoded.
                for child in &mut children {
                    child.path = format!("{}\\{}", node.path, child.key_name);
                }
                children
            })
    }

    /// Value enumeration (spec §4.C navigation): an array of `ValueCount`
    /// VK offsets, decoded but with content left unresolved (callers read
    /// lazily via `stat_value`/typed accessors).
    fn values_uncached(&self, node: &CellKeyNode) -> Result<Vec<CellKeyValue>, Error> {
        if node.detail.number_of_key_values == 0 || node.detail.key_values_list_offset == util::NIL_OFFSET {
            return Ok(Vec::new());
        }
        let resolved = self
            .index
            .resolve(self.file_buffer, node.detail.key_values_list_offset, self.options.max_cell_size)?;
        let bytes = resolved.as_slice();
        let count = node.detail.number_of_key_values as usize;
        let list_payload = bytes
            .get(4..4 + count * 4)
            .ok_or_else(|| Error::truncated("value list shorter than ValueCount * 4"))?;
        list_payload
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .map(|off| self.value_at(off))
            .collect()
    }

    fn value_at(&self, offset: u32) -> Result<CellKeyValue, Error> {
        let resolved = self.index.resolve(self.file_buffer, offset, self.options.max_cell_size)?;
        let (_, mut value) = CellKeyValue::from_bytes(resolved.as_slice())
            .finish()
            .map_err(|e| Error::corrupt(format!("vk at hive-relative {:#x}: {:?}", offset, e)))?;
        value.offset = offset;
        Ok(value)
    }

    pub fn values(&self, node: &CellKeyNode) -> Result<Vec<CellKeyValue>, Error> {
        self.values_uncached(node)
    }

    /// Resolves a key's security descriptor ring (spec's ACL Non-goal still
    /// leaves the descriptor itself opaque; this just walks the SK ring and
    /// returns the raw entries).
    pub fn security_descriptors(&self, node: &CellKeyNode) -> Result<Vec<CellKeySecurity>, Error> {
        if node.detail.security_key_offset == util::NIL_OFFSET {
            return Ok(Vec::new());
        }
        self.security_descriptors_at(node.detail.security_key_offset)
    }

    /// Same as `security_descriptors`, but takes a raw hive-relative SK
    /// offset directly (used by the diagnostic scan, which dedups rings
    /// shared across many keys before walking them).
    pub(crate) fn security_descriptors_at(&self, security_key_offset: u32) -> Result<Vec<CellKeySecurity>, Error> {
        cell_key_security::read_cell_key_security(
            self.file_buffer,
            security_key_offset,
            util::HBIN_START_OFFSET,
        )
    }

    pub fn find(&self, path: &str) -> Result<CellKeyNode, Error> {
        let segments = filter::normalize_path(path);
        let mut current = self.root()?;
        for segment in segments {
            let children = self.subkeys(&current)?;
            let next = children
                .into_iter()
                .find(|c| util::names_eq_ci(&c.key_name, &segment))
                .ok_or_else(|| Error::not_found(format!("no subkey named {:?}", segment)))?;
            current = next;
        }
        Ok(current)
    }

    /// Pre-order walk from `node`; `visit` returning `Err` aborts the walk.
    pub fn walk<F>(&self, node: &CellKeyNode, visit: &mut F) -> Result<(), Error>
    where
        F: FnMut(&CellKeyNode) -> Result<(), Error>,
    {
        visit(node)?;
        for child in self.subkeys(node)? {
            self.walk(&child, visit)?;
        }
        Ok(())
    }

    /// Resolves a value's content according to its own declared type.
    pub fn stat_value(&self, value: &CellKeyValue) -> Result<CellValue, Error> {
        let raw = value.read_bytes(&self.state(), self.options.tolerant)?;
        let content = CellValue::from_raw(value.detail.value_type, &raw)?;
        if raw.len() < value.declared_length() as usize {
            self.record(Diagnostic::truncated_value(&value.value_name));
        }
        Ok(content)
    }

    fn typed_read(&self, value: &CellKeyValue, expected: RegType) -> Result<Vec<u8>, Error> {
        if value.detail.value_type != expected {
            return Err(Error::TypeMismatch {
                expected: format!("{:?}", expected),
                found: format!("{:?}", value.detail.value_type),
            });
        }
        value.read_bytes(&self.state(), self.options.tolerant)
    }

    pub fn read_string(&self, value: &CellKeyValue) -> Result<String, Error> {
        let raw = match value.detail.value_type {
            RegType::Sz | RegType::ExpandSz => value.read_bytes(&self.state(), self.options.tolerant)?,
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Sz or ExpandSz".to_string(),
                    found: format!("{:?}", other),
                })
            }
        };
        match CellValue::from_raw(value.detail.value_type, &raw)? {
            CellValue::ValueString(s) => Ok(s),
            _ => unreachable!("Sz/ExpandSz always decode to ValueString"),
        }
    }

    pub fn read_multi_string(&self, value: &CellKeyValue) -> Result<Vec<String>, Error> {
        let raw = self.typed_read(value, RegType::MultiSz)?;
        match CellValue::from_raw(RegType::MultiSz, &raw)? {
            CellValue::ValueMultiString(v) => Ok(v),
            _ => unreachable!("MultiSz always decodes to ValueMultiString"),
        }
    }

    pub fn read_dword(&self, value: &CellKeyValue) -> Result<u32, Error> {
        let raw = match value.detail.value_type {
            RegType::Dword | RegType::DwordBigEndian => value.read_bytes(&self.state(), self.options.tolerant)?,
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Dword or DwordBigEndian".to_string(),
                    found: format!("{:?}", other),
                })
            }
        };
        match CellValue::from_raw(value.detail.value_type, &raw)? {
            CellValue::ValueU32(v) => Ok(v),
            _ => unreachable!("Dword/DwordBigEndian always decode to ValueU32"),
        }
    }

    pub fn read_qword(&self, value: &CellKeyValue) -> Result<u64, Error> {
        let raw = self.typed_read(value, RegType::Qword)?;
        match CellValue::from_raw(RegType::Qword, &raw)? {
            CellValue::ValueU64(v) => Ok(v),
            _ => unreachable!("Qword always decodes to ValueU64"),
        }
    }

    pub fn read_bytes(&self, value: &CellKeyValue) -> Result<Vec<u8>, Error> {
        value.read_bytes(&self.state(), self.options.tolerant)
    }

    /// MD5 and BLAKE3 digests of a value's raw content, for callers doing
    /// dedup or integrity comparison against a known-good hive.
    pub fn digest_value(&self, value: &CellKeyValue) -> Result<ValueDigest, Error> {
        let raw = value.read_bytes(&self.state(), self.options.tolerant)?;
        Ok(ValueDigest {
            md5: md5::compute(&raw).0.to_vec(),
            blake3: blake3::hash(&raw).as_bytes().to_vec(),
        })
    }

    /// Runs the seven-phase active scan (spec §4.G).
    pub fn diagnose(&self) -> Result<Vec<Diagnostic>, Error> {
        crate::diagnostics::diagnose(self)
    }

    pub(crate) fn header(&self) -> &RegHeader {
        &self.header
    }

    /// Walks every HBIN cataloging allocated cells, for the diagnostic
    /// engine's orphan scan (spec §4.G phase 3).
    pub(crate) fn catalog_allocated_cells(&self) -> Result<Vec<u32>, Error> {
        let mut offsets = Vec::new();
        for bin in &self.index.bins {
            let mut cursor = bin.abs_offset + crate::hive_bin_header::HBIN_HEADER_SIZE;
            while cursor < bin.abs_end() {
                let header_bytes = self
                    .file_buffer
                    .get(cursor as usize..cursor as usize + 4)
                    .ok_or_else(|| Error::bounds("cell header exceeds its hbin"))?;
                let (_, size) = hive_bin_cell::parse_cell_size(header_bytes)
                    .map_err(|e| Error::Nom { detail: format!("{:?}", e) })?;
                let size_abs = size.unsigned_abs();
                if size_abs < 8 || size_abs % 8 != 0 {
                    return Err(Error::corrupt(format!("cell at {:#x} has invalid size {}", cursor, size_abs)));
                }
                if hive_bin_cell::is_allocated(size) {
                    offsets.push(cursor - util::HBIN_START_OFFSET);
                }
                cursor += size_abs;
            }
        }
        Ok(offsets)
    }
}

trait HiveBinEntryExt {
    fn abs_end(&self) -> u32;
}
impl HiveBinEntryExt for crate::cell_index::HiveBinEntry {
    fn abs_end(&self) -> u32 {
        self.abs_offset + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg_header::{FileBaseBlockReserved, FileFormat, FileType, RegHeaderBase, RegHeaderExtended};
    use crate::hive_bin_header::{HiveBinHeader, HBIN_HEADER_SIZE};
    use chrono::Utc;

    fn sample_base() -> RegHeaderBase {
        RegHeaderBase {
            primary_sequence_number: 1,
            secondary_sequence_number: 1,
            last_modification_date_and_time: Utc::now(),
            major_version: 1,
            minor_version: 5,
            file_type: FileType::Primary,
            format: FileFormat::DirectMemoryLoad,
            root_cell_offset_relative: 0x20,
            hive_bins_data_size: 0x1000,
            clustering_factor: 1,
            filename: "TEST".to_string(),
            unk2: Vec::new(),
            checksum: 0,
            logs: Default::default(),
        }
    }

    fn encode_nk_leaf(name: &str) -> Vec<u8> {
        let name_bytes = name.as_bytes().to_vec();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"nk");
        payload.extend_from_slice(&0x0020u16.to_le_bytes());
        payload.extend_from_slice(&0u64.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&name_bytes);

        let size_abs = util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = (-(size_abs as i32)).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    fn minimal_hive() -> Vec<u8> {
        let ext = RegHeaderExtended {
            reserved: FileBaseBlockReserved::from_bytes(&[0u8; 3576]).finish().unwrap().1,
            boot_type: 0,
            boot_recover: 0,
        };
        let header = RegHeader { base: sample_base(), ext };
        let mut bytes = header.to_bytes();

        let nk = encode_nk_leaf("");
        let mut hbin_body = nk;
        // trailing free cell consuming the rest of the bin.
        let free_size = 0x1000 - HBIN_HEADER_SIZE - hbin_body.len() as u32;
        hbin_body.extend_from_slice(&(free_size as i32).to_le_bytes());
        hbin_body.resize(hbin_body.len() + (free_size as usize - 4), 0);

        let mut hbin = HiveBinHeader { offset: 0, size: 0x1000 }.to_bytes();
        hbin.extend_from_slice(&hbin_body);
        hbin.resize(0x1000, 0);

        bytes.extend_from_slice(&hbin);
        bytes
    }

    #[test]
    fn test_open_minimal_hive() {
        let bytes = minimal_hive();
        let reader = Reader::open(&bytes, ReaderOptions::default()).unwrap();
        let root = reader.root().unwrap();
        assert_eq!("", root.key_name);
        assert!(!root.has_sub_keys());
        assert!(!root.has_values());
    }

    #[test]
    fn test_open_rejects_bad_signature() {
        let mut bytes = minimal_hive();
        bytes[0] = b'x';
        assert!(Reader::open(&bytes, ReaderOptions::default()).is_err());
    }

    #[test]
    fn test_digest_value_matches_direct_hashes() {
        use crate::cell_key_value::{CellKeyValue, CellKeyValueDetail, CellKeyValueFlags, RegType};
        use crate::log::Logs;

        let bytes = minimal_hive();
        let reader = Reader::open(&bytes, ReaderOptions::default()).unwrap();

        let raw: u32 = 0x1122_3344;
        let value = CellKeyValue {
            detail: CellKeyValueDetail {
                value_type: RegType::Dword,
                flags: CellKeyValueFlags::empty(),
                data_length: 0x8000_0004,
                data_offset: raw,
                padding: 0,
            },
            size: 0,
            value_name: "Count".to_string(),
            value_content: None,
            offset: 0,
            logs: Logs::default(),
        };

        let digest = reader.digest_value(&value).unwrap();
        let expected = raw.to_le_bytes();
        assert_eq!(md5::compute(&expected).0.to_vec(), digest.md5);
        assert_eq!(blake3::hash(&expected).as_bytes().to_vec(), digest.blake3);
    }

    fn encode_nk_leaf_with_security(name: &str, security_key_offset: u32) -> Vec<u8> {
        let name_bytes = name.as_bytes().to_vec();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"nk");
        payload.extend_from_slice(&0x0020u16.to_le_bytes());
        payload.extend_from_slice(&0u64.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&security_key_offset.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&name_bytes);

        let size_abs = util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = (-(size_abs as i32)).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    fn encode_sk(flink: u32, blink: u32, refcount: u32, descriptor: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"sk");
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&flink.to_le_bytes());
        payload.extend_from_slice(&blink.to_le_bytes());
        payload.extend_from_slice(&refcount.to_le_bytes());
        payload.extend_from_slice(&(descriptor.len() as u32).to_le_bytes());
        payload.extend_from_slice(descriptor);
        let size_abs = util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = (-(size_abs as i32)).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn test_security_descriptors_resolves_sk_ring() {
        let descriptor = vec![1, 0, 4, 144, 128, 0, 0, 0];
        let nk_len = encode_nk_leaf_with_security("", 0).len() as u32;
        let sk_offset = HBIN_HEADER_SIZE + nk_len;
        let sk = encode_sk(sk_offset, sk_offset, 1, &descriptor);
        let nk = encode_nk_leaf_with_security("", sk_offset);

        let ext = RegHeaderExtended {
            reserved: FileBaseBlockReserved::from_bytes(&[0u8; 3576]).finish().unwrap().1,
            boot_type: 0,
            boot_recover: 0,
        };
        let header = RegHeader { base: sample_base(), ext };
        let mut bytes = header.to_bytes();

        let mut hbin_body = nk;
        hbin_body.extend_from_slice(&sk);
        let free_size = 0x1000 - HBIN_HEADER_SIZE - hbin_body.len() as u32;
        hbin_body.extend_from_slice(&(free_size as i32).to_le_bytes());
        hbin_body.resize(hbin_body.len() + (free_size as usize - 4), 0);

        let mut hbin = HiveBinHeader { offset: 0, size: 0x1000 }.to_bytes();
        hbin.extend_from_slice(&hbin_body);
        hbin.resize(0x1000, 0);
        bytes.extend_from_slice(&hbin);

        let reader = Reader::open(&bytes, ReaderOptions::default()).unwrap();
        let root = reader.root().unwrap();
        let descriptors = reader.security_descriptors(&root).unwrap();
        assert_eq!(1, descriptors.len());
        assert_eq!(descriptor, descriptors[0].security_descriptor);
        assert_eq!(1, descriptors[0].detail.reference_count);
    }
}
