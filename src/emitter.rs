//! Emitter (component H, spec §4.I): lays a committed [`crate::editor::PlanKey`]
//! tree out as a fresh REGF byte image and hands it to a [`Writer`] sink.
//!
//! The layout strategy is deliberately simple: every cell — NK, VK, value
//! list, subkey list, data, and any DB chain — is packed depth-first into a
//! single growing hive bin, so nothing ever straddles a bin boundary and no
//! fixup pass is needed beyond the one post-order walk that assigns offsets.

use crate::cell_big_data::DATA_BLOCK_PAYLOAD_SIZE;
use crate::editor::{PlanKey, PlanValue};
use crate::err::Error;
use crate::hive_bin_header::{HiveBinHeader, HBIN_HEADER_SIZE};
use crate::reader::Reader;
use crate::reg_header::{RegHeader, RegHeaderBase};
use crate::util;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const KEY_COMP_NAME: u16 = 0x0020;
const VALUE_COMP_NAME: u16 = 0x0001;
const DATA_LENGTH_INLINE_FLAG: u32 = 0x8000_0000;
const USABLE_BLOCK_SIZE: usize = DATA_BLOCK_PAYLOAD_SIZE - 4;
/// Above this many children, a key's subkey list escalates from a flat
/// `li` to an `ri` indirection over multiple `li` chunks (spec's subkey
/// list variants). Chosen well under `u16::MAX` so neither the `li`'s nor
/// the `ri`'s own count field can overflow.
const SUBKEY_LIST_CHUNK: usize = 1024;

/// Sink for a finished hive image. `InMemorySink` and `AtomicFileSink` cover
/// the two cases the spec calls out; anything else (a network target, a
/// staged upload) is just another `Writer` impl.
pub trait Writer {
    fn write_hive(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// Captures the emitted bytes in memory; used by tests and by callers that
/// want to post-process the image themselves before touching a filesystem.
#[derive(Debug, Default)]
pub struct InMemorySink {
    pub bytes: Vec<u8>,
}

impl Writer for InMemorySink {
    fn write_hive(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.bytes = bytes.to_vec();
        Ok(())
    }
}

/// Writes to a sibling `.tmp` file, flushes and syncs it, then renames it
/// over the destination — so a crash mid-write never leaves a half-written
/// hive at `path`.
#[derive(Debug)]
pub struct AtomicFileSink {
    path: PathBuf,
}

impl AtomicFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AtomicFileSink { path: path.into() }
    }
}

impl Writer for AtomicFileSink {
    fn write_hive(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let tmp_path = sibling_tmp_path(&self.path);
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Controls to a committed-plan emission (spec §4.I).
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// Accepted for API symmetry with the spec's "repack" toggle; this
    /// emitter always performs a full single-bin repack, so both settings
    /// currently produce identical layouts.
    pub repack: bool,
    /// Overrides the header's last-modification timestamp; defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Encodes a key/value name the way newly written names are encoded (spec
/// §4.H Encoding): compressed (one byte per character) when every character
/// is plain ASCII, else UTF-16LE. Restricting the compressed path to ASCII
/// (rather than the full Windows-1252 byte range) avoids needing the
/// inverse of the 0x80-0x9F transcoding table and keeps the encoding a
/// lossless round trip.
fn encode_name(name: &str) -> (Vec<u8>, bool) {
    if name.is_ascii() {
        (name.as_bytes().to_vec(), true)
    } else {
        (name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(), false)
    }
}

/// Appends a cell (size header + payload, padded to 8 bytes) to `buf` and
/// returns its hive-relative offset.
fn append_cell(buf: &mut Vec<u8>, payload: &[u8]) -> u32 {
    let size_abs = util::align8(4 + payload.len() as u32);
    let offset = HBIN_HEADER_SIZE + buf.len() as u32;
    buf.extend_from_slice(&(-(size_abs as i32)).to_le_bytes());
    buf.extend_from_slice(payload);
    buf.resize(buf.len() + (size_abs as usize - 4 - payload.len()), 0);
    offset
}

/// Lays out a value's data (inline / direct cell / DB chain) and returns
/// `(data_offset, data_length)` ready to drop into a VK record (spec §4.H
/// `set_value` encoding rule).
fn emit_data(buf: &mut Vec<u8>, data: &[u8]) -> (u32, u32) {
    if data.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..data.len()].copy_from_slice(data);
        let data_offset = u32::from_le_bytes(inline);
        return (data_offset, DATA_LENGTH_INLINE_FLAG | data.len() as u32);
    }

    if data.len() <= DATA_BLOCK_PAYLOAD_SIZE {
        let offset = append_cell(buf, data);
        return (offset, data.len() as u32);
    }

    let mut block_offsets = Vec::new();
    for chunk in data.chunks(USABLE_BLOCK_SIZE) {
        let mut payload = chunk.to_vec();
        payload.extend_from_slice(&[0u8; 4]);
        block_offsets.push(append_cell(buf, &payload));
    }

    let mut blocklist_payload = Vec::with_capacity(block_offsets.len() * 4);
    for offset in &block_offsets {
        blocklist_payload.extend_from_slice(&offset.to_le_bytes());
    }
    let blocklist_offset = append_cell(buf, &blocklist_payload);

    let mut db_payload = Vec::with_capacity(12);
    db_payload.extend_from_slice(b"db");
    db_payload.extend_from_slice(&(block_offsets.len() as u16).to_le_bytes());
    db_payload.extend_from_slice(&blocklist_offset.to_le_bytes());
    db_payload.extend_from_slice(&0u32.to_le_bytes());
    let db_offset = append_cell(buf, &db_payload);

    (db_offset, data.len() as u32)
}

fn emit_value(buf: &mut Vec<u8>, value: &PlanValue) -> u32 {
    let (data_offset, data_length) = emit_data(buf, &value.data);
    let (name_bytes, compressed) = encode_name(&value.name);

    let mut payload = Vec::new();
    payload.extend_from_slice(b"vk");
    payload.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    payload.extend_from_slice(&data_length.to_le_bytes());
    payload.extend_from_slice(&data_offset.to_le_bytes());
    payload.extend_from_slice(&(value.value_type as u32).to_le_bytes());
    payload.extend_from_slice(&(if compressed { VALUE_COMP_NAME } else { 0 }).to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&name_bytes);

    append_cell(buf, &payload)
}

/// Emits one `li` list of NK offsets and returns its hive-relative offset.
fn emit_li(buf: &mut Vec<u8>, offsets: &[u32]) -> u32 {
    let mut payload = Vec::with_capacity(2 + offsets.len() * 4);
    payload.extend_from_slice(b"li");
    payload.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
    for offset in offsets {
        payload.extend_from_slice(&offset.to_le_bytes());
    }
    append_cell(buf, &payload)
}

/// Lays out a key's subkey list: a single `li` when the child count fits,
/// otherwise an `ri` indirection over multiple `li` chunks (spec's subkey
/// list variants — RI exists precisely so a key isn't bounded by one list's
/// capacity).
fn emit_subkey_list(buf: &mut Vec<u8>, child_offsets: &[u32]) -> u32 {
    if child_offsets.is_empty() {
        return util::NIL_OFFSET;
    }
    if child_offsets.len() <= SUBKEY_LIST_CHUNK {
        return emit_li(buf, child_offsets);
    }

    let list_offsets: Vec<u32> = child_offsets
        .chunks(SUBKEY_LIST_CHUNK)
        .map(|chunk| emit_li(buf, chunk))
        .collect();

    let mut payload = Vec::with_capacity(2 + list_offsets.len() * 4);
    payload.extend_from_slice(b"ri");
    payload.extend_from_slice(&(list_offsets.len() as u16).to_le_bytes());
    for offset in &list_offsets {
        payload.extend_from_slice(&offset.to_le_bytes());
    }
    append_cell(buf, &payload)
}

/// Re-attaches a key's security descriptor on repack. True cross-key ring
/// sharing isn't reconstructed; each distinct source offset is re-emitted
/// once as its own self-referential singleton ring (`flink == blink ==`
/// its new offset, `reference_count = 1`) and cached by old offset so a
/// descriptor shared by many keys in the source hive is still only
/// written once per commit.
fn emit_security(
    buf: &mut Vec<u8>,
    reader: &Reader,
    sk_cache: &mut HashMap<u32, u32>,
    old_offset: u32,
) -> Result<u32, Error> {
    if old_offset == util::NIL_OFFSET {
        return Ok(util::NIL_OFFSET);
    }
    if let Some(&cached) = sk_cache.get(&old_offset) {
        return Ok(cached);
    }

    let descriptors = reader.security_descriptors_at(old_offset)?;
    let descriptor_bytes = descriptors
        .first()
        .map(|d| d.security_descriptor.clone())
        .unwrap_or_default();

    let offset = HBIN_HEADER_SIZE + buf.len() as u32;
    let mut payload = Vec::with_capacity(16 + descriptor_bytes.len());
    payload.extend_from_slice(b"sk");
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&offset.to_le_bytes()); // flink: self
    payload.extend_from_slice(&offset.to_le_bytes()); // blink: self
    payload.extend_from_slice(&1u32.to_le_bytes()); // reference_count
    payload.extend_from_slice(&(descriptor_bytes.len() as u32).to_le_bytes());
    payload.extend_from_slice(&descriptor_bytes);

    let written_offset = append_cell(buf, &payload);
    sk_cache.insert(old_offset, written_offset);
    Ok(written_offset)
}

fn emit_key(
    buf: &mut Vec<u8>,
    reader: &Reader,
    sk_cache: &mut HashMap<u32, u32>,
    key: &PlanKey,
) -> Result<u32, Error> {
    let value_offsets: Vec<u32> = key.values.iter().map(|v| emit_value(buf, v)).collect();
    let key_values_list_offset = if value_offsets.is_empty() {
        util::NIL_OFFSET
    } else {
        let mut payload = Vec::with_capacity(value_offsets.len() * 4);
        for offset in &value_offsets {
            payload.extend_from_slice(&offset.to_le_bytes());
        }
        append_cell(buf, &payload)
    };

    let child_offsets: Vec<u32> = key
        .children
        .iter()
        .map(|c| emit_key(buf, reader, sk_cache, c))
        .collect::<Result<Vec<_>, _>>()?;
    let sub_keys_list_offset = emit_subkey_list(buf, &child_offsets);

    let security_key_offset = emit_security(buf, reader, sk_cache, key.security_key_offset)?;

    let (name_bytes, compressed) = encode_name(&key.name);
    let mut payload = Vec::new();
    payload.extend_from_slice(b"nk");
    payload.extend_from_slice(&(if compressed { KEY_COMP_NAME } else { 0 }).to_le_bytes());
    payload.extend_from_slice(&util::get_filetime_from_date_time(key.last_written).to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes()); // access_bits
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // parent_key_offset, not tracked by the plan tree
    payload.extend_from_slice(&(child_offsets.len() as u32).to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes()); // number_of_volatile_sub_keys
    payload.extend_from_slice(&sub_keys_list_offset.to_le_bytes());
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // volatile_sub_keys_list_offset
    payload.extend_from_slice(&(value_offsets.len() as u32).to_le_bytes());
    payload.extend_from_slice(&key_values_list_offset.to_le_bytes());
    payload.extend_from_slice(&security_key_offset.to_le_bytes());
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // class_name_offset
    payload.extend_from_slice(&0u32.to_le_bytes()); // max_sub_key_name_length
    payload.extend_from_slice(&0u32.to_le_bytes()); // max_sub_key_class_length
    payload.extend_from_slice(&0u32.to_le_bytes()); // max_value_name_length
    payload.extend_from_slice(&0u32.to_le_bytes()); // max_value_data_length
    payload.extend_from_slice(&0u32.to_le_bytes()); // work_var
    payload.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes()); // class_name_length
    payload.extend_from_slice(&name_bytes);

    Ok(append_cell(buf, &payload))
}

/// Lays `root` out as a single hive bin, builds a matching REGF header
/// derived from `reader`'s (preserved filename, version, clustering factor,
/// bumped sequence numbers), and hands the finished image to `writer`.
pub fn emit(reader: &Reader, root: &PlanKey, opts: CommitOptions, writer: &mut dyn Writer) -> Result<(), Error> {
    let mut body = Vec::new();
    let mut sk_cache = HashMap::new();
    let root_offset = emit_key(&mut body, reader, &mut sk_cache, root)?;

    let bin_size = util::align4k(HBIN_HEADER_SIZE + body.len() as u32);
    let free_bytes = bin_size - (HBIN_HEADER_SIZE + body.len() as u32);
    if free_bytes > 0 {
        body.extend_from_slice(&(free_bytes as i32).to_le_bytes());
        body.resize(body.len() + free_bytes as usize - 4, 0);
    }

    let mut hbin = HiveBinHeader { offset: 0, size: bin_size }.to_bytes();
    hbin.extend_from_slice(&body);
    hbin.resize(bin_size as usize, 0);

    let source = reader.info();
    let base = RegHeaderBase {
        primary_sequence_number: source.primary_sequence_number + 1,
        secondary_sequence_number: source.secondary_sequence_number + 1,
        last_modification_date_and_time: opts.timestamp.unwrap_or_else(Utc::now),
        major_version: source.major_version,
        minor_version: source.minor_version,
        file_type: source.file_type,
        format: source.format,
        root_cell_offset_relative: root_offset as i32,
        hive_bins_data_size: bin_size,
        clustering_factor: source.clustering_factor,
        filename: source.filename.clone(),
        unk2: source.unk2.clone(),
        checksum: 0,
        logs: Default::default(),
    };
    let header = RegHeader { base, ext: reader.header().ext.clone() };

    let mut image = header.to_bytes();
    image.extend_from_slice(&hbin);
    writer.write_hive(&image)
}
