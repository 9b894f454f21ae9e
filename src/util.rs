//! Bounded byte primitives shared by every decoder: little-endian loads,
//! alignment helpers, checked arithmetic, and the name/timestamp decoding
//! rules from the format spec.

use crate::err::Error;
use crate::log::{LogCode, Logs};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serializer;
use winstructs::guid::Guid;

/// FILETIME epoch (1601-01-01 UTC) expressed as seconds before the Unix epoch.
const FILETIME_EPOCH_DIFF_SECONDS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SECOND: i64 = 10_000_000;

/// Cell allocations are always 8-byte aligned.
pub const CELL_ALIGNMENT: u32 = 8;
/// Hive bins are always 4 KiB aligned.
pub const BIN_ALIGNMENT: u32 = 0x1000;
/// Size of the REGF base block / first hive bin offset.
pub const HBIN_START_OFFSET: u32 = 0x1000;
/// Sentinel hive-relative offset meaning "absent" (no subkey list, no
/// security descriptor, no class name, ...).
pub const NIL_OFFSET: u32 = 0xFFFF_FFFF;

/// Rounds `value` up to the next multiple of 8.
pub fn align8(value: u32) -> u32 {
    (value + (CELL_ALIGNMENT - 1)) & !(CELL_ALIGNMENT - 1)
}

/// Rounds `value` up to the next multiple of 0x1000.
pub fn align4k(value: u32) -> u32 {
    (value + (BIN_ALIGNMENT - 1)) & !(BIN_ALIGNMENT - 1)
}

/// Checked addition of two offsets/sizes. Returns `(sum, true)` on success,
/// `(0, false)` on overflow; callers must check the flag before trusting the
/// sum — this guards the scaling-by-element-size arithmetic that untrusted
/// count fields feed into.
pub fn checked_add_u32(a: u32, b: u32) -> (u32, bool) {
    match a.checked_add(b) {
        Some(sum) => (sum, true),
        None => (0, false),
    }
}

/// Reads a bounded little-endian `u16` at `offset`. Never panics on
/// untrusted input.
pub fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .map(|s| u16::from_le_bytes([s[0], s[1]]))
}

/// Reads a bounded little-endian `u32` at `offset`.
pub fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

/// Reads a bounded little-endian `i32` at `offset`.
pub fn read_i32_le(data: &[u8], offset: usize) -> Option<i32> {
    read_u32_le(data, offset).map(|v| v as i32)
}

/// Reads a bounded little-endian `u64` at `offset`.
pub fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8).map(|s| {
        u64::from_le_bytes([
            s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7],
        ])
    })
}

/// Writes a little-endian `u16` into `buf` at `offset`. `buf` must already
/// have room; this is used only by paths that have pre-sized their output.
pub fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Writes a little-endian `u32` into `buf` at `offset`.
pub fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Writes a little-endian `i32` into `buf` at `offset`.
pub fn write_i32_le(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Writes a little-endian `u64` into `buf` at `offset`.
pub fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Converts a Windows FILETIME (100ns ticks since 1601-01-01 UTC) to a
/// `chrono` timestamp. Out-of-range values clamp to the Unix epoch rather
/// than panicking, since this is frequently fed adversarial input.
pub fn get_date_time_from_filetime(filetime: u64) -> DateTime<Utc> {
    let ticks = filetime as i64;
    let seconds = ticks / FILETIME_TICKS_PER_SECOND - FILETIME_EPOCH_DIFF_SECONDS;
    let nanos = (ticks % FILETIME_TICKS_PER_SECOND) * 100;
    let naive = NaiveDateTime::from_timestamp_opt(seconds, nanos.max(0) as u32)
        .unwrap_or_else(|| NaiveDateTime::from_timestamp_opt(0, 0).unwrap());
    DateTime::from_utc(naive, Utc)
}

/// Converts a `chrono` timestamp back to a Windows FILETIME, the inverse of
/// [`get_date_time_from_filetime`].
pub fn get_filetime_from_date_time(dt: DateTime<Utc>) -> u64 {
    let seconds = dt.timestamp() + FILETIME_EPOCH_DIFF_SECONDS;
    let nanos = dt.timestamp_subsec_nanos() as i64;
    ((seconds * FILETIME_TICKS_PER_SECOND) + nanos / 100) as u64
}

/// Decodes a name stored "compressed" (one byte per character). ASCII bytes
/// pass through as-is; anything with the high bit set is treated as
/// Windows-1252 and transcoded to UTF-8.
pub fn read_compressed_name(bytes: &[u8]) -> String {
    if bytes.iter().all(|&b| b < 0x80) {
        // ASCII is valid UTF-8 unchanged.
        return String::from_utf8_lossy(bytes).into_owned();
    }
    bytes.iter().map(|&b| windows_1252_to_char(b)).collect()
}

/// Decodes a UTF-16LE name, handling surrogate pairs. An odd-length buffer
/// is a malformed name, not a recoverable truncation, so it's rejected
/// outright rather than silently dropping its last byte.
pub fn read_utf16_le_name(bytes: &[u8], logs: &mut Logs, field_name: &str) -> Result<String, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::corrupt(format!(
            "{}: odd-length UTF-16LE name ({} bytes)",
            field_name,
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let mut out = String::with_capacity(units.len());
    let mut iter = units.into_iter().peekable();
    while let Some(unit) = iter.next() {
        if (0xD800..=0xDBFF).contains(&unit) {
            if let Some(&lo) = iter.peek() {
                if (0xDC00..=0xDFFF).contains(&lo) {
                    iter.next();
                    let code_point =
                        0x10000 + (((unit - 0xD800) as u32) << 10) + (lo - 0xDC00) as u32;
                    if let Some(c) = char::from_u32(code_point) {
                        out.push(c);
                        continue;
                    }
                }
            }
            // Lone surrogate: a Rust `String` can't hold an unpaired
            // UTF-16 code unit (it would need a WTF-8 string type, which
            // this crate doesn't carry), so it's substituted and flagged
            // rather than dropped silently.
            logs.add(
                LogCode::WarningConversion,
                &format!("{}: lone surrogate {:#06x} replaced with U+FFFD", field_name, unit),
            );
            out.push('\u{FFFD}');
        } else if let Some(c) = char::from_u32(unit as u32) {
            out.push(c);
        } else {
            logs.add(
                LogCode::WarningConversion,
                &format!("{}: invalid UTF-16 code unit {:#06x} replaced with U+FFFD", field_name, unit),
            );
            out.push('\u{FFFD}');
        }
    }
    Ok(out)
}

/// Reads a fixed-width UTF-16LE string, up to `max_len_bytes`, stopping at
/// the first NUL code unit. Used for the header's embedded filename field.
pub fn read_utf16_le_string(
    bytes: &[u8],
    max_len_bytes: usize,
    logs: &mut Logs,
    field_name: &str,
) -> Result<String, Error> {
    let bytes = &bytes[..bytes.len().min(max_len_bytes)];
    let nul_index = bytes
        .chunks_exact(2)
        .position(|c| c == [0, 0])
        .map(|i| i * 2)
        .unwrap_or(bytes.len());
    read_utf16_le_name(&bytes[..nul_index], logs, field_name)
}

fn windows_1252_to_char(byte: u8) -> char {
    // The Windows-1252 table differs from Latin-1 only in 0x80..=0x9F.
    const HIGH_TABLE: [char; 32] = [
        '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}',
        '\u{017D}', '\u{FFFD}', '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}',
        '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
    ];
    if byte < 0x80 || byte >= 0xA0 {
        byte as char
    } else {
        HIGH_TABLE[(byte - 0x80) as usize]
    }
}

/// Decodes a GUID stored as a raw 16-byte buffer, recording a diagnostic
/// note (rather than failing) if the buffer is short.
pub fn get_guid_from_buffer(bytes: &[u8], logs: &mut Logs) -> Guid {
    match Guid::from_buffer(bytes) {
        Ok(guid) => guid,
        Err(_) => {
            logs.add(LogCode::WarningConversion, "failed to parse GUID, using nil");
            Guid::from_buffer(&[0u8; 16]).expect("nil guid is always parseable")
        }
    }
}

/// `serde` helper: serializes a byte buffer as a lowercase hex string.
pub fn data_as_hex<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    serializer.serialize_str(&out)
}

/// ASCII-lowercase fast path with a Unicode default-case-folding fallback
/// for names containing non-ASCII characters. Exact behavioral parity with
/// the Windows case table is a known, documented deviation (see
/// SPEC_FULL.md §5) for paths that mix non-ASCII letters.
pub fn lowercase_name(name: &str) -> String {
    if name.is_ascii() {
        name.to_ascii_lowercase()
    } else {
        name.chars().flat_map(char::to_lowercase).collect()
    }
}

/// Case-insensitive name equality per [`lowercase_name`].
pub fn names_eq_ci(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        a.eq_ignore_ascii_case(b)
    } else {
        lowercase_name(a) == lowercase_name(b)
    }
}
