//! NK (key node) record decode/encode (spec §4.B) plus the enriched,
//! reader-populated fields (`path`, `is_key_root`, `sub_values`) that make
//! a decoded node usable directly as a registry key.

use crate::cell_key_value::CellKeyValue;
use crate::hive_bin_cell;
use crate::impl_flags_from_bits;
use crate::impl_serialize_for_bitflags;
use crate::log::Logs;
use crate::util;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_i32, le_u16, le_u32, le_u64},
    IResult,
};
use serde::Serialize;

bitflags! {
    pub struct CellKeyNodeFlags: u16 {
        const KEY_IS_VOLATILE    = 0x0001;
        const KEY_HIVE_EXIT      = 0x0002;
        const KEY_HIVE_ENTRY     = 0x0004;
        const KEY_NO_DELETE      = 0x0008;
        const KEY_SYM_LINK       = 0x0010;
        /// Name is stored compressed (Windows-1252), one byte per character.
        const KEY_COMP_NAME      = 0x0020;
        const KEY_PREDEF_HANDLE  = 0x0040;
    }
}
impl_serialize_for_bitflags! {CellKeyNodeFlags}
impl_flags_from_bits! {CellKeyNodeFlags, u16}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CellKeyNodeDetail {
    pub access_bits: u32,
    pub parent_key_offset: u32,
    pub number_of_sub_keys: u32,
    pub number_of_volatile_sub_keys: u32,
    pub sub_keys_list_offset: u32,
    pub volatile_sub_keys_list_offset: u32,
    pub number_of_key_values: u32,
    pub key_values_list_offset: u32,
    pub security_key_offset: u32,
    pub class_name_offset: u32,
    /// Advisory, not load-bearing on read; preserved verbatim so the
    /// editor can round-trip a node it doesn't otherwise touch.
    pub max_sub_key_name_length: u32,
    pub max_sub_key_class_length: u32,
    pub max_value_name_length: u32,
    pub max_value_data_length: u32,
    pub work_var: u32,
    pub class_name_length: u16,
}

#[derive(Debug, Default, Serialize)]
pub struct CellKeyNode {
    pub detail: CellKeyNodeDetail,
    pub flags: CellKeyNodeFlags,
    pub last_key_written_date_and_time: DateTime<Utc>,
    pub size: u32,
    pub key_name: String,
    /// Full backslash-joined path from the root, set by the reader while
    /// walking; empty on a freshly decoded, unplaced node.
    pub path: String,
    /// This node's own hive-relative cell offset, set by the reader; not
    /// part of the on-disk NK structure itself.
    pub offset: u32,
    pub is_key_root: bool,
    pub sub_values: Vec<CellKeyValue>,
    pub logs: Logs,
}

impl PartialEq for CellKeyNode {
    fn eq(&self, other: &Self) -> bool {
        self.detail == other.detail
            && self.flags == other.flags
            && self.size == other.size
            && self.key_name == other.key_name
            && self.path == other.path
    }
}

impl hive_bin_cell::Cell for CellKeyNode {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        Some(util::lowercase_name(&self.key_name))
    }
}

impl CellKeyNode {
    /// Uses nom to parse a key node (nk) hive bin cell. Does not resolve
    /// `path`/`sub_values`/`is_key_root` — those are filled in by the
    /// reader as it walks from the root.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, _signature) = tag("nk")(input)?;
        let (input, flags_raw) = le_u16(input)?;
        let (input, last_write_filetime) = le_u64(input)?;
        let (input, access_bits) = le_u32(input)?;
        let (input, parent_key_offset) = le_u32(input)?;
        let (input, number_of_sub_keys) = le_u32(input)?;
        let (input, number_of_volatile_sub_keys) = le_u32(input)?;
        let (input, sub_keys_list_offset) = le_u32(input)?;
        let (input, volatile_sub_keys_list_offset) = le_u32(input)?;
        let (input, number_of_key_values) = le_u32(input)?;
        let (input, key_values_list_offset) = le_u32(input)?;
        let (input, security_key_offset) = le_u32(input)?;
        let (input, class_name_offset) = le_u32(input)?;
        let (input, max_sub_key_name_length) = le_u32(input)?;
        let (input, max_sub_key_class_length) = le_u32(input)?;
        let (input, max_value_name_length) = le_u32(input)?;
        let (input, max_value_data_length) = le_u32(input)?;
        let (input, work_var) = le_u32(input)?;
        let (input, name_length) = le_u16(input)?;
        let (input, class_name_length) = le_u16(input)?;
        let (input, name_bytes) = take(name_length as usize)(input)?;

        let mut logs = Logs::default();
        let flags = CellKeyNodeFlags::from_bits_checked(flags_raw, &mut logs);
        let key_name = if flags.contains(CellKeyNodeFlags::KEY_COMP_NAME) {
            util::read_compressed_name(name_bytes)
        } else {
            util::read_utf16_le_name(name_bytes, &mut logs, "KeyName").map_err(|_| {
                nom::Err::Failure(nom::error::Error::new(name_bytes, nom::error::ErrorKind::Verify))
            })?
        };

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            CellKeyNode {
                detail: CellKeyNodeDetail {
                    access_bits,
                    parent_key_offset,
                    number_of_sub_keys,
                    number_of_volatile_sub_keys,
                    sub_keys_list_offset,
                    volatile_sub_keys_list_offset,
                    number_of_key_values,
                    key_values_list_offset,
                    security_key_offset,
                    class_name_offset,
                    max_sub_key_name_length,
                    max_sub_key_class_length,
                    max_value_name_length,
                    max_value_data_length,
                    work_var,
                    class_name_length,
                },
                flags,
                last_key_written_date_and_time: util::get_date_time_from_filetime(last_write_filetime),
                size: size_abs,
                key_name,
                path: String::new(),
                offset: 0,
                is_key_root: false,
                sub_values: Vec::new(),
                logs,
            },
        ))
    }

    pub fn is_key_root(&self) -> bool {
        self.is_key_root
    }

    /// Lowercased full path, for case-insensitive comparisons.
    pub fn lowercase(&self) -> String {
        util::lowercase_name(&self.path)
    }

    pub fn has_sub_keys(&self) -> bool {
        self.detail.number_of_sub_keys > 0
    }

    pub fn has_values(&self) -> bool {
        self.detail.number_of_key_values > 0
    }

    pub fn has_security_descriptor(&self) -> bool {
        self.detail.security_key_offset != util::NIL_OFFSET
    }

    pub fn has_class_name(&self) -> bool {
        self.detail.class_name_offset != util::NIL_OFFSET
    }
}
