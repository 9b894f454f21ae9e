//! VK (value) record decode/encode, and the data-read path that turns a
//! VK's inline bytes / data cell / DB chain into raw content (spec §4.B,
//! §4.E).

use crate::cell_big_data;
use crate::cell_value::CellValue;
use crate::err::Error;
use crate::hive_bin_cell;
use crate::impl_enum_from_value;
use crate::impl_flags_from_bits;
use crate::impl_serialize_for_bitflags;
use crate::log::{LogCode, Logs};
use crate::state::State;
use crate::util;
use bitflags::bitflags;
use enum_primitive_derive::Primitive;
use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_i32, le_u16, le_u32},
    IResult,
};
use num_traits::FromPrimitive;
use serde::Serialize;

bitflags! {
    pub struct CellKeyValueFlags: u16 {
        /// Name is stored compressed (Windows-1252), one byte per character.
        const VALUE_COMP_NAME = 0x0001;
    }
}
impl_serialize_for_bitflags! {CellKeyValueFlags}
impl_flags_from_bits! {CellKeyValueFlags, u16}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Primitive, Serialize)]
#[repr(u32)]
pub enum RegType {
    None = 0,
    Sz = 1,
    ExpandSz = 2,
    Binary = 3,
    Dword = 4,
    DwordBigEndian = 5,
    Link = 6,
    MultiSz = 7,
    ResourceList = 8,
    FullResourceDescriptor = 9,
    ResourceRequirementsList = 10,
    Qword = 11,
    Unknown = 0x0fffffff,
}
impl_enum_from_value! { RegType }

const DATA_LENGTH_INLINE_FLAG: u32 = 0x8000_0000;
const DATA_LENGTH_MASK: u32 = 0x7FFF_FFFF;
const MAX_INLINE_LENGTH: u32 = 4;

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct CellKeyValueDetail {
    pub value_type: RegType,
    pub flags: CellKeyValueFlags,
    pub data_length: u32,
    pub data_offset: u32,
    pub padding: u16,
}

#[derive(Debug, Serialize)]
pub struct CellKeyValue {
    pub detail: CellKeyValueDetail,
    pub size: u32,
    pub value_name: String,
    pub value_content: Option<CellValue>,
    /// This value's own hive-relative cell offset, set by the reader; not
    /// part of the on-disk VK structure itself.
    pub offset: u32,
    pub logs: Logs,
}

impl PartialEq for CellKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.detail == other.detail
            && self.size == other.size
            && self.value_name == other.value_name
            && self.value_content == other.value_content
    }
}

impl hive_bin_cell::Cell for CellKeyValue {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        Some(util::lowercase_name(&self.value_name))
    }
}

impl CellKeyValue {
    /// Uses nom to parse a key value (vk) hive bin cell.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, _signature) = tag("vk")(input)?;
        let (input, name_length) = le_u16(input)?;
        let (input, data_length) = le_u32(input)?;
        let (input, data_offset) = le_u32(input)?;
        let (input, value_type_raw) = le_u32(input)?;
        let (input, flags_raw) = le_u16(input)?;
        let (input, padding) = le_u16(input)?;
        let (input, name_bytes) = take(name_length as usize)(input)?;

        let mut logs = Logs::default();
        let flags = CellKeyValueFlags::from_bits_checked(flags_raw, &mut logs);
        let value_type = RegType::from_value(value_type_raw, &mut logs);
        let value_name = if flags.contains(CellKeyValueFlags::VALUE_COMP_NAME) {
            util::read_compressed_name(name_bytes)
        } else {
            util::read_utf16_le_name(name_bytes, &mut logs, "ValueName").map_err(|_| {
                nom::Err::Failure(nom::error::Error::new(name_bytes, nom::error::ErrorKind::Verify))
            })?
        };

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            CellKeyValue {
                detail: CellKeyValueDetail {
                    value_type,
                    flags,
                    data_length,
                    data_offset,
                    padding,
                },
                size: size_abs,
                value_name,
                value_content: None,
                offset: 0,
                logs,
            },
        ))
    }

    pub fn name_is_ascii(&self) -> bool {
        self.detail.flags.contains(CellKeyValueFlags::VALUE_COMP_NAME)
    }

    pub fn data_is_inline(&self) -> bool {
        self.detail.data_length & DATA_LENGTH_INLINE_FLAG != 0
    }

    pub fn declared_length(&self) -> u32 {
        self.detail.data_length & DATA_LENGTH_MASK
    }

    pub fn inline_length(&self) -> u32 {
        self.declared_length().min(MAX_INLINE_LENGTH)
    }

    /// Resolves this value's raw content bytes (spec §4.E `read_bytes`):
    /// inline fast path, a direct data cell, or a DB big-data chain.
    pub fn read_bytes(&self, state: &State, tolerant: bool) -> Result<Vec<u8>, Error> {
        if self.data_is_inline() {
            let bytes = self.detail.data_offset.to_le_bytes();
            return Ok(bytes[..self.inline_length() as usize].to_vec());
        }

        let declared_len = self.declared_length() as usize;
        let cell_bytes = state
            .slice_at(self.detail.data_offset)
            .ok_or_else(|| Error::bounds("value data cell offset out of range"))?;
        let (_, size) = hive_bin_cell::parse_cell_size(cell_bytes)
            .map_err(|e| Error::Nom { detail: format!("value data cell header: {:?}", e) })?;
        let size_abs = size.unsigned_abs();
        hive_bin_cell::validate_cell_size(size_abs, u32::MAX)?;
        let payload = cell_bytes
            .get(4..size_abs as usize)
            .ok_or_else(|| Error::bounds("value data cell shorter than its declared size"))?;

        if payload.len() >= 2 && &payload[..2] == b"db" {
            return cell_big_data::assemble(cell_bytes, declared_len, state, tolerant);
        }

        if declared_len <= payload.len() {
            Ok(payload[..declared_len].to_vec())
        } else if tolerant {
            Ok(payload.to_vec())
        } else {
            Err(Error::corrupt(format!(
                "value data cell ({} bytes) shorter than declared length {}",
                payload.len(),
                declared_len
            )))
        }
    }

    /// Resolves and stores this value's content, folding any failure into
    /// `self.logs` rather than propagating it (mirrors the always-on,
    /// best-effort decoding posture the rest of the crate follows at this
    /// layer; callers wanting a hard failure should use `read_bytes`
    /// directly via the reader's typed accessors).
    pub fn read_content(&mut self, state: &State) {
        match self
            .read_bytes(state, false)
            .and_then(|raw| CellValue::from_raw(self.detail.value_type, &raw))
        {
            Ok(value) => self.value_content = Some(value),
            Err(e) => {
                self.logs.add(
                    LogCode::WarningConversion,
                    &format!("failed to read value content for '{}': {}", self.value_name, e),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_vk(
        name: &str,
        ascii_name: bool,
        data_length: u32,
        data_offset: u32,
        value_type: u32,
    ) -> Vec<u8> {
        let name_bytes = if ascii_name {
            name.as_bytes().to_vec()
        } else {
            name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
        };
        let mut payload = Vec::new();
        payload.extend_from_slice(b"vk");
        payload.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        payload.extend_from_slice(&data_length.to_le_bytes());
        payload.extend_from_slice(&data_offset.to_le_bytes());
        payload.extend_from_slice(&value_type.to_le_bytes());
        let flags: u16 = if ascii_name { 0x0001 } else { 0x0000 };
        payload.extend_from_slice(&flags.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&name_bytes);

        let size_abs = util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = (-(size_abs as i32)).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn test_parse_inline_dword() {
        let bytes = encode_vk("Count", true, 0x8000_0004, 0x1122_3344, 4);
        let (_, parsed) = CellKeyValue::from_bytes(&bytes).unwrap();
        assert_eq!("Count", parsed.value_name);
        assert!(parsed.data_is_inline());
        assert_eq!(4, parsed.inline_length());
        assert_eq!(vec![0x44, 0x33, 0x22, 0x11], parsed.read_bytes(&State::default(), false).unwrap());
    }

    #[test]
    fn test_read_content_inline_dword() {
        let bytes = encode_vk("Count", true, 0x8000_0004, 0x1122_3344, 4);
        let (_, mut parsed) = CellKeyValue::from_bytes(&bytes).unwrap();
        parsed.read_content(&State::default());
        assert_eq!(Some(CellValue::ValueU32(0x1122_3344)), parsed.value_content);
    }

    #[test]
    fn test_parse_utf16_name() {
        let bytes = encode_vk("\u{e4}lue", false, 0x8000_0000, 0, 0);
        let (_, parsed) = CellKeyValue::from_bytes(&bytes).unwrap();
        assert_eq!("\u{e4}lue", parsed.value_name);
        assert!(!parsed.name_is_ascii());
    }
}
