//! Typed value content, decoded from the raw bytes a VK points at
//! according to its declared `REG_*` type (spec §4.E).

use crate::cell_key_value::RegType;
use crate::err::Error;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CellValue {
    ValueNone,
    ValueString(String),
    ValueMultiString(Vec<String>),
    ValueU32(u32),
    ValueU64(u64),
    ValueBinary(Vec<u8>),
}

impl CellValue {
    /// Converts raw value bytes into their natural `CellValue` per the VK's
    /// own declared type. Used for generic enumeration (`stat_value`);
    /// explicit typed accessors on the reader additionally check the
    /// caller's requested type against `value_type` and raise
    /// `TypeMismatch` on disagreement.
    pub fn from_raw(value_type: RegType, raw: &[u8]) -> Result<Self, Error> {
        match value_type {
            RegType::None => Ok(CellValue::ValueNone),
            RegType::Sz | RegType::ExpandSz | RegType::Link => {
                Ok(CellValue::ValueString(decode_reg_sz(raw)))
            }
            RegType::MultiSz => Ok(CellValue::ValueMultiString(decode_reg_multi_sz(raw))),
            RegType::Dword => {
                let bytes = require_len(raw, 4)?;
                Ok(CellValue::ValueU32(u32::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            RegType::DwordBigEndian => {
                let bytes = require_len(raw, 4)?;
                Ok(CellValue::ValueU32(u32::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            RegType::Qword => {
                let bytes = require_len(raw, 8)?;
                Ok(CellValue::ValueU64(u64::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                    bytes[7],
                ])))
            }
            RegType::Binary
            | RegType::ResourceList
            | RegType::FullResourceDescriptor
            | RegType::ResourceRequirementsList
            | RegType::Unknown => Ok(CellValue::ValueBinary(raw.to_vec())),
        }
    }
}

fn require_len(raw: &[u8], n: usize) -> Result<&[u8], Error> {
    if raw.len() < n {
        Err(Error::corrupt(format!(
            "value data ({} bytes) too short for a {}-byte fixed type",
            raw.len(),
            n
        )))
    } else {
        Ok(&raw[..n])
    }
}

/// REG_SZ/REG_EXPAND_SZ: UTF-16LE, trimmed at the first NUL code unit.
fn decode_reg_sz(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// REG_MULTI_SZ: a sequence of UTF-16LE strings, each NUL-terminated, the
/// whole list terminated by an extra NUL (empty trailing string dropped).
fn decode_reg_multi_sz(raw: &[u8]) -> Vec<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    units
        .split(|&u| u == 0)
        .map(String::from_utf16_lossy)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_from_raw_sz() {
        let mut raw = utf16le("hello");
        raw.extend_from_slice(&[0, 0]);
        assert_eq!(
            CellValue::ValueString("hello".to_string()),
            CellValue::from_raw(RegType::Sz, &raw).unwrap()
        );
    }

    #[test]
    fn test_from_raw_multi_sz() {
        let mut raw = utf16le("a");
        raw.extend_from_slice(&[0, 0]);
        raw.extend_from_slice(&utf16le("b"));
        raw.extend_from_slice(&[0, 0]);
        raw.extend_from_slice(&[0, 0]);
        assert_eq!(
            CellValue::ValueMultiString(vec!["a".to_string(), "b".to_string()]),
            CellValue::from_raw(RegType::MultiSz, &raw).unwrap()
        );
    }

    #[test]
    fn test_from_raw_dword() {
        assert_eq!(
            CellValue::ValueU32(0x1122_3344),
            CellValue::from_raw(RegType::Dword, &[0x44, 0x33, 0x22, 0x11]).unwrap()
        );
    }

    #[test]
    fn test_from_raw_dword_big_endian() {
        assert_eq!(
            CellValue::ValueU32(0x1122_3344),
            CellValue::from_raw(RegType::DwordBigEndian, &[0x11, 0x22, 0x33, 0x44]).unwrap()
        );
    }

    #[test]
    fn test_from_raw_qword_too_short() {
        assert!(CellValue::from_raw(RegType::Qword, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_from_raw_binary_passthrough() {
        assert_eq!(
            CellValue::ValueBinary(vec![1, 2, 3]),
            CellValue::from_raw(RegType::Binary, &[1, 2, 3]).unwrap()
        );
    }
}
