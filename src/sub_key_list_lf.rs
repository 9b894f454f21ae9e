//! LF/LH subkey list variants: a count followed by `(NK offset, 4-byte
//! hint)` pairs. LF's hint is the first four ASCII bytes of the key name
//! (a lookup speedup); LH's is a hash. Per spec §4.C, higher layers ignore
//! the hint/hash entirely and compare names directly, so we keep it as raw
//! bytes rather than committing to one interpretation.

use crate::hive_bin_cell;
use crate::util;
use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_i32, le_u16, le_u32},
    IResult,
};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SubKeyListLfKind {
    Lf,
    Lh,
}

/// Subkeys list with name hints (LF) or hashes (LH) — structurally
/// identical, so one decoder handles both, tagged by `kind`.
#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct SubKeyListLf {
    pub kind: SubKeyListLfKind,
    pub size: u32,
    pub count: u16,
    pub items: Vec<SubKeyListLfItem>, // Vec size = count
}

impl hive_bin_cell::Cell for SubKeyListLf {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        None
    }
}

impl SubKeyListLf {
    /// Uses nom to parse an lf/lh sub key list hive bin cell.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, signature) = nom::branch::alt((tag("lf"), tag("lh")))(input)?;
        let kind = if signature == b"lf" {
            SubKeyListLfKind::Lf
        } else {
            SubKeyListLfKind::Lh
        };
        let (input, count) = le_u16(input)?;
        let (input, items) = nom::multi::count(SubKeyListLfItem::from_bytes, count.into())(input)?;

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            SubKeyListLf {
                kind,
                size: size_abs,
                count,
                items,
            },
        ))
    }
}

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct SubKeyListLfItem {
    pub named_key_offset: u32, // The offset value is in bytes and relative from the start of the hive bin data
    #[serde(serialize_with = "util::data_as_hex")]
    pub hint_or_hash: Vec<u8>, // Either an ASCII name hint (lf) or a hash (lh); not interpreted here.
}

impl SubKeyListLfItem {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, named_key_offset) = le_u32(input)?;
        let (input, hint_or_hash) = take(4usize)(input)?;
        Ok((
            input,
            SubKeyListLfItem {
                named_key_offset,
                hint_or_hash: hint_or_hash.to_vec(),
            },
        ))
    }

    /// Best-effort ASCII view of the hint, useful only when the caller
    /// knows this item came from an LF list.
    pub fn name_hint_lossy(&self) -> String {
        String::from_utf8_lossy(&self.hint_or_hash).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_key_list_lf_traits() {
        let lf = SubKeyListLf {
            kind: SubKeyListLfKind::Lf,
            size: 64,
            count: 2,
            items: vec![
                SubKeyListLfItem {
                    named_key_offset: 12345,
                    hint_or_hash: b"aaaa".to_vec(),
                },
                SubKeyListLfItem {
                    named_key_offset: 54321,
                    hint_or_hash: b"zzzz".to_vec(),
                },
            ],
        };
        assert_eq!(lf.size, hive_bin_cell::Cell::size(&lf));
    }

    fn encode_lf(kind: &[u8; 2], items: &[(u32, [u8; 4])]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(kind);
        payload.extend_from_slice(&(items.len() as u16).to_le_bytes());
        for (offset, hint) in items {
            payload.extend_from_slice(&offset.to_le_bytes());
            payload.extend_from_slice(hint);
        }
        let size_abs = util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = ((-(size_abs as i32)) as i32).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn test_parse_sub_key_list_lf() {
        let bytes = encode_lf(b"lf", &[(105464, *b"Scre"), (105376, *b"Scre")]);
        let (_, parsed) = SubKeyListLf::from_bytes(&bytes).unwrap();
        assert_eq!(SubKeyListLfKind::Lf, parsed.kind);
        assert_eq!(2, parsed.count);
        assert_eq!(105464, parsed.items[0].named_key_offset);
        assert_eq!("Scre", parsed.items[0].name_hint_lossy());
    }

    #[test]
    fn test_parse_sub_key_list_lh() {
        let bytes = encode_lf(b"lh", &[(200, [1, 2, 3, 4])]);
        let (_, parsed) = SubKeyListLf::from_bytes(&bytes).unwrap();
        assert_eq!(SubKeyListLfKind::Lh, parsed.kind);
        assert_eq!(vec![1, 2, 3, 4], parsed.items[0].hint_or_hash);
    }
}
