//! RI subkey list: an indirection layer used once a key's subkeys exceed
//! what a single LI/LF/LH can hold. Its entries are offsets to *further*
//! LI/LF/LH cells, concatenated by the caller to get the full subkey set.

use crate::hive_bin_cell;
use nom::{
    bytes::complete::tag,
    number::complete::{le_i32, le_u16, le_u32},
    IResult,
};
use serde::Serialize;

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct SubKeyListRi {
    pub size: u32,
    pub count: u16,
    /// Hive-relative offsets of the child LI/LF/LH cells, in the order the
    /// caller must concatenate them.
    pub list_offsets: Vec<u32>,
}

impl hive_bin_cell::Cell for SubKeyListRi {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        None
    }
}

impl SubKeyListRi {
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, _signature) = tag("ri")(input)?;
        let (input, count) = le_u16(input)?;
        let (input, list_offsets) = nom::multi::count(le_u32, count.into())(input)?;

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            SubKeyListRi {
                size: size_abs,
                count,
                list_offsets,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_ri(list_offsets: &[u32]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"ri");
        payload.extend_from_slice(&(list_offsets.len() as u16).to_le_bytes());
        for o in list_offsets {
            payload.extend_from_slice(&o.to_le_bytes());
        }
        let size_abs = crate::util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = (-(size_abs as i32)).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn test_parse_ri() {
        let bytes = encode_ri(&[1000, 2000, 3000]);
        let (_, parsed) = SubKeyListRi::from_bytes(&bytes).unwrap();
        assert_eq!(3, parsed.count);
        assert_eq!(vec![1000, 2000, 3000], parsed.list_offsets);
    }
}
