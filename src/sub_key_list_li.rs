//! LI subkey list: count + flat array of u32 NK offsets, no name hint.

use crate::hive_bin_cell;
use nom::{
    bytes::complete::tag,
    number::complete::{le_i32, le_u16, le_u32},
    IResult,
};
use serde::Serialize;

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct SubKeyListLi {
    pub size: u32,
    pub count: u16,
    pub offsets: Vec<u32>,
}

impl hive_bin_cell::Cell for SubKeyListLi {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        None
    }
}

impl SubKeyListLi {
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, _signature) = tag("li")(input)?;
        let (input, count) = le_u16(input)?;
        let (input, offsets) = nom::multi::count(le_u32, count.into())(input)?;

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            SubKeyListLi {
                size: size_abs,
                count,
                offsets,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_li(offsets: &[u32]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"li");
        payload.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
        for o in offsets {
            payload.extend_from_slice(&o.to_le_bytes());
        }
        let size_abs = crate::util::align8(4 + payload.len() as u32);
        payload.resize(size_abs as usize - 4, 0);
        let mut buf = (-(size_abs as i32)).to_le_bytes().to_vec();
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn test_parse_li() {
        let bytes = encode_li(&[100, 200, 300]);
        let (_, parsed) = SubKeyListLi::from_bytes(&bytes).unwrap();
        assert_eq!(3, parsed.count);
        assert_eq!(vec![100, 200, 300], parsed.offsets);
        assert_eq!(parsed.size, hive_bin_cell::Cell::size(&parsed));
    }
}
