//! HBIN header decode/encode (component B) and the open-time bin-bounds
//! check it feeds into [`crate::cell_index`] (component C).

use crate::err::Error;
use crate::util;
use nom::{
    bytes::complete::tag,
    bytes::streaming::take,
    number::complete::le_u32,
    IResult,
};
use serde::Serialize;

pub const HBIN_HEADER_SIZE: u32 = 0x20;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HiveBinHeader {
    /// This bin's own offset, hive-relative (i.e. relative to the start of
    /// the hive bin data area, offset 0x1000 in the file).
    pub offset: u32,
    /// Size of this bin, a multiple of 0x1000.
    pub size: u32,
}

impl HiveBinHeader {
    /// Parses an HBIN header. Only the signature, offset-echo and size
    /// fields are load-bearing; the remaining 24 bytes up to `+0x20` are
    /// reserved and ignored per spec §3.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _signature) = tag("hbin")(input)?;
        let (input, offset) = le_u32(input)?;
        let (input, size) = le_u32(input)?;
        let (input, _reserved) = take(HBIN_HEADER_SIZE as usize - 12)(input)?;

        Ok((input, HiveBinHeader { offset, size }))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HBIN_HEADER_SIZE as usize);
        buf.extend_from_slice(b"hbin");
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.resize(HBIN_HEADER_SIZE as usize, 0);
        buf
    }

    /// Validates this header against its absolute position in the file and
    /// the overall hive bins data extent, per spec §4.C open algorithm:
    /// signature already checked by `from_bytes`; here we check the
    /// offset-echo, 4 KiB size alignment/minimum, and that the bin fits.
    pub fn validate(&self, position: u32, hive_bins_data_size: u32) -> Result<(), Error> {
        let expected_offset = position
            .checked_sub(util::HBIN_START_OFFSET)
            .ok_or_else(|| Error::corrupt("hbin position precedes the data area"))?;
        if self.offset != expected_offset {
            return Err(Error::corrupt(format!(
                "hbin offset-echo {:#x} does not match its position {:#x}",
                self.offset, expected_offset
            )));
        }
        if self.size < util::BIN_ALIGNMENT || self.size % util::BIN_ALIGNMENT != 0 {
            return Err(Error::corrupt(format!(
                "hbin size {:#x} is not a non-zero multiple of 0x1000",
                self.size
            )));
        }
        let (end, ok) = util::checked_add_u32(position, self.size);
        if !ok || end > util::HBIN_START_OFFSET + hive_bins_data_size {
            return Err(Error::corrupt(format!(
                "hbin at {:#x} of size {:#x} exceeds the hive bins data extent",
                position, self.size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let header = HiveBinHeader { offset: 0, size: 0x1000 };
        let bytes = header.to_bytes();
        let (remaining, parsed) = HiveBinHeader::from_bytes(&bytes).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(header, parsed);
    }

    #[test]
    fn test_validate_ok() {
        let header = HiveBinHeader { offset: 0, size: 0x1000 };
        assert!(header.validate(0x1000, 0x1000).is_ok());
    }

    #[test]
    fn test_validate_offset_mismatch() {
        let header = HiveBinHeader { offset: 0x1000, size: 0x1000 };
        assert!(header.validate(0x1000, 0x2000).is_err());
    }

    #[test]
    fn test_validate_size_not_aligned() {
        let header = HiveBinHeader { offset: 0, size: 0x1800 };
        assert!(header.validate(0x1000, 0x1800).is_err());
    }

    #[test]
    fn test_validate_exceeds_extent() {
        let header = HiveBinHeader { offset: 0, size: 0x2000 };
        assert!(header.validate(0x1000, 0x1000).is_err());
    }
}
