//! SK (security descriptor) cells. Per the ACL Non-goal, the descriptor
//! itself is kept opaque: we decode the ring linkage and refcount but never
//! interpret the SID/ACL bytes.

use crate::err::Error;
use crate::hive_bin_cell;
use crate::util;
use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_i32, le_u16, le_u32},
    Finish, IResult,
};
use serde::Serialize;

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct CellKeySecurityDetail {
    pub unknown1: u16,
    /* Offsets in bytes, relative from the start of the hive bin's data.
       When a key security item acts as a list header, flink points to the first entry of this list.
       If a list is empty, flink points to a list header (i.e. to a current cell).
       When a key security item acts as a list entry, flink points to the next entry of this list.
       If there is no next entry in a list, flink points to a list header. */
    pub flink: u32,
    /* Offsets in bytes, relative from the start of the hive bin's data.
       When a key security item acts as a list header, blink points to the last entry of this list.
       If a list is empty, blink points to a list header (i.e. to a current cell).
       When a key security item acts as a list entry, blink points to the previous entry of this list.
       If there is no previous entry in a list, blink points to a list header. */
    pub blink: u32,
    pub reference_count: u32,
    pub security_descriptor_size: u32,
}

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct CellKeySecurity {
    pub detail: CellKeySecurityDetail,
    pub size: u32,
    /// Raw SECURITY_DESCRIPTOR bytes, stored but never parsed.
    #[serde(serialize_with = "util::data_as_hex")]
    pub security_descriptor: Vec<u8>,
}

impl CellKeySecurity {
    /// Uses nom to parse a key security (sk) hive bin cell.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, _signature) = tag("sk")(input)?;
        let (input, unknown1) = le_u16(input)?;
        let (input, flink) = le_u32(input)?;
        let (input, blink) = le_u32(input)?;
        let (input, reference_count) = le_u32(input)?;
        let (input, security_descriptor_size) = le_u32(input)?;
        let (input, security_descriptor) = take(security_descriptor_size as usize)(input)?;

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            CellKeySecurity {
                detail: CellKeySecurityDetail {
                    unknown1,
                    flink,
                    blink,
                    reference_count,
                    security_descriptor_size,
                },
                size: size_abs,
                security_descriptor: security_descriptor.to_vec(),
            },
        ))
    }
}

impl hive_bin_cell::Cell for CellKeySecurity {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        None
    }
}

/// Walks the SK ring starting at `security_key_offset`, collecting every
/// descriptor's opaque bytes and refcount. Stops once flink cycles back to
/// the starting offset (a well-formed ring is circular).
pub fn read_cell_key_security(
    file_buffer: &[u8],
    security_key_offset: u32,
    hbin_offset: u32,
) -> Result<Vec<CellKeySecurity>, Error> {
    let mut security_descriptors = Vec::new();
    let mut offset = security_key_offset;
    loop {
        let start = offset as usize + hbin_offset as usize;
        let input = file_buffer
            .get(start..)
            .ok_or_else(|| Error::bounds(format!("sk cell offset {:#x} is out of range", start)))?;
        let (_, cell_key_security) = CellKeySecurity::from_bytes(input)
            .finish()
            .map_err(|e| Error::Nom { detail: format!("sk cell at {:#x}: {:?}", start, e) })?;

        let flink = cell_key_security.detail.flink;
        security_descriptors.push(cell_key_security);

        if flink == security_key_offset {
            break;
        }
        offset = flink;
    }
    Ok(security_descriptors)
}
