//! DB (big-data) assembly: values over ~16 KiB are split across a chain of
//! data blocks addressed by a blocklist cell (spec §4.F).

use crate::err::Error;
use crate::hive_bin_cell;
use crate::state::State;
use nom::{
    bytes::complete::tag,
    number::complete::{le_i32, le_u16, le_u32},
    Finish, IResult,
};
use serde::Serialize;

/// Usable bytes per data block; the last 4 bytes of every block's payload
/// are the next cell's header and must be discarded.
pub const DATA_BLOCK_PAYLOAD_SIZE: usize = 16344;

#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct CellBigData {
    pub size: u32,
    pub block_count: u16,
    pub blocklist_offset: u32,
}

impl CellBigData {
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let start_len = input.len();
        let (input, size) = le_i32(input)?;
        let (input, _signature) = tag("db")(input)?;
        let (input, block_count) = le_u16(input)?;
        let (input, blocklist_offset) = le_u32(input)?;
        let (input, _reserved) = le_u32(input)?;

        let size_abs = size.unsigned_abs();
        let (input, _) =
            hive_bin_cell::eat_remaining(input, size_abs as usize, start_len - input.len())?;

        Ok((
            input,
            CellBigData {
                size: size_abs,
                block_count,
                blocklist_offset,
            },
        ))
    }
}

impl hive_bin_cell::Cell for CellBigData {
    fn size(&self) -> u32 {
        self.size
    }

    fn name_lowercase(&self) -> Option<String> {
        None
    }
}

/// Reassembles a value's full content from a DB cell's raw bytes (header
/// included, as every record decoder expects). `declared_len` is the VK's
/// own data length; assembly stops as soon as that many bytes are
/// collected.
pub fn assemble(
    db_cell_bytes: &[u8],
    declared_len: usize,
    state: &State,
    tolerant: bool,
) -> Result<Vec<u8>, Error> {
    let (_, db) = CellBigData::from_bytes(db_cell_bytes)
        .finish()
        .map_err(|e| Error::Nom { detail: format!("db header: {:?}", e) })?;

    if db.block_count < 2 {
        return Err(Error::corrupt(format!(
            "big-data block_count {} is illegal (must be >= 2)",
            db.block_count
        )));
    }

    let blocklist = state
        .slice_at(db.blocklist_offset)
        .ok_or_else(|| Error::bounds("big-data blocklist offset out of range"))?;
    let (_, blocklist_size) = hive_bin_cell::parse_cell_size(blocklist)
        .map_err(|e| Error::Nom { detail: format!("blocklist header: {:?}", e) })?;
    let blocklist_abs = blocklist_size.unsigned_abs() as usize;
    let blocklist_payload = blocklist
        .get(4..blocklist_abs)
        .ok_or_else(|| Error::bounds("blocklist cell shorter than its declared size"))?;

    let needed = db.block_count as usize * 4;
    if needed > blocklist_payload.len() {
        return Err(Error::corrupt(format!(
            "blocklist payload ({} bytes) too short for {} block offsets",
            blocklist_payload.len(),
            db.block_count
        )));
    }

    let mut out = Vec::with_capacity(declared_len);
    for chunk in blocklist_payload[..needed].chunks_exact(4) {
        if out.len() >= declared_len {
            break;
        }
        let block_offset = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let block_cell = state
            .slice_at(block_offset)
            .ok_or_else(|| Error::bounds("big-data block offset out of range"))?;
        let (_, block_size) = hive_bin_cell::parse_cell_size(block_cell)
            .map_err(|e| Error::Nom { detail: format!("data block header: {:?}", e) })?;
        let block_abs = block_size.unsigned_abs() as usize;
        let block_payload = block_cell
            .get(4..block_abs)
            .ok_or_else(|| Error::bounds("data block shorter than its declared size"))?;
        let usable = block_payload.len().saturating_sub(4); // trailing 4 bytes are the next cell's header
        let take_n = usable.min(declared_len - out.len());
        out.extend_from_slice(&block_payload[..take_n]);
    }

    if out.len() < declared_len {
        if tolerant {
            Ok(out)
        } else {
            Err(Error::corrupt(format!(
                "big-data assembly produced {} of {} declared bytes",
                out.len(),
                declared_len
            )))
        }
    } else {
        Ok(out)
    }
}
