//! Shared cell-level machinery: the `Cell` trait every record decoder
//! implements, and the generic signed-size cell header.
//!
//! Cell payloads are a sum type over `{NK, VK, LI, LF, LH, RI, SK, DB, Raw}`
//! discriminated by a two-byte signature; we model that as an explicit
//! `match` on the tag rather than a vtable (see `reader::subkey_offsets`
//! for the LI/LF/LH-vs-RI dispatch).

use crate::err::Error;
use crate::util;
use nom::{number::complete::le_i32, IResult};

/// Implemented by every decoded cell payload (NK, VK, SK, DB, a data
/// block, ...). `size()` is the cell's own `|size|` including its 4-byte
/// header, used by the orphan/reachability scan (component F) and by the
/// emitter when repacking (component H).
pub trait Cell {
    fn size(&self) -> u32;

    /// Lowercased name for this cell, if it has one (keys and values do;
    /// security/data cells don't).
    fn name_lowercase(&self) -> Option<String>;
}

/// Parses the generic 4-byte signed cell-header and returns `(abs_size,
/// remaining_input)`. `abs_size` includes the 4-byte header itself, per
/// spec §3 ("Cell"). Negative = allocated, positive = free; callers that
/// require an allocated cell should check the sign themselves before
/// calling this (it only normalizes magnitude).
pub fn parse_cell_size(input: &[u8]) -> IResult<&[u8], i32> {
    le_i32(input)
}

/// True if `size` (as read directly from the cell header) denotes an
/// allocated cell.
pub fn is_allocated(size: i32) -> bool {
    size < 0
}

/// Consumes any trailing bytes of a cell payload beyond what a decoder
/// explicitly parsed, so the returned `input` lines up with the next
/// cell. `consumed` is the number of bytes already taken from the original
/// `size_abs`-byte payload.
pub fn eat_remaining(input: &[u8], size_abs: usize, consumed: usize) -> IResult<&[u8], &[u8]> {
    let remaining = size_abs.saturating_sub(consumed);
    nom::bytes::complete::take(remaining)(input)
}

/// Validates a decoded `|size|` against the structural invariants from
/// spec §8: non-zero, a multiple of 8, and no larger than `max_cell_size`.
pub fn validate_cell_size(size_abs: u32, max_cell_size: u32) -> Result<(), Error> {
    if size_abs < 8 {
        return Err(Error::corrupt(format!("cell size {} is smaller than the 4-byte header plus tag", size_abs)));
    }
    if size_abs % util::CELL_ALIGNMENT != 0 {
        return Err(Error::corrupt(format!("cell size {} is not 8-byte aligned", size_abs)));
    }
    if size_abs > max_cell_size {
        return Err(Error::sanity_limit(format!(
            "cell size {} exceeds the configured maximum of {}",
            size_abs, max_cell_size
        )));
    }
    Ok(())
}
