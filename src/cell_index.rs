//! Open-time structural validation and the HBIN index used to resolve a
//! hive-relative cell offset, including cross-bin stitching (spec §4.C).

use crate::err::Error;
use crate::hive_bin_cell;
use crate::hive_bin_header::{HiveBinHeader, HBIN_HEADER_SIZE};
use crate::util;

/// One indexed HBIN: its absolute extent `[abs_offset, abs_offset + size)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HiveBinEntry {
    pub abs_offset: u32,
    pub size: u32,
}

impl HiveBinEntry {
    fn abs_end(&self) -> u32 {
        self.abs_offset + self.size
    }
}

/// The ordered HBIN index built once at open.
#[derive(Clone, Debug, Default)]
pub struct CellIndex {
    pub bins: Vec<HiveBinEntry>,
}

impl CellIndex {
    /// Walks `file_buffer[0x1000..]` validating every HBIN in turn (spec
    /// §4.C open algorithm) and returns the resulting index.
    pub fn build(file_buffer: &[u8], hive_bins_data_size: u32) -> Result<Self, Error> {
        let mut bins = Vec::new();
        let mut position = util::HBIN_START_OFFSET;
        let end = util::HBIN_START_OFFSET
            .checked_add(hive_bins_data_size)
            .ok_or_else(|| Error::corrupt("hive_bins_data_size overflows the file extent"))?;

        while position < end {
            let slice = file_buffer.get(position as usize..).ok_or_else(|| {
                Error::corrupt(format!("hbin at {:#x} starts past end of buffer", position))
            })?;
            let (_, header) = HiveBinHeader::from_bytes(slice)
                .map_err(|e| Error::corrupt(format!("hbin at {:#x}: {:?}", position, e)))?;
            header.validate(position, hive_bins_data_size)?;

            bins.push(HiveBinEntry {
                abs_offset: position,
                size: header.size,
            });
            position += header.size;
        }

        if position != end {
            return Err(Error::corrupt(
                "hive bins do not exactly tile the declared hive_bins_data_size",
            ));
        }

        Ok(CellIndex { bins })
    }

    /// Finds the HBIN entry containing absolute offset `abs`.
    fn locate(&self, abs: u32) -> Option<&HiveBinEntry> {
        self.bins
            .iter()
            .find(|b| abs >= b.abs_offset && abs < b.abs_end())
    }

    /// Resolves a hive-relative cell offset to its payload bytes (spec
    /// §4.C cell resolution). Returns an owned buffer on the stitched path,
    /// a zero-copy slice otherwise.
    pub fn resolve<'a>(
        &self,
        file_buffer: &'a [u8],
        hive_relative_offset: u32,
        max_cell_size: u32,
    ) -> Result<ResolvedCell<'a>, Error> {
        let (abs, ok) = util::checked_add_u32(util::HBIN_START_OFFSET, hive_relative_offset);
        if !ok {
            return Err(Error::bounds("cell offset overflows file addressing"));
        }
        let header_bytes = file_buffer
            .get(abs as usize..abs as usize + 4)
            .ok_or_else(|| Error::bounds(format!("cell at {:#x} is out of range", abs)))?;
        let (_, size) = hive_bin_cell::parse_cell_size(header_bytes)
            .map_err(|e| Error::Nom { detail: format!("{:?}", e) })?;
        let size_abs = size.unsigned_abs();
        hive_bin_cell::validate_cell_size(size_abs, max_cell_size)?;

        let bin = self
            .locate(abs)
            .ok_or_else(|| Error::corrupt(format!("offset {:#x} falls outside any indexed hbin", abs)))?;

        // Returned bytes include the 4-byte cell-size header, matching what
        // every record decoder's `from_bytes` expects as input.
        if abs + size_abs <= bin.abs_end() {
            let full = file_buffer
                .get(abs as usize..abs as usize + size_abs as usize)
                .ok_or_else(|| Error::bounds("cell payload exceeds the buffer"))?;
            return Ok(ResolvedCell::Borrowed(full));
        }

        // Stitched path: the cell straddles one or more hbin boundaries.
        // Copy from `abs` to the end of the current bin, then skip each
        // subsequent bin's header and keep copying until size_abs bytes
        // have been gathered.
        let mut out = Vec::with_capacity(size_abs as usize);
        let mut cursor = abs as usize;
        let mut remaining = size_abs as usize;
        let mut current_bin = bin;
        loop {
            let bin_end = current_bin.abs_end() as usize;
            let available = bin_end.saturating_sub(cursor);
            let take_n = available.min(remaining);
            let chunk = file_buffer
                .get(cursor..cursor + take_n)
                .ok_or_else(|| Error::bounds("stitched cell copy exceeds the buffer"))?;
            out.extend_from_slice(chunk);
            remaining -= take_n;
            if remaining == 0 {
                break;
            }
            let next_bin = self
                .locate(bin_end as u32)
                .ok_or_else(|| Error::corrupt("stitched cell runs past the last hbin"))?;
            cursor = bin_end + HBIN_HEADER_SIZE as usize;
            current_bin = next_bin;
        }
        Ok(ResolvedCell::Owned(out))
    }
}

/// A resolved cell payload: either a zero-copy borrow of the backing
/// buffer, or an owned, reassembled copy on the cross-bin stitched path.
pub enum ResolvedCell<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> ResolvedCell<'a> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ResolvedCell::Borrowed(s) => s,
            ResolvedCell::Owned(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hbin(offset: u32, size: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = HiveBinHeader { offset, size }.to_bytes();
        buf.extend_from_slice(body);
        buf.resize(size as usize, 0);
        buf
    }

    #[test]
    fn test_build_single_bin() {
        let mut file_buffer = vec![0u8; 4096];
        file_buffer.extend_from_slice(&make_hbin(0, 0x1000, &[]));
        let index = CellIndex::build(&file_buffer, 0x1000).unwrap();
        assert_eq!(1, index.bins.len());
        assert_eq!(4096, index.bins[0].abs_offset);
    }

    #[test]
    fn test_build_rejects_short_tiling() {
        let mut file_buffer = vec![0u8; 4096];
        file_buffer.extend_from_slice(&make_hbin(0, 0x1000, &[]));
        assert!(CellIndex::build(&file_buffer, 0x2000).is_err());
    }

    #[test]
    fn test_resolve_zero_copy() {
        let mut file_buffer = vec![0u8; 4096];
        let mut hbin = make_hbin(0, 0x1000, &[]);
        // A tiny allocated cell at hbin-relative offset 0x20: size -16, tag "xx".
        let cell_offset_in_hbin = 0x20usize;
        hbin[cell_offset_in_hbin..cell_offset_in_hbin + 4]
            .copy_from_slice(&(-16i32).to_le_bytes());
        hbin[cell_offset_in_hbin + 4..cell_offset_in_hbin + 6].copy_from_slice(b"xx");
        file_buffer.extend_from_slice(&hbin);

        let index = CellIndex::build(&file_buffer, 0x1000).unwrap();
        let resolved = index.resolve(&file_buffer, 0x20, 0x400_0000).unwrap();
        assert_eq!(16, resolved.as_slice().len());
        assert_eq!(b"xx", &resolved.as_slice()[4..6]);
    }
}
