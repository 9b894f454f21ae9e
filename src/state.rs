//! Decode-context record threaded into value-content resolution: the raw
//! file buffer plus enough position bookkeeping to turn a hive-relative
//! offset in a VK back into an absolute slice.

#[derive(Clone, Copy, Debug, Default)]
pub struct State<'a> {
    /// `file_buffer.as_ptr() as usize` at the time the buffer was captured;
    /// diagnostic-only, not used for addressing.
    pub file_start_pos: usize,
    /// Absolute offset of the hive bin data area (always 0x1000 for a
    /// single-file hive, kept explicit for symmetry with multi-segment
    /// layouts the decoder doesn't otherwise assume).
    pub hbin_offset: u32,
    pub file_buffer: &'a [u8],
}

impl<'a> State<'a> {
    pub fn new(file_buffer: &'a [u8], hbin_offset: u32) -> Self {
        State {
            file_start_pos: file_buffer.as_ptr() as usize,
            hbin_offset,
            file_buffer,
        }
    }

    /// Resolves a hive-relative offset to an absolute slice starting there.
    pub fn slice_at(&self, hive_relative_offset: u32) -> Option<&'a [u8]> {
        let abs = self.hbin_offset as usize + hive_relative_offset as usize;
        self.file_buffer.get(abs..)
    }

    /// Index into `key_path` just past the root key's own name segment, so
    /// callers can compare the remainder against a query built without the
    /// root in it. A path with no separator (the root itself) returns its
    /// full length.
    pub fn get_root_path_offset(&self, key_path: &str) -> usize {
        match key_path.find('\\') {
            Some(pos) => pos + 1,
            None => key_path.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_at() {
        let buf = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let state = State::new(&buf, 2);
        assert_eq!(Some(&buf[4..]), state.slice_at(2));
    }

    #[test]
    fn test_get_root_path_offset() {
        let state = State::default();
        assert_eq!(5, state.get_root_path_offset(r"root\child\grandchild"));
        assert_eq!(4, state.get_root_path_offset("root"));
    }
}
