//! A library for reading, validating, editing, and writing Windows Registry
//! hive (REGF) files.
//!
//! [`reader::Reader`] opens an existing hive for navigation and typed value
//! access, with an opt-in [`diagnostics`] layer for structural repair
//! analysis. [`editor::Transaction`] builds a copy-on-write edit plan against
//! an open reader; [`emitter`] turns a committed plan into a fresh byte
//! image. [`reg_import`] parses `.reg` text into an optimized op sequence
//! that can be applied through the same editor.

pub mod cell_big_data;
pub mod cell_index;
pub mod cell_key_node;
pub mod cell_key_security;
pub mod cell_key_value;
pub mod cell_value;
pub mod diagnostics;
pub mod editor;
pub mod emitter;
pub mod err;
pub mod filter;
pub mod hive_bin_cell;
pub mod hive_bin_header;
pub mod log;
mod macros;
pub mod reader;
pub mod reg_header;
pub mod reg_import;
pub mod state;
pub mod sub_key_list_lf;
pub mod sub_key_list_li;
pub mod sub_key_list_ri;
pub mod util;

pub use err::{Error, Result};
pub use reader::{Reader, ReaderOptions};

/// Opens a hive from an in-memory byte buffer with default options (spec §6
/// `open`). Equivalent to `Reader::open(bytes, ReaderOptions::default())`.
pub fn open(bytes: &[u8]) -> Result<Reader> {
    Reader::open(bytes, ReaderOptions::default())
}
