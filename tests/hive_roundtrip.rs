//! End-to-end coverage across open/edit/commit/reopen and the `.reg`
//! import pipeline, exercised entirely through the public API against a
//! synthetic in-memory hive (no fixture files).

use hivedit::cell_key_value::RegType;
use hivedit::editor::{LimitsPreset, Transaction};
use hivedit::emitter::{CommitOptions, InMemorySink};
use hivedit::hive_bin_header::{HiveBinHeader, HBIN_HEADER_SIZE};
use hivedit::reader::{Reader, ReaderOptions};
use hivedit::reg_header::{FileBaseBlockReserved, FileFormat, FileType, RegHeader, RegHeaderBase, RegHeaderExtended};
use hivedit::util;
use nom::Finish;

fn empty_nk_cell() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"nk");
    payload.extend_from_slice(&0u16.to_le_bytes()); // flags: not root-compressed-named
    payload.extend_from_slice(&0u64.to_le_bytes()); // last_written
    payload.extend_from_slice(&0u32.to_le_bytes()); // access_bits
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // parent_key_offset
    payload.extend_from_slice(&0u32.to_le_bytes()); // number_of_sub_keys
    payload.extend_from_slice(&0u32.to_le_bytes()); // number_of_volatile_sub_keys
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // sub_keys_list_offset
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // volatile_sub_keys_list_offset
    payload.extend_from_slice(&0u32.to_le_bytes()); // number_of_key_values
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // key_values_list_offset
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // security_key_offset
    payload.extend_from_slice(&util::NIL_OFFSET.to_le_bytes()); // class_name_offset
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes()); // name_length
    payload.extend_from_slice(&0u16.to_le_bytes()); // class_name_length

    let size_abs = util::align8(4 + payload.len() as u32);
    payload.resize(size_abs as usize - 4, 0);
    let mut cell = (-(size_abs as i32)).to_le_bytes().to_vec();
    cell.extend_from_slice(&payload);
    cell
}

/// A valid, single-bin hive whose root key has no subkeys or values.
fn empty_hive() -> Vec<u8> {
    let ext = RegHeaderExtended {
        reserved: FileBaseBlockReserved::from_bytes(&[0u8; 3576]).finish().unwrap().1,
        boot_type: 0,
        boot_recover: 0,
    };
    let base = RegHeaderBase {
        primary_sequence_number: 3,
        secondary_sequence_number: 3,
        last_modification_date_and_time: util::get_date_time_from_filetime(129782121007374460),
        major_version: 1,
        minor_version: 5,
        file_type: FileType::Primary,
        format: FileFormat::DirectMemoryLoad,
        root_cell_offset_relative: 0x20,
        hive_bins_data_size: 0x1000,
        clustering_factor: 1,
        filename: "TEST.DAT".to_string(),
        unk2: Vec::new(),
        checksum: 0,
        logs: Default::default(),
    };
    let header = RegHeader { base, ext };
    let mut bytes = header.to_bytes();

    let mut hbin_body = empty_nk_cell();
    let free_size = 0x1000 - HBIN_HEADER_SIZE - hbin_body.len() as u32;
    hbin_body.extend_from_slice(&(free_size as i32).to_le_bytes());
    hbin_body.resize(hbin_body.len() + (free_size as usize - 4), 0);

    let mut hbin = HiveBinHeader { offset: 0, size: 0x1000 }.to_bytes();
    hbin.extend_from_slice(&hbin_body);
    hbin.resize(0x1000, 0);

    bytes.extend_from_slice(&hbin);
    bytes
}

#[test]
fn test_open_edit_commit_reopen_round_trip() {
    let source = empty_hive();
    let reader = Reader::open(&source, ReaderOptions::default()).unwrap();

    let mut txn = Transaction::begin(&reader).unwrap().with_limits(hivedit::editor::Limits::from_preset(LimitsPreset::Default));
    txn.create_key(r"Software\Vendor", true).unwrap();
    txn.set_value(r"Software\Vendor", "Count", RegType::Dword, vec![7, 0, 0, 0]).unwrap();
    txn.set_value(r"Software\Vendor", "Name", RegType::Sz, {
        let mut d: Vec<u8> = "hivedit".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        d.extend_from_slice(&[0, 0]);
        d
    }).unwrap();

    let mut sink = InMemorySink::default();
    txn.commit(&mut sink, &reader, CommitOptions::default()).unwrap();

    let committed = Reader::open(&sink.bytes, ReaderOptions::default()).unwrap();
    assert_eq!(4, committed.info().primary_sequence_number);
    assert_eq!(4, committed.info().secondary_sequence_number);

    let vendor = committed.find(r"Software\Vendor").unwrap();
    let values = committed.values(&vendor).unwrap();
    assert_eq!(2, values.len());

    let count = values.iter().find(|v| v.value_name == "Count").unwrap();
    assert_eq!(7, committed.read_dword(count).unwrap());

    let name = values.iter().find(|v| v.value_name == "Name").unwrap();
    assert_eq!("hivedit", committed.read_string(name).unwrap());
}

#[test]
fn test_delete_key_removes_subtree_on_commit() {
    let source = empty_hive();
    let reader = Reader::open(&source, ReaderOptions::default()).unwrap();

    let mut txn = Transaction::begin(&reader).unwrap();
    txn.create_key(r"Software\Old\Nested", true).unwrap();
    txn.create_key("Software\\New", true).unwrap();
    txn.delete_key(r"Software\Old", true).unwrap();

    let mut sink = InMemorySink::default();
    txn.commit(&mut sink, &reader, CommitOptions::default()).unwrap();

    let committed = Reader::open(&sink.bytes, ReaderOptions::default()).unwrap();
    assert!(committed.find(r"Software\Old").is_err());
    assert!(committed.find("Software\\New").is_ok());
}

#[test]
fn test_reg_import_pipeline_applies_optimized_ops() {
    let source = empty_hive();
    let reader = Reader::open(&source, ReaderOptions::default()).unwrap();

    let text = "Windows Registry Editor Version 5.00\n\n\
        [HKEY_LOCAL_MACHINE\\Software\\Vendor]\n\
        \"Count\"=dword:00000001\n\
        \"Count\"=dword:00000002\n\
        \"Count\"=dword:00000003\n";

    let ops = hivedit::reg_import::parse(text).unwrap();
    let (optimized, stats) = hivedit::reg_import::optimize(ops);
    assert_eq!(2, stats.deduplicated);

    let mut txn = Transaction::begin(&reader).unwrap();
    hivedit::reg_import::apply(&optimized, &mut txn).unwrap();

    let mut sink = InMemorySink::default();
    txn.commit(&mut sink, &reader, CommitOptions::default()).unwrap();

    let committed = Reader::open(&sink.bytes, ReaderOptions::default()).unwrap();
    let vendor = committed.find("Software\\Vendor").unwrap();
    let values = committed.values(&vendor).unwrap();
    assert_eq!(1, values.len());
    assert_eq!(3, committed.read_dword(&values[0]).unwrap());
}
