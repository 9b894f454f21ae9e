//! REGF header decode/encode (component B/H). Structure comments adapted
//! from <https://github.com/msuhanov/regf/blob/master/Windows%20registry%20file%20format%20specification.md#base-block>.

use crate::impl_enum_from_value;
use crate::log::{LogCode, Logs};
use crate::util;
use chrono::{DateTime, Utc};
use enum_primitive_derive::Primitive;
use nom::{
    bytes::complete::tag,
    bytes::streaming::take,
    number::complete::{le_i32, le_u32, le_u64},
    IResult,
};
use num_traits::FromPrimitive;
use serde::Serialize;
use std::mem;
use winstructs::guid::Guid;

pub const HEADER_SIZE: usize = 4096;
const CHECKSUMMED_BYTES: usize = 0x1FC;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Primitive, Serialize)]
#[repr(u32)]
pub enum FileType {
    Primary = 0,
    TransactionLog = 1,
    TransactionLogNewFormat = 6,
    Unknown = 0x0fffffff,
}
impl_enum_from_value! { FileType }

#[derive(Clone, Copy, Debug, Eq, PartialEq, Primitive, Serialize)]
#[repr(u32)]
pub enum FileFormat {
    DirectMemoryLoad = 1,
    Unknown = 0x0fffffff,
}
impl_enum_from_value! { FileFormat }

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RegHeader {
    pub base: RegHeaderBase,
    pub ext: RegHeaderExtended,
}

impl RegHeader {
    /// Parses the registry file header.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, base) = RegHeaderBase::from_bytes(input)?;
        let (input, ext) = RegHeaderExtended::from_bytes(input)?;

        Ok((input, Self { base, ext }))
    }

    /// Encodes the header back to its on-disk 4096-byte representation,
    /// with a freshly computed checksum over the preceding bytes (spec
    /// §4.I step 4).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.base.to_bytes_unchecksummed();
        debug_assert_eq!(buf.len(), CHECKSUMMED_BYTES);
        let checksum = RegHeaderBase::calculate_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(&self.ext.to_bytes());
        buf.resize(HEADER_SIZE, 0);
        buf
    }

    /// True if the checksum stored at 0x1FC matches the XOR of the first
    /// 127 little-endian u32 words, and the two sequence numbers agree
    /// (a "clean" hive per spec §3).
    pub fn is_clean(&self) -> bool {
        self.base.primary_sequence_number == self.base.secondary_sequence_number
            && self.base.checksum == RegHeaderBase::calculate_checksum(&self.base.to_bytes_unchecksummed())
    }
}

// Structure comments adapted from https://github.com/msuhanov/regf/blob/master/Windows%20registry%20file%20format%20specification.md#base-block

/// Contains the data found in the header of both primary and log registry files
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RegHeaderBase {
    /// This number is incremented by 1 in the beginning of a write operation on the primary file.
    pub primary_sequence_number: u32,
    /// This number is incremented by 1 at the end of a write operation on the primary file. The primary sequence number and the secondary sequence number should be equal after a successful write operation.
    pub secondary_sequence_number: u32,
    pub last_modification_date_and_time: DateTime<Utc>,
    pub major_version: u32,
    pub minor_version: u32,
    pub file_type: FileType,
    pub format: FileFormat,
    /// Offset of the root cell in bytes, relative from the start of the hive bin's data.
    pub root_cell_offset_relative: i32,
    pub hive_bins_data_size: u32,
    /// Logical sector size of the underlying disk in bytes divided by 512.
    pub clustering_factor: u32,
    /// UTF-16LE string (contains a partial file path to the primary file, or a file name of the primary file).
    pub filename: String,
    #[serde(serialize_with = "util::data_as_hex")]
    pub unk2: Vec<u8>,
    /// XOR-32 checksum of the previous 508 bytes
    pub checksum: u32,
    pub logs: Logs,
}

impl RegHeaderBase {
    /// Parses the registry file header.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _signature) = tag("regf")(input)?;
        let (input, primary_sequence_number) = le_u32(input)?;
        let (input, secondary_sequence_number) = le_u32(input)?;
        let (input, last_modification_date_and_time) = le_u64(input)?;
        let (input, major_version) = le_u32(input)?;
        let (input, minor_version) = le_u32(input)?;
        let (input, file_type_bytes) = le_u32(input)?;
        let (input, format_bytes) = le_u32(input)?;
        let (input, root_cell_offset_relative) = le_i32(input)?;
        let (input, hive_bins_data_size) = le_u32(input)?;
        let (input, clustering_factor) = le_u32(input)?;
        let (input, filename_bytes) = take(64usize)(input)?;
        let (input, unk2) = take(396usize)(input)?;
        let (input, checksum) = le_u32(input)?;

        let mut logs = Logs::default();
        Ok((
            input,
            Self {
                primary_sequence_number,
                secondary_sequence_number,
                last_modification_date_and_time: util::get_date_time_from_filetime(
                    last_modification_date_and_time,
                ),
                major_version,
                minor_version,
                file_type: FileType::from_value(file_type_bytes, &mut logs),
                format: FileFormat::from_value(format_bytes, &mut logs),
                root_cell_offset_relative,
                hive_bins_data_size,
                clustering_factor,
                filename: util::read_utf16_le_string(filename_bytes, 64, &mut logs, "Filename").map_err(|_| {
                    nom::Err::Failure(nom::error::Error::new(filename_bytes, nom::error::ErrorKind::Verify))
                })?,
                unk2: unk2.to_vec(),
                checksum,
                logs,
            },
        ))
    }

    pub(crate) fn calculate_checksum(bytes: &[u8]) -> u32 {
        let mut index = 0;
        let mut xsum = 0;

        let slice_to_u32 = |s: &[u8]| -> [u8; 4] { s.try_into().expect("slice with incorrect length") };
        let size_of_u32 = mem::size_of::<u32>();

        while index <= 0x01FB {
            xsum ^= u32::from_le_bytes(slice_to_u32(&bytes[index..index + size_of_u32]));
            index += size_of_u32;
        }
        match xsum {
            0 => 1,
            0xFFFFFFFF => 0xFFFFFFFE,
            _ => xsum,
        }
    }

    /// Encodes every field up to (but not including) the checksum itself,
    /// so the caller can compute the checksum over exactly these bytes.
    fn to_bytes_unchecksummed(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHECKSUMMED_BYTES);
        buf.extend_from_slice(b"regf");
        buf.extend_from_slice(&self.primary_sequence_number.to_le_bytes());
        buf.extend_from_slice(&self.secondary_sequence_number.to_le_bytes());
        buf.extend_from_slice(
            &util::get_filetime_from_date_time(self.last_modification_date_and_time).to_le_bytes(),
        );
        buf.extend_from_slice(&self.major_version.to_le_bytes());
        buf.extend_from_slice(&self.minor_version.to_le_bytes());
        buf.extend_from_slice(&(self.file_type as u32).to_le_bytes());
        buf.extend_from_slice(&(self.format as u32).to_le_bytes());
        buf.extend_from_slice(&self.root_cell_offset_relative.to_le_bytes());
        buf.extend_from_slice(&self.hive_bins_data_size.to_le_bytes());
        buf.extend_from_slice(&self.clustering_factor.to_le_bytes());

        let mut filename_bytes: Vec<u8> = self.filename.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        filename_bytes.resize(64, 0);
        buf.extend_from_slice(&filename_bytes);

        let mut unk2 = self.unk2.clone();
        unk2.resize(396, 0);
        buf.extend_from_slice(&unk2);
        buf
    }
}

/// Contains the additional data found in the header of a primary registry files
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RegHeaderExtended {
    pub reserved: FileBaseBlockReserved,
    pub boot_type: u32,
    pub boot_recover: u32,
}

impl RegHeaderExtended {
    /// Parses the registry file header.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, reserved) = FileBaseBlockReserved::from_bytes(input)?;
        let (input, boot_type) = le_u32(input)?;
        let (input, boot_recover) = le_u32(input)?;

        Ok((
            input,
            Self {
                reserved,
                boot_type,
                boot_recover,
            },
        ))
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.reserved.to_bytes();
        buf.extend_from_slice(&self.boot_type.to_le_bytes());
        buf.extend_from_slice(&self.boot_recover.to_le_bytes());
        buf
    }
}

// Relevant to win10+. See https://github.com/msuhanov/regf/blob/master/Windows%20registry%20file%20format%20specification.md#base-block for additional info in this area
#[derive(Clone, Debug, Serialize)]
pub struct FileBaseBlockReserved {
    pub rm_id: Guid,
    pub log_id: Guid,
    pub flags: FileBaseBlockReservedFlags,
    pub tm_id: Guid,
    pub signature: u32,
    pub last_reorganized_timestamp: DateTime<Utc>,
    #[serde(serialize_with = "util::data_as_hex")]
    pub remaining: Vec<u8>,
    pub logs: Logs,
    /// Raw 16-byte encodings of `rm_id`/`log_id`/`tm_id`, kept alongside the
    /// decoded [`Guid`]s purely so [`FileBaseBlockReserved::to_bytes`] can
    /// round-trip this opaque block byte-for-byte without depending on
    /// `Guid` exposing its own byte representation.
    #[serde(skip)]
    raw_guids: [[u8; 16]; 3],
}

impl Eq for FileBaseBlockReserved {}

impl PartialEq for FileBaseBlockReserved {
    fn eq(&self, other: &Self) -> bool {
        self.rm_id == other.rm_id
            && self.log_id == other.log_id
            && self.flags == other.flags
            && self.tm_id == other.tm_id
            && self.signature == other.signature
            && self.last_reorganized_timestamp == other.last_reorganized_timestamp
            && self.remaining == other.remaining
    }
}

impl FileBaseBlockReserved {
    /// Uses nom to parse the file base block reserved structure.
    pub fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, rm_id) = take(16usize)(input)?;
        let (input, log_id) = take(16usize)(input)?;
        let (input, flags) = le_u32(input)?;
        let (input, tm_id) = take(16usize)(input)?;
        let (input, signature) = le_u32(input)?;
        let (input, last_reorganized_timestamp) = le_u64(input)?;
        let (input, remaining) = take(3512usize)(input)?;

        let mut logs = Logs::default();
        let to16 = |s: &[u8]| -> [u8; 16] { s.try_into().expect("take(16) guarantees length") };
        Ok((
            input,
            FileBaseBlockReserved {
                rm_id: util::get_guid_from_buffer(rm_id, &mut logs),
                log_id: util::get_guid_from_buffer(log_id, &mut logs),
                flags: FileBaseBlockReservedFlags::from_value(flags, &mut logs),
                tm_id: util::get_guid_from_buffer(tm_id, &mut logs),
                signature,
                last_reorganized_timestamp: util::get_date_time_from_filetime(
                    last_reorganized_timestamp,
                ),
                remaining: remaining.to_vec(),
                logs,
                raw_guids: [to16(rm_id), to16(log_id), to16(tm_id)],
            },
        ))
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3576);
        buf.extend_from_slice(&self.raw_guids[0]);
        buf.extend_from_slice(&self.raw_guids[1]);
        buf.extend_from_slice(&(self.flags as u32).to_le_bytes());
        buf.extend_from_slice(&self.raw_guids[2]);
        buf.extend_from_slice(&self.signature.to_le_bytes());
        buf.extend_from_slice(
            &util::get_filetime_from_date_time(self.last_reorganized_timestamp).to_le_bytes(),
        );
        let mut remaining = self.remaining.clone();
        remaining.resize(3512, 0);
        buf.extend_from_slice(&remaining);
        buf
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Primitive, Serialize)]
#[repr(u32)]
pub enum FileBaseBlockReservedFlags {
    None = 0,
    /// KTM locked the hive (there are pending or anticipated transactions)
    KtmLockedHive = 1,
    /// The hive has been defragmented (all its pages are dirty therefore) and it is being written to a disk (Windows 8 and Windows Server 2012 only, this flag is used to speed up hive recovery by reading a transaction log file instead of a primary file); this hive supports the layered keys feature (starting from Insider Preview builds of Windows 10 "Redstone 1")
    Ktm2 = 2,
    Unknown = 0x0fffffff,
}
impl_enum_from_value! { FileBaseBlockReservedFlags }
