//! On-disk format descriptors: magic, version tags, header layouts and the
//! fixed codes stored inside them. All multi-byte fields are little-endian.

use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Shared magic of every CAR container.
pub const HEADER_MAGIC: [u8; 4] = *b"CAR!";

pub const HEADER_VERSION_S1: [u8; 4] = *b"0001";
pub const HEADER_VERSION_S2: [u8; 4] = *b"0002";
pub const HEADER_VERSION_BOOTX: [u8; 4] = *b"BOOT";
pub const HEADER_VERSION_SYSTEM: [u8; 4] = *b"SYSM";

/// Block granularity of the SystemImage subtype.
pub const BLOCK_SIZE: u64 = 512;

pub const BOOTX_LOCK_A: u16 = 0xA10C;
pub const BOOTX_LOCK_B: u16 = 0xB10C;

/// SystemImage `boot_entry` value meaning "no boot archive".
pub const BOOT_ENTRY_NONE: u64 = !0;

/// The ToC is followed by a 4-byte gap before the first entry record;
/// `entry_table_offset` points past the gap and ToC slots are relative to it.
pub const ENTRY_TABLE_GAP: u64 = 4;

pub fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// The four container variants sharing the CAR magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    S1,
    S2,
    BootX,
    SystemImage,
}

impl Subtype {
    /// Classifies an archive by its first 8 bytes. Returns `None` for a bad
    /// magic or an unknown version tag; bytes past the first 8 are never
    /// inspected.
    pub fn detect(prefix: &[u8]) -> Option<Self> {
        if prefix.len() < 8 || prefix[0..4] != HEADER_MAGIC {
            return None;
        }
        match <[u8; 4]>::try_from(&prefix[4..8]).unwrap() {
            HEADER_VERSION_S1 => Some(Self::S1),
            HEADER_VERSION_S2 => Some(Self::S2),
            HEADER_VERSION_BOOTX => Some(Self::BootX),
            HEADER_VERSION_SYSTEM => Some(Self::SystemImage),
            _ => None,
        }
    }

    pub fn version(self) -> [u8; 4] {
        match self {
            Self::S1 => HEADER_VERSION_S1,
            Self::S2 => HEADER_VERSION_S2,
            Self::BootX => HEADER_VERSION_BOOTX,
            Self::SystemImage => HEADER_VERSION_SYSTEM,
        }
    }

    /// Size of the fixed header structure.
    pub fn header_len(self) -> u64 {
        match self {
            Self::S1 => size_of::<HeaderS1>() as u64,
            Self::S2 => size_of::<HeaderS2>() as u64,
            Self::BootX => size_of::<HeaderBootX>() as u64,
            Self::SystemImage => size_of::<HeaderSystemImage>() as u64,
        }
    }

    /// Offset of the table of contents. S1 has it right after the header,
    /// S2 and BootX leave room for the data-modification record, and
    /// SystemImage reserves two full blocks.
    pub fn toc_offset(self) -> u64 {
        match self {
            Self::S1 => self.header_len(),
            Self::S2 | Self::BootX => self.header_len() + size_of::<DataModification>() as u64,
            Self::SystemImage => 2 * BLOCK_SIZE,
        }
    }

    /// Alignment of the data section (and, for SystemImage, of the entry
    /// table start as well).
    pub fn data_alignment(self) -> u64 {
        match self {
            Self::SystemImage => BLOCK_SIZE,
            _ => 8,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct HeaderS1 {
    pub magic: [u8; 4],
    pub version: [u8; 4],
    pub entry_table_offset: U64,
    pub data_section_offset: U64,
    pub data_checksum: U32,
    pub header_checksum: U32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct HeaderS2 {
    pub magic: [u8; 4],
    pub version: [u8; 4],
    pub toc_offset: U64,
    pub entry_table_offset: U64,
    pub data_section_offset: U64,
    /// Offset of the [`DataModification`] record.
    pub data_modification: U64,
    pub archive_signature: U64,
    pub data_checksum: U32,
    pub header_checksum: U32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct HeaderBootX {
    pub magic: [u8; 4],
    pub version: [u8; 4],
    pub processor_type: U16,
    pub boot_id: U32,
    /// Sentinel 0xA10C.
    pub lock_a: U16,
    /// ToC slot index of the kernel loader, 0 if unresolved.
    pub kernel_loader_entry: U16,
    pub kernel_entry: U16,
    pub boot_config_entry: U16,
    /// Sentinel 0xB10C.
    pub lock_b: U16,
    pub entry_table_offset: U64,
    pub data_section_offset: U64,
    pub data_checksum: U32,
    pub header_checksum: U32,
}

/// Version identity embedded in a SystemImage header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct SystemVersion {
    pub system_type: u8,
    pub build_type: u8,
    /// Revision letter, stored as 0..=25 for 'A'..='Z'.
    pub revision: u8,
    pub major_version: u8,
    pub build_id: U64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct HeaderSystemImage {
    pub magic: [u8; 4],
    pub version: [u8; 4],
    pub system_version: SystemVersion,
    pub toc_offset: U64,
    pub entry_table_offset: U64,
    pub data_section_offset: U64,
    pub data_modification: U64,
    pub archive_signature: U64,
    /// ToC slot index of the boot archive, [`BOOT_ENTRY_NONE`] if absent.
    pub boot_entry: U64,
    pub data_checksum: U32,
    pub header_checksum: U32,
}

/// Reserved record describing compression/encryption applied to the archive.
/// Always written zeroed; a non-zero count on read only produces a warning.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct DataModification {
    pub compression_count: u8,
    pub encryption_count: u8,
    pub reserved: [u8; 6],
}
