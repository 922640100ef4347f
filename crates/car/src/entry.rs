//! Entry records: the fixed per-entry prefixes stored in the entry table and
//! the bounds-checked decoder that turns a ToC slot into an [`Entry`].
//!
//! Every record is immediately followed by its NUL-terminated path and
//! zero padding out to the next 8-byte boundary relative to the entry table
//! anchor. S2 and BootX shorten directory records by dropping the two data
//! fields; SystemImage uses its own wider records carrying topology links.

use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::types::Subtype;
use crate::{Error, Result};

/// Special-flags byte of a SystemImage directory record.
pub const SYSTEM_FLAGS_DIRECTORY: u8 = 0xDD;
/// Special-flags byte of a SystemImage file or link record.
pub const SYSTEM_FLAGS_FILE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Link,
    Meta,
    Unknown(u8),
}

impl EntryKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Directory,
            1 => Self::File,
            2 => Self::Link,
            3 => Self::Meta,
            value => Self::Unknown(value),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Directory => 0,
            Self::File => 1,
            Self::Link => 2,
            Self::Meta => 3,
            Self::Unknown(value) => value,
        }
    }

    /// Single-letter tag used by listings and verbose output.
    pub fn type_char(self) -> char {
        match self {
            Self::Directory => 'D',
            Self::File => 'F',
            Self::Link => 'L',
            Self::Meta => 'M',
            Self::Unknown(_) => '?',
        }
    }
}

bitflags::bitflags! {
    /// Per-entry flags of the S2 and BootX record shape.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        /// A Meta entry carrying a payload keeps the full record shape.
        const META_HAS_DATA = 0b0000_0001;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct RawEntryS1 {
    pub kind: u8,
    pub reserved: [u8; 7],
    pub data_offset: U64,
    pub data_size: U64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct RawEntryS2 {
    pub kind: u8,
    pub flags: u8,
    pub reserved: [u8; 6],
    pub data_offset: U64,
    pub data_size: U64,
}

/// The shortened S2/BootX record used for directories and data-less Meta
/// entries; the two trailing u64 fields are omitted.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct RawEntryS2Short {
    pub kind: u8,
    pub flags: u8,
    pub reserved: [u8; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct RawSystemDirectoryEntry {
    pub kind: u8,
    pub special_flags: u8,
    pub reserved: [u8; 6],
    pub parent_entry: U64,
    pub next_entry: U64,
    pub first_entry: U64,
    pub entry_count: U32,
    pub reserved2: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct RawSystemFileEntry {
    pub kind: u8,
    pub special_flags: u8,
    pub reserved: [u8; 6],
    pub parent_entry: U64,
    pub next_entry: U64,
    pub data_offset: U64,
    pub data_size: U64,
}

/// SystemImage tree links, in entry IDs (1-based, 0 meaning "none").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Topology {
    pub parent: u64,
    pub next_sibling: u64,
    pub first_child: u64,
    pub children: u32,
}

/// A decoded entry, independent of the record shape it was stored in.
#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: EntryKind,
    pub flags: u8,
    /// Offset of the payload relative to the data section; 0 for
    /// directories.
    pub data_offset: u64,
    pub data_size: u64,
    /// Present only for SystemImage archives.
    pub topology: Option<Topology>,
    /// Archive-relative path, always starting with `/`.
    pub path: String,
}

/// Returns the fixed record length the writer uses for an entry of `kind`
/// in the given subtype.
pub fn record_len(subtype: Subtype, kind: EntryKind) -> usize {
    match subtype {
        Subtype::S1 => size_of::<RawEntryS1>(),
        Subtype::S2 | Subtype::BootX => match kind {
            EntryKind::Directory => size_of::<RawEntryS2Short>(),
            _ => size_of::<RawEntryS2>(),
        },
        Subtype::SystemImage => match kind {
            EntryKind::Directory => size_of::<RawSystemDirectoryEntry>(),
            _ => size_of::<RawSystemFileEntry>(),
        },
    }
}

/// Number of zero bytes after a path whose terminator ends at relative
/// offset `end`, bringing the write head to the next 8-byte boundary.
pub fn path_padding(end: u64) -> u64 {
    ((end - 1) & !7) + 8 - end
}

fn read_path(table: &[u8], offset: usize) -> Result<String> {
    let bytes = table
        .get(offset..)
        .ok_or_else(|| Error::invalid_format("entry path out of bounds"))?;
    let len = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::invalid_format("unterminated entry path"))?;
    let path = core::str::from_utf8(&bytes[..len])
        .map_err(|_| Error::invalid_format("entry path is not valid UTF-8"))?;
    Ok(path.to_string())
}

fn read_record<'a, T>(table: &'a [u8], offset: usize) -> Result<&'a T>
where
    T: FromBytes + KnownLayout + Immutable + Unaligned,
{
    let end = offset
        .checked_add(size_of::<T>())
        .ok_or_else(|| Error::invalid_format("entry record out of bounds"))?;
    let bytes = table
        .get(offset..end)
        .ok_or_else(|| Error::invalid_format("entry record out of bounds"))?;
    Ok(T::ref_from_bytes(bytes).expect("sized and unaligned"))
}

/// Decodes the entry record at `offset` (a ToC slot value) inside the entry
/// table. Dispatch is centralized here; every read is validated against the
/// table bounds first.
pub fn decode_entry(subtype: Subtype, table: &[u8], offset: usize) -> Result<Entry> {
    let kind = EntryKind::from_u8(
        *table
            .get(offset)
            .ok_or_else(|| Error::invalid_format("ToC slot points past the entry table"))?,
    );

    match subtype {
        Subtype::S1 => {
            let raw: &RawEntryS1 = read_record(table, offset)?;
            Ok(Entry {
                kind,
                flags: 0,
                data_offset: raw.data_offset.get(),
                data_size: raw.data_size.get(),
                topology: None,
                path: read_path(table, offset + size_of::<RawEntryS1>())?,
            })
        }
        Subtype::S2 | Subtype::BootX => {
            let short: &RawEntryS2Short = read_record(table, offset)?;
            let flags = EntryFlags::from_bits_retain(short.flags);
            let shortened = kind == EntryKind::Directory
                || (kind == EntryKind::Meta && !flags.contains(EntryFlags::META_HAS_DATA));
            if shortened {
                Ok(Entry {
                    kind,
                    flags: short.flags,
                    data_offset: 0,
                    data_size: 0,
                    topology: None,
                    path: read_path(table, offset + size_of::<RawEntryS2Short>())?,
                })
            } else {
                let raw: &RawEntryS2 = read_record(table, offset)?;
                Ok(Entry {
                    kind,
                    flags: raw.flags,
                    data_offset: raw.data_offset.get(),
                    data_size: raw.data_size.get(),
                    topology: None,
                    path: read_path(table, offset + size_of::<RawEntryS2>())?,
                })
            }
        }
        Subtype::SystemImage => {
            if kind == EntryKind::Directory {
                let raw: &RawSystemDirectoryEntry = read_record(table, offset)?;
                Ok(Entry {
                    kind,
                    flags: raw.special_flags,
                    data_offset: 0,
                    data_size: 0,
                    topology: Some(Topology {
                        parent: raw.parent_entry.get(),
                        next_sibling: raw.next_entry.get(),
                        first_child: raw.first_entry.get(),
                        children: raw.entry_count.get(),
                    }),
                    path: read_path(table, offset + size_of::<RawSystemDirectoryEntry>())?,
                })
            } else {
                let raw: &RawSystemFileEntry = read_record(table, offset)?;
                Ok(Entry {
                    kind,
                    flags: raw.special_flags,
                    data_offset: raw.data_offset.get(),
                    data_size: raw.data_size.get(),
                    topology: Some(Topology {
                        parent: raw.parent_entry.get(),
                        next_sibling: raw.next_entry.get(),
                        ..Topology::default()
                    }),
                    path: read_path(table, offset + size_of::<RawSystemFileEntry>())?,
                })
            }
        }
    }
}
