//! CAR container archives
//!
//! The CAR family packs a directory tree (files, symlinks, subdirectories)
//! into a single sealed file with CRC32 integrity checksums and optional
//! boot/system metadata. Four subtypes share the magic but differ in header
//! layout, ToC shape, entry record shape and alignment; see the `types` and
//! `entry` modules for the exact byte layouts.
//!
//! # Example
//! ```no_run
//! use car::{Archive, CreateOptions, CreateVariant, HostFilesystem, create_archive};
//! use car::model::AbortOnError;
//!
//! let options = CreateOptions::new("/tmp/tree", CreateVariant::S1);
//! create_archive(&HostFilesystem, &mut AbortOnError, &options, "/tmp/tree.car")?;
//!
//! let archive = Archive::open("/tmp/tree.car")?;
//! for entry in archive.entries()? {
//!     println!("{} {}", entry.kind.type_char(), entry.path);
//! }
//! # Ok::<(), car::Error>(())
//! ```

pub mod checksum;
pub mod model;
pub mod show;

mod entry;
mod extract;
mod fs;
mod options;
mod types;
mod write;

pub use entry::*;
pub use extract::*;
pub use fs::*;
pub use options::*;
pub use types::*;
pub use write::*;

use checksum::{Crc32, region_checksum_skipping_slot};
use zerocopy::FromBytes;

/// Errors surfaced by archive operations. Only `EnumerationFailure` is
/// recoverable, through the policy injected into the directory walk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not {op} '{path}': {source}")]
    Io {
        op: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[error("invalid archive format: {0}")]
    InvalidFormat(String),
    #[error("header checksum mismatch")]
    CorruptHeader,
    #[error("data checksum mismatch")]
    CorruptData,
    #[error("access denied at '{0}'")]
    AccessDenied(String),
    #[error("could not enumerate directory '{0}'")]
    EnumerationFailure(String),
    #[error("'{0}' exists and is not empty")]
    DestinationExists(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn io(op: &'static str, path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::AccessDenied(path.to_string())
        } else {
            Self::Io {
                op,
                path: path.to_string(),
                source,
            }
        }
    }

    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat(reason.into())
    }
}

pub type Result<T> = core::result::Result<T, Error>;

fn idx(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid_format("offset does not fit in memory"))
}

/// Byte offsets of the three regions following the header.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub toc_offset: u64,
    pub entry_table_offset: u64,
    pub data_section_offset: u64,
}

/// A parsed header, borrowed from the archive buffer.
#[derive(Debug, Clone, Copy)]
pub enum Header<'a> {
    S1(&'a HeaderS1),
    S2(&'a HeaderS2),
    BootX(&'a HeaderBootX),
    SystemImage(&'a HeaderSystemImage),
}

/// A read-only archive loaded into memory. Opening validates the magic and
/// version and verifies both checksums; all further access is through
/// bounds-checked slices.
#[derive(Debug)]
pub struct Archive {
    subtype: Subtype,
    data: Vec<u8>,
}

impl Archive {
    pub fn open(path: &str) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::io("open archive", path, e))?;
        Self::parse(data)
    }

    /// Validates and takes ownership of raw archive bytes.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let subtype = Subtype::detect(&data)
            .ok_or_else(|| Error::invalid_format("unrecognized magic or version"))?;
        let archive = Self { subtype, data };
        archive.verify()?;
        Ok(archive)
    }

    pub fn subtype(&self) -> Subtype {
        self.subtype
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn header_bytes(&self, len: usize) -> Result<&[u8]> {
        self.data
            .get(..len)
            .ok_or_else(|| Error::invalid_format("archive shorter than its header"))
    }

    pub fn header(&self) -> Result<Header<'_>> {
        Ok(match self.subtype {
            Subtype::S1 => Header::S1(
                HeaderS1::ref_from_bytes(self.header_bytes(size_of::<HeaderS1>())?)
                    .expect("sized and unaligned"),
            ),
            Subtype::S2 => Header::S2(
                HeaderS2::ref_from_bytes(self.header_bytes(size_of::<HeaderS2>())?)
                    .expect("sized and unaligned"),
            ),
            Subtype::BootX => Header::BootX(
                HeaderBootX::ref_from_bytes(self.header_bytes(size_of::<HeaderBootX>())?)
                    .expect("sized and unaligned"),
            ),
            Subtype::SystemImage => Header::SystemImage(
                HeaderSystemImage::ref_from_bytes(
                    self.header_bytes(size_of::<HeaderSystemImage>())?,
                )
                .expect("sized and unaligned"),
            ),
        })
    }

    /// Region offsets, validated against the mapping bounds.
    pub fn layout(&self) -> Result<Layout> {
        let (toc_offset, entry_table_offset, data_section_offset) = match self.header()? {
            Header::S1(h) => (
                Subtype::S1.toc_offset(),
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
            ),
            Header::S2(h) => (
                h.toc_offset.get(),
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
            ),
            Header::BootX(h) => (
                Subtype::BootX.toc_offset(),
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
            ),
            Header::SystemImage(h) => (
                h.toc_offset.get(),
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
            ),
        };

        let len = self.size();
        if toc_offset < self.subtype.header_len()
            || entry_table_offset < toc_offset + ENTRY_TABLE_GAP
            || (entry_table_offset - ENTRY_TABLE_GAP - toc_offset) % 8 != 0
            || entry_table_offset > data_section_offset
            || data_section_offset > len
        {
            return Err(Error::invalid_format("impossible region offsets"));
        }

        Ok(Layout {
            toc_offset,
            entry_table_offset,
            data_section_offset,
        })
    }

    fn verify(&self) -> Result<()> {
        let header_len = idx(self.subtype.header_len())?;
        let (region_len, slot) = match self.subtype {
            // The SystemImage header region is one full block.
            Subtype::SystemImage => (idx(BLOCK_SIZE)?, header_len - 4),
            _ => (header_len, header_len - 4),
        };
        let region = self
            .data
            .get(..region_len)
            .ok_or_else(|| Error::invalid_format("archive shorter than its header"))?;

        let stored = u32::from_le_bytes(region[slot..slot + 4].try_into().unwrap());
        if region_checksum_skipping_slot(region, slot) != stored {
            return Err(Error::CorruptHeader);
        }

        let stored_data = match self.header()? {
            Header::S1(h) => h.data_checksum.get(),
            Header::S2(h) => h.data_checksum.get(),
            Header::BootX(h) => h.data_checksum.get(),
            Header::SystemImage(h) => h.data_checksum.get(),
        };
        let mut crc = Crc32::new();
        crc.update(&self.data[header_len..]);
        if crc.finalize() != stored_data {
            return Err(Error::CorruptData);
        }

        // Fail early on impossible offsets rather than at first access.
        self.layout().map(|_| ())
    }

    /// Number of ToC slots. For SystemImage the slot array is padded to a
    /// block boundary, so counting stops at the first zero slot past index
    /// 0 (offsets are strictly increasing, so only slot 0 may be 0).
    pub fn entry_count(&self) -> Result<u64> {
        Ok(self.toc()?.len() as u64)
    }

    fn toc(&self) -> Result<Vec<u64>> {
        let layout = self.layout()?;
        let start = idx(layout.toc_offset)?;
        let end = idx(layout.entry_table_offset - ENTRY_TABLE_GAP)?;
        let mut slots = Vec::with_capacity((end - start) / 8);
        for (i, chunk) in self.data[start..end].chunks_exact(8).enumerate() {
            let offset = u64::from_le_bytes(chunk.try_into().unwrap());
            if self.subtype == Subtype::SystemImage && i > 0 && offset == 0 {
                break;
            }
            slots.push(offset);
        }
        Ok(slots)
    }

    /// Decodes every entry, in ToC order.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let layout = self.layout()?;
        let table = &self.data[idx(layout.entry_table_offset)?..];
        self.toc()?
            .iter()
            .map(|&offset| decode_entry(self.subtype, table, idx(offset)?))
            .collect()
    }

    /// Payload bytes of a file or link entry.
    pub fn entry_data(&self, entry: &Entry) -> Result<&[u8]> {
        let layout = self.layout()?;
        let start = layout
            .data_section_offset
            .checked_add(entry.data_offset)
            .ok_or_else(|| Error::invalid_format("entry data offset overflow"))?;
        let start = idx(start)?;
        let end = start
            .checked_add(idx(entry.data_size)?)
            .ok_or_else(|| Error::invalid_format("entry data length overflow"))?;
        self.data
            .get(start..end)
            .ok_or_else(|| Error::invalid_format("entry data out of bounds"))
    }

    /// The symlink target stored for a link entry.
    pub fn link_target(&self, entry: &Entry) -> Result<String> {
        let bytes = self.entry_data(entry)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::invalid_format("link target is not valid UTF-8"))
    }

    /// The data-modification record, for the subtypes that carry one.
    pub fn data_modification(&self) -> Result<Option<&DataModification>> {
        let offset = match self.header()? {
            Header::S1(_) => return Ok(None),
            Header::S2(h) => h.data_modification.get(),
            Header::BootX(_) => Subtype::BootX.header_len(),
            Header::SystemImage(h) => h.data_modification.get(),
        };
        let start = idx(offset)?;
        let end = start
            .checked_add(size_of::<DataModification>())
            .ok_or_else(|| Error::invalid_format("data-modification record out of bounds"))?;
        let bytes = self
            .data
            .get(start..end)
            .ok_or_else(|| Error::invalid_format("data-modification record out of bounds"))?;
        Ok(Some(
            DataModification::ref_from_bytes(bytes).expect("sized and unaligned"),
        ))
    }
}
