//! Options supplied by the driver when creating an archive, plus the fixed
//! codes they map to.

use crate::types::{Subtype, SystemVersion};
use zerocopy::little_endian::U64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorType {
    X86_64,
    ArmV8,
}

impl ProcessorType {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::X86_64 => 0,
            Self::ArmV8 => 1,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::X86_64),
            1 => Some(Self::ArmV8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    CoronaX,
    CorOs,
}

impl SystemType {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::CoronaX => 0,
            Self::CorOs => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CoronaX),
            1 => Some(Self::CorOs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CoronaX => "Corona-X",
            Self::CorOs => "CorOS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Debug,
    Development,
    Release,
    Stable,
}

impl BuildType {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Development => 1,
            Self::Release => 2,
            Self::Stable => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Debug),
            1 => Some(Self::Development),
            2 => Some(Self::Release),
            3 => Some(Self::Stable),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Development => "Development",
            Self::Release => "Release",
            Self::Stable => "Stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Lzma,
    Lzo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    Aes,
    Serpent,
}

/// Compression/encryption/signing intent. Recorded by the driver and carried
/// through creation, but never applied; the archive's reserved fields stay
/// zero. S1 archives accept none of these.
#[derive(Debug, Clone, Default)]
pub struct DataModifiers {
    pub compression: Option<CompressionType>,
    pub compress_toc: bool,
    pub compress_entries: bool,
    pub compress_data: bool,
    pub encryption: Option<EncryptionType>,
    pub signing_certificate: Option<String>,
}

impl DataModifiers {
    pub fn is_empty(&self) -> bool {
        self.compression.is_none() && self.encryption.is_none() && self.signing_certificate.is_none()
    }
}

/// BootX creation parameters. Role paths are absolute paths under the
/// archiving root; unresolved roles leave their header field 0.
#[derive(Debug, Clone)]
pub struct BootOptions {
    pub processor: ProcessorType,
    pub boot_id: u32,
    pub kernel_loader_path: Option<String>,
    pub kernel_path: Option<String>,
    pub boot_config_path: Option<String>,
}

/// SystemImage creation parameters.
#[derive(Debug, Clone)]
pub struct SystemImageOptions {
    pub system: SystemType,
    pub build: BuildType,
    /// Revision letter mapped to 0..=25.
    pub revision: u8,
    pub major_version: u8,
    pub build_id: u64,
    /// Accepted from the driver but not interpreted (reserved).
    pub partition_info_path: Option<String>,
    pub boot_archive_path: Option<String>,
}

impl SystemImageOptions {
    pub fn version(&self) -> SystemVersion {
        SystemVersion {
            system_type: self.system.to_u8(),
            build_type: self.build.to_u8(),
            revision: self.revision,
            major_version: self.major_version,
            build_id: U64::new(self.build_id),
        }
    }
}

/// The subtype-specific half of [`CreateOptions`].
#[derive(Debug, Clone)]
pub enum CreateVariant {
    S1,
    S2,
    BootX(BootOptions),
    SystemImage(SystemImageOptions),
}

impl CreateVariant {
    pub fn subtype(&self) -> Subtype {
        match self {
            Self::S1 => Subtype::S1,
            Self::S2 => Subtype::S2,
            Self::BootX(_) => Subtype::BootX,
            Self::SystemImage(_) => Subtype::SystemImage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub root_directory: String,
    pub variant: CreateVariant,
    pub modifiers: DataModifiers,
}

impl CreateOptions {
    pub fn new(root_directory: impl Into<String>, variant: CreateVariant) -> Self {
        Self {
            root_directory: root_directory.into(),
            variant,
            modifiers: DataModifiers::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: DataModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}
