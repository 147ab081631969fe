//! Options for creating the system partitions.
//!
//! Only the layout decisions live here: partition type, filesystem and which
//! size class applies. Turning a size class into bytes is up to the installer.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// The closed set of system partition labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionLabel {
    Efi,
    Bios,
    Boot,
    Meta,
    State,
    Ephemeral,
    ImageCache,
}

impl PartitionLabel {
    /// Every known label, in on-disk order.
    pub const ALL: [Self; 7] = [
        Self::Efi,
        Self::Bios,
        Self::Boot,
        Self::Meta,
        Self::State,
        Self::Ephemeral,
        Self::ImageCache,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Efi => "EFI",
            Self::Bios => "BIOS",
            Self::Boot => "BOOT",
            Self::Meta => "META",
            Self::State => "STATE",
            Self::Ephemeral => "EPHEMERAL",
            Self::ImageCache => "IMAGECACHE",
        }
    }
}

impl fmt::Display for PartitionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| Error::unknown_partition_label(s))
    }
}

/// GPT partition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionType {
    EfiSystem,
    BiosBoot,
    LinuxFilesystemData,
}

impl PartitionType {
    /// GPT type GUID.
    #[must_use]
    pub const fn guid(&self) -> &'static str {
        match self {
            Self::EfiSystem => "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
            Self::BiosBoot => "21686148-6449-6E6F-744E-656564454649",
            Self::LinuxFilesystemData => "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
        }
    }
}

/// Which size rule applies to a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeClass {
    GrubEfi,
    UkiEfi,
    GrubBios,
    GrubBoot,
    Meta,
    State,
    /// Takes whatever is left on the disk.
    Remaining,
}

/// How the partition is formatted after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOptions {
    /// Filesystem, or `None` for raw partitions.
    pub filesystem: Option<&'static str>,
    pub label: PartitionLabel,
}

impl FormatOptions {
    /// Format options for a label.
    #[must_use]
    pub const fn for_label(label: PartitionLabel) -> Self {
        let filesystem = match label {
            PartitionLabel::Efi => Some("vfat"),
            PartitionLabel::Bios | PartitionLabel::Meta => None,
            PartitionLabel::Boot | PartitionLabel::State | PartitionLabel::Ephemeral => Some("xfs"),
            PartitionLabel::ImageCache => Some("ext4"),
        };
        Self { filesystem, label }
    }
}

/// Everything needed to create one system partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionOptions {
    pub label: PartitionLabel,
    pub partition_type: PartitionType,
    pub size: SizeClass,
    pub format: FormatOptions,
    /// Set the legacy BIOS bootable GPT attribute.
    pub legacy_bios_bootable: bool,
}

impl PartitionOptions {
    /// Resolve the options for `label`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedWithUki`] for the GRUB-only `BIOS` and `BOOT`
    /// partitions when booting a UKI.
    pub fn new(label: PartitionLabel, uki: bool) -> Result<Self> {
        let (partition_type, size, legacy_bios_bootable) = match label {
            PartitionLabel::Efi => (
                PartitionType::EfiSystem,
                if uki { SizeClass::UkiEfi } else { SizeClass::GrubEfi },
                false,
            ),
            PartitionLabel::Bios | PartitionLabel::Boot if uki => {
                return Err(Error::UnsupportedWithUki {
                    label: label.to_string(),
                });
            }
            PartitionLabel::Bios => (PartitionType::BiosBoot, SizeClass::GrubBios, true),
            PartitionLabel::Boot => (PartitionType::LinuxFilesystemData, SizeClass::GrubBoot, false),
            PartitionLabel::Meta => (PartitionType::LinuxFilesystemData, SizeClass::Meta, false),
            PartitionLabel::State => (PartitionType::LinuxFilesystemData, SizeClass::State, false),
            PartitionLabel::Ephemeral | PartitionLabel::ImageCache => {
                (PartitionType::LinuxFilesystemData, SizeClass::Remaining, false)
            }
        };

        Ok(Self {
            label,
            partition_type,
            size,
            format: FormatOptions::for_label(label),
            legacy_bios_bootable,
        })
    }

    /// Resolve the options for a textual label.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPartitionLabel`] plus the errors of [`new`](Self::new).
    pub fn parse(label: &str, uki: bool) -> Result<Self> {
        Self::new(label.parse()?, uki)
    }
}
