use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use super::dir::{decode_oem_string, DIR_ENTRY_SIZE};
use crate::error::Fat12Error;

/// Bytes of the boot sector the engine decodes (BPB plus extended fields).
pub const BOOT_SECTOR_LEN: usize = 62;

// Boot sector field offsets
const OEM_NAME: usize = 3;
const BYTES_PER_SECTOR: usize = 11;
const SECTORS_PER_CLUSTER: usize = 13;
const RESERVED_SECTORS: usize = 14;
const FAT_COPIES: usize = 16;
const MAX_ROOT_ENTRIES: usize = 17;
const SMALL_SECTORS: usize = 19;
const MEDIA_DESCRIPTOR: usize = 21;
const SECTORS_PER_FAT: usize = 22;
const SECTORS_PER_TRACK: usize = 24;
const HEADS: usize = 26;
const HIDDEN_SECTORS: usize = 28;
const LARGE_SECTORS: usize = 32;
const BOOT_SIGNATURE: usize = 38;
const VOLUME_ID: usize = 39;
const VOLUME_LABEL: usize = 43;
const FS_TYPE: usize = 54;

pub const OEM_NAME_LEN: usize = 8;
pub const VOLUME_LABEL_LEN: usize = 11;
pub const FS_TYPE_LEN: usize = 8;

const FAT12_TAG: &[u8] = b"FAT12";

/// Decoded FAT12 boot sector.
#[derive(Debug, Clone, PartialEq)]
pub struct BootSector {
    pub oem_name: [u8; OEM_NAME_LEN],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_copies: u8,
    pub max_root_entries: u16,
    /// 16-bit sector count; zero means `large_sectors` holds the count.
    pub small_sectors: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub large_sectors: u32,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; VOLUME_LABEL_LEN],
    pub fs_type: [u8; FS_TYPE_LEN],
}

impl BootSector {
    /// Decode the boot sector at the start of `image`.
    ///
    /// The file-system-type tag must contain `FAT12`; that is the only
    /// format check made here; `Geometry::validate` covers the layout.
    pub fn parse(image: &[u8]) -> Result<Self, Fat12Error> {
        if image.len() < BOOT_SECTOR_LEN {
            return Err(Fat12Error::OutOfBounds {
                region: "boot sector",
                end: BOOT_SECTOR_LEN as u64,
                image_len: image.len() as u64,
            });
        }

        let mut fs_type = [0u8; FS_TYPE_LEN];
        fs_type.copy_from_slice(&image[FS_TYPE..FS_TYPE + FS_TYPE_LEN]);
        if !fs_type.windows(FAT12_TAG.len()).any(|w| w == FAT12_TAG) {
            return Err(Fat12Error::InvalidFileSystem(
                "disk doesn't list file system type as \"FAT12\"".into(),
            ));
        }

        let mut oem_name = [0u8; OEM_NAME_LEN];
        oem_name.copy_from_slice(&image[OEM_NAME..OEM_NAME + OEM_NAME_LEN]);
        let mut volume_label = [0u8; VOLUME_LABEL_LEN];
        volume_label.copy_from_slice(&image[VOLUME_LABEL..VOLUME_LABEL + VOLUME_LABEL_LEN]);

        Ok(Self {
            oem_name,
            bytes_per_sector: LittleEndian::read_u16(&image[BYTES_PER_SECTOR..]),
            sectors_per_cluster: image[SECTORS_PER_CLUSTER],
            reserved_sectors: LittleEndian::read_u16(&image[RESERVED_SECTORS..]),
            fat_copies: image[FAT_COPIES],
            max_root_entries: LittleEndian::read_u16(&image[MAX_ROOT_ENTRIES..]),
            small_sectors: LittleEndian::read_u16(&image[SMALL_SECTORS..]),
            media_descriptor: image[MEDIA_DESCRIPTOR],
            sectors_per_fat: LittleEndian::read_u16(&image[SECTORS_PER_FAT..]),
            sectors_per_track: LittleEndian::read_u16(&image[SECTORS_PER_TRACK..]),
            heads: LittleEndian::read_u16(&image[HEADS..]),
            hidden_sectors: LittleEndian::read_u32(&image[HIDDEN_SECTORS..]),
            large_sectors: LittleEndian::read_u32(&image[LARGE_SECTORS..]),
            boot_signature: image[BOOT_SIGNATURE],
            volume_id: LittleEndian::read_u32(&image[VOLUME_ID..]),
            volume_label,
            fs_type,
        })
    }

    /// Serialize back into the first `BOOT_SECTOR_LEN` bytes of `out`.
    /// The jump instruction (bytes 0..3) is left untouched.
    pub fn write_to(&self, out: &mut [u8]) {
        out[OEM_NAME..OEM_NAME + OEM_NAME_LEN].copy_from_slice(&self.oem_name);
        LittleEndian::write_u16(&mut out[BYTES_PER_SECTOR..], self.bytes_per_sector);
        out[SECTORS_PER_CLUSTER] = self.sectors_per_cluster;
        LittleEndian::write_u16(&mut out[RESERVED_SECTORS..], self.reserved_sectors);
        out[FAT_COPIES] = self.fat_copies;
        LittleEndian::write_u16(&mut out[MAX_ROOT_ENTRIES..], self.max_root_entries);
        LittleEndian::write_u16(&mut out[SMALL_SECTORS..], self.small_sectors);
        out[MEDIA_DESCRIPTOR] = self.media_descriptor;
        LittleEndian::write_u16(&mut out[SECTORS_PER_FAT..], self.sectors_per_fat);
        LittleEndian::write_u16(&mut out[SECTORS_PER_TRACK..], self.sectors_per_track);
        LittleEndian::write_u16(&mut out[HEADS..], self.heads);
        LittleEndian::write_u32(&mut out[HIDDEN_SECTORS..], self.hidden_sectors);
        LittleEndian::write_u32(&mut out[LARGE_SECTORS..], self.large_sectors);
        out[BOOT_SIGNATURE] = self.boot_signature;
        LittleEndian::write_u32(&mut out[VOLUME_ID..], self.volume_id);
        out[VOLUME_LABEL..VOLUME_LABEL + VOLUME_LABEL_LEN].copy_from_slice(&self.volume_label);
        out[FS_TYPE..FS_TYPE + FS_TYPE_LEN].copy_from_slice(&self.fs_type);
    }

    /// Sector count, taken from `small_sectors` unless it is zero.
    pub fn total_sectors(&self) -> u32 {
        if self.small_sectors != 0 {
            self.small_sectors as u32
        } else {
            self.large_sectors
        }
    }

    pub fn oem_name_string(&self) -> String {
        decode_oem_string(&self.oem_name).trim_end().to_string()
    }

    pub fn volume_label_string(&self) -> String {
        decode_oem_string(&self.volume_label).trim_end().to_string()
    }
}

/// Byte offsets and sizes derived from the boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bytes_per_sector: u64,
    /// Bytes per allocation unit.
    pub cluster_size: u64,
    pub fat_copies: u8,
    /// Size of one FAT copy in bytes.
    pub fat_bytes: u64,
    pub fat1_offset: u64,
    pub fat2_offset: u64,
    pub root_offset: u64,
    pub data_offset: u64,
    pub total_size: u64,
    pub max_root_entries: u16,
    /// Number of 12-bit entries one FAT copy can hold.
    pub fat_entry_count: u32,
}

impl Geometry {
    pub fn from_boot(boot: &BootSector) -> Self {
        let bps = boot.bytes_per_sector as u64;
        let fat_bytes = boot.sectors_per_fat as u64 * bps;
        let fat1_offset = boot.reserved_sectors as u64 * bps;
        let root_offset = fat1_offset + boot.fat_copies as u64 * fat_bytes;
        Self {
            bytes_per_sector: bps,
            cluster_size: bps * boot.sectors_per_cluster as u64,
            fat_copies: boot.fat_copies,
            fat_bytes,
            fat1_offset,
            fat2_offset: fat1_offset + fat_bytes,
            root_offset,
            data_offset: root_offset + boot.max_root_entries as u64 * DIR_ENTRY_SIZE as u64,
            total_size: boot.total_sectors() as u64 * bps,
            max_root_entries: boot.max_root_entries,
            // Two entries per three bytes
            fat_entry_count: (2 * fat_bytes / 3) as u32,
        }
    }

    /// Check that every derived region is non-degenerate and lies inside an
    /// image of `image_len` bytes.
    pub fn validate(&self, image_len: u64) -> Result<(), Fat12Error> {
        if self.bytes_per_sector == 0 {
            return Err(Fat12Error::InvalidFileSystem(
                "bytes per sector is zero".into(),
            ));
        }
        if self.cluster_size == 0 {
            return Err(Fat12Error::InvalidFileSystem(
                "sectors per cluster is zero".into(),
            ));
        }
        if self.fat_copies == 0 || self.fat_bytes == 0 {
            return Err(Fat12Error::InvalidFileSystem(
                "volume has no file allocation table".into(),
            ));
        }
        if self.fat1_offset < BOOT_SECTOR_LEN as u64 {
            return Err(Fat12Error::InvalidFileSystem(
                "first FAT overlaps the boot sector".into(),
            ));
        }

        let regions = [
            ("boot sector", BOOT_SECTOR_LEN as u64),
            ("FAT region", self.root_offset),
            ("root directory", self.data_offset),
            ("volume", self.total_size),
        ];
        for (region, end) in regions {
            if end > image_len {
                return Err(Fat12Error::OutOfBounds {
                    region,
                    end,
                    image_len,
                });
            }
        }
        if self.data_offset > self.total_size {
            return Err(Fat12Error::InvalidFileSystem(format!(
                "data region starts at {} past the volume end {}",
                self.data_offset, self.total_size
            )));
        }
        Ok(())
    }

    /// Byte offset of FAT copy `copy` (0-based).
    pub fn fat_offset(&self, copy: u8) -> u64 {
        self.fat1_offset + copy as u64 * self.fat_bytes
    }

    /// Byte offset of a data cluster (clusters are numbered from 2).
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        self.data_offset + (cluster as u64 - 2) * self.cluster_size
    }

    /// Byte offset of root directory slot `slot`.
    pub fn slot_offset(&self, slot: usize) -> u64 {
        self.root_offset + (slot * DIR_ENTRY_SIZE) as u64
    }

    pub fn root_slots(&self) -> usize {
        self.max_root_entries as usize
    }

    /// Number of whole clusters in the data region.
    pub fn data_clusters(&self) -> u64 {
        self.total_size.saturating_sub(self.data_offset) / self.cluster_size
    }

    /// Exclusive upper bound on cluster indices whose data lies inside the
    /// volume and whose entry exists in the table.
    pub fn cluster_limit(&self) -> u32 {
        let by_region = (self.data_clusters() + 2).min(u32::MAX as u64) as u32;
        by_region.min(self.fat_entry_count)
    }
}

/// Decode the boot sector of `image` and derive its validated geometry.
pub fn resolve(image: &[u8]) -> Result<(BootSector, Geometry), Fat12Error> {
    let boot = BootSector::parse(image)?;
    let geometry = Geometry::from_boot(&boot);
    geometry.validate(image.len() as u64)?;
    debug!(
        "geometry: FAT1 @{} FAT2 @{} root @{} data @{} total {} ({} FAT entries)",
        geometry.fat1_offset,
        geometry.fat2_offset,
        geometry.root_offset,
        geometry.data_offset,
        geometry.total_size,
        geometry.fat_entry_count
    );
    Ok((boot, geometry))
}
