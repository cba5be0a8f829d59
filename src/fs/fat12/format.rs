use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use log::{debug, warn};

use super::boot::{BootSector, Geometry, VOLUME_LABEL_LEN};
use super::dir::DirectoryEntry;
use super::table::{write_fat_entry_mirrored, FAT_END_OF_CHAIN};

const JUMP: [u8; 3] = [0xEB, 0x3C, 0x90];
const OEM_NAME: &[u8; 8] = b"RFAT12  ";
const NO_LABEL: &[u8; VOLUME_LABEL_LEN] = b"NO NAME    ";
const FS_TYPE: &[u8; 8] = b"FAT12   ";
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;
const BOOT_SIGNATURE_OFFSET: usize = 510;
const SECTOR_SIZE: u16 = 512;

/// Standard floppy layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloppyFormat {
    pub name: &'static str,
    pub total_sectors: u16,
    pub sectors_per_cluster: u8,
    pub root_entries: u16,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub media_descriptor: u8,
}

impl FloppyFormat {
    pub const F1440: FloppyFormat = FloppyFormat {
        name: "1.44 MB",
        total_sectors: 2880,
        sectors_per_cluster: 1,
        root_entries: 224,
        sectors_per_fat: 9,
        sectors_per_track: 18,
        heads: 2,
        media_descriptor: 0xF0,
    };

    pub const F720: FloppyFormat = FloppyFormat {
        name: "720 KB",
        total_sectors: 1440,
        sectors_per_cluster: 2,
        root_entries: 112,
        sectors_per_fat: 3,
        sectors_per_track: 9,
        heads: 2,
        media_descriptor: 0xF9,
    };

    /// Look a preset up by its size in KiB (`1440` or `720`).
    pub fn from_kilobytes(kb: u32) -> Option<FloppyFormat> {
        match kb {
            1440 => Some(Self::F1440),
            720 => Some(Self::F720),
            _ => None,
        }
    }

    pub fn image_size(&self) -> usize {
        self.total_sectors as usize * SECTOR_SIZE as usize
    }

    fn boot_sector(&self, label: [u8; VOLUME_LABEL_LEN], volume_id: u32) -> BootSector {
        BootSector {
            oem_name: *OEM_NAME,
            bytes_per_sector: SECTOR_SIZE,
            sectors_per_cluster: self.sectors_per_cluster,
            reserved_sectors: 1,
            fat_copies: 2,
            max_root_entries: self.root_entries,
            small_sectors: self.total_sectors,
            media_descriptor: self.media_descriptor,
            sectors_per_fat: self.sectors_per_fat,
            sectors_per_track: self.sectors_per_track,
            heads: self.heads,
            hidden_sectors: 0,
            large_sectors: 0,
            boot_signature: EXTENDED_BOOT_SIGNATURE,
            volume_id,
            volume_label: label,
            fs_type: *FS_TYPE,
        }
    }
}

/// DOS-style volume serial number for a volume formatted at `when`.
///
/// The low word adds month/day to seconds/hundredths and the high word adds
/// hour/minute to the year.
pub fn volume_id_for(when: NaiveDateTime) -> u32 {
    let hundredths = when.nanosecond() % 1_000_000_000 / 10_000_000;
    let lo = ((when.month() << 8) | when.day()) + ((when.second() << 8) | hundredths);
    let hi = ((when.hour() << 8) | when.minute()) + when.year().max(0) as u32;
    ((hi & 0xFFFF) << 16) | (lo & 0xFFFF)
}

/// Upper-case `label` into 11 space-padded bytes. Characters outside
/// printable ASCII become `_`.
fn label_bytes(label: &str) -> [u8; VOLUME_LABEL_LEN] {
    let mut out = [b' '; VOLUME_LABEL_LEN];
    let chars: Vec<u8> = label
        .trim()
        .chars()
        .map(|c| match c {
            ' '..='~' => c.to_ascii_uppercase() as u8,
            _ => b'_',
        })
        .collect();
    if chars.len() > VOLUME_LABEL_LEN {
        warn!("volume label {label:?} truncated to {VOLUME_LABEL_LEN} characters");
    }
    for (dst, src) in out.iter_mut().zip(chars) {
        *dst = src;
    }
    out
}

/// Build a blank FAT12 image.
///
/// Both FATs get the media marker in entry 0 and an end-of-chain value in
/// entry 1. With a label, the boot sector carries it and the first root
/// slot holds a matching volume-label record.
pub fn format_volume(format: &FloppyFormat, label: Option<&str>, volume_id: u32) -> Vec<u8> {
    let mut image = vec![0u8; format.image_size()];
    let label = label.filter(|l| !l.trim().is_empty()).map(label_bytes);

    let boot = format.boot_sector(label.unwrap_or(*NO_LABEL), volume_id);
    image[..JUMP.len()].copy_from_slice(&JUMP);
    boot.write_to(&mut image);
    image[BOOT_SIGNATURE_OFFSET] = 0x55;
    image[BOOT_SIGNATURE_OFFSET + 1] = 0xAA;

    let geometry = Geometry::from_boot(&boot);
    write_fat_entry_mirrored(&mut image, &geometry, 0, 0xF00 | format.media_descriptor as u16);
    write_fat_entry_mirrored(&mut image, &geometry, 1, FAT_END_OF_CHAIN);

    if let Some(label) = label {
        DirectoryEntry::new_volume_label(&label, Local::now().naive_local())
            .write_at(&mut image, geometry.slot_offset(0));
    }

    debug!(
        "formatted {} image: {} bytes, volume id {volume_id:08X}",
        format.name,
        image.len()
    );
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat12::boot::resolve;
    use crate::fs::fat12::dir::SlotState;
    use crate::fs::fat12::table::{fats_in_sync, read_fat_entry};

    #[test]
    fn test_format_1440() {
        let image = format_volume(&FloppyFormat::F1440, None, 0xCAFE_F00D);
        assert_eq!(image.len(), 1_474_560);
        assert_eq!(&image[510..512], &[0x55, 0xAA]);

        let (boot, geo) = resolve(&image).unwrap();
        assert_eq!(boot.volume_label_string(), "NO NAME");
        assert_eq!(boot.volume_id, 0xCAFE_F00D);
        assert_eq!(geo.root_offset, 9728);
        assert_eq!(geo.data_offset, 16896);
        assert_eq!(&image[512..515], &[0xF0, 0xFF, 0xFF]);
        assert_eq!(&image[5120..5123], &[0xF0, 0xFF, 0xFF]);
        assert!(fats_in_sync(&image, &geo));
        assert!(image[geo.root_offset as usize..geo.data_offset as usize]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_format_720() {
        let image = format_volume(&FloppyFormat::F720, None, 1);
        assert_eq!(image.len(), 737_280);

        let (boot, geo) = resolve(&image).unwrap();
        assert_eq!(boot.media_descriptor, 0xF9);
        assert_eq!(geo.cluster_size, 1024);
        assert_eq!(geo.fat2_offset, 512 + 3 * 512);
        assert_eq!(geo.root_offset, 3584);
        assert_eq!(geo.data_offset, 7168);
        assert_eq!(geo.fat_entry_count, 1024);
        assert_eq!(geo.cluster_limit(), 715);
        assert_eq!(read_fat_entry(&image, geo.fat2_offset, 0), 0xFF9);
    }

    #[test]
    fn test_label_is_written_twice() {
        let image = format_volume(&FloppyFormat::F1440, Some("backup disk"), 7);
        let (boot, geo) = resolve(&image).unwrap();
        assert_eq!(boot.volume_label_string(), "BACKUP DISK");

        let entry = DirectoryEntry::read_at(&image, geo.slot_offset(0));
        assert_eq!(entry.classify(), SlotState::VolumeLabel);
        assert_eq!(entry.label(), "BACKUP DISK");
    }

    #[test]
    fn test_long_label_is_truncated() {
        assert_eq!(&label_bytes("a very long label"), b"A VERY LONG");
        assert_eq!(&label_bytes("café"), b"CAF_       ");
    }

    #[test]
    fn test_volume_id_from_time() {
        let when = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_milli_opt(10, 20, 30, 450)
            .unwrap();
        // (0x0A14 + 2024) << 16 | (0x030F + 0x1E2D)
        assert_eq!(volume_id_for(when), 0x11FC_213C);
    }

    #[test]
    fn test_presets_by_size() {
        assert_eq!(FloppyFormat::from_kilobytes(1440), Some(FloppyFormat::F1440));
        assert_eq!(FloppyFormat::from_kilobytes(720), Some(FloppyFormat::F720));
        assert_eq!(FloppyFormat::from_kilobytes(360), None);
    }
}
