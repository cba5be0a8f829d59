use serde::Serialize;

use super::alloc::free_space;
use super::boot::{BootSector, Geometry};
use super::dir::{decode_oem_string, DirectoryEntry, SlotState};
use super::table::{fats_in_sync, FatTable, FIRST_DATA_CLUSTER};
use crate::fs::entry::FileEntry;

/// Summary of a volume as shown by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    pub oem_name: String,
    pub label: String,
    pub fs_type: String,
    pub total_size: u64,
    pub free_size: u64,
    pub file_count: u32,
    pub fat_copies: u8,
    pub sectors_per_fat: u16,
    pub cluster_size: u64,
    pub fats_in_sync: bool,
}

/// Root directory records visited in FAT order.
///
/// Every allocated table entry `i` from 2 upward selects root slot `i - 2`;
/// entries whose slot lies past the root directory are skipped.
fn entries_in_fat_order<'a>(
    image: &'a [u8],
    geometry: &'a Geometry,
    table: &'a FatTable,
) -> impl Iterator<Item = DirectoryEntry> + 'a {
    table
        .allocated()
        .map(|index| (index - FIRST_DATA_CLUSTER) as usize)
        .take_while(move |&slot| slot < geometry.root_slots())
        .map(move |slot| DirectoryEntry::read_at(image, geometry.slot_offset(slot)))
}

/// Gather the `info` summary.
///
/// The label starts as the boot-sector field and is replaced by every
/// volume-label record met during the FAT-order walk, so the last one wins.
pub fn scan_volume(
    image: &[u8],
    boot: &BootSector,
    geometry: &Geometry,
    table: &FatTable,
) -> VolumeInfo {
    let mut label = boot.volume_label_string();
    let mut file_count = 0u32;

    for entry in entries_in_fat_order(image, geometry, table) {
        match entry.classify() {
            SlotState::VolumeLabel => label = entry.label(),
            SlotState::Active if entry.is_file() => file_count += 1,
            _ => {}
        }
    }

    VolumeInfo {
        oem_name: boot.oem_name_string(),
        label,
        fs_type: decode_oem_string(&boot.fs_type).trim_end().to_string(),
        total_size: geometry.total_size,
        free_size: free_space(geometry, table),
        file_count,
        fat_copies: boot.fat_copies,
        sectors_per_fat: boot.sectors_per_fat,
        cluster_size: geometry.cluster_size,
        fats_in_sync: fats_in_sync(image, geometry),
    }
}

/// Listing rows for active files and directories, in FAT order.
pub fn list_root(image: &[u8], geometry: &Geometry, table: &FatTable) -> Vec<FileEntry> {
    entries_in_fat_order(image, geometry, table)
        .filter(|entry| entry.is_listable() && !entry.is_long_name())
        .map(|entry| FileEntry::from_dir_entry(&entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry::EntryType;
    use crate::fs::fat12::boot::resolve;
    use crate::fs::fat12::dir::{ATTR_DIRECTORY, ATTR_SYSTEM, SLOT_DELETED};
    use crate::fs::fat12::format::{format_volume, FloppyFormat};
    use crate::fs::fat12::table::FAT_END_OF_CHAIN;
    use chrono::{NaiveDate, NaiveDateTime};

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 11, 2)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    fn record(name: &[u8; 8], ext: &[u8; 3], size: u32, attributes: u8) -> DirectoryEntry {
        let mut entry = DirectoryEntry::new_file(*name, *ext, size, when(), when());
        entry.attributes = attributes;
        entry
    }

    /// Place `entry` in `slot` and mark FAT entry `slot + 2` allocated.
    fn place(image: &mut [u8], slot: usize, entry: DirectoryEntry) {
        let (_, geo) = resolve(image).unwrap();
        entry.write_at(image, geo.slot_offset(slot));
        let mut table = FatTable::load(image, &geo);
        table.commit(image, &geo, slot as u32 + FIRST_DATA_CLUSTER, FAT_END_OF_CHAIN);
    }

    fn blank(label: Option<&str>) -> Vec<u8> {
        format_volume(&FloppyFormat::F1440, label, 0x1234_5678)
    }

    #[test]
    fn test_blank_volume_info() {
        let image = blank(None);
        let (boot, geo) = resolve(&image).unwrap();
        let table = FatTable::load(&image, &geo);
        let info = scan_volume(&image, &boot, &geo, &table);
        assert_eq!(info.oem_name, "RFAT12");
        assert_eq!(info.label, "NO NAME");
        assert_eq!(info.fs_type, "FAT12");
        assert_eq!(info.total_size, 1_474_560);
        assert_eq!(info.free_size, 1_474_560);
        assert_eq!(info.file_count, 0);
        assert_eq!(info.fat_copies, 2);
        assert_eq!(info.sectors_per_fat, 9);
        assert!(info.fats_in_sync);
    }

    #[test]
    fn test_counts_only_regular_files() {
        let mut image = blank(None);
        place(&mut image, 0, record(b"README  ", b"TXT", 10, 0));
        place(&mut image, 1, record(b"IO      ", b"SYS", 10, ATTR_SYSTEM));
        place(&mut image, 2, record(b"DOCS    ", b"   ", 0, ATTR_DIRECTORY));
        let mut deleted = record(b"GONE    ", b"TXT", 10, 0);
        deleted.name[0] = SLOT_DELETED;
        place(&mut image, 3, deleted);
        place(&mut image, 4, record(b"GAME    ", b"EXE", 10, 0x20));

        let (boot, geo) = resolve(&image).unwrap();
        let table = FatTable::load(&image, &geo);
        let info = scan_volume(&image, &boot, &geo, &table);
        assert_eq!(info.file_count, 2);
        assert_eq!(info.free_size, 1_474_560 - 5 * 512);
    }

    #[test]
    fn test_last_volume_label_wins() {
        let mut image = blank(Some("BOOTLABEL"));
        place(&mut image, 0, DirectoryEntry::new_volume_label(b"FIRST      ", when()));
        place(&mut image, 1, DirectoryEntry::new_volume_label(b"SECOND     ", when()));

        let (boot, geo) = resolve(&image).unwrap();
        let table = FatTable::load(&image, &geo);
        assert_eq!(scan_volume(&image, &boot, &geo, &table).label, "SECOND");
    }

    #[test]
    fn test_boot_label_kept_when_label_record_is_not_visited() {
        let image = blank(Some("MYDISK"));
        let (boot, geo) = resolve(&image).unwrap();
        let table = FatTable::load(&image, &geo);
        assert_eq!(scan_volume(&image, &boot, &geo, &table).label, "MYDISK");
    }

    #[test]
    fn test_list_follows_fat_order() {
        let mut image = blank(None);
        let (_, geo) = resolve(&image).unwrap();
        // Slot 0 holds a file but FAT entry 2 stays free, so it is not visited
        record(b"HIDDEN  ", b"TXT", 1, 0).write_at(&mut image, geo.slot_offset(0));
        place(&mut image, 1, record(b"ALPHA   ", b"TXT", 42, 0));
        place(&mut image, 3, record(b"DOCS    ", b"   ", 0, ATTR_DIRECTORY));
        place(&mut image, 4, DirectoryEntry::new_volume_label(b"LABEL      ", when()));

        let table = FatTable::load(&image, &geo);
        let rows = list_root(&image, &geo, &table);
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHA.TXT", "DOCS"]);
        assert_eq!(rows[0].entry_type, EntryType::File);
        assert_eq!(rows[0].file_size(), Some(42));
        assert_eq!(rows[1].entry_type, EntryType::Directory);
        assert_eq!(rows[1].file_size(), None);
        assert_eq!(rows[0].created, Some(when()));
    }

    #[test]
    fn test_fat_walk_stops_at_root_directory_end() {
        let mut image = blank(None);
        let (_, geo) = resolve(&image).unwrap();
        let mut table = FatTable::load(&image, &geo);
        // An allocated cluster far beyond the 224 root slots
        table.commit(&mut image, &geo, 1000, FAT_END_OF_CHAIN);
        assert!(list_root(&image, &geo, &table).is_empty());
    }
}
