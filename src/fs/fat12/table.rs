use log::warn;

use super::boot::Geometry;

pub const FAT_FREE: u16 = 0x000;
pub const FAT_BAD_CLUSTER: u16 = 0xFF7;
/// Value the engine writes into the last cluster of a chain.
pub const FAT_END_OF_CHAIN: u16 = 0xFFF;
pub const FAT_ENTRY_MASK: u16 = 0x0FFF;
/// First cluster index that maps to the data region.
pub const FIRST_DATA_CLUSTER: u32 = 2;

/// Any value in `0xFF8..=0xFFF` ends a chain.
pub fn is_end_of_chain(entry: u16) -> bool {
    entry >= 0xFF8
}

pub fn is_bad_cluster(entry: u16) -> bool {
    entry == FAT_BAD_CLUSTER
}

/// Read the 12-bit entry `index` from the FAT copy starting at `fat_offset`.
///
/// Entries are packed two per three bytes: an even entry owns the first
/// byte and the low nibble of the middle byte, an odd entry owns the high
/// nibble of the middle byte and the third byte. Returns 0 if the entry lies
/// past the end of `image`.
pub fn read_fat_entry(image: &[u8], fat_offset: u64, index: u32) -> u16 {
    let k = fat_offset as usize + (index as usize * 3) / 2;
    if k + 1 >= image.len() {
        return FAT_FREE;
    }
    let (lo, hi) = (image[k] as u16, image[k + 1] as u16);
    if index & 1 == 0 {
        lo | ((hi & 0x0F) << 8)
    } else {
        (lo >> 4) | (hi << 4)
    }
}

/// Write the 12-bit entry `index` into one FAT copy, preserving the nibble
/// of the shared middle byte that belongs to the neighbouring entry.
pub fn write_fat_entry(image: &mut [u8], fat_offset: u64, index: u32, value: u16) {
    let k = fat_offset as usize + (index as usize * 3) / 2;
    if k + 1 >= image.len() {
        return;
    }
    let value = value & FAT_ENTRY_MASK;
    if index & 1 == 0 {
        image[k] = (value & 0xFF) as u8;
        image[k + 1] = (image[k + 1] & 0xF0) | (value >> 8) as u8;
    } else {
        image[k] = (image[k] & 0x0F) | ((value & 0x0F) << 4) as u8;
        image[k + 1] = (value >> 4) as u8;
    }
}

/// Write `value` into entry `index` of every FAT copy on the volume.
pub fn write_fat_entry_mirrored(image: &mut [u8], geometry: &Geometry, index: u32, value: u16) {
    for copy in 0..geometry.fat_copies {
        write_fat_entry(image, geometry.fat_offset(copy), index, value);
    }
}

/// True when every FAT copy is byte-identical to the first.
pub fn fats_in_sync(image: &[u8], geometry: &Geometry) -> bool {
    let len = geometry.fat_bytes as usize;
    let first = geometry.fat1_offset as usize;
    let reference = &image[first..first + len];
    (1..geometry.fat_copies).all(|copy| {
        let start = geometry.fat_offset(copy) as usize;
        let same = &image[start..start + len] == reference;
        if !same {
            warn!("FAT copy {} differs from FAT copy 0", copy + 1);
        }
        same
    })
}

/// In-memory snapshot of the first FAT copy.
///
/// Chain walks and allocation scans work against this snapshot; writes go
/// to both the snapshot and the on-disk copies at the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    entries: Vec<u16>,
}

impl FatTable {
    pub fn load(image: &[u8], geometry: &Geometry) -> Self {
        let entries = (0..geometry.fat_entry_count)
            .map(|index| read_fat_entry(image, geometry.fat1_offset, index))
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<u16>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| e & FAT_ENTRY_MASK).collect(),
        }
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry value; indices past the table read as free.
    pub fn get(&self, index: u32) -> u16 {
        self.entries.get(index as usize).copied().unwrap_or(FAT_FREE)
    }

    pub fn set(&mut self, index: u32, value: u16) {
        if let Some(entry) = self.entries.get_mut(index as usize) {
            *entry = value & FAT_ENTRY_MASK;
        }
    }

    /// Set an entry in the snapshot and in every FAT copy of `image`.
    pub fn commit(&mut self, image: &mut [u8], geometry: &Geometry, index: u32, value: u16) {
        self.set(index, value);
        write_fat_entry_mirrored(image, geometry, index, value);
    }

    /// Number of non-zero entries from cluster 2 upward.
    pub fn allocated_count(&self) -> u32 {
        self.entries
            .iter()
            .skip(FIRST_DATA_CLUSTER as usize)
            .filter(|&&e| e != FAT_FREE)
            .count() as u32
    }

    /// First free entry in `from..limit` (first fit).
    pub fn next_free(&self, from: u32, limit: u32) -> Option<u32> {
        let limit = limit.min(self.len());
        (from.max(FIRST_DATA_CLUSTER)..limit).find(|&i| self.get(i) == FAT_FREE)
    }

    /// Indices `2..len` with a non-zero value, in table order.
    pub fn allocated(&self) -> impl Iterator<Item = u32> + '_ {
        (FIRST_DATA_CLUSTER..self.len()).filter(move |&i| self.get(i) != FAT_FREE)
    }
}
