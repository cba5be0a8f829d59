use byteorder::{ByteOrder, LittleEndian};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::warn;

use super::boot::Geometry;
use crate::error::Fat12Error;

// FAT directory entry constants
pub const DIR_ENTRY_SIZE: usize = 32;
pub const NAME_LEN: usize = 8;
pub const EXTENSION_LEN: usize = 3;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

pub const SLOT_NEVER_USED: u8 = 0x00;
pub const SLOT_DELETED: u8 = 0xE5;
/// Stored in place of a leading 0xE5 name byte.
const KANJI_ESCAPE: u8 = 0x05;

/// First-cluster value of a record whose chain is not known yet.
pub const UNSET_FIRST_CLUSTER: u16 = 0;

const DOS_EPOCH_YEAR: i32 = 1980;
const DOS_LAST_YEAR: i32 = DOS_EPOCH_YEAR + 127;

/// Characters that may not appear in an 8.3 short name.
const ILLEGAL_SHORT_NAME_CHARS: &[char] = &[
    '"', '*', '+', ',', '/', ':', ';', '<', '=', '>', '?', '[', '\\', ']', '|', ' ',
];

/// State of a root directory slot, decided by its first byte and attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// First byte 0x00; by convention no later slot is used either.
    NeverUsed,
    /// First byte 0xE5; free for reuse.
    Deleted,
    /// Attribute byte is exactly the volume-label bit.
    VolumeLabel,
    Active,
}

/// FAT packed date: year-since-1980 (7 bits), month (4), day (5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDate(pub u16);

impl DosDate {
    pub fn new(year: u16, month: u16, day: u16) -> Self {
        let year = year.saturating_sub(DOS_EPOCH_YEAR as u16).min(0x7F);
        Self((year << 9) | ((month & 0x0F) << 5) | (day & 0x1F))
    }

    pub fn year(self) -> u16 {
        ((self.0 >> 9) & 0x7F) + DOS_EPOCH_YEAR as u16
    }

    pub fn month(self) -> u16 {
        (self.0 >> 5) & 0x0F
    }

    pub fn day(self) -> u16 {
        self.0 & 0x1F
    }

    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year() as i32, self.month() as u32, self.day() as u32)
    }
}

/// FAT packed time: hour (5 bits), minute (6), second / 2 (5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosTime(pub u16);

impl DosTime {
    pub fn new(hour: u16, minute: u16, second: u16) -> Self {
        Self(((hour & 0x1F) << 11) | ((minute & 0x3F) << 5) | ((second / 2) & 0x1F))
    }

    pub fn hour(self) -> u16 {
        (self.0 >> 11) & 0x1F
    }

    pub fn minute(self) -> u16 {
        (self.0 >> 5) & 0x3F
    }

    pub fn second(self) -> u16 {
        (self.0 & 0x1F) * 2
    }
}

/// Pack a calendar timestamp at two-second resolution. Timestamps outside
/// the representable 1980..=2107 range are clamped to its ends.
pub fn to_dos_datetime(dt: NaiveDateTime) -> (DosDate, DosTime) {
    if dt.year() < DOS_EPOCH_YEAR {
        return (DosDate::new(DOS_EPOCH_YEAR as u16, 1, 1), DosTime::new(0, 0, 0));
    }
    if dt.year() > DOS_LAST_YEAR {
        return (
            DosDate::new(DOS_LAST_YEAR as u16, 12, 31),
            DosTime::new(23, 59, 58),
        );
    }
    (
        DosDate::new(dt.year() as u16, dt.month() as u16, dt.day() as u16),
        DosTime::new(dt.hour() as u16, dt.minute() as u16, dt.second() as u16),
    )
}

/// Unpack a date/time pair; `None` for a zero or impossible date.
pub fn from_dos_datetime(date: DosDate, time: DosTime) -> Option<NaiveDateTime> {
    if date.0 == 0 {
        return None;
    }
    date.to_naive()?
        .and_hms_opt(time.hour() as u32, time.minute() as u32, time.second() as u32)
}

/// One 32-byte root directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: [u8; NAME_LEN],
    pub extension: [u8; EXTENSION_LEN],
    pub attributes: u8,
    pub reserved: [u8; 2],
    pub created_time: DosTime,
    pub created_date: DosDate,
    pub accessed_date: DosDate,
    /// High cluster word; unused on FAT12.
    pub cluster_high: u16,
    pub modified_time: DosTime,
    pub modified_date: DosDate,
    /// Only the low 12 bits are meaningful on FAT12.
    pub first_cluster: u16,
    pub file_size: u32,
}

impl DirectoryEntry {
    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[0..8]);
        let mut extension = [0u8; EXTENSION_LEN];
        extension.copy_from_slice(&raw[8..11]);
        Self {
            name,
            extension,
            attributes: raw[11],
            reserved: [raw[12], raw[13]],
            created_time: DosTime(LittleEndian::read_u16(&raw[14..16])),
            created_date: DosDate(LittleEndian::read_u16(&raw[16..18])),
            accessed_date: DosDate(LittleEndian::read_u16(&raw[18..20])),
            cluster_high: LittleEndian::read_u16(&raw[20..22]),
            modified_time: DosTime(LittleEndian::read_u16(&raw[22..24])),
            modified_date: DosDate(LittleEndian::read_u16(&raw[24..26])),
            first_cluster: LittleEndian::read_u16(&raw[26..28]),
            file_size: LittleEndian::read_u32(&raw[28..32]),
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0..8].copy_from_slice(&self.name);
        raw[8..11].copy_from_slice(&self.extension);
        raw[11] = self.attributes;
        raw[12..14].copy_from_slice(&self.reserved);
        LittleEndian::write_u16(&mut raw[14..16], self.created_time.0);
        LittleEndian::write_u16(&mut raw[16..18], self.created_date.0);
        LittleEndian::write_u16(&mut raw[18..20], self.accessed_date.0);
        LittleEndian::write_u16(&mut raw[20..22], self.cluster_high);
        LittleEndian::write_u16(&mut raw[22..24], self.modified_time.0);
        LittleEndian::write_u16(&mut raw[24..26], self.modified_date.0);
        LittleEndian::write_u16(&mut raw[26..28], self.first_cluster);
        LittleEndian::write_u32(&mut raw[28..32], self.file_size);
        raw
    }

    /// Decode the record at absolute byte `offset` of `image`.
    pub fn read_at(image: &[u8], offset: u64) -> Self {
        let start = offset as usize;
        Self::from_bytes(&image[start..start + DIR_ENTRY_SIZE])
    }

    pub fn write_at(&self, image: &mut [u8], offset: u64) {
        let start = offset as usize;
        image[start..start + DIR_ENTRY_SIZE].copy_from_slice(&self.to_bytes());
    }

    /// Fresh record for a file about to be stored: attributes cleared and
    /// the first cluster left unset until allocation picks one.
    pub fn new_file(
        name: [u8; NAME_LEN],
        extension: [u8; EXTENSION_LEN],
        size: u32,
        created: NaiveDateTime,
        modified: NaiveDateTime,
    ) -> Self {
        let (created_date, created_time) = to_dos_datetime(created);
        let (modified_date, modified_time) = to_dos_datetime(modified);
        Self {
            name,
            extension,
            attributes: 0,
            reserved: [0; 2],
            created_time,
            created_date,
            accessed_date: modified_date,
            cluster_high: 0,
            modified_time,
            modified_date,
            first_cluster: UNSET_FIRST_CLUSTER,
            file_size: size,
        }
    }

    /// Volume-label record carrying `label` in the name and extension bytes.
    pub fn new_volume_label(label: &[u8; 11], when: NaiveDateTime) -> Self {
        let mut name = [b' '; NAME_LEN];
        name.copy_from_slice(&label[..NAME_LEN]);
        let mut extension = [b' '; EXTENSION_LEN];
        extension.copy_from_slice(&label[NAME_LEN..]);
        let mut entry = Self::new_file(name, extension, 0, when, when);
        entry.attributes = ATTR_VOLUME_ID;
        entry
    }

    pub fn classify(&self) -> SlotState {
        match self.name[0] {
            SLOT_NEVER_USED => SlotState::NeverUsed,
            SLOT_DELETED => SlotState::Deleted,
            _ if self.attributes == ATTR_VOLUME_ID => SlotState::VolumeLabel,
            _ => SlotState::Active,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self.classify(), SlotState::NeverUsed | SlotState::Deleted)
    }

    pub fn is_long_name(&self) -> bool {
        self.attributes & ATTR_LONG_NAME == ATTR_LONG_NAME
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Active record that names a directory or file, excluding volume
    /// labels and long-name fragments.
    pub fn is_listable(&self) -> bool {
        self.classify() == SlotState::Active && self.attributes & ATTR_VOLUME_ID == 0
    }

    /// Active regular file: not a label, system file or directory.
    pub fn is_file(&self) -> bool {
        self.classify() == SlotState::Active
            && self.attributes & (ATTR_VOLUME_ID | ATTR_SYSTEM | ATTR_DIRECTORY) == 0
    }

    /// 8.3 display name with trailing padding trimmed.
    pub fn short_name(&self) -> String {
        let mut name = self.name;
        if name[0] == KANJI_ESCAPE {
            name[0] = SLOT_DELETED;
        }
        build_short_name(&name, &self.extension)
    }

    /// The 11 label bytes of a volume-label record, trimmed.
    pub fn label(&self) -> String {
        let mut raw = Vec::with_capacity(NAME_LEN + EXTENSION_LEN);
        raw.extend_from_slice(&self.name);
        raw.extend_from_slice(&self.extension);
        decode_oem_string(&raw).trim_end().to_string()
    }

    pub fn created(&self) -> Option<NaiveDateTime> {
        from_dos_datetime(self.created_date, self.created_time)
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        from_dos_datetime(self.modified_date, self.modified_time)
    }

    /// First cluster with the FAT12-meaningless high nibble dropped.
    pub fn start_cluster(&self) -> u16 {
        self.first_cluster & 0x0FFF
    }
}

/// Case-insensitive comparison of formatted short names.
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Iterate `(slot, entry)` over every root directory slot.
pub fn root_entries<'a>(
    image: &'a [u8],
    geometry: &'a Geometry,
) -> impl Iterator<Item = (usize, DirectoryEntry)> + 'a {
    (0..geometry.root_slots())
        .map(move |slot| (slot, DirectoryEntry::read_at(image, geometry.slot_offset(slot))))
}

/// First slot that is never-used or deleted.
pub fn find_free_slot(image: &[u8], geometry: &Geometry) -> Option<usize> {
    root_entries(image, geometry)
        .find(|(_, entry)| entry.is_free())
        .map(|(slot, _)| slot)
}

/// First active, listable record whose short name matches `name`.
pub fn find_entry(image: &[u8], geometry: &Geometry, name: &str) -> Option<(usize, DirectoryEntry)> {
    root_entries(image, geometry).find(|(_, entry)| {
        entry.is_listable() && !entry.is_directory() && names_match(&entry.short_name(), name)
    })
}

/// Convert a host file name to space-padded 8.3 name and extension bytes.
///
/// The name is split at its last `.`, upper-cased and truncated to 8 + 3
/// characters.
pub fn short_name_from_host(host_name: &str) -> Result<([u8; NAME_LEN], [u8; EXTENSION_LEN]), Fat12Error> {
    let (base, ext) = match host_name.rfind('.') {
        Some(dot) => (&host_name[..dot], &host_name[dot + 1..]),
        None => (host_name, ""),
    };
    // Dots before the extension separator are dropped
    let base: String = base.chars().filter(|&c| c != '.').collect();
    let base = base.as_str();

    if base.is_empty() {
        return Err(Fat12Error::InvalidName(format!(
            "{host_name:?} has no base name"
        )));
    }
    for part in [base, ext] {
        if let Some(c) = part
            .chars()
            .find(|c| !c.is_ascii() || c.is_ascii_control() || ILLEGAL_SHORT_NAME_CHARS.contains(c))
        {
            return Err(Fat12Error::InvalidName(format!(
                "{host_name:?} contains {c:?}, which is not allowed in a short name"
            )));
        }
    }
    if base.len() > NAME_LEN || ext.len() > EXTENSION_LEN {
        warn!("{host_name} truncated to fit an 8.3 short name");
    }

    let mut name = [b' '; NAME_LEN];
    for (dst, src) in name.iter_mut().zip(base.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    let mut extension = [b' '; EXTENSION_LEN];
    for (dst, src) in extension.iter_mut().zip(ext.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    Ok((name, extension))
}

/// Build a DOS 8.3 short filename from the name and extension bytes.
///
/// FAT short names use OEM codepage encoding (typically CP437). Bytes 0x80-0xFF
/// are decoded using the CP437 table rather than assuming UTF-8.
pub fn build_short_name(name: &[u8], ext: &[u8]) -> String {
    let name_str = decode_oem_string(name);
    let name_trimmed = name_str.trim_end();
    let ext_str = decode_oem_string(ext);
    let ext_trimmed = ext_str.trim_end();

    if ext_trimmed.is_empty() {
        name_trimmed.to_string()
    } else {
        format!("{name_trimmed}.{ext_trimmed}")
    }
}

/// Decode a byte slice from OEM codepage (CP437) to a UTF-8 String.
pub fn decode_oem_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| cp437_to_char(b)).collect()
}

fn cp437_to_char(b: u8) -> char {
    if b < 0x80 {
        b as char
    } else {
        CP437_HIGH[b as usize - 0x80]
    }
}

/// CP437 to Unicode mapping for bytes 0x80-0xFF.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    // 0x80-0x8F
    'Ç','ü','é','â','ä','à','å','ç', 'ê','ë','è','ï','î','ì','Ä','Å',
    // 0x90-0x9F
    'É','æ','Æ','ô','ö','ò','û','ù', 'ÿ','Ö','Ü','¢','£','¥','₧','ƒ',
    // 0xA0-0xAF
    'á','í','ó','ú','ñ','Ñ','ª','º', '¿','⌐','¬','½','¼','¡','«','»',
    // 0xB0-0xBF
    '░','▒','▓','│','┤','╡','╢','╖', '╕','╣','║','╗','╝','╜','╛','┐',
    // 0xC0-0xCF
    '└','┴','┬','├','─','┼','╞','╟', '╚','╔','╩','╦','╠','═','╬','╧',
    // 0xD0-0xDF
    '╨','╤','╥','╙','╘','╒','╓','╫', '╪','┘','┌','█','▄','▌','▐','▀',
    // 0xE0-0xEF
    'α','ß','Γ','π','Σ','σ','µ','τ', 'Φ','Θ','Ω','δ','∞','φ','ε','∩',
    // 0xF0-0xFF
    '≡','±','≥','≤','⌠','⌡','÷','≈', '°','∙','·','√','ⁿ','²','■','\u{00A0}',
];
