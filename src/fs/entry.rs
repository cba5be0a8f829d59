use chrono::NaiveDateTime;
use serde::Serialize;

use super::fat12::dir::DirectoryEntry;

/// A file or directory in the root directory of a volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub size: u64,
    /// First cluster of the entry's chain (0 for an empty file).
    pub location: u64,
    /// Root directory slot holding the record, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

impl FileEntry {
    pub fn new_directory(name: String, location: u64) -> Self {
        Self {
            name,
            entry_type: EntryType::Directory,
            size: 0,
            location,
            slot: None,
            created: None,
            modified: None,
        }
    }

    pub fn new_file(name: String, size: u64, location: u64) -> Self {
        Self {
            name,
            entry_type: EntryType::File,
            size,
            location,
            slot: None,
            created: None,
            modified: None,
        }
    }

    /// Listing row for a decoded directory record.
    pub fn from_dir_entry(entry: &DirectoryEntry) -> Self {
        let mut row = if entry.is_directory() {
            Self::new_directory(entry.short_name(), entry.start_cluster() as u64)
        } else {
            Self::new_file(
                entry.short_name(),
                entry.file_size as u64,
                entry.start_cluster() as u64,
            )
        };
        row.created = entry.created();
        row.modified = entry.modified();
        row
    }

    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// Size in bytes; directories have none.
    pub fn file_size(&self) -> Option<u64> {
        self.is_file().then_some(self.size)
    }

    /// `F` for files, `D` for directories.
    pub fn type_indicator(&self) -> char {
        match self.entry_type {
            EntryType::File => 'F',
            EntryType::Directory => 'D',
        }
    }

    /// The name as a single host path component, or `None` when it could
    /// escape the destination directory (separators, drive prefixes, `..`).
    pub fn host_file_name(&self) -> Option<&str> {
        let name = self.name.as_str();
        let unsafe_char = |c: char| matches!(c, '/' | '\\' | ':') || c.is_control();
        if name.is_empty() || name == "." || name == ".." || name.chars().any(unsafe_char) {
            return None;
        }
        Some(name)
    }

    pub fn size_string(&self) -> String {
        match self.file_size() {
            Some(size) => format_size(size),
            None => String::new(),
        }
    }
}

/// Human-readable byte count (`"1.4 MiB"`).
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;

    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
