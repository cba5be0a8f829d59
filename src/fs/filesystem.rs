use std::io::{Read, Write};

use chrono::NaiveDateTime;

use super::entry::FileEntry;
use super::fat12::scan::VolumeInfo;
use crate::error::Fat12Error;

/// Read access to a volume's root directory.
pub trait Filesystem {
    /// Summary of the volume (label, sizes, file count).
    fn info(&self) -> VolumeInfo;

    /// Active files and directories of the root directory.
    fn list_root(&self) -> Vec<FileEntry>;

    /// Look up a file by its short name (case-insensitive).
    fn find_file(&self, name: &str) -> Result<FileEntry, Fat12Error>;

    /// Stream file data to a writer. Returns the number of bytes written.
    fn write_file_to(&self, entry: &FileEntry, writer: &mut dyn Write) -> Result<u64, Fat12Error>;

    /// Read a whole file into memory.
    fn read_file(&self, entry: &FileEntry) -> Result<Vec<u8>, Fat12Error> {
        let mut data = Vec::new();
        self.write_file_to(entry, &mut data)?;
        Ok(data)
    }

    /// Volume label, if one is set.
    fn volume_label(&self) -> Option<String> {
        let label = self.info().label;
        (!label.is_empty() && label != "NO NAME").then_some(label)
    }

    /// Filesystem type tag from the boot sector (e.g. "FAT12").
    fn fs_type(&self) -> String {
        self.info().fs_type
    }
}

/// Timestamps recorded for a newly created file. Unset fields default to
/// the current local time.
#[derive(Debug, Clone, Default)]
pub struct CreateFileOptions {
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

/// Volumes that accept new files.
pub trait EditableFilesystem: Filesystem {
    /// Create a file in the root directory from `data_len` bytes of `data`.
    /// Returns the new file's entry.
    fn create_file(
        &mut self,
        name: &str,
        data: &mut dyn Read,
        data_len: u64,
        options: &CreateFileOptions,
    ) -> Result<FileEntry, Fat12Error>;

    /// Free bytes as counted by the allocator.
    fn free_space(&self) -> u64;
}
