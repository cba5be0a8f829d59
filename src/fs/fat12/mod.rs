pub mod alloc;
pub mod boot;
pub mod chain;
pub mod dir;
pub mod format;
pub mod scan;
pub mod table;

use std::io::{Read, Write};

use chrono::Local;

use self::alloc::{store, StoreRequest, StoredFile};
use self::boot::{resolve, BootSector, Geometry};
use self::chain::{copy_chain_to, read_chain, ChainWalker};
use self::dir::find_entry;
use self::scan::VolumeInfo;
use self::table::FatTable;
use super::entry::FileEntry;
use super::filesystem::{CreateFileOptions, EditableFilesystem, Filesystem};
use crate::error::Fat12Error;

/// A FAT12 volume laid over a byte buffer.
///
/// `B` is anything that exposes the image bytes: a `Vec<u8>`, a borrowed
/// slice, or a mutable slice when files are to be stored. The boot sector
/// is validated and the first FAT is loaded when the volume is opened.
pub struct Fat12Volume<B> {
    image: B,
    boot: BootSector,
    geometry: Geometry,
    table: FatTable,
}

impl<B: AsRef<[u8]>> Fat12Volume<B> {
    pub fn open(image: B) -> Result<Self, Fat12Error> {
        let (boot, geometry) = resolve(image.as_ref())?;
        let table = FatTable::load(image.as_ref(), &geometry);
        Ok(Self {
            image,
            boot,
            geometry,
            table,
        })
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn table(&self) -> &FatTable {
        &self.table
    }

    pub fn image(&self) -> &[u8] {
        self.image.as_ref()
    }

    pub fn into_inner(self) -> B {
        self.image
    }

    /// Walk the chain of `size` bytes starting at cluster `start`.
    pub fn chain(&self, start: u16, size: u64) -> ChainWalker<'_> {
        ChainWalker::new(&self.table, &self.geometry, start, size)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Fat12Volume<B> {
    /// Store a file in the root directory. See [`alloc::store`].
    pub fn store(&mut self, request: StoreRequest<'_>) -> Result<StoredFile, Fat12Error> {
        store(self.image.as_mut(), &self.geometry, &mut self.table, request)
    }
}

impl<B: AsRef<[u8]>> Filesystem for Fat12Volume<B> {
    fn info(&self) -> VolumeInfo {
        scan::scan_volume(self.image(), &self.boot, &self.geometry, &self.table)
    }

    fn list_root(&self) -> Vec<FileEntry> {
        scan::list_root(self.image(), &self.geometry, &self.table)
    }

    fn find_file(&self, name: &str) -> Result<FileEntry, Fat12Error> {
        find_entry(self.image(), &self.geometry, name)
            .map(|(slot, entry)| FileEntry::from_dir_entry(&entry).with_slot(slot))
            .ok_or_else(|| Fat12Error::FileNotFound(name.to_string()))
    }

    fn write_file_to(&self, entry: &FileEntry, writer: &mut dyn Write) -> Result<u64, Fat12Error> {
        if entry.is_directory() {
            return Err(Fat12Error::FileNotFound(entry.name.clone()));
        }
        copy_chain_to(
            self.image(),
            &self.table,
            &self.geometry,
            entry.location as u16,
            entry.size,
            writer,
        )
    }

    fn read_file(&self, entry: &FileEntry) -> Result<Vec<u8>, Fat12Error> {
        if entry.is_directory() {
            return Err(Fat12Error::FileNotFound(entry.name.clone()));
        }
        read_chain(
            self.image(),
            &self.table,
            &self.geometry,
            entry.location as u16,
            entry.size,
        )
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> EditableFilesystem for Fat12Volume<B> {
    fn create_file(
        &mut self,
        name: &str,
        data: &mut dyn Read,
        data_len: u64,
        options: &CreateFileOptions,
    ) -> Result<FileEntry, Fat12Error> {
        let now = Local::now().naive_local();
        let stored = self.store(StoreRequest {
            name,
            data,
            size: data_len,
            created: options.created.unwrap_or(now),
            modified: options.modified.unwrap_or(now),
        })?;
        Ok(FileEntry::from_dir_entry(&stored.entry).with_slot(stored.slot))
    }

    fn free_space(&self) -> u64 {
        alloc::free_space(&self.geometry, &self.table)
    }
}
