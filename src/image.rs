//! Disk image files held in memory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::debug;

/// A disk image file read fully into memory.
///
/// Changes made through [`DiskImage::bytes_mut`] reach the file only when
/// [`DiskImage::flush`] is called.
pub struct DiskImage {
    path: PathBuf,
    data: Vec<u8>,
}

impl DiskImage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data =
            fs::read(&path).with_context(|| format!("cannot read image {}", path.display()))?;
        debug!("loaded {} ({} bytes)", path.display(), data.len());
        Ok(Self { path, data })
    }

    /// Write `data` to a new image file. An existing file is only replaced
    /// when `overwrite` is set.
    pub fn create(path: impl Into<PathBuf>, data: Vec<u8>, overwrite: bool) -> Result<Self> {
        let path = path.into();
        if path.exists() && !overwrite {
            bail!("{} already exists", path.display());
        }
        let mut image = Self { path, data };
        image.flush()?;
        Ok(image)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Write the buffer back to the image file.
    pub fn flush(&mut self) -> Result<()> {
        fs::write(&self.path, &self.data)
            .with_context(|| format!("cannot write image {}", self.path.display()))?;
        debug!("wrote {} ({} bytes)", self.path.display(), self.data.len());
        Ok(())
    }
}
