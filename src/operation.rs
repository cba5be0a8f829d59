//! The four volume operations and their dispatcher.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, info};

use crate::error::Fat12Error;
use crate::fs::entry::FileEntry;
use crate::fs::fat12::scan::VolumeInfo;
use crate::fs::filesystem::{CreateFileOptions, EditableFilesystem, Filesystem};
use crate::fs::Fat12Volume;

/// A host file to be stored on the volume.
pub struct PutRequest {
    /// Host file name; converted to an 8.3 short name on store.
    pub name: String,
    pub source: Box<dyn Read>,
    pub size: u64,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

impl fmt::Debug for PutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutRequest")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("created", &self.created)
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

impl PutRequest {
    /// Open a host file, taking its base name, size and timestamps.
    /// Platforms without a creation time use the modification time.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let metadata = file
            .metadata()
            .with_context(|| format!("cannot stat {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?
            .to_string();

        let to_local = |t: SystemTime| DateTime::<Local>::from(t).naive_local();
        let modified = metadata
            .modified()
            .map(to_local)
            .unwrap_or_else(|_| Local::now().naive_local());
        let created = metadata.created().map(to_local).unwrap_or(modified);

        Ok(Self {
            name,
            source: Box::new(file),
            size: metadata.len(),
            created,
            modified,
        })
    }

    /// In-memory source with both timestamps set to `when`.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>, when: NaiveDateTime) -> Self {
        let size = data.len() as u64;
        Self {
            name: name.into(),
            source: Box::new(io::Cursor::new(data)),
            size,
            created: when,
            modified: when,
        }
    }
}

#[derive(Debug)]
pub enum Operation {
    /// Volume summary.
    Info,
    /// Root directory listing.
    List,
    /// Extract a file by short name.
    Get { name: String },
    /// Store a host file in the root directory.
    Put(PutRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub verify_after_put: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            verify_after_put: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Info(VolumeInfo),
    List(Vec<FileEntry>),
    Get { entry: FileEntry, data: Vec<u8> },
    Put { entry: FileEntry, verified: bool },
}

/// Reader that keeps a copy of everything read through it.
struct Recording<'a> {
    inner: &'a mut dyn Read,
    seen: Vec<u8>,
}

impl Read for Recording<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Run one operation against an image buffer.
///
/// Only `Put` mutates `image`. When a put fails,
/// [`Fat12Error::volume_modified`] tells whether the buffer was already
/// changed (a partial chain, or a complete file that did not verify).
pub fn run_operation(
    image: &mut [u8],
    operation: Operation,
    options: &RunOptions,
) -> Result<Outcome, Fat12Error> {
    match operation {
        Operation::Info => Ok(Outcome::Info(Fat12Volume::open(&*image)?.info())),
        Operation::List => Ok(Outcome::List(Fat12Volume::open(&*image)?.list_root())),
        Operation::Get { name } => {
            let volume = Fat12Volume::open(&*image)?;
            let entry = volume.find_file(&name)?;
            let data = volume.read_file(&entry)?;
            debug!("read {} bytes of {}", data.len(), entry.name);
            Ok(Outcome::Get { entry, data })
        }
        Operation::Put(mut request) => {
            let mut volume = Fat12Volume::open(&mut *image)?;
            let file_options = CreateFileOptions {
                created: Some(request.created),
                modified: Some(request.modified),
            };

            if !options.verify_after_put {
                let entry = volume.create_file(
                    &request.name,
                    &mut request.source,
                    request.size,
                    &file_options,
                )?;
                return Ok(Outcome::Put {
                    entry,
                    verified: false,
                });
            }

            let mut recording = Recording {
                inner: &mut request.source,
                seen: Vec::with_capacity(request.size as usize),
            };
            let entry =
                volume.create_file(&request.name, &mut recording, request.size, &file_options)?;

            // A short source was padded with zeros on disk
            let mut expected = recording.seen;
            expected.resize(request.size as usize, 0);
            if volume.read_file(&entry)? != expected {
                return Err(Fat12Error::VerificationFailed(format!(
                    "{} does not read back as written",
                    entry.name
                )));
            }
            info!("verified {}", entry.name);
            Ok(Outcome::Put {
                entry,
                verified: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat12::format::{format_volume, FloppyFormat};
    use chrono::NaiveDate;

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap()
    }

    fn blank() -> Vec<u8> {
        format_volume(&FloppyFormat::F1440, None, 99)
    }

    #[test]
    fn test_put_then_get() {
        let mut image = blank();
        let data = b"PRINT \"HELLO\"\r\n".repeat(64);
        let outcome = run_operation(
            &mut image,
            Operation::Put(PutRequest::from_bytes("hello.bas", data.clone(), when())),
            &RunOptions::default(),
        )
        .unwrap();
        match outcome {
            Outcome::Put { entry, verified } => {
                assert!(verified);
                assert_eq!(entry.name, "HELLO.BAS");
                assert_eq!(entry.modified, Some(when()));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let outcome = run_operation(
            &mut image,
            Operation::Get {
                name: "hello.bas".into(),
            },
            &RunOptions::default(),
        )
        .unwrap();
        match outcome {
            Outcome::Get { entry, data: read } => {
                assert_eq!(entry.size, data.len() as u64);
                assert_eq!(read, data);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_info_and_list_do_not_mutate() {
        let mut image = blank();
        let before = image.clone();
        let info = run_operation(&mut image, Operation::Info, &RunOptions::default()).unwrap();
        assert!(matches!(info, Outcome::Info(ref i) if i.file_count == 0));
        let list = run_operation(&mut image, Operation::List, &RunOptions::default()).unwrap();
        assert_eq!(list, Outcome::List(Vec::new()));
        assert!(image == before);
    }

    #[test]
    fn test_get_missing_file() {
        let mut image = blank();
        let err = run_operation(
            &mut image,
            Operation::Get {
                name: "MISSING.TXT".into(),
            },
            &RunOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Fat12Error::FileNotFound(_)));
    }

    #[test]
    fn test_put_without_verification() {
        let mut image = blank();
        let outcome = run_operation(
            &mut image,
            Operation::Put(PutRequest::from_bytes("a.bin", vec![1, 2, 3], when())),
            &RunOptions {
                verify_after_put: false,
            },
        )
        .unwrap();
        assert!(matches!(outcome, Outcome::Put { verified: false, .. }));
    }

    #[test]
    fn test_post_write_errors_report_a_modified_volume() {
        assert!(Fat12Error::VerificationFailed("A.BIN".into()).volume_modified());
        assert!(!Fat12Error::FileNotFound("A.BIN".into()).volume_modified());
    }

    #[test]
    fn test_not_fat12() {
        let mut image = vec![0u8; 4096];
        let err = run_operation(&mut image, Operation::Info, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, Fat12Error::InvalidFileSystem(_)));
    }

    #[test]
    fn test_from_path_reads_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, b"quarterly numbers").unwrap();
        let request = PutRequest::from_path(&path).unwrap();
        assert_eq!(request.name, "report.txt");
        assert_eq!(request.size, 17);
    }
}
