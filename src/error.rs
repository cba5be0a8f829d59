use thiserror::Error;

#[derive(Error, Debug)]
pub enum Fat12Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file system: {0}")]
    InvalidFileSystem(String),

    #[error("{region} ends at byte {end} but the image is only {image_len} bytes")]
    OutOfBounds {
        region: &'static str,
        end: u64,
        image_len: u64,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("A file named {0} already exists on the disk")]
    DuplicateFilename(String),

    #[error("Insufficient space: need {needed} bytes, have {available} bytes")]
    InsufficientSpace { needed: u64, available: u64 },

    #[error("No free root directory slot for {0}")]
    DirectoryFull(String),

    #[error(
        "Volume exhausted: only {written} of {expected} bytes of {name} were written \
         (chain starts at cluster {first_cluster}); file not fully written"
    )]
    VolumeExhausted {
        name: String,
        written: u64,
        expected: u64,
        first_cluster: u16,
    },

    #[error(
        "Reading the source of {name} failed after {written} of {expected} bytes \
         (chain starts at cluster {first_cluster}); file not fully written: {source}"
    )]
    SourceFailed {
        name: String,
        written: u64,
        expected: u64,
        first_cluster: u16,
        source: std::io::Error,
    },

    #[error("Corrupt cluster chain from cluster {start}: {reason} at cluster {cluster}")]
    CorruptChain {
        start: u16,
        cluster: u16,
        reason: String,
    },

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),
}

impl Fat12Error {
    /// True when the image was already mutated before this error was raised.
    ///
    /// A store that ran out of clusters or lost its source part-way leaves a
    /// terminated partial chain behind, and a failed verification follows a
    /// complete store. Every other error is reported before the first write.
    pub fn volume_modified(&self) -> bool {
        match self {
            Fat12Error::VolumeExhausted { written, .. } => *written > 0,
            Fat12Error::SourceFailed { .. } | Fat12Error::VerificationFailed(_) => true,
            _ => false,
        }
    }
}
