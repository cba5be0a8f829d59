pub mod config;
pub mod error;
pub mod fs;
pub mod image;
pub mod logger;
pub mod operation;
pub mod report;

pub use error::Fat12Error;
pub use fs::Fat12Volume;
