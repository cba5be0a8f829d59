pub mod entry;
pub mod fat12;
pub mod filesystem;

pub use fat12::Fat12Volume;
