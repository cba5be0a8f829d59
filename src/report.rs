//! Text and JSON rendering of operation results.

use std::fmt::Write;

use serde::Serialize;

use crate::fs::entry::FileEntry;
use crate::fs::fat12::scan::VolumeInfo;

const SEPARATOR: &str = "===  ===  ===  ===  ===";

pub fn render_info(info: &VolumeInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "OS Name : {}", info.oem_name);
    let _ = writeln!(out, "Label of the disk : {}", info.label);
    let _ = writeln!(out, "Total size of the disk : {}", info.total_size);
    let _ = writeln!(out, "Free size of the disk : {}", info.free_size);
    let _ = writeln!(out, "{SEPARATOR}");
    let _ = writeln!(
        out,
        "The number of files in the root directory (not including subdirectories) : {}",
        info.file_count
    );
    let _ = writeln!(out, "{SEPARATOR}");
    let _ = writeln!(out, "Number of FAT copies : {}", info.fat_copies);
    let _ = writeln!(out, "Sectors per FAT : {}", info.sectors_per_fat);
    if !info.fats_in_sync {
        let _ = writeln!(out, "Warning : FAT copies differ");
    }
    out
}

/// One `F|D  size  NAME  YYYY-MM-DD HH:MM` line per entry.
pub fn render_list(entries: &[FileEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let size = entry
            .file_size()
            .map(|s| s.to_string())
            .unwrap_or_default();
        let created = entry
            .created
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "----------  --:--".to_string());
        let _ = writeln!(
            out,
            "{} {:>10} {:<12} {}",
            entry.type_indicator(),
            size,
            entry.name,
            created
        );
    }
    out
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
