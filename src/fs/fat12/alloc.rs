use std::io::{self, Read};

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use super::boot::Geometry;
use super::dir::{find_free_slot, names_match, root_entries, short_name_from_host, DirectoryEntry};
use super::table::{FatTable, FAT_END_OF_CHAIN, FIRST_DATA_CLUSTER};
use crate::error::Fat12Error;

/// A file to be written into the root directory.
pub struct StoreRequest<'a> {
    /// Host file name; converted to an 8.3 short name.
    pub name: &'a str,
    pub data: &'a mut dyn Read,
    /// Bytes to take from `data`.
    pub size: u64,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

/// Where a stored file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub slot: usize,
    pub entry: DirectoryEntry,
    /// Clusters of the new chain in order.
    pub clusters: Vec<u16>,
}

/// Coarse free space: the volume size minus every allocated cluster.
///
/// The boot sector, FATs and root directory are not subtracted, so this
/// over-reports by the size of the metadata area.
pub fn free_space(geometry: &Geometry, table: &FatTable) -> u64 {
    geometry
        .total_size
        .saturating_sub(table.allocated_count() as u64 * geometry.cluster_size)
}

/// Store a new file in the root directory.
///
/// Nothing is written unless the size fits the free space, the short name is
/// new and a directory slot is free. Clusters are then claimed first-fit from
/// cluster 2, the directory record is written as soon as the first cluster is
/// known, and each FAT link is written to every FAT copy right away.
///
/// If the table runs out part-way the partial chain is terminated and left in
/// place together with its directory record, and `VolumeExhausted` reports how
/// much was written. A failing source is handled the same way and reported as
/// `SourceFailed`. There is no rollback.
pub fn store(
    image: &mut [u8],
    geometry: &Geometry,
    table: &mut FatTable,
    request: StoreRequest<'_>,
) -> Result<StoredFile, Fat12Error> {
    let available = free_space(geometry, table);
    if request.size > available || request.size > u32::MAX as u64 {
        return Err(Fat12Error::InsufficientSpace {
            needed: request.size,
            available,
        });
    }

    let (name, extension) = short_name_from_host(request.name)?;
    let mut entry = DirectoryEntry::new_file(
        name,
        extension,
        request.size as u32,
        request.created,
        request.modified,
    );
    let short_name = entry.short_name();

    if let Some((slot, _)) = root_entries(image, geometry)
        .find(|(_, existing)| existing.is_listable() && names_match(&existing.short_name(), &short_name))
    {
        debug!("{short_name} already present in slot {slot}");
        return Err(Fat12Error::DuplicateFilename(short_name));
    }

    let slot = find_free_slot(image, geometry)
        .ok_or_else(|| Fat12Error::DirectoryFull(short_name.clone()))?;
    let slot_offset = geometry.slot_offset(slot);

    if request.size == 0 {
        entry.write_at(image, slot_offset);
        info!("stored empty file {short_name} in slot {slot}");
        return Ok(StoredFile {
            slot,
            entry,
            clusters: Vec::new(),
        });
    }

    let limit = geometry.cluster_limit();
    let Some(first) = table.next_free(FIRST_DATA_CLUSTER, limit) else {
        return Err(Fat12Error::VolumeExhausted {
            name: short_name,
            written: 0,
            expected: request.size,
            first_cluster: 0,
        });
    };

    entry.first_cluster = first as u16;
    entry.write_at(image, slot_offset);
    debug!("{short_name}: slot {slot}, first cluster {first}");

    let cluster_size = geometry.cluster_size as usize;
    let mut block = vec![0u8; cluster_size];
    let mut clusters = Vec::new();
    let mut remaining = request.size;
    let mut written = 0u64;
    let mut current = first;
    let mut short_read_logged = false;

    loop {
        let len = remaining.min(cluster_size as u64) as usize;
        let got = match fill_block(request.data, &mut block[..len]) {
            Ok(got) => got,
            Err(source) => {
                // The record already points at this chain, so close it here
                table.commit(image, geometry, current, FAT_END_OF_CHAIN);
                warn!(
                    "source for {short_name} failed after {written} of {} bytes: {source}",
                    request.size
                );
                return Err(Fat12Error::SourceFailed {
                    name: short_name,
                    written,
                    expected: request.size,
                    first_cluster: first as u16,
                    source,
                });
            }
        };
        if got < len && !short_read_logged {
            warn!(
                "source for {short_name} ended after {} of {} bytes; padding with zeros",
                written + got as u64,
                request.size
            );
            short_read_logged = true;
        }

        let offset = geometry.cluster_offset(current as u16) as usize;
        image[offset..offset + len].copy_from_slice(&block[..len]);
        remaining -= len as u64;
        written += len as u64;
        clusters.push(current as u16);

        if remaining == 0 {
            table.commit(image, geometry, current, FAT_END_OF_CHAIN);
            break;
        }

        match table.next_free(current + 1, limit) {
            Some(next) => {
                table.commit(image, geometry, current, next as u16);
                current = next;
            }
            None => {
                table.commit(image, geometry, current, FAT_END_OF_CHAIN);
                warn!(
                    "ran out of clusters storing {short_name}: {written} of {} bytes written",
                    request.size
                );
                return Err(Fat12Error::VolumeExhausted {
                    name: short_name,
                    written,
                    expected: request.size,
                    first_cluster: first as u16,
                });
            }
        }
    }

    info!(
        "stored {short_name}: {} bytes in {} cluster(s) from cluster {first}",
        request.size,
        clusters.len()
    );
    Ok(StoredFile {
        slot,
        entry,
        clusters,
    })
}

/// Read until `block` is full or the source ends; the unread tail is zeroed.
fn fill_block(reader: &mut dyn Read, block: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    block[filled..].fill(0);
    Ok(filled)
}
