use std::io::Write;

use log::debug;

use super::boot::Geometry;
use super::table::{is_bad_cluster, is_end_of_chain, FatTable, FIRST_DATA_CLUSTER};
use crate::error::Fat12Error;

/// Data-region bytes belonging to one cluster of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRange {
    pub cluster: u16,
    /// Absolute byte offset in the image.
    pub offset: u64,
    /// Bytes of file content in this cluster.
    pub len: usize,
}

/// Lazily follows a FAT chain, yielding the byte range of each cluster
/// until `size` bytes are covered.
///
/// A chain that revisits a cluster, ends before the size is covered, or
/// points at a free, reserved, bad or out-of-volume cluster yields a single
/// `CorruptChain` error and then stops. The walker only reads the table, so
/// a new one can be started from the same cluster at any time.
pub struct ChainWalker<'a> {
    table: &'a FatTable,
    geometry: &'a Geometry,
    start: u16,
    next: u16,
    remaining: u64,
    visited: Vec<bool>,
    done: bool,
}

impl<'a> ChainWalker<'a> {
    pub fn new(table: &'a FatTable, geometry: &'a Geometry, start: u16, size: u64) -> Self {
        Self {
            table,
            geometry,
            start,
            next: start,
            remaining: size,
            visited: vec![false; geometry.cluster_limit() as usize],
            done: false,
        }
    }

    fn corrupt(&mut self, cluster: u16, reason: impl Into<String>) -> Option<Result<ClusterRange, Fat12Error>> {
        self.done = true;
        Some(Err(Fat12Error::CorruptChain {
            start: self.start,
            cluster,
            reason: reason.into(),
        }))
    }
}

impl Iterator for ChainWalker<'_> {
    type Item = Result<ClusterRange, Fat12Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }

        let cluster = self.next;
        if is_end_of_chain(cluster) {
            let reason = format!("chain ended with {} bytes unread", self.remaining);
            return self.corrupt(cluster, reason);
        }
        if is_bad_cluster(cluster) {
            return self.corrupt(cluster, "chain runs into a bad cluster");
        }
        if (cluster as u32) < FIRST_DATA_CLUSTER || cluster as u32 >= self.geometry.cluster_limit() {
            return self.corrupt(cluster, "chain points outside the data region");
        }
        if std::mem::replace(&mut self.visited[cluster as usize], true) {
            return self.corrupt(cluster, "chain loops back on itself");
        }

        let len = self.geometry.cluster_size.min(self.remaining);
        self.remaining -= len;
        self.next = self.table.get(cluster as u32);
        if self.remaining == 0 && !is_end_of_chain(self.next) {
            debug!(
                "chain from {} continues past the file end at cluster {} -> {:#05X}",
                self.start, cluster, self.next
            );
        }

        Some(Ok(ClusterRange {
            cluster,
            offset: self.geometry.cluster_offset(cluster),
            len: len as usize,
        }))
    }
}

/// Copy `size` bytes of the chain starting at `start` into `writer`.
/// Returns the number of bytes written.
pub fn copy_chain_to(
    image: &[u8],
    table: &FatTable,
    geometry: &Geometry,
    start: u16,
    size: u64,
    writer: &mut dyn Write,
) -> Result<u64, Fat12Error> {
    let mut written = 0u64;
    for range in ChainWalker::new(table, geometry, start, size) {
        let range = range?;
        let begin = range.offset as usize;
        writer.write_all(&image[begin..begin + range.len])?;
        written += range.len as u64;
    }
    Ok(written)
}

/// Read a whole chain into memory.
///
/// `size` comes from a directory record, so the buffer reservation is capped
/// at the volume size; a larger size fails in the walk anyway.
pub fn read_chain(
    image: &[u8],
    table: &FatTable,
    geometry: &Geometry,
    start: u16,
    size: u64,
) -> Result<Vec<u8>, Fat12Error> {
    let mut data = Vec::with_capacity(size.min(geometry.total_size) as usize);
    copy_chain_to(image, table, geometry, start, size, &mut data)?;
    Ok(data)
}
