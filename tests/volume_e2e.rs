//! End-to-end tests on freshly formatted floppy images.
//!
//! Run with: cargo test --test volume_e2e

use std::io::{self, Cursor, Read};

use chrono::NaiveDate;
use rusty_fat12::fs::fat12::format::{format_volume, FloppyFormat};
use rusty_fat12::fs::fat12::table::{read_fat_entry, FAT_END_OF_CHAIN};
use rusty_fat12::fs::filesystem::{CreateFileOptions, EditableFilesystem, Filesystem};
use rusty_fat12::image::DiskImage;
use rusty_fat12::operation::{run_operation, Operation, Outcome, PutRequest, RunOptions};
use rusty_fat12::{Fat12Error, Fat12Volume};

fn blank_floppy() -> Vec<u8> {
    format_volume(&FloppyFormat::F1440, None, 0x2024_0517)
}

fn fixed_options() -> CreateFileOptions {
    let when = NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    CreateFileOptions {
        created: Some(when),
        modified: Some(when),
    }
}

// ============================================================================
// Test Group A: store and extract
// ============================================================================

#[test]
fn test_store_1000_bytes_on_blank_floppy() {
    let mut image = blank_floppy();
    let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();

    let mut volume = Fat12Volume::open(&mut image[..]).unwrap();
    let entry = volume
        .create_file("data.bin", &mut Cursor::new(&data), 1000, &fixed_options())
        .unwrap();
    assert_eq!(entry.location, 2);
    assert_eq!(entry.slot, Some(0));

    let geo = *volume.geometry();
    drop(volume);

    for fat in [geo.fat1_offset, geo.fat2_offset] {
        assert_eq!(read_fat_entry(&image, fat, 2), 3);
        assert_eq!(read_fat_entry(&image, fat, 3), FAT_END_OF_CHAIN);
        assert_eq!(read_fat_entry(&image, fat, 4), 0);
    }
    let fat_len = geo.fat_bytes as usize;
    assert_eq!(
        image[geo.fat1_offset as usize..][..fat_len],
        image[geo.fat2_offset as usize..][..fat_len]
    );

    let volume = Fat12Volume::open(&image[..]).unwrap();
    let found = volume.find_file("DATA.BIN").unwrap();
    assert_eq!(found.size, 1000);
    assert_eq!(volume.read_file(&found).unwrap(), data);

    let info = volume.info();
    assert_eq!(info.file_count, 1);
    assert_eq!(info.free_size, 1_474_560 - 2 * 512);
    assert!(info.fats_in_sync);
}

#[test]
fn test_many_files_list_in_fat_order() {
    let mut image = blank_floppy();
    let mut volume = Fat12Volume::open(&mut image[..]).unwrap();
    for (i, name) in ["one.txt", "two.txt", "three.txt"].iter().enumerate() {
        let body = vec![b'a' + i as u8; 100];
        volume
            .create_file(name, &mut Cursor::new(body), 100, &fixed_options())
            .unwrap();
    }

    let names: Vec<_> = volume.list_root().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["ONE.TXT", "TWO.TXT", "THREE.TXT"]);
}

#[test]
fn test_duplicate_store_changes_nothing() {
    let mut image = blank_floppy();
    run_operation(
        &mut image,
        Operation::Put(PutRequest::from_bytes(
            "a.txt",
            b"first".to_vec(),
            fixed_options().created.unwrap(),
        )),
        &RunOptions::default(),
    )
    .unwrap();

    let before = image.clone();
    let err = run_operation(
        &mut image,
        Operation::Put(PutRequest::from_bytes(
            "A.TXT",
            b"second".to_vec(),
            fixed_options().created.unwrap(),
        )),
        &RunOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Fat12Error::DuplicateFilename(_)));
    assert!(!err.volume_modified());
    assert!(image == before);
}

#[test]
fn test_oversized_store_is_rejected() {
    let mut image = format_volume(&FloppyFormat::F720, None, 1);
    let mut volume = Fat12Volume::open(&mut image[..]).unwrap();
    let free = volume.free_space();
    let err = volume
        .create_file(
            "big.bin",
            &mut std::io::repeat(0),
            free + 1,
            &fixed_options(),
        )
        .unwrap_err();
    assert!(matches!(err, Fat12Error::InsufficientSpace { needed, available }
        if needed == free + 1 && available == free));
}

#[test]
fn test_fill_720k_floppy_until_exhausted() {
    let mut image = format_volume(&FloppyFormat::F720, None, 1);
    let mut volume = Fat12Volume::open(&mut image[..]).unwrap();
    let clusters = volume.geometry().data_clusters();
    let cluster_size = volume.geometry().cluster_size;

    // Passes the coarse space check but needs one cluster more than exists
    let size = (clusters + 1) * cluster_size;
    assert!(size <= volume.free_space());
    let err = volume
        .create_file("fill.bin", &mut std::io::repeat(0xAA), size, &fixed_options())
        .unwrap_err();
    match err {
        Fat12Error::VolumeExhausted {
            written,
            expected,
            first_cluster,
            ..
        } => {
            assert_eq!(written, clusters * cluster_size);
            assert_eq!(expected, size);
            assert_eq!(first_cluster, 2);
        }
        other => panic!("expected VolumeExhausted, got {other:?}"),
    }
    assert_eq!(volume.info().file_count, 1);
}

/// Source that breaks off after a fixed number of bytes.
struct BrokenSource {
    remaining: usize,
}

impl Read for BrokenSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "disk removed"));
        }
        let n = buf.len().min(self.remaining);
        buf[..n].fill(0xC3);
        self.remaining -= n;
        Ok(n)
    }
}

#[test]
fn test_source_error_mid_store_does_not_cross_link() {
    let mut image = blank_floppy();
    let before = image.clone();
    let request = PutRequest {
        name: "a.bin".into(),
        source: Box::new(BrokenSource { remaining: 512 }),
        size: 1000,
        created: fixed_options().created.unwrap(),
        modified: fixed_options().modified.unwrap(),
    };
    let err = run_operation(&mut image, Operation::Put(request), &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, Fat12Error::SourceFailed { written: 512, .. }));
    assert!(err.volume_modified());
    assert!(image != before);

    run_operation(
        &mut image,
        Operation::Put(PutRequest::from_bytes(
            "b.bin",
            vec![0x11; 100],
            fixed_options().created.unwrap(),
        )),
        &RunOptions::default(),
    )
    .unwrap();

    let volume = Fat12Volume::open(&image[..]).unwrap();
    let a = volume.find_file("A.BIN").unwrap();
    let b = volume.find_file("B.BIN").unwrap();
    assert_eq!((a.location, b.location), (2, 4));
    assert_eq!(volume.read_file(&b).unwrap(), vec![0x11; 100]);
    // The unwritten tail of A is still blank, not B's data
    let a_data = volume.read_file(&a).unwrap();
    assert!(a_data[..512].iter().all(|&b| b == 0xC3));
    assert!(a_data[512..].iter().all(|&b| b == 0));
}

// ============================================================================
// Test Group B: image files on disk
// ============================================================================

#[test]
fn test_image_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("floppy.img");
    DiskImage::create(&path, blank_floppy(), false).unwrap();

    let host = dir.path().join("readme.txt");
    std::fs::write(&host, b"Stored through the image file.\n").unwrap();

    let mut disk = DiskImage::open(&path).unwrap();
    let outcome = run_operation(
        disk.bytes_mut(),
        Operation::Put(PutRequest::from_path(&host).unwrap()),
        &RunOptions::default(),
    )
    .unwrap();
    assert!(matches!(outcome, Outcome::Put { verified: true, .. }));
    disk.flush().unwrap();

    let mut reopened = DiskImage::open(&path).unwrap();
    match run_operation(
        reopened.bytes_mut(),
        Operation::Get {
            name: "README.TXT".into(),
        },
        &RunOptions::default(),
    )
    .unwrap()
    {
        Outcome::Get { data, .. } => assert_eq!(data, b"Stored through the image file.\n"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_corrupt_chain_is_reported() {
    let mut image = blank_floppy();
    let mut volume = Fat12Volume::open(&mut image[..]).unwrap();
    volume
        .create_file("loop.bin", &mut Cursor::new(vec![1u8; 1024]), 1024, &fixed_options())
        .unwrap();
    let geo = *volume.geometry();
    drop(volume);

    // Point cluster 3 back at cluster 2 in both FATs and grow the file
    let mut table = rusty_fat12::fs::fat12::table::FatTable::load(&image, &geo);
    table.commit(&mut image, &geo, 3, 2);
    let size_offset = geo.slot_offset(0) as usize + 28;
    image[size_offset..size_offset + 4].copy_from_slice(&4096u32.to_le_bytes());

    let volume = Fat12Volume::open(&image[..]).unwrap();
    let entry = volume.find_file("LOOP.BIN").unwrap();
    assert!(matches!(
        volume.read_file(&entry),
        Err(Fat12Error::CorruptChain { start: 2, cluster: 2, .. })
    ));
}
