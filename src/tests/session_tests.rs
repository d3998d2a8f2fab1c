//! Session persistence tests: masks, palette and index across reopen.

use crate::cache::{MaskTag, StorageLayout};
use crate::config::Tuning;
use crate::snapshot::{Mode, Snapshot};
use image::{Rgb, RgbImage};
use std::path::PathBuf;

fn scene() -> RgbImage {
    let mut img = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
    for y in 10..30 {
        for x in 10..30 {
            img.put_pixel(x, y, Rgb([0, 190, 40]));
        }
    }
    for y in 60..80 {
        for x in 60..80 {
            img.put_pixel(x, y, Rgb([230, 60, 150]));
        }
    }
    img
}

/// A fresh temp directory holding the scene as a real photo file.
fn photo_dir(name: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    let photo = dir.join("booth.png");
    scene().save(&photo).expect("Failed to write photo");
    (dir, photo)
}

fn tuning() -> Tuning {
    // identity resize keeps the synthetic squares crisp
    Tuning {
        size_limit: 100,
        ..Tuning::default()
    }
}

#[test]
fn test_session_roundtrip_counts_without_retraining() {
    let (dir, photo) = photo_dir("votetally_session_roundtrip");

    {
        let mut snapshot = Snapshot::open(&photo, tuning()).expect("open failed");
        snapshot.pick(15, 15).expect("pick errored");
        snapshot.set_train_color("pink");
        snapshot.pick(65, 65).expect("pick errored");
        snapshot.train_palette().expect("training failed");
        // dropping the snapshot persists the training masks
    }

    let storage = StorageLayout::for_image(&photo);
    assert!(storage.mask_path(&MaskTag::train("green")).exists());
    assert!(storage.mask_path(&MaskTag::train("pink")).exists());
    assert!(storage.palette_path().exists());
    assert!(storage.index_path().exists());

    {
        let mut snapshot = Snapshot::open(&photo, tuning()).expect("reopen failed");
        // training contours were re-derived from the persisted masks
        assert_eq!(snapshot.contours().count_for(&MaskTag::train("green")), 1);
        assert_eq!(snapshot.contours().count_for(&MaskTag::train("pink")), 1);
        // the classifier restored eagerly; counting needs no retraining
        let palette = snapshot.palette().expect("palette not restored");
        assert_eq!(palette.len(), 8);

        snapshot.set_mode(Mode::Count);
        let counts = snapshot.count().expect("count failed");
        assert_eq!(counts[0].count, 1);
        assert_eq!(counts[1].count, 1);
        assert_eq!(counts[2].count, 0);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_reset_training_removes_persisted_mask() {
    let (dir, photo) = photo_dir("votetally_session_reset");

    {
        let mut snapshot = Snapshot::open(&photo, tuning()).expect("open failed");
        snapshot.pick(15, 15).expect("pick errored");
    }
    let storage = StorageLayout::for_image(&photo);
    assert!(storage.mask_path(&MaskTag::train("green")).exists());

    {
        let mut snapshot = Snapshot::open(&photo, tuning()).expect("reopen failed");
        snapshot.reset_training();
        // drop persists: an absent mask deletes its file
    }
    assert!(!storage.mask_path(&MaskTag::train("green")).exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_palette_files_leave_classifier_unusable() {
    let (dir, photo) = photo_dir("votetally_session_untrained");

    let mut snapshot = Snapshot::open(&photo, tuning()).expect("open failed");
    assert!(snapshot.palette().is_none());
    assert!(snapshot.start_count().is_err());

    drop(snapshot);
    let _ = std::fs::remove_dir_all(&dir);
}
