//! End-to-end: bind → coordinate → correlate with real encoding and the
//! in-memory store.

use ampe_convert::batch::{Coordinator, PoolLimits};
use ampe_convert::binder::{BindError, BindLimits, RawBatch, bind};
use ampe_convert::correlate::{ImageRecord, correlate};
use ampe_convert::imaging::{EncodeSettings, OutputFormat, RustBackend};
use ampe_convert::storage::{MemoryStore, Uploader};
use ampe_convert::types::{ErrorKind, UploadedFile};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90])
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn coordinator(store: Arc<MemoryStore>) -> Coordinator {
    Coordinator::new(
        Arc::new(RustBackend::new()),
        Uploader::new(store, 2, true),
        EncodeSettings::default(),
        PoolLimits {
            threads: 2,
            in_flight: 2,
        },
    )
    .unwrap()
}

async fn run(raw: RawBatch, store: Arc<MemoryStore>) -> Vec<ImageRecord> {
    let names: Vec<String> = raw.files.iter().map(|f| f.original_name.clone()).collect();
    let requests = bind(raw, &BindLimits::default()).unwrap();
    let result = coordinator(store)
        .run(requests, CancellationToken::new())
        .await
        .unwrap();
    correlate(&names, &result)
}

#[tokio::test]
async fn partial_failure_keeps_order_and_sizes() {
    let store = Arc::new(MemoryStore::default());
    let raw = RawBatch {
        files: vec![
            UploadedFile::new("wide.png", png(400, 200)),
            UploadedFile::new("notes.txt", b"definitely not an image".to_vec()),
            UploadedFile::new("square.png", png(400, 400)),
        ],
        formats: strings(&["webp", "png", "jpg"]),
        widths: strings(&["100", "", "200"]),
        heights: strings(&["100", "", "100"]),
        fits: strings(&["inside", "", "fill"]),
        strips: strings(&["yes", "no", "no"]),
    };

    let records = run(raw, store.clone()).await;

    assert_eq!(records.len(), 3);
    let ImageRecord::Converted(wide) = &records[0] else {
        panic!("wide.png should convert: {:?}", records[0]);
    };
    assert_eq!(wide.original_name, "wide.png");
    assert_eq!(wide.output_key, "wide.webp");
    assert_eq!(wide.output_format, OutputFormat::Webp);
    assert_eq!(wide.object_url, "memory://objects/wide.webp");

    let stored = store.get("wide.webp").unwrap();
    assert_eq!(wide.byte_size_kb, stored.body.len() as f64 / 1024.0);
    let decoded = image::load_from_memory(&stored.body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 50));

    assert!(matches!(
        &records[1],
        ImageRecord::Failed(r)
            if r.original_name == "notes.txt" && r.error_kind == ErrorKind::UnsupportedSource
    ));

    let ImageRecord::Converted(square) = &records[2] else {
        panic!("square.png should convert: {:?}", records[2]);
    };
    assert_eq!(square.output_key, "square.jpg");
    let stored = store.get("square.jpg").unwrap();
    assert_eq!(stored.content_type, "image/jpeg");
    let decoded = image::load_from_memory(&stored.body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 100));

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn no_resize_keeps_source_dimensions() {
    let store = Arc::new(MemoryStore::default());
    let raw = RawBatch::uniform(
        vec![UploadedFile::new("keep.png", png(64, 48))],
        "png",
        None,
        None,
        ampe_convert::types::Fit::Fill,
        false,
    );

    let records = run(raw, store.clone()).await;

    assert!(matches!(&records[0], ImageRecord::Converted(_)));
    let decoded = image::load_from_memory(&store.get("keep.png").unwrap().body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
}

#[tokio::test]
async fn same_stem_uploads_leave_one_object() {
    let store = Arc::new(MemoryStore::default());
    let raw = RawBatch::uniform(
        vec![
            UploadedFile::new("photo.png", png(32, 32)),
            UploadedFile::new("photo.jpeg", png(16, 16)),
        ],
        "webp",
        None,
        None,
        ampe_convert::types::Fit::Cover,
        false,
    );

    let records = run(raw, store.clone()).await;

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| matches!(r, ImageRecord::Converted(c) if c.output_key == "photo.webp")));
    assert_eq!(store.keys(), vec!["photo.webp".to_string()]);
}

#[test]
fn misaligned_batch_never_reaches_the_coordinator() {
    let raw = RawBatch {
        files: vec![UploadedFile::new("a.png", png(4, 4))],
        formats: strings(&["webp"]),
        widths: strings(&[]),
        heights: strings(&[""]),
        fits: strings(&[""]),
        strips: strings(&["no"]),
    };
    assert!(matches!(
        bind(raw, &BindLimits::default()),
        Err(BindError::MalformedBatch(_))
    ));
}

#[tokio::test]
async fn oversized_resize_fails_only_that_file() {
    let store = Arc::new(MemoryStore::default());
    let raw = RawBatch {
        files: vec![
            UploadedFile::new("sliver.png", png(1, 400)),
            UploadedFile::new("fine.png", png(40, 40)),
        ],
        formats: strings(&["png", "png"]),
        // 1x400 widened to 2000 keeps its aspect: 2000 x 800000
        widths: strings(&["2000", "20"]),
        heights: strings(&["", ""]),
        fits: strings(&["", ""]),
        strips: strings(&["no", "no"]),
    };

    let records = run(raw, store.clone()).await;

    assert!(matches!(
        &records[0],
        ImageRecord::Failed(r) if r.error_kind == ErrorKind::UnsupportedTarget
    ));
    assert!(matches!(&records[1], ImageRecord::Converted(c) if c.output_key == "fine.png"));
    assert_eq!(store.keys(), vec!["fine.png".to_string()]);
}
