//! Lossless round-trip guarantee for persisted annotation images
//!
//! Segmentation correctness depends on exact pixel values surviving the
//! encode/decode cycle; any lossy step would corrupt label colors.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::TempDir;

use percept_engine::persistence::{AsyncWriteRequest, ImageWriterPool};

#[test]
fn random_rgba_pixels_survive_encode_and_decode_byte_identical() {
    let dir = TempDir::new().expect("temp dir");
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let (width, height) = (64u32, 48u32);
    let pixels: Vec<u8> = (0..width * height * 4).map(|_| rng.gen()).collect();
    let path = dir.path().join("segmentation/segmentation_0.png");

    let pool = ImageWriterPool::with_workers(1);
    pool.write(AsyncWriteRequest {
        pixels: pixels.clone(),
        width,
        height,
        path: path.clone(),
    })
    .expect("queue open");
    let stats = pool.shutdown();
    assert_eq!(stats.files_written, 1);

    let decoded = image::open(&path).expect("readable png").to_rgba8();
    assert_eq!(decoded.dimensions(), (width, height));
    assert_eq!(decoded.as_raw(), &pixels);
}

#[test]
fn extreme_pixel_values_are_preserved() {
    let dir = TempDir::new().expect("temp dir");
    let (width, height) = (2u32, 2u32);
    // Corner cases: transparent black, opaque white, and the two channel
    // orders that catch RGBA/BGRA swaps.
    let pixels: Vec<u8> = vec![
        0, 0, 0, 0, //
        255, 255, 255, 255, //
        255, 0, 0, 255, //
        0, 0, 255, 255,
    ];
    let path = dir.path().join("extremes.png");

    let pool = ImageWriterPool::with_workers(1);
    pool.write(AsyncWriteRequest {
        pixels: pixels.clone(),
        width,
        height,
        path: path.clone(),
    })
    .expect("queue open");
    pool.shutdown();

    let decoded = image::open(&path).expect("readable png").to_rgba8();
    assert_eq!(decoded.as_raw(), &pixels);
}
