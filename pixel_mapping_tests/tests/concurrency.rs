// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Readers on other threads never see colors from two different passes at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use pixel_mapping::kurbo::{Point, Size};
use pixel_mapping::{LinearColor, PixelRegion, ReadbackBuffer, SourceTexture};
use pixel_mapping_tests::{create_renderer_sync, TestParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const READERS: usize = 4;

/// Every color of frame `n` is the same, and differs from other frames.
fn frame_color(frame: u64) -> LinearColor {
    let v = (frame % 1000) as f32 / 1000.0;
    LinearColor::new([v, 1.0 - v, v, 1.0])
}

fn assert_uniform(colors: &[LinearColor]) {
    if let Some(first) = colors.first() {
        assert!(
            colors.iter().all(|c| c == first),
            "readback mixes passes: {colors:?}"
        );
    }
}

fn spawn_readers(
    readback: &Arc<ReadbackBuffer>,
    done: &Arc<AtomicBool>,
    seed: u64,
) -> Vec<thread::JoinHandle<usize>> {
    (0..READERS)
        .map(|i| {
            let readback = Arc::clone(readback);
            let done = Arc::clone(done);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed + i as u64);
                let mut reads = 0;
                let mut last_frame = None;
                while !done.load(Ordering::Acquire) {
                    let len = readback.len();
                    if len == 0 {
                        thread::yield_now();
                        continue;
                    }
                    let first = rng.random_range(0..len);
                    let last = rng.random_range(first..len);
                    if let Some(colors) = readback.get_range(first, last) {
                        assert_eq!(colors.len(), last - first + 1);
                        assert_uniform(&colors);
                        reads += 1;
                    }
                    let (frame, colors) = readback.snapshot();
                    assert_uniform(&colors);
                    assert!(frame >= last_frame, "frame went backwards");
                    last_frame = frame;
                }
                reads
            })
        })
        .collect()
}

#[test]
fn direct_writes_are_never_torn() {
    let readback = Arc::new(ReadbackBuffer::new());
    let done = Arc::new(AtomicBool::new(false));
    let readers = spawn_readers(&readback, &done, 17);

    let mut rng = StdRng::seed_from_u64(99);
    for frame in 1..=2000 {
        let len = rng.random_range(1..=256);
        readback.set_all(frame, vec![frame_color(frame); len]);
        if frame % 64 == 0 {
            thread::yield_now();
        }
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(readback.frame(), Some(2000));
}

#[test]
fn render_thread_writes_are_never_torn() {
    let mut renderer = create_renderer_sync(&TestParams::cpu("concurrency")).unwrap();
    let readback = renderer.readback();
    let done = Arc::new(AtomicBool::new(false));
    let readers = spawn_readers(&readback, &done, 3);

    let regions: Vec<_> = (0..300)
        .map(|i| {
            PixelRegion::new(
                Point::new(f64::from(i % 8), f64::from(i / 8 % 8)),
                Size::new(1.0, 1.0),
            )
        })
        .collect();
    for frame in 1..=60 {
        let source = SourceTexture::solid(8, 8, frame_color(frame));
        renderer.begin_frame();
        for region in &regions {
            renderer.queue_downsample(*region);
        }
        renderer.run_frame(Some(&source)).unwrap();
        // Let passes pile up on the render thread every so often.
        if frame % 10 == 0 {
            renderer.wait_idle().unwrap();
        }
    }
    renderer.wait_idle().unwrap();
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(readback.frame(), Some(60));
    assert_eq!(readback.len(), 300);
    assert_uniform(&readback.snapshot().1);
    assert_eq!(readback.get(0), Some(frame_color(60)));
}
