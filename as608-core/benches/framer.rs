use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use as608_core::constants::{BROADCAST_ADDRESS, IMAGE_SIZE};
use as608_core::transfer::{ExpectedSize, Reassembly};
use as608_core::{encode_data, StreamFramer};

fn image_stream(chunk: usize) -> Vec<u8> {
    let image: Vec<u8> = (0..IMAGE_SIZE).map(|i| i as u8).collect();
    let chunks: Vec<_> = image.chunks(chunk).collect();
    let mut stream = Vec::with_capacity(IMAGE_SIZE + chunks.len() * 11);

    for (i, c) in chunks.iter().enumerate() {
        if let Ok(frame) = encode_data(BROADCAST_ADDRESS, c, i + 1 == chunks.len()) {
            stream.extend_from_slice(&frame);
        }
    }
    stream
}

fn bench_image_download(c: &mut Criterion) {
    let stream = image_stream(128);

    let mut group = c.benchmark_group("framer");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for read_size in [64usize, 512, 4096] {
        group.bench_function(format!("image_reads_of_{}", read_size), |b| {
            b.iter(|| {
                let mut framer = StreamFramer::with_capacity(8192);
                let mut reassembly = Reassembly::new(ExpectedSize::Exact(IMAGE_SIZE));

                for piece in stream.chunks(read_size) {
                    framer.push(piece);
                    while let Some(frame) = framer.next_frame() {
                        reassembly.on_frame(&frame);
                    }
                }
                black_box(reassembly.finish())
            })
        });
    }

    group.finish();
}

fn bench_resync(c: &mut Criterion) {
    let mut stream = vec![0x55u8; 4096];
    stream.extend_from_slice(&image_stream(256)[..2048]);

    c.bench_function("framer/resync_4k_garbage", |b| {
        b.iter(|| {
            let mut framer = StreamFramer::new();
            framer.push(black_box(&stream));
            black_box(framer.drain_frames().len())
        })
    });
}

criterion_group!(benches, bench_image_download, bench_resync);
criterion_main!(benches);
