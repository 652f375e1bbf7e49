use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use vision_union_image::{CpuAllocator, Image, ImageSize};

const SIZE: ImageSize = ImageSize {
    width: 1920,
    height: 1080,
};

fn sample_image() -> Image<u8, 1, CpuAllocator> {
    Image::from_size_val(SIZE, 127, CpuAllocator).unwrap()
}

fn bench_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("Image");

    group.bench_function("from_size_val_f32", |b| {
        b.iter(|| black_box(Image::<f32, 1, _>::from_size_val(SIZE, 0.0, CpuAllocator).unwrap()))
    });

    group.bench_function("clone", |b| {
        let image = sample_image();
        b.iter(|| black_box(&image).clone())
    });

    group.bench_function("release", |b| {
        b.iter_batched(
            sample_image,
            |image| black_box(image).release(),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_image);
criterion_main!(benches);
