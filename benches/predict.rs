use burn::backend::NdArray;
use criterion::{Criterion, criterion_group, criterion_main};
use fashionpad::canvas::{Canvas, Point};
use fashionpad::ml::{build_default_model, predict, predict::downsample};

fn bench_predict(c: &mut Criterion) {
    let device = Default::default();
    let model = build_default_model::<NdArray>(&device).expect("model");
    let mut canvas = Canvas::new();
    canvas.set_position(Point::new(60.0, 60.0));
    canvas.stroke_to(Point::new(220.0, 220.0), true);
    canvas.stroke_to(Point::new(60.0, 220.0), true);

    c.bench_function("downsample_canvas", |b| {
        b.iter(|| downsample(std::hint::black_box(canvas.bitmap())).expect("downsample"))
    });
    c.bench_function("predict_canvas", |b| {
        b.iter(|| predict(&model, std::hint::black_box(canvas.bitmap()), &device).expect("predict"))
    });
}

criterion_group!(benches, bench_predict);
criterion_main!(benches);
