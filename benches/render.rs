#[macro_use]
extern crate criterion;

use criterion::Criterion;
use mandelzoom::{iterations_at, FrameRenderer, FrameTask, RenderRequest};

fn escape(c: &mut Criterion) {
    c.bench_function("iterations_at boundary point", |b| {
        b.iter(|| iterations_at(-0.743_643_887, 0.131_825_904, 1000))
    });
}

fn frame(c: &mut Criterion) {
    for threads in [1, 4].iter() {
        let request = RenderRequest {
            center_x: -0.5,
            width: 200,
            height: 200,
            max_iterations: 200,
            worker_threads: *threads,
            ..Default::default()
        };
        c.bench_function(&format!("frame 0 at 200x200, {} threads", threads), move |b| {
            b.iter(|| FrameRenderer::new(&request).render(&FrameTask::new(0)))
        });
    }
}

criterion_group!(benches, escape, frame);
criterion_main!(benches);
