//! Benchmarks for event normalization and source handling
//!
//! Run with: cargo bench -p marquee-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::rc::Rc;

use marquee_core::event::{BackendEvent, BackendFamily, EventType};
use marquee_core::headless::HeadlessElement;
use marquee_core::normalizer::EventNormalizer;
use marquee_core::source::{predict_type, Source};

// ============================================================================
// Helpers
// ============================================================================

fn dash_normalizer() -> EventNormalizer {
    EventNormalizer::new(Rc::new(HeadlessElement::new()), BackendFamily::Dash)
        .with_alias("streamActivated", EventType::LoadedMetadata)
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Event Normalization");
    let normalizer = dash_normalizer();

    let events = [
        ("alias", BackendEvent::new("streamActivated")),
        (
            "error",
            BackendEvent::new("error").with_payload(json!({ "error": { "message": "download error" } })),
        ),
        (
            "passthrough",
            BackendEvent::new("qualityChangeRendered").with_payload(json!({ "newQuality": 2 })),
        ),
    ];

    for (name, event) in events.iter() {
        group.bench_with_input(BenchmarkId::new("normalize", name), event, |b, event| {
            b.iter(|| black_box(normalizer.normalize(black_box(event))));
        });
    }

    group.finish();
}

fn bench_source(c: &mut Criterion) {
    let mut group = c.benchmark_group("Source Type Prediction");

    group.bench_function("predict_dash", |b| {
        b.iter(|| black_box(predict_type(black_box("https://cdn.example.com/vod/manifest.mpd?token=abc"))));
    });

    group.bench_function("predict_relative_mp4", |b| {
        b.iter(|| black_box(predict_type(black_box("media/movie.mp4#t=10"))));
    });

    group.bench_function("source_from_url", |b| {
        b.iter(|| black_box(Source::from_url(black_box("https://cdn.example.com/live/master.m3u8"))));
    });

    group.finish();
}

criterion_group!(normalizer_benches, bench_normalize,);

criterion_group!(source_benches, bench_source,);

criterion_main!(normalizer_benches, source_benches,);
